//! Client construction
//!
//! Everything the session core depends on (transport, credential store,
//! clock) is handed in here; nothing is looked up globally.

use crate::auth::{AuthProtocol, DEFAULT_CLOCK_SKEW_SECS, Negotiator, NegotiatorOptions};
use crate::catalog::EndpointSelector;
use crate::clock::{Clock, SystemClock};
use crate::credentials::{Credentials, ScopeOptions};
use crate::error::Result;
use crate::executor::{EndpointDefaults, RequestExecutor};
use crate::store::CredentialStore;
use crate::task::{TaskFormat, TaskWaiter};
use crate::transport::Transport;
use std::fmt;
use std::sync::Arc;

#[derive(Clone)]
pub struct ClientConfig {
    pub protocol: AuthProtocol,
    pub auth_url: String,
    pub credentials: Credentials,
    pub scope: ScopeOptions,
    pub selector: EndpointSelector,
    pub defaults: EndpointDefaults,
    /// Tokens expiring within this window are treated as expired
    pub clock_skew: chrono::Duration,
    /// Drop a forced token after a 401 and fall back to the credentials
    pub evict_forced_token_on_unauthorized: bool,
    /// Shared cache consulted before the in-memory one
    pub store: Option<Arc<dyn CredentialStore>>,
    pub clock: Arc<dyn Clock>,
}

impl ClientConfig {
    pub fn new(
        protocol: AuthProtocol,
        auth_url: impl Into<String>,
        credentials: Credentials,
    ) -> Self {
        Self {
            protocol,
            auth_url: auth_url.into(),
            credentials,
            scope: ScopeOptions::default(),
            selector: EndpointSelector::default(),
            defaults: EndpointDefaults::default(),
            clock_skew: chrono::Duration::seconds(DEFAULT_CLOCK_SKEW_SECS),
            evict_forced_token_on_unauthorized: false,
            store: None,
            clock: Arc::new(SystemClock),
        }
    }

    pub fn with_scope(mut self, scope: ScopeOptions) -> Self {
        self.scope = scope;
        self
    }

    pub fn with_selector(mut self, selector: EndpointSelector) -> Self {
        self.selector = selector;
        self
    }

    pub fn with_defaults(mut self, defaults: EndpointDefaults) -> Self {
        self.defaults = defaults;
        self
    }

    pub fn with_store(mut self, store: Arc<dyn CredentialStore>) -> Self {
        self.store = Some(store);
        self
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn with_clock_skew(mut self, skew: chrono::Duration) -> Self {
        self.clock_skew = skew;
        self
    }

    pub fn evict_forced_token_on_unauthorized(mut self, evict: bool) -> Self {
        self.evict_forced_token_on_unauthorized = evict;
        self
    }
}

impl fmt::Debug for ClientConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClientConfig")
            .field("protocol", &self.protocol)
            .field("auth_url", &self.auth_url)
            .field("credentials", &self.credentials)
            .field("scope", &self.scope)
            .field("selector", &self.selector)
            .field("defaults", &self.defaults)
            .field("clock_skew", &self.clock_skew)
            .field(
                "evict_forced_token_on_unauthorized",
                &self.evict_forced_token_on_unauthorized,
            )
            .field("store", &self.store.is_some())
            .finish_non_exhaustive()
    }
}

/// Entry point tying negotiator, executor and waiter together
pub struct CloudClient {
    executor: Arc<RequestExecutor>,
}

impl CloudClient {
    /// Validates the configuration; no network traffic happens here
    pub fn new(config: ClientConfig, transport: Arc<dyn Transport>) -> Result<Self> {
        let negotiator = Negotiator::new(NegotiatorOptions {
            protocol: config.protocol,
            auth_url: config.auth_url,
            credentials: config.credentials,
            scope: config.scope,
            transport: transport.clone(),
            external_store: config.store,
            clock: config.clock,
            clock_skew: config.clock_skew,
        })?;

        let executor = RequestExecutor::new(
            negotiator,
            transport,
            config.selector,
            config.defaults,
            config.evict_forced_token_on_unauthorized,
        )?;

        Ok(Self {
            executor: Arc::new(executor),
        })
    }

    pub fn executor(&self) -> &Arc<RequestExecutor> {
        &self.executor
    }

    pub fn negotiator(&self) -> &Negotiator {
        self.executor.negotiator()
    }

    pub fn waiter(&self, format: TaskFormat) -> TaskWaiter {
        TaskWaiter::new(self.executor.clone(), format)
    }
}
