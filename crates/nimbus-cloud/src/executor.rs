//! Authenticated request execution
//!
//! The executor attaches session headers to every request, authenticates
//! lazily, resolves where requests go, and evicts the cached session when
//! a service answers 401.

use crate::auth::Negotiator;
use crate::catalog::{EndpointSelector, MICROVERSION_HEADER, Microversion, ServiceCatalog};
use crate::connection::ConnectionInfo;
use crate::error::{CloudError, Result};
use crate::response::error_message;
use crate::store::AuthContext;
use crate::transport::{Headers, HttpRequest, HttpResponse, Method, Transport};
use parking_lot::Mutex;
use std::sync::Arc;

/// Provider defaults that the selector's overrides are laid over
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EndpointDefaults {
    pub service_type: String,
    pub service_name: Option<String>,
    pub region: Option<String>,
}

impl Default for EndpointDefaults {
    fn default() -> Self {
        Self {
            service_type: "compute".to_string(),
            service_name: None,
            region: None,
        }
    }
}

#[derive(Default)]
struct SessionState {
    context: Option<AuthContext>,
    catalog: Option<ServiceCatalog>,
    /// Memoised result of `resolve()`
    resolved: Option<ConnectionInfo>,
    /// Connection the transport was last told about
    connected: Option<ConnectionInfo>,
    forced_revoked: bool,
}

/// Token in use for one request
struct ActiveSession {
    context: AuthContext,
    forced: bool,
}

pub struct RequestExecutor {
    negotiator: Negotiator,
    transport: Arc<dyn Transport>,
    selector: EndpointSelector,
    microversion: Option<Microversion>,
    defaults: EndpointDefaults,
    evict_forced_token_on_unauthorized: bool,
    state: Mutex<SessionState>,
}

impl RequestExecutor {
    pub fn new(
        negotiator: Negotiator,
        transport: Arc<dyn Transport>,
        selector: EndpointSelector,
        defaults: EndpointDefaults,
        evict_forced_token_on_unauthorized: bool,
    ) -> Result<Self> {
        selector.validate()?;
        let microversion = selector
            .microversion
            .as_deref()
            .map(str::parse::<Microversion>)
            .transpose()?;

        Ok(Self {
            negotiator,
            transport,
            selector,
            microversion,
            defaults,
            evict_forced_token_on_unauthorized,
            state: Mutex::new(SessionState::default()),
        })
    }

    pub fn negotiator(&self) -> &Negotiator {
        &self.negotiator
    }

    pub fn selector(&self) -> &EndpointSelector {
        &self.selector
    }

    /// Forced token, unless a 401 has revoked it
    fn forced_token(&self) -> Option<&str> {
        let token = self.selector.auth_token.as_deref()?;
        if self.state.lock().forced_revoked {
            return None;
        }
        Some(token)
    }

    /// Authenticate through the negotiator and install the result as the
    /// current session
    pub async fn authenticate(&self, force: bool) -> Result<AuthContext> {
        let context = self.negotiator.authenticate(force).await?;
        let format = self.negotiator.handshake().catalog_format();
        let catalog = ServiceCatalog::parse(format, &context.catalog)?;
        tracing::debug!("Session established with {} catalog entries", catalog.entries().len());

        let mut state = self.state.lock();
        state.context = Some(context.clone());
        state.catalog = Some(catalog);
        state.resolved = None;
        Ok(context)
    }

    async fn session(&self) -> Result<ActiveSession> {
        if let Some(token) = self.forced_token() {
            return Ok(ActiveSession {
                context: AuthContext::new(token),
                forced: true,
            });
        }

        let current = self.state.lock().context.clone();
        if let Some(context) = current
            && self.negotiator.is_token_valid(&context)
        {
            return Ok(ActiveSession {
                context,
                forced: false,
            });
        }

        let context = self.authenticate(false).await?;
        Ok(ActiveSession {
            context,
            forced: false,
        })
    }

    /// Current session, authenticating on first use or after eviction
    ///
    /// With a forced token the returned context carries only that token.
    pub async fn ensure_session(&self) -> Result<AuthContext> {
        Ok(self.session().await?.context)
    }

    /// Parsed service catalog of the current session
    ///
    /// Empty while a forced token is in use.
    pub async fn catalog(&self) -> Result<ServiceCatalog> {
        let session = self.session().await?;
        if session.forced {
            return Ok(ServiceCatalog::default());
        }
        Ok(self.state.lock().catalog.clone().unwrap_or_default())
    }

    /// Look up an endpoint, with the configured selector applied on top
    pub async fn endpoint(
        &self,
        service_type: &str,
        service_name: Option<&str>,
        region: Option<&str>,
    ) -> Result<String> {
        if let Some(base_url) = &self.selector.base_url {
            return Ok(base_url.clone());
        }
        let catalog = self.catalog().await?;
        catalog.get_endpoint(&self.selector, service_type, service_name, region)
    }

    /// Connection info for the selected base URL
    ///
    /// Memoised until [`invalidate`](Self::invalidate) or a new session.
    pub async fn resolve(&self) -> Result<ConnectionInfo> {
        if let Some(resolved) = self.state.lock().resolved.clone() {
            return Ok(resolved);
        }

        let base_url = self
            .endpoint(
                &self.defaults.service_type,
                self.defaults.service_name.as_deref(),
                self.defaults.region.as_deref(),
            )
            .await?;
        let info = ConnectionInfo::from_url(&base_url)?;
        tracing::debug!("Resolved endpoint {}{}", info.origin(), info.path_prefix);

        self.state.lock().resolved = Some(info.clone());
        Ok(info)
    }

    /// Forget the resolved connection info
    pub fn invalidate(&self) {
        self.state.lock().resolved = None;
    }

    fn drop_session(&self) {
        let mut state = self.state.lock();
        state.context = None;
        state.catalog = None;
        state.resolved = None;
    }

    async fn connect(&self, info: &ConnectionInfo) -> Result<()> {
        let reuse = self
            .state
            .lock()
            .connected
            .as_ref()
            .is_some_and(|current| current.same_connection(info));
        if reuse {
            tracing::debug!("Reusing connection to {}", info.origin());
            return Ok(());
        }

        self.transport.connect(info).await?;
        self.state.lock().connected = Some(info.clone());
        Ok(())
    }

    fn request_headers(&self, method: Method, token: &str, caller: Headers) -> Headers {
        let handshake = self.negotiator.handshake();
        let mut headers = handshake.request_headers(token);

        if method.has_body()
            && !caller.contains("Content-Type")
            && let Some(content_type) = handshake.default_content_type()
        {
            headers.set("Content-Type", content_type);
        }

        if let Some(microversion) = &self.microversion {
            let service_type = self
                .selector
                .effective_service_type(&self.defaults.service_type);
            if let Some(value) = microversion.header_for(service_type) {
                headers.set(MICROVERSION_HEADER, value);
            }
        }

        headers.extend(caller);
        headers
    }

    /// Perform one authenticated request
    ///
    /// `path` is an action relative to the resolved base URL, or an absolute
    /// href whose path and query are sent to the resolved origin.
    pub async fn call(
        &self,
        path: &str,
        method: Method,
        headers: Headers,
        body: Option<Vec<u8>>,
    ) -> Result<HttpResponse> {
        let session = self.session().await?;
        let info = self.resolve().await?;
        self.connect(&info).await?;

        let mut request = HttpRequest::new(method, info.url_for(path))
            .with_headers(self.request_headers(method, &session.context.token, headers));
        if let Some(body) = body {
            request = request.with_body(body);
        }

        tracing::debug!("{} {}", method, request.url);
        let response = self.transport.send(request).await?;

        if response.is_success() {
            return Ok(response);
        }

        let message = error_message(&response);
        if response.status == 401 {
            self.on_unauthorized(session.forced).await;
            return Err(CloudError::Unauthorized(message));
        }

        Err(CloudError::Http {
            status: response.status,
            message,
        })
    }

    async fn on_unauthorized(&self, forced: bool) {
        if !forced {
            self.drop_session();
            // eviction failure must not mask the 401
            if let Err(e) = self.negotiator.clear_cached().await {
                tracing::warn!("Failed to evict cached token: {}", e);
            }
            return;
        }

        if self.evict_forced_token_on_unauthorized {
            tracing::warn!("Forced token rejected, falling back to credentials");
            let mut state = self.state.lock();
            state.forced_revoked = true;
            state.context = None;
            state.catalog = None;
            state.resolved = None;
        } else {
            tracing::warn!("Forced token rejected; keeping it as configured");
        }
    }
}
