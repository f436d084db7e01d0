//! Authentication negotiation
//!
//! A configured protocol identifier selects one handshake implementation
//! when the negotiator is built. The negotiator owns the cache layering:
//! an optional external store is consulted before the in-memory one, and
//! every successful handshake is written to both.

mod keystone;
mod vcloud;

use crate::catalog::CatalogFormat;
use crate::clock::Clock;
use crate::credentials::{Credentials, ScopeOptions, TokenScope};
use crate::error::{CloudError, Result};
use crate::store::{AuthContext, CacheKey, CredentialStore, MemoryStore};
use crate::transport::{Headers, Transport};
use chrono::{DateTime, NaiveDateTime, Utc};
use std::fmt;
use std::sync::Arc;

pub use keystone::{AUTH_TOKEN_HEADER, KeystoneHandshake, KeystoneVersion};
pub use vcloud::{VCloudHandshake, VCloudVersion};

/// Seconds before the reported expiry at which a token is treated as stale
pub const DEFAULT_CLOCK_SKEW_SECS: i64 = 5;

/// Supported authentication protocols
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AuthProtocol {
    KeystoneV1,
    KeystoneV2Password,
    KeystoneV2ApiKey,
    KeystoneV3Password,
    KeystoneV3Token,
    KeystoneV3ApplicationCredential,
    VCloudV08,
    VCloudV15,
    VCloudV55,
}

impl AuthProtocol {
    pub const ALL: [AuthProtocol; 9] = [
        AuthProtocol::KeystoneV1,
        AuthProtocol::KeystoneV2Password,
        AuthProtocol::KeystoneV2ApiKey,
        AuthProtocol::KeystoneV3Password,
        AuthProtocol::KeystoneV3Token,
        AuthProtocol::KeystoneV3ApplicationCredential,
        AuthProtocol::VCloudV08,
        AuthProtocol::VCloudV15,
        AuthProtocol::VCloudV55,
    ];

    /// Canonical identifier, also part of the cache key
    pub fn id(&self) -> &'static str {
        match self {
            AuthProtocol::KeystoneV1 => "1.1",
            AuthProtocol::KeystoneV2Password => "2.0_password",
            AuthProtocol::KeystoneV2ApiKey => "2.0_apikey",
            AuthProtocol::KeystoneV3Password => "3.x_password",
            AuthProtocol::KeystoneV3Token => "3.x_token",
            AuthProtocol::KeystoneV3ApplicationCredential => "3.x_appcred",
            AuthProtocol::VCloudV08 => "vcloud_0.8",
            AuthProtocol::VCloudV15 => "vcloud_1.5",
            AuthProtocol::VCloudV55 => "vcloud_5.5",
        }
    }

    /// Whether the handshake reports token expiry
    pub fn reports_expiry(&self) -> bool {
        !matches!(
            self,
            AuthProtocol::VCloudV08 | AuthProtocol::VCloudV15 | AuthProtocol::VCloudV55
        )
    }
}

impl fmt::Display for AuthProtocol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.id())
    }
}

impl std::str::FromStr for AuthProtocol {
    type Err = CloudError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim() {
            "1.1" => Ok(AuthProtocol::KeystoneV1),
            "2.0" | "2.0_password" => Ok(AuthProtocol::KeystoneV2Password),
            "2.0_apikey" => Ok(AuthProtocol::KeystoneV2ApiKey),
            "3.x" | "3.x_password" => Ok(AuthProtocol::KeystoneV3Password),
            "3.x_token" => Ok(AuthProtocol::KeystoneV3Token),
            "3.x_appcred" => Ok(AuthProtocol::KeystoneV3ApplicationCredential),
            "vcloud_0.8" | "0.8" => Ok(AuthProtocol::VCloudV08),
            "vcloud_1.5" => Ok(AuthProtocol::VCloudV15),
            "vcloud_5.5" => Ok(AuthProtocol::VCloudV55),
            other => Err(CloudError::Configuration(format!(
                "Unsupported authentication protocol: {}",
                other
            ))),
        }
    }
}

/// Concrete handshake for one protocol
#[derive(Debug, Clone)]
pub enum Handshake {
    Keystone(KeystoneHandshake),
    VCloud(VCloudHandshake),
}

impl Handshake {
    pub fn for_protocol(protocol: AuthProtocol) -> Self {
        match protocol {
            AuthProtocol::KeystoneV1 => {
                Handshake::Keystone(KeystoneHandshake::new(KeystoneVersion::V1))
            }
            AuthProtocol::KeystoneV2Password => {
                Handshake::Keystone(KeystoneHandshake::new(KeystoneVersion::V2Password))
            }
            AuthProtocol::KeystoneV2ApiKey => {
                Handshake::Keystone(KeystoneHandshake::new(KeystoneVersion::V2ApiKey))
            }
            AuthProtocol::KeystoneV3Password => {
                Handshake::Keystone(KeystoneHandshake::new(KeystoneVersion::V3Password))
            }
            AuthProtocol::KeystoneV3Token => {
                Handshake::Keystone(KeystoneHandshake::new(KeystoneVersion::V3Token))
            }
            AuthProtocol::KeystoneV3ApplicationCredential => Handshake::Keystone(
                KeystoneHandshake::new(KeystoneVersion::V3ApplicationCredential),
            ),
            AuthProtocol::VCloudV08 => Handshake::VCloud(VCloudHandshake::new(VCloudVersion::V08)),
            AuthProtocol::VCloudV15 => Handshake::VCloud(VCloudHandshake::new(VCloudVersion::V15)),
            AuthProtocol::VCloudV55 => Handshake::VCloud(VCloudHandshake::new(VCloudVersion::V55)),
        }
    }

    pub async fn perform(
        &self,
        transport: &dyn Transport,
        auth_url: &str,
        credentials: &Credentials,
        scope: &ScopeOptions,
    ) -> Result<AuthContext> {
        match self {
            Handshake::Keystone(h) => h.perform(transport, auth_url, credentials, scope).await,
            Handshake::VCloud(h) => h.perform(transport, auth_url, credentials).await,
        }
    }

    pub fn catalog_format(&self) -> CatalogFormat {
        match self {
            Handshake::Keystone(h) => h.catalog_format(),
            Handshake::VCloud(_) => CatalogFormat::Flat,
        }
    }

    /// Token and `Accept` headers for service requests
    pub fn request_headers(&self, token: &str) -> Headers {
        match self {
            Handshake::Keystone(h) => h.request_headers(token),
            Handshake::VCloud(h) => h.request_headers(token),
        }
    }

    /// Content type added to POST/PUT requests that do not set one
    pub fn default_content_type(&self) -> Option<&'static str> {
        match self {
            Handshake::Keystone(_) => Some("application/json"),
            Handshake::VCloud(_) => None,
        }
    }

    fn validate(&self, scope: &ScopeOptions) -> Result<()> {
        match self {
            Handshake::Keystone(h) => h.validate(scope),
            Handshake::VCloud(_) => Ok(()),
        }
    }
}

/// Everything a negotiator needs, handed over at construction
pub struct NegotiatorOptions {
    pub protocol: AuthProtocol,
    pub auth_url: String,
    pub credentials: Credentials,
    pub scope: ScopeOptions,
    pub transport: Arc<dyn Transport>,
    pub external_store: Option<Arc<dyn CredentialStore>>,
    pub clock: Arc<dyn Clock>,
    pub clock_skew: chrono::Duration,
}

/// Performs handshakes and owns the cached session for one identity
pub struct Negotiator {
    protocol: AuthProtocol,
    handshake: Handshake,
    auth_url: String,
    credentials: Credentials,
    scope: ScopeOptions,
    key: CacheKey,
    transport: Arc<dyn Transport>,
    memory: MemoryStore,
    external: Option<Arc<dyn CredentialStore>>,
    clock: Arc<dyn Clock>,
    clock_skew: chrono::Duration,
}

impl Negotiator {
    pub fn new(options: NegotiatorOptions) -> Result<Self> {
        if options.auth_url.trim().is_empty() {
            return Err(CloudError::Configuration(
                "an auth URL is required".to_string(),
            ));
        }

        let handshake = Handshake::for_protocol(options.protocol);
        handshake.validate(&options.scope)?;

        let key = CacheKey::new(
            &options.auth_url,
            options.protocol.id(),
            &options.credentials,
            &options.scope,
        );

        Ok(Self {
            protocol: options.protocol,
            handshake,
            auth_url: options.auth_url,
            credentials: options.credentials,
            scope: options.scope,
            key,
            transport: options.transport,
            memory: MemoryStore::new(),
            external: options.external_store,
            clock: options.clock,
            clock_skew: options.clock_skew,
        })
    }

    pub fn protocol(&self) -> AuthProtocol {
        self.protocol
    }

    pub fn handshake(&self) -> &Handshake {
        &self.handshake
    }

    pub fn cache_key(&self) -> &CacheKey {
        &self.key
    }

    pub fn auth_url(&self) -> &str {
        &self.auth_url
    }

    /// True iff the context has a token that is not about to expire
    ///
    /// A context without an expiry stays valid until it is evicted.
    pub fn is_token_valid(&self, context: &AuthContext) -> bool {
        if context.token.is_empty() {
            return false;
        }
        match context.expires {
            Some(expires) => self.clock.now() + self.clock_skew < expires,
            None => true,
        }
    }

    /// Cached context from the external store, else the in-memory one
    pub async fn cached(&self) -> Result<Option<AuthContext>> {
        if let Some(external) = &self.external
            && let Some(context) = external.get(&self.key).await?
        {
            tracing::debug!("Token cache hit (external store)");
            self.memory.put(&self.key, context.clone()).await?;
            return Ok(Some(context));
        }

        let context = self.memory.get(&self.key).await?;
        if context.is_some() {
            tracing::debug!("Token cache hit (memory)");
        }
        Ok(context)
    }

    /// Return a valid session, performing the handshake only when needed
    pub async fn authenticate(&self, force: bool) -> Result<AuthContext> {
        if !force
            && let Some(context) = self.cached().await?
        {
            if self.is_token_valid(&context) {
                return Ok(context);
            }
            tracing::debug!("Cached token expired, re-authenticating");
        }

        tracing::info!(
            "Authenticating {} against {} ({})",
            self.credentials.user_id(),
            self.auth_url,
            self.protocol
        );
        let context = self
            .handshake
            .perform(
                self.transport.as_ref(),
                &self.auth_url,
                &self.credentials,
                &self.scope,
            )
            .await?;

        self.memory.put(&self.key, context.clone()).await?;
        if let Some(external) = &self.external
            && let Err(e) = external.put(&self.key, context.clone()).await
        {
            // the session is good; other clients just miss the shared copy
            tracing::warn!("Failed to write token to external store: {}", e);
        }

        Ok(context)
    }

    /// Drop this identity's cached session from every store
    pub async fn clear_cached(&self) -> Result<()> {
        tracing::warn!("Evicting cached token for {}", self.credentials.user_id());
        self.memory.clear(&self.key).await?;
        if let Some(external) = &self.external {
            external.clear(&self.key).await?;
        }
        Ok(())
    }
}

/// Parse a token expiry timestamp as reported by identity services
pub(crate) fn parse_expiry(value: &str) -> Result<DateTime<Utc>> {
    if let Ok(parsed) = DateTime::parse_from_rfc3339(value) {
        return Ok(parsed.with_timezone(&Utc));
    }
    // older Keystone releases omit the offset
    NaiveDateTime::parse_from_str(value, "%Y-%m-%dT%H:%M:%S%.f")
        .map(|naive| naive.and_utc())
        .map_err(|e| {
            CloudError::MalformedResponse(format!("Invalid token expiry '{}': {}", value, e))
        })
}

/// Project scope needs a tenant to scope to
pub(crate) fn require_project_tenant(scope: &ScopeOptions) -> Result<()> {
    if scope.token_scope == TokenScope::Project
        && scope.tenant_name.as_deref().is_none_or(str::is_empty)
    {
        return Err(CloudError::Configuration(
            "project-scoped tokens require a tenant name".to_string(),
        ));
    }
    Ok(())
}
