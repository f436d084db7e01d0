//! Named connection profiles

use crate::error::{ConfigError, Result};
use nimbus_cloud::{
    AuthProtocol, ClientConfig, Credentials, EndpointDefaults, EndpointInterface,
    EndpointSelector, ScopeOptions, TokenScope,
};
use serde::Deserialize;
use std::collections::BTreeMap;

/// Top-level layout of a config file
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Profiles {
    #[serde(default)]
    pub profiles: BTreeMap<String, ProfileConfig>,
}

impl Profiles {
    pub fn get(&self, name: &str) -> Result<&ProfileConfig> {
        self.profiles
            .get(name)
            .ok_or_else(|| ConfigError::ProfileNotFound(name.to_string()))
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.profiles.keys().map(String::as_str)
    }
}

fn default_service_type() -> String {
    "compute".to_string()
}

fn default_clock_skew() -> i64 {
    nimbus_cloud::auth::DEFAULT_CLOCK_SKEW_SECS
}

/// One account on one cloud
#[derive(Debug, Clone, Deserialize)]
pub struct ProfileConfig {
    /// Protocol identifier, e.g. `2.0_apikey` or `vcloud_5.5`
    pub protocol: String,
    pub auth_url: String,
    pub user_id: String,
    #[serde(default)]
    pub secret: Option<String>,
    /// Environment variable holding the secret
    #[serde(default)]
    pub secret_env: Option<String>,

    #[serde(default)]
    pub token_scope: TokenScope,
    #[serde(default)]
    pub domain_name: Option<String>,
    #[serde(default)]
    pub tenant_name: Option<String>,
    #[serde(default)]
    pub tenant_domain_id: Option<String>,

    #[serde(default = "default_service_type")]
    pub service_type: String,
    #[serde(default)]
    pub service_name: Option<String>,
    #[serde(default)]
    pub region: Option<String>,
    #[serde(default)]
    pub interface: Option<EndpointInterface>,

    #[serde(default)]
    pub base_url: Option<String>,
    #[serde(default)]
    pub auth_token: Option<String>,
    #[serde(default)]
    pub microversion: Option<String>,

    #[serde(default = "default_clock_skew")]
    pub clock_skew_secs: i64,
    #[serde(default)]
    pub evict_forced_token_on_unauthorized: bool,
}

impl ProfileConfig {
    fn resolve_secret(&self, profile: &str) -> Result<String> {
        if let Some(secret) = &self.secret {
            return Ok(secret.clone());
        }
        let env = self
            .secret_env
            .clone()
            .unwrap_or_else(|| "NIMBUS_SECRET".to_string());
        std::env::var(&env).map_err(|_| ConfigError::MissingSecret {
            profile: profile.to_string(),
            env,
        })
    }

    /// Build the core client configuration for this profile
    ///
    /// A forced token needs no secret; every other profile must provide one.
    pub fn into_client_config(self, profile: &str) -> Result<ClientConfig> {
        let invalid = |message: String| ConfigError::InvalidProfile {
            profile: profile.to_string(),
            message,
        };

        let protocol: AuthProtocol = self.protocol.parse().map_err(|e| invalid(format!("{}", e)))?;
        let secret = if self.auth_token.is_some() && self.secret.is_none() {
            self.resolve_secret(profile).unwrap_or_default()
        } else {
            self.resolve_secret(profile)?
        };

        let mut scope = ScopeOptions::default().with_scope(self.token_scope);
        if let Some(tenant_name) = &self.tenant_name {
            scope = scope.with_tenant(tenant_name);
        }
        if let Some(domain_name) = &self.domain_name {
            scope = scope.with_domain(domain_name);
        }
        if let Some(tenant_domain_id) = &self.tenant_domain_id {
            scope = scope.with_tenant_domain_id(tenant_domain_id);
        }

        let selector = EndpointSelector {
            base_url: self.base_url,
            service_type: None,
            service_name: None,
            region: None,
            microversion: self.microversion,
            auth_token: self.auth_token,
            interface: self.interface,
        };
        selector.validate().map_err(|e| invalid(e.to_string()))?;

        let defaults = EndpointDefaults {
            service_type: self.service_type,
            service_name: self.service_name,
            region: self.region,
        };

        Ok(
            ClientConfig::new(protocol, self.auth_url, Credentials::new(self.user_id, secret))
                .with_scope(scope)
                .with_selector(selector)
                .with_defaults(defaults)
                .with_clock_skew(chrono::Duration::seconds(self.clock_skew_secs))
                .evict_forced_token_on_unauthorized(self.evict_forced_token_on_unauthorized),
        )
    }
}
