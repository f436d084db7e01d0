//! Credentials and token scoping options

use serde::{Deserialize, Serialize};
use std::fmt;

/// Identity used for the authentication handshake
#[derive(Clone, PartialEq, Eq)]
pub struct Credentials {
    user_id: String,
    secret: String,
}

impl Credentials {
    pub fn new(user_id: impl Into<String>, secret: impl Into<String>) -> Self {
        Self {
            user_id: user_id.into(),
            secret: secret.into(),
        }
    }

    pub fn user_id(&self) -> &str {
        &self.user_id
    }

    pub fn secret(&self) -> &str {
        &self.secret
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("user_id", &self.user_id)
            .field("secret", &"***")
            .finish()
    }
}

/// What a token is scoped to
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TokenScope {
    #[default]
    Project,
    Domain,
    Unscoped,
}

impl fmt::Display for TokenScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TokenScope::Project => write!(f, "project"),
            TokenScope::Domain => write!(f, "domain"),
            TokenScope::Unscoped => write!(f, "unscoped"),
        }
    }
}

impl std::str::FromStr for TokenScope {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "project" => Ok(TokenScope::Project),
            "domain" => Ok(TokenScope::Domain),
            "unscoped" => Ok(TokenScope::Unscoped),
            other => Err(format!("unknown token scope: {}", other)),
        }
    }
}

/// Scoping options sent along with the credentials
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScopeOptions {
    pub token_scope: TokenScope,
    pub domain_name: String,
    pub tenant_name: Option<String>,
    pub tenant_domain_id: String,
}

impl Default for ScopeOptions {
    fn default() -> Self {
        Self {
            token_scope: TokenScope::Project,
            domain_name: "Default".to_string(),
            tenant_name: None,
            tenant_domain_id: "default".to_string(),
        }
    }
}

impl ScopeOptions {
    pub fn with_tenant(mut self, tenant_name: impl Into<String>) -> Self {
        self.tenant_name = Some(tenant_name.into());
        self
    }

    pub fn with_scope(mut self, scope: TokenScope) -> Self {
        self.token_scope = scope;
        self
    }

    pub fn with_domain(mut self, domain_name: impl Into<String>) -> Self {
        self.domain_name = domain_name.into();
        self
    }

    pub fn with_tenant_domain_id(mut self, tenant_domain_id: impl Into<String>) -> Self {
        self.tenant_domain_id = tenant_domain_id.into();
        self
    }
}
