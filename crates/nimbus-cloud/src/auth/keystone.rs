//! OpenStack Identity (Keystone) handshakes

use super::{parse_expiry, require_project_tenant};
use crate::catalog::CatalogFormat;
use crate::credentials::{Credentials, ScopeOptions, TokenScope};
use crate::error::{CloudError, Result};
use crate::response::error_message;
use crate::store::AuthContext;
use crate::transport::{Headers, HttpRequest, HttpResponse, Method, Transport};
use serde::Deserialize;
use serde_json::{Value, json};

pub const AUTH_TOKEN_HEADER: &str = "X-Auth-Token";
const SUBJECT_TOKEN_HEADER: &str = "X-Subject-Token";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeystoneVersion {
    V1,
    V2Password,
    V2ApiKey,
    V3Password,
    V3Token,
    V3ApplicationCredential,
}

#[derive(Debug, Clone)]
pub struct KeystoneHandshake {
    version: KeystoneVersion,
}

// ============ Response Types ============

#[derive(Debug, Deserialize)]
struct TokenRef {
    id: String,
    #[serde(default)]
    expires: Option<String>,
}

#[derive(Debug, Deserialize)]
struct V1Response {
    auth: V1Auth,
}

#[derive(Debug, Deserialize)]
struct V1Auth {
    token: TokenRef,
    #[serde(rename = "serviceCatalog", default)]
    service_catalog: Option<Value>,
}

#[derive(Debug, Deserialize)]
struct V2Response {
    access: V2Access,
}

#[derive(Debug, Deserialize)]
struct V2Access {
    token: TokenRef,
    #[serde(rename = "serviceCatalog", default)]
    service_catalog: Option<Value>,
    #[serde(default)]
    user: Option<Value>,
}

#[derive(Debug, Deserialize)]
struct V3Response {
    token: V3Token,
}

#[derive(Debug, Deserialize)]
struct V3Token {
    #[serde(default)]
    expires_at: Option<String>,
    #[serde(default)]
    catalog: Option<Value>,
    #[serde(default)]
    user: Option<Value>,
}

impl KeystoneHandshake {
    pub fn new(version: KeystoneVersion) -> Self {
        Self { version }
    }

    pub fn version(&self) -> KeystoneVersion {
        self.version
    }

    pub fn catalog_format(&self) -> CatalogFormat {
        match self.version {
            KeystoneVersion::V1 => CatalogFormat::KeystoneV1,
            KeystoneVersion::V2Password | KeystoneVersion::V2ApiKey => CatalogFormat::KeystoneV2,
            _ => CatalogFormat::KeystoneV3,
        }
    }

    pub fn request_headers(&self, token: &str) -> Headers {
        Headers::new()
            .with(AUTH_TOKEN_HEADER, token)
            .with("Accept", "application/json")
    }

    pub(super) fn validate(&self, scope: &ScopeOptions) -> Result<()> {
        match self.version {
            KeystoneVersion::V3Password | KeystoneVersion::V3Token => require_project_tenant(scope),
            _ => Ok(()),
        }
    }

    pub async fn perform(
        &self,
        transport: &dyn Transport,
        auth_url: &str,
        credentials: &Credentials,
        scope: &ScopeOptions,
    ) -> Result<AuthContext> {
        let (url, body) = match self.version {
            KeystoneVersion::V1 => (
                auth_endpoint(auth_url, "v1.1", "/auth"),
                v1_body(credentials),
            ),
            KeystoneVersion::V2Password | KeystoneVersion::V2ApiKey => (
                auth_endpoint(auth_url, "v2.0", "/tokens"),
                self.v2_body(credentials, scope),
            ),
            _ => (
                auth_endpoint(auth_url, "v3", "/auth/tokens"),
                self.v3_body(credentials, scope),
            ),
        };

        let request = HttpRequest::new(Method::Post, url)
            .with_headers(
                Headers::new()
                    .with("Content-Type", "application/json")
                    .with("Accept", "application/json"),
            )
            .with_body(body.to_string());

        let response = transport.send(request).await?;
        check_status(&response)?;

        match self.version {
            KeystoneVersion::V1 => parse_v1(&response),
            KeystoneVersion::V2Password | KeystoneVersion::V2ApiKey => parse_v2(&response),
            _ => parse_v3(&response),
        }
    }

    fn v2_body(&self, credentials: &Credentials, scope: &ScopeOptions) -> Value {
        let mut auth = if self.version == KeystoneVersion::V2ApiKey {
            json!({
                "RAX-KSKEY:apiKeyCredentials": {
                    "username": credentials.user_id(),
                    "apiKey": credentials.secret(),
                }
            })
        } else {
            json!({
                "passwordCredentials": {
                    "username": credentials.user_id(),
                    "password": credentials.secret(),
                }
            })
        };
        if let Some(tenant) = &scope.tenant_name {
            auth["tenantName"] = json!(tenant);
        }
        json!({ "auth": auth })
    }

    fn v3_body(&self, credentials: &Credentials, scope: &ScopeOptions) -> Value {
        let identity = match self.version {
            KeystoneVersion::V3Token => json!({
                "methods": ["token"],
                "token": {"id": credentials.secret()},
            }),
            KeystoneVersion::V3ApplicationCredential => json!({
                "methods": ["application_credential"],
                "application_credential": {
                    "id": credentials.user_id(),
                    "secret": credentials.secret(),
                },
            }),
            _ => json!({
                "methods": ["password"],
                "password": {
                    "user": {
                        "name": credentials.user_id(),
                        "domain": {"name": scope.domain_name},
                        "password": credentials.secret(),
                    }
                },
            }),
        };

        let mut auth = json!({ "identity": identity });
        // application credentials carry their own scope
        if self.version != KeystoneVersion::V3ApplicationCredential
            && let Some(scope) = v3_scope(scope)
        {
            auth["scope"] = scope;
        }
        json!({ "auth": auth })
    }
}

fn v1_body(credentials: &Credentials) -> Value {
    json!({
        "credentials": {
            "username": credentials.user_id(),
            "key": credentials.secret(),
        }
    })
}

fn v3_scope(scope: &ScopeOptions) -> Option<Value> {
    match scope.token_scope {
        TokenScope::Project => Some(json!({
            "project": {
                "name": scope.tenant_name,
                "domain": {"id": scope.tenant_domain_id},
            }
        })),
        TokenScope::Domain => Some(json!({
            "domain": {"name": scope.domain_name}
        })),
        TokenScope::Unscoped => None,
    }
}

/// `{auth_url}/{version}{path}`, without doubling a version already present
fn auth_endpoint(auth_url: &str, version: &str, path: &str) -> String {
    let base = auth_url.trim_end_matches('/');
    if base.ends_with(&format!("/{}", version)) {
        format!("{}{}", base, path)
    } else {
        format!("{}/{}{}", base, version, path)
    }
}

fn check_status(response: &HttpResponse) -> Result<()> {
    match response.status {
        200..=299 => Ok(()),
        401 | 403 => Err(CloudError::InvalidCredentials(error_message(response))),
        status => Err(CloudError::MalformedResponse(format!(
            "Identity service returned HTTP {}: {}",
            status,
            error_message(response)
        ))),
    }
}

fn decode<T: serde::de::DeserializeOwned>(response: &HttpResponse) -> Result<T> {
    serde_json::from_slice(&response.body).map_err(|e| {
        CloudError::MalformedResponse(format!("Unexpected identity response: {}", e))
    })
}

fn expiry(value: Option<&str>) -> Result<Option<chrono::DateTime<chrono::Utc>>> {
    value.map(parse_expiry).transpose()
}

fn parse_v1(response: &HttpResponse) -> Result<AuthContext> {
    let body: V1Response = decode(response)?;
    let mut context = AuthContext::new(body.auth.token.id)
        .with_catalog(body.auth.service_catalog.unwrap_or_else(|| json!({})));
    context.expires = expiry(body.auth.token.expires.as_deref())?;
    Ok(context)
}

fn parse_v2(response: &HttpResponse) -> Result<AuthContext> {
    let body: V2Response = decode(response)?;
    let mut context = AuthContext::new(body.access.token.id)
        .with_catalog(body.access.service_catalog.unwrap_or_else(|| json!([])));
    context.expires = expiry(body.access.token.expires.as_deref())?;
    context.user = body.access.user;
    Ok(context)
}

fn parse_v3(response: &HttpResponse) -> Result<AuthContext> {
    let token = response
        .headers
        .get(SUBJECT_TOKEN_HEADER)
        .filter(|t| !t.is_empty())
        .ok_or_else(|| {
            CloudError::MalformedResponse(format!("Missing {} header", SUBJECT_TOKEN_HEADER))
        })?
        .to_string();

    let body: V3Response = decode(response)?;
    let mut context =
        AuthContext::new(token).with_catalog(body.token.catalog.unwrap_or_else(|| json!([])));
    context.expires = expiry(body.token.expires_at.as_deref())?;
    context.user = body.token.user;
    Ok(context)
}
