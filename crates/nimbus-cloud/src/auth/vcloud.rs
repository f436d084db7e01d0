//! vCloud Director session login
//!
//! vCloud has no service catalog and never reports token expiry. The
//! session token stays valid until a 401 evicts it.

use crate::catalog::{CatalogFormat, EndpointInterface, ServiceCatalogEntry};
use crate::connection::ConnectionInfo;
use crate::credentials::Credentials;
use crate::error::{CloudError, Result};
use crate::response::error_message;
use crate::store::AuthContext;
use crate::transport::{Headers, HttpRequest, HttpResponse, Method, Transport};
use base64::Engine;
use serde::Deserialize;
use serde_json::json;

const VCLOUD_TOKEN_HEADER: &str = "x-vcloud-authorization";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VCloudVersion {
    V08,
    V15,
    V55,
}

impl VCloudVersion {
    fn accept(&self) -> &'static str {
        match self {
            VCloudVersion::V08 => "application/*+xml",
            VCloudVersion::V15 => "application/*+xml;version=1.5",
            VCloudVersion::V55 => "application/*+xml;version=5.5",
        }
    }

    fn login_path(&self) -> &'static str {
        match self {
            VCloudVersion::V08 => "/api/v0.8/login",
            VCloudVersion::V15 | VCloudVersion::V55 => "/api/sessions",
        }
    }
}

#[derive(Debug, Clone)]
pub struct VCloudHandshake {
    version: VCloudVersion,
}

/// `<OrgList><Org href=".." name=".."/></OrgList>` returned by the 0.8 login
#[derive(Debug, Deserialize)]
struct OrgList {
    #[serde(rename = "Org", default)]
    orgs: Vec<OrgRef>,
}

#[derive(Debug, Deserialize)]
struct OrgRef {
    #[serde(rename = "@href")]
    href: String,
    #[serde(rename = "@name", default)]
    name: Option<String>,
}

/// `<Session org=".." user="..">` returned by `/api/sessions`
#[derive(Debug, Deserialize)]
struct Session {
    #[serde(rename = "@org", default)]
    org: Option<String>,
    #[serde(rename = "@user", default)]
    user: Option<String>,
}

impl VCloudHandshake {
    pub fn new(version: VCloudVersion) -> Self {
        Self { version }
    }

    pub fn version(&self) -> VCloudVersion {
        self.version
    }

    pub fn request_headers(&self, token: &str) -> Headers {
        let headers = Headers::new().with("Accept", self.version.accept());
        match self.version {
            VCloudVersion::V08 => headers.with("Cookie", token),
            VCloudVersion::V15 | VCloudVersion::V55 => headers.with(VCLOUD_TOKEN_HEADER, token),
        }
    }

    fn login_headers(&self, credentials: &Credentials) -> Headers {
        let basic = base64::engine::general_purpose::STANDARD.encode(format!(
            "{}:{}",
            credentials.user_id(),
            credentials.secret()
        ));
        Headers::new()
            .with("Authorization", format!("Basic {}", basic))
            .with("Accept", self.version.accept())
    }

    pub async fn perform(
        &self,
        transport: &dyn Transport,
        auth_url: &str,
        credentials: &Credentials,
    ) -> Result<AuthContext> {
        let origin = ConnectionInfo::from_url(auth_url)?.origin();
        let url = format!("{}{}", origin, self.version.login_path());
        let request = HttpRequest::new(Method::Post, url)
            .with_headers(self.login_headers(credentials))
            .with_body(Vec::new());

        let response = transport.send(request).await?;
        match response.status {
            200..=299 => {}
            401 | 403 => return Err(CloudError::InvalidCredentials(error_message(&response))),
            status => {
                return Err(CloudError::MalformedResponse(format!(
                    "vCloud login returned HTTP {}: {}",
                    status,
                    error_message(&response)
                )));
            }
        }

        let token_header = match self.version {
            VCloudVersion::V08 => "set-cookie",
            VCloudVersion::V15 | VCloudVersion::V55 => VCLOUD_TOKEN_HEADER,
        };
        let token = response
            .headers
            .get(token_header)
            .filter(|t| !t.is_empty())
            .ok_or_else(|| {
                CloudError::InvalidCredentials(format!(
                    "login response carried no {}",
                    token_header
                ))
            })?
            .to_string();

        let user = match self.version {
            VCloudVersion::V08 => org_from_org_list(&response)?,
            VCloudVersion::V15 | VCloudVersion::V55 => org_from_session(&response)?,
        };

        let catalog = vec![ServiceCatalogEntry {
            service_type: "compute".to_string(),
            service_name: "vcloud".to_string(),
            region: None,
            interface: EndpointInterface::Public,
            url: format!("{}/api", origin),
        }];

        Ok(AuthContext::new(token)
            .with_user(user)
            .with_catalog(serde_json::to_value(catalog)?))
    }
}

fn body_text(response: &HttpResponse) -> Result<String> {
    String::from_utf8(response.body.clone())
        .map_err(|e| CloudError::MalformedResponse(format!("Failed to parse XML: {}", e)))
}

fn org_from_org_list(response: &HttpResponse) -> Result<serde_json::Value> {
    let list: OrgList = quick_xml::de::from_str(&body_text(response)?)
        .map_err(|e| CloudError::MalformedResponse(format!("Failed to parse XML: {}", e)))?;
    let org = list
        .orgs
        .into_iter()
        .next()
        .ok_or_else(|| CloudError::MalformedResponse("login response lists no Org".to_string()))?;

    let path = url::Url::parse(&org.href)
        .map(|u| u.path().to_string())
        .unwrap_or(org.href);
    Ok(json!({ "org": path, "org_name": org.name }))
}

fn org_from_session(response: &HttpResponse) -> Result<serde_json::Value> {
    let session: Session = quick_xml::de::from_str(&body_text(response)?)
        .map_err(|e| CloudError::MalformedResponse(format!("Failed to parse XML: {}", e)))?;
    Ok(json!({ "org_name": session.org, "user": session.user }))
}
