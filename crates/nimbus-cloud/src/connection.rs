//! Connection info resolved from a base URL

use crate::error::{CloudError, Result};
use url::Url;

/// Where requests for one service endpoint go
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectionInfo {
    pub scheme: String,
    pub host: String,
    pub port: u16,
    /// Path of the base URL without a trailing slash (may be empty)
    pub path_prefix: String,
}

impl ConnectionInfo {
    pub fn from_url(base_url: &str) -> Result<Self> {
        let url = Url::parse(base_url.trim())
            .map_err(|e| CloudError::Configuration(format!("Invalid URL '{}': {}", base_url, e)))?;

        let host = url
            .host_str()
            .ok_or_else(|| CloudError::Configuration(format!("URL has no host: {}", base_url)))?
            .to_string();
        let port = url.port_or_known_default().ok_or_else(|| {
            CloudError::Configuration(format!("Cannot determine port for: {}", base_url))
        })?;

        Ok(Self {
            scheme: url.scheme().to_string(),
            host,
            port,
            path_prefix: url.path().trim_end_matches('/').to_string(),
        })
    }

    pub fn is_secure(&self) -> bool {
        self.scheme == "https"
    }

    /// Two infos share a connection when scheme, host and port agree
    pub fn same_connection(&self, other: &ConnectionInfo) -> bool {
        self.scheme == other.scheme && self.host == other.host && self.port == other.port
    }

    pub fn origin(&self) -> String {
        let default_port = match self.scheme.as_str() {
            "https" => 443,
            "http" => 80,
            _ => 0,
        };
        if self.port == default_port {
            format!("{}://{}", self.scheme, self.host)
        } else {
            format!("{}://{}:{}", self.scheme, self.host, self.port)
        }
    }

    /// Build the full URL for an action path or an absolute href
    pub fn url_for(&self, action: &str) -> String {
        if let Ok(url) = Url::parse(action)
            && url.has_host()
        {
            let mut path = url.path().to_string();
            if let Some(query) = url.query() {
                path.push('?');
                path.push_str(query);
            }
            return format!("{}{}", self.origin(), path);
        }

        if action.is_empty() {
            return format!("{}{}", self.origin(), self.path_prefix);
        }
        if action.starts_with('/') {
            format!("{}{}{}", self.origin(), self.path_prefix, action)
        } else {
            format!("{}{}/{}", self.origin(), self.path_prefix, action)
        }
    }
}
