//! Service catalog parsing and endpoint resolution

use crate::error::{CloudError, Result};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

/// Header carrying the forced microversion
pub const MICROVERSION_HEADER: &str = "OpenStack-API-Version";

/// Which endpoint of a service to talk to
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EndpointInterface {
    #[default]
    Public,
    Internal,
    Admin,
}

impl EndpointInterface {
    fn from_v3(value: &str) -> Option<Self> {
        match value {
            "public" => Some(EndpointInterface::Public),
            "internal" => Some(EndpointInterface::Internal),
            "admin" => Some(EndpointInterface::Admin),
            _ => None,
        }
    }

    /// Key used by v1/v2 catalogs for this interface's URL
    fn url_key(&self) -> &'static str {
        match self {
            EndpointInterface::Public => "publicURL",
            EndpointInterface::Internal => "internalURL",
            EndpointInterface::Admin => "adminURL",
        }
    }
}

impl fmt::Display for EndpointInterface {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EndpointInterface::Public => write!(f, "public"),
            EndpointInterface::Internal => write!(f, "internal"),
            EndpointInterface::Admin => write!(f, "admin"),
        }
    }
}

impl std::str::FromStr for EndpointInterface {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        EndpointInterface::from_v3(s).ok_or_else(|| format!("unknown endpoint interface: {}", s))
    }
}

/// Shape of the raw catalog produced by a handshake
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CatalogFormat {
    /// `{"cloudServers": [{"region", "publicURL", ...}], ...}`
    KeystoneV1,
    /// `[{"type", "name", "endpoints": [{"region", "publicURL", ...}]}]`
    KeystoneV2,
    /// `[{"type", "name", "endpoints": [{"region", "interface", "url"}]}]`
    KeystoneV3,
    /// Already a list of serialized [`ServiceCatalogEntry`]
    Flat,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceCatalogEntry {
    pub service_type: String,
    pub service_name: String,
    pub region: Option<String>,
    #[serde(default)]
    pub interface: EndpointInterface,
    pub url: String,
}

/// User overrides applied on top of provider defaults
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EndpointSelector {
    pub base_url: Option<String>,
    pub service_type: Option<String>,
    pub service_name: Option<String>,
    pub region: Option<String>,
    pub microversion: Option<String>,
    pub auth_token: Option<String>,
    pub interface: Option<EndpointInterface>,
}

impl EndpointSelector {
    /// A forced token without a forced base URL cannot be used
    pub fn validate(&self) -> Result<()> {
        if self.auth_token.is_some() && self.base_url.is_none() {
            return Err(CloudError::Configuration(
                "a forced auth token requires a forced base URL".to_string(),
            ));
        }
        if let Some(microversion) = &self.microversion {
            microversion.parse::<Microversion>()?;
        }
        Ok(())
    }

    pub fn effective_service_type<'a>(&'a self, default: &'a str) -> &'a str {
        self.service_type.as_deref().unwrap_or(default)
    }
}

/// Parsed list of endpoints, in source order
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ServiceCatalog {
    entries: Vec<ServiceCatalogEntry>,
}

impl ServiceCatalog {
    pub fn new(entries: Vec<ServiceCatalogEntry>) -> Self {
        Self { entries }
    }

    pub fn parse(format: CatalogFormat, raw: &Value) -> Result<Self> {
        let entries = match format {
            CatalogFormat::KeystoneV1 => parse_v1(raw)?,
            CatalogFormat::KeystoneV2 => parse_v2(raw)?,
            CatalogFormat::KeystoneV3 => parse_v3(raw)?,
            CatalogFormat::Flat => serde_json::from_value(raw.clone()).map_err(|e| {
                CloudError::MalformedResponse(format!("Invalid service catalog: {}", e))
            })?,
        };
        tracing::debug!("Parsed service catalog with {} endpoints", entries.len());
        Ok(Self { entries })
    }

    pub fn entries(&self) -> &[ServiceCatalogEntry] {
        &self.entries
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Resolve the URL to use for a service
    ///
    /// A forced base URL short-circuits the lookup. Otherwise the selector's
    /// overrides are laid over the given defaults, entries are filtered by
    /// type, name and interface, and an entry in the wanted region wins over
    /// the first match.
    pub fn get_endpoint(
        &self,
        selector: &EndpointSelector,
        service_type: &str,
        service_name: Option<&str>,
        region: Option<&str>,
    ) -> Result<String> {
        if let Some(base_url) = &selector.base_url {
            return Ok(base_url.clone());
        }

        let service_type = selector.service_type.as_deref().unwrap_or(service_type);
        let service_name = selector.service_name.as_deref().or(service_name);
        let region = selector.region.as_deref().or(region);
        let interface = selector.interface.unwrap_or_default();

        let matches: Vec<&ServiceCatalogEntry> = self
            .entries
            .iter()
            .filter(|e| e.service_type == service_type)
            .filter(|e| service_name.is_none_or(|name| e.service_name == name))
            .filter(|e| e.interface == interface)
            .collect();

        let in_region = region.and_then(|region| {
            matches
                .iter()
                .find(|e| e.region.as_deref() == Some(region))
                .copied()
        });

        match in_region.or_else(|| matches.first().copied()) {
            Some(entry) => Ok(entry.url.clone()),
            None => Err(CloudError::EndpointNotFound {
                service_type: service_type.to_string(),
                service_name: service_name.map(str::to_string),
                region: region.map(str::to_string),
            }),
        }
    }

    pub fn service_types(&self) -> Vec<&str> {
        let mut types: Vec<&str> = Vec::new();
        for entry in &self.entries {
            if !types.contains(&entry.service_type.as_str()) {
                types.push(&entry.service_type);
            }
        }
        types
    }

    pub fn service_names(&self, service_type: Option<&str>) -> Vec<&str> {
        let mut names: Vec<&str> = Vec::new();
        for entry in self
            .entries
            .iter()
            .filter(|e| service_type.is_none_or(|t| e.service_type == t))
        {
            if !names.contains(&entry.service_name.as_str()) {
                names.push(&entry.service_name);
            }
        }
        names
    }

    pub fn regions(&self, service_type: Option<&str>) -> Vec<&str> {
        let mut regions: Vec<&str> = Vec::new();
        for region in self
            .entries
            .iter()
            .filter(|e| service_type.is_none_or(|t| e.service_type == t))
            .filter_map(|e| e.region.as_deref())
        {
            if !regions.contains(&region) {
                regions.push(region);
            }
        }
        regions
    }

    /// Public URLs of a service, in catalog order
    pub fn public_urls(&self, service_type: &str, service_name: Option<&str>) -> Vec<&str> {
        self.entries
            .iter()
            .filter(|e| e.service_type == service_type)
            .filter(|e| service_name.is_none_or(|n| e.service_name == n))
            .filter(|e| e.interface == EndpointInterface::Public)
            .map(|e| e.url.as_str())
            .collect()
    }
}

fn malformed(what: &str) -> CloudError {
    CloudError::MalformedResponse(format!("Invalid service catalog: {}", what))
}

fn v1_service_type(name: &str) -> &str {
    match name {
        "cloudServers" | "cloudServersOpenStack" => "compute",
        "cloudFiles" | "cloudFilesCDN" => "object-store",
        other => other,
    }
}

fn string_field(value: &Value, key: &str) -> Option<String> {
    value.get(key).and_then(|v| v.as_str()).map(str::to_string)
}

/// Entries for every interface URL present on a v1/v2 endpoint
fn legacy_endpoint_entries(
    service_type: &str,
    service_name: &str,
    endpoint: &Value,
    out: &mut Vec<ServiceCatalogEntry>,
) {
    let region = string_field(endpoint, "region");
    for interface in [
        EndpointInterface::Public,
        EndpointInterface::Internal,
        EndpointInterface::Admin,
    ] {
        if let Some(url) = string_field(endpoint, interface.url_key()) {
            out.push(ServiceCatalogEntry {
                service_type: service_type.to_string(),
                service_name: service_name.to_string(),
                region: region.clone(),
                interface,
                url,
            });
        }
    }
}

fn parse_v1(raw: &Value) -> Result<Vec<ServiceCatalogEntry>> {
    let services = raw.as_object().ok_or_else(|| malformed("expected an object"))?;

    let mut entries = Vec::new();
    for (name, endpoints) in services {
        let endpoints = endpoints
            .as_array()
            .ok_or_else(|| malformed("service endpoints must be a list"))?;
        for endpoint in endpoints {
            legacy_endpoint_entries(v1_service_type(name), name, endpoint, &mut entries);
        }
    }
    Ok(entries)
}

fn parse_v2(raw: &Value) -> Result<Vec<ServiceCatalogEntry>> {
    let services = raw.as_array().ok_or_else(|| malformed("expected a list"))?;

    let mut entries = Vec::new();
    for service in services {
        let service_type =
            string_field(service, "type").ok_or_else(|| malformed("service without type"))?;
        let service_name = string_field(service, "name").unwrap_or_default();
        let Some(endpoints) = service.get("endpoints").and_then(|e| e.as_array()) else {
            continue;
        };
        for endpoint in endpoints {
            legacy_endpoint_entries(&service_type, &service_name, endpoint, &mut entries);
        }
    }
    Ok(entries)
}

fn parse_v3(raw: &Value) -> Result<Vec<ServiceCatalogEntry>> {
    let services = raw.as_array().ok_or_else(|| malformed("expected a list"))?;

    let mut entries = Vec::new();
    for service in services {
        let service_type =
            string_field(service, "type").ok_or_else(|| malformed("service without type"))?;
        let service_name = string_field(service, "name").unwrap_or_default();
        let Some(endpoints) = service.get("endpoints").and_then(|e| e.as_array()) else {
            continue;
        };
        for endpoint in endpoints {
            let url =
                string_field(endpoint, "url").ok_or_else(|| malformed("endpoint without url"))?;
            let interface = endpoint
                .get("interface")
                .and_then(|i| i.as_str())
                .and_then(EndpointInterface::from_v3)
                .unwrap_or_default();
            let region =
                string_field(endpoint, "region").or_else(|| string_field(endpoint, "region_id"));
            entries.push(ServiceCatalogEntry {
                service_type: service_type.clone(),
                service_name: service_name.clone(),
                region,
                interface,
                url,
            });
        }
    }
    Ok(entries)
}

/// Forced API microversion, e.g. `compute 2.60`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Microversion {
    pub service: String,
    pub version: String,
}

impl Microversion {
    /// Header value when the effective service type belongs to this
    /// microversion's service family
    pub fn header_for(&self, effective_service_type: &str) -> Option<String> {
        effective_service_type
            .starts_with(&self.service)
            .then(|| self.to_string())
    }
}

impl std::str::FromStr for Microversion {
    type Err = CloudError;

    fn from_str(s: &str) -> Result<Self> {
        let parts: Vec<&str> = s.split_whitespace().collect();
        match parts.as_slice() {
            [service, version] => Ok(Self {
                service: service.to_string(),
                version: version.to_string(),
            }),
            [version] => Ok(Self {
                service: "compute".to_string(),
                version: version.to_string(),
            }),
            _ => Err(CloudError::Configuration(format!(
                "Invalid microversion format '{}': expected 'servicename X.XX'",
                s
            ))),
        }
    }
}

impl fmt::Display for Microversion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.service, self.version)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn v3_catalog() -> ServiceCatalog {
        let raw = json!([
            {
                "type": "compute",
                "name": "nova",
                "endpoints": [
                    {
                        "region": "RegionOne",
                        "interface": "public",
                        "url": "https://nova-one.example.com/v2.1"
                    },
                    {
                        "region": "RegionOne",
                        "interface": "internal",
                        "url": "http://nova-one.internal/v2.1"
                    },
                    {
                        "region": "RegionTwo",
                        "interface": "public",
                        "url": "https://nova-two.example.com/v2.1"
                    }
                ]
            },
            {
                "type": "object-store",
                "name": "swift",
                "endpoints": [
                    {
                        "region_id": "RegionOne",
                        "interface": "public",
                        "url": "https://swift.example.com/v1/AUTH_demo"
                    }
                ]
            }
        ]);
        ServiceCatalog::parse(CatalogFormat::KeystoneV3, &raw).unwrap()
    }

    #[test]
    fn test_parse_v3_preserves_order() {
        let catalog = v3_catalog();
        assert_eq!(catalog.entries().len(), 4);
        assert_eq!(catalog.entries()[0].url, "https://nova-one.example.com/v2.1");
        assert_eq!(catalog.entries()[1].interface, EndpointInterface::Internal);
        assert_eq!(catalog.entries()[3].region.as_deref(), Some("RegionOne"));
        assert_eq!(catalog.service_types(), vec!["compute", "object-store"]);
        assert_eq!(catalog.regions(Some("compute")), vec!["RegionOne", "RegionTwo"]);
    }

    #[test]
    fn test_region_override_prefers_matching_region() {
        let catalog = v3_catalog();
        let selector = EndpointSelector {
            region: Some("RegionTwo".to_string()),
            ..Default::default()
        };
        let url = catalog
            .get_endpoint(&selector, "compute", Some("nova"), Some("RegionOne"))
            .unwrap();
        assert_eq!(url, "https://nova-two.example.com/v2.1");
    }

    #[test]
    fn test_unknown_region_falls_back_to_first_match() {
        let catalog = v3_catalog();
        let url = catalog
            .get_endpoint(
                &EndpointSelector::default(),
                "compute",
                Some("nova"),
                Some("RegionNine"),
            )
            .unwrap();
        assert_eq!(url, "https://nova-one.example.com/v2.1");
    }

    #[test]
    fn test_no_type_name_match_is_endpoint_not_found() {
        let catalog = v3_catalog();
        let err = catalog
            .get_endpoint(&EndpointSelector::default(), "compute", Some("cinder"), None)
            .unwrap_err();
        assert!(matches!(err, CloudError::EndpointNotFound { .. }));

        let err = catalog
            .get_endpoint(&EndpointSelector::default(), "dns", None, None)
            .unwrap_err();
        assert!(matches!(err, CloudError::EndpointNotFound { .. }));
    }

    #[test]
    fn test_forced_base_url_skips_catalog() {
        let catalog = ServiceCatalog::default();
        let selector = EndpointSelector {
            base_url: Some("https://forced.example.com/v2".to_string()),
            ..Default::default()
        };
        let url = catalog
            .get_endpoint(&selector, "compute", Some("nova"), None)
            .unwrap();
        assert_eq!(url, "https://forced.example.com/v2");
    }

    #[test]
    fn test_service_type_and_interface_overrides() {
        let catalog = v3_catalog();
        let selector = EndpointSelector {
            service_type: Some("object-store".to_string()),
            service_name: Some("swift".to_string()),
            ..Default::default()
        };
        let url = catalog
            .get_endpoint(&selector, "compute", Some("nova"), None)
            .unwrap();
        assert_eq!(url, "https://swift.example.com/v1/AUTH_demo");

        let selector = EndpointSelector {
            interface: Some(EndpointInterface::Internal),
            ..Default::default()
        };
        let url = catalog
            .get_endpoint(&selector, "compute", Some("nova"), None)
            .unwrap();
        assert_eq!(url, "http://nova-one.internal/v2.1");
    }

    #[test]
    fn test_parse_v2_expands_interfaces() {
        let raw = json!([
            {
                "type": "compute",
                "name": "nova",
                "endpoints": [{
                    "region": "RegionOne",
                    "publicURL": "https://nova.example.com/v2/1337",
                    "internalURL": "http://nova.internal/v2/1337"
                }]
            },
            {"type": "image", "name": "glance"}
        ]);
        let catalog = ServiceCatalog::parse(CatalogFormat::KeystoneV2, &raw).unwrap();
        assert_eq!(catalog.entries().len(), 2);
        assert_eq!(
            catalog.public_urls("compute", None),
            vec!["https://nova.example.com/v2/1337"]
        );
    }

    #[test]
    fn test_parse_v1_maps_service_types() {
        let raw = json!({
            "cloudServers": [{"publicURL": "https://servers.api.example.com/v1.0/slug"}],
            "cloudFiles": [{
                "region": "ORD",
                "publicURL": "https://storage.example.com/v1/MossoCloudFS"
            }]
        });
        let catalog = ServiceCatalog::parse(CatalogFormat::KeystoneV1, &raw).unwrap();
        let url = catalog
            .get_endpoint(
                &EndpointSelector::default(),
                "object-store",
                Some("cloudFiles"),
                Some("ORD"),
            )
            .unwrap();
        assert_eq!(url, "https://storage.example.com/v1/MossoCloudFS");
        assert_eq!(catalog.service_names(Some("compute")), vec!["cloudServers"]);
    }

    #[test]
    fn test_parse_rejects_wrong_shape() {
        assert!(matches!(
            ServiceCatalog::parse(CatalogFormat::KeystoneV3, &json!({"not": "a list"})),
            Err(CloudError::MalformedResponse(_))
        ));
    }

    #[test]
    fn test_microversion_with_service() {
        let mv: Microversion = "compute 2.60".parse().unwrap();
        assert_eq!(mv.header_for("compute").as_deref(), Some("compute 2.60"));
        assert_eq!(mv.header_for("volumev3"), None);
    }

    #[test]
    fn test_microversion_defaults_to_compute() {
        let mv: Microversion = "2.60".parse().unwrap();
        assert_eq!(mv.service, "compute");
        assert_eq!(mv.header_for("compute").as_deref(), Some("compute 2.60"));
    }

    #[test]
    fn test_microversion_prefix_match_on_service_family() {
        let mv: Microversion = "volume 3.59".parse().unwrap();
        assert_eq!(mv.header_for("volumev3").as_deref(), Some("volume 3.59"));
        assert_eq!(mv.header_for("compute"), None);
    }

    #[test]
    fn test_microversion_invalid_token_count() {
        assert!(matches!(
            "a b c".parse::<Microversion>(),
            Err(CloudError::Configuration(_))
        ));
        assert!(matches!(
            "   ".parse::<Microversion>(),
            Err(CloudError::Configuration(_))
        ));
    }

    #[test]
    fn test_selector_forced_token_requires_base_url() {
        let selector = EndpointSelector {
            auth_token: Some("preset-auth-token".to_string()),
            ..Default::default()
        };
        assert!(matches!(
            selector.validate(),
            Err(CloudError::Configuration(_))
        ));
    }
}
