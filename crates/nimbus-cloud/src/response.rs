//! Content-type dispatch for response bodies
//!
//! The core only needs to know whether a body is decodable; it looks inside
//! decodable bodies to pull out provider error messages.

use crate::error::{CloudError, Result};
use crate::transport::HttpResponse;
use quick_xml::Reader;
use quick_xml::events::Event;

#[derive(Debug, Clone, PartialEq)]
pub enum ResponseBody {
    Empty,
    Json(serde_json::Value),
    /// Well-formed XML document, kept as text
    Xml(String),
    /// Anything we do not decode
    Raw(Vec<u8>),
}

fn has_content_type(response: &HttpResponse, needle: &str) -> bool {
    response
        .content_type()
        .map(|ct| ct.to_ascii_lowercase().contains(needle))
        .unwrap_or(false)
}

impl ResponseBody {
    pub fn from_response(response: &HttpResponse) -> Result<Self> {
        if response.status == 204 || response.body.is_empty() {
            return Ok(ResponseBody::Empty);
        }

        if has_content_type(response, "json") {
            let value = serde_json::from_slice(&response.body)?;
            return Ok(ResponseBody::Json(value));
        }

        if has_content_type(response, "xml") {
            let text = String::from_utf8(response.body.clone()).map_err(|e| {
                CloudError::MalformedResponse(format!("Failed to parse XML: {}", e))
            })?;
            xml_texts(&text)?;
            return Ok(ResponseBody::Xml(text));
        }

        Ok(ResponseBody::Raw(response.body.clone()))
    }

    pub fn is_decodable(&self) -> bool {
        matches!(self, ResponseBody::Json(_) | ResponseBody::Xml(_))
    }
}

/// All non-empty text nodes of an XML document, in document order
fn xml_texts(xml: &str) -> Result<Vec<String>> {
    let mut reader = Reader::from_str(xml);
    reader.config_mut().trim_text(true);

    let mut texts = Vec::new();
    loop {
        match reader.read_event() {
            Ok(Event::Text(text)) => {
                let raw = String::from_utf8_lossy(&text.into_inner()).into_owned();
                let unescaped = quick_xml::escape::unescape(&raw)
                    .map(|s| s.into_owned())
                    .unwrap_or(raw);
                if !unescaped.is_empty() {
                    texts.push(unescaped);
                }
            }
            Ok(Event::Eof) => break,
            Ok(_) => {}
            Err(e) => {
                return Err(CloudError::MalformedResponse(format!(
                    "Failed to parse XML: {}",
                    e
                )));
            }
        }
    }
    Ok(texts)
}

/// Human-readable error text for a failed response
///
/// JSON faults of the shape `{"badRequest": {"message": ".."}}` yield their
/// messages joined by `;`; XML yields its text nodes joined by `; `; any
/// other body is passed through as text.
pub fn error_message(response: &HttpResponse) -> String {
    match ResponseBody::from_response(response) {
        Ok(ResponseBody::Json(value)) => {
            json_fault_message(&value).unwrap_or_else(|| value.to_string())
        }
        Ok(ResponseBody::Xml(text)) => xml_texts(&text)
            .map(|texts| texts.join("; "))
            .unwrap_or(text),
        Ok(ResponseBody::Empty) => String::new(),
        Ok(ResponseBody::Raw(_)) | Err(_) => response.text(),
    }
}

fn json_fault_message(value: &serde_json::Value) -> Option<String> {
    let object = value.as_object()?;
    let first = object.values().next()?;
    first.get("message")?;

    let messages: Vec<&str> = object
        .values()
        .filter_map(|fault| fault.get("message").and_then(|m| m.as_str()))
        .collect();
    Some(messages.join(";"))
}
