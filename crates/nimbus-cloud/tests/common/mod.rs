//! Shared fixtures for integration tests

#![allow(dead_code)]

use async_trait::async_trait;
use nimbus_cloud::{
    AuthContext, CacheKey, CredentialStore, HttpRequest, HttpResponse, MemoryStore, Transport,
    TransportError,
};
use parking_lot::Mutex;
use serde_json::json;
use std::collections::VecDeque;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

/// Transport that answers handshakes and service calls from separate queues
///
/// The last queued service response repeats once the queue runs dry.
#[derive(Default)]
pub struct MockTransport {
    auth: Mutex<VecDeque<HttpResponse>>,
    service: Mutex<VecDeque<HttpResponse>>,
    auth_requests: Mutex<Vec<HttpRequest>>,
    service_requests: Mutex<Vec<HttpRequest>>,
}

fn is_handshake(url: &str) -> bool {
    url.ends_with("/tokens") || url.ends_with("/api/sessions") || url.ends_with("/login")
}

impl MockTransport {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn push_auth(&self, response: HttpResponse) {
        self.auth.lock().push_back(response);
    }

    pub fn push_service(&self, response: HttpResponse) {
        self.service.lock().push_back(response);
    }

    pub fn auth_calls(&self) -> usize {
        self.auth_requests.lock().len()
    }

    pub fn service_calls(&self) -> usize {
        self.service_requests.lock().len()
    }

    pub fn last_service_request(&self) -> Option<HttpRequest> {
        self.service_requests.lock().last().cloned()
    }
}

#[async_trait]
impl Transport for MockTransport {
    async fn send(&self, request: HttpRequest) -> Result<HttpResponse, TransportError> {
        if is_handshake(&request.url) {
            self.auth_requests.lock().push(request);
            return self
                .auth
                .lock()
                .pop_front()
                .ok_or_else(|| TransportError::new("unexpected handshake"));
        }

        self.service_requests.lock().push(request);
        let mut service = self.service.lock();
        if service.len() > 1 {
            return service
                .pop_front()
                .ok_or_else(|| TransportError::new("no service response"));
        }
        service
            .front()
            .cloned()
            .ok_or_else(|| TransportError::new("no service response"))
    }
}

/// In-memory store that counts evictions
#[derive(Default)]
pub struct CountingStore {
    inner: MemoryStore,
    clears: AtomicUsize,
}

impl CountingStore {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn clears(&self) -> usize {
        self.clears.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl CredentialStore for CountingStore {
    async fn get(&self, key: &CacheKey) -> nimbus_cloud::Result<Option<AuthContext>> {
        self.inner.get(key).await
    }

    async fn put(&self, key: &CacheKey, context: AuthContext) -> nimbus_cloud::Result<()> {
        self.inner.put(key, context).await
    }

    async fn clear(&self, key: &CacheKey) -> nimbus_cloud::Result<()> {
        self.clears.fetch_add(1, Ordering::SeqCst);
        self.inner.clear(key).await
    }
}

/// Keystone v2 token response with a single compute endpoint
pub fn v2_token(token: &str, expires: &str) -> HttpResponse {
    HttpResponse::json(
        200,
        &json!({
            "access": {
                "token": {
                    "id": token,
                    "expires": expires,
                    "tenant": {"id": "1337", "name": "demo"}
                },
                "serviceCatalog": [{
                    "type": "compute",
                    "name": "nova",
                    "endpoints": [{
                        "region": "RegionOne",
                        "publicURL": "https://compute.example.com/v2/1337"
                    }]
                }],
                "user": {"id": "u1", "name": "demo-user"}
            }
        }),
    )
}

/// vCloud task document
pub fn vcloud_task(status: &str) -> HttpResponse {
    HttpResponse::new(200)
        .with_header("Content-Type", "application/vnd.vmware.vcloud.task+xml")
        .with_body(format!(
            r#"<Task status="{}" href="https://vm.example.com/api/task/42" operation="Deploying"/>"#,
            status
        ))
}

pub fn vcloud_task_error(message: &str) -> HttpResponse {
    HttpResponse::new(200)
        .with_header("Content-Type", "application/vnd.vmware.vcloud.task+xml")
        .with_body(format!(
            r#"<Task status="error" href="https://vm.example.com/api/task/42"><Error message="{}" minorErrorCode="QUOTA"/></Task>"#,
            message
        ))
}
