//! Nimbus session core
//!
//! Authenticated sessions and long-running operations for multi-tenant
//! cloud APIs. Provider clients build on this crate for token lifecycle,
//! endpoint resolution and task polling; resource schemas live elsewhere.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────┐
//! │                   CloudClient                    │
//! └─────────────────┬───────────────────────────────┘
//!                   │
//! ┌─────────────────▼───────────────────────────────┐
//! │  ┌──────────────┐        ┌──────────────────┐   │
//! │  │  TaskWaiter  │ ─────▶ │ RequestExecutor  │   │
//! │  └──────────────┘        └────────┬─────────┘   │
//! │          ┌────────────────────────┼────────┐    │
//! │  ┌───────▼──────┐  ┌──────────────▼─┐  ┌───▼──┐ │
//! │  │  Negotiator  │  │ ServiceCatalog │  │ Conn │ │
//! │  └───────┬──────┘  └────────────────┘  └──────┘ │
//! │  ┌───────▼─────────┐                            │
//! │  │ CredentialStore │                            │
//! │  └─────────────────┘                            │
//! └───────┬─────────────────────────────────────────┘
//!         │
//! ┌───────▼───────┐
//! │   Transport   │
//! └───────────────┘
//! ```
//!
//! # Supported protocols
//!
//! - **Keystone**: 1.1, 2.0 (password / API key), 3.x (password / token /
//!   application credential)
//! - **vCloud Director**: 0.8, 1.5, 5.5

pub mod auth;
pub mod catalog;
pub mod client;
pub mod clock;
pub mod connection;
pub mod credentials;
pub mod error;
pub mod executor;
pub mod response;
pub mod store;
pub mod task;
pub mod transport;

// Re-exports
pub use auth::{AuthProtocol, Handshake, Negotiator, NegotiatorOptions};
pub use catalog::{
    CatalogFormat, EndpointInterface, EndpointSelector, Microversion, ServiceCatalog,
    ServiceCatalogEntry,
};
pub use client::{ClientConfig, CloudClient};
pub use clock::{Clock, ManualClock, SystemClock};
pub use connection::ConnectionInfo;
pub use credentials::{Credentials, ScopeOptions, TokenScope};
pub use error::{CloudError, ErrorKind, Result};
pub use executor::{EndpointDefaults, RequestExecutor};
pub use response::ResponseBody;
pub use store::{AuthContext, CacheKey, CredentialStore, FileStore, MemoryStore};
pub use task::{
    AsyncTask, DEFAULT_POLL_INTERVAL, DEFAULT_TASK_TIMEOUT, TaskFormat, TaskState, TaskStatus,
    TaskWaiter,
};
pub use transport::{
    Headers, HttpRequest, HttpResponse, Method, ReqwestTransport, Transport, TransportError,
};
