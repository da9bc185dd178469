//! Everything that talks to the source platform's API.

pub mod client;
pub mod extract;
pub mod record;
pub mod transport;

pub use client::{include_pattern, ApiClient, ApiQuery, Page};
pub use extract::{Extractor, SourceGraph};
pub use record::{Record, Reference, Relationship};
pub use transport::{HttpRequest, HttpResponse, HttpTransport, Method, ReqwestTransport, TransportError};
