//! CoAP request/response transport.
//!
//! # Data Flow
//! ```text
//! Probe
//!     → Transport::request(&Request)
//!     → context.rs (token + message id, coap-lite encode, UDP send)
//!     → receive task (decode, match token, complete pending exchange)
//!     → Response { code, payload }
//! ```
//!
//! # Design Decisions
//! - `Transport` is the only surface probes depend on; tests swap in mocks
//! - One shared context (one socket) serves every probe concurrently
//! - Wire encoding comes from coap-lite; no retransmission or congestion control
//! - Dropping a request future abandons the exchange

use std::fmt;
use std::future::Future;
use std::net::SocketAddr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

pub mod context;
pub mod uri;

pub use context::CoapContext;
pub use uri::{CoapUri, UriError};

/// Default CoAP UDP port.
pub const DEFAULT_PORT: u16 = 5683;

/// Request method.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Method {
    #[default]
    Get,
    Post,
    Put,
    Delete,
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Method::Get => "GET",
            Method::Post => "POST",
            Method::Put => "PUT",
            Method::Delete => "DELETE",
        };
        f.write_str(name)
    }
}

/// A request bound to a resolved peer, shared by every probe.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Request {
    pub method: Method,
    pub peer: SocketAddr,
    /// Uri-Path option values, one per segment.
    pub path: Vec<String>,
    /// Uri-Query option values, one per `&`-separated item.
    pub query: Vec<String>,
}

impl Request {
    /// Build a request for an already-resolved URI.
    pub fn new(method: Method, uri: &CoapUri, peer: SocketAddr) -> Self {
        Self {
            method,
            peer,
            path: uri.path().to_vec(),
            query: uri.query().to_vec(),
        }
    }
}

/// Raw CoAP response code, `class.detail` on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ResponseCode(pub u8);

impl ResponseCode {
    pub const CONTENT: ResponseCode = ResponseCode::new(2, 5);
    pub const NOT_FOUND: ResponseCode = ResponseCode::new(4, 4);

    pub const fn new(class: u8, detail: u8) -> Self {
        Self((class << 5) | (detail & 0x1f))
    }

    pub fn class(self) -> u8 {
        self.0 >> 5
    }

    pub fn detail(self) -> u8 {
        self.0 & 0x1f
    }

    pub fn is_success(self) -> bool {
        self.class() == 2
    }
}

impl fmt::Display for ResponseCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{:02}", self.class(), self.detail())
    }
}

/// A response delivered to the requester.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Response {
    pub code: ResponseCode,
    pub payload: Vec<u8>,
}

impl Response {
    /// Payload rendered for logs.
    pub fn payload_lossy(&self) -> String {
        String::from_utf8_lossy(&self.payload).into_owned()
    }
}

/// Errors a single request exchange can end with.
///
/// Deadline expiry is not a transport error; the probe enforces it.
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("socket error: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to encode request: {0}")]
    Encode(String),

    #[error("peer reset the exchange")]
    Reset,

    #[error("transport context closed")]
    Closed,
}

/// The request-issuing collaborator shared by all probes.
pub trait Transport: Send + Sync + 'static {
    /// Send one request and wait for its response.
    fn request(
        &self,
        request: &Request,
    ) -> impl Future<Output = Result<Response, TransportError>> + Send;
}
