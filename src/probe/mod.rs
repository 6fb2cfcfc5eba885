//! Probe module for HTTP monitoring.
//!
//! Performs one instrumented request per check and records how long each
//! network phase took.

mod http;
mod models;
mod proxy;
mod trace;
mod transport;

pub use http::*;
pub use models::*;
pub use proxy::*;
pub use trace::*;
pub use transport::*;

use std::time::Duration;
use thiserror::Error;

/// Probe error types.
///
/// These never leave a check: the tracer logs them and records status 0.
#[derive(Error, Debug)]
pub enum ProbeError {
    #[error("probe timed out after {0:?}")]
    Timeout(Duration),
    #[error("dns lookup failed: {0}")]
    Dns(String),
    #[error("connect failed: {0}")]
    Connect(String),
    #[error("tls error: {0}")]
    Tls(String),
    #[error("http error: {0}")]
    Http(String),
    #[error("invalid request: {0}")]
    InvalidRequest(String),
    #[error("proxy error: {0}")]
    Proxy(String),
    #[error("stopped after {0} redirects")]
    TooManyRedirects(usize),
}
