//! # Transport Abstraction
//!
//! A minimal, async interface for exchanging HTTP messages.
//!
//! ## Philosophy
//!
//! - **Message-Oriented**: The transport moves requests and responses. It knows
//!   nothing about DTOs, codecs or operations.
//! - **Request-Response**: The fundamental interaction is "send a request, await
//!   its response". Retries, if any, live above this layer.
//! - **Cooperative Cancellation**: Implementations observe the token while they
//!   wait and never send a second message after it fires.

use tokio_util::sync::CancellationToken;

use crate::message::HttpRequest;
use crate::message::HttpResponse;

/// Errors that occur at the network/transport layer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Error {
    /// The peer is unreachable or the connection was dropped.
    ConnectionLost(String),
    /// The transport gave up waiting for a response.
    Timeout,
    /// The caller's cancellation token fired.
    Canceled,
    /// Generic I/O error or internal transport failure.
    Io(String),
}

impl std::fmt::Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::ConnectionLost(msg) => write!(f, "connection lost: {}", msg),
            Self::Timeout => write!(f, "request timed out"),
            Self::Canceled => write!(f, "request canceled"),
            Self::Io(msg) => write!(f, "I/O error: {}", msg),
        }
    }
}

impl std::error::Error for Error {}

pub type Result<T> = std::result::Result<T, Error>;

/// A mechanism to send an HTTP request and receive its response.
///
/// Object safe, so transports are shared as `Arc<dyn Transport>`.
#[async_trait::async_trait]
pub trait Transport: Send + Sync + 'static {
    /// Sends a request and waits for the response.
    ///
    /// # Invariants
    /// - Must return `Ok` for every response received, whatever its status.
    /// - Must return `Err(Error::Canceled)` promptly once `cancel` fires.
    async fn send(&self, request: HttpRequest, cancel: &CancellationToken) -> Result<HttpResponse>;
}

#[cfg(feature = "reqwest")]
pub use self::remote::ReqwestTransport;

#[cfg(feature = "reqwest")]
mod remote {
    use super::Error;
    use super::Result;
    use super::Transport;
    use crate::message::HttpRequest;
    use crate::message::HttpResponse;

    use tokio_util::sync::CancellationToken;

    /// Sends requests to a base URL over `reqwest`.
    #[derive(Debug, Clone)]
    pub struct ReqwestTransport {
        client: reqwest::Client,
        base: url::Url,
    }

    impl ReqwestTransport {
        /// `base` is prefixed to every request target, e.g. `http://localhost:8080/api`.
        pub fn new(base: &str) -> Result<Self> {
            Self::with_client(reqwest::Client::new(), base)
        }

        pub fn with_client(client: reqwest::Client, base: &str) -> Result<Self> {
            let base = url::Url::parse(base).map_err(|e| Error::Io(format!("invalid base url '{}': {}", base, e)))?;
            Ok(Self { client, base })
        }

        fn url_for(&self, request: &HttpRequest) -> Result<url::Url> {
            let joined = format!("{}{}", self.base.as_str().trim_end_matches('/'), request.target());
            url::Url::parse(&joined).map_err(|e| Error::Io(format!("invalid url '{}': {}", joined, e)))
        }
    }

    fn classify(err: reqwest::Error) -> Error {
        if err.is_timeout() {
            Error::Timeout
        } else if err.is_connect() {
            Error::ConnectionLost(err.to_string())
        } else {
            Error::Io(err.to_string())
        }
    }

    #[async_trait::async_trait]
    impl Transport for ReqwestTransport {
        async fn send(&self, request: HttpRequest, cancel: &CancellationToken) -> Result<HttpResponse> {
            let url = self.url_for(&request)?;
            let mut builder = self.client.request(request.method, url).headers(request.headers);
            if let Some(body) = request.body {
                builder = builder.body(body);
            }

            let exchange = async {
                let response = builder.send().await.map_err(classify)?;
                let status = response.status();
                let headers = response.headers().clone();
                let body = response.bytes().await.map_err(classify)?;
                Ok::<_, Error>(HttpResponse { status, headers, body })
            };

            tokio::select! {
                biased;
                _ = cancel.cancelled() => Err(Error::Canceled),
                outcome = exchange => outcome,
            }
        }
    }
}
