//! Transport client
//!
//! One `TransportClient` exists per distinct (endpoint URL, trust bundle)
//! pair. It owns the HTTP connection pool and TLS configuration and performs
//! raw and JSON-encoded exchanges. Transport-level failures (DNS, TLS,
//! connect, timeout) are reported as their own `Exchange::Transport` variant
//! so callers never confuse "coordinator said no" with "coordinator
//! unreachable".

use reqwest::header::{CONTENT_TYPE, HeaderMap};
use reqwest::{Method, StatusCode};
use serde::Serialize;
use serde::de::DeserializeOwned;

use forge_core::domain::runner::RunnerIdentity;

use crate::error::{ClientError, Result};

/// Response header carrying the coordinator's TLS trust chain
///
/// Attached to successful job acquisitions so the job's own git/network
/// operations can reuse the same trust root.
pub const TRUST_CHAIN_HEADER: &str = "X-Coordinator-Trust-Chain";

/// Outcome of a single JSON exchange
///
/// `Http` means the coordinator answered; `Transport` means the call never
/// completed at the transport level and carries the error text instead of a
/// status code.
#[derive(Debug)]
pub enum Exchange<T> {
    Http {
        /// HTTP status code returned by the coordinator
        status: u16,
        /// Log-worthy status line (e.g., "404 Not Found")
        status_text: String,
        /// Decoded body, present only when the status matched the expected
        /// success status
        body: Option<T>,
        /// Side-channel trust chain header value, when present
        trust_chain: Option<String>,
    },
    Transport(String),
}

/// A reusable connection/TLS context bound to one endpoint identity
///
/// Created lazily on first use by the client registry and kept for the
/// process lifetime.
#[derive(Debug)]
pub struct TransportClient {
    base_url: String,
    client: reqwest::Client,
}

impl TransportClient {
    /// Builds a transport for the given identity, loading its trust bundle
    ///
    /// Fails if the trust bundle cannot be read or does not parse as PEM.
    pub fn new(identity: &RunnerIdentity) -> Result<Self> {
        let mut builder = reqwest::Client::builder();

        if let Some(path) = &identity.tls_ca_file {
            let pem = std::fs::read(path).map_err(|source| ClientError::TrustBundleRead {
                path: path.clone(),
                source,
            })?;
            let certificates = reqwest::Certificate::from_pem_bundle(&pem).map_err(|source| {
                ClientError::TrustBundleInvalid {
                    path: path.clone(),
                    source,
                }
            })?;
            for certificate in certificates {
                builder = builder.add_root_certificate(certificate);
            }
        }

        let client = builder.build().map_err(ClientError::Build)?;

        Ok(Self {
            base_url: identity.url.trim_end_matches('/').to_string(),
            client,
        })
    }

    /// Get the base URL this transport is bound to
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path.trim_start_matches('/'))
    }

    /// Performs an HTTP call with a body of unbounded/streamed size
    ///
    /// The body is handed to the transport as-is and never buffered whole.
    pub async fn raw_exchange(
        &self,
        method: Method,
        path: &str,
        headers: HeaderMap,
        body: Option<reqwest::Body>,
        content_type: Option<&str>,
    ) -> reqwest::Result<reqwest::Response> {
        let mut request = self
            .client
            .request(method, self.endpoint(path))
            .headers(headers);
        if let Some(content_type) = content_type {
            request = request.header(CONTENT_TYPE, content_type);
        }
        if let Some(body) = body {
            request = request.body(body);
        }
        request.send().await
    }

    /// Performs a streaming multipart POST
    pub async fn multipart_exchange(
        &self,
        path: &str,
        headers: HeaderMap,
        form: reqwest::multipart::Form,
    ) -> reqwest::Result<reqwest::Response> {
        self.client
            .post(self.endpoint(path))
            .headers(headers)
            .multipart(form)
            .send()
            .await
    }

    /// Serializes `request` as JSON, sends it, and decodes the body when the
    /// response status matches `expected`
    ///
    /// The expected success status is a parameter because different
    /// operations legitimately succeed on different codes.
    pub async fn json_exchange<Req, Resp>(
        &self,
        method: Method,
        path: &str,
        expected: StatusCode,
        request: &Req,
    ) -> Exchange<Resp>
    where
        Req: Serialize,
        Resp: DeserializeOwned,
    {
        let response = match self
            .client
            .request(method, self.endpoint(path))
            .json(request)
            .send()
            .await
        {
            Ok(response) => response,
            Err(err) => return Exchange::Transport(err.to_string()),
        };

        let status = response.status();
        let status_text = status_line(status);
        let trust_chain = response
            .headers()
            .get(TRUST_CHAIN_HEADER)
            .and_then(|value| value.to_str().ok())
            .map(str::to_string);

        let body = if status == expected {
            match response.json::<Resp>().await {
                Ok(body) => Some(body),
                Err(err) => {
                    return Exchange::Transport(format!("failed to decode response body: {err}"));
                }
            }
        } else {
            None
        };

        Exchange::Http {
            status: status.as_u16(),
            status_text,
            body,
            trust_chain,
        }
    }

    /// JSON exchange for operations whose success response carries no body
    pub async fn json_exchange_empty<Req>(
        &self,
        method: Method,
        path: &str,
        request: &Req,
    ) -> Exchange<()>
    where
        Req: Serialize,
    {
        let response = match self
            .client
            .request(method, self.endpoint(path))
            .json(request)
            .send()
            .await
        {
            Ok(response) => response,
            Err(err) => return Exchange::Transport(err.to_string()),
        };

        let status = response.status();
        Exchange::Http {
            status: status.as_u16(),
            status_text: status_line(status),
            body: Some(()),
            trust_chain: None,
        }
    }
}

fn status_line(status: StatusCode) -> String {
    match status.canonical_reason() {
        Some(reason) => format!("{} {}", status.as_u16(), reason),
        None => status.as_u16().to_string(),
    }
}
