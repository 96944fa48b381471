//! Transport abstraction over the bundle origin.
//!
//! The trait keeps the pool testable: production uses [`HttpOrigin`] over
//! `reqwest`; tests serve bundles from memory, multipart framing included.

use std::future::Future;
use std::pin::Pin;

use bytes::Bytes;
use futures_util::{Stream, StreamExt};

use crate::data::DownloadOpts;
use crate::error::FetchError;

/// A boxed stream of body bytes.
pub type BoxByteStream = Pin<Box<dyn Stream<Item = Result<Bytes, FetchError>> + Send>>;

/// What the pipeline needs from a range response.
pub struct OriginResponse {
    pub status: u16,
    pub content_type: Option<String>,
    pub body: BoxByteStream,
}

/// Issues one `GET`, optionally with a `Range` header, and exposes the body
/// as a byte stream.
pub trait Origin: Send + Sync {
    fn fetch(
        &self,
        url: &str,
        range: Option<&str>,
    ) -> impl Future<Output = Result<OriginResponse, FetchError>> + Send;
}

/// Production origin over a shared `reqwest` client.
#[derive(Clone)]
pub struct HttpOrigin {
    client: reqwest::Client,
}

impl HttpOrigin {
    pub fn new(opts: &DownloadOpts) -> Result<Self, FetchError> {
        let mut builder = reqwest::Client::builder().timeout(opts.timeout);
        if !opts.verify_peer {
            builder = builder.danger_accept_invalid_certs(true);
        }
        if let Some(ca_path) = &opts.ca_path {
            let pem = std::fs::read(ca_path)
                .map_err(|e| FetchError::Transport(format!("read {}: {e}", ca_path.display())))?;
            let cert = reqwest::Certificate::from_pem(&pem)
                .map_err(|e| FetchError::Transport(e.to_string()))?;
            builder = builder.add_root_certificate(cert);
        }
        if let Some(proxy) = &opts.proxy {
            let proxy =
                reqwest::Proxy::all(proxy).map_err(|e| FetchError::Transport(e.to_string()))?;
            builder = builder.proxy(proxy);
        }
        if let Some(user_agent) = &opts.user_agent {
            builder = builder.user_agent(user_agent.clone());
        }
        let client = builder
            .build()
            .map_err(|e| FetchError::Transport(e.to_string()))?;
        Ok(Self { client })
    }
}

impl Origin for HttpOrigin {
    async fn fetch(&self, url: &str, range: Option<&str>) -> Result<OriginResponse, FetchError> {
        let mut request = self.client.get(url);
        if let Some(range) = range {
            request = request.header(reqwest::header::RANGE, range);
        }
        let response = request
            .send()
            .await
            .map_err(|e| FetchError::Transport(e.to_string()))?;
        let status = response.status().as_u16();
        let content_type = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(str::to_owned);
        let body = response
            .bytes_stream()
            .map(|item| item.map_err(|e| FetchError::Transport(e.to_string())))
            .boxed();
        Ok(OriginResponse {
            status,
            content_type,
            body,
        })
    }
}
