use std::{future::Future, sync::Arc};

use reqwest::{header::CONTENT_TYPE, Client, Url};
use thiserror::Error;
use tracing::debug;

#[derive(Debug, Error)]
pub enum TransportError {
    #[error("upload request failed: {0}")]
    Request(#[from] reqwest::Error),
}

/// The network side of an upload.
pub trait Transport: Clone + Send + Sync + 'static {
    /// PUTs `body` as JSON and returns the HTTP status.
    fn put_json(
        &self,
        url: &str,
        api_key: &str,
        body: String,
    ) -> impl Future<Output = Result<u16, TransportError>> + Send;

    /// Cheap reachability probe run before each upload command.
    fn is_online(&self) -> impl Future<Output = bool> + Send;
}

#[derive(Debug, Clone)]
pub struct HttpTransport {
    inner: Arc<Inner>,
}

#[derive(Debug)]
struct Inner {
    http: Client,
    /// `host:port` of the upload endpoint, used by the reachability probe.
    probe_addr: Option<(String, u16)>,
}

impl HttpTransport {
    pub fn new(base_url: &str) -> Self {
        let probe_addr = Url::parse(base_url).ok().and_then(|url| {
            let host = url.host_str()?.to_owned();
            Some((host, url.port_or_known_default()?))
        });
        Self {
            inner: Arc::new(Inner {
                http: Client::new(),
                probe_addr,
            }),
        }
    }
}

impl Transport for HttpTransport {
    async fn put_json(&self, url: &str, api_key: &str, body: String) -> Result<u16, TransportError> {
        debug!(url = %url, bytes = body.len(), "PUT upload");
        let response = self
            .inner
            .http
            .put(url)
            .header("X-ApiKey", api_key)
            .header(CONTENT_TYPE, "application/json")
            .body(body)
            .send()
            .await?;
        let status = response.status().as_u16();
        debug!(url = %url, status, "Upload answered");
        Ok(status)
    }

    async fn is_online(&self) -> bool {
        let Some((host, port)) = &self.inner.probe_addr else {
            return false;
        };
        match tokio::net::lookup_host((host.as_str(), *port)).await {
            Ok(mut addrs) => addrs.next().is_some(),
            Err(e) => {
                debug!(host = %host, error = %e, "Reachability probe failed");
                false
            }
        }
    }
}
