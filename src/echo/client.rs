use crate::echo::requests::{Download, Ping, Request, Upload};
use crate::echo::{ByteStream, Transport};
use crate::errors::SpeedTestError;
use bytes::Bytes;
use futures::StreamExt;
use log::debug;
use reqwest::{Client as ReqwestClient, RequestBuilder};
use std::time::Duration;
use url::Url;

pub static DEFAULT_BASE_URL: &str = "https://speed.cloudflare.com";

/// Only connection setup is bounded; transfers are bounded by the phase
/// budget instead.
const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// HTTP client for the echo service.
#[derive(Debug, Clone)]
pub struct EchoClient {
    client: ReqwestClient,
    base_url: Url,
}

impl EchoClient {
    pub fn new(base_url: Url) -> Result<Self, SpeedTestError> {
        let client = ReqwestClient::builder()
            .connect_timeout(CONNECT_TIMEOUT)
            .build()?;

        Ok(EchoClient { client, base_url })
    }

    /// Parse `base_url` and build a client for it.
    pub fn from_base(base_url: &str) -> Result<Self, SpeedTestError> {
        let url = Url::parse(base_url).map_err(|e| {
            SpeedTestError::config(format!(
                "invalid server url '{}': {}",
                base_url, e
            ))
            .with_suggestion("Pass an absolute http(s) URL to --server.")
        })?;

        if !matches!(url.scheme(), "http" | "https") {
            return Err(SpeedTestError::config(format!(
                "unsupported scheme '{}' in server url",
                url.scheme()
            )));
        }

        Self::new(url)
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    fn url_for(&self, endpoint: &str) -> Result<Url, SpeedTestError> {
        let base = self.base_url.as_str().trim_end_matches('/');
        let endpoint = endpoint.trim_start_matches('/');

        Url::parse(&format!("{}/{}", base, endpoint)).map_err(|e| {
            SpeedTestError::config(format!(
                "cannot build request url for '{}': {}",
                endpoint, e
            ))
        })
    }

    fn request<R: Request>(
        &self,
        request: R,
    ) -> Result<RequestBuilder, SpeedTestError> {
        let url = self.url_for(&request.endpoint())?;
        debug!("{} {}", R::METHOD, url);

        Ok(self.client.request(R::METHOD, url).headers(request.headers()))
    }
}

impl Transport for EchoClient {
    async fn ping(&self) -> Result<(), SpeedTestError> {
        let response =
            self.request(Ping)?.send().await?.error_for_status()?;

        response.bytes().await?;

        Ok(())
    }

    async fn download(&self, bytes: u64) -> Result<ByteStream, SpeedTestError> {
        let response = self
            .request(Download { bytes })?
            .send()
            .await?
            .error_for_status()?;

        Ok(response
            .bytes_stream()
            .map(|chunk| chunk.map_err(SpeedTestError::from))
            .boxed())
    }

    async fn upload(&self, payload: Bytes) -> Result<(), SpeedTestError> {
        let response = self
            .request(Upload)?
            .body(payload)
            .send()
            .await?
            .error_for_status()?;

        response.bytes().await?;

        Ok(())
    }
}
