use async_trait::async_trait;
use bytes::Bytes;
use futures::TryStreamExt;
use tracing::trace;
use url::Url;

use crate::{
    ByteStream, Net, NetError,
    types::{Headers, NetOptions, RangeSpec},
};

/// reqwest-backed [`Net`] implementation.
#[derive(Clone)]
pub struct HttpClient {
    client: reqwest::Client,
}

impl HttpClient {
    /// Build a client with the configured timeouts.
    pub fn new(options: &NetOptions) -> Result<Self, NetError> {
        let client = reqwest::Client::builder()
            .timeout(options.request_timeout)
            .connect_timeout(options.connect_timeout)
            .build()
            .map_err(NetError::from)?;
        Ok(Self { client })
    }

    fn request(
        &self,
        method: reqwest::Method,
        url: Url,
        headers: Option<&Headers>,
    ) -> reqwest::RequestBuilder {
        let mut builder = self.client.request(method, url);
        if let Some(headers) = headers {
            for (key, value) in headers.iter() {
                builder = builder.header(key, value);
            }
        }
        builder
    }

    async fn send_checked(
        &self,
        method: reqwest::Method,
        url: Url,
        headers: Option<&Headers>,
    ) -> Result<reqwest::Response, NetError> {
        let response = self
            .request(method, url.clone(), headers)
            .send()
            .await
            .map_err(NetError::from)?;

        let status = response.status();
        if !status.is_success() {
            return Err(NetError::Status {
                status: status.as_u16(),
                url,
            });
        }
        Ok(response)
    }
}

#[async_trait]
impl Net for HttpClient {
    async fn get_bytes(&self, url: Url, headers: Option<Headers>) -> Result<Bytes, NetError> {
        let response = self
            .send_checked(reqwest::Method::GET, url.clone(), headers.as_ref())
            .await?;
        let bytes = response.bytes().await.map_err(NetError::from)?;
        trace!(url = %url, bytes = bytes.len(), "GET complete");
        Ok(bytes)
    }

    async fn stream(&self, url: Url, headers: Option<Headers>) -> Result<ByteStream, NetError> {
        let response = self
            .send_checked(reqwest::Method::GET, url, headers.as_ref())
            .await?;
        Ok(Box::pin(
            response.bytes_stream().map_err(NetError::from),
        ))
    }

    async fn get_range(
        &self,
        url: Url,
        range: RangeSpec,
        headers: Option<Headers>,
    ) -> Result<Bytes, NetError> {
        let mut headers = headers.unwrap_or_default();
        headers.insert("Range", range.to_header_value());
        self.get_bytes(url, Some(headers)).await
    }

    async fn head(&self, url: Url, headers: Option<Headers>) -> Result<Headers, NetError> {
        let response = self
            .send_checked(reqwest::Method::HEAD, url, headers.as_ref())
            .await?;
        let mut out = Headers::new();
        for (name, value) in response.headers() {
            if let Ok(value) = value.to_str() {
                out.insert(name.as_str(), value);
            }
        }
        Ok(out)
    }
}
