//! HTTP seam between the pull protocol and the network.

use crate::config::RegistryConfig;
use crate::error::RegistryError;
use serde_json::Value;
use std::time::Duration;

/// Outbound requests the client needs. Implementations must not retry.
pub trait RegistryTransport {
    /// GET returning a JSON document.
    fn get_json(&self, url: &str, token: Option<&str>, accept: Option<&str>)
        -> Result<Value, RegistryError>;

    /// GET returning the raw body.
    fn get_bytes(&self, url: &str, token: Option<&str>) -> Result<Vec<u8>, RegistryError>;
}

/// Blocking `reqwest` transport.
pub struct HttpTransport {
    client: reqwest::blocking::Client,
    request_timeout: Duration,
    blob_timeout: Duration,
}

impl HttpTransport {
    pub fn new(config: &RegistryConfig) -> Result<Self, RegistryError> {
        let client = reqwest::blocking::Client::builder()
            .user_agent(config.user_agent.clone())
            .build()
            .map_err(|e| RegistryError::Http(format!("http client: {e}")))?;
        Ok(Self {
            client,
            request_timeout: Duration::from_secs(config.request_timeout_secs),
            blob_timeout: Duration::from_secs(config.blob_timeout_secs),
        })
    }

    fn send(
        &self,
        url: &str,
        token: Option<&str>,
        accept: Option<&str>,
        timeout: Duration,
    ) -> Result<reqwest::blocking::Response, RegistryError> {
        let mut request = self.client.get(url).timeout(timeout);
        if let Some(token) = token {
            request = request.bearer_auth(token);
        }
        if let Some(accept) = accept {
            request = request.header(reqwest::header::ACCEPT, accept);
        }

        let resp = request
            .send()
            .map_err(|e| RegistryError::Http(format!("fetch failed: {e}")))?;

        if !resp.status().is_success() {
            return Err(RegistryError::Http(format!(
                "HTTP {} fetching {url}",
                resp.status()
            )));
        }
        Ok(resp)
    }
}

impl RegistryTransport for HttpTransport {
    fn get_json(
        &self,
        url: &str,
        token: Option<&str>,
        accept: Option<&str>,
    ) -> Result<Value, RegistryError> {
        let body = self
            .send(url, token, accept, self.request_timeout)?
            .bytes()
            .map_err(|e| RegistryError::Http(format!("read body: {e}")))?;
        Ok(serde_json::from_slice(&body)?)
    }

    fn get_bytes(&self, url: &str, token: Option<&str>) -> Result<Vec<u8>, RegistryError> {
        self.send(url, token, None, self.blob_timeout)?
            .bytes()
            .map(|b| b.to_vec())
            .map_err(|e| RegistryError::Http(format!("read body: {e}")))
    }
}
