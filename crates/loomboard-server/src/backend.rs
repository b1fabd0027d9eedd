//! Generative backend over HTTP.
//!
//! POSTs the generation request to a configured upstream URL and yields
//! the streamed response body as text deltas. The upstream is expected to
//! stream one growing JSON document; how it prompts its model is its own
//! business.

use async_trait::async_trait;
use futures::StreamExt;
use tracing::debug;

use loomboard_stream::{BackendError, FragmentStream, GenerateRequest, GenerativeBackend};

use crate::constants::BACKEND_REQUEST_TIMEOUT;

/// Streams completions from an HTTP upstream.
pub struct HttpGenerativeBackend {
    client: reqwest::Client,
    url: String,
}

impl HttpGenerativeBackend {
    /// Create a backend targeting the given URL.
    pub fn new(url: impl Into<String>) -> Result<Self, BackendError> {
        let client = reqwest::Client::builder()
            .timeout(BACKEND_REQUEST_TIMEOUT)
            .build()
            .map_err(|e| BackendError::Request(e.to_string()))?;
        Ok(Self {
            client,
            url: url.into(),
        })
    }
}

#[async_trait]
impl GenerativeBackend for HttpGenerativeBackend {
    async fn stream(&self, request: &GenerateRequest) -> Result<FragmentStream, BackendError> {
        debug!(url = %self.url, "starting upstream generation request");
        let response = self
            .client
            .post(&self.url)
            .json(request)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    BackendError::Timeout
                } else {
                    BackendError::Request(e.to_string())
                }
            })?
            .error_for_status()
            .map_err(|e| BackendError::Request(e.to_string()))?;

        // Body chunks may split multi-byte characters; carry the invalid
        // tail over to the next chunk.
        let mut carry: Vec<u8> = Vec::new();
        let stream = response.bytes_stream().map(move |item| match item {
            Ok(bytes) => {
                carry.extend_from_slice(&bytes);
                let valid_len = match std::str::from_utf8(&carry) {
                    Ok(_) => carry.len(),
                    Err(e) => e.valid_up_to(),
                };
                let delta = String::from_utf8_lossy(&carry[..valid_len]).into_owned();
                carry.drain(..valid_len);
                Ok(delta)
            }
            Err(e) => {
                if e.is_timeout() {
                    Err(BackendError::Timeout)
                } else {
                    Err(BackendError::Interrupted(e.to_string()))
                }
            }
        });

        Ok(Box::pin(stream))
    }
}
