//! reqwest-backed transport.

use reqwest::{Client, Response, StatusCode};
use serde_json::Value;
use tokio_util::sync::CancellationToken;
use tracing::{debug, instrument};

use super::{ApiError, ApiResult, SearchTransport};
use async_trait::async_trait;

/// HTTP transport for a live occurrence search service.
#[derive(Debug, Clone)]
pub struct HttpTransport {
    client: Client,
    base_url: String,
}

impl HttpTransport {
    /// Create a transport for the given base URL (trailing slash tolerated).
    #[must_use]
    pub fn new(base_url: impl Into<String>) -> Self {
        Self::with_client(Client::new(), base_url)
    }

    /// Create a transport with a preconfigured [`Client`] (custom timeouts,
    /// proxies, headers).
    #[must_use]
    pub fn with_client(client: Client, base_url: impl Into<String>) -> Self {
        Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_owned(),
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path.trim_start_matches('/'))
    }

    async fn read_response(response: Response) -> ApiResult<Value> {
        let status = response.status();
        if status == StatusCode::NOT_FOUND {
            return Err(ApiError::NotFound);
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ApiError::Server {
                status: status.as_u16(),
                body,
            });
        }

        let text = response
            .text()
            .await
            .map_err(|e| ApiError::Network(e.to_string()))?;
        Ok(serde_json::from_str(&text)?)
    }
}

#[async_trait]
impl SearchTransport for HttpTransport {
    #[instrument(name = "POST search request", level = "debug", skip_all, fields(path = %path))]
    async fn post_json(
        &self,
        path: &str,
        body: &Value,
        cancel: &CancellationToken,
    ) -> ApiResult<Value> {
        let request = self.client.post(self.url(path)).json(body).send();
        let exchange = async {
            let response = request
                .await
                .map_err(|e| ApiError::Network(e.to_string()))?;
            Self::read_response(response).await
        };

        tokio::select! {
            () = cancel.cancelled() => {
                debug!(path, "request cancelled before completion");
                Err(ApiError::Cancelled)
            }
            result = exchange => result,
        }
    }

    #[instrument(name = "GET request", level = "debug", skip_all, fields(path = %path))]
    async fn get_json(
        &self,
        path: &str,
        query: &[(&str, &str)],
        cancel: &CancellationToken,
    ) -> ApiResult<Value> {
        let request = self.client.get(self.url(path)).query(query).send();
        let exchange = async {
            let response = request
                .await
                .map_err(|e| ApiError::Network(e.to_string()))?;
            Self::read_response(response).await
        };

        tokio::select! {
            () = cancel.cancelled() => {
                debug!(path, "request cancelled before completion");
                Err(ApiError::Cancelled)
            }
            result = exchange => result,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_url_joining() {
        let transport = HttpTransport::new("https://api.example.org/");
        assert_eq!(
            transport.url("/occurrences/search"),
            "https://api.example.org/occurrences/search"
        );
        assert_eq!(
            transport.url("autocomplete"),
            "https://api.example.org/autocomplete"
        );
    }
}
