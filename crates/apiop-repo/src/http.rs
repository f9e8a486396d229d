//! HTTP client for release endpoints
//!
//! Redirects are followed manually so that a validation probe sees the
//! final status (GitHub answers tag pages and release assets through
//! redirects), and so that relative `Location` headers resolve correctly.

use std::time::Duration;

use url::Url;

use crate::error::{RepoError, Result};

/// Per-request timeout
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

const MAX_REDIRECTS: u32 = 10;

/// HTTP client shared by version discovery and bundle download
#[derive(Clone)]
pub struct HttpClient {
    client: reqwest::Client,
}

impl HttpClient {
    pub fn new() -> Result<Self> {
        Self::with_timeout(DEFAULT_TIMEOUT)
    }

    pub fn with_timeout(timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .redirect(reqwest::redirect::Policy::none())
            .timeout(timeout)
            .user_agent(concat!("apiop/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| RepoError::NetworkError {
                message: e.to_string(),
            })?;

        Ok(Self { client })
    }

    /// GET `url`, following redirects; returns the final response whatever its status
    async fn send(&self, url: &str) -> Result<(String, reqwest::Response)> {
        let mut current_url = Url::parse(url).map_err(|e| RepoError::InvalidUrl {
            url: url.to_string(),
            reason: e.to_string(),
        })?;
        let mut redirects = 0;

        loop {
            let response = self.client.get(current_url.clone()).send().await?;
            let status = response.status();

            if !status.is_redirection() || status == reqwest::StatusCode::NOT_MODIFIED {
                return Ok((current_url.to_string(), response));
            }

            redirects += 1;
            if redirects > MAX_REDIRECTS {
                return Err(RepoError::NetworkError {
                    message: format!("Too many redirects (max {})", MAX_REDIRECTS),
                });
            }

            let location = response
                .headers()
                .get(reqwest::header::LOCATION)
                .and_then(|v| v.to_str().ok())
                .ok_or_else(|| RepoError::NetworkError {
                    message: "Redirect without Location header".to_string(),
                })?;

            tracing::debug!(from = %current_url, to = location, "following redirect");
            current_url = current_url.join(location)?;
        }
    }

    /// GET `url`, failing on any non-2xx final status
    pub async fn get(&self, url: &str) -> Result<reqwest::Response> {
        let (final_url, response) = self.send(url).await?;
        let status = response.status();

        if status == reqwest::StatusCode::TOO_MANY_REQUESTS {
            let retry_after = response
                .headers()
                .get(reqwest::header::RETRY_AFTER)
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.parse().ok())
                .unwrap_or(60);
            return Err(RepoError::RateLimited { retry_after });
        }
        if status == reqwest::StatusCode::UNAUTHORIZED {
            return Err(RepoError::AuthRequired { url: final_url });
        }
        if status == reqwest::StatusCode::FORBIDDEN {
            return Err(RepoError::AuthFailed { url: final_url });
        }
        if !status.is_success() {
            return Err(RepoError::HttpError {
                status: status.as_u16(),
                message: format!("Request to {} failed", final_url),
            });
        }

        Ok(response)
    }

    /// Fetch bytes from URL
    pub async fn get_bytes(&self, url: &str) -> Result<Vec<u8>> {
        let response = self.get(url).await?;
        let bytes = response.bytes().await.map_err(|e| RepoError::NetworkError {
            message: e.to_string(),
        })?;
        Ok(bytes.to_vec())
    }

    /// Fetch text from URL
    pub async fn get_text(&self, url: &str) -> Result<String> {
        let response = self.get(url).await?;
        let text = response.text().await.map_err(|e| RepoError::NetworkError {
            message: e.to_string(),
        })?;
        Ok(text)
    }

    /// Check that `url` exists: `Ok(true)` on 2xx, `Ok(false)` on 404
    ///
    /// Any other status is an error; the caller cannot tell whether the
    /// resource exists.
    pub async fn exists(&self, url: &str) -> Result<bool> {
        let (final_url, response) = self.send(url).await?;
        let status = response.status();

        if status.is_success() {
            Ok(true)
        } else if status == reqwest::StatusCode::NOT_FOUND {
            Ok(false)
        } else {
            Err(RepoError::HttpError {
                status: status.as_u16(),
                message: format!("Could not check {}", final_url),
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[tokio::test]
    async fn test_exists_follows_redirects() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/tree/v1.2.0"))
            .respond_with(ResponseTemplate::new(302).insert_header("Location", "/real/v1.2.0"))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/real/v1.2.0"))
            .respond_with(ResponseTemplate::new(200))
            .mount(&server)
            .await;

        let client = HttpClient::new().unwrap();
        let url = format!("{}/tree/v1.2.0", server.uri());
        assert!(client.exists(&url).await.unwrap());
    }

    #[tokio::test]
    async fn test_exists_statuses() {
        let server = MockServer::start().await;
        Mock::given(path("/missing"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;
        Mock::given(path("/broken"))
            .respond_with(ResponseTemplate::new(503))
            .mount(&server)
            .await;

        let client = HttpClient::new().unwrap();
        assert!(!client.exists(&format!("{}/missing", server.uri())).await.unwrap());

        let err = client
            .exists(&format!("{}/broken", server.uri()))
            .await
            .unwrap_err();
        assert!(matches!(err, RepoError::HttpError { status: 503, .. }));
    }

    #[tokio::test]
    async fn test_get_maps_errors() {
        let server = MockServer::start().await;
        Mock::given(path("/limited"))
            .respond_with(ResponseTemplate::new(429).insert_header("Retry-After", "7"))
            .mount(&server)
            .await;
        Mock::given(path("/private"))
            .respond_with(ResponseTemplate::new(401))
            .mount(&server)
            .await;

        let client = HttpClient::new().unwrap();
        let err = client
            .get_text(&format!("{}/limited", server.uri()))
            .await
            .unwrap_err();
        assert!(matches!(err, RepoError::RateLimited { retry_after: 7 }));

        let err = client
            .get_text(&format!("{}/private", server.uri()))
            .await
            .unwrap_err();
        assert!(matches!(err, RepoError::AuthRequired { .. }));
    }

    #[tokio::test]
    async fn test_too_many_redirects() {
        let server = MockServer::start().await;
        Mock::given(path("/loop"))
            .respond_with(ResponseTemplate::new(301).insert_header("Location", "/loop"))
            .mount(&server)
            .await;

        let client = HttpClient::new().unwrap();
        let err = client
            .get_bytes(&format!("{}/loop", server.uri()))
            .await
            .unwrap_err();
        assert!(matches!(err, RepoError::NetworkError { .. }));
    }

    #[tokio::test]
    async fn test_invalid_url() {
        let client = HttpClient::new().unwrap();
        let err = client.get_text("not a url").await.unwrap_err();
        assert!(matches!(err, RepoError::InvalidUrl { .. }));
    }
}
