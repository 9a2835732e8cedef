//! Shared HTTP plumbing for the hosted providers.

use reqwest::{header, Client};
use reqwest_middleware::{ClientBuilder, ClientWithMiddleware};
use reqwest_retry::{policies::ExponentialBackoff, RetryTransientMiddleware};

use crate::error::{LLMError, Result};
use crate::provider::ProviderConfig;

/// Build an HTTP client with the configured timeout and a transient-error
/// retry policy with exponential backoff
pub fn build_client(config: &ProviderConfig) -> Result<ClientWithMiddleware> {
    let retry_policy = ExponentialBackoff::builder()
        .base(2)
        .build_with_max_retries(3);

    let client = Client::builder()
        .timeout(config.timeout)
        .build()
        .map_err(|e| LLMError::Config(e.to_string()))?;

    Ok(ClientBuilder::new(client)
        .with(RetryTransientMiddleware::new_with_policy(retry_policy))
        .build())
}

/// Base headers plus any custom headers from the config
pub fn base_headers(config: &ProviderConfig) -> Result<header::HeaderMap> {
    let mut headers = header::HeaderMap::new();
    headers.insert(
        header::CONTENT_TYPE,
        header::HeaderValue::from_static("application/json"),
    );

    for (key, value) in &config.headers {
        let header_name = header::HeaderName::from_bytes(key.as_bytes())
            .map_err(|e| LLMError::Config(format!("Invalid header name: {}", e)))?;
        let header_value = header::HeaderValue::from_str(value)
            .map_err(|e| LLMError::Config(format!("Invalid header value: {}", e)))?;
        headers.insert(header_name, header_value);
    }

    Ok(headers)
}

/// Turn a header value into a `HeaderValue`, reporting secrets by name only
pub fn secret_header(name: &str, value: &str) -> Result<header::HeaderValue> {
    let mut value = header::HeaderValue::from_str(value)
        .map_err(|e| LLMError::Config(format!("Invalid {}: {}", name, e)))?;
    value.set_sensitive(true);
    Ok(value)
}

/// Map a non-success HTTP status to an [`LLMError`]
pub fn status_error(status: u16, body: String) -> LLMError {
    match status {
        401 | 403 => LLMError::Auth(body),
        429 => LLMError::RateLimited { retry_after: 60 },
        _ => LLMError::Api {
            status,
            message: body,
        },
    }
}

/// Fail on non-2xx replies, consuming the body for the error message
pub async fn error_for_status(response: reqwest::Response) -> Result<reqwest::Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    Err(status_error(status.as_u16(), body))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_error_mapping() {
        assert!(matches!(status_error(401, String::new()), LLMError::Auth(_)));
        assert!(matches!(status_error(403, String::new()), LLMError::Auth(_)));
        assert!(matches!(
            status_error(429, String::new()),
            LLMError::RateLimited { .. }
        ));
        assert!(matches!(
            status_error(500, "boom".to_string()),
            LLMError::Api { status: 500, .. }
        ));
    }

    #[test]
    fn test_base_headers_include_custom() {
        let config = ProviderConfig::new("x", "http://localhost").with_header("x-trace", "1");
        let headers = base_headers(&config).unwrap();
        assert_eq!(headers.get("x-trace").unwrap(), "1");
        assert_eq!(headers.get(header::CONTENT_TYPE).unwrap(), "application/json");
    }
}
