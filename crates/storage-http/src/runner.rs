//! Raw request runner over reqwest with redirects disabled.

use std::collections::BTreeMap;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::HeaderMap;
use reqwest::{redirect, Client, Method};

use blob_artifacts::{RequestRunner, RunnerRequest, RunnerResponse, ServiceError};

use crate::error::HttpError;

/// Issues single HTTP requests and reports the response as-is.
///
/// Redirects are never followed, so a 3xx from the metadata service reaches
/// the caller with its `Location` header intact.
pub struct ReqwestRunner {
    client: Client,
}

impl ReqwestRunner {
    /// Create a runner.
    ///
    /// # Arguments
    /// * `timeout` - Whole-request timeout, if any
    /// * `user_agent` - Value of the `User-Agent` header
    pub fn new(timeout: Option<Duration>, user_agent: &str) -> Result<Self, HttpError> {
        let mut builder = Client::builder()
            .redirect(redirect::Policy::none())
            .user_agent(user_agent);
        if let Some(timeout) = timeout {
            builder = builder.timeout(timeout);
        }
        Ok(Self {
            client: builder.build()?,
        })
    }
}

#[async_trait]
impl RequestRunner for ReqwestRunner {
    async fn run(&self, request: RunnerRequest) -> Result<RunnerResponse, ServiceError> {
        let method: Method = parse_method(&request.method)?;
        let mut builder = self.client.request(method, request.url.as_str());
        for (name, value) in &request.headers {
            builder = builder.header(name.as_str(), value.as_str());
        }
        if !request.body.is_empty() {
            builder = builder.body(request.body);
        }

        let response = builder.send().await.map_err(HttpError::from)?;
        let status = response.status();
        let headers: BTreeMap<String, String> = lowercase_headers(response.headers());
        let body: Vec<u8> = response.bytes().await.map_err(HttpError::from)?.to_vec();

        Ok(RunnerResponse {
            status: status.as_u16(),
            status_message: status.canonical_reason().unwrap_or_default().to_string(),
            headers,
            body,
        })
    }
}

/// Parse an HTTP method name from a signed request.
pub(crate) fn parse_method(method: &str) -> Result<Method, ServiceError> {
    Method::from_bytes(method.as_bytes()).map_err(|_| ServiceError::InvalidRequest {
        message: format!("invalid HTTP method {:?}", method),
    })
}

/// Copy headers into a map keyed by lower-case name. Values that are not
/// visible ASCII are skipped.
pub(crate) fn lowercase_headers(headers: &HeaderMap) -> BTreeMap<String, String> {
    headers
        .iter()
        .filter_map(|(name, value)| {
            value
                .to_str()
                .ok()
                .map(|v| (name.as_str().to_ascii_lowercase(), v.to_string()))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use reqwest::header::{HeaderValue, LOCATION};

    #[test]
    fn test_parse_method() {
        assert_eq!(parse_method("PUT").unwrap(), Method::PUT);
        assert!(matches!(
            parse_method("BAD METHOD"),
            Err(ServiceError::InvalidRequest { .. })
        ));
    }

    #[test]
    fn test_lowercase_headers() {
        let mut headers = HeaderMap::new();
        headers.insert(LOCATION, HeaderValue::from_static("https://bucket.example/k?a=1"));
        headers.insert("x-bin", HeaderValue::from_bytes(b"\xff").unwrap());

        let map: BTreeMap<String, String> = lowercase_headers(&headers);
        assert_eq!(map.get("location").unwrap(), "https://bucket.example/k?a=1");
        assert!(!map.contains_key("x-bin"));
    }
}
