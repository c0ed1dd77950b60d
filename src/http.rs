use std::thread;
use std::time::Duration;

use reqwest::Url;
use reqwest::blocking::{Client, RequestBuilder, Response};
use reqwest::header::{ACCEPT, AUTHORIZATION, HeaderMap, HeaderValue, USER_AGENT};
use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::error::OpsError;

const BASE_DELAY_MS: u64 = 500;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Platform {
    Tdr,
    Firecloud,
    Gcs,
}

impl Platform {
    pub fn name(self) -> &'static str {
        match self {
            Platform::Tdr => "TDR",
            Platform::Firecloud => "Firecloud",
            Platform::Gcs => "GCS",
        }
    }

    pub fn transport_error(self, message: String) -> OpsError {
        match self {
            Platform::Tdr => OpsError::TdrHttp(message),
            Platform::Firecloud => OpsError::FirecloudHttp(message),
            Platform::Gcs => OpsError::GcsHttp(message),
        }
    }

    pub fn status_error(self, status: u16, message: String) -> OpsError {
        match self {
            Platform::Tdr => OpsError::TdrStatus { status, message },
            Platform::Firecloud => OpsError::FirecloudStatus { status, message },
            Platform::Gcs => OpsError::GcsStatus { status, message },
        }
    }
}

/// Blocking JSON client for one platform, authenticated with a bearer token.
#[derive(Clone)]
pub struct ApiClient {
    client: Client,
    base_url: Url,
    platform: Platform,
    max_retries: usize,
}

impl ApiClient {
    pub fn new(
        platform: Platform,
        base_url: &str,
        token: &str,
        timeout: Duration,
        max_retries: usize,
    ) -> Result<Self, OpsError> {
        let mut headers = HeaderMap::new();
        headers.insert(
            USER_AGENT,
            HeaderValue::from_str(&format!("terra-ops/{}", env!("CARGO_PKG_VERSION")))
                .map_err(|err| platform.transport_error(err.to_string()))?,
        );
        headers.insert(ACCEPT, HeaderValue::from_static("application/json"));
        let mut bearer = HeaderValue::from_str(&format!("Bearer {token}"))
            .map_err(|_| OpsError::Auth("access token contains invalid characters".to_string()))?;
        bearer.set_sensitive(true);
        headers.insert(AUTHORIZATION, bearer);

        let client = Client::builder()
            .default_headers(headers)
            .timeout(timeout)
            .build()
            .map_err(|err| platform.transport_error(err.to_string()))?;
        let base_url = Url::parse(base_url)
            .map_err(|err| OpsError::ConfigValue(format!("{base_url}: {err}")))?;

        Ok(Self {
            client,
            base_url,
            platform,
            max_retries,
        })
    }

    /// Appends each segment to the base URL, percent-encoding it whole
    /// (a `/` inside an object name becomes `%2F`).
    pub fn url(&self, segments: &[&str]) -> Result<Url, OpsError> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|_| OpsError::ConfigValue(format!("{} is not a base URL", self.base_url)))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    pub fn get(&self, url: &Url) -> RequestBuilder {
        self.client.get(url.clone())
    }

    pub fn post(&self, url: &Url) -> RequestBuilder {
        self.client.post(url.clone())
    }

    pub fn delete(&self, url: &Url) -> RequestBuilder {
        self.client.delete(url.clone())
    }

    pub fn send_with_retries<F>(&self, mut make_req: F) -> Result<Response, OpsError>
    where
        F: FnMut() -> RequestBuilder,
    {
        let mut attempt = 0usize;
        loop {
            let response = make_req().send();
            match response {
                Ok(resp) => {
                    let status = resp.status().as_u16();
                    if attempt < self.max_retries && is_retryable_status(status) {
                        tracing::debug!(
                            platform = self.platform.name(),
                            status,
                            attempt,
                            "retrying request"
                        );
                        thread::sleep(Duration::from_millis(BASE_DELAY_MS * (attempt as u64 + 1)));
                        attempt += 1;
                        continue;
                    }
                    return Ok(resp);
                }
                Err(err) => {
                    if attempt < self.max_retries && is_retryable_error(&err) {
                        tracing::debug!(
                            platform = self.platform.name(),
                            error = %err,
                            attempt,
                            "retrying request"
                        );
                        thread::sleep(Duration::from_millis(BASE_DELAY_MS * (attempt as u64 + 1)));
                        attempt += 1;
                        continue;
                    }
                    return Err(self.platform.transport_error(err.to_string()));
                }
            }
        }
    }

    pub fn check_status(&self, response: Response) -> Result<Response, OpsError> {
        if response.status().is_success() {
            return Ok(response);
        }
        let status = response.status().as_u16();
        let body = response
            .text()
            .unwrap_or_else(|_| format!("{} request failed", self.platform.name()));
        Err(self.platform.status_error(status, remote_error_message(&body)))
    }

    pub fn json<T: DeserializeOwned>(&self, response: Response) -> Result<T, OpsError> {
        response
            .json()
            .map_err(|err| OpsError::Payload(format!("{}: {err}", self.platform.name())))
    }

    /// Sends, requires a 2xx status and decodes the body.
    pub fn send_json<T, F>(&self, make_req: F) -> Result<T, OpsError>
    where
        T: DeserializeOwned,
        F: FnMut() -> RequestBuilder,
    {
        let response = self.send_with_retries(make_req)?;
        let response = self.check_status(response)?;
        self.json(response)
    }

    /// Sends and requires a 2xx status, discarding the body.
    pub fn send_empty<F>(&self, make_req: F) -> Result<(), OpsError>
    where
        F: FnMut() -> RequestBuilder,
    {
        let response = self.send_with_retries(make_req)?;
        self.check_status(response)?;
        Ok(())
    }

    /// Sends and returns the HTTP status with whatever JSON came back;
    /// non-JSON bodies are wrapped as a string value.
    pub fn send_raw<F>(&self, make_req: F) -> Result<(u16, Value), OpsError>
    where
        F: FnMut() -> RequestBuilder,
    {
        let response = self.send_with_retries(make_req)?;
        let status = response.status().as_u16();
        let body = response
            .text()
            .map_err(|err| self.platform.transport_error(err.to_string()))?;
        let value = serde_json::from_str(&body).unwrap_or(Value::String(body));
        Ok((status, value))
    }
}

/// Condenses a remote error body. TDR and Rawls both answer with
/// `{"message": ..., "errorDetail": [...]}`; GCS nests it under `error`.
pub fn remote_error_message(body: &str) -> String {
    match serde_json::from_str::<Value>(body) {
        Ok(value) => error_message_from_value(&value).unwrap_or_else(|| body.trim().to_string()),
        Err(_) => body.trim().to_string(),
    }
}

pub fn error_message_from_value(value: &Value) -> Option<String> {
    let root = value.get("error").filter(|v| v.is_object()).unwrap_or(value);
    let message = root.get("message").and_then(Value::as_str)?;
    let details = root
        .get("errorDetail")
        .and_then(Value::as_array)
        .map(|items| {
            items
                .iter()
                .filter_map(Value::as_str)
                .collect::<Vec<_>>()
                .join("; ")
        })
        .filter(|joined| !joined.is_empty());
    Some(match details {
        Some(details) => format!("{message} ({details})"),
        None => message.to_string(),
    })
}

fn is_retryable_status(status: u16) -> bool {
    matches!(status, 429 | 500 | 502 | 503 | 504)
}

fn is_retryable_error(err: &reqwest::Error) -> bool {
    err.is_timeout() || err.is_connect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn client(base: &str) -> ApiClient {
        ApiClient::new(Platform::Gcs, base, "token", Duration::from_secs(5), 0).unwrap()
    }

    #[test]
    fn url_segments_are_encoded() {
        let api = client("https://storage.googleapis.com");
        let url = api
            .url(&["storage", "v1", "b", "bucket", "o", "dir/file name.txt"])
            .unwrap();
        assert_eq!(
            url.as_str(),
            "https://storage.googleapis.com/storage/v1/b/bucket/o/dir%2Ffile%20name.txt"
        );
    }

    #[test]
    fn url_keeps_base_path() {
        let api = client("https://example.org/proxy/");
        let url = api.url(&["api", "repository", "v1", "jobs"]).unwrap();
        assert_eq!(url.as_str(), "https://example.org/proxy/api/repository/v1/jobs");
    }

    #[test]
    fn error_message_with_details() {
        let body = r#"{"message":"Ingest failed","errorDetail":["row 3: bad value","row 9: missing"]}"#;
        assert_eq!(
            remote_error_message(body),
            "Ingest failed (row 3: bad value; row 9: missing)"
        );
    }

    #[test]
    fn error_message_gcs_shape() {
        let body = r#"{"error":{"code":404,"message":"No such object"}}"#;
        assert_eq!(remote_error_message(body), "No such object");
    }

    #[test]
    fn error_message_plain_text() {
        assert_eq!(remote_error_message("  Bad Gateway \n"), "Bad Gateway");
    }
}
