//! Shared reqwest plumbing for the Notion and GitHub clients.

use reqwest::header::{HeaderMap, HeaderName, HeaderValue, AUTHORIZATION};
use reqwest::{Client, Response};
use serde_json::Value;
use std::time::Duration;

use crate::contract::ApiError;

pub(crate) fn header_value(value: &str) -> Result<HeaderValue, ApiError> {
    HeaderValue::from_str(value)
        .map_err(|e| ApiError::Transport(format!("invalid header value: {e}")))
}

/// Builds a client that sends `Authorization: Bearer <token>` plus `extra`
/// headers on every request, with a per-request timeout.
pub(crate) fn bearer_client(
    token: &str,
    extra: &[(HeaderName, &str)],
    timeout: Duration,
) -> Result<Client, ApiError> {
    let mut headers = HeaderMap::new();
    let mut auth = header_value(&format!("Bearer {token}"))?;
    auth.set_sensitive(true);
    headers.insert(AUTHORIZATION, auth);
    for (name, value) in extra {
        headers.insert(name.clone(), header_value(value)?);
    }
    Ok(Client::builder()
        .default_headers(headers)
        .user_agent(concat!("notion-sync/", env!("CARGO_PKG_VERSION")))
        .timeout(timeout)
        .build()?)
}

/// Returns the JSON body of a 2xx response, or [`ApiError::Status`] carrying the body text.
pub(crate) async fn read_json(response: Response) -> Result<Value, ApiError> {
    let status = response.status();
    if !status.is_success() {
        let body = response
            .text()
            .await
            .unwrap_or_else(|_| String::from("<Failed to decode response body>"));
        return Err(ApiError::Status {
            status: status.as_u16(),
            body,
        });
    }
    response
        .json::<Value>()
        .await
        .map_err(|e| ApiError::Decode(e.to_string()))
}
