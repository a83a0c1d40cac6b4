//! HTTP response wrapper.

use std::collections::HashMap;

use reqwest::{Response, StatusCode};
use serde::de::DeserializeOwned;

use super::error::HttpError;

/// Successful HTTP response with lower-cased headers captured up front.
pub struct HttpResponse {
    pub status: StatusCode,
    pub url: String,
    pub headers: HashMap<String, String>,
    pub(crate) response: Response,
}

impl HttpResponse {
    /// Get the Content-Type header.
    pub fn content_type(&self) -> Option<&str> {
        self.headers.get("content-type").map(|s| s.as_str())
    }

    /// Get the Content-Length header.
    pub fn content_length(&self) -> Option<u64> {
        self.headers
            .get("content-length")
            .and_then(|s| s.parse().ok())
    }

    /// Get response body as bytes.
    pub async fn bytes(self) -> Result<Vec<u8>, HttpError> {
        let url = self.url;
        self.response
            .bytes()
            .await
            .map(|b| b.to_vec())
            .map_err(|source| HttpError::Request { url, source })
    }

    /// Get response body as text.
    pub async fn text(self) -> Result<String, HttpError> {
        let url = self.url;
        self.response
            .text()
            .await
            .map_err(|source| HttpError::Request { url, source })
    }

    /// Decode the body as JSON.
    pub async fn json<T: DeserializeOwned>(self) -> Result<T, HttpError> {
        let url = self.url.clone();
        let body = self.bytes().await?;
        serde_json::from_slice(&body).map_err(|source| HttpError::Decode { url, source })
    }
}
