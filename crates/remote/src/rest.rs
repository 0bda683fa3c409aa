//! Row access over the platform's REST interface.

use std::time::Duration;

use chatify_config::ClientConfig;
use reqwest::{Client, Method, RequestBuilder, Response};
use serde_json::Value;
use tracing::debug;

use crate::error::RemoteError;

pub(crate) type Query = Vec<(&'static str, String)>;

/// Authenticated HTTP client for the platform.
#[derive(Debug, Clone)]
pub struct RestClient {
    http: Client,
    base_url: String,
    api_key: Option<String>,
    access_token: Option<String>,
}

impl RestClient {
    pub fn new(config: &ClientConfig) -> Result<Self, RemoteError> {
        let http = Client::builder()
            .timeout(Duration::from_secs(config.backend.request_timeout_seconds))
            .build()?;

        Ok(Self {
            http,
            base_url: config.backend.url.trim_end_matches('/').to_string(),
            api_key: config.backend.api_key.clone(),
            access_token: config.session.access_token.clone(),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub(crate) fn request(&self, method: Method, path: &str) -> RequestBuilder {
        let mut request = self.http.request(method, format!("{}{}", self.base_url, path));
        if let Some(key) = &self.api_key {
            request = request.header("apikey", key);
        }
        if let Some(token) = self.access_token.as_ref().or(self.api_key.as_ref()) {
            request = request.bearer_auth(token);
        }
        request
    }

    /// Rows of `table` matching `query`.
    pub(crate) async fn select(&self, table: &str, query: &Query) -> Result<Vec<Value>, RemoteError> {
        let path = table_path(table);
        let response = self.request(Method::GET, &path).query(query).send().await?;
        let rows = rows(checked(response, "GET", &path).await?).await?;
        debug!(table, rows = rows.len(), "rows selected");
        Ok(rows)
    }

    /// Insert `body` (one row or an array) and return the stored rows.
    pub(crate) async fn insert(&self, table: &str, body: &Value) -> Result<Vec<Value>, RemoteError> {
        let path = table_path(table);
        let response = self
            .request(Method::POST, &path)
            .header("Prefer", "return=representation")
            .json(body)
            .send()
            .await?;
        rows(checked(response, "POST", &path).await?).await
    }

    pub(crate) async fn update(&self, table: &str, query: &Query, body: &Value) -> Result<(), RemoteError> {
        let path = table_path(table);
        let response = self
            .request(Method::PATCH, &path)
            .query(query)
            .json(body)
            .send()
            .await?;
        checked(response, "PATCH", &path).await?;
        Ok(())
    }

    pub(crate) async fn delete(&self, table: &str, query: &Query) -> Result<(), RemoteError> {
        let path = table_path(table);
        let response = self.request(Method::DELETE, &path).query(query).send().await?;
        checked(response, "DELETE", &path).await?;
        Ok(())
    }
}

fn table_path(table: &str) -> String {
    format!("/rest/v1/{table}")
}

pub(crate) fn eq(value: &str) -> String {
    format!("eq.{value}")
}

pub(crate) fn in_list(values: &[String]) -> String {
    let quoted: Vec<String> = values
        .iter()
        .map(|value| format!("\"{}\"", value.replace('"', "\\\"")))
        .collect();
    format!("in.({})", quoted.join(","))
}

pub(crate) async fn checked(
    response: Response,
    method: &str,
    path: &str,
) -> Result<Response, RemoteError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    Err(RemoteError::Status {
        method: method.to_string(),
        path: path.to_string(),
        status: status.as_u16(),
        body,
    })
}

async fn rows(response: Response) -> Result<Vec<Value>, RemoteError> {
    let text = response.text().await?;
    if text.trim().is_empty() {
        return Ok(Vec::new());
    }
    match serde_json::from_str::<Value>(&text)? {
        Value::Array(rows) => Ok(rows),
        row @ Value::Object(_) => Ok(vec![row]),
        other => Err(RemoteError::UnexpectedResponse(format!(
            "expected rows, got {other}"
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_filters() {
        assert_eq!(eq("c1"), "eq.c1");
        assert_eq!(
            in_list(&["m1".to_string(), "m\"2".to_string()]),
            "in.(\"m1\",\"m\\\"2\")"
        );
    }

    #[test]
    fn test_base_url_is_trimmed() {
        let mut config = ClientConfig::default();
        config.backend.url = "https://demo.example.co/".to_string();
        let client = RestClient::new(&config).unwrap();
        assert_eq!(client.base_url(), "https://demo.example.co");
    }
}
