use anyhow::Context;
use reqwest::{Response, StatusCode};
use serde_json::{Map, Value};

use super::config::{load_server_config, DEFAULT_SERVER_URL};
use crate::error::ErrorResponse;
use crate::rest::make_path;

/// HTTP client for one Alpaca server
pub struct ApiClient {
    http: reqwest::Client,
    base_url: String,
    prefix: String,
}

impl ApiClient {
    pub fn new(base_url: impl Into<String>, prefix: impl Into<String>) -> Self {
        Self {
            http: reqwest::Client::new(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            prefix: prefix.into(),
        }
    }

    /// Client for a saved server (or the current one). Falls back to
    /// `ALPACA_URL`, then to the default local address.
    pub fn from_saved(server: Option<&str>) -> anyhow::Result<Self> {
        let config = load_server_config()?;
        if let Some((_, saved)) = config.resolve(server)? {
            return Ok(Self::new(saved.url.clone(), saved.prefix.clone()));
        }

        let url = std::env::var("ALPACA_URL").unwrap_or_else(|_| DEFAULT_SERVER_URL.to_string());
        Ok(Self::new(url, "api"))
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, record: &str, more: &[&str]) -> String {
        format!("{}{}", self.base_url, make_path(&self.prefix, record, more))
    }

    pub async fn list(&self, record: &str) -> anyhow::Result<Value> {
        let response = self.http.get(self.url(record, &[])).send().await?;
        json_body(response).await
    }

    pub async fn get(&self, record: &str, id: &str) -> anyhow::Result<Value> {
        let response = self.http.get(self.url(record, &[id])).send().await?;
        json_body(response).await
    }

    pub async fn create(&self, record: &str, doc: &Value) -> anyhow::Result<Value> {
        let response = self.http.post(self.url(record, &[])).json(doc).send().await?;
        json_body(response).await
    }

    pub async fn update(&self, record: &str, id: &str, changes: &Value) -> anyhow::Result<Value> {
        let response = self.http.put(self.url(record, &[id])).json(changes).send().await?;
        json_body(response).await
    }

    pub async fn delete(&self, record: &str, id: &str) -> anyhow::Result<()> {
        let response = self.http.delete(self.url(record, &[id])).send().await?;
        check_status(response).await.map(|_| ())
    }

    pub async fn search(&self, record: &str, terms: &Map<String, Value>) -> anyhow::Result<Value> {
        let response = self
            .http
            .post(self.url(record, &["_search"]))
            .json(terms)
            .send()
            .await?;
        json_body(response).await
    }

    pub async fn version(&self) -> anyhow::Result<Value> {
        let response = self.http.get(self.url("version", &[])).send().await?;
        json_body(response).await
    }

    /// Status of `/health`; a 503 still counts as an answer
    pub async fn health(&self) -> anyhow::Result<(StatusCode, Value)> {
        let response = self
            .http
            .get(format!("{}/health", self.base_url))
            .send()
            .await
            .with_context(|| format!("{} is unreachable", self.base_url))?;
        let status = response.status();
        let body = response.json::<Value>().await.unwrap_or(Value::Null);
        Ok((status, body))
    }
}

async fn check_status(response: Response) -> anyhow::Result<Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let text = response.text().await.unwrap_or_default();
    let message = serde_json::from_str::<ErrorResponse>(&text)
        .map(|e| e.error)
        .unwrap_or(text);
    anyhow::bail!("{} ({})", message, status)
}

async fn json_body(response: Response) -> anyhow::Result<Value> {
    let response = check_status(response).await?;
    Ok(response.json::<Value>().await?)
}
