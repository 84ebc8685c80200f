use crate::config::Settings;
use crate::fetch::error::FetchError;
use anyhow::{Context, Result};
use reqwest::StatusCode;
use serde_json::Value;
use std::time::Duration;

/// Result of one upstream GET.
#[derive(Debug, Clone, PartialEq)]
pub enum FetchOutcome {
    Found(Value),
    /// Upstream answered 404: the document is confirmed absent.
    NotFound,
    Failed(FetchError),
}

impl FetchOutcome {
    /// The document, if there is one. A JSON `null` body counts as absent.
    pub fn into_option(self) -> Option<Value> {
        match self {
            FetchOutcome::Found(Value::Null) => None,
            FetchOutcome::Found(v) => Some(v),
            FetchOutcome::NotFound | FetchOutcome::Failed(_) => None,
        }
    }
}

#[async_trait::async_trait]
pub trait JsonSource: Send + Sync {
    fn base_url(&self) -> &str;

    async fn fetch_json(&self, path: &str, query: &[(&str, String)]) -> FetchOutcome;
}

#[derive(Debug, Clone)]
pub struct HttpJsonSource {
    http: reqwest::Client,
    base_url: String,
}

impl HttpJsonSource {
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .context("failed to build upstream http client")?;

        Ok(Self {
            http,
            base_url: base_url.into(),
        })
    }

    pub fn from_settings(settings: &Settings) -> Result<Self> {
        Self::new(settings.api_base_url.clone(), settings.fetch_timeout)
    }

    fn url(&self, path: &str) -> String {
        if path.starts_with('/') {
            format!("{}{}", self.base_url.trim_end_matches('/'), path)
        } else {
            format!("{}/{}", self.base_url.trim_end_matches('/'), path)
        }
    }
}

#[async_trait::async_trait]
impl JsonSource for HttpJsonSource {
    fn base_url(&self) -> &str {
        &self.base_url
    }

    async fn fetch_json(&self, path: &str, query: &[(&str, String)]) -> FetchOutcome {
        let url = self.url(path);
        tracing::debug!(%url, "upstream fetch");

        let mut req = self.http.get(&url);
        if !query.is_empty() {
            req = req.query(query);
        }

        let res = match req.send().await {
            Ok(res) => res,
            Err(err) => {
                let err = FetchError::Network {
                    path: path.to_string(),
                    detail: err.to_string(),
                };
                tracing::warn!(path, error = %err, "upstream request failed");
                return FetchOutcome::Failed(err);
            }
        };

        let status = res.status();
        if status == StatusCode::NOT_FOUND {
            tracing::warn!(path, http_status = %status, "upstream document not found");
            return FetchOutcome::NotFound;
        }
        if !status.is_success() {
            tracing::warn!(path, http_status = %status, "upstream HTTP error");
            return FetchOutcome::Failed(FetchError::Status {
                path: path.to_string(),
                status: status.as_u16(),
            });
        }

        match res.json::<Value>().await {
            Ok(v) => FetchOutcome::Found(v),
            Err(err) => {
                let err = if err.is_decode() {
                    FetchError::Decode {
                        path: path.to_string(),
                        detail: err.to_string(),
                    }
                } else {
                    FetchError::Network {
                        path: path.to_string(),
                        detail: err.to_string(),
                    }
                };
                tracing::warn!(path, error = %err, "failed to read upstream response");
                FetchOutcome::Failed(err)
            }
        }
    }
}
