use std::time::Duration;

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use reqwest::Client;
use serde_json::{Map, Value};

use super::RemoteConfigProvider;

/// Fetches `GET {base_url}/config/{name}` and expects a flat JSON object.
#[derive(Clone)]
pub struct HttpRemoteConfigProvider {
    client: Client,
    base_url: String,
}

impl HttpRemoteConfigProvider {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            client: Client::builder()
                .timeout(Duration::from_secs(2))
                .build()
                .unwrap_or_default(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
        }
    }
}

#[async_trait]
impl RemoteConfigProvider for HttpRemoteConfigProvider {
    async fn fetch(&self, name: &str) -> Result<Map<String, Value>> {
        let response = self
            .client
            .get(format!("{}/config/{}", self.base_url, name))
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(anyhow!("remote config server error: {}", response.status()));
        }

        match response.json::<Value>().await? {
            Value::Object(map) => Ok(map),
            other => Err(anyhow!("remote config is not an object: {}", type_name(&other))),
        }
    }
}

fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
