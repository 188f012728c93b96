use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use injectkit_core::ScriptPayload;
use reqwest::blocking::Client;
use reqwest::header::USER_AGENT;
use tracing::debug;

pub trait ScriptSource {
    fn fetch(&self) -> Result<ScriptPayload>;
}

#[derive(Debug, Clone)]
pub struct HttpScriptSource {
    client: Client,
    url: String,
    user_agent: String,
}

impl HttpScriptSource {
    pub fn new(url: &str, user_agent: &str, timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .context("failed to build HTTP client for script source")?;
        Ok(Self::with_client(client, url, user_agent))
    }

    pub fn with_client(client: Client, url: &str, user_agent: &str) -> Self {
        Self {
            client,
            url: url.to_string(),
            user_agent: user_agent.to_string(),
        }
    }

    pub fn url(&self) -> &str {
        &self.url
    }
}

impl ScriptSource for HttpScriptSource {
    fn fetch(&self) -> Result<ScriptPayload> {
        debug!(url = %self.url, "fetching script payload");
        let response = self
            .client
            .get(&self.url)
            .header(USER_AGENT, &self.user_agent)
            .send()
            .with_context(|| format!("script request failed: {}", self.url))?;

        let status = response.status();
        if !status.is_success() {
            return Err(anyhow!("script source returned HTTP {status}: {}", self.url));
        }

        let body = response
            .text()
            .with_context(|| format!("failed reading script response body: {}", self.url))?;
        parse_script_payload(&body)
            .with_context(|| format!("script source returned malformed payload: {}", self.url))
    }
}

/// Accepts any JSON object carrying string `content` and `sha` fields.
pub fn parse_script_payload(body: &str) -> Result<ScriptPayload> {
    let payload: ScriptPayload =
        serde_json::from_str(body).context("failed parsing script payload JSON")?;
    if payload.content_hash.trim().is_empty() {
        return Err(anyhow!("script payload has an empty sha"));
    }
    Ok(payload)
}
