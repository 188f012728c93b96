use anyhow::{Context, Result};
use base64::engine::general_purpose::STANDARD as BASE64_STANDARD;
use base64::Engine;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScriptPayload {
    /// Base64 text as served by the source; may contain line breaks.
    pub content: String,
    #[serde(rename = "sha")]
    pub content_hash: String,
}

impl ScriptPayload {
    pub fn new(content: impl Into<String>, content_hash: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            content_hash: content_hash.into(),
        }
    }

    pub fn from_script(script: &str, content_hash: impl Into<String>) -> Self {
        Self::new(BASE64_STANDARD.encode(script.as_bytes()), content_hash)
    }

    pub fn same_version(&self, other: &ScriptPayload) -> bool {
        self.content_hash == other.content_hash
    }

    pub fn decode_script(&self) -> Result<String> {
        let compact = self
            .content
            .chars()
            .filter(|c| !c.is_ascii_whitespace())
            .collect::<String>();
        let bytes = BASE64_STANDARD.decode(compact.as_bytes()).with_context(|| {
            format!("script payload {} is not valid base64", self.content_hash)
        })?;
        String::from_utf8(bytes).with_context(|| {
            format!("script payload {} does not decode to UTF-8 text", self.content_hash)
        })
    }
}
