use anyhow::{anyhow, Context};
use std::env::VarError;
use std::net::SocketAddr;
use std::path::PathBuf;

pub const DEFAULT_WEBFLOW_API_BASE: &str = "https://api.webflow.com/v2";
pub const DEFAULT_ANTHROPIC_API_BASE: &str = "https://api.anthropic.com";
pub const DEFAULT_CLAUDE_MODEL: &str = "claude-sonnet-4-20250514";

#[derive(Debug, Clone)]
pub struct Config {
    pub webflow_token: Option<String>,
    pub webflow_site_id: Option<String>,
    pub webflow_api_base: String,
    pub anthropic_key: Option<String>,
    pub anthropic_api_base: String,
    pub claude_model: String,
    pub mapbox_token: String,
    pub static_dir: PathBuf,
    pub addr: SocketAddr,
}

impl Config {
    pub fn from_env() -> anyhow::Result<Self> {
        let host = optional_var("HOST")?.unwrap_or_else(|| "0.0.0.0".to_string());
        let port: u16 = optional_var("PORT")?
            .and_then(|v| v.parse().ok())
            .unwrap_or(3000);
        let addr: SocketAddr = format!("{host}:{port}")
            .parse()
            .context("Invalid HOST/PORT combination")?;

        Ok(Self {
            webflow_token: optional_var("WEBFLOW_API_TOKEN")?,
            webflow_site_id: optional_var("WEBFLOW_SITE_ID")?,
            webflow_api_base: optional_var("WEBFLOW_API_BASE")?
                .unwrap_or_else(|| DEFAULT_WEBFLOW_API_BASE.to_string()),
            anthropic_key: optional_var("ANTHROPIC_API_KEY")?,
            anthropic_api_base: optional_var("ANTHROPIC_API_BASE")?
                .unwrap_or_else(|| DEFAULT_ANTHROPIC_API_BASE.to_string()),
            claude_model: optional_var("CLAUDE_MODEL")?
                .unwrap_or_else(|| DEFAULT_CLAUDE_MODEL.to_string()),
            mapbox_token: optional_var("MAPBOX_TOKEN")?.unwrap_or_default(),
            static_dir: PathBuf::from(
                optional_var("STATIC_DIR")?.unwrap_or_else(|| "static".to_string()),
            ),
            addr,
        })
    }

    pub fn has_webflow(&self) -> bool {
        self.webflow_token.is_some() && self.webflow_site_id.is_some()
    }

    pub fn has_claude(&self) -> bool {
        self.anthropic_key.is_some()
    }
}

fn optional_var(name: &str) -> anyhow::Result<Option<String>> {
    match std::env::var(name) {
        Ok(value) if value.trim().is_empty() => Ok(None),
        Ok(value) => Ok(Some(value.trim().to_string())),
        Err(VarError::NotPresent) => Ok(None),
        Err(VarError::NotUnicode(err)) => Err(anyhow!("{name} contains invalid unicode: {err:?}")),
    }
}

#[cfg(test)]
pub(crate) fn test_config() -> Config {
    Config {
        webflow_token: None,
        webflow_site_id: None,
        webflow_api_base: DEFAULT_WEBFLOW_API_BASE.to_string(),
        anthropic_key: None,
        anthropic_api_base: DEFAULT_ANTHROPIC_API_BASE.to_string(),
        claude_model: DEFAULT_CLAUDE_MODEL.to_string(),
        mapbox_token: "pk.public-map-token".to_string(),
        static_dir: PathBuf::from(concat!(env!("CARGO_MANIFEST_DIR"), "/static")),
        addr: SocketAddr::from(([127, 0, 0, 1], 0)),
    }
}
