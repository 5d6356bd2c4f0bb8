use std::path::Path;

use anyhow::{Context, Result};
use serde::Deserialize;
use tally_engine::ErrorPolicy;

/// Settings read from `tally.toml`. Command-line flags take precedence.
#[derive(Debug, Default, Deserialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct TallyConfig {
    /// IANA zone for datetimes without an offset.
    #[serde(default = "default_timezone")]
    pub timezone: String,

    /// Whether an invalid event aborts the run or is skipped.
    #[serde(default)]
    pub on_error: ErrorPolicy,
}

fn default_timezone() -> String {
    "UTC".to_string()
}

impl TallyConfig {
    pub fn defaults() -> Self {
        Self {
            timezone: default_timezone(),
            on_error: ErrorPolicy::default(),
        }
    }

    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("reading config {}", path.display()))?;
        Self::parse(&text).with_context(|| format!("parsing config {}", path.display()))
    }

    pub fn parse(text: &str) -> Result<Self> {
        Ok(toml::from_str(text)?)
    }
}
