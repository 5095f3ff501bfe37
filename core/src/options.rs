//! Run-time limits for compiled codecs.

use anyhow::{Context, Result};
use serde::Deserialize;

use crate::val::{Format, parse_document};

/// Limits applied to every decode/encode run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CodecOptions {
    /// Largest bound a single loop may take; `None` means unlimited.
    pub max_iterations: Option<usize>,
    pub max_depth: usize,
}

impl Default for CodecOptions {
    fn default() -> Self {
        Self {
            max_iterations: None,
            max_depth: 1024,
        }
    }
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
struct ConfigDocument {
    #[serde(default)]
    codec: CodecSection,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
struct CodecSection {
    #[serde(default)]
    max_iterations: Option<usize>,
    #[serde(default)]
    max_depth: Option<usize>,
}

impl CodecOptions {
    /// Reads the `codec` section of a JSON/YAML/TOML document. Missing keys
    /// keep their defaults.
    pub fn from_document(input: &str, format: Option<Format>) -> Result<Self> {
        let value = parse_document(input, format)?;
        let doc: ConfigDocument = serde_json::from_value(value).context("invalid codec configuration")?;
        Ok(Self::default().merge(doc.codec))
    }

    fn merge(mut self, section: CodecSection) -> Self {
        if let Some(v) = section.max_iterations {
            self.max_iterations = Some(v);
        }
        if let Some(v) = section.max_depth.filter(|v| *v > 0) {
            self.max_depth = v;
        }
        self
    }

    pub fn with_max_iterations(mut self, max: usize) -> Self {
        self.max_iterations = Some(max);
        self
    }

    pub fn with_max_depth(mut self, depth: usize) -> Self {
        self.max_depth = depth;
        self
    }
}
