//! Reader configuration. Defaults reproduce the instrument dialect.

use std::fs;
use std::path::Path;

use bon::Builder;
use serde::{Deserialize, Serialize};

use crate::error::Result;

/// Text encoding of the embedded metadata document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TextEncoding {
    Utf8,
    #[default]
    Utf16Le,
}

impl TextEncoding {
    pub fn name(self) -> &'static str {
        match self {
            Self::Utf8 => "UTF-8",
            Self::Utf16Le => "UTF-16LE",
        }
    }

    /// Encode marker text the way it appears in the container.
    pub fn encode(self, text: &str) -> Vec<u8> {
        match self {
            Self::Utf8 => text.as_bytes().to_vec(),
            Self::Utf16Le => crate::utils::misc::encode_utf16le(text),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Builder)]
#[serde(default)]
pub struct LocatorConfig {
    #[builder(into, default = "<MCDSchema".to_string())]
    pub start_marker: String,
    #[builder(into, default = "</MCDSchema>".to_string())]
    pub end_marker: String,
    #[builder(default)]
    pub encoding: TextEncoding,
    /// Bytes read per step of the backward marker search.
    #[builder(default = 1 << 16)]
    pub block_size: usize,
}

impl Default for LocatorConfig {
    fn default() -> Self {
        Self::builder().build()
    }
}

impl LocatorConfig {
    /// Dialect of a standalone UTF-8 schema file.
    pub fn utf8() -> Self {
        Self::builder().encoding(TextEncoding::Utf8).build()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Builder)]
#[serde(default)]
pub struct ResolverConfig {
    /// Treat `DataEndOffset` as the last byte of the range instead of one past it.
    #[builder(default)]
    pub end_offset_inclusive: bool,
    /// Bytes per value when `ValueBytes` is absent.
    #[builder(default = 8)]
    pub default_value_bytes: u64,
}

impl Default for ResolverConfig {
    fn default() -> Self {
        Self::builder().build()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Builder)]
#[serde(default)]
pub struct McdConfig {
    #[builder(default)]
    pub locator: LocatorConfig,
    #[builder(default)]
    pub resolver: ResolverConfig,
    /// Permit decoding 64-bit stored values into 32-bit stacks.
    #[builder(default)]
    pub allow_narrowing: bool,
}

impl Default for McdConfig {
    fn default() -> Self {
        Self::builder().build()
    }
}

impl McdConfig {
    pub fn from_json_str(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self> {
        let text = fs::read_to_string(path)?;
        Self::from_json_str(&text)
    }
}
