//! Decomposer options.

use std::fs::File;
use std::path::Path;

use anyhow::Context;
use serde::Deserialize;
use strum_macros::{AsRefStr, Display, EnumString};

/// How candidate sources are found for a star.
#[derive(
    Copy, Clone, Debug, Default, PartialEq, Eq, Deserialize, AsRefStr, Display, EnumString,
)]
#[serde(try_from = "String")]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE", ascii_case_insensitive)]
pub enum SourceSelectionMode {
    /// Intersect the molecules offering each predicate of a star.
    #[default]
    Default,
    /// Route triples to partitions (clusters) of a very large federation.
    PartitionBased,
}

impl TryFrom<String> for SourceSelectionMode {
    type Error = strum::ParseError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct DecomposerOptions {
    pub source_selection_mode: SourceSelectionMode,
    /// When false, services sent to the same endpoint and sharing a join variable are merged
    /// into one call.
    pub join_locally: bool,
}

impl Default for DecomposerOptions {
    fn default() -> Self {
        Self {
            source_selection_mode: SourceSelectionMode::Default,
            join_locally: true,
        }
    }
}

impl DecomposerOptions {
    pub fn from_yaml_str(yaml: &str) -> anyhow::Result<Self> {
        serde_yaml::from_str(yaml).context("Failed to parse decomposer options")
    }

    pub fn from_yaml_file<P: AsRef<Path>>(path: P) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let file = File::open(path)
            .with_context(|| format!("Failed to open decomposer options file: {:?}", path))?;
        serde_yaml::from_reader(file)
            .with_context(|| format!("Failed to load decomposer options from file: {:?}", path))
    }
}
