use std::collections::HashSet;
use std::path::Path;

use serde::Deserialize;

use crate::ConfigError;

fn default_attributes() -> Vec<String> {
    vec!["TOXICITY".to_string()]
}

/// Communities to gather from and the term lists queries are built from.
#[derive(Debug, Clone, Deserialize)]
pub struct TargetingFile {
    pub communities: Vec<String>,
    pub search_terms: Vec<String>,
    #[serde(default)]
    pub neutral_terms: Vec<String>,
    #[serde(default = "default_attributes")]
    pub requested_attributes: Vec<String>,
}

/// Load and validate the targeting configuration from a YAML file.
///
/// # Errors
///
/// Returns `ConfigError` if the file cannot be read, parsed, or fails validation.
pub fn load_targeting(path: &Path) -> Result<TargetingFile, ConfigError> {
    let content = std::fs::read_to_string(path).map_err(|e| ConfigError::TargetingFileIo {
        path: path.display().to_string(),
        source: e,
    })?;

    let targeting: TargetingFile = serde_yaml::from_str(&content)?;
    validate_targeting(&targeting)?;

    Ok(targeting)
}

fn validate_targeting(targeting: &TargetingFile) -> Result<(), ConfigError> {
    if targeting.communities.is_empty() {
        return Err(ConfigError::Validation(
            "at least one community is required".to_string(),
        ));
    }
    if targeting.search_terms.iter().all(|t| t.trim().is_empty()) {
        return Err(ConfigError::Validation(
            "search_terms must contain at least one non-empty term".to_string(),
        ));
    }
    if targeting.requested_attributes.is_empty() {
        return Err(ConfigError::Validation(
            "requested_attributes must not be empty".to_string(),
        ));
    }

    let mut seen = HashSet::new();
    for community in &targeting.communities {
        if community.trim().is_empty() {
            return Err(ConfigError::Validation(
                "community name must be non-empty".to_string(),
            ));
        }
        if !seen.insert(community.to_lowercase()) {
            return Err(ConfigError::Validation(format!(
                "duplicate community: '{community}'"
            )));
        }
    }

    Ok(())
}
