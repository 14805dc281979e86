//! The `check` command.

use std::path::Path;

use modwatch_core::{load_targeting, AppConfig};
use modwatch_review::{load_instruction, load_schema};

use crate::{DEFAULT_PROMPT_PATH, DEFAULT_SCHEMA_PATH};

/// Everything a full pipeline run needs that is currently missing or broken.
fn problems(config: &AppConfig, prompt_path: &Path, schema_path: &Path) -> Vec<String> {
    let mut found = Vec::new();
    if config.reddit.is_none() {
        found.push(
            "REDDIT_CLIENT_ID, REDDIT_CLIENT_SECRET and REDDIT_USERNAME are required by gather"
                .to_string(),
        );
    }
    if config.perspective_api_key.is_none() {
        found.push("PERSPECTIVE_API_KEY is required by score and gather --score".to_string());
    }
    if config.gemini_api_key.is_none() {
        found.push("GEMINI_API_KEY is required by assess".to_string());
    }
    if let Err(e) = load_targeting(&config.targeting_path) {
        found.push(format!("targeting file: {e}"));
    }
    if let Err(e) = load_instruction(prompt_path) {
        found.push(format!("assessment prompt: {e}"));
    }
    if let Err(e) = load_schema(schema_path) {
        found.push(format!("assessment schema: {e}"));
    }
    found
}

pub(crate) fn run_check(config: &AppConfig) -> anyhow::Result<()> {
    println!("data directory: {}", config.data_dir.display());
    println!("log directory: {}", config.log_dir.display());
    let found = problems(
        config,
        Path::new(DEFAULT_PROMPT_PATH),
        Path::new(DEFAULT_SCHEMA_PATH),
    );
    if found.is_empty() {
        println!("configuration complete");
        return Ok(());
    }
    for problem in &found {
        println!("missing: {problem}");
    }
    anyhow::bail!("{} configuration problem(s) found", found.len())
}
