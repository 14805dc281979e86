use std::sync::Arc;

use rand::seq::IndexedRandom;

use crate::GatherError;

/// Builds search queries from the configured term lists.
///
/// A query is one targeting term chosen uniformly at random. When a neutral
/// list is configured, a random neutral term is appended.
#[derive(Debug, Clone)]
pub struct QueryBuilder {
    targeting: Arc<[String]>,
    neutral: Arc<[String]>,
}

impl QueryBuilder {
    /// Blank terms are dropped from both lists.
    ///
    /// # Errors
    ///
    /// Returns [`GatherError::Config`] when no targeting term remains.
    pub fn new(targeting: &[String], neutral: &[String]) -> Result<Self, GatherError> {
        let clean = |terms: &[String]| -> Arc<[String]> {
            terms
                .iter()
                .map(|t| t.trim())
                .filter(|t| !t.is_empty())
                .map(ToString::to_string)
                .collect()
        };
        let targeting = clean(targeting);
        if targeting.is_empty() {
            return Err(GatherError::Config(
                "at least one search term is required".to_string(),
            ));
        }
        Ok(Self {
            targeting,
            neutral: clean(neutral),
        })
    }

    #[must_use]
    pub fn next_query(&self) -> String {
        let mut rng = rand::rng();
        let target = self
            .targeting
            .choose(&mut rng)
            .map_or("", String::as_str);
        match self.neutral.choose(&mut rng) {
            Some(neutral) => format!("{target} {neutral}"),
            None => target.to_string(),
        }
    }
}
