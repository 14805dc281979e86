use std::collections::BTreeMap;

use indicatif::{ProgressBar, ProgressDrawTarget, ProgressStyle};
use parking_lot::Mutex;

/// Point-in-time view of requested counts.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProgressSnapshot {
    pub total: u64,
    pub target_total: u64,
    pub per_entity: BTreeMap<String, u64>,
}

impl ProgressSnapshot {
    /// Entities whose requested count is still below `per_entity_target`.
    #[must_use]
    pub fn short_of(&self, per_entity_target: u64) -> Vec<&str> {
        self.per_entity
            .iter()
            .filter(|(_, count)| **count < per_entity_target)
            .map(|(entity, _)| entity.as_str())
            .collect()
    }
}

#[derive(Debug, Default)]
struct Counters {
    total: u64,
    per_entity: BTreeMap<String, u64>,
}

/// Per-entity requested counts merged into one overall view.
///
/// All mutation goes through one lock, held only for the in-memory update.
pub struct ProgressAggregator {
    counters: Mutex<Counters>,
    target_total: u64,
    bar: ProgressBar,
}

impl ProgressAggregator {
    /// Tracks `entities`, each aiming for `per_entity_target` requested items.
    /// The bar renders to stderr when `draw` is set and is hidden otherwise.
    #[must_use]
    pub fn new(entities: &[String], per_entity_target: u64, draw: bool) -> Self {
        let entity_count = u64::try_from(entities.len()).unwrap_or(u64::MAX);
        let target_total = per_entity_target.saturating_mul(entity_count);
        let bar = if draw {
            let bar = ProgressBar::with_draw_target(
                Some(target_total),
                ProgressDrawTarget::stderr(),
            );
            if let Ok(style) = ProgressStyle::with_template(
                "{spinner} [{elapsed_precise}] {bar:40} {pos}/{len} requested ({msg})",
            ) {
                bar.set_style(style);
            }
            bar.set_message(format!("{} communities", entities.len()));
            bar
        } else {
            ProgressBar::hidden()
        };

        let per_entity = entities.iter().map(|e| (e.clone(), 0)).collect();
        Self {
            counters: Mutex::new(Counters {
                total: 0,
                per_entity,
            }),
            target_total,
            bar,
        }
    }

    /// Adds `delta` to `entity` and to the global total.
    pub fn advance(&self, entity: &str, delta: u64) {
        {
            let mut counters = self.counters.lock();
            counters.total += delta;
            *counters.per_entity.entry(entity.to_string()).or_insert(0) += delta;
        }
        self.bar.inc(delta);
    }

    #[must_use]
    pub fn snapshot(&self) -> ProgressSnapshot {
        let counters = self.counters.lock();
        ProgressSnapshot {
            total: counters.total,
            target_total: self.target_total,
            per_entity: counters.per_entity.clone(),
        }
    }

    pub fn finish(&self) {
        self.bar.finish();
    }
}
