//! Selection of the apps whose processes are sampled.

use crate::source::AppInfo;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

/// Rule for choosing tracked bundle identifiers from the app inventory.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TrackingPolicy {
    /// The first `limit` apps in inventory order
    FirstN { limit: usize },
    /// Exactly these bundle ids, when installed
    AllowList { bundle_ids: Vec<String> },
}

impl Default for TrackingPolicy {
    fn default() -> Self {
        TrackingPolicy::FirstN { limit: 10 }
    }
}

impl TrackingPolicy {
    /// Pick the tracked identifiers. Apps without a bundle id are never
    /// tracked, and each id appears at most once.
    pub fn select(&self, apps: &[AppInfo]) -> Vec<String> {
        let mut seen = HashSet::new();
        match self {
            TrackingPolicy::FirstN { limit } => apps
                .iter()
                .map(|app| app.bundle_id.as_str())
                .filter(|id| !id.is_empty() && seen.insert(*id))
                .take(*limit)
                .map(str::to_string)
                .collect(),
            TrackingPolicy::AllowList { bundle_ids } => {
                let installed: HashSet<&str> =
                    apps.iter().map(|app| app.bundle_id.as_str()).collect();
                bundle_ids
                    .iter()
                    .filter(|id| {
                        !id.is_empty() && installed.contains(id.as_str()) && seen.insert(id.as_str())
                    })
                    .cloned()
                    .collect()
            }
        }
    }
}
