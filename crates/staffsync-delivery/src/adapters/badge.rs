//! In-memory stand-in for the security badge system.
//!
//! Creates and updates issue or refresh an active badge, deletes revoke it.
//! Records are keyed by entity id so repeated syncs converge on the same
//! state.

use std::{collections::HashMap, sync::Arc};

use serde::{Deserialize, Serialize};
use serde_json::Value;
use staffsync_core::EntityAction;
use tokio::sync::RwLock;
use tracing::debug;

use crate::{
    adapter::{AdapterHealth, IntegrationAdapter, SyncOutcome},
    error::Result,
};

/// Badge state for one employee.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BadgeRecord {
    /// Employee identifier.
    pub entity_id: String,
    /// Name printed on the badge, when the snapshot carries one.
    pub holder: Option<String>,
    /// Access zone derived from the employee's department.
    pub access_zone: String,
    /// Whether the badge opens doors.
    pub active: bool,
}

/// Mock badge adapter backed by a map.
#[derive(Debug, Clone, Default)]
pub struct MockBadgeAdapter {
    badges: Arc<RwLock<HashMap<String, BadgeRecord>>>,
}

impl MockBadgeAdapter {
    /// Adapter name used in configuration.
    pub const NAME: &'static str = "badge";

    /// Creates an adapter with no issued badges.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the badge for an employee, if one was ever issued.
    pub async fn badge(&self, entity_id: &str) -> Option<BadgeRecord> {
        self.badges.read().await.get(entity_id).cloned()
    }

    /// Number of badges issued, active or not.
    pub async fn badge_count(&self) -> usize {
        self.badges.read().await.len()
    }
}

fn text_field(payload: &Value, key: &str) -> Option<String> {
    payload.get(key).and_then(Value::as_str).map(str::to_string)
}

#[async_trait::async_trait]
impl IntegrationAdapter for MockBadgeAdapter {
    fn name(&self) -> &str {
        Self::NAME
    }

    async fn sync(
        &self,
        entity_id: &str,
        payload: &Value,
        action: EntityAction,
    ) -> Result<SyncOutcome> {
        let mut badges = self.badges.write().await;

        let outcome = match action {
            EntityAction::Create | EntityAction::Update => {
                let record = BadgeRecord {
                    entity_id: entity_id.to_string(),
                    holder: text_field(payload, "name"),
                    access_zone: text_field(payload, "department")
                        .unwrap_or_else(|| "general".to_string()),
                    active: true,
                };
                badges.insert(entity_id.to_string(), record);
                SyncOutcome::ok(format!("badge issued for {entity_id}"))
            },
            EntityAction::Delete => match badges.get_mut(entity_id) {
                Some(record) => {
                    record.active = false;
                    SyncOutcome::ok(format!("badge revoked for {entity_id}"))
                },
                None => SyncOutcome::ok(format!("no badge on file for {entity_id}")),
            },
        };

        debug!(entity_id, action = %action, "badge system updated");
        Ok(outcome)
    }

    async fn health_check(&self) -> Result<AdapterHealth> {
        let count = self.badges.read().await.len();
        Ok(AdapterHealth::healthy(format!("mock badge system tracking {count} badges")))
    }
}
