//! Tenant domain entity

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// How much of a tenant's hierarchy is CRM-derived. Variants are ordered by
/// completeness; any transition between them is legal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GroupSyncState {
    Inactive,
    PeopleOnly,
    Active,
}

impl GroupSyncState {
    pub fn as_str(&self) -> &'static str {
        match self {
            GroupSyncState::Inactive => "inactive",
            GroupSyncState::PeopleOnly => "people_only",
            GroupSyncState::Active => "active",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "inactive" => Some(GroupSyncState::Inactive),
            "people_only" => Some(GroupSyncState::PeopleOnly),
            "active" => Some(GroupSyncState::Active),
            _ => None,
        }
    }
}

impl Default for GroupSyncState {
    fn default() -> Self {
        GroupSyncState::Inactive
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Tenant {
    pub id: Uuid,
    pub name: String,

    /// Derived from hierarchy facts; recomputed after hierarchy writes
    pub group_sync_state: GroupSyncState,
    /// Last time the CRM role feed was drained for this tenant
    pub crm_roles_synced_at: Option<DateTime<Utc>>,

    // Audit
    pub created_at: DateTime<Utc>,
    pub updated_at: Option<DateTime<Utc>>,
}

impl Tenant {
    pub fn new(id: Uuid, name: String) -> Self {
        Self {
            id,
            name: name.trim().to_string(),
            group_sync_state: GroupSyncState::Inactive,
            crm_roles_synced_at: None,
            created_at: Utc::now(),
            updated_at: None,
        }
    }
}
