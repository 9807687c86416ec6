// ============================================================================
// OrgTree Core - Person Entity
// File: crates/orgtree-core/src/domain/person.rs
// Description: Member of a tenant, placed into at most one group
// ============================================================================

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::group::GroupType;

/// Person status enumeration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PersonStatus {
    Active,
    Inactive,
}

impl PersonStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            PersonStatus::Active => "active",
            PersonStatus::Inactive => "inactive",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "active" => Some(PersonStatus::Active),
            "inactive" => Some(PersonStatus::Inactive),
            _ => None,
        }
    }
}

impl Default for PersonStatus {
    fn default() -> Self {
        PersonStatus::Active
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Person {
    pub id: Uuid,
    pub tenant_id: Uuid,

    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub email: String,

    /// Owned by the person-group reconciler
    pub group_id: Option<Uuid>,
    pub role_ids: Vec<Uuid>,
    pub crm_role_ids: Vec<String>,

    /// Mirrors the containing group's type
    #[serde(rename = "type")]
    pub person_type: GroupType,

    pub is_provisioned: bool,
    /// Membership is CRM-derived rather than manually set
    pub is_synced: bool,
    pub status: PersonStatus,

    // Audit fields
    pub created_at: DateTime<Utc>,
    pub updated_at: Option<DateTime<Utc>>,
}

impl Person {
    pub fn new(tenant_id: Uuid, email: String, is_synced: bool) -> Self {
        Self {
            id: Uuid::new_v4(),
            tenant_id,
            first_name: None,
            last_name: None,
            email: email.trim().to_lowercase(),
            group_id: None,
            role_ids: Vec::new(),
            crm_role_ids: Vec::new(),
            person_type: GroupType::Ic,
            is_provisioned: false,
            is_synced,
            status: PersonStatus::Active,
            created_at: Utc::now(),
            updated_at: None,
        }
    }

    pub fn is_active(&self) -> bool {
        self.status == PersonStatus::Active
    }

    pub fn full_name(&self) -> String {
        match (&self.first_name, &self.last_name) {
            (Some(f), Some(l)) => format!("{} {}", f, l),
            (Some(f), None) => f.clone(),
            (None, Some(l)) => l.clone(),
            _ => self.email.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_full_name_falls_back_to_email() {
        let mut person = Person::new(Uuid::new_v4(), " Ada@Example.com ".to_string(), true);
        assert_eq!(person.full_name(), "ada@example.com");

        person.first_name = Some("Ada".to_string());
        assert_eq!(person.full_name(), "Ada");

        person.last_name = Some("Lovelace".to_string());
        assert_eq!(person.full_name(), "Ada Lovelace");
    }
}
