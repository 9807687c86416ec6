//! CRM role record, upserted from the external feed

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CrmRole {
    pub id: String,
    pub tenant_id: Uuid,
    pub name: String,
    /// Shape of the source hierarchy
    pub parent_id: Option<String>,
    pub updated_at: DateTime<Utc>,
}

impl CrmRole {
    pub fn new(tenant_id: Uuid, id: impl Into<String>, name: impl Into<String>, parent_id: Option<String>) -> Self {
        Self {
            id: id.into(),
            tenant_id,
            name: name.into(),
            parent_id,
            updated_at: Utc::now(),
        }
    }

    /// Id of the group synthesized for this role when no existing group backs it.
    pub fn derived_group_id(&self) -> Uuid {
        Uuid::new_v5(&self.tenant_id, self.id.as_bytes())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_derived_group_id_is_deterministic() {
        let tenant_id = Uuid::new_v4();
        let a = CrmRole::new(tenant_id, "00E1", "Sales", None);
        let b = CrmRole::new(tenant_id, "00E1", "Renamed", None);
        let other_tenant = CrmRole::new(Uuid::new_v4(), "00E1", "Sales", None);

        assert_eq!(a.derived_group_id(), b.derived_group_id());
        assert_ne!(a.derived_group_id(), other_tenant.derived_group_id());
    }
}
