//! Common types

use uuid::Uuid;

/// Who performed a write. `None` marks the system (CRM synchronization).
pub type ActorId = Option<Uuid>;
