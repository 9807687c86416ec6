//! # OrgTree Core
//! 
//! Domain entities, hierarchy engine services, and repository traits for the
//! multi-tenant group hierarchy.

pub mod domain;
pub mod services;
pub mod repositories;
pub mod error;

// Re-export domain entities
pub use domain::*;
pub use error::DomainError;
