//! CRM module (HTTP adapters)

pub mod http_role_feed;

pub use http_role_feed::HttpCrmRoleFeed;
