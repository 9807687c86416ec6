//! HTTP handlers

pub mod groups;
pub mod health;
pub mod hierarchy;

use axum::http::HeaderMap;

use orgtree_shared::utils::parse_uuid;
use orgtree_shared::ActorId;

use crate::error::ApiError;

/// Header carrying the id of the person performing a write
pub const ACTOR_HEADER: &str = "x-actor-id";

/// Reads the acting user. Writes without the header are attributed to the
/// system; group creation rejects them.
pub fn actor_from_headers(headers: &HeaderMap) -> Result<ActorId, ApiError> {
    let Some(value) = headers.get(ACTOR_HEADER) else {
        return Ok(None);
    };
    let raw = value
        .to_str()
        .map_err(|_| ApiError::BadRequest(format!("{} is not valid text", ACTOR_HEADER)))?;
    parse_uuid(raw)
        .map(Some)
        .ok_or_else(|| ApiError::BadRequest(format!("{} must be a UUID", ACTOR_HEADER)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;
    use uuid::Uuid;

    #[test]
    fn test_actor_header_is_optional() {
        assert_eq!(actor_from_headers(&HeaderMap::new()).unwrap(), None);
    }

    #[test]
    fn test_actor_header_must_be_uuid() {
        let mut headers = HeaderMap::new();
        headers.insert(ACTOR_HEADER, HeaderValue::from_static("not-a-uuid"));
        assert!(matches!(actor_from_headers(&headers), Err(ApiError::BadRequest(_))));

        let id = Uuid::new_v4();
        headers.insert(ACTOR_HEADER, HeaderValue::from_str(&id.to_string()).unwrap());
        assert_eq!(actor_from_headers(&headers).unwrap(), Some(id));
    }
}
