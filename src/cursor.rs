//! # Cursor Utilities
//!
//! This module provides utilities for encoding and decoding the opaque
//! pagination cursors used by the fetch log listing, with validation and
//! size checks on untrusted input.

use crate::error::ApiError;
use axum::http::StatusCode;
use base64::Engine;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Position within the fetch log listing, ordered by (created_at DESC, id).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CursorData {
    pub created_at: DateTime<Utc>,
    pub id: Uuid,
}

/// Encode cursor data as an opaque base64 string
pub fn encode_cursor(created_at: &DateTime<Utc>, id: &Uuid) -> String {
    let cursor_data = CursorData {
        created_at: *created_at,
        id: *id,
    };
    let json = serde_json::to_string(&cursor_data).unwrap();
    base64::engine::general_purpose::STANDARD.encode(json.as_bytes())
}

/// Decode cursor data from an opaque base64 string with validation
pub fn decode_cursor(cursor: &str) -> Result<CursorData, ApiError> {
    // Check cursor length to prevent extremely large inputs
    if cursor.len() > 1000 {
        return Err(ApiError::new(
            StatusCode::BAD_REQUEST,
            "VALIDATION_FAILED",
            "cursor is too long",
        ));
    }

    if cursor.is_empty() {
        return Err(ApiError::new(
            StatusCode::BAD_REQUEST,
            "VALIDATION_FAILED",
            "cursor cannot be empty",
        ));
    }

    // Validate base64 format
    if !cursor
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '+' || c == '/' || c == '=')
    {
        return Err(ApiError::new(
            StatusCode::BAD_REQUEST,
            "VALIDATION_FAILED",
            "cursor contains invalid characters",
        ));
    }

    let decoded = base64::engine::general_purpose::STANDARD
        .decode(cursor)
        .map_err(|_| {
            ApiError::new(
                StatusCode::BAD_REQUEST,
                "VALIDATION_FAILED",
                "cursor is not valid base64",
            )
        })?;

    if decoded.is_empty() {
        return Err(ApiError::new(
            StatusCode::BAD_REQUEST,
            "VALIDATION_FAILED",
            "cursor is empty after decoding",
        ));
    }

    if decoded.len() > 500 {
        return Err(ApiError::new(
            StatusCode::BAD_REQUEST,
            "VALIDATION_FAILED",
            "decoded cursor is too large",
        ));
    }

    let json = String::from_utf8(decoded).map_err(|_| {
        ApiError::new(
            StatusCode::BAD_REQUEST,
            "VALIDATION_FAILED",
            "cursor contains invalid UTF-8 data",
        )
    })?;

    let cursor_data: CursorData = serde_json::from_str(&json).map_err(|_| {
        ApiError::new(
            StatusCode::BAD_REQUEST,
            "VALIDATION_FAILED",
            "cursor contains invalid JSON structure",
        )
    })?;

    // Validate timestamp is reasonable (not too far in future or past)
    let now = Utc::now();
    let one_year_ago = now - chrono::Duration::days(365);
    let one_year_from_now = now + chrono::Duration::days(365);

    if cursor_data.created_at < one_year_ago {
        return Err(ApiError::new(
            StatusCode::BAD_REQUEST,
            "VALIDATION_FAILED",
            "cursor timestamp is too old",
        ));
    }

    if cursor_data.created_at > one_year_from_now {
        return Err(ApiError::new(
            StatusCode::BAD_REQUEST,
            "VALIDATION_FAILED",
            "cursor timestamp is too far in the future",
        ));
    }

    if cursor_data.id == Uuid::nil() {
        return Err(ApiError::new(
            StatusCode::BAD_REQUEST,
            "VALIDATION_FAILED",
            "cursor contains invalid ID",
        ));
    }

    Ok(cursor_data)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use uuid::Uuid;

    #[test]
    fn cursor_encoding_decoding() {
        let created_at = Utc::now();
        let id = Uuid::new_v4();

        let cursor_str = encode_cursor(&created_at, &id);
        let decoded = decode_cursor(&cursor_str).unwrap();

        assert_eq!(decoded.created_at, created_at);
        assert_eq!(decoded.id, id);
    }

    #[test]
    fn invalid_base64_is_rejected() {
        let result = decode_cursor("invalid-base64!");
        assert!(result.is_err());
    }

    #[test]
    fn empty_cursor_is_rejected() {
        let err = decode_cursor("").unwrap_err();
        assert_eq!(err.code, "VALIDATION_FAILED".into());
        assert!(err.message.contains("cannot be empty"));
    }

    #[test]
    fn oversized_cursor_is_rejected() {
        let long_cursor = "a".repeat(1001);
        let err = decode_cursor(&long_cursor).unwrap_err();
        assert!(err.message.contains("too long"));
    }

    #[test]
    fn invalid_characters_are_rejected() {
        let err = decode_cursor("cursor@#$%").unwrap_err();
        assert!(err.message.contains("invalid characters"));
    }

    #[test]
    fn invalid_utf8_is_rejected() {
        // Base64 that decodes to invalid UTF-8
        let err = decode_cursor("//8=").unwrap_err();
        assert!(err.message.contains("invalid UTF-8"));
    }

    #[test]
    fn invalid_json_is_rejected() {
        // "invalid json" in base64
        let err = decode_cursor("aW52YWxpZCBqc29u").unwrap_err();
        assert!(err.message.contains("invalid JSON structure"));
    }

    #[test]
    fn stale_timestamp_is_rejected() {
        let created_at = Utc::now() - chrono::Duration::days(400);
        let cursor_str = encode_cursor(&created_at, &Uuid::new_v4());

        let err = decode_cursor(&cursor_str).unwrap_err();
        assert!(err.message.contains("too old"));
    }

    #[test]
    fn future_timestamp_is_rejected() {
        let created_at = Utc::now() + chrono::Duration::days(400);
        let cursor_str = encode_cursor(&created_at, &Uuid::new_v4());

        let err = decode_cursor(&cursor_str).unwrap_err();
        assert!(err.message.contains("too far in the future"));
    }

    #[test]
    fn nil_uuid_is_rejected() {
        let cursor_str = encode_cursor(&Utc::now(), &Uuid::nil());

        let err = decode_cursor(&cursor_str).unwrap_err();
        assert!(err.message.contains("invalid ID"));
    }

    #[test]
    fn oversized_decoded_payload_is_rejected() {
        let large_data = "x".repeat(600);
        let json = format!(
            r#"{{"created_at":"2026-01-01T00:00:00Z","id":"550e8400-e29b-41d4-a716-446655440000","data":"{}"}}"#,
            large_data
        );
        let cursor_str = base64::engine::general_purpose::STANDARD.encode(json.as_bytes());

        let err = decode_cursor(&cursor_str).unwrap_err();
        assert!(err.message.contains("too large"));
    }

    #[test]
    fn unknown_fields_are_ignored() {
        let json = format!(
            r#"{{"created_at":"{}","id":"550e8400-e29b-41d4-a716-446655440000","extra":true}}"#,
            Utc::now().to_rfc3339()
        );
        let cursor_str = base64::engine::general_purpose::STANDARD.encode(json.as_bytes());

        assert!(decode_cursor(&cursor_str).is_ok());
    }
}
