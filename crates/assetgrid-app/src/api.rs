// Copyright 2026 Phillip Cloud
// Licensed under the Apache License, Version 2.0

use serde_json::Value;
use thiserror::Error;

use crate::forms::NewAsset;
use crate::ids::AssetId;
use crate::model::AssetRecord;

/// Remote item collection. Implemented over HTTP in production and by
/// in-process backends for demo mode and tests.
pub trait AssetApi {
    fn list_items(&self) -> Result<Vec<AssetRecord>, ApiError>;

    /// `PATCH /api/items/{id}` with a partial body built by
    /// [`crate::FieldValue::to_patch`].
    fn patch_item(&self, id: &AssetId, patch: &Value) -> Result<(), ApiError>;

    fn delete_items(&self, ids: &[AssetId]) -> Result<(), ApiError>;

    fn create_item(&self, item: &NewAsset) -> Result<AssetRecord, ApiError>;
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ApiError {
    #[error("server returned {status}: {body}")]
    Status { status: u16, body: String },
    #[error("request failed: {0}")]
    Transport(String),
    #[error("invalid response: {0}")]
    Decode(String),
}

impl ApiError {
    /// Text shown to the user. A non-2xx response surfaces its body verbatim.
    pub fn detail(&self) -> String {
        match self {
            Self::Status { status, body } if body.trim().is_empty() => {
                format!("server returned {status}")
            }
            Self::Status { body, .. } => body.clone(),
            other => other.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::ApiError;

    #[test]
    fn status_detail_is_raw_body() {
        let error = ApiError::Status {
            status: 500,
            body: "database locked".to_owned(),
        };
        assert_eq!(error.detail(), "database locked");
        assert_eq!(error.to_string(), "server returned 500: database locked");
    }

    #[test]
    fn empty_body_falls_back_to_status_code() {
        let error = ApiError::Status {
            status: 404,
            body: "  ".to_owned(),
        };
        assert_eq!(error.detail(), "server returned 404");
    }

    #[test]
    fn transport_detail_keeps_prefix() {
        let error = ApiError::Transport("connection refused".to_owned());
        assert_eq!(error.detail(), "request failed: connection refused");
    }
}
