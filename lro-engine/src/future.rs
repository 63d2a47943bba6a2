//! Resume records for in-flight long-running operations.
//!
//! A record is written when a provider call was still running at the end of a
//! pass, and removed once a later pass sees the operation finish. The resume
//! token itself is opaque to the engine and is stored base64-encoded.

use std::fmt;

use base64::engine::general_purpose::URL_SAFE;
use base64::Engine;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::error::ProviderError;
use crate::provider::PollHandle;

/// Which kind of operation a record tracks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum OperationKind {
    Create,
    Delete,
}

impl fmt::Display for OperationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OperationKind::Create => f.write_str("Create"),
            OperationKind::Delete => f.write_str("Delete"),
        }
    }
}

/// Errors decoding the token out of a stored record.
#[derive(Debug, Clone, Error)]
pub enum DecodeError {
    #[error("future data is empty")]
    Empty,

    #[error("failed to base64-decode future data: {0}")]
    Base64(#[from] base64::DecodeError),

    #[error("future data is not valid UTF-8: {0}")]
    Utf8(#[from] std::string::FromUtf8Error),
}

/// Identity of a record. At most one record exists per key.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct RecordKey {
    pub resource_name: String,
    pub service_name: String,
    pub kind: OperationKind,
}

impl RecordKey {
    pub fn new(resource_name: &str, service_name: &str, kind: OperationKind) -> Self {
        Self {
            resource_name: resource_name.to_string(),
            service_name: service_name.to_string(),
            kind,
        }
    }
}

/// Persisted continuation state for one in-flight operation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResumeRecord {
    pub kind: OperationKind,
    pub service_name: String,
    pub resource_name: String,
    pub resource_group: String,
    /// Base64 (URL-safe) encoding of the provider's resume token.
    pub data: String,
}

impl ResumeRecord {
    /// Build a record around a raw resume token.
    pub fn new(
        kind: OperationKind,
        service_name: &str,
        resource_name: &str,
        resource_group: &str,
        token: &str,
    ) -> Self {
        Self {
            kind,
            service_name: service_name.to_string(),
            resource_name: resource_name.to_string(),
            resource_group: resource_group.to_string(),
            data: URL_SAFE.encode(token.as_bytes()),
        }
    }

    /// Build a record from a provider poll handle.
    pub fn from_handle(
        handle: &dyn PollHandle,
        kind: OperationKind,
        service_name: &str,
        resource_name: &str,
        resource_group: &str,
    ) -> Result<Self, ProviderError> {
        let token = handle
            .resume_token()
            .map_err(|e| e.context("failed to get resume token from poller"))?;
        Ok(Self::new(
            kind,
            service_name,
            resource_name,
            resource_group,
            &token,
        ))
    }

    pub fn key(&self) -> RecordKey {
        RecordKey::new(&self.resource_name, &self.service_name, self.kind)
    }

    /// Decode the provider's resume token.
    pub fn resume_token(&self) -> Result<String, DecodeError> {
        if self.data.is_empty() {
            return Err(DecodeError::Empty);
        }
        let bytes = URL_SAFE.decode(self.data.as_bytes())?;
        Ok(String::from_utf8(bytes)?)
    }
}
