//! The apiv1 response envelope shared by the origin and this proxy.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ApiResponse<T> {
    pub status: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<ApiErrorBody>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ApiErrorBody {
    pub code: i64,
    pub message: String,
    #[serde(default)]
    pub description: String,
}

impl<T> ApiResponse<T> {
    pub fn ok(data: T) -> Self {
        Self {
            status: true,
            data: Some(data),
            error: None,
        }
    }

    pub fn err(code: i64, message: impl Into<String>) -> Self {
        Self {
            status: false,
            data: None,
            error: Some(ApiErrorBody {
                code,
                message: message.into(),
                description: String::new(),
            }),
        }
    }
}

/// A loosely-typed probe used only to classify an upstream response without
/// committing to the shape of `data`.
#[derive(Debug, Clone, Deserialize)]
pub struct EnvelopeProbe {
    pub status: bool,
    #[serde(default)]
    pub error: Option<ApiErrorBody>,
}

impl EnvelopeProbe {
    /// An envelope is cacheable iff it reports success and carries no error
    /// code.
    #[must_use]
    pub fn is_cacheable(&self) -> bool {
        self.status && self.error.as_ref().is_none_or(|e| e.code == 0)
    }
}
