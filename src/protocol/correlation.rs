use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Correlation ID for matching requests to responses
///
/// A random (v4) UUID generated on the client for every request and echoed
/// back by the server as `response_to`. It travels inside the serialized
/// message, never in the frame header.
///
/// # Format
///
/// Displayed in the standard UUID form: `550e8400-e29b-41d4-a9b6-446655440000`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CorrelationId(Uuid);

impl CorrelationId {
    // ---

    /// Generate a new unique correlation ID
    pub fn generate() -> Self {
        // ---
        Self(Uuid::new_v4())
    }

    /// The underlying 128-bit value
    pub fn as_uuid(&self) -> &Uuid {
        // ---
        &self.0
    }
}

impl fmt::Display for CorrelationId {
    // ---

    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // ---
        write!(f, "{}", self.0)
    }
}

impl From<Uuid> for CorrelationId {
    // ---

    fn from(uuid: Uuid) -> Self {
        // ---
        Self(uuid)
    }
}
