use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Unique identifier for an orchestration instance.
///
/// Instance ids are opaque strings: callers may pick their own (for example
/// an order number) or let the engine generate one. Wrapping the string keeps
/// instance ids from being mixed up with activity names or other text.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct InstanceId(String);

/// Error returned when a caller-supplied instance id is unusable.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InvalidInstanceId {
    pub reason: &'static str,
}

impl std::fmt::Display for InvalidInstanceId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "invalid instance id: {}", self.reason)
    }
}

impl std::error::Error for InvalidInstanceId {}

impl InstanceId {
    /// Maximum accepted length for caller-supplied ids.
    pub const MAX_LEN: usize = 256;

    /// Creates a new random instance ID.
    pub fn new() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    /// Creates an instance ID from a caller-supplied string.
    pub fn parse(id: impl Into<String>) -> Result<Self, InvalidInstanceId> {
        let id = id.into();
        if id.trim().is_empty() {
            return Err(InvalidInstanceId {
                reason: "must not be blank",
            });
        }
        if id.len() > Self::MAX_LEN {
            return Err(InvalidInstanceId {
                reason: "longer than 256 bytes",
            });
        }
        if id.chars().any(char::is_control) {
            return Err(InvalidInstanceId {
                reason: "contains control characters",
            });
        }
        Ok(Self(id))
    }

    /// Returns the id as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for InstanceId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for InstanceId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<Uuid> for InstanceId {
    fn from(uuid: Uuid) -> Self {
        Self(uuid.to_string())
    }
}

impl AsRef<str> for InstanceId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}
