//! ID and credential generation.

use ulid::Ulid;
use uuid::Uuid;

/// Generator for entity IDs and bearer tokens.
#[derive(Debug, Clone, Default)]
pub struct IdGenerator {
    _private: (),
}

impl IdGenerator {
    /// Create a new ID generator.
    #[must_use]
    pub const fn new() -> Self {
        Self { _private: () }
    }

    /// Generate a new lowercase ULID.
    ///
    /// Primary keys sort by creation time, which feeds use as a tie-breaker
    /// for posts created within the same timestamp.
    #[must_use]
    pub fn generate(&self) -> String {
        Ulid::new().to_string().to_lowercase()
    }

    /// Generate a random bearer token.
    #[must_use]
    pub fn generate_token(&self) -> String {
        // No time component, unlike entity IDs
        Uuid::new_v4().simple().to_string()
    }
}
