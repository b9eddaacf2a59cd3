use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Header carrying the key on every attempt and replay.
pub const IDEMPOTENCY_HEADER: &str = "X-Idempotency-Key";

/// Token shared by every attempt of one logical mutation so the server can
/// collapse retried side effects.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct IdempotencyKey(String);

impl IdempotencyKey {
    pub fn generate() -> Self {
        IdempotencyKey(Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<String> for IdempotencyKey {
    fn from(s: String) -> Self {
        IdempotencyKey(s)
    }
}

impl fmt::Display for IdempotencyKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
