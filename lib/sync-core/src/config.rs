//! Derivation options

use serde::{Deserialize, Serialize};

/// Options controlling how endpoints are derived
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncOptions {
    /// Only register ports carrying an explicit `name` metadata value.
    /// When off, the Endpoints object's own name is used as a fallback.
    #[serde(default)]
    pub explicit: bool,
}

impl SyncOptions {
    pub fn explicit() -> Self {
        Self { explicit: true }
    }
}
