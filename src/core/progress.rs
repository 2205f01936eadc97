//! Persisted pipeline progress

use serde::{Deserialize, Serialize};

/// Which build phases have completed for a target
///
/// The flags are independent: a later flag being set does not imply the
/// earlier ones are. The pipeline only ever sets them forward and clears
/// them all at once on clean.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Progress {
    pub initialized: bool,
    pub dependencies_updated: bool,
    pub dependencies_built: bool,
    pub application_built: bool,
}

impl Progress {
    pub fn reset(&mut self) {
        *self = Progress::default();
    }

    pub fn is_pristine(&self) -> bool {
        *self == Progress::default()
    }
}
