#![forbid(unsafe_code)]

//! Maps data units onto access categories.

use agg80211_core::AccessCategory;

use crate::frame::DataUnit;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Classifier {
    edca: bool,
}

impl Classifier {
    pub fn new(edca: bool) -> Self {
        Self { edca }
    }

    /// Category from the unit's TID, or best effort when EDCA is disabled.
    pub fn classify(&self, unit: &DataUnit) -> AccessCategory {
        if !self.edca {
            return AccessCategory::BestEffort;
        }
        AccessCategory::from_user_priority(unit.header().tid)
    }
}

impl Default for Classifier {
    fn default() -> Self {
        Self::new(true)
    }
}
