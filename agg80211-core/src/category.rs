#![forbid(unsafe_code)]

//! EDCA access categories.

use serde::{Deserialize, Serialize};

/// Access category selecting one of the parallel data queues.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
#[repr(u8)]
pub enum AccessCategory {
    Background = 0,
    BestEffort = 1,
    Video = 2,
    Voice = 3,
}

impl AccessCategory {
    pub const COUNT: usize = 4;

    /// All categories in queue-index order.
    pub const ALL: [AccessCategory; 4] = [
        AccessCategory::Background,
        AccessCategory::BestEffort,
        AccessCategory::Video,
        AccessCategory::Voice,
    ];

    /// Categories in strict dequeue priority order, highest first.
    pub const BY_PRIORITY: [AccessCategory; 4] = [
        AccessCategory::Voice,
        AccessCategory::Video,
        AccessCategory::BestEffort,
        AccessCategory::Background,
    ];

    pub fn index(self) -> usize {
        self as usize
    }

    pub fn from_index(idx: usize) -> Option<Self> {
        Self::ALL.get(idx).copied()
    }

    /// 802.1D user priority to access category (IEEE 802.11-2016 Table 10-1).
    pub fn from_user_priority(up: u8) -> Self {
        match up & 0x07 {
            1 | 2 => AccessCategory::Background,
            0 | 3 => AccessCategory::BestEffort,
            4 | 5 => AccessCategory::Video,
            _ => AccessCategory::Voice,
        }
    }

    /// Lowest user priority mapped to this category; used as the TID of
    /// block-ack negotiations started for the category.
    pub fn tid(self) -> u8 {
        match self {
            AccessCategory::Background => 1,
            AccessCategory::BestEffort => 0,
            AccessCategory::Video => 4,
            AccessCategory::Voice => 6,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            AccessCategory::Background => "AC_BK",
            AccessCategory::BestEffort => "AC_BE",
            AccessCategory::Video => "AC_VI",
            AccessCategory::Voice => "AC_VO",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn user_priority_mapping() {
        let mapped: Vec<_> = (0u8..8).map(AccessCategory::from_user_priority).collect();
        assert_eq!(
            mapped,
            vec![
                AccessCategory::BestEffort,
                AccessCategory::Background,
                AccessCategory::Background,
                AccessCategory::BestEffort,
                AccessCategory::Video,
                AccessCategory::Video,
                AccessCategory::Voice,
                AccessCategory::Voice,
            ]
        );
    }

    #[test]
    fn tid_maps_back_to_category() {
        for ac in AccessCategory::ALL {
            assert_eq!(AccessCategory::from_user_priority(ac.tid()), ac);
            assert_eq!(AccessCategory::from_index(ac.index()), Some(ac));
        }
    }
}
