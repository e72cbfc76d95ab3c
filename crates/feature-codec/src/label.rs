//! Stress level label codec

use serde::{Deserialize, Serialize};

/// Three-way classification output
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum StressLevel {
    Low,
    Moderate,
    High,
}

impl StressLevel {
    /// All levels in class order
    pub const ALL: [StressLevel; 3] = [StressLevel::Low, StressLevel::Moderate, StressLevel::High];

    /// Map a classifier class index
    pub fn from_class(class: usize) -> Option<Self> {
        match class {
            0 => Some(StressLevel::Low),
            1 => Some(StressLevel::Moderate),
            2 => Some(StressLevel::High),
            _ => None,
        }
    }

    /// Numeric class as stored in the history log
    pub fn class(&self) -> u8 {
        match self {
            StressLevel::Low => 0,
            StressLevel::Moderate => 1,
            StressLevel::High => 2,
        }
    }

    /// Get string representation
    pub fn as_str(&self) -> &'static str {
        match self {
            StressLevel::Low => "LOW",
            StressLevel::Moderate => "MODERATE",
            StressLevel::High => "HIGH",
        }
    }

    /// Guidance shown alongside a prediction
    pub fn advice(&self) -> &'static str {
        match self {
            StressLevel::Low => "You're doing well, keep it up!",
            StressLevel::Moderate => "Moderate stress: take breaks and manage priorities.",
            StressLevel::High => "High stress detected: seek help or talk to someone you trust.",
        }
    }
}

impl std::fmt::Display for StressLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
