//! Canonical feature table
//!
//! The order of [`FEATURES`] is the column order the scaler and classifier
//! were fit on. Reordering it silently corrupts every prediction.

use serde::{Deserialize, Serialize};

/// Number of features in a vector
pub const FEATURE_DIMENSION: usize = 20;

/// Kind of a wellness input
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FeatureKind {
    /// Self-rated integer scale 1..=10
    Scale,
    /// Yes/no flag 0 or 1
    Binary,
}

impl FeatureKind {
    /// Inclusive valid range
    pub fn range(&self) -> (i64, i64) {
        match self {
            FeatureKind::Scale => (1, 10),
            FeatureKind::Binary => (0, 1),
        }
    }

    /// Neutral value offered by the form
    pub fn default_value(&self) -> u8 {
        match self {
            FeatureKind::Scale => 5,
            FeatureKind::Binary => 0,
        }
    }
}

/// A named input with its kind
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct FeatureSpec {
    pub name: &'static str,
    pub kind: FeatureKind,
}

const fn scale(name: &'static str) -> FeatureSpec {
    FeatureSpec { name, kind: FeatureKind::Scale }
}

const fn binary(name: &'static str) -> FeatureSpec {
    FeatureSpec { name, kind: FeatureKind::Binary }
}

/// All features in canonical order
pub const FEATURES: [FeatureSpec; FEATURE_DIMENSION] = [
    scale("anxiety_level"),
    scale("self_esteem"),
    binary("mental_health_history"),
    binary("depression"),
    binary("headache"),
    scale("blood_pressure"),
    scale("sleep_quality"),
    binary("breathing_problem"),
    scale("living_conditions"),
    scale("safety"),
    scale("basic_needs"),
    scale("academic_performance"),
    scale("study_load"),
    scale("teacher_student_relationship"),
    scale("future_career_concerns"),
    scale("social_support"),
    scale("peer_pressure"),
    scale("extracurricular_activities"),
    scale("screen_time"),
    binary("health_issues"),
];

/// Feature names in canonical order
pub const FEATURE_NAMES: [&str; FEATURE_DIMENSION] = {
    let mut names = [""; FEATURE_DIMENSION];
    let mut i = 0;
    while i < FEATURE_DIMENSION {
        names[i] = FEATURES[i].name;
        i += 1;
    }
    names
};

/// Position of a feature in the canonical order
pub fn index_of(name: &str) -> Option<usize> {
    FEATURES.iter().position(|f| f.name == name)
}
