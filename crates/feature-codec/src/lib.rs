//! Feature Vector Codec
//!
//! Validates the 20 self-reported wellness inputs and encodes them into the
//! fixed column order the model was fit on. Also maps classifier output
//! classes to stress levels.

mod codec;
mod error;
mod fields;
mod label;

pub use codec::{check_value, encode, validate, FeatureVector, ValidationResult};
pub use error::ValidationError;
pub use fields::{index_of, FeatureKind, FeatureSpec, FEATURES, FEATURE_DIMENSION, FEATURE_NAMES};
pub use label::StressLevel;
