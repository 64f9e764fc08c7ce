//! Script section boundary model and frame arithmetic.

/// Section model, validation, ordering and frame counts.
pub mod model;
