//! Calibrated hint projection between detection parties.

pub mod generator;

pub use generator::{generate_hints, Hint, HintLevel, HintSet};
