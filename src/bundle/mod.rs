//! Bundle generation and isolation validation.
//!
//! A bundle is the per-stage input directory a reasoning model works
//! inside. Bundles are blind (no narrative spec prose) and isolated (no
//! cross-model output) according to their stage's rules.

pub mod generator;
pub mod invariants;
pub mod manifest;
pub mod symbols;
pub mod validator;

pub use generator::{BundleGenerator, BundleInputs};
pub use invariants::{extract_invariants, render_invariants, Invariant, InvariantCategory};
pub use manifest::{BundleManifest, BundleStage, MANIFEST_FILE};
pub use symbols::{
    render_public_api, Declaration, DeclarationKind, FileSymbols, RegexSymbolExtractor,
    SymbolExtractor,
};
pub use validator::{
    check_no_cross_model_output, check_no_spec_prose, validate_stage, walk_bundle, ModelParty,
};
