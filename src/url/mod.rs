//! URL handling module for Site-Harvest
//!
//! This module provides URL normalization (the canonical key used for
//! deduplication) and the same-host scope filter.

mod domain;
mod normalize;

pub use domain::in_scope;
pub use normalize::{normalize, normalize_with, NormalizeOptions, NormalizedUrl};
