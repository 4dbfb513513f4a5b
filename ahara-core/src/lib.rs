//! # Ahara Core - Nutrition retrieval and scoring
//!
//! Core types and the pure, synchronous half of the Ahara engine.
//!
//! This crate provides:
//! - Domain model (`model`, `knowledge`) - Foods, side-tables, disorder entries
//! - Profiles (`profile`) - Client health profiles and form normalization
//! - Policy (`policy`) - Thresholds, weights and rule tables loaded from YAML
//! - Structured filters (`filter`) - Tiered hard exclusions
//! - Scoring (`scorer`) - Weighted composite score with breakdown
//! - Category retrieval (`catalog`, `retriever`) - Fetch, filter, score, top-K
//! - Resilience (`resilience`) - Store retries and timeouts

pub mod catalog;
pub mod error;
pub mod filter;
pub mod knowledge;
pub mod logging;
pub mod model;
pub mod policy;
pub mod prelude;
pub mod profile;
pub mod resilience;
pub mod retriever;
pub mod scorer;

pub use error::{Error, Result};
