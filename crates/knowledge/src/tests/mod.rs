//! Cross-module tests for the question pipeline.

pub mod fixtures;
