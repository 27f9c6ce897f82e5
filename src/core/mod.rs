//! Core logic: graph model, normalization, matching, resolution.

pub mod context;
pub mod digest;
pub mod error;
pub mod matcher;
pub mod normalizer;
pub mod parser;
pub mod recipe;
pub mod resolver;
pub mod shape;
pub mod types;
