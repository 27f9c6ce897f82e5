//! recipe-binder: structural binding for recipe graphs.
//!
//! Normalizes draft graphs of particles and handles into canonical, frozen
//! recipes, resolves them against a spec and store context, and searches
//! recipes for structural matches of abstract shapes.

pub mod cli;
pub mod core;
