//! # Steam Harvest Core
//!
//! Shared, I/O-free logic for Steam Harvest: the relational record model,
//! lenient views over raw harvested payloads, the natural-key resolver,
//! the normalization engine, the store abstraction, and the load
//! coordinator that applies a normalized graph to any [`store::Store`].
//!
//! This crate contains no tokio, sqlx, HTTP, or filesystem dependencies.

pub mod load;
pub mod models;
pub mod normalize;
pub mod raw;
pub mod resolver;
pub mod store;
