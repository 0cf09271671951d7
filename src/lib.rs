//! Submission Limiter - per-client form submission rate limiting
//!
//! This crate decides whether a form submission from a given client address
//! should be admitted. It keeps a short burst window and a lifetime total per
//! client in a single counter table, persisted as one entry in an external
//! TTL-capable key-value store.

pub mod client;
pub mod config;
pub mod error;
pub mod ratelimit;
pub mod store;
