//! Data model and local persistence for the careport insurance store.
//!
//! This crate owns everything that touches disk: where the state directory
//! lives, the key-value backends, and the persisted snapshot shape.

pub mod config;
pub mod kv;
pub mod models;
pub mod snapshot;
