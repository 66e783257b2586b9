//! Spectate Core - player status tracking and change notification.
//!
//! This crate provides:
//! - The tracker engine: poll cycle, status diffing, notification fan-out
//! - Trait seams for the status source, stores, and notification sink
//! - SQLite-backed stores plus in-memory substitutes for tests
//! - The vimetop.ru profile page status fetcher

pub mod engine;
pub mod fetch;
pub mod models;
pub mod notify;
pub mod store;

pub use engine::{TrackerEngine, TrackerError};
