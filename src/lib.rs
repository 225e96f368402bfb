//! # Dealer Sync Library
//!
//! This library provides the core functionality for the Dealer Sync service:
//! the partner API client, the job queue and executor, per-fetch-type record
//! processors, and the operator-facing HTTP API.

pub mod auth;
pub mod client;
pub mod config;
pub mod crypto;
pub mod cursor;
pub mod db;
pub mod error;
pub mod executor;
pub mod handlers;
pub mod models;
pub mod processors;
pub mod queue;
pub mod repositories;
pub mod scheduler;
pub mod server;
pub mod telemetry;
pub mod token;
pub mod upsert;
pub use migration;
