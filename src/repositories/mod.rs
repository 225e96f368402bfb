//! # Repository Layer
//!
//! This module contains repository implementations that encapsulate SeaORM
//! operations for the dealer credential store and the fetch log audit trail.

pub mod dealer;
pub mod fetch_log;

pub use dealer::DealerRepository;
pub use fetch_log::FetchLogRepository;
