//! # Pipeline Common Library
//!
//! Shared infrastructure used by the ingestion, rule-engine, and
//! device-service binaries.
//!
//! This crate provides:
//! - Database connection pooling (PostgreSQL via sqlx)
//! - Event broker client (Redis Streams, append/read/ack/pending)
//! - Custom error types with an `IntoResponse` mapping to the HTTP surfaces
//! - Bearer-credential (JWT) verification and host-client credential minting
//! - Device agent token generation and hashing
//! - Structured logging setup

pub mod auth;
pub mod broker;
pub mod db;
pub mod error;
pub mod logging;

pub use auth::{create_jwt, generate_device_token, hash_token, verify_jwt, AuthContext, Claims};
pub use broker::Broker;
pub use db::create_pool;
pub use error::{Error, Result};
pub use logging::init_tracing;
