//! Photo styling service
//!
//! Accepts styling requests, queues them in Postgres, and drives each job
//! through download, generation, upload and credit settlement. A synchronous
//! endpoint runs the same pipeline inline for single-image requests.

pub mod app_state;
pub mod config;
pub mod db;
pub mod error;
pub mod models;
pub mod routes;
pub mod services;
