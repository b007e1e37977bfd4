//! HTTP layer of the UniFi Backup Manager console
//!
//! [`types`] holds the request and response bodies of the authentication
//! API; [`client`] is a thin `reqwest` wrapper that knows how to reach the
//! backend and classify its failures, but nothing about sessions.

pub mod client;
pub mod types;

pub use client::{ApiClient, ApiClientBuilder, error::ClientError};
