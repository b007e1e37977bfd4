//! Session subsystem of the UniFi Backup Manager console
//!
//! The pieces, leaf to root:
//!
//! - [`storage`]: durable key-value store holding the token pair
//! - [`auth::CredentialVault`]: in-memory token pair with write-through persistence
//! - [`auth::AuthPipeline`]: attaches the bearer token and recovers from 401s
//! - [`auth::Session`]: user profile, login/logout and session restoration
//! - [`router`]: route table and the guard run before every navigation

pub mod auth;
pub mod config;
pub mod navigation;
pub mod router;
pub mod storage;

pub use auth::{
    ApiRequest, AuthPipeline, CredentialPair, CredentialVault, PasswordChangeOutcome, Session,
    SessionBuilder,
};
pub use config::AuthConfig;
pub use navigation::{MemoryNavigator, NavigationEvent, Navigator};
pub use router::{GuardDecision, Location, NavigationGuard, Route, Router, RouterError};
pub use storage::{MemoryTokenStore, TokenStore, open_token_store};

#[cfg(not(target_arch = "wasm32"))]
pub use storage::FileTokenStore;
