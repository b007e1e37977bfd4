//! Authentication module

pub mod credentials;
pub mod error_messages;
pub mod pipeline;
pub mod policy;
pub mod session;

// Re-export commonly used items
pub use credentials::{CredentialPair, CredentialVault};
pub use pipeline::{ApiRequest, AuthPipeline};
pub use session::{PasswordChangeOutcome, Session, SessionBuilder};
