//! Session state
//!
//! ```text
//! Anonymous --login ok------------------------> Authenticated
//! Anonymous --check_auth (valid/refreshable)--> Authenticated
//! Authenticated --logout | refresh failure----> Anonymous
//! ```
//!
//! A session is authenticated only when it holds an access token *and* a
//! fetched user profile; a token alone is not enough.

use super::credentials::{CredentialPair, CredentialVault};
use super::error_messages::{login_error_message, password_change_error_message};
use super::pipeline::{ApiRequest, AuthPipeline};
use super::policy::refresh_failure_ends_session;
use crate::config::AuthConfig;
use crate::navigation::{MemoryNavigator, Navigator};
use crate::storage::{MemoryTokenStore, TokenStore};
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};
use tracing::{debug, info, warn};
use ubm_core::{ConsoleConfig, RefreshFailurePolicy};
use ubm_http::client::auth::{ME_PATH, PASSWORD_PATH};
use ubm_http::types::{LoginRequest, MessageResponse, PasswordChangeRequest, UserProfile};
use ubm_http::{ApiClient, ClientError};

#[derive(Debug, Default)]
struct SessionState {
    user: Option<UserProfile>,
    loading: bool,
    last_error: Option<String>,
}

fn read_state(state: &RwLock<SessionState>) -> RwLockReadGuard<'_, SessionState> {
    state.read().unwrap_or_else(PoisonError::into_inner)
}

fn write_state(state: &RwLock<SessionState>) -> RwLockWriteGuard<'_, SessionState> {
    state.write().unwrap_or_else(PoisonError::into_inner)
}

/// Clears `loading` when dropped, whichever way the operation ends
struct LoadingGuard<'a> {
    state: &'a RwLock<SessionState>,
}

impl<'a> LoadingGuard<'a> {
    fn start(state: &'a RwLock<SessionState>) -> Self {
        {
            let mut state = write_state(state);
            state.loading = true;
            state.last_error = None;
        }
        Self { state }
    }
}

impl Drop for LoadingGuard<'_> {
    fn drop(&mut self) {
        write_state(self.state).loading = false;
    }
}

/// Result of a password change
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PasswordChangeOutcome {
    pub success: bool,
    pub error: Option<String>,
}

impl PasswordChangeOutcome {
    const fn succeeded() -> Self {
        Self {
            success: true,
            error: None,
        }
    }

    const fn failed(error: String) -> Self {
        Self {
            success: false,
            error: Some(error),
        }
    }
}

/// The console's authentication state
///
/// One per application; hand out `Arc<Session>` to whatever needs it.
pub struct Session {
    pipeline: Arc<AuthPipeline>,
    vault: Arc<CredentialVault>,
    navigator: Arc<dyn Navigator>,
    state: RwLock<SessionState>,
}

impl Session {
    pub fn builder() -> SessionBuilder {
        SessionBuilder::default()
    }

    /// Pipeline for the rest of the console's API calls
    pub const fn pipeline(&self) -> &Arc<AuthPipeline> {
        &self.pipeline
    }

    pub const fn navigator(&self) -> &Arc<dyn Navigator> {
        &self.navigator
    }

    /// Access token held and user profile fetched
    pub fn is_authenticated(&self) -> bool {
        self.user().is_some()
    }

    pub fn is_admin(&self) -> bool {
        self.user().is_some_and(|user| user.is_admin)
    }

    /// Profile of the signed-in user
    ///
    /// The pipeline can end the session on its own by clearing the vault;
    /// a profile without an access token next to it belongs to that ended
    /// session and is not returned.
    pub fn user(&self) -> Option<UserProfile> {
        self.vault.access_token()?;
        read_state(&self.state).user.clone()
    }

    /// A login is in progress
    pub fn is_loading(&self) -> bool {
        read_state(&self.state).loading
    }

    /// Message from the last failed login
    pub fn last_error(&self) -> Option<String> {
        read_state(&self.state).last_error.clone()
    }

    pub fn credentials(&self) -> CredentialPair {
        self.vault.snapshot()
    }

    /// Sign in with username and password
    ///
    /// Returns `false` and records [`last_error`](Self::last_error) when the
    /// server rejects the credentials. Once tokens are issued this returns
    /// `true`; if the profile then cannot be fetched the session is already
    /// logged out again and [`is_authenticated`](Self::is_authenticated)
    /// says so.
    pub async fn login(&self, credentials: &LoginRequest) -> bool {
        let _loading = LoadingGuard::start(&self.state);

        match self.pipeline.client().login(credentials).await {
            Ok(tokens) => {
                self.vault.commit(&tokens);
                write_state(&self.state).user = None;
                info!(username = %credentials.username, "Logged in");
                if self.fetch_user().await.is_err() {
                    debug!("Tokens issued but the session ended while loading the profile");
                }
                true
            }
            Err(err) => {
                warn!(username = %credentials.username, error = %err, "Login failed");
                write_state(&self.state).last_error = Some(login_error_message(&err));
                false
            }
        }
    }

    async fn load_user(&self) -> Result<(), ClientError> {
        let user: UserProfile = self.pipeline.get(ME_PATH).await?;
        debug!(username = %user.username, admin = user.is_admin, "Fetched user profile");
        write_state(&self.state).user = Some(user);
        Ok(())
    }

    /// A failed profile fetch means the token is no good; recovery from an
    /// expired token already happened inside the pipeline
    async fn fetch_user(&self) -> Result<(), ClientError> {
        match self.load_user().await {
            Ok(()) => Ok(()),
            Err(err) => {
                warn!(error = %err, "Failed to fetch user profile");
                self.logout();
                Err(err)
            }
        }
    }

    /// Restore a persisted session
    ///
    /// Without a persisted access token this makes no network call.
    pub async fn check_auth(&self) {
        if self.vault.restore().is_none() {
            debug!("No persisted session to restore");
            write_state(&self.state).user = None;
            return;
        }

        let refreshes_before = self.pipeline.refresh_attempts();
        let Err(err) = self.load_user().await else {
            info!("Session restored");
            return;
        };
        let pipeline_refreshed = self.pipeline.refresh_attempts() != refreshes_before;

        if self.vault.refresh_token().is_none() {
            warn!(error = %err, "Restored session is not valid");
            self.logout();
        } else if !pipeline_refreshed {
            debug!(error = %err, "Restored token rejected, trying a refresh");
            self.refresh_access_token().await;
        } else if err.is_auth_expired() {
            warn!(error = %err, "Refreshed token rejected as well");
            self.logout();
        } else {
            warn!(error = %err, "Session kept but the profile could not be loaded");
        }
    }

    /// Rotate the token pair and reload the profile
    ///
    /// Returns `false` (after logging out, under the default policy) when no
    /// refresh token is held or the refresh fails.
    pub async fn refresh_access_token(&self) -> bool {
        if self.vault.refresh_token().is_none() {
            debug!("No refresh token held");
            self.logout();
            return false;
        }

        let stale = self.vault.access_token();
        if let Err(err) = self.pipeline.refresh_credentials(stale.as_deref()).await {
            if refresh_failure_ends_session(self.pipeline.policy(), &err) {
                warn!(error = %err, "Token refresh failed, logging out");
                self.logout();
            } else {
                warn!(error = %err, "Token refresh failed transiently");
            }
            return false;
        }

        if self.fetch_user().await.is_err() {
            debug!("Tokens refreshed but the session ended while loading the profile");
        }
        true
    }

    /// Change the signed-in user's password; never touches session state
    pub async fn change_password(
        &self,
        current_password: &str,
        new_password: &str,
    ) -> PasswordChangeOutcome {
        let body = PasswordChangeRequest {
            current_password: current_password.to_string(),
            new_password: new_password.to_string(),
        };

        let result = match ApiRequest::put(PASSWORD_PATH).json(&body) {
            Ok(request) => self.pipeline.execute::<MessageResponse>(request).await,
            Err(err) => Err(err),
        };

        match result {
            Ok(response) => {
                info!(message = %response.message, "Password changed");
                PasswordChangeOutcome::succeeded()
            }
            Err(err) => {
                warn!(error = %err, "Password change failed");
                PasswordChangeOutcome::failed(password_change_error_message(&err))
            }
        }
    }

    /// Forget the user and both tokens, then show the login page
    pub fn logout(&self) {
        self.vault.clear();
        write_state(&self.state).user = None;
        info!("Logged out");
        self.navigator.push(AuthConfig::LOGIN_PATH);
    }
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("vault", &self.vault)
            .field("state", &*read_state(&self.state))
            .finish_non_exhaustive()
    }
}

/// Wires a [`Session`] to its collaborators
#[derive(Default)]
pub struct SessionBuilder {
    client: Option<ApiClient>,
    store: Option<Arc<dyn TokenStore>>,
    navigator: Option<Arc<dyn Navigator>>,
    policy: RefreshFailurePolicy,
}

impl SessionBuilder {
    /// API client (required)
    pub fn client(mut self, client: ApiClient) -> Self {
        self.client = Some(client);
        self
    }

    /// Token persistence; defaults to memory only
    pub fn store(mut self, store: Arc<dyn TokenStore>) -> Self {
        self.store = Some(store);
        self
    }

    /// Navigation side effects; defaults to a [`MemoryNavigator`]
    pub fn navigator(mut self, navigator: Arc<dyn Navigator>) -> Self {
        self.navigator = Some(navigator);
        self
    }

    pub const fn refresh_failure_policy(mut self, policy: RefreshFailurePolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Take the API client and policy from configuration
    pub fn config(mut self, config: &ConsoleConfig) -> Result<Self, ClientError> {
        let mut client = ApiClient::builder()
            .base_url(config.api.base_url.clone())
            .timeout(config.api.timeout());
        if let Some(user_agent) = &config.api.user_agent {
            client = client.user_agent(user_agent.clone());
        }

        self.client = Some(client.build()?);
        self.policy = config.auth.refresh_failure;
        Ok(self)
    }

    /// Build the session
    pub fn build(self) -> Result<Arc<Session>, ClientError> {
        let client = self
            .client
            .ok_or_else(|| ClientError::Configuration("an API client is required".into()))?;
        let store = self
            .store
            .unwrap_or_else(|| Arc::new(MemoryTokenStore::new()));
        let navigator = self
            .navigator
            .unwrap_or_else(|| Arc::new(MemoryNavigator::new()));

        let vault = Arc::new(CredentialVault::new(store));
        let pipeline = Arc::new(AuthPipeline::new(
            client,
            vault.clone(),
            navigator.clone(),
            self.policy,
        ));

        Ok(Arc::new(Session {
            pipeline,
            vault,
            navigator,
            state: RwLock::new(SessionState::default()),
        }))
    }
}
