//! Token pair held by the session and its persisted shadow

use crate::config::AuthConfig;
use crate::storage::TokenStore;
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tracing::debug;
use ubm_http::types::TokenPair;

/// Access/refresh token pair; either half may be absent
#[derive(Clone, Default, PartialEq, Eq)]
pub struct CredentialPair {
    pub access_token: Option<String>,
    pub refresh_token: Option<String>,
}

impl CredentialPair {
    /// Neither token is held
    pub const fn is_empty(&self) -> bool {
        self.access_token.is_none() && self.refresh_token.is_none()
    }
}

impl From<&TokenPair> for CredentialPair {
    fn from(tokens: &TokenPair) -> Self {
        Self {
            access_token: Some(tokens.access_token.clone()),
            refresh_token: Some(tokens.refresh_token.clone()),
        }
    }
}

impl fmt::Debug for CredentialPair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CredentialPair")
            .field("access_token", &self.access_token.as_ref().map(|_| "<redacted>"))
            .field("refresh_token", &self.refresh_token.as_ref().map(|_| "<redacted>"))
            .finish()
    }
}

#[derive(Default)]
struct VaultState {
    pair: CredentialPair,
    generation: u64,
}

/// Single owner of the in-memory token pair
///
/// Every change is written to the [`TokenStore`] under the same lock as the
/// in-memory update, so memory and storage never disagree. Each change bumps
/// a generation counter; a refresh that started before a logout or a new
/// login uses it to notice that its result is stale.
pub struct CredentialVault {
    store: Arc<dyn TokenStore>,
    state: Mutex<VaultState>,
}

impl CredentialVault {
    /// Empty vault backed by `store`; nothing is read until [`restore`](Self::restore)
    pub fn new(store: Arc<dyn TokenStore>) -> Self {
        Self {
            store,
            state: Mutex::new(VaultState::default()),
        }
    }

    fn lock(&self) -> MutexGuard<'_, VaultState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// The backing store
    pub fn store(&self) -> &Arc<dyn TokenStore> {
        &self.store
    }

    pub fn snapshot(&self) -> CredentialPair {
        self.lock().pair.clone()
    }

    pub fn access_token(&self) -> Option<String> {
        self.lock().pair.access_token.clone()
    }

    pub fn refresh_token(&self) -> Option<String> {
        self.lock().pair.refresh_token.clone()
    }

    /// Changes every time the pair is replaced or cleared
    pub fn generation(&self) -> u64 {
        self.lock().generation
    }

    /// The pair as currently persisted
    pub fn persisted(&self) -> CredentialPair {
        CredentialPair {
            access_token: self.store.get(AuthConfig::ACCESS_TOKEN_KEY),
            refresh_token: self.store.get(AuthConfig::REFRESH_TOKEN_KEY),
        }
    }

    /// Load the persisted pair into memory
    ///
    /// Only happens when an access token was persisted; returns the loaded
    /// pair in that case.
    pub fn restore(&self) -> Option<CredentialPair> {
        let mut state = self.lock();
        let persisted = self.persisted();
        persisted.access_token.as_ref()?;

        debug!(
            has_refresh_token = persisted.refresh_token.is_some(),
            "Restored persisted credentials"
        );
        state.pair = persisted.clone();
        state.generation += 1;
        Some(persisted)
    }

    /// Replace the pair in memory and in storage
    pub fn commit(&self, tokens: &TokenPair) {
        let mut state = self.lock();
        self.write_through(&mut state, tokens);
    }

    /// Like [`commit`](Self::commit), but only if nothing changed since
    /// `generation` was read
    pub fn commit_if_current(&self, generation: u64, tokens: &TokenPair) -> bool {
        let mut state = self.lock();
        if state.generation != generation {
            debug!(
                expected = generation,
                actual = state.generation,
                "Discarding tokens from a superseded refresh"
            );
            return false;
        }
        self.write_through(&mut state, tokens);
        true
    }

    fn write_through(&self, state: &mut VaultState, tokens: &TokenPair) {
        self.store.set_many(&[
            (AuthConfig::ACCESS_TOKEN_KEY, tokens.access_token.as_str()),
            (AuthConfig::REFRESH_TOKEN_KEY, tokens.refresh_token.as_str()),
        ]);
        state.pair = CredentialPair::from(tokens);
        state.generation += 1;
    }

    /// Forget both tokens, in memory and in storage
    pub fn clear(&self) {
        let mut state = self.lock();
        self.store
            .remove_many(&[AuthConfig::ACCESS_TOKEN_KEY, AuthConfig::REFRESH_TOKEN_KEY]);
        state.pair = CredentialPair::default();
        state.generation += 1;
    }
}

impl fmt::Debug for CredentialVault {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.lock();
        f.debug_struct("CredentialVault")
            .field("pair", &state.pair)
            .field("generation", &state.generation)
            .finish_non_exhaustive()
    }
}
