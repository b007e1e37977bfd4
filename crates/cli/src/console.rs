//! Session wiring for one invocation
//!
//! Each run of the binary is a fresh "page load": the session starts empty
//! and is restored from the token file by the navigation guard.

use anyhow::{Result, bail};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::warn;
use ubm_core::ConsoleConfig;
use ubm_frontend_common::{
    Location, MemoryNavigator, NavigationEvent, Route, Router, Session, TokenStore,
    open_token_store,
};

pub struct Console {
    router: Router,
    navigator: Arc<MemoryNavigator>,
}

impl Console {
    pub fn open(config: &ConsoleConfig, token_file: PathBuf) -> Result<Self> {
        let store = open_token_store(Some(token_file));
        if !store.is_durable() {
            warn!("Token file is not writable, the session will not outlive this command");
        }

        let navigator = Arc::new(MemoryNavigator::new());
        let session = Session::builder()
            .config(config)?
            .store(store)
            .navigator(navigator.clone())
            .build()?;

        Ok(Self {
            router: Router::new(session),
            navigator,
        })
    }

    pub fn session(&self) -> &Arc<Session> {
        self.router.session()
    }

    pub const fn router(&self) -> &Router {
        &self.router
    }

    /// Last full page load the session asked for, if any
    pub fn hard_redirect(&self) -> Option<String> {
        self.navigator
            .history()
            .into_iter()
            .rev()
            .find_map(|event| match event {
                NavigationEvent::Redirect(url) => Some(url),
                NavigationEvent::Push(_) => None,
            })
    }

    /// Navigate to `route`, failing when the guard sends us to login instead
    pub async fn require_session(&self, route: Route) -> Result<Location> {
        let location = self.router.navigate(route.path()).await?;
        if location.route() == Route::Login && route != Route::Login {
            bail!("Not logged in; run `ubm login` first");
        }
        Ok(location)
    }
}
