//! Route table and navigation guard

use crate::auth::Session;
use crate::config::AuthConfig;
use crate::navigation::Navigator;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use thiserror::Error;
use tracing::debug;
use url::form_urlencoded;

/// Pages of the console
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Route {
    Login,
    Dashboard,
    Devices,
    Backups,
    Schedules,
    Settings,
}

impl Route {
    pub const ALL: [Self; 6] = [
        Self::Login,
        Self::Dashboard,
        Self::Devices,
        Self::Backups,
        Self::Schedules,
        Self::Settings,
    ];

    pub const fn path(self) -> &'static str {
        match self {
            Self::Login => AuthConfig::LOGIN_PATH,
            Self::Dashboard => AuthConfig::HOME_PATH,
            Self::Devices => "/devices",
            Self::Backups => "/backups",
            Self::Schedules => "/schedules",
            Self::Settings => "/settings",
        }
    }

    pub const fn name(self) -> &'static str {
        match self {
            Self::Login => "login",
            Self::Dashboard => "dashboard",
            Self::Devices => "devices",
            Self::Backups => "backups",
            Self::Schedules => "schedules",
            Self::Settings => "settings",
        }
    }

    /// Only the login page is reachable without a session
    pub const fn requires_auth(self) -> bool {
        !matches!(self, Self::Login)
    }

    /// Route whose path is exactly `path` (a trailing slash is ignored)
    pub fn recognize(path: &str) -> Option<Self> {
        let path = match path.trim_end_matches('/') {
            "" => "/",
            trimmed => trimmed,
        };
        Self::ALL.into_iter().find(|route| route.path() == path)
    }
}

/// A resolved navigation target
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Location {
    route: Route,
    full_path: String,
    query: Vec<(String, String)>,
}

impl Location {
    /// Resolve a path with optional query string
    ///
    /// Paths that match no route resolve to the dashboard.
    pub fn resolve(target: &str) -> Self {
        let (path, query) = target.split_once('?').unwrap_or((target, ""));

        match Route::recognize(path) {
            Some(route) => Self {
                route,
                full_path: target.to_string(),
                query: form_urlencoded::parse(query.as_bytes())
                    .into_owned()
                    .collect(),
            },
            None => {
                debug!(path, "No route matches, redirecting to the dashboard");
                Self::for_route(Route::Dashboard)
            }
        }
    }

    pub fn for_route(route: Route) -> Self {
        Self {
            route,
            full_path: route.path().to_string(),
            query: Vec::new(),
        }
    }

    /// The login page, remembering where to go afterwards
    pub fn login_returning_to(return_to: &str) -> Self {
        let query = form_urlencoded::Serializer::new(String::new())
            .append_pair(AuthConfig::REDIRECT_QUERY_KEY, return_to)
            .finish();

        Self {
            route: Route::Login,
            full_path: format!("{}?{query}", AuthConfig::LOGIN_PATH),
            query: vec![(
                AuthConfig::REDIRECT_QUERY_KEY.to_string(),
                return_to.to_string(),
            )],
        }
    }

    pub const fn route(&self) -> Route {
        self.route
    }

    /// Path including the query string
    pub fn full_path(&self) -> &str {
        &self.full_path
    }

    pub fn query(&self, key: &str) -> Option<&str> {
        self.query
            .iter()
            .find(|(name, _)| name == key)
            .map(|(_, value)| value.as_str())
    }

    /// In-app path to continue to after logging in
    ///
    /// Anything that is not a local absolute path is ignored.
    pub fn return_target(&self) -> Option<&str> {
        self.query(AuthConfig::REDIRECT_QUERY_KEY)
            .filter(|target| target.starts_with('/') && !target.starts_with("//"))
    }
}

/// Outcome of the guard for one navigation
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GuardDecision {
    Allow,
    Redirect(Location),
}

/// Runs before every route change
#[derive(Debug)]
pub struct NavigationGuard {
    session: Arc<Session>,
}

impl NavigationGuard {
    pub const fn new(session: Arc<Session>) -> Self {
        Self { session }
    }

    pub const fn session(&self) -> &Arc<Session> {
        &self.session
    }

    /// Decide whether navigating to `to` may proceed
    ///
    /// Protected routes first get a chance to restore a persisted session;
    /// if that fails the user is sent to the login page with the original
    /// target remembered. An authenticated user asking for the login page
    /// lands on the dashboard instead.
    pub async fn before_each(&self, to: &Location) -> GuardDecision {
        if to.route.requires_auth() && !self.session.is_authenticated() {
            self.session.check_auth().await;

            if !self.session.is_authenticated() {
                debug!(target = %to.full_path, "Not authenticated, redirecting to login");
                return GuardDecision::Redirect(Location::login_returning_to(&to.full_path));
            }
        }

        if to.route == Route::Login && self.session.is_authenticated() {
            debug!("Already authenticated, skipping login page");
            return GuardDecision::Redirect(Location::for_route(Route::Dashboard));
        }

        GuardDecision::Allow
    }
}

#[derive(Debug, Error)]
pub enum RouterError {
    #[error("Too many guard redirects while navigating to {0}")]
    RedirectLoop(String),
}

/// Resolves paths, applies the guard and records where the console ends up
pub struct Router {
    guard: NavigationGuard,
    navigator: Arc<dyn Navigator>,
    current: Mutex<Option<Location>>,
}

impl Router {
    /// Router sharing the session's navigator
    pub fn new(session: Arc<Session>) -> Self {
        let navigator = session.navigator().clone();
        Self {
            guard: NavigationGuard::new(session),
            navigator,
            current: Mutex::new(None),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Option<Location>> {
        self.current.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub const fn guard(&self) -> &NavigationGuard {
        &self.guard
    }

    pub const fn session(&self) -> &Arc<Session> {
        self.guard.session()
    }

    /// Location shown after the last successful navigation
    pub fn current(&self) -> Option<Location> {
        self.lock().clone()
    }

    /// Navigate to `target`, following guard redirects
    pub async fn navigate(&self, target: &str) -> Result<Location, RouterError> {
        let mut location = Location::resolve(target);

        for _ in 0..AuthConfig::MAX_GUARD_REDIRECTS {
            match self.guard.before_each(&location).await {
                GuardDecision::Allow => {
                    self.navigator.push(&location.full_path);
                    *self.lock() = Some(location.clone());
                    return Ok(location);
                }
                GuardDecision::Redirect(next) => {
                    debug!(from = %location.full_path, to = %next.full_path, "Guard redirect");
                    location = next;
                }
            }
        }

        Err(RouterError::RedirectLoop(target.to_string()))
    }

    /// Continue to the page that sent the user to login, or the dashboard
    pub async fn complete_login(&self) -> Result<Location, RouterError> {
        let target = self
            .current()
            .and_then(|location| location.return_target().map(str::to_owned))
            .unwrap_or_else(|| AuthConfig::HOME_PATH.to_string());
        self.navigate(&target).await
    }
}
