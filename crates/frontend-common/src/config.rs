//! Frontend constants

/// Authentication configuration
pub struct AuthConfig;

impl AuthConfig {
    /// Storage key for the access token
    pub const ACCESS_TOKEN_KEY: &'static str = "accessToken";

    /// Storage key for the refresh token
    pub const REFRESH_TOKEN_KEY: &'static str = "refreshToken";

    /// In-app path of the login page
    pub const LOGIN_PATH: &'static str = "/login";

    /// Landing page for authenticated users
    pub const HOME_PATH: &'static str = "/";

    /// Query parameter carrying the page to return to after login
    pub const REDIRECT_QUERY_KEY: &'static str = "redirect";

    /// Guard redirects followed before a navigation is abandoned
    pub const MAX_GUARD_REDIRECTS: usize = 4;

    /// Shown when a login fails without a server explanation
    pub const LOGIN_FAILED_MESSAGE: &'static str = "Login failed";

    /// Shown when a password change fails without a server explanation
    pub const PASSWORD_CHANGE_FAILED_MESSAGE: &'static str = "Password change failed";
}
