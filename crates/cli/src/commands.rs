//! CLI commands

use anyhow::{Result, bail};
use clap::Subcommand;
use serde_json::Value;
use std::path::PathBuf;
use tracing::info;
use ubm_core::ConsoleConfig;
use ubm_frontend_common::{AuthConfig, Route};
use ubm_http::types::LoginRequest;

use crate::console::Console;

#[derive(Subcommand)]
pub enum Commands {
    /// Sign in and keep the token pair for later commands
    Login {
        #[arg(short, long)]
        username: String,

        /// Password (prompting is not supported; prefer the environment variable)
        #[arg(short, long, env = "UBM_PASSWORD", hide_env_values = true)]
        password: String,
    },

    /// Show the signed-in user
    Whoami,

    /// Change the signed-in user's password
    Passwd {
        /// Current password
        #[arg(long, env = "UBM_PASSWORD", hide_env_values = true)]
        current: String,

        /// New password
        #[arg(long, env = "UBM_NEW_PASSWORD", hide_env_values = true)]
        new: String,
    },

    /// Forget the stored tokens
    Logout,

    /// Navigate to a console page and print where the guard lets you in
    Open {
        /// Page path, e.g. /backups?device=3
        path: String,
    },

    /// GET an API path with the session's credentials and print the body
    Get {
        /// API path, e.g. /api/devices
        path: String,
    },
}

impl Commands {
    pub async fn execute(self, config: &ConsoleConfig, token_file: PathBuf) -> Result<()> {
        let console = Console::open(config, token_file)?;

        match self {
            Self::Login { username, password } => login(&console, username, password).await,
            Self::Whoami => whoami(&console).await,
            Self::Passwd { current, new } => passwd(&console, &current, &new).await,
            Self::Logout => {
                console.session().logout();
                println!("Logged out");
                Ok(())
            }
            Self::Open { path } => open(&console, &path).await,
            Self::Get { path } => get(&console, &path).await,
        }
    }
}

async fn login(console: &Console, username: String, password: String) -> Result<()> {
    let session = console.session();
    let credentials = LoginRequest { username, password };

    if !session.login(&credentials).await {
        let message = session
            .last_error()
            .unwrap_or_else(|| AuthConfig::LOGIN_FAILED_MESSAGE.to_string());
        bail!(message);
    }
    if !session.is_authenticated() {
        bail!("Signed in, but the user profile could not be loaded");
    }

    let location = console.router().complete_login().await?;
    info!(page = location.full_path(), "Login complete");

    let role = if session.is_admin() { " (admin)" } else { "" };
    println!("Logged in as {}{role}", credentials.username);
    Ok(())
}

async fn whoami(console: &Console) -> Result<()> {
    console.require_session(Route::Dashboard).await?;

    let Some(user) = console.session().user() else {
        bail!("Not logged in; run `ubm login` first");
    };
    println!("{}", serde_json::to_string_pretty(&user)?);
    Ok(())
}

async fn passwd(console: &Console, current: &str, new: &str) -> Result<()> {
    console.require_session(Route::Settings).await?;

    let outcome = console.session().change_password(current, new).await;
    if !outcome.success {
        let message = outcome
            .error
            .unwrap_or_else(|| AuthConfig::PASSWORD_CHANGE_FAILED_MESSAGE.to_string());
        bail!(message);
    }

    println!("Password changed");
    Ok(())
}

async fn open(console: &Console, path: &str) -> Result<()> {
    let location = console.router().navigate(path).await?;

    println!("{} ({})", location.full_path(), location.route().name());
    if location.route() == Route::Login {
        if let Some(target) = location.return_target() {
            println!("Log in to continue to {target}");
        }
    }
    Ok(())
}

async fn get(console: &Console, path: &str) -> Result<()> {
    console.require_session(Route::Dashboard).await?;

    let result = console.session().pipeline().get::<Value>(path).await;
    if let Some(url) = console.hard_redirect() {
        bail!("Session ended while calling {path}; redirected to {url}");
    }

    println!("{}", serde_json::to_string_pretty(&result?)?);
    Ok(())
}
