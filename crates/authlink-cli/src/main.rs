//! authlink - command-line client for the identity service.
//!
//! Every command starts by restoring the persisted session, so a token
//! that expired since the last run is renewed transparently before the
//! command's own request goes out.

mod output;

use std::io;
use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::{bail, Result};
use authlink_core::models::ProfileUpdate;
use authlink_core::{ApiResponse, Config, SessionManager, SessionState};
use clap::{Parser, Subcommand};
use tracing::{debug, info};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use output::Output;

#[derive(Debug, Parser)]
#[command(name = "authlink", version, about = "Identity service client")]
struct Cli {
    /// Print the raw `{data, message, ok}` envelope as JSON
    #[arg(long, global = true)]
    json: bool,

    /// Also write logs to this file
    #[arg(long, global = true, env = "AUTHLINK_LOG_FILE")]
    log_file: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Sign in with email and password
    Login { email: String },
    /// Create a new account
    Signup { email: String, full_name: String },
    /// Sign out and forget the stored token
    Logout,
    /// Show the signed-in user
    Whoami,
    /// Change profile fields of the signed-in user
    UpdateProfile {
        #[arg(long)]
        full_name: Option<String>,
        #[arg(long)]
        email: Option<String>,
    },
    /// Send a password reset email
    ForgotPassword { email: String },
    /// Set a new password using the token from the reset email
    ResetPassword { token: String },
    /// Resend the verification email
    VerifyRequest { email: String },
    /// Confirm an email address
    VerifyConfirm { token: String },
    /// Print the URL that starts Google sign-in
    GoogleStart,
}

/// Initialize the tracing subscriber for logging
fn init_tracing(log_file: Option<&PathBuf>) -> Result<Option<WorkerGuard>> {
    // Use RUST_LOG env var to control log level (e.g., RUST_LOG=debug)
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));

    let (file_layer, guard) = match log_file {
        Some(path) => {
            let file = std::fs::OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)?;
            let (writer, guard) = tracing_appender::non_blocking(file);
            (
                Some(fmt::layer().with_ansi(false).with_writer(writer)),
                Some(guard),
            )
        }
        None => (None, None),
    };

    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(io::stderr))
        .with(file_layer)
        .with(filter)
        .init();

    Ok(guard)
}

fn prompt_password(prompt: &str) -> Result<String> {
    let password = rpassword::prompt_password(prompt)?;
    if password.is_empty() {
        bail!("Password required");
    }
    Ok(password)
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    // Load .env file if present (silently ignore if not found)
    let _ = dotenvy::dotenv();

    let cli = Cli::parse();
    let _guard = init_tracing(cli.log_file.as_ref())?;

    let config = Config::load()?;
    debug!(api_url = %config.api_url, storage = %config.storage, "Config loaded");

    let session = SessionManager::from_config(config)?;
    let restored = session.restore().await;
    debug!(?restored, "Session restored");

    let out = Output::new(cli.json);
    let ok = run(&session, cli.command, &out).await?;

    info!("authlink done");
    Ok(if ok { ExitCode::SUCCESS } else { ExitCode::FAILURE })
}

/// Execute one command. Returns whether it succeeded.
async fn run(session: &SessionManager, command: Command, out: &Output) -> Result<bool> {
    let api = session.api();

    let ok = match command {
        Command::Login { email } => {
            let password = prompt_password("Password: ")?;
            let response = ApiResponse::from(session.login(&email, &password).await);
            out.print(&response, |user| format!("Signed in as {}", user.display_name()))
        }
        Command::Signup { email, full_name } => {
            let password = prompt_password("Choose a password: ")?;
            let response = ApiResponse::from(session.signup(&email, &password, &full_name).await);
            out.print(&response, |created| {
                format!("Account created for {}. Check your inbox to verify it.", created.email)
            })
        }
        Command::Logout => {
            session.logout().await;
            out.print(&ApiResponse::success(()), |_| "Signed out".to_string())
        }
        Command::Whoami => match session.state() {
            SessionState::Authenticated(user) => out.print(&ApiResponse::success(user), |user| {
                let mut lines = vec![format!("{} <{}>", user.display_name(), user.email)];
                lines.push(format!("id:          {}", user.id));
                lines.push(format!("verified:    {}", user.verified));
                lines.push(format!("roles:       {}", user.roles.join(", ")));
                lines.push(format!("permissions: {}", user.permissions.join(", ")));
                lines.join("\n")
            }),
            _ => {
                let response: ApiResponse<()> = ApiResponse::failure("Not signed in");
                out.print(&response, |_| String::new())
            }
        },
        Command::UpdateProfile { full_name, email } => {
            let update = ProfileUpdate { email, full_name };
            if update.is_empty() {
                bail!("Nothing to update: pass --full-name and/or --email");
            }
            let result = session.update_profile(&update).await;
            out.report(result, |user| format!("Profile updated for {}", user.display_name()))
        }
        Command::ForgotPassword { email } => {
            let result = api.forgot_password(&email).await;
            out.report(result, |_| format!("If {} is registered, a reset email is on its way", email))
        }
        Command::ResetPassword { token } => {
            let password = prompt_password("New password: ")?;
            let result = api.reset_password(&token, &password).await;
            out.report(result, |_| "Password changed".to_string())
        }
        Command::VerifyRequest { email } => {
            let result = api.request_verification(&email).await;
            out.report(result, |_| "Verification email sent".to_string())
        }
        Command::VerifyConfirm { token } => {
            let result = api.verify_email(&token).await;
            out.report(result, |result| {
                if result.verified {
                    "Email verified".to_string()
                } else {
                    "Email not verified".to_string()
                }
            })
        }
        Command::GoogleStart => {
            let result = api.start_google_auth().await;
            out.report(result, |start| format!("Open this URL to continue:\n{}", start.auth_url))
        }
    };

    Ok(ok)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_login() {
        let cli = Cli::try_parse_from(["authlink", "login", "ada@example.com"]).unwrap();
        assert!(!cli.json);
        assert!(matches!(cli.command, Command::Login { ref email } if email == "ada@example.com"));
    }

    #[test]
    fn test_parse_global_json_flag_after_subcommand() {
        let cli = Cli::try_parse_from(["authlink", "whoami", "--json"]).unwrap();
        assert!(cli.json);
        assert!(matches!(cli.command, Command::Whoami));
    }

    #[test]
    fn test_parse_update_profile() {
        let cli =
            Cli::try_parse_from(["authlink", "update-profile", "--full-name", "Grace Hopper"]).unwrap();
        match cli.command {
            Command::UpdateProfile { full_name, email } => {
                assert_eq!(full_name.as_deref(), Some("Grace Hopper"));
                assert!(email.is_none());
            }
            other => panic!("unexpected command: {:?}", other),
        }
    }

    #[test]
    fn test_missing_subcommand_is_an_error() {
        assert!(Cli::try_parse_from(["authlink"]).is_err());
    }
}
