use sovereign_core::auth::AuthSession;
use sovereign_core::util::normalize_text_option;

use crate::cli::AuthCommands;
use crate::commands::common::{format_timestamp, CliContext};
use crate::error::CliError;

pub fn run_auth(context: &CliContext, command: AuthCommands) -> Result<(), CliError> {
    let auth = context.session_auth();

    match command {
        AuthCommands::LoginToken {
            token,
            expires_in,
            email,
        } => {
            let session = build_session(&token, expires_in, email, chrono::Utc::now().timestamp())?;
            auth.sign_in(&session)?;
            println!(
                "Signed in as {}",
                session.email.as_deref().unwrap_or("(no email)")
            );
            Ok(())
        }
        AuthCommands::Status => {
            if context.config.access_token.is_some() {
                println!("Using access token from configuration");
            }
            match auth.current_session()? {
                Some(session) => {
                    let expiry = session.expires_at.map_or_else(
                        || "never".to_string(),
                        |at| format_timestamp(at.saturating_mul(1000)),
                    );
                    let state = if session.is_expired() { "expired" } else { "active" };
                    println!(
                        "Signed in as {} ({state}, expires {expiry})",
                        session.email.as_deref().unwrap_or("(no email)")
                    );
                }
                None => println!("Not signed in"),
            }
            Ok(())
        }
        AuthCommands::Logout => {
            auth.sign_out()?;
            println!("Signed out");
            Ok(())
        }
    }
}

pub fn build_session(
    token: &str,
    expires_in: Option<i64>,
    email: Option<String>,
    now_secs: i64,
) -> Result<AuthSession, CliError> {
    let access_token =
        normalize_text_option(Some(token.to_string())).ok_or(CliError::EmptyToken)?;
    Ok(AuthSession {
        access_token,
        expires_at: expires_in.map(|secs| now_secs.saturating_add(secs)),
        email: normalize_text_option(email),
    })
}
