//! Verifies an Azure AD bearer token and prints its claims.
//!
//! ```text
//! RUST_LOG=aad_jwt=debug cargo run --example verify_token -- demos/settings.yaml <token>
//! ```
//!
//! The token may also be passed as a full `Authorization` header value.

use aad_jwt::prelude::*;
use std::process::ExitCode;
use tracing::error;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let mut args = std::env::args().skip(1);
    let (settings_path, token) = match (args.next(), args.next()) {
        (Some(path), Some(token)) => (path, token),
        _ => {
            eprintln!("usage: verify_token <settings.yaml> <token>");
            return ExitCode::from(2);
        }
    };

    match run(&settings_path, &token).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            // Log the full chain; the top-level message alone is generic for rejected tokens.
            let mut message = e.to_string();
            let mut source = std::error::Error::source(&e);
            while let Some(cause) = source {
                message.push_str(&format!(": {}", cause));
                source = cause.source();
            }
            error!("{}", message);
            ExitCode::FAILURE
        }
    }
}

async fn run(settings_path: &str, token: &str) -> Result<(), AadJwtError> {
    let config = Settings::from_yaml_file(settings_path)?.into_config()?;
    let verifier = TokenVerifier::new(&config)?;

    let token = bearer_token_from_header(token).unwrap_or(token);
    let claims = verifier.verify(token).await?;

    let user = UserClaims::from_claims(&claims)?;
    println!("Token verified for {}", user.username);
    println!(
        "{}",
        serde_json::to_string_pretty(&claims).map_err(|e| AadJwtError::InvalidConfiguration(e.to_string()))?
    );
    Ok(())
}
