use crate::{
    auth::{Coordinator, CredentialHasher, PgUserStore, SessionTokenService, TokenConfig},
    vigil,
};
use anyhow::{Context, Result};
use secrecy::SecretString;
use sqlx::postgres::PgPoolOptions;
use std::{sync::Arc, time::Duration};
use tracing::info;
use url::Url;

#[derive(Debug)]
pub struct Args {
    pub port: u16,
    pub dsn: String,
    pub token_secret: SecretString,
    pub token_ttl: Duration,
    pub token_issuer: String,
    pub token_audience: String,
    pub bcrypt_cost: u32,
}

/// Execute the server action.
///
/// Hasher and token settings are validated before touching the database so a
/// bad configuration aborts startup immediately.
/// # Errors
/// Returns an error if the configuration is rejected, the database is
/// unreachable, or the server fails to start.
pub async fn execute(args: Args) -> Result<()> {
    log_startup_args(&args);

    let hasher =
        CredentialHasher::new(args.bcrypt_cost).context("Invalid password hashing configuration")?;

    let token_config = TokenConfig::new(args.token_secret)
        .with_issuer(args.token_issuer)
        .with_audience(args.token_audience)
        .with_default_ttl(args.token_ttl);
    let tokens = SessionTokenService::with_system_clock(token_config)
        .context("Invalid session token configuration")?;

    let pool = PgPoolOptions::new()
        .min_connections(1)
        .max_connections(5)
        .max_lifetime(Duration::from_secs(60 * 2))
        .test_before_acquire(true)
        .connect(&args.dsn)
        .await
        .context("Failed to connect to database")?;

    let coordinator = Coordinator::new(hasher, Arc::new(tokens), Arc::new(PgUserStore::new(pool)))
        .await
        .context("Failed to prepare the login coordinator")?;

    vigil::new(args.port, Arc::new(coordinator)).await
}

fn log_startup_args(args: &Args) {
    let entries = [
        ("listen", format!("tcp:{}", args.port)),
        ("dsn", redact_dsn(&args.dsn)),
        ("token_ttl", format!("{}s", args.token_ttl.as_secs())),
        ("token_issuer", args.token_issuer.clone()),
        ("token_audience", args.token_audience.clone()),
        ("bcrypt_cost", args.bcrypt_cost.to_string()),
    ];

    let max_key_len = entries.iter().map(|(key, _)| key.len()).max().unwrap_or(0);
    let mut message = format!(
        "vigil {} ({})\n\nStartup configuration:",
        env!("CARGO_PKG_VERSION"),
        short_commit(crate::GIT_COMMIT_HASH)
    );
    for (key, value) in &entries {
        let padding = " ".repeat(max_key_len.saturating_sub(key.len()));
        let _ =
            std::fmt::Write::write_fmt(&mut message, format_args!("\n  {key}:{padding} {value}"));
    }
    info!("{message}");
}

fn redact_dsn(dsn: &str) -> String {
    match Url::parse(dsn) {
        Ok(mut parsed) => {
            if parsed.password().is_some() {
                let _ = parsed.set_password(Some("REDACTED"));
            }
            parsed.to_string()
        }
        Err(_) => "invalid-dsn".to_string(),
    }
}

fn short_commit(hash: &str) -> &str {
    let trimmed = hash.trim();
    trimmed.get(..7).unwrap_or(trimmed)
}
