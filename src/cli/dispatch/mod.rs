//! Map validated CLI matches to the action to run.

use crate::cli::actions::{server::Args, Action};
use crate::cli::commands::token;
use anyhow::{Context, Result};

/// # Errors
/// Returns an error if required arguments are missing or inconsistent.
pub fn handler(matches: &clap::ArgMatches) -> Result<Action> {
    let port = matches.get_one::<u16>("port").copied().unwrap_or(8080);
    let dsn = matches
        .get_one::<String>("dsn")
        .cloned()
        .context("missing required argument: --dsn")?;

    let token_opts = token::Options::parse(matches)?;

    Ok(Action::Server(Args {
        port,
        dsn,
        token_secret: token_opts.secret,
        token_ttl: token_opts.ttl,
        token_issuer: token_opts.issuer,
        token_audience: token_opts.audience,
        bcrypt_cost: token_opts.bcrypt_cost,
    }))
}
