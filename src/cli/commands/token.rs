//! Session token and password hashing settings.

use crate::auth::{
    parse_ttl,
    token::{DEFAULT_AUDIENCE, DEFAULT_ISSUER},
    MIN_COST,
};
use anyhow::{anyhow, Context, Result};
use clap::{builder::ValueParser, Arg, ArgMatches, Command};
use secrecy::SecretString;
use std::time::Duration;

pub const ARG_TOKEN_SECRET: &str = "token-secret";
pub const ARG_TOKEN_TTL: &str = "token-ttl";
pub const ARG_TOKEN_ISSUER: &str = "token-issuer";
pub const ARG_TOKEN_AUDIENCE: &str = "token-audience";
pub const ARG_BCRYPT_COST: &str = "bcrypt-cost";

#[must_use]
pub fn validator_ttl() -> ValueParser {
    ValueParser::from(move |ttl: &str| -> std::result::Result<Duration, String> {
        parse_ttl(ttl).map_err(|err| err.to_string())
    })
}

#[must_use]
pub fn with_args(command: Command) -> Command {
    command
        .arg(
            Arg::new(ARG_TOKEN_SECRET)
                .long(ARG_TOKEN_SECRET)
                .help("HMAC secret used to sign session tokens (at least 32 characters)")
                .env("VIGIL_TOKEN_SECRET")
                .hide_env_values(true)
                .required(true),
        )
        .arg(
            Arg::new(ARG_TOKEN_TTL)
                .long(ARG_TOKEN_TTL)
                .help("Session token lifetime, e.g. 900s, 15m, 24h, 7d")
                .env("VIGIL_TOKEN_TTL")
                .default_value("24h")
                .value_parser(validator_ttl()),
        )
        .arg(
            Arg::new(ARG_TOKEN_ISSUER)
                .long(ARG_TOKEN_ISSUER)
                .help("Issuer (iss) written to and required from tokens")
                .env("VIGIL_TOKEN_ISSUER")
                .default_value(DEFAULT_ISSUER),
        )
        .arg(
            Arg::new(ARG_TOKEN_AUDIENCE)
                .long(ARG_TOKEN_AUDIENCE)
                .help("Audience (aud) written to and required from tokens")
                .env("VIGIL_TOKEN_AUDIENCE")
                .default_value(DEFAULT_AUDIENCE),
        )
        .arg(
            Arg::new(ARG_BCRYPT_COST)
                .long(ARG_BCRYPT_COST)
                .help("bcrypt cost factor (minimum 10)")
                .env("VIGIL_BCRYPT_COST")
                .default_value("12")
                .value_parser(clap::value_parser!(u32)),
        )
}

#[derive(Debug)]
pub struct Options {
    pub secret: SecretString,
    pub ttl: Duration,
    pub issuer: String,
    pub audience: String,
    pub bcrypt_cost: u32,
}

impl Options {
    /// # Errors
    /// Returns an error if a required token argument is missing or the cost
    /// factor is below the minimum.
    pub fn parse(matches: &ArgMatches) -> Result<Self> {
        let secret = matches
            .get_one::<String>(ARG_TOKEN_SECRET)
            .cloned()
            .context("missing required argument: --token-secret")?;
        let ttl = matches
            .get_one::<Duration>(ARG_TOKEN_TTL)
            .copied()
            .context("missing required argument: --token-ttl")?;
        let issuer = matches
            .get_one::<String>(ARG_TOKEN_ISSUER)
            .cloned()
            .unwrap_or_else(|| DEFAULT_ISSUER.to_string());
        let audience = matches
            .get_one::<String>(ARG_TOKEN_AUDIENCE)
            .cloned()
            .unwrap_or_else(|| DEFAULT_AUDIENCE.to_string());
        let bcrypt_cost = matches
            .get_one::<u32>(ARG_BCRYPT_COST)
            .copied()
            .unwrap_or(12);

        if bcrypt_cost < MIN_COST {
            return Err(anyhow!(
                "--bcrypt-cost must be at least {MIN_COST}, got {bcrypt_cost}"
            ));
        }

        Ok(Self {
            secret: SecretString::from(secret),
            ttl,
            issuer,
            audience,
            bcrypt_cost,
        })
    }
}
