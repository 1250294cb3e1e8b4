use super::handlers::{health, login, me, refresh, register};
use crate::auth::gate::require_auth;
use axum::middleware;
use utoipa::openapi::{
    security::{HttpAuthScheme, HttpBuilder, SecurityScheme},
    Components, Contact, InfoBuilder, License, OpenApiBuilder, Tag,
};
use utoipa_axum::{router::OpenApiRouter, routes};

#[must_use]
pub fn openapi() -> utoipa::openapi::OpenApi {
    let (_router, openapi) = api_router().split_for_parts();
    openapi
}

/// Documented routes. Anything registered here is both served and part of
/// the generated document; `/api/auth/me` sits behind the bearer gate.
pub(crate) fn api_router() -> OpenApiRouter {
    let protected = OpenApiRouter::new()
        .routes(routes!(me::me))
        .route_layer(middleware::from_fn(require_auth));

    OpenApiRouter::with_openapi(base_openapi())
        .routes(routes!(health::health))
        .routes(routes!(register::register))
        .routes(routes!(login::login))
        .routes(routes!(refresh::refresh))
        .merge(protected)
}

/// Cargo metadata plus the tags and the bearer scheme the routes refer to.
fn base_openapi() -> utoipa::openapi::OpenApi {
    let mut openapi = cargo_openapi();

    let mut auth_tag = Tag::new("auth");
    auth_tag.description = Some("Registration, login and session tokens".to_string());
    let mut health_tag = Tag::new("health");
    health_tag.description = Some("Build information".to_string());
    openapi.tags = Some(vec![auth_tag, health_tag]);

    openapi
        .components
        .get_or_insert_with(Components::new)
        .add_security_scheme(
            "bearer",
            SecurityScheme::Http(
                HttpBuilder::new()
                    .scheme(HttpAuthScheme::Bearer)
                    .bearer_format("JWT")
                    .build(),
            ),
        );

    openapi
}

fn cargo_openapi() -> utoipa::openapi::OpenApi {
    let mut info = InfoBuilder::new()
        .title(env!("CARGO_PKG_NAME"))
        .version(env!("CARGO_PKG_VERSION"))
        .description(non_empty(env!("CARGO_PKG_DESCRIPTION")))
        .build();

    info.contact = cargo_contact(env!("CARGO_PKG_AUTHORS"));
    info.license = non_empty(env!("CARGO_PKG_LICENSE")).map(|identifier| {
        let mut license = License::new(identifier);
        license.identifier = Some(identifier.to_string());
        license
    });

    OpenApiBuilder::new().info(info).build()
}

// Cargo authors are `:` separated, each "Name <email>" or just "Name".
fn cargo_contact(authors: &str) -> Option<Contact> {
    let primary = non_empty(authors.split(':').next()?)?;

    let (name, email) = match primary.split_once('<') {
        Some((name, email)) => (non_empty(name), non_empty(email.trim_end_matches('>'))),
        None => (Some(primary), None),
    };

    let mut contact = Contact::new();
    contact.name = name.map(str::to_string);
    contact.email = email.map(str::to_string);
    Some(contact)
}

fn non_empty(value: &str) -> Option<&str> {
    let trimmed = value.trim();
    (!trimmed.is_empty()).then_some(trimmed)
}
