// ============================
// crates/backend-lib/src/router.rs
// ============================
//! Route table for the HTTP API.
use std::sync::Arc;

use axum::{
    http::{header, Method},
    middleware::from_fn_with_state,
    routing::{get, patch, post},
    Router,
};
use tower_http::{cors::CorsLayer, trace::TraceLayer};

use crate::handlers::{self, admin, auth, establishments, profile};
use crate::middleware::rate_limit;
use crate::AppState;

/// Create the API router
pub fn create_router(state: Arc<AppState>) -> Router {
    let auth_routes = Router::new()
        .route("/register/", post(auth::register))
        .route("/login/", post(auth::login))
        .route("/logout/", post(auth::logout))
        .route("/token/refresh", post(auth::refresh))
        .route("/token/validate/", post(auth::validate_token))
        .route("/email-verify/", post(auth::verify_email))
        .route("/send-verification/", post(auth::send_verification))
        .route("/verification-status/", get(auth::verification_status))
        .route("/password-reset/", post(auth::password_reset))
        .route("/password-reset-confirm/", post(auth::password_reset_confirm))
        .route_layer(from_fn_with_state(Arc::clone(&state), rate_limit));

    Router::new()
        .nest("/api/auth", auth_routes)
        .route(
            "/api/profile/",
            get(profile::get_profile)
                .put(profile::replace_profile)
                .patch(profile::patch_profile),
        )
        .route(
            "/api/establishments/",
            get(establishments::list).post(establishments::create),
        )
        .route(
            "/api/establishments/{code}/",
            get(establishments::get)
                .put(establishments::replace)
                .patch(establishments::patch)
                .delete(establishments::delete),
        )
        .route("/api/admin/accounts/{id}/status/", patch(admin::set_account_status))
        .route("/health", get(handlers::health))
        .fallback(handlers::not_found)
        .layer(TraceLayer::new_for_http())
        .layer(cors(&state.settings.frontend_url))
        .with_state(state)
}

fn cors(frontend_url: &str) -> CorsLayer {
    let layer = CorsLayer::new()
        .allow_methods([Method::GET, Method::POST, Method::PUT, Method::PATCH, Method::DELETE])
        .allow_headers([header::AUTHORIZATION, header::CONTENT_TYPE]);

    match origin_of(frontend_url).parse::<header::HeaderValue>() {
        Ok(origin) => layer.allow_origin(origin),
        Err(_) => {
            tracing::warn!(%frontend_url, "frontend URL is not a valid origin, CORS disabled");
            layer
        },
    }
}

/// `scheme://host[:port]` of a URL, dropping any path
fn origin_of(url: &str) -> &str {
    let authority_start = url.find("://").map_or(0, |i| i + 3);
    match url[authority_start..].find('/') {
        Some(i) => &url[..authority_start + i],
        None => url,
    }
}

#[cfg(test)]
mod tests {
    use super::origin_of;

    #[test]
    fn test_origin_drops_path() {
        assert_eq!(origin_of("http://localhost:8000/api"), "http://localhost:8000");
        assert_eq!(origin_of("https://scholarflow.example"), "https://scholarflow.example");
        assert_eq!(origin_of("https://scholarflow.example/"), "https://scholarflow.example");
    }
}
