//! Route definitions
//!
//! Maps every HTTP route to its handler and wires in the session
//! middleware. The public redirect route sits at the root; everything
//! management-related lives under `/api`.

use axum::routing::{get, post};
use axum::{middleware, Router};

use crate::database::AppState;
use crate::handler::{
    create_account, create_link, delete_link, follow_code, list_links, login, logout, update_link,
};
use crate::middleware::attach_identity;

/// Creates the application router.
///
/// # Route Definitions
///
/// - `GET /{code}` - follow a short code (public)
/// - `POST /api/links` - create a short link
/// - `GET /api/links` - list links (session required)
/// - `PATCH /api/links/{code}` - change a link's destination
/// - `DELETE /api/links/{code}` - delete a link
/// - `POST /api/login` - obtain a session token
/// - `POST /api/logout` - revoke the session's tokens
/// - `POST /api/accounts` - create an operator account (admin)
///
/// The session middleware runs on every `/api` route and attaches the
/// verified identity; handlers enforce their own authorization.
pub fn create_app(state: AppState) -> Router {
    let api_routes = Router::new()
        .route("/links", get(list_links).post(create_link))
        .route("/links/{code}", axum::routing::patch(update_link).delete(delete_link))
        .route("/login", post(login))
        .route("/logout", post(logout))
        .route("/accounts", post(create_account))
        .layer(middleware::from_fn_with_state(
            state.clone(),
            attach_identity,
        ));

    Router::new()
        // Public redirect endpoint
        .route("/{code}", get(follow_code))
        // Management API
        .nest("/api", api_routes)
        .with_state(state)
}
