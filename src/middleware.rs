//! Session-cookie middleware
//!
//! Parses the `token` cookie, verifies it against the session store,
//! and attaches the resulting identity to the request. Handlers decide
//! for themselves whether an anonymous request is acceptable.

use axum::extract::{Request, State};
use axum::http::header;
use axum::middleware::Next;
use axum::response::Response;

use crate::database::AppState;

/// The verified subject of the request, `None` when no valid session
/// token accompanied it.
#[derive(Clone, Debug)]
pub struct Identity(pub Option<String>);

impl Identity {
    /// The subject, or an empty string for anonymous requests. Matches
    /// how anonymous creators are recorded on link records.
    pub fn subject_or_anonymous(&self) -> &str {
        self.0.as_deref().unwrap_or("")
    }
}

/// Verifies the session cookie (if any) and stores an [`Identity`] in
/// the request extensions. Never rejects by itself.
pub async fn attach_identity(
    State(state): State<AppState>,
    mut request: Request,
    next: Next,
) -> Response {
    let subject = request
        .headers()
        .get(header::COOKIE)
        .and_then(|value| value.to_str().ok())
        .and_then(token_cookie)
        .and_then(|token| state.sessions.verify(&token));

    request.extensions_mut().insert(Identity(subject));
    next.run(request).await
}

/// Extracts the `token` cookie value from a Cookie header.
fn token_cookie(header: &str) -> Option<String> {
    header.split(';').find_map(|part| {
        let (name, value) = part.trim().split_once('=')?;
        (name == "token").then(|| value.to_string())
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn token_cookie_is_found_among_others() {
        assert_eq!(
            token_cookie("username=alice; token=abc123; theme=dark"),
            Some("abc123".to_string())
        );
        assert_eq!(token_cookie("token=xyz"), Some("xyz".to_string()));
        assert_eq!(token_cookie("username=alice"), None);
        assert_eq!(token_cookie(""), None);
    }
}
