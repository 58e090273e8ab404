//! Data models for the short-link service
//!
//! This module defines the persisted record structures and the
//! request/response payloads used by the HTTP handlers.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A live short link stored in the database.
///
/// The record is created when a code is allocated, its `visit_count` is
/// bumped on every resolved visit, and it is deleted when a visit quota
/// or expiry timestamp is observed to be exceeded during resolution.
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct LinkRecord {
    /// Short code, unique among live records and never reused while live.
    pub code: String,

    /// Destination URL the code redirects to.
    pub destination: String,

    /// Account name of the creator, empty string when created anonymously.
    pub creator: String,

    /// Number of successfully resolved visits.
    #[serde(default)]
    pub visit_count: u64,

    /// Timestamp when this record was created.
    pub created_at: DateTime<Utc>,

    /// Visit quota. Once `visit_count` reaches this, the next lookup
    /// deletes the record instead of redirecting.
    pub max_visits: Option<u64>,

    /// Expiry timestamp; a lookup at or after it deletes the record.
    pub expires_at: Option<DateTime<Utc>>,
}

impl LinkRecord {
    /// Whether the record should be evicted rather than followed at `now`.
    pub fn is_exhausted(&self, now: DateTime<Utc>) -> bool {
        let over_quota = self
            .max_visits
            .is_some_and(|quota| self.visit_count >= quota);
        let expired = self.expires_at.is_some_and(|deadline| now >= deadline);
        over_quota || expired
    }
}

/// One redirect captured for analytics. Append-only; fields that capture
/// is disabled for are `None`.
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct AnalyticsEvent {
    pub code: String,
    pub timestamp: DateTime<Utc>,
    pub ip: Option<String>,
    pub user_agent: Option<String>,
    pub referer: Option<String>,
    pub geo_country: Option<String>,
    pub geo_city: Option<String>,
}

/// Request attributes available to analytics capture, extracted from
/// headers by the redirect handler.
#[derive(Debug, Clone, Default)]
pub struct RequestMetadata {
    pub ip: Option<String>,
    pub user_agent: Option<String>,
    pub referer: Option<String>,
    pub geo_country: Option<String>,
    pub geo_city: Option<String>,
}

/// Operator account persisted in the database.
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct UserRecord {
    /// Account name, primary key.
    pub name: String,

    /// Argon2 PHC-format password hash.
    pub password_hash: String,

    /// Base32-encoded TOTP secret.
    pub totp_secret: String,

    /// Admins see and manage every link, not just their own.
    pub admin: bool,
}

/// Request payload for creating a short link.
///
/// # Example
/// ```json
/// {
///   "link": "https://example.com/very/long/url",
///   "requested_code": "mylink",
///   "max_visits": 10,
///   "expires_at": "2027-01-01T00:00:00Z"
/// }
/// ```
#[derive(Deserialize)]
pub struct CreateLinkRequest {
    /// Destination URL to shorten.
    pub link: Option<String>,

    /// Optional explicit code. When absent a code is drawn from the
    /// pre-generated pool.
    pub requested_code: Option<String>,

    /// Optional visit quota, must be at least 1.
    pub max_visits: Option<u64>,

    /// Optional expiry timestamp, must be in the future.
    pub expires_at: Option<DateTime<Utc>>,
}

/// Response returned after successfully creating a short link.
#[derive(Serialize)]
pub struct CreateLinkResponse {
    pub code: String,
    pub short_url: String,
    pub link: String,
    pub created_at: DateTime<Utc>,
}

/// Query parameters for listing links.
#[derive(Deserialize)]
pub struct ListParams {
    /// Zero-indexed page number (default: 0).
    pub page: Option<usize>,

    /// Items per page (default: 10, maximum: 100).
    pub limit: Option<usize>,
}

/// Request payload for changing a link's destination.
#[derive(Deserialize)]
pub struct UpdateLinkRequest {
    pub link: Option<String>,
}

/// Login request: password and one-time code are both required.
#[derive(Deserialize)]
pub struct LoginRequest {
    #[serde(default)]
    pub username: String,
    #[serde(default)]
    pub password: String,
    #[serde(default)]
    pub otp: String,
}

/// Successful login response. The token is also set as a cookie.
#[derive(Serialize)]
pub struct LoginResponse {
    pub token: String,
    pub expires_in: i64,
}

/// Admin-only request to create an operator account.
#[derive(Deserialize)]
pub struct CreateAccountRequest {
    pub username: String,
    pub password: String,
    #[serde(default)]
    pub admin: bool,
}

/// Response for account creation. The otpauth URI is shown once so the
/// operator can enroll an authenticator app.
#[derive(Serialize)]
pub struct CreateAccountResponse {
    pub username: String,
    pub otpauth_uri: String,
}
