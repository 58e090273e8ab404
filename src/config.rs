//! Runtime configuration
//!
//! All configuration comes from environment variables (optionally loaded
//! from a `.env` file by `main`). The variables are read once at startup
//! into an owned [`Config`] that lives in the shared application state,
//! so handlers never touch the environment themselves.

use std::env;

/// Which request attributes get captured into the analytics table.
///
/// Disabled fields are stored as `NULL` (JSON `null`), enabled fields
/// fall back to `"unknown"` when the request does not carry them.
#[derive(Clone, Debug, Default)]
pub struct AnalyticsConfig {
    /// Master switch; nothing is written when false.
    pub enabled: bool,
    pub ip: bool,
    pub user_agent: bool,
    pub referer: bool,
    pub geo_country: bool,
    pub geo_city: bool,
}

/// Server configuration assembled from the environment.
#[derive(Clone, Debug)]
pub struct Config {
    /// TCP port to listen on.
    pub port: u16,

    /// Path of the redb database file.
    pub database_path: String,

    /// Path of the flat file holding the not-yet-issued short codes.
    pub codes_path: String,

    /// External base URL used when echoing freshly created short links
    /// back to clients (e.g. `https://sho.rt`).
    pub public_url: String,

    /// Session token lifetime in seconds.
    pub session_lifetime: i64,

    /// When set, creating links requires a valid session.
    pub require_login: bool,

    pub analytics: AnalyticsConfig,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            port: 8080,
            database_path: "shortlinks.db".to_string(),
            codes_path: "codes.txt".to_string(),
            public_url: "http://localhost:8080".to_string(),
            session_lifetime: 86_400,
            require_login: false,
            analytics: AnalyticsConfig::default(),
        }
    }
}

impl Config {
    /// Builds a [`Config`] from environment variables, falling back to
    /// the defaults above for anything unset.
    ///
    /// # Environment Variables
    ///
    /// - `PORT` - server port (default: 8080)
    /// - `DATABASE_URL` - redb file path (default: "shortlinks.db")
    /// - `CODES_FILE` - code pool file path (default: "codes.txt")
    /// - `PUBLIC_URL` - base URL for returned short links
    /// - `SESSION_LIFETIME` - session TTL in seconds (default: 86400)
    /// - `REQUIRE_LOGIN` - require a session to create links ("true"/"1")
    /// - `ANALYTICS_ENABLED` plus `ANALYTICS_IP`, `ANALYTICS_USER_AGENT`,
    ///   `ANALYTICS_REFERER`, `ANALYTICS_GEO_COUNTRY`, `ANALYTICS_GEO_CITY`
    pub fn from_env() -> Self {
        let defaults = Config::default();

        let port = env::var("PORT")
            .ok()
            .and_then(|value| value.parse().ok())
            .unwrap_or(defaults.port);

        let session_lifetime = env::var("SESSION_LIFETIME")
            .ok()
            .and_then(|value| value.parse().ok())
            .unwrap_or(defaults.session_lifetime);

        Config {
            port,
            database_path: env::var("DATABASE_URL").unwrap_or(defaults.database_path),
            codes_path: env::var("CODES_FILE").unwrap_or(defaults.codes_path),
            public_url: env::var("PUBLIC_URL").unwrap_or(defaults.public_url),
            session_lifetime,
            require_login: env_flag("REQUIRE_LOGIN"),
            analytics: AnalyticsConfig {
                enabled: env_flag("ANALYTICS_ENABLED"),
                ip: env_flag("ANALYTICS_IP"),
                user_agent: env_flag("ANALYTICS_USER_AGENT"),
                referer: env_flag("ANALYTICS_REFERER"),
                geo_country: env_flag("ANALYTICS_GEO_COUNTRY"),
                geo_city: env_flag("ANALYTICS_GEO_CITY"),
            },
        }
    }
}

fn env_flag(name: &str) -> bool {
    matches!(
        env::var(name).as_deref(),
        Ok("1") | Ok("true") | Ok("TRUE") | Ok("yes")
    )
}
