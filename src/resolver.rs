//! Redirect resolution and lazy eviction
//!
//! Resolving a code is the only place records are evicted: a visit that
//! finds the quota or expiry exceeded deletes the record and reports it
//! gone. An expired link that nobody visits stays allocated until the
//! next lookup. That trades a background sweep for simplicity.

use chrono::Utc;

use crate::config::AnalyticsConfig;
use crate::error::ServiceError;
use crate::model::{AnalyticsEvent, RequestMetadata};
use crate::store::LinkStore;

/// What a lookup of a short code produced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    /// Follow the link; carries the destination URL.
    Redirect(String),

    /// The record existed but its quota or expiry was exceeded. The
    /// record has been deleted as a side effect.
    Gone,

    /// No record under this code, either never created or evicted.
    NotFound,
}

#[derive(Clone)]
pub struct RedirectResolver {
    store: LinkStore,
    analytics: AnalyticsConfig,
}

impl RedirectResolver {
    pub fn new(store: LinkStore, analytics: AnalyticsConfig) -> Self {
        RedirectResolver { store, analytics }
    }

    /// Resolves `code` to an [`Outcome`], counting the visit and
    /// capturing analytics on success.
    ///
    /// The visit counter update must complete before the redirect is
    /// reported; the analytics append is best-effort and only logged on
    /// failure.
    pub fn resolve(
        &self,
        code: &str,
        metadata: &RequestMetadata,
    ) -> Result<Outcome, ServiceError> {
        let Some(record) = self.store.get(code)? else {
            return Ok(Outcome::NotFound);
        };

        let now = Utc::now();
        if record.is_exhausted(now) {
            self.store.delete(code)?;
            return Ok(Outcome::Gone);
        }

        self.store.record_visit(code)?;

        if self.analytics.enabled {
            let event = self.build_event(code, metadata);
            if let Err(err) = self.store.append_analytics(&event) {
                tracing::warn!(%code, error = %err, "failed to record analytics event");
            }
        }

        Ok(Outcome::Redirect(record.destination))
    }

    fn build_event(&self, code: &str, metadata: &RequestMetadata) -> AnalyticsEvent {
        AnalyticsEvent {
            code: code.to_string(),
            timestamp: Utc::now(),
            ip: captured(self.analytics.ip, metadata.ip.as_deref()),
            user_agent: captured(self.analytics.user_agent, metadata.user_agent.as_deref()),
            referer: captured(self.analytics.referer, metadata.referer.as_deref()),
            geo_country: captured(self.analytics.geo_country, metadata.geo_country.as_deref()),
            geo_city: captured(self.analytics.geo_city, metadata.geo_city.as_deref()),
        }
    }
}

/// Captured fields fall back to "unknown" when the request does not
/// carry them; disabled fields stay `None`.
fn captured(flag: bool, value: Option<&str>) -> Option<String> {
    flag.then(|| value.unwrap_or("unknown").to_string())
}
