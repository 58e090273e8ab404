//! Short-code allocation
//!
//! Resolves a create request, with or without an explicitly requested
//! code, to a code that is guaranteed free of collisions with live
//! links and with the routes the service itself occupies.

use std::sync::Arc;

use crate::codes::CodePool;
use crate::error::ServiceError;
use crate::store::LinkStore;

/// Path segments served by the service itself. A link under one of
/// these would shadow the route, so they are never allocatable.
pub const RESERVED_PATHS: &[&str] = &["api", "accounts", "assets", "login", "manage"];

pub struct CodeAllocator {
    pool: Arc<CodePool>,
    store: LinkStore,
}

impl CodeAllocator {
    pub fn new(pool: Arc<CodePool>, store: LinkStore) -> Self {
        CodeAllocator { pool, store }
    }

    /// Resolves an allocation request to a unique short code.
    ///
    /// Explicitly requested codes bypass the pool entirely; they must be
    /// at least two ASCII alphanumeric characters and collide neither
    /// with a reserved path nor a live link. Generated codes are drawn
    /// from the pool and re-checked against the link table, which is the
    /// authoritative collision source: a pooled code can coincide with a
    /// link that was explicitly requested before the pool reached it.
    /// Such entries are discarded, never re-offered.
    ///
    /// # Errors
    ///
    /// - [`ServiceError::InvalidFormat`] for malformed requested codes
    /// - [`ServiceError::CodeTaken`] for reserved or occupied codes
    /// - [`ServiceError::PoolExhausted`] once the pool is drained
    pub fn allocate(&self, requested: Option<&str>) -> Result<String, ServiceError> {
        if let Some(code) = requested {
            if !is_valid_requested_code(code) {
                return Err(ServiceError::InvalidFormat);
            }
            if RESERVED_PATHS.contains(&code) || self.store.get(code)?.is_some() {
                return Err(ServiceError::CodeTaken);
            }
            return Ok(code.to_string());
        }

        loop {
            let Some(code) = self.pool.take()? else {
                tracing::error!("short code pool exhausted, no further codes can be minted");
                return Err(ServiceError::PoolExhausted);
            };
            if self.store.get(&code)?.is_none() {
                return Ok(code);
            }
            tracing::debug!(%code, "pooled code already occupied by an explicit link, skipping");
        }
    }
}

/// Minimum two characters, ASCII alphanumeric only.
fn is_valid_requested_code(code: &str) -> bool {
    code.len() >= 2 && code.bytes().all(|b| b.is_ascii_alphanumeric())
}
