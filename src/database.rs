//! Database initialization and table definitions
//!
//! This module handles the setup of the embedded redb database, defines
//! all tables, and assembles the shared application state.

use std::sync::Arc;

use redb::{Database, TableDefinition};

use crate::allocator::CodeAllocator;
use crate::auth::UserStore;
use crate::codes::{CodePool, CodeSpace, CODE_LENGTH};
use crate::config::Config;
use crate::error::ServiceError;
use crate::resolver::RedirectResolver;
use crate::session::SessionStore;
use crate::store::LinkStore;

/// Main table for link records.
///
/// Key: short code
/// Value: JSON-serialized [`crate::model::LinkRecord`]
pub const TABLE_LINKS: TableDefinition<&str, &str> = TableDefinition::new("links_v1");

/// Secondary index for listing a creator's links in creation order.
///
/// Key: composite `"{creator}:{created_micros:020}"` (zero-padded so the
/// lexicographic order matches the numeric timestamp order)
/// Value: short code
pub const TABLE_OWNER_INDEX: TableDefinition<&str, &str> = TableDefinition::new("owner_index_v1");

/// Secondary index for the global newest-first listing.
///
/// Key: composite `"{created_micros:020}:{code}"`
/// Value: short code
pub const TABLE_CREATED_INDEX: TableDefinition<&str, &str> =
    TableDefinition::new("created_index_v1");

/// Append-only analytics events.
///
/// Key: composite `"{timestamp_micros:020}:{ip}"`
/// Value: JSON-serialized [`crate::model::AnalyticsEvent`]
pub const TABLE_ANALYTICS: TableDefinition<&str, &str> = TableDefinition::new("analytics_v1");

/// Operator accounts.
///
/// Key: account name
/// Value: JSON-serialized [`crate::model::UserRecord`]
pub const TABLE_USERS: TableDefinition<&str, &str> = TableDefinition::new("users_v1");

/// Application state shared across all request handlers.
///
/// Everything in here is cheap to clone; the heavy pieces (database,
/// code pool, session store) sit behind `Arc`s.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub pool: Arc<CodePool>,
    pub store: LinkStore,
    pub users: UserStore,
    pub allocator: Arc<CodeAllocator>,
    pub resolver: RedirectResolver,
    pub sessions: Arc<SessionStore>,
}

impl AppState {
    /// Opens the database and code pool and wires up every component.
    ///
    /// Fails if either durable store is unreadable; the service must not
    /// start serving in that case.
    pub fn new(config: Config) -> Result<Self, ServiceError> {
        let db = Arc::new(init_db(&config.database_path)?);
        let pool = Arc::new(CodePool::open(
            CodeSpace::uppercase_alpha(CODE_LENGTH),
            &config.codes_path,
        )?);

        let store = LinkStore::new(db.clone());
        let users = UserStore::new(db);
        let allocator = Arc::new(CodeAllocator::new(pool.clone(), store.clone()));
        let resolver = RedirectResolver::new(store.clone(), config.analytics.clone());
        let sessions = Arc::new(SessionStore::new());

        Ok(AppState {
            config: Arc::new(config),
            pool,
            store,
            users,
            allocator,
            resolver,
            sessions,
        })
    }
}

/// Creates or opens the database file and ensures all tables exist, so
/// later read transactions never hit a missing table.
pub fn init_db(db_path: &str) -> Result<Database, redb::Error> {
    let db = Database::create(db_path)?;

    let write_txn = db.begin_write()?;
    {
        write_txn.open_table(TABLE_LINKS)?;
        write_txn.open_table(TABLE_OWNER_INDEX)?;
        write_txn.open_table(TABLE_CREATED_INDEX)?;
        write_txn.open_table(TABLE_ANALYTICS)?;
        write_txn.open_table(TABLE_USERS)?;
    }
    write_txn.commit()?;

    Ok(db)
}
