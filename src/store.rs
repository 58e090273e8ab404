//! Persisted link records and analytics events
//!
//! [`LinkStore`] owns every database access for link records. Each
//! mutation is a single redb write transaction; redb serializes writers,
//! so read-modify-write sequences like the visit counter are atomic
//! without any application-level locking.
//!
//! Listing uses two composite-key secondary indexes (per creator and
//! global by creation time). Index values are the bare code and records
//! are fetched from the main table, which stays the single source of
//! truth for mutable fields like the visit counter.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use redb::{Database, ReadableDatabase, ReadableTable};

use crate::database::{
    TABLE_ANALYTICS, TABLE_CREATED_INDEX, TABLE_LINKS, TABLE_OWNER_INDEX,
};
use crate::error::ServiceError;
use crate::model::{AnalyticsEvent, LinkRecord};

#[derive(Clone)]
pub struct LinkStore {
    db: Arc<Database>,
}

impl LinkStore {
    pub fn new(db: Arc<Database>) -> Self {
        LinkStore { db }
    }

    /// Persists a new link record under `code`.
    ///
    /// Inserts the main row and both index rows in one transaction.
    ///
    /// # Errors
    ///
    /// [`ServiceError::CodeTaken`] if a live record already holds the code.
    pub fn reserve(
        &self,
        code: &str,
        destination: &str,
        creator: &str,
        max_visits: Option<u64>,
        expires_at: Option<DateTime<Utc>>,
    ) -> Result<LinkRecord, ServiceError> {
        let record = LinkRecord {
            code: code.to_string(),
            destination: destination.to_string(),
            creator: creator.to_string(),
            visit_count: 0,
            created_at: Utc::now(),
            max_visits,
            expires_at,
        };
        let record_json = serde_json::to_string(&record)?;
        let created_micros = record.created_at.timestamp_micros();

        let write_txn = self.db.begin_write()?;
        {
            let mut links = write_txn.open_table(TABLE_LINKS)?;
            if links.get(code)?.is_some() {
                return Err(ServiceError::CodeTaken);
            }
            links.insert(code, record_json.as_str())?;

            let mut owner_index = write_txn.open_table(TABLE_OWNER_INDEX)?;
            owner_index.insert(owner_key(creator, created_micros).as_str(), code)?;

            let mut created_index = write_txn.open_table(TABLE_CREATED_INDEX)?;
            created_index.insert(created_key(created_micros, code).as_str(), code)?;
        }
        write_txn.commit()?;

        Ok(record)
    }

    /// Looks up a link record by code.
    pub fn get(&self, code: &str) -> Result<Option<LinkRecord>, ServiceError> {
        let read_txn = self.db.begin_read()?;
        let links = read_txn.open_table(TABLE_LINKS)?;

        match links.get(code)? {
            Some(guard) => Ok(Some(serde_json::from_str(guard.value())?)),
            None => Ok(None),
        }
    }

    /// Increments the visit counter by exactly one.
    ///
    /// The read and write happen inside a single write transaction, so
    /// concurrent visits cannot lose updates.
    pub fn record_visit(&self, code: &str) -> Result<(), ServiceError> {
        let write_txn = self.db.begin_write()?;
        {
            let mut links = write_txn.open_table(TABLE_LINKS)?;
            let mut record: LinkRecord = match links.get(code)? {
                Some(guard) => serde_json::from_str(guard.value())?,
                None => return Err(ServiceError::NotFound),
            };

            record.visit_count += 1;
            let record_json = serde_json::to_string(&record)?;
            links.insert(code, record_json.as_str())?;
        }
        write_txn.commit()?;

        Ok(())
    }

    /// Replaces the destination URL of an existing record.
    pub fn update_destination(
        &self,
        code: &str,
        destination: &str,
    ) -> Result<LinkRecord, ServiceError> {
        let write_txn = self.db.begin_write()?;
        let record = {
            let mut links = write_txn.open_table(TABLE_LINKS)?;
            let mut record: LinkRecord = match links.get(code)? {
                Some(guard) => serde_json::from_str(guard.value())?,
                None => return Err(ServiceError::NotFound),
            };

            record.destination = destination.to_string();
            let record_json = serde_json::to_string(&record)?;
            links.insert(code, record_json.as_str())?;
            record
        };
        write_txn.commit()?;

        Ok(record)
    }

    /// Removes a link record and its index rows.
    pub fn delete(&self, code: &str) -> Result<(), ServiceError> {
        let write_txn = self.db.begin_write()?;
        {
            let mut links = write_txn.open_table(TABLE_LINKS)?;
            let record: LinkRecord = match links.get(code)? {
                Some(guard) => serde_json::from_str(guard.value())?,
                None => return Err(ServiceError::NotFound),
            };
            links.remove(code)?;

            let created_micros = record.created_at.timestamp_micros();

            let mut owner_index = write_txn.open_table(TABLE_OWNER_INDEX)?;
            owner_index.remove(owner_key(&record.creator, created_micros).as_str())?;

            let mut created_index = write_txn.open_table(TABLE_CREATED_INDEX)?;
            created_index.remove(created_key(created_micros, code).as_str())?;
        }
        write_txn.commit()?;

        Ok(())
    }

    /// Lists one creator's links newest first. `page` is zero-indexed.
    pub fn list_for_owner(
        &self,
        owner: &str,
        page: usize,
        page_size: usize,
    ) -> Result<Vec<LinkRecord>, ServiceError> {
        let read_txn = self.db.begin_read()?;
        let owner_index = read_txn.open_table(TABLE_OWNER_INDEX)?;
        let links = read_txn.open_table(TABLE_LINKS)?;

        // All keys for this owner sort between "owner:" and "owner:{"
        // because '{' is the next byte after ':' past any digit.
        let start_key = format!("{}:", owner);
        let end_key = format!("{}:{{", owner);

        let codes: Vec<String> = owner_index
            .range(start_key.as_str()..end_key.as_str())?
            .rev()
            .skip(page * page_size)
            .take(page_size)
            .filter_map(|entry| entry.ok().map(|(_, value)| value.value().to_string()))
            .collect();

        collect_records(&links, codes)
    }

    /// Lists every link newest first, for administrators.
    pub fn list_all(&self, page: usize, page_size: usize) -> Result<Vec<LinkRecord>, ServiceError> {
        let read_txn = self.db.begin_read()?;
        let created_index = read_txn.open_table(TABLE_CREATED_INDEX)?;
        let links = read_txn.open_table(TABLE_LINKS)?;

        let codes: Vec<String> = created_index
            .iter()?
            .rev()
            .skip(page * page_size)
            .take(page_size)
            .filter_map(|entry| entry.ok().map(|(_, value)| value.value().to_string()))
            .collect();

        collect_records(&links, codes)
    }

    /// Number of live links for one creator.
    pub fn count_for_owner(&self, owner: &str) -> Result<usize, ServiceError> {
        let read_txn = self.db.begin_read()?;
        let owner_index = read_txn.open_table(TABLE_OWNER_INDEX)?;

        let start_key = format!("{}:", owner);
        let end_key = format!("{}:{{", owner);
        Ok(owner_index
            .range(start_key.as_str()..end_key.as_str())?
            .count())
    }

    /// Total number of live links.
    pub fn count_all(&self) -> Result<usize, ServiceError> {
        let read_txn = self.db.begin_read()?;
        let created_index = read_txn.open_table(TABLE_CREATED_INDEX)?;
        Ok(created_index.iter()?.count())
    }

    /// Appends one analytics event.
    ///
    /// Best-effort by contract: callers log failures and carry on, the
    /// redirect that produced the event must never depend on it.
    pub fn append_analytics(&self, event: &AnalyticsEvent) -> Result<(), ServiceError> {
        let event_json = serde_json::to_string(event)?;
        let key = format!(
            "{:020}:{}",
            event.timestamp.timestamp_micros(),
            event.ip.as_deref().unwrap_or("unknown")
        );

        let write_txn = self.db.begin_write()?;
        {
            let mut analytics = write_txn.open_table(TABLE_ANALYTICS)?;
            analytics.insert(key.as_str(), event_json.as_str())?;
        }
        write_txn.commit()?;

        Ok(())
    }
}

fn owner_key(creator: &str, created_micros: i64) -> String {
    format!("{}:{:020}", creator, created_micros)
}

fn created_key(created_micros: i64, code: &str) -> String {
    format!("{:020}:{}", created_micros, code)
}

/// Resolves index hits against the main table, skipping codes whose
/// record vanished between the two reads.
fn collect_records(
    links: &impl ReadableTable<&'static str, &'static str>,
    codes: Vec<String>,
) -> Result<Vec<LinkRecord>, ServiceError> {
    let mut records = Vec::with_capacity(codes.len());
    for code in codes {
        if let Some(guard) = links.get(code.as_str())? {
            records.push(serde_json::from_str(guard.value())?);
        }
    }
    Ok(records)
}
