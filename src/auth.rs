//! Operator accounts and login verification
//!
//! Accounts live in the database; passwords are stored as argon2 hashes
//! and every account carries a TOTP secret. Logging in requires both
//! the password and a current one-time code. On first start with no
//! accounts, a default admin is created and its otpauth enrollment URI
//! is logged once for the operator.

use std::sync::Arc;

use argon2::password_hash::rand_core::OsRng;
use argon2::password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString};
use argon2::Argon2;
use redb::{Database, ReadableDatabase, ReadableTable};
use totp_rs::{Algorithm, Secret, TOTP};

use crate::database::TABLE_USERS;
use crate::error::ServiceError;
use crate::model::UserRecord;

const TOTP_ISSUER: &str = "shortlinks";
const DEFAULT_ADMIN_NAME: &str = "admin";
const DEFAULT_ADMIN_PASSWORD: &str = "password";

/// Database access for operator accounts.
#[derive(Clone)]
pub struct UserStore {
    db: Arc<Database>,
}

impl UserStore {
    pub fn new(db: Arc<Database>) -> Self {
        UserStore { db }
    }

    pub fn get(&self, name: &str) -> Result<Option<UserRecord>, ServiceError> {
        let read_txn = self.db.begin_read()?;
        let users = read_txn.open_table(TABLE_USERS)?;

        match users.get(name)? {
            Some(guard) => Ok(Some(serde_json::from_str(guard.value())?)),
            None => Ok(None),
        }
    }

    /// Inserts a new account, rejecting duplicates.
    pub fn insert(&self, record: &UserRecord) -> Result<(), ServiceError> {
        let record_json = serde_json::to_string(record)?;

        let write_txn = self.db.begin_write()?;
        {
            let mut users = write_txn.open_table(TABLE_USERS)?;
            if users.get(record.name.as_str())?.is_some() {
                return Err(ServiceError::DuplicateUser);
            }
            users.insert(record.name.as_str(), record_json.as_str())?;
        }
        write_txn.commit()?;

        Ok(())
    }

    pub fn is_empty(&self) -> Result<bool, ServiceError> {
        let read_txn = self.db.begin_read()?;
        let users = read_txn.open_table(TABLE_USERS)?;
        let is_empty = users.iter()?.next().is_none();
        Ok(is_empty)
    }

    /// Whether `name` exists and is an administrator.
    pub fn is_admin(&self, name: &str) -> Result<bool, ServiceError> {
        Ok(self.get(name)?.is_some_and(|user| user.admin))
    }
}

/// Creates the default admin account when the user table is empty.
///
/// The generated otpauth URI is logged so the operator can enroll an
/// authenticator app; it is shown nowhere else.
pub fn bootstrap_admin(users: &UserStore) -> Result<(), ServiceError> {
    if !users.is_empty()? {
        tracing::debug!("existing accounts found, skipping admin bootstrap");
        return Ok(());
    }

    let uri = create_user(users, DEFAULT_ADMIN_NAME, DEFAULT_ADMIN_PASSWORD, true)?;
    tracing::info!(
        otpauth_uri = %uri,
        "created default admin account (change the password); scan the otpauth URI to enroll"
    );
    Ok(())
}

/// Creates an account with a fresh TOTP secret and returns the otpauth
/// enrollment URI.
pub fn create_user(
    users: &UserStore,
    name: &str,
    password: &str,
    admin: bool,
) -> Result<String, ServiceError> {
    if !is_valid_account_name(name) {
        return Err(ServiceError::BadRequest(
            "account name must be non-empty alphanumeric (plus '-', '_', '.')".to_string(),
        ));
    }
    if password.is_empty() {
        return Err(ServiceError::BadRequest("password must not be empty".to_string()));
    }

    let salt = SaltString::generate(&mut OsRng);
    let password_hash = Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map_err(|err| ServiceError::Internal(format!("password hashing failed: {}", err)))?
        .to_string();

    let secret = Secret::generate_secret();
    let totp_secret = match secret.to_encoded() {
        Secret::Encoded(encoded) => encoded,
        // generate_secret always yields raw bytes, to_encoded always
        // yields the Encoded variant.
        Secret::Raw(_) => {
            return Err(ServiceError::Internal("secret encoding failed".to_string()))
        }
    };

    let totp = build_totp(&totp_secret, name)?;

    users.insert(&UserRecord {
        name: name.to_string(),
        password_hash,
        totp_secret,
        admin,
    })?;

    Ok(totp.get_url())
}

/// Validates a login attempt. Returns the account on success, `None`
/// for any bad credential; which factor failed is never disclosed.
pub fn verify_login(
    users: &UserStore,
    name: &str,
    password: &str,
    otp: &str,
) -> Result<Option<UserRecord>, ServiceError> {
    let Some(user) = users.get(name)? else {
        return Ok(None);
    };

    let parsed_hash = PasswordHash::new(&user.password_hash)
        .map_err(|err| ServiceError::Internal(format!("stored password hash invalid: {}", err)))?;
    if Argon2::default()
        .verify_password(password.as_bytes(), &parsed_hash)
        .is_err()
    {
        return Ok(None);
    }

    let totp = build_totp(&user.totp_secret, name)?;
    let otp_valid = totp
        .check_current(otp)
        .map_err(|err| ServiceError::Internal(format!("system clock error: {}", err)))?;
    if !otp_valid {
        return Ok(None);
    }

    Ok(Some(user))
}

/// RFC 6238 defaults: SHA-1, 6 digits, 30 second step, one step of skew.
pub fn build_totp(secret_base32: &str, account: &str) -> Result<TOTP, ServiceError> {
    let secret_bytes = Secret::Encoded(secret_base32.to_string())
        .to_bytes()
        .map_err(|err| ServiceError::Internal(format!("invalid TOTP secret: {:?}", err)))?;

    TOTP::new(
        Algorithm::SHA1,
        6,
        1,
        30,
        secret_bytes,
        Some(TOTP_ISSUER.to_string()),
        account.to_string(),
    )
    .map_err(|err| ServiceError::Internal(format!("TOTP setup failed: {:?}", err)))
}

/// Account names end up inside composite index keys and URLs, so the
/// charset is restricted; in particular ':' would corrupt index keys.
fn is_valid_account_name(name: &str) -> bool {
    !name.is_empty()
        && name
            .bytes()
            .all(|b| b.is_ascii_alphanumeric() || b == b'-' || b == b'_' || b == b'.')
}
