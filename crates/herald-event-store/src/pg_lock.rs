//! Publication locks backed by `PostgreSQL` advisory locks.
//!
//! Lock names are hashed to the 64-bit keys advisory locks take. Locks are
//! session scoped, so a crashed process loses its locks when its connection
//! closes and the events it held are picked up by a later pass.

use std::collections::HashSet;

use async_trait::async_trait;
use sha2::{Digest, Sha256};
use sqlx::{Connection, PgConnection, PgPool, Row};
use tokio::sync::Mutex;
use tracing::{debug, warn};

use herald_core::error::OutboxError;
use herald_core::lock::LockProvider;

/// Advisory lock provider holding one dedicated connection.
///
/// Every lock must be released on the session that took it, so all calls go
/// through the same connection. Advisory locks are reentrant within a
/// session, so the provider tracks the keys it holds and refuses a second
/// acquire of a held key itself.
#[derive(Debug)]
pub struct PgAdvisoryLockProvider {
    session: Mutex<Session>,
}

#[derive(Debug)]
struct Session {
    conn: PgConnection,
    held: HashSet<i64>,
}

impl PgAdvisoryLockProvider {
    /// Opens a dedicated session to `database_url`.
    ///
    /// # Errors
    ///
    /// Returns `OutboxError::Lock` if the connection fails.
    pub async fn connect(database_url: &str) -> Result<Self, OutboxError> {
        let conn = PgConnection::connect(database_url).await.map_err(lock_error)?;
        Ok(Self::from_connection(conn))
    }

    /// Takes a connection out of `pool` for good. It is closed, releasing any
    /// held locks, when the provider is dropped.
    ///
    /// # Errors
    ///
    /// Returns `OutboxError::Lock` if no connection is available.
    pub async fn from_pool(pool: &PgPool) -> Result<Self, OutboxError> {
        let conn = pool.acquire().await.map_err(lock_error)?;
        Ok(Self::from_connection(conn.detach()))
    }

    /// Uses `conn` as the lock session. Nothing else should run advisory
    /// locks on it.
    #[must_use]
    pub fn from_connection(conn: PgConnection) -> Self {
        Self {
            session: Mutex::new(Session {
                conn,
                held: HashSet::new(),
            }),
        }
    }
}

#[async_trait]
impl LockProvider for PgAdvisoryLockProvider {
    async fn acquire(&self, name: &str) -> Result<bool, OutboxError> {
        let key = advisory_key(name);
        let mut session = self.session.lock().await;
        if session.held.contains(&key) {
            debug!(lock = name, key, "advisory lock already held by this provider");
            return Ok(false);
        }

        let row = sqlx::query("SELECT pg_try_advisory_lock($1) AS acquired")
            .bind(key)
            .fetch_one(&mut session.conn)
            .await
            .map_err(lock_error)?;
        let acquired: bool = row.try_get("acquired").map_err(lock_error)?;
        if acquired {
            session.held.insert(key);
        }
        debug!(lock = name, key, acquired, "advisory lock attempted");
        Ok(acquired)
    }

    async fn release(&self, name: &str) -> Result<(), OutboxError> {
        let key = advisory_key(name);
        let mut session = self.session.lock().await;
        if !session.held.contains(&key) {
            warn!(lock = name, key, "advisory lock was not held by this provider");
            return Ok(());
        }

        let row = sqlx::query("SELECT pg_advisory_unlock($1) AS released")
            .bind(key)
            .fetch_one(&mut session.conn)
            .await
            .map_err(lock_error)?;
        session.held.remove(&key);
        let released: bool = row.try_get("released").map_err(lock_error)?;
        if !released {
            warn!(lock = name, key, "advisory lock was not held by this session");
        }
        Ok(())
    }
}

/// Maps a lock name to an advisory lock key: the first eight bytes of its
/// SHA-256 digest, big-endian.
#[must_use]
pub fn advisory_key(name: &str) -> i64 {
    let digest = Sha256::digest(name.as_bytes());
    let mut bytes = [0_u8; 8];
    bytes.copy_from_slice(&digest[..8]);
    i64::from_be_bytes(bytes)
}

#[allow(clippy::needless_pass_by_value)]
fn lock_error(err: sqlx::Error) -> OutboxError {
    OutboxError::Lock(err.to_string())
}

#[cfg(test)]
mod tests {
    use herald_core::lock::lock_name;
    use uuid::Uuid;

    use super::*;

    #[test]
    fn test_advisory_key_is_stable_for_a_name() {
        assert_eq!(advisory_key("domain-event-x"), advisory_key("domain-event-x"));
    }

    #[test]
    fn test_advisory_key_differs_between_events() {
        let a = advisory_key(&lock_name(Uuid::new_v4()));
        let b = advisory_key(&lock_name(Uuid::new_v4()));

        assert_ne!(a, b);
    }

    #[test]
    fn test_advisory_key_uses_leading_digest_bytes() {
        // SHA-256("abc") starts with ba7816bf8f01cfea.
        assert_eq!(
            advisory_key("abc"),
            i64::from_be_bytes([0xba, 0x78, 0x16, 0xbf, 0x8f, 0x01, 0xcf, 0xea])
        );
    }
}
