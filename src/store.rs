//! Shared failure-counter stores for the distributed breaker.

use std::time::{Duration, Instant};

use ahash::AHashMap;
use parking_lot::Mutex;

use crate::error::StoreError;

/// Atomic counter primitives the distributed breaker composes.
///
/// Each method is one round trip to the store. Implementations must make
/// `incr` atomic across every process sharing the store.
pub trait CounterStore: Send + Sync {
    /// Reads the counter; a missing key is `None`.
    fn get(&self, key: &str) -> Result<Option<u64>, StoreError>;

    /// Increments the counter, creating it at zero first if absent, and
    /// returns the new value.
    fn incr(&self, key: &str) -> Result<u64, StoreError>;

    /// Sets the counter's time to live.
    fn expire(&self, key: &str, ttl: Duration) -> Result<(), StoreError>;

    /// Removes the counter. Removing an absent key is not an error.
    fn delete(&self, key: &str) -> Result<(), StoreError>;
}

impl<S: CounterStore + ?Sized> CounterStore for std::sync::Arc<S> {
    fn get(&self, key: &str) -> Result<Option<u64>, StoreError> {
        (**self).get(key)
    }

    fn incr(&self, key: &str) -> Result<u64, StoreError> {
        (**self).incr(key)
    }

    fn expire(&self, key: &str, ttl: Duration) -> Result<(), StoreError> {
        (**self).expire(key, ttl)
    }

    fn delete(&self, key: &str) -> Result<(), StoreError> {
        (**self).delete(key)
    }
}

#[derive(Debug, Clone, Copy)]
struct Entry {
    value: u64,
    expires_at: Option<Instant>,
}

impl Entry {
    fn is_live(&self, now: Instant) -> bool {
        self.expires_at.map_or(true, |at| now < at)
    }
}

/// Drops expired windows. Runs whenever a new key is inserted, so the map
/// only holds keys that were live at the last insertion.
fn prune(entries: &mut AHashMap<String, Entry>, now: Instant) {
    entries.retain(|_, entry| entry.is_live(now));
}

/// Process-local counter store with TTL support.
///
/// Useful for tests and for sharing one failure window between breakers in
/// the same process.
#[derive(Debug, Default)]
pub struct InMemoryStore {
    entries: Mutex<AHashMap<String, Entry>>,
}

impl InMemoryStore {
    /// Creates an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Remaining time to live of a key, if it has one.
    pub fn ttl(&self, key: &str) -> Option<Duration> {
        let now = Instant::now();
        let entries = self.entries.lock();
        entries
            .get(key)
            .filter(|entry| entry.is_live(now))
            .and_then(|entry| entry.expires_at)
            .map(|at| at.saturating_duration_since(now))
    }

    /// Number of live keys. Expired windows are dropped along the way.
    pub fn len(&self) -> usize {
        let mut entries = self.entries.lock();
        prune(&mut entries, Instant::now());
        entries.len()
    }

    /// Whether the store holds no live keys.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl CounterStore for InMemoryStore {
    fn get(&self, key: &str) -> Result<Option<u64>, StoreError> {
        let now = Instant::now();
        let mut entries = self.entries.lock();
        let found = entries
            .get(key)
            .map(|entry| (entry.is_live(now), entry.value));
        match found {
            Some((true, value)) => Ok(Some(value)),
            Some((false, _)) => {
                entries.remove(key);
                Ok(None)
            }
            None => Ok(None),
        }
    }

    fn incr(&self, key: &str) -> Result<u64, StoreError> {
        let now = Instant::now();
        let mut entries = self.entries.lock();
        if !entries.contains_key(key) {
            prune(&mut entries, now);
        }
        let entry = entries.entry(key.to_string()).or_insert(Entry {
            value: 0,
            expires_at: None,
        });
        if !entry.is_live(now) {
            *entry = Entry {
                value: 0,
                expires_at: None,
            };
        }
        entry.value = entry.value.saturating_add(1);
        Ok(entry.value)
    }

    fn expire(&self, key: &str, ttl: Duration) -> Result<(), StoreError> {
        let now = Instant::now();
        let mut entries = self.entries.lock();
        if let Some(entry) = entries.get_mut(key) {
            if entry.is_live(now) {
                // A deadline past what `Instant` can hold means no expiry.
                entry.expires_at = now.checked_add(ttl);
            }
        }
        Ok(())
    }

    fn delete(&self, key: &str) -> Result<(), StoreError> {
        self.entries.lock().remove(key);
        Ok(())
    }
}


#[cfg(feature = "redis")]
pub use self::redis_store::RedisStore;

#[cfg(feature = "redis")]
mod redis_store {
    use std::time::Duration;

    use parking_lot::Mutex;
    use redis::Commands;
    use tracing::debug;

    use super::CounterStore;
    use crate::error::StoreError;

    /// Redis-backed counter store using `GET`, `INCR`, `PEXPIRE` and `DEL`.
    ///
    /// One idle connection is cached. A command takes it out of the slot for
    /// the duration of the round trip, so concurrent callers open their own
    /// connection instead of waiting on each other.
    pub struct RedisStore {
        client: redis::Client,
        idle: Mutex<Option<redis::Connection>>,
    }

    impl RedisStore {
        /// Opens a store for a `redis://` URL. No connection is made yet.
        pub fn open(url: &str) -> Result<Self, StoreError> {
            Ok(Self::with_client(redis::Client::open(url)?))
        }

        /// Wraps an existing client.
        pub fn with_client(client: redis::Client) -> Self {
            Self {
                client,
                idle: Mutex::new(None),
            }
        }

        fn with_connection<T, F>(&self, command: F) -> Result<T, StoreError>
        where
            F: FnOnce(&mut redis::Connection) -> redis::RedisResult<T>,
        {
            let cached = self.idle.lock().take();
            let mut conn = match cached {
                Some(conn) => conn,
                None => self.client.get_connection()?,
            };

            match command(&mut conn) {
                Ok(value) => {
                    let mut idle = self.idle.lock();
                    if idle.is_none() {
                        *idle = Some(conn);
                    }
                    Ok(value)
                }
                Err(err) => {
                    debug!(error = %err, "dropping redis connection after failed command");
                    Err(err.into())
                }
            }
        }
    }

    impl CounterStore for RedisStore {
        fn get(&self, key: &str) -> Result<Option<u64>, StoreError> {
            self.with_connection(|conn| conn.get(key))
        }

        fn incr(&self, key: &str) -> Result<u64, StoreError> {
            self.with_connection(|conn| conn.incr(key, 1u64))
        }

        fn expire(&self, key: &str, ttl: Duration) -> Result<(), StoreError> {
            let millis = i64::try_from(ttl.as_millis()).unwrap_or(i64::MAX);
            self.with_connection(|conn| -> redis::RedisResult<bool> { conn.pexpire(key, millis) })
                .map(|_| ())
        }

        fn delete(&self, key: &str) -> Result<(), StoreError> {
            self.with_connection(|conn| -> redis::RedisResult<u64> { conn.del(key) })
                .map(|_| ())
        }
    }
}
