//! Redundant client connection pool
//!
//! A client owns a fixed index space of connections to one application
//! server, hands out online members round-robin and periodically repairs
//! failed ones.

use crate::action::ActionRegistry;
use crate::config::ClientConfig;
use crate::conn::{AppConn, ConnState};
use crate::executor::WorkerPool;
use crate::message::TypeRegistry;
use crate::scheduler::{self, TimerHandle};
use crate::Result;
use parking_lot::{Mutex, RwLock};
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, instrument};

/// Failsafe repair period
pub const FAILSAFE_PERIOD: Duration = Duration::from_secs(8);

/// Connection cache keyed by connection index, with a shared round-robin
/// cursor. One live entry per index; adding replaces.
pub struct ConnCache {
    inner: Mutex<CacheInner>,
}

struct CacheInner {
    conns: BTreeMap<u8, Arc<AppConn>>,
    cursor: usize,
}

impl ConnCache {
    pub fn new() -> ConnCache {
        ConnCache {
            inner: Mutex::new(CacheInner { conns: BTreeMap::new(), cursor: 0 }),
        }
    }

    /// Adds a connection, replacing any entry with the same index.
    pub fn add(&self, conn: Arc<AppConn>) {
        let mut inner = self.inner.lock();
        inner.conns.insert(conn.conn_index(), conn);
        inner.cursor = 0;
    }

    /// Removes the entry with the given index.
    pub fn remove(&self, conn_index: u8) {
        let mut inner = self.inner.lock();
        inner.conns.remove(&conn_index);
        inner.cursor = 0;
    }

    /// Cooperative round-robin: walks at most one full sweep from the
    /// shared cursor, returns the first online connection and advances
    /// the cursor past it. Never blocks.
    pub fn next_online(&self) -> Option<Arc<AppConn>> {
        let mut inner = self.inner.lock();
        let size = inner.conns.len();
        if size == 0 {
            return None;
        }
        let keys: Vec<u8> = inner.conns.keys().copied().collect();
        for step in 0..size {
            let position = (inner.cursor + step) % size;
            let conn = inner.conns[&keys[position]].clone();
            if conn.state() == ConnState::Online {
                inner.cursor = (position + 1) % size;
                return Some(conn);
            }
        }
        None
    }

    pub fn len(&self) -> usize {
        self.inner.lock().conns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Copies out the current members so sweeps can iterate without
    /// holding the cache lock.
    pub fn snapshot(&self) -> Vec<Arc<AppConn>> {
        self.inner.lock().conns.values().cloned().collect()
    }
}

impl Default for ConnCache {
    fn default() -> Self {
        ConnCache::new()
    }
}

/// A redundant client: one connection per index in
/// `[conn_index, conn_index + size)`, online while at least one member is.
pub struct AppClient {
    inner: Arc<ClientInner>,
    failsafe_timer: Mutex<Option<TimerHandle>>,
}

struct ClientInner {
    client_id: u32,
    config: ClientConfig,
    state: RwLock<ConnState>,
    cache: ConnCache,
    types: Arc<TypeRegistry>,
    actions: Arc<ActionRegistry>,
    workers: Arc<WorkerPool>,
}

impl AppClient {
    /// Builds the pool eagerly, one connection per index, and arms the
    /// failsafe sweep. Fails only on configuration errors.
    #[instrument(skip(config, types, actions, workers), fields(address = %config.address))]
    pub async fn connect(
        client_id: u32,
        config: ClientConfig,
        types: Arc<TypeRegistry>,
        actions: Arc<ActionRegistry>,
        workers: Arc<WorkerPool>,
    ) -> Result<AppClient> {
        config.validate()?;

        let inner = Arc::new(ClientInner {
            client_id,
            config,
            state: RwLock::new(ConnState::Offline),
            cache: ConnCache::new(),
            types,
            actions,
            workers,
        });

        for offset in 0..inner.config.size {
            let conn_index = inner.config.conn_index + offset as u8;
            let conn = AppConn::connect(
                inner.types.clone(),
                inner.actions.clone(),
                inner.workers.clone(),
                &inner.config.address,
                inner.config.port,
                client_id,
                conn_index,
                inner.config.registrable,
            )
            .await;
            if conn.state() == ConnState::Online {
                inner.set_state(ConnState::Online);
            }
            inner.cache.add(conn);
        }
        info!(members = inner.cache.len(), state = ?inner.state(), "client pool built");

        let client = AppClient { inner, failsafe_timer: Mutex::new(None) };
        if client.inner.config.failsafe {
            let weak = Arc::downgrade(&client.inner);
            let handle = scheduler::schedule_at_fixed_rate(FAILSAFE_PERIOD, FAILSAFE_PERIOD, move || {
                let weak = weak.clone();
                async move {
                    if let Some(inner) = weak.upgrade() {
                        inner.failsafe_sweep().await;
                    }
                }
            });
            *client.failsafe_timer.lock() = Some(handle);
        }
        Ok(client)
    }

    /// The next online member, or `None` when the pool is exhausted.
    pub fn next_online(&self) -> Option<Arc<AppConn>> {
        self.inner.cache.next_online()
    }

    pub fn client_id(&self) -> u32 {
        self.inner.client_id
    }

    pub fn state(&self) -> ConnState {
        self.inner.state()
    }
}

impl ClientInner {
    fn state(&self) -> ConnState {
        *self.state.read()
    }

    fn set_state(&self, state: ConnState) {
        *self.state.write() = state;
    }

    /// Rebuilds every non-online member; a rebuilt connection replaces
    /// the stale entry only when it comes up online.
    async fn failsafe_sweep(self: &Arc<Self>) {
        let mut online = false;
        for conn in self.cache.snapshot() {
            if conn.state() == ConnState::Online {
                online = true;
                continue;
            }
            debug!(
                client_id = self.client_id,
                conn_index = conn.conn_index(),
                "failsafe rebuilding connection"
            );
            let rebuilt = AppConn::connect(
                self.types.clone(),
                self.actions.clone(),
                self.workers.clone(),
                &self.config.address,
                self.config.port,
                self.client_id,
                conn.conn_index(),
                self.config.registrable,
            )
            .await;
            if rebuilt.state() == ConnState::Online {
                self.cache.add(rebuilt);
                online = true;
            }
        }
        self.set_state(if online { ConnState::Online } else { ConnState::Offline });
    }
}
