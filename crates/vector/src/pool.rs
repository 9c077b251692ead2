//! Generic pool of reusable, health-checked, lifetime-bounded connections.
//!
//! Checkout order: capacity permit (bounded wait) -> idle connection, with
//! expired or dead entries retired on the spot -> lazy creation below
//! `max_connections`. Returned connections travel through a channel to the
//! pool's maintenance task, which re-probes them before requeueing; the
//! capacity permit is released only once the return has been processed, so a
//! waiter can never observe freed capacity without a usable slot behind it.
//!
//! The maintenance task also runs the periodic health sweep: dead idle
//! connections are retired and the pool is replenished up to
//! `min_connections`.

use std::collections::VecDeque;
use std::ops::Deref;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use tokio::sync::{mpsc, OwnedSemaphorePermit, Semaphore};
use tokio_util::sync::CancellationToken;

use masset_core::error::CoreError;

/// Creates and probes connections on behalf of the pool.
///
/// Closing is implicit: a retired connection is simply dropped.
#[async_trait]
pub trait ConnectionFactory: Send + Sync + 'static {
    type Conn: Send + 'static;

    /// Establish a new connection. `id` is the pool-assigned connection id,
    /// for logging.
    async fn connect(&self, id: u64) -> Result<Self::Conn, CoreError>;

    /// Probe an existing connection for liveness.
    async fn is_alive(&self, conn: &Self::Conn) -> bool;
}

/// Sizing and lifetime parameters.
#[derive(Debug, Clone)]
pub struct PoolConfig {
    pub min_connections: usize,
    pub max_connections: usize,
    /// A connection older than this is retired instead of reused, even if
    /// it is still alive.
    pub connection_lifetime: Duration,
    pub health_check_interval: Duration,
}

impl From<&masset_core::config::VectorStoreConfig> for PoolConfig {
    fn from(config: &masset_core::config::VectorStoreConfig) -> Self {
        Self {
            min_connections: config.min_connections,
            max_connections: config.max_connections,
            connection_lifetime: config.connection_lifetime,
            health_check_interval: config.health_check_interval,
        }
    }
}

/// Bookkeeping wrapper around one pooled connection.
struct PooledConn<C> {
    id: u64,
    created_at: Instant,
    last_used_at: Instant,
    usage_count: u64,
    conn: C,
}

struct Inner<C> {
    idle: VecDeque<PooledConn<C>>,
    /// Connections currently alive (idle + checked out).
    total: usize,
    next_id: u64,
    created_total: u64,
    retired_total: u64,
}

/// Counter snapshot for the status endpoint.
#[derive(Debug, Clone, serde::Serialize)]
pub struct PoolStats {
    pub min_connections: usize,
    pub max_connections: usize,
    pub total_connections: usize,
    pub idle_connections: usize,
    pub connections_created: u64,
    pub connections_retired: u64,
}

struct Returned<C> {
    entry: PooledConn<C>,
    permit: OwnedSemaphorePermit,
}

/// Pooled-connection manager for a remote service.
///
/// Created once at startup via [`ResourcePool::start`]; the returned `Arc`
/// is cheaply cloned wherever a connection is needed.
pub struct ResourcePool<F: ConnectionFactory> {
    factory: F,
    config: PoolConfig,
    inner: Mutex<Inner<F::Conn>>,
    capacity: Arc<Semaphore>,
    returns_tx: mpsc::UnboundedSender<Returned<F::Conn>>,
    cancel: CancellationToken,
    maintenance: Mutex<Option<tokio::task::JoinHandle<()>>>,
}

/// Scoped handle to a checked-out connection.
///
/// Dropping the handle sends the connection back to the pool's maintenance
/// task for a post-use liveness check before it is requeued.
pub struct PoolHandle<F: ConnectionFactory> {
    entry: Option<PooledConn<F::Conn>>,
    permit: Option<OwnedSemaphorePermit>,
    returns_tx: mpsc::UnboundedSender<Returned<F::Conn>>,
}

impl<F: ConnectionFactory> std::fmt::Debug for PoolHandle<F> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PoolHandle")
            .field("connection_id", &self.entry.as_ref().map(|e| e.id))
            .finish_non_exhaustive()
    }
}

impl<F: ConnectionFactory> Deref for PoolHandle<F> {
    type Target = F::Conn;

    fn deref(&self) -> &Self::Target {
        &self.entry.as_ref().expect("connection present until drop").conn
    }
}

impl<F: ConnectionFactory> PoolHandle<F> {
    /// Pool-assigned id of the underlying connection.
    pub fn connection_id(&self) -> u64 {
        self.entry.as_ref().expect("connection present until drop").id
    }
}

impl<F: ConnectionFactory> Drop for PoolHandle<F> {
    fn drop(&mut self) {
        if let (Some(entry), Some(permit)) = (self.entry.take(), self.permit.take()) {
            // If the maintenance task is gone the pool is shutting down;
            // dropping the connection and permit here is the correct end state.
            let _ = self.returns_tx.send(Returned { entry, permit });
        }
    }
}

impl<F: ConnectionFactory> ResourcePool<F> {
    /// Create the pool, spawn its maintenance task, and eagerly open
    /// `min_connections` connections (failures are logged, not fatal -- the
    /// health sweep keeps trying).
    pub async fn start(factory: F, config: PoolConfig) -> Arc<Self> {
        let (returns_tx, returns_rx) = mpsc::unbounded_channel();
        let pool = Arc::new(Self {
            capacity: Arc::new(Semaphore::new(config.max_connections)),
            inner: Mutex::new(Inner {
                idle: VecDeque::new(),
                total: 0,
                next_id: 0,
                created_total: 0,
                retired_total: 0,
            }),
            factory,
            config,
            returns_tx,
            cancel: CancellationToken::new(),
            maintenance: Mutex::new(None),
        });

        for _ in 0..pool.config.min_connections {
            match pool.create_connection().await {
                Ok(entry) => pool.inner.lock().expect("pool lock poisoned").idle.push_back(entry),
                Err(e) => tracing::warn!(error = %e, "Failed to open initial pool connection"),
            }
        }

        let handle = tokio::spawn(Self::run_maintenance(Arc::clone(&pool), returns_rx));
        *pool.maintenance.lock().expect("pool lock poisoned") = Some(handle);

        tracing::info!(
            min = pool.config.min_connections,
            max = pool.config.max_connections,
            open = pool.stats().total_connections,
            "Connection pool started",
        );
        pool
    }

    /// Check a connection out, waiting at most `timeout` for capacity.
    ///
    /// Expired and dead idle connections encountered on the way are retired
    /// and replaced transparently; the caller only ever sees a live
    /// connection younger than `connection_lifetime`.
    pub async fn checkout(&self, timeout: Duration) -> Result<PoolHandle<F>, CoreError> {
        let permit = match tokio::time::timeout(
            timeout,
            Arc::clone(&self.capacity).acquire_owned(),
        )
        .await
        {
            Ok(Ok(permit)) => permit,
            Ok(Err(_)) => return Err(CoreError::PoolExhausted("pool is shut down".into())),
            Err(_) => {
                return Err(CoreError::PoolExhausted(format!(
                    "no connection available within {}s",
                    timeout.as_secs()
                )))
            }
        };

        loop {
            let candidate = self.inner.lock().expect("pool lock poisoned").idle.pop_front();
            match candidate {
                Some(entry) => {
                    if entry.created_at.elapsed() > self.config.connection_lifetime {
                        tracing::info!(connection_id = entry.id, "Retiring connection past lifetime");
                        self.retire(entry);
                        continue;
                    }
                    if !self.factory.is_alive(&entry.conn).await {
                        tracing::warn!(connection_id = entry.id, "Discarding dead idle connection");
                        self.retire(entry);
                        continue;
                    }
                    return Ok(self.into_handle(entry, permit));
                }
                None => {
                    // Holding a capacity permit with no idle connection
                    // guarantees total < max, so creation cannot overshoot.
                    let entry = self.create_connection().await?;
                    return Ok(self.into_handle(entry, permit));
                }
            }
        }
    }

    pub fn stats(&self) -> PoolStats {
        let inner = self.inner.lock().expect("pool lock poisoned");
        PoolStats {
            min_connections: self.config.min_connections,
            max_connections: self.config.max_connections,
            total_connections: inner.total,
            idle_connections: inner.idle.len(),
            connections_created: inner.created_total,
            connections_retired: inner.retired_total,
        }
    }

    /// Stop the maintenance task and close every connection.
    pub async fn shutdown(&self) {
        tracing::info!("Shutting down connection pool");
        self.cancel.cancel();
        self.capacity.close();

        let handle = self.maintenance.lock().expect("pool lock poisoned").take();
        if let Some(handle) = handle {
            let _ = tokio::time::timeout(Duration::from_secs(5), handle).await;
        }

        let mut inner = self.inner.lock().expect("pool lock poisoned");
        let drained = inner.idle.len();
        inner.total -= drained;
        inner.retired_total += drained as u64;
        inner.idle.clear();
        tracing::info!(closed = drained, "Connection pool shut down");
    }

    // ---- private helpers ----

    fn into_handle(&self, mut entry: PooledConn<F::Conn>, permit: OwnedSemaphorePermit) -> PoolHandle<F> {
        entry.last_used_at = Instant::now();
        entry.usage_count += 1;
        PoolHandle {
            entry: Some(entry),
            permit: Some(permit),
            returns_tx: self.returns_tx.clone(),
        }
    }

    async fn create_connection(&self) -> Result<PooledConn<F::Conn>, CoreError> {
        let id = {
            let mut inner = self.inner.lock().expect("pool lock poisoned");
            inner.next_id += 1;
            inner.next_id
        };
        let conn = self.factory.connect(id).await?;
        {
            let mut inner = self.inner.lock().expect("pool lock poisoned");
            inner.total += 1;
            inner.created_total += 1;
        }
        tracing::info!(connection_id = id, "Connection established");
        Ok(PooledConn {
            id,
            created_at: Instant::now(),
            last_used_at: Instant::now(),
            usage_count: 0,
            conn,
        })
    }

    fn retire(&self, entry: PooledConn<F::Conn>) {
        let mut inner = self.inner.lock().expect("pool lock poisoned");
        inner.total -= 1;
        inner.retired_total += 1;
        drop(inner);
        drop(entry);
    }

    fn requeue(&self, entry: PooledConn<F::Conn>) {
        self.inner.lock().expect("pool lock poisoned").idle.push_back(entry);
    }

    /// Maintenance loop: process returned connections and run the periodic
    /// health sweep, until cancelled.
    async fn run_maintenance(pool: Arc<Self>, mut returns_rx: mpsc::UnboundedReceiver<Returned<F::Conn>>) {
        let mut ticker = tokio::time::interval(pool.config.health_check_interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        // The first tick fires immediately; skip it so startup is not
        // immediately followed by a sweep.
        ticker.tick().await;

        loop {
            tokio::select! {
                _ = pool.cancel.cancelled() => break,
                returned = returns_rx.recv() => match returned {
                    Some(ret) => pool.process_return(ret).await,
                    None => break,
                },
                _ = ticker.tick() => pool.health_sweep().await,
            }
        }

        // Drain any in-flight returns so their connections are accounted for.
        while let Ok(ret) = returns_rx.try_recv() {
            pool.retire(ret.entry);
        }
    }

    async fn process_return(&self, returned: Returned<F::Conn>) {
        let Returned { mut entry, permit } = returned;
        entry.last_used_at = Instant::now();

        if entry.created_at.elapsed() > self.config.connection_lifetime {
            tracing::info!(
                connection_id = entry.id,
                usage_count = entry.usage_count,
                "Connection exceeded lifetime, closing",
            );
            self.retire(entry);
        } else if !self.factory.is_alive(&entry.conn).await {
            tracing::warn!(connection_id = entry.id, "Returned connection failed liveness check");
            self.retire(entry);
        } else {
            self.requeue(entry);
        }

        // Capacity becomes visible to waiters only now that the connection
        // is requeued or its slot genuinely freed.
        drop(permit);
    }

    async fn health_sweep(&self) {
        let candidates: Vec<PooledConn<F::Conn>> = {
            let mut inner = self.inner.lock().expect("pool lock poisoned");
            inner.idle.drain(..).collect()
        };

        for entry in candidates {
            if entry.created_at.elapsed() > self.config.connection_lifetime {
                tracing::info!(connection_id = entry.id, "Health sweep retiring expired connection");
                self.retire(entry);
            } else if !self.factory.is_alive(&entry.conn).await {
                tracing::warn!(
                    connection_id = entry.id,
                    idle_ms = entry.last_used_at.elapsed().as_millis() as u64,
                    "Health sweep removing dead connection",
                );
                self.retire(entry);
            } else {
                self.requeue(entry);
            }
        }

        // Replenish up to the configured minimum.
        loop {
            let below_min = {
                let inner = self.inner.lock().expect("pool lock poisoned");
                inner.total < self.config.min_connections
            };
            if !below_min {
                break;
            }
            match self.create_connection().await {
                Ok(entry) => self.requeue(entry),
                Err(e) => {
                    tracing::warn!(error = %e, "Health sweep failed to replace connection");
                    break;
                }
            }
        }
    }
}
