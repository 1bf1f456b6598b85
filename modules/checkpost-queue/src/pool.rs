//! Lazy-connect, lazy-close lifecycle for a shared external resource.
//!
//! The pool owns at most one live resource (e.g. a queue client). Connecting
//! happens on the first `acquire()`; concurrent acquires while a connect is in
//! flight coalesce onto that single attempt. `close()` is idempotent and
//! concurrent closes coalesce onto one in-flight release.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use futures::future::{BoxFuture, Shared};
use futures::FutureExt;
use thiserror::Error;
use tokio::sync::Mutex;
use tracing::debug;

/// Connect/release hooks for the resource a pool manages.
#[async_trait]
pub trait ResourceFactory: Send + Sync + 'static {
    type Resource: Send + Sync + 'static;

    async fn connect(&self) -> anyhow::Result<Self::Resource>;
    async fn release(&self, resource: &Self::Resource) -> anyhow::Result<()>;
}

#[derive(Debug, Error)]
pub enum PoolError {
    #[error("resource pool is closed")]
    Closed,

    #[error("resource connect failed: {0}")]
    Connect(Arc<anyhow::Error>),

    #[error("resource release failed: {0}")]
    Release(Arc<anyhow::Error>),
}

type SharedConnect<R> = Shared<BoxFuture<'static, Result<Arc<R>, Arc<anyhow::Error>>>>;
type SharedClose = Shared<BoxFuture<'static, Result<(), Arc<anyhow::Error>>>>;

enum State<R> {
    Idle,
    /// A connect attempt is in flight. The epoch identifies the attempt so a
    /// waiter resuming after the await can tell whether it is still the
    /// active one (a close may have superseded it mid-suspension).
    Initializing { epoch: u64, connect: SharedConnect<R> },
    Ready(Arc<R>),
    Closing(SharedClose),
    Closed,
}

/// What an `acquire()` or `close()` call has to wait on outside the lock.
enum Waiting<R> {
    Connect { epoch: u64, connect: SharedConnect<R> },
    Close(SharedClose),
}

pub struct ResourcePool<F: ResourceFactory> {
    factory: Arc<F>,
    state: Mutex<State<F::Resource>>,
    epoch: AtomicU64,
}

impl<F: ResourceFactory> ResourcePool<F> {
    pub fn new(factory: F) -> Self {
        Self {
            factory: Arc::new(factory),
            state: Mutex::new(State::Idle),
            epoch: AtomicU64::new(0),
        }
    }

    /// Get the shared resource, connecting it if necessary.
    ///
    /// Concurrent callers while disconnected trigger exactly one `connect()`.
    /// Fails with [`PoolError::Closed`] once the pool has been closed.
    pub async fn acquire(&self) -> Result<Arc<F::Resource>, PoolError> {
        loop {
            let waiting = {
                let mut state = self.state.lock().await;
                match &*state {
                    State::Ready(resource) => return Ok(resource.clone()),
                    State::Closed => return Err(PoolError::Closed),
                    State::Idle => {
                        let epoch = self.epoch.fetch_add(1, Ordering::Relaxed);
                        let factory = self.factory.clone();
                        let connect = async move {
                            factory.connect().await.map(Arc::new).map_err(Arc::new)
                        }
                        .boxed()
                        .shared();
                        debug!(epoch, "resource pool: starting connect");
                        *state = State::Initializing {
                            epoch,
                            connect: connect.clone(),
                        };
                        Waiting::Connect { epoch, connect }
                    }
                    State::Initializing { epoch, connect } => Waiting::Connect {
                        epoch: *epoch,
                        connect: connect.clone(),
                    },
                    State::Closing(close) => Waiting::Close(close.clone()),
                }
            };

            match waiting {
                Waiting::Connect { epoch, connect } => {
                    let result = connect.await;
                    let mut state = self.state.lock().await;
                    let still_active = matches!(
                        &*state,
                        State::Initializing { epoch: current, .. } if *current == epoch
                    );
                    match result {
                        Ok(resource) if still_active => {
                            *state = State::Ready(resource.clone());
                            return Ok(resource);
                        }
                        Err(error) if still_active => {
                            *state = State::Idle;
                            return Err(PoolError::Connect(error));
                        }
                        Err(error) => return Err(PoolError::Connect(error)),
                        // Connected, but the attempt is no longer the active
                        // one (a close superseded it). Re-evaluate.
                        Ok(_) => {}
                    }
                }
                // Await the in-flight close, swallowing its error, and loop.
                Waiting::Close(close) => {
                    let _ = close.await;
                }
            }
        }
    }

    /// Release the resource and shut the pool. Idempotent; concurrent calls
    /// coalesce onto one in-flight release.
    ///
    /// A failed release returns the pool to idle so a later close can retry.
    pub async fn close(&self) -> Result<(), PoolError> {
        let waiting = {
            let mut state = self.state.lock().await;
            match &*state {
                State::Closed => return Ok(()),
                State::Idle => {
                    *state = State::Closed;
                    return Ok(());
                }
                State::Closing(close) => close.clone(),
                State::Ready(resource) => {
                    let factory = self.factory.clone();
                    let resource = resource.clone();
                    let close = async move { factory.release(&resource).await.map_err(Arc::new) }
                        .boxed()
                        .shared();
                    *state = State::Closing(close.clone());
                    close
                }
                State::Initializing { connect, .. } => {
                    // Wait out the in-flight connect. A connect failure means
                    // there is nothing to release.
                    let factory = self.factory.clone();
                    let connect = connect.clone();
                    let close = async move {
                        match connect.await {
                            Ok(resource) => factory.release(&resource).await.map_err(Arc::new),
                            Err(_) => Ok(()),
                        }
                    }
                    .boxed()
                    .shared();
                    *state = State::Closing(close.clone());
                    close
                }
            }
        };

        let result = waiting.clone().await;
        let mut state = self.state.lock().await;
        let ours = matches!(&*state, State::Closing(current) if current.ptr_eq(&waiting));
        match result {
            Ok(()) => {
                if ours {
                    *state = State::Closed;
                    debug!("resource pool: closed");
                }
                Ok(())
            }
            Err(error) => {
                if ours {
                    *state = State::Idle;
                }
                Err(PoolError::Release(error))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;
    use std::time::Duration;

    struct FakeResource {
        serial: usize,
    }

    #[derive(Default)]
    struct FakeFactory {
        connects: AtomicUsize,
        releases: AtomicUsize,
        fail_connect: std::sync::atomic::AtomicBool,
        fail_release: std::sync::atomic::AtomicBool,
        connect_delay: Option<Duration>,
    }

    impl FakeFactory {
        fn slow(delay_ms: u64) -> Self {
            Self {
                connect_delay: Some(Duration::from_millis(delay_ms)),
                ..Self::default()
            }
        }
    }

    #[async_trait]
    impl ResourceFactory for FakeFactory {
        type Resource = FakeResource;

        async fn connect(&self) -> anyhow::Result<FakeResource> {
            if let Some(delay) = self.connect_delay {
                tokio::time::sleep(delay).await;
            }
            let serial = self.connects.fetch_add(1, Ordering::SeqCst);
            if self.fail_connect.load(Ordering::SeqCst) {
                anyhow::bail!("connect refused");
            }
            Ok(FakeResource { serial })
        }

        async fn release(&self, _resource: &FakeResource) -> anyhow::Result<()> {
            self.releases.fetch_add(1, Ordering::SeqCst);
            if self.fail_release.load(Ordering::SeqCst) {
                anyhow::bail!("release failed");
            }
            Ok(())
        }
    }

    #[tokio::test]
    async fn concurrent_acquires_share_one_connect() {
        let pool = Arc::new(ResourcePool::new(FakeFactory::slow(20)));
        let tasks: Vec<_> = (0..3)
            .map(|_| {
                let pool = pool.clone();
                tokio::spawn(async move { pool.acquire().await })
            })
            .collect();
        for task in tasks {
            let resource = task.await.unwrap().unwrap();
            assert_eq!(resource.serial, 0);
        }
        assert_eq!(pool.factory.connects.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn acquire_after_close_fails() {
        let pool = ResourcePool::new(FakeFactory::default());
        pool.acquire().await.unwrap();
        pool.close().await.unwrap();
        assert!(matches!(pool.acquire().await, Err(PoolError::Closed)));
    }

    #[tokio::test]
    async fn close_during_connect_awaits_then_releases() {
        let pool = Arc::new(ResourcePool::new(FakeFactory::slow(30)));
        let acquirer = {
            let pool = pool.clone();
            tokio::spawn(async move { pool.acquire().await })
        };
        // Let the acquire start its connect before closing.
        tokio::time::sleep(Duration::from_millis(5)).await;
        pool.close().await.unwrap();

        assert_eq!(pool.factory.connects.load(Ordering::SeqCst), 1);
        assert_eq!(pool.factory.releases.load(Ordering::SeqCst), 1);
        // The suspended acquirer observes the close rather than a resource.
        assert!(matches!(acquirer.await.unwrap(), Err(PoolError::Closed)));
        assert!(matches!(pool.acquire().await, Err(PoolError::Closed)));
    }

    #[tokio::test]
    async fn failed_connect_returns_pool_to_idle() {
        let pool = ResourcePool::new(FakeFactory::default());
        pool.factory.fail_connect.store(true, Ordering::SeqCst);
        assert!(matches!(pool.acquire().await, Err(PoolError::Connect(_))));

        pool.factory.fail_connect.store(false, Ordering::SeqCst);
        pool.acquire().await.unwrap();
        assert_eq!(pool.factory.connects.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn failed_release_returns_pool_to_idle() {
        let pool = ResourcePool::new(FakeFactory::default());
        pool.acquire().await.unwrap();
        pool.factory.fail_release.store(true, Ordering::SeqCst);
        assert!(matches!(pool.close().await, Err(PoolError::Release(_))));
        // Pool fell back to idle; a later close succeeds trivially.
        pool.close().await.unwrap();
        assert!(matches!(pool.acquire().await, Err(PoolError::Closed)));
    }

    #[tokio::test]
    async fn concurrent_closes_coalesce() {
        let pool = Arc::new(ResourcePool::new(FakeFactory::default()));
        pool.acquire().await.unwrap();
        let (first, second) = tokio::join!(pool.close(), pool.close());
        first.unwrap();
        second.unwrap();
        assert_eq!(pool.factory.releases.load(Ordering::SeqCst), 1);
    }
}
