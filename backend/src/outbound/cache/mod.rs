//! Periodic query-result cache.
//!
//! [`QueryCacher`] runs one expensive read-only query on a background tick
//! and serves the latest result without touching the database. Each instance
//! jitters its tick period so identically configured processes do not refresh
//! in lockstep.
//!
//! Lifecycle: `Unstarted -> Running -> Stopped`. The loop exits when the
//! shutdown future passed to [`QueryCacher::start`] resolves or
//! [`QueryCacher::stop`] is called.

use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, RwLock};
use std::time::Duration;

use futures_util::FutureExt;
use futures_util::future::BoxFuture;
use rand::Rng;
use tokio::runtime::Handle;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, error, info, warn};

/// Error type query functions may return.
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

type QueryFn<T> = dyn Fn() -> BoxFuture<'static, Result<T, BoxError>> + Send + Sync;

const MIN_TICK: Duration = Duration::from_millis(1);

/// Timing for a [`QueryCacher`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QueryCacherConfig {
    /// Base refresh period before jitter.
    pub tick_period: Duration,
    /// Maximum deviation applied to `tick_period`, in either direction.
    pub jitter: Duration,
    /// Upper bound for a single query run.
    pub run_timeout: Duration,
}

impl Default for QueryCacherConfig {
    fn default() -> Self {
        Self {
            tick_period: Duration::from_secs(10),
            jitter: Duration::from_secs(1),
            run_timeout: Duration::from_secs(30),
        }
    }
}

impl QueryCacherConfig {
    /// Override the base tick period.
    #[must_use]
    pub fn with_tick_period(mut self, tick_period: Duration) -> Self {
        self.tick_period = tick_period;
        self
    }

    /// Override the jitter bound.
    #[must_use]
    pub fn with_jitter(mut self, jitter: Duration) -> Self {
        self.jitter = jitter;
        self
    }

    /// Override the per-run timeout.
    #[must_use]
    pub fn with_run_timeout(mut self, run_timeout: Duration) -> Self {
        self.run_timeout = run_timeout;
        self
    }
}

/// Failures from a cacher run or lifecycle call.
#[derive(Debug, thiserror::Error)]
pub enum QueryCacheError {
    #[error("query `{name}` timed out after {after:?}")]
    Timeout { name: String, after: Duration },
    #[error("query `{name}` failed: {source}")]
    Query {
        name: String,
        #[source]
        source: BoxError,
    },
    #[error("no tokio runtime is available to run the refresh loop")]
    NoRuntime,
}

/// Observable lifecycle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacherState {
    Unstarted,
    Running,
    Stopped,
}

enum TaskState {
    Unstarted,
    Running {
        stop: oneshot::Sender<()>,
        handle: JoinHandle<()>,
    },
    Stopped,
}

struct Shared<T> {
    name: String,
    query: Box<QueryFn<T>>,
    run_timeout: Duration,
    // Value and presence change together under one write.
    cached: RwLock<Option<T>>,
    refresh: tokio::sync::Mutex<()>,
}

impl<T: Clone + Send + Sync + 'static> Shared<T> {
    async fn run_query(&self) -> Result<T, QueryCacheError> {
        let _serialised = self.refresh.lock().await;
        let value = match tokio::time::timeout(self.run_timeout, (self.query)()).await {
            Ok(Ok(value)) => value,
            Ok(Err(source)) => {
                return Err(QueryCacheError::Query {
                    name: self.name.clone(),
                    source,
                });
            }
            Err(_) => {
                return Err(QueryCacheError::Timeout {
                    name: self.name.clone(),
                    after: self.run_timeout,
                });
            }
        };
        *self.cached.write().unwrap_or_else(PoisonError::into_inner) = Some(value.clone());
        Ok(value)
    }

    fn cached(&self) -> Option<T> {
        self.cached
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

/// Runs a query periodically and serves its latest result.
///
/// # Examples
/// ```
/// use queue_admin::outbound::cache::{QueryCacher, QueryCacherConfig};
///
/// # tokio::runtime::Runtime::new().unwrap().block_on(async {
/// let cacher = QueryCacher::new("answer", QueryCacherConfig::default(), || async {
///     Ok::<_, queue_admin::outbound::cache::BoxError>(42_u64)
/// });
/// assert_eq!(cacher.cached_res(), None);
/// assert_eq!(cacher.run_query().await.unwrap(), 42);
/// assert_eq!(cacher.cached_res(), Some(42));
/// # });
/// ```
pub struct QueryCacher<T> {
    shared: Arc<Shared<T>>,
    tick_period: Duration,
    task: Mutex<TaskState>,
}

impl<T> std::fmt::Debug for QueryCacher<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("QueryCacher")
            .field("name", &self.shared.name)
            .field("tick_period", &self.tick_period)
            .finish_non_exhaustive()
    }
}

impl<T: Clone + Send + Sync + 'static> QueryCacher<T> {
    /// Bind `query` without running it.
    pub fn new<F, Fut>(name: impl Into<String>, config: QueryCacherConfig, query: F) -> Self
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<T, BoxError>> + Send + 'static,
    {
        Self {
            shared: Arc::new(Shared {
                name: name.into(),
                query: Box::new(move || query().boxed()),
                run_timeout: config.run_timeout,
                cached: RwLock::new(None),
                refresh: tokio::sync::Mutex::new(()),
            }),
            tick_period: jittered(config.tick_period, config.jitter),
            task: Mutex::new(TaskState::Unstarted),
        }
    }

    /// Name used in logs and errors.
    pub fn name(&self) -> &str {
        &self.shared.name
    }

    /// Jittered period between refreshes for this instance.
    pub fn tick_period(&self) -> Duration {
        self.tick_period
    }

    /// Spawn the refresh loop. Calling this while running does nothing.
    ///
    /// The loop ends when `shutdown` resolves or [`Self::stop`] is called.
    /// A stopped cacher may be started again.
    ///
    /// # Errors
    /// Returns [`QueryCacheError::NoRuntime`] outside a tokio runtime.
    pub fn start<S>(&self, shutdown: S) -> Result<(), QueryCacheError>
    where
        S: Future<Output = ()> + Send + 'static,
    {
        let mut task = lock(&self.task);
        if matches!(&*task, TaskState::Running { handle, .. } if !handle.is_finished()) {
            return Ok(());
        }
        let runtime = Handle::try_current().map_err(|_| QueryCacheError::NoRuntime)?;
        let (stop, stopped) = oneshot::channel();
        let handle = runtime.spawn(refresh_loop(
            Arc::clone(&self.shared),
            self.tick_period,
            stopped,
            shutdown,
        ));
        *task = TaskState::Running { stop, handle };
        info!(
            cacher = %self.shared.name,
            tick_period_ms = u64::try_from(self.tick_period.as_millis()).unwrap_or(u64::MAX),
            "query cacher started"
        );
        Ok(())
    }

    /// Stop the refresh loop and wait for it to exit. A no-op when the loop
    /// was never started.
    pub async fn stop(&self) {
        let previous = {
            let mut task = lock(&self.task);
            match &*task {
                TaskState::Running { .. } => std::mem::replace(&mut *task, TaskState::Stopped),
                TaskState::Unstarted | TaskState::Stopped => return,
            }
        };
        if let TaskState::Running { stop, handle } = previous {
            if stop.send(()).is_err() {
                debug!(cacher = %self.shared.name, "query cacher loop already exited");
            }
            if let Err(err) = handle.await {
                warn!(cacher = %self.shared.name, error = %err, "query cacher task ended abnormally");
            }
        }
    }

    /// Run the query now, store the result, and return it.
    ///
    /// Runs never overlap; each is bounded by the configured run timeout.
    ///
    /// # Errors
    /// Returns the query's own error or [`QueryCacheError::Timeout`]. The
    /// previously cached value is kept on failure.
    pub async fn run_query(&self) -> Result<T, QueryCacheError> {
        self.shared.run_query().await
    }

    /// Latest stored result, `None` until the first successful run.
    pub fn cached_res(&self) -> Option<T> {
        self.shared.cached()
    }

    /// Current lifecycle state.
    pub fn state(&self) -> CacherState {
        match &*lock(&self.task) {
            TaskState::Unstarted => CacherState::Unstarted,
            TaskState::Running { handle, .. } if !handle.is_finished() => CacherState::Running,
            TaskState::Running { .. } | TaskState::Stopped => CacherState::Stopped,
        }
    }
}

async fn refresh_loop<T, S>(
    shared: Arc<Shared<T>>,
    tick_period: Duration,
    mut stopped: oneshot::Receiver<()>,
    shutdown: S,
) where
    T: Clone + Send + Sync + 'static,
    S: Future<Output = ()> + Send,
{
    tokio::pin!(shutdown);
    let mut ticker = tokio::time::interval_at(Instant::now() + tick_period, tick_period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    loop {
        tokio::select! {
            _ = &mut stopped => break,
            () = &mut shutdown => break,
            _ = ticker.tick() => {}
        }
        tokio::select! {
            _ = &mut stopped => break,
            () = &mut shutdown => break,
            result = shared.run_query() => {
                if let Err(err) = result {
                    error!(cacher = %shared.name, error = %err, "query cacher refresh failed");
                }
            }
        }
    }
    debug!(cacher = %shared.name, "query cacher stopped");
}

fn jittered(base: Duration, jitter: Duration) -> Duration {
    let span = u64::try_from(jitter.as_nanos())
        .unwrap_or(u64::MAX / 2)
        .saturating_mul(2);
    let offset = if span == 0 {
        0
    } else {
        rand::thread_rng().gen_range(0..=span)
    };
    (base.saturating_sub(jitter) + Duration::from_nanos(offset)).max(MIN_TICK)
}

fn lock<S>(mutex: &Mutex<S>) -> MutexGuard<'_, S> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

#[cfg(test)]
mod tests;
