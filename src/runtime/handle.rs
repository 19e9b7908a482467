use std::{env, fmt, future, sync::Arc};

use async_trait::async_trait;
use tokio::{
    sync::{broadcast, mpsc, oneshot},
    time::{Duration, Instant, Interval},
};
use tracing::{debug, info, warn};

use crate::{
    core::{
        cache::{Fetch, FetchError, ResourceCache},
        snapshot::CacheSnapshot,
    },
    entry::QueueEntry,
    remote::{PushSignal, RemoteQueue, RemoteRecords, TransportResult},
    stats::{Aggregate, GameRecord, aggregate},
    types::{EntryId, Resource},
};

use super::{
    events::SyncEvent,
    mutation::{MutationCoordinator, MutationError},
    sync::{ConnectionState, SyncAction, SyncTrigger},
};

/// Error returned by [`SessionHandle`] operations.
#[derive(Debug)]
pub enum SessionError {
    /// A read could not reach the server.
    Fetch(FetchError),
    /// A mutation's remote call failed.
    Mutation(MutationError),
    /// The mutation task panicked or was aborted.
    Aborted,
    /// The session loop has stopped.
    ChannelClosed,
}

impl fmt::Display for SessionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Fetch(err) => write!(f, "{err}"),
            Self::Mutation(err) => write!(f, "{err}"),
            Self::Aborted => f.write_str("mutation task aborted"),
            Self::ChannelClosed => f.write_str("session is shut down"),
        }
    }
}

impl std::error::Error for SessionError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Fetch(err) => Some(err),
            Self::Mutation(err) => Some(err),
            Self::Aborted | Self::ChannelClosed => None,
        }
    }
}

impl From<FetchError> for SessionError {
    fn from(value: FetchError) -> Self {
        Self::Fetch(value)
    }
}

impl From<MutationError> for SessionError {
    fn from(value: MutationError) -> Self {
        Self::Mutation(value)
    }
}

/// Session settings.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Platform handle of the host; games are scored from this side.
    pub home_handle: String,
    /// Refetch both resources on this period. `0` disables polling.
    pub poll_interval_ms: u64,
    /// Fetch both resources as soon as the session starts.
    pub fetch_on_start: bool,
    /// Capacity of the broadcast event stream.
    pub event_queue_bound: usize,
    /// Capacity of the session command channel.
    pub command_queue_bound: usize,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            home_handle: "gandalf868".to_string(),
            poll_interval_ms: 0,
            fetch_on_start: true,
            event_queue_bound: 1024,
            command_queue_bound: 64,
        }
    }
}

impl SessionConfig {
    /// Reads overrides from the environment, falling back to defaults.
    ///
    /// - `QUEUESYNC_HOME_HANDLE`
    /// - `QUEUESYNC_POLL_INTERVAL_MS`
    /// - `QUEUESYNC_FETCH_ON_START` (`true`/`false`)
    pub fn from_env() -> Self {
        Self::from_lookup(|key| env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let defaults = Self::default();
        Self {
            home_handle: lookup("QUEUESYNC_HOME_HANDLE").unwrap_or(defaults.home_handle),
            poll_interval_ms: lookup("QUEUESYNC_POLL_INTERVAL_MS")
                .and_then(|s| s.parse().ok())
                .unwrap_or(defaults.poll_interval_ms),
            fetch_on_start: lookup("QUEUESYNC_FETCH_ON_START")
                .and_then(|s| s.parse().ok())
                .unwrap_or(defaults.fetch_on_start),
            ..defaults
        }
    }
}

struct QueueSource(Arc<dyn RemoteQueue>);

#[async_trait]
impl Fetch<QueueEntry> for QueueSource {
    async fn fetch(&self) -> TransportResult<Vec<QueueEntry>> {
        self.0.list_entries().await
    }
}

struct RecordsSource(Arc<dyn RemoteRecords>);

#[async_trait]
impl Fetch<GameRecord> for RecordsSource {
    async fn fetch(&self) -> TransportResult<Vec<GameRecord>> {
        self.0.list_records().await
    }
}

struct Session {
    queue: ResourceCache<QueueEntry>,
    records: ResourceCache<GameRecord>,
    coordinator: MutationCoordinator,
    home_handle: String,
    events_tx: broadcast::Sender<SyncEvent>,
}

impl Session {
    async fn refresh(&self) -> Result<(), SessionError> {
        let (queue, records) = tokio::join!(self.queue.get(), self.records.get());
        let queue = self.report(Resource::Queue, queue);
        let records = self.report(Resource::Records, records);
        queue?;
        records?;
        Ok(())
    }

    fn report<T>(
        &self,
        resource: Resource,
        outcome: Result<CacheSnapshot<T>, FetchError>,
    ) -> Result<(), FetchError> {
        match outcome {
            Ok(snapshot) => {
                let _ = self.events_tx.send(SyncEvent::Refreshed {
                    resource,
                    version: snapshot.version(),
                });
                Ok(())
            }
            Err(err) => {
                let _ = self.events_tx.send(SyncEvent::FetchFailed { resource });
                Err(err)
            }
        }
    }

    // Stale-while-revalidate: mark both caches stale and refetch in the
    // background. Nobody awaits the refetch.
    fn revalidate(self: &Arc<Self>) {
        self.queue.invalidate();
        self.records.invalidate();
        let _ = self.events_tx.send(SyncEvent::Invalidated);

        let session = Arc::clone(self);
        tokio::spawn(async move {
            if let Err(err) = session.refresh().await {
                warn!(error = %err, "background refresh failed");
            }
        });
    }
}

enum Command {
    PushState {
        resp: oneshot::Sender<ConnectionState>,
    },
    Shutdown {
        resp: oneshot::Sender<()>,
    },
}

/// Presentation-facing handle to one dashboard session.
///
/// Cloning is cheap. The caches live as long as the last handle; there is no
/// process-wide state.
#[derive(Clone)]
pub struct SessionHandle {
    session: Arc<Session>,
    cmd_tx: mpsc::Sender<Command>,
}

/// Starts a session: builds the queue and records caches, and spawns the loop
/// that consumes push signals and drives polling.
pub fn spawn_session(
    remote_queue: Arc<dyn RemoteQueue>,
    remote_records: Arc<dyn RemoteRecords>,
    push_rx: mpsc::Receiver<PushSignal>,
    config: SessionConfig,
) -> SessionHandle {
    let (cmd_tx, cmd_rx) = mpsc::channel::<Command>(config.command_queue_bound);
    let (events_tx, _) = broadcast::channel::<SyncEvent>(config.event_queue_bound);

    let queue = ResourceCache::new(
        Resource::Queue,
        Arc::new(QueueSource(Arc::clone(&remote_queue))),
    );
    let records = ResourceCache::new(
        Resource::Records,
        Arc::new(RecordsSource(Arc::clone(&remote_records))),
    );
    let coordinator = MutationCoordinator::new(
        queue.clone(),
        records.clone(),
        remote_queue,
        remote_records,
        events_tx.clone(),
    );

    let session = Arc::new(Session {
        queue,
        records,
        coordinator,
        home_handle: config.home_handle.clone(),
        events_tx,
    });

    if config.fetch_on_start {
        let initial = Arc::clone(&session);
        tokio::spawn(async move {
            if let Err(err) = initial.refresh().await {
                warn!(error = %err, "initial fetch failed");
            }
        });
    }

    tokio::spawn(run_loop(Arc::clone(&session), cmd_rx, push_rx, config));

    SessionHandle { session, cmd_tx }
}

async fn run_loop(
    session: Arc<Session>,
    mut cmd_rx: mpsc::Receiver<Command>,
    mut push_rx: mpsc::Receiver<PushSignal>,
    config: SessionConfig,
) {
    let mut trigger = SyncTrigger::new();
    let mut push_open = true;
    let mut poll = (config.poll_interval_ms > 0).then(|| {
        let period = Duration::from_millis(config.poll_interval_ms);
        tokio::time::interval_at(Instant::now() + period, period)
    });

    loop {
        tokio::select! {
            cmd = cmd_rx.recv() => {
                let Some(cmd) = cmd else { break; };
                match cmd {
                    Command::PushState { resp } => {
                        let _ = resp.send(trigger.state());
                    }
                    Command::Shutdown { resp } => {
                        let _ = resp.send(());
                        break;
                    }
                }
            }
            signal = push_rx.recv(), if push_open => {
                let signal = signal.unwrap_or_else(|| {
                    push_open = false;
                    debug!("push transport dropped its sender");
                    PushSignal::Closed
                });
                match trigger.on_signal(signal) {
                    SyncAction::Invalidate => session.revalidate(),
                    SyncAction::Connected => {
                        let _ = session.events_tx.send(SyncEvent::PushConnected);
                    }
                    SyncAction::Disconnected => {
                        let _ = session.events_tx.send(SyncEvent::PushDisconnected);
                    }
                    SyncAction::Ignore => {}
                }
            }
            _ = tick(&mut poll) => {
                debug!("poll interval elapsed");
                session.revalidate();
            }
        }
    }

    info!("session loop stopped");
}

async fn tick(poll: &mut Option<Interval>) {
    match poll {
        Some(interval) => {
            interval.tick().await;
        }
        None => future::pending().await,
    }
}

impl SessionHandle {
    /// New receiver on the session event stream.
    pub fn subscribe(&self) -> broadcast::Receiver<SyncEvent> {
        self.session.events_tx.subscribe()
    }

    /// Current queue snapshot, `None` before the first fetch. Never suspends.
    pub fn queue_view(&self) -> Option<CacheSnapshot<QueueEntry>> {
        self.session.queue.view()
    }

    /// Statistics over the current records snapshot. Never suspends.
    pub fn stats_view(&self) -> Aggregate {
        self.session
            .records
            .view()
            .map(|snapshot| aggregate(snapshot.items(), &self.session.home_handle))
            .unwrap_or_default()
    }

    /// Queue cache, for in-flight and invalidation state.
    pub fn queue_cache(&self) -> &ResourceCache<QueueEntry> {
        &self.session.queue
    }

    /// Records cache.
    pub fn records_cache(&self) -> &ResourceCache<GameRecord> {
        &self.session.records
    }

    /// Fetches whatever is missing or stale in both caches.
    pub async fn refresh(&self) -> Result<(), SessionError> {
        self.session.refresh().await
    }

    /// Removes an entry optimistically; see [`MutationCoordinator::remove_entry`].
    pub async fn remove_entry(&self, id: impl Into<EntryId>) -> Result<(), SessionError> {
        let id = id.into();
        let session = Arc::clone(&self.session);
        run_detached(async move { session.coordinator.remove_entry(id).await }).await
    }

    /// Advances an entry; see [`MutationCoordinator::advance_entry`].
    pub async fn advance_entry(&self, id: impl Into<EntryId>) -> Result<(), SessionError> {
        let id = id.into();
        let session = Arc::clone(&self.session);
        run_detached(async move { session.coordinator.advance_entry(id).await }).await
    }

    /// Archives an entry's game; see [`MutationCoordinator::archive_as_record`].
    pub async fn archive_as_record(&self, entry: QueueEntry) -> Result<(), SessionError> {
        let session = Arc::clone(&self.session);
        run_detached(async move { session.coordinator.archive_as_record(entry).await }).await
    }

    /// Current state of the push channel.
    pub async fn push_state(&self) -> Result<ConnectionState, SessionError> {
        let (tx, rx) = oneshot::channel();
        self.cmd_tx
            .send(Command::PushState { resp: tx })
            .await
            .map_err(|_| SessionError::ChannelClosed)?;
        rx.await.map_err(|_| SessionError::ChannelClosed)
    }

    /// Stops the push/poll loop. Mutations already running still settle.
    pub async fn shutdown(&self) -> Result<(), SessionError> {
        let (tx, rx) = oneshot::channel();
        self.cmd_tx
            .send(Command::Shutdown { resp: tx })
            .await
            .map_err(|_| SessionError::ChannelClosed)?;
        rx.await.map_err(|_| SessionError::ChannelClosed)
    }
}

// Mutations run on their own task so a caller that stops awaiting cannot
// leave an optimistic change unsettled.
async fn run_detached<F>(mutation: F) -> Result<(), SessionError>
where
    F: future::Future<Output = Result<(), MutationError>> + Send + 'static,
{
    tokio::spawn(mutation)
        .await
        .map_err(|_| SessionError::Aborted)?
        .map_err(SessionError::from)
}
