#![allow(dead_code)]

use std::{
    sync::{
        Arc, Mutex,
        atomic::{AtomicBool, AtomicUsize, Ordering},
    },
    time::Duration,
};

use async_trait::async_trait;
use serde_json::json;
use tokio::sync::{Notify, broadcast, mpsc, oneshot};

use queuesync::{
    entry::{ArchiveRequest, QueueEntry},
    remote::{
        PushSignal, RemoteQueue, RemoteRecords, TransportError, TransportResult,
        memory::InMemoryRemote,
    },
    runtime::{
        events::SyncEvent,
        handle::{SessionConfig, SessionHandle, spawn_session},
    },
    stats::GameRecord,
    types::EntryId,
};

pub const HOME: &str = "gandalf868";

pub fn init_tracing() {
    let _ = tracing_subscriber::fmt().with_test_writer().try_init();
}

/// Game where the host plays `home_color` against an opponent rated `opp_rating`.
pub fn game(home_color: &str, home_won: bool, opp_rating: u32, accuracy: f64) -> GameRecord {
    let opp_color = if home_color == "white" { "black" } else { "white" };
    let (home_res, opp_res) = if home_won { ("win", "resigned") } else { ("checkmated", "win") };
    GameRecord::new(json!({
        home_color: {"username": HOME, "result": home_res, "rating": 1900},
        opp_color: {"username": "challenger", "result": opp_res, "rating": opp_rating},
        "accuracies": {home_color: accuracy, opp_color: 50.0}
    }))
}

/// In-memory server with switchable failures and gates that hold a call
/// until the test releases it.
#[derive(Default)]
pub struct FlakyServer {
    pub inner: InMemoryRemote,
    pub fail_list: AtomicBool,
    pub fail_delete: AtomicBool,
    pub fail_advance: AtomicBool,
    pub fail_create: AtomicBool,
    pub list_calls: AtomicUsize,
    mutation_gate: Mutex<Option<oneshot::Receiver<()>>>,
    list_gate: Mutex<Option<oneshot::Receiver<()>>>,
    pub mutation_entered: Notify,
    pub list_entered: Notify,
}

impl FlakyServer {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// The next delete/advance/create waits until the returned sender fires.
    pub fn hold_next_mutation(&self) -> oneshot::Sender<()> {
        let (tx, rx) = oneshot::channel();
        *self.mutation_gate.lock().expect("lock") = Some(rx);
        tx
    }

    /// The next list call (queue or records) reads the server, then waits
    /// until the returned sender fires before answering.
    pub fn hold_next_list(&self) -> oneshot::Sender<()> {
        let (tx, rx) = oneshot::channel();
        *self.list_gate.lock().expect("lock") = Some(rx);
        tx
    }

    async fn pass_mutation_gate(&self) {
        let gate = self.mutation_gate.lock().expect("lock").take();
        if let Some(rx) = gate {
            self.mutation_entered.notify_one();
            let _ = rx.await;
        }
    }

    async fn pass_list_gate(&self) {
        let gate = self.list_gate.lock().expect("lock").take();
        if let Some(rx) = gate {
            self.list_entered.notify_one();
            let _ = rx.await;
        }
    }

    fn check(flag: &AtomicBool) -> TransportResult<()> {
        if flag.load(Ordering::SeqCst) {
            Err(TransportError::Status(500))
        } else {
            Ok(())
        }
    }
}

#[async_trait]
impl RemoteQueue for FlakyServer {
    async fn list_entries(&self) -> TransportResult<Vec<QueueEntry>> {
        self.list_calls.fetch_add(1, Ordering::SeqCst);
        Self::check(&self.fail_list)?;
        let entries = self.inner.list_entries().await;
        self.pass_list_gate().await;
        entries
    }

    async fn delete_entry(&self, id: &EntryId) -> TransportResult<()> {
        self.pass_mutation_gate().await;
        Self::check(&self.fail_delete)?;
        self.inner.delete_entry(id).await
    }

    async fn advance_entry(&self, id: &EntryId) -> TransportResult<()> {
        self.pass_mutation_gate().await;
        Self::check(&self.fail_advance)?;
        self.inner.advance_entry(id).await
    }
}

#[async_trait]
impl RemoteRecords for FlakyServer {
    async fn list_records(&self) -> TransportResult<Vec<GameRecord>> {
        Self::check(&self.fail_list)?;
        let records = self.inner.list_records().await;
        self.pass_list_gate().await;
        records
    }

    async fn create_record(&self, request: &ArchiveRequest) -> TransportResult<()> {
        self.pass_mutation_gate().await;
        Self::check(&self.fail_create)?;
        self.inner.create_record(request).await
    }
}

pub struct Harness {
    pub server: Arc<FlakyServer>,
    pub session: SessionHandle,
    pub push_tx: mpsc::Sender<PushSignal>,
    pub events: broadcast::Receiver<SyncEvent>,
}

/// Session over `server` with polling and start-up fetch off.
pub async fn harness(server: Arc<FlakyServer>) -> Harness {
    harness_with(
        server,
        SessionConfig {
            fetch_on_start: false,
            ..SessionConfig::default()
        },
    )
    .await
}

pub async fn harness_with(server: Arc<FlakyServer>, config: SessionConfig) -> Harness {
    init_tracing();
    let (push_tx, push_rx) = mpsc::channel(16);
    let session = spawn_session(server.clone(), server.clone(), push_rx, config);
    let events = session.subscribe();
    Harness {
        server,
        session,
        push_tx,
        events,
    }
}

/// Waits (bounded) for the first event matching `pred`.
pub async fn wait_for(
    events: &mut broadcast::Receiver<SyncEvent>,
    pred: impl Fn(&SyncEvent) -> bool,
) -> SyncEvent {
    tokio::time::timeout(Duration::from_secs(2), async {
        loop {
            match events.recv().await {
                Ok(evt) if pred(&evt) => return evt,
                Ok(_) | Err(broadcast::error::RecvError::Lagged(_)) => continue,
                Err(broadcast::error::RecvError::Closed) => panic!("event stream closed"),
            }
        }
    })
    .await
    .expect("timed out waiting for event")
}

pub fn ids(entries: &[QueueEntry]) -> Vec<String> {
    entries.iter().map(|e| e.id.to_string()).collect()
}
