use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use charter_core::{BearerToken, ContentSnapshot, RemoteContentService, RemoteId, RemoteSnapshot};
use errors::RemoteError;
use parking_lot::Mutex;
use tokio::sync::Notify;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CallKind {
    Create,
    Update,
    Delete,
    IncrementForkCount,
    Fetch
}

/// One call as the remote saw it.
#[derive(Debug, Clone, PartialEq)]
pub struct RemoteCall {
    pub kind: CallKind,
    pub remote_id: Option<RemoteId>,
    pub title: Option<String>
}

#[derive(Debug, Default)]
struct State {
    records: HashMap<RemoteId, RemoteSnapshot>,
    failures: HashMap<CallKind, VecDeque<RemoteError>>,
    calls: Vec<RemoteCall>,
    next_id: u64,
    latency: Duration
}

/// In-memory remote content service.
///
/// Calls succeed against an internal record table unless a failure has been
/// scripted for that call kind. `hold_calls` parks every call after it is
/// recorded until `release_calls`, which lets a test act while an operation
/// is in flight.
#[derive(Debug, Default)]
pub struct ScriptedRemote {
    state: Mutex<State>,
    holding: AtomicBool,
    held: AtomicUsize,
    entered: Notify,
    released: Notify
}

impl ScriptedRemote {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fail_next(&self, kind: CallKind, error: RemoteError) {
        self.fail_times(kind, 1, error);
    }

    pub fn fail_times(&self, kind: CallKind, times: usize, error: RemoteError) {
        let mut state = self.state.lock();
        let queue = state.failures.entry(kind).or_default();
        for _ in 0..times {
            queue.push_back(error.clone());
        }
    }

    pub fn set_latency(&self, latency: Duration) {
        self.state.lock().latency = latency;
    }

    pub fn hold_calls(&self) {
        self.holding.store(true, Ordering::SeqCst);
    }

    /// Resolves once a held call has been recorded.
    pub async fn wait_until_called(&self) {
        self.entered.notified().await;
    }

    /// Lets every parked call continue; later calls are no longer held.
    pub fn release_calls(&self) {
        self.holding.store(false, Ordering::SeqCst);
        self.released.notify_waiters();
    }

    /// Calls currently parked by `hold_calls`.
    pub fn held_calls(&self) -> usize {
        self.held.load(Ordering::SeqCst)
    }

    pub fn insert_record(&self, snapshot: RemoteSnapshot) {
        self.state
            .lock()
            .records
            .insert(snapshot.remote_id.clone(), snapshot);
    }

    pub fn record(&self, remote_id: &RemoteId) -> Option<RemoteSnapshot> {
        self.state.lock().records.get(remote_id).cloned()
    }

    pub fn record_count(&self) -> usize {
        self.state.lock().records.len()
    }

    pub fn calls(&self) -> Vec<RemoteCall> {
        self.state.lock().calls.clone()
    }

    pub fn call_count(&self, kind: CallKind) -> usize {
        self.state
            .lock()
            .calls
            .iter()
            .filter(|call| call.kind == kind)
            .count()
    }

    pub fn total_calls(&self) -> usize {
        self.state.lock().calls.len()
    }

    /// Records the call, applies latency and the gate, then yields the next
    /// scripted failure for `kind`, if any.
    async fn enter(
        &self,
        kind: CallKind,
        remote_id: Option<&RemoteId>,
        title: Option<&str>
    ) -> Result<(), RemoteError> {
        let latency = {
            let mut state = self.state.lock();
            state.calls.push(RemoteCall {
                kind,
                remote_id: remote_id.cloned(),
                title: title.map(str::to_string)
            });
            state.latency
        };

        if !latency.is_zero() {
            tokio::time::sleep(latency).await;
        }
        if self.holding.load(Ordering::SeqCst) {
            let released = self.released.notified();
            tokio::pin!(released);
            released.as_mut().enable();
            self.held.fetch_add(1, Ordering::SeqCst);
            self.entered.notify_one();
            if self.holding.load(Ordering::SeqCst) {
                released.await;
            }
            self.held.fetch_sub(1, Ordering::SeqCst);
        }

        let mut state = self.state.lock();
        match state.failures.get_mut(&kind).and_then(VecDeque::pop_front) {
            Some(error) => Err(error),
            None => Ok(())
        }
    }
}

fn not_found(remote_id: &RemoteId) -> RemoteError {
    RemoteError::NotFound {
        remote_id: remote_id.to_string()
    }
}

fn apply_snapshot(record: &mut RemoteSnapshot, snapshot: &ContentSnapshot) {
    record.title.clone_from(&snapshot.title);
    record.content_type = snapshot.content_type;
    record.body.clone_from(&snapshot.body);
    record.visibility = snapshot.visibility;
    record.updated_at = snapshot.updated_at;
}

#[async_trait]
impl RemoteContentService for ScriptedRemote {
    async fn create(
        &self,
        _token: &BearerToken,
        snapshot: &ContentSnapshot
    ) -> Result<RemoteId, RemoteError> {
        self.enter(CallKind::Create, None, Some(snapshot.title.as_str()))
            .await?;

        let mut state = self.state.lock();
        state.next_id += 1;
        let remote_id = RemoteId::new(format!("r-{}", state.next_id));
        state.records.insert(
            remote_id.clone(),
            RemoteSnapshot {
                remote_id: remote_id.clone(),
                title: snapshot.title.clone(),
                content_type: snapshot.content_type,
                body: snapshot.body.clone(),
                visibility: snapshot.visibility,
                creator: snapshot.creator.clone(),
                forked_from: snapshot.forked_from.clone(),
                original_creator: snapshot.original_creator.clone(),
                fork_count: 0,
                updated_at: snapshot.updated_at
            }
        );
        Ok(remote_id)
    }

    async fn update(
        &self,
        _token: &BearerToken,
        remote_id: &RemoteId,
        snapshot: &ContentSnapshot
    ) -> Result<(), RemoteError> {
        self.enter(CallKind::Update, Some(remote_id), Some(snapshot.title.as_str()))
            .await?;

        let mut state = self.state.lock();
        let record = state
            .records
            .get_mut(remote_id)
            .ok_or_else(|| not_found(remote_id))?;
        apply_snapshot(record, snapshot);
        Ok(())
    }

    async fn delete(&self, _token: &BearerToken, remote_id: &RemoteId) -> Result<(), RemoteError> {
        self.enter(CallKind::Delete, Some(remote_id), None).await?;

        match self.state.lock().records.remove(remote_id) {
            Some(_) => Ok(()),
            None => Err(not_found(remote_id))
        }
    }

    async fn increment_fork_count(
        &self,
        _token: &BearerToken,
        remote_id: &RemoteId
    ) -> Result<(), RemoteError> {
        self.enter(CallKind::IncrementForkCount, Some(remote_id), None)
            .await?;

        let mut state = self.state.lock();
        let record = state
            .records
            .get_mut(remote_id)
            .ok_or_else(|| not_found(remote_id))?;
        record.fork_count += 1;
        Ok(())
    }

    async fn fetch(
        &self,
        _token: Option<&BearerToken>,
        remote_id: &RemoteId
    ) -> Result<RemoteSnapshot, RemoteError> {
        self.enter(CallKind::Fetch, Some(remote_id), None).await?;

        self.record(remote_id).ok_or_else(|| not_found(remote_id))
    }
}
