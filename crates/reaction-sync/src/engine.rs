//! Reconciliation engine.
//!
//! Orchestrates optimistic local mutation against the in-memory store,
//! authoritative overwrite from the gateway, rollback on remote failure,
//! and merge of asynchronously delivered change events. The engine owns
//! the store; UI layers read through the accessors and never mutate.

use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use tokio::time::timeout;
use tracing::{debug, warn};

use crate::error::{ReactionError, Result};
use crate::events::{ChangeEvent, ChangeOp};
use crate::gateway::ReactionGateway;
use crate::store::{ReactionEntry, ReactionState, ReactionStore, StatePatch};
use crate::validate::{explain_invalid, is_valid_subject_id};

/// Engine tuning knobs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReactionEngineConfig {
    /// Deadline applied to every remote call. A call that outlives it is
    /// treated as a remote failure so the rollback path cannot stall on a
    /// hung connection.
    pub call_timeout: Duration,
}

impl Default for ReactionEngineConfig {
    fn default() -> Self {
        Self {
            call_timeout: Duration::from_secs(4),
        }
    }
}

/// Reconciled result of a toggle. Failure paths are reported through
/// [`ReactionError`] instead of a success flag.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ToggleOutcome {
    pub liked_by_me: bool,
    pub count: u64,
}

struct FetchedSubject {
    count: u64,
    liked_by_me: bool,
    entries: Vec<ReactionEntry>,
}

/// The reconciliation engine. Cheap to clone; clones share the store and
/// the current actor identity.
#[derive(Clone)]
pub struct ReactionEngine {
    store: Arc<Mutex<ReactionStore>>,
    gateway: Arc<dyn ReactionGateway>,
    actor: Arc<Mutex<Option<String>>>,
    config: ReactionEngineConfig,
}

impl ReactionEngine {
    pub fn new(gateway: Arc<dyn ReactionGateway>, config: ReactionEngineConfig) -> Self {
        Self {
            store: Arc::new(Mutex::new(ReactionStore::default())),
            gateway,
            actor: Arc::new(Mutex::new(None)),
            config,
        }
    }

    #[must_use]
    pub fn with_actor(self, actor_id: &str) -> Self {
        self.set_actor(Some(actor_id.to_string()));
        self
    }

    /// Sets or clears the authenticated actor identity used by mutating
    /// operations and the self-status reads.
    pub fn set_actor(&self, actor_id: Option<String>) {
        let actor_id = actor_id
            .map(|value| value.trim().to_string())
            .filter(|value| !value.is_empty());
        *lock_recovering(&self.actor) = actor_id;
    }

    #[must_use]
    pub fn liked_by_me(&self, subject_id: &str) -> bool {
        self.store_lock().liked_by_me(subject_id)
    }

    #[must_use]
    pub fn count(&self, subject_id: &str) -> u64 {
        self.store_lock().count(subject_id)
    }

    #[must_use]
    pub fn is_open(&self, subject_id: &str) -> bool {
        self.store_lock().is_open(subject_id)
    }

    #[must_use]
    pub fn snapshot(&self, subject_id: &str) -> ReactionState {
        self.store_lock().snapshot(subject_id)
    }

    #[must_use]
    pub fn open_subjects(&self) -> Vec<String> {
        self.store_lock().open_subjects()
    }

    /// Toggles the current actor's reaction on a subject.
    ///
    /// The local flip is applied before the remote call resolves; the
    /// authoritative response then overwrites it, even when the two
    /// disagree. Any remote failure rolls the subject back to its
    /// pre-toggle state and records the error on the subject.
    pub async fn toggle(&self, subject_id: &str) -> Result<ToggleOutcome> {
        if !is_valid_subject_id(subject_id) {
            warn!("toggle refused: {}", explain_invalid(subject_id));
            return Err(ReactionError::InvalidSubjectId(subject_id.to_string()));
        }
        let Some(actor_id) = self.actor() else {
            return Err(ReactionError::Unauthenticated);
        };

        let (prior_liked, prior_count) = {
            let store = self.store_lock();
            (store.liked_by_me(subject_id), store.count(subject_id))
        };
        let optimistic_count = if prior_liked {
            prior_count.saturating_sub(1)
        } else {
            prior_count.saturating_add(1)
        };
        self.patch(
            subject_id,
            StatePatch {
                liked_by_me: Some(!prior_liked),
                count: Some(optimistic_count),
                ..StatePatch::default()
            },
        );

        let response = match timeout(
            self.config.call_timeout,
            self.gateway.toggle_reaction(subject_id, &actor_id),
        )
        .await
        {
            Ok(Ok(response)) if response.success => response,
            Ok(Ok(_)) => {
                let error = ReactionError::Remote("toggle rejected by backend".to_string());
                self.rollback(subject_id, prior_liked, prior_count, &error);
                return Err(error);
            }
            Ok(Err(error)) => {
                self.rollback(subject_id, prior_liked, prior_count, &error);
                return Err(error);
            }
            Err(_) => {
                let error = ReactionError::Timeout(self.config.call_timeout);
                self.rollback(subject_id, prior_liked, prior_count, &error);
                return Err(error);
            }
        };

        self.patch(
            subject_id,
            StatePatch {
                liked_by_me: Some(response.liked_by_me),
                count: Some(response.count),
                error: Some(None),
                ..StatePatch::default()
            },
        );
        Ok(ToggleOutcome {
            liked_by_me: response.liked_by_me,
            count: response.count,
        })
    }

    /// Loads the subject's count, self-status, and detail list. A failed
    /// load resets the subject to an empty-safe state instead of keeping
    /// stale rows.
    pub async fn load_details(&self, subject_id: &str) -> Result<()> {
        if !is_valid_subject_id(subject_id) {
            debug!("load refused: {}", explain_invalid(subject_id));
            return Err(ReactionError::InvalidSubjectId(subject_id.to_string()));
        }
        self.patch(
            subject_id,
            StatePatch {
                is_loading: Some(true),
                error: Some(None),
                ..StatePatch::default()
            },
        );

        match self.fetch_subject(subject_id).await {
            Ok(fetched) => {
                self.patch(
                    subject_id,
                    StatePatch {
                        entries: Some(fetched.entries),
                        count: Some(fetched.count),
                        liked_by_me: Some(fetched.liked_by_me),
                        is_loading: Some(false),
                        error: Some(None),
                        ..StatePatch::default()
                    },
                );
                Ok(())
            }
            Err(error) => {
                self.patch(
                    subject_id,
                    StatePatch {
                        entries: Some(Vec::new()),
                        count: Some(0),
                        liked_by_me: Some(false),
                        is_loading: Some(false),
                        error: Some(Some(error.to_string())),
                        ..StatePatch::default()
                    },
                );
                Err(error)
            }
        }
    }

    /// Opens the detail panel. The open flag flips immediately; the detail
    /// list is fetched only when nothing is cached for the subject yet.
    pub async fn open_details(&self, subject_id: &str) -> Result<()> {
        if !is_valid_subject_id(subject_id) {
            return Err(ReactionError::InvalidSubjectId(subject_id.to_string()));
        }
        let has_cached_entries = {
            let mut store = self.store_lock();
            let cached = !store.snapshot(subject_id).entries.is_empty();
            store.patch(
                subject_id,
                StatePatch {
                    is_open: Some(true),
                    ..StatePatch::default()
                },
            );
            cached
        };
        if has_cached_entries {
            return Ok(());
        }
        self.load_details(subject_id).await
    }

    /// Closes the detail panel. No remote traffic.
    pub fn close_details(&self, subject_id: &str) -> Result<()> {
        if !is_valid_subject_id(subject_id) {
            return Err(ReactionError::InvalidSubjectId(subject_id.to_string()));
        }
        self.patch(
            subject_id,
            StatePatch {
                is_open: Some(false),
                ..StatePatch::default()
            },
        );
        Ok(())
    }

    /// Merges one pushed row change into the subject's entry list. Never
    /// fails user-visibly; unusable events are logged and dropped. Inserts
    /// and deletes trigger an aggregate refresh because the change row
    /// does not carry the total count.
    pub async fn merge_change(&self, event: ChangeEvent) {
        if !is_valid_subject_id(&event.subject_id) {
            warn!(
                "dropping {} event: {}",
                event.op.as_str(),
                explain_invalid(&event.subject_id)
            );
            return;
        }

        let refresh_aggregates = {
            let mut store = self.store_lock();
            let mut entries = store.snapshot(&event.subject_id).entries;
            let applied = match event.op {
                ChangeOp::Insert => match event.entry {
                    Some(entry) => {
                        if entries.iter().any(|existing| existing.id == entry.id) {
                            false
                        } else {
                            entries.insert(0, entry);
                            true
                        }
                    }
                    None => {
                        warn!("dropping insert event without a row for {}", event.subject_id);
                        false
                    }
                },
                ChangeOp::Update => match event.entry {
                    Some(entry) => {
                        match entries.iter_mut().find(|existing| existing.id == entry.id) {
                            Some(existing) => {
                                *existing = entry;
                                true
                            }
                            None => false,
                        }
                    }
                    None => {
                        warn!("dropping update event without a row for {}", event.subject_id);
                        false
                    }
                },
                ChangeOp::Delete => {
                    let before = entries.len();
                    entries.retain(|existing| existing.id != event.entry_id);
                    entries.len() != before
                }
            };
            if applied {
                sort_by_recency(&mut entries);
                store.patch(
                    &event.subject_id,
                    StatePatch {
                        entries: Some(entries),
                        ..StatePatch::default()
                    },
                );
            }
            applied && event.op != ChangeOp::Update
        };

        if refresh_aggregates {
            self.refresh_aggregates(&event.subject_id).await;
        }
    }

    /// Re-fetches the subject and patches the store only when something
    /// actually changed. Returns whether a patch was applied. This is the
    /// polling fallback's entry point; skipping no-op patches keeps an
    /// idle panel from churning.
    pub async fn poll_refresh(&self, subject_id: &str) -> Result<bool> {
        if !is_valid_subject_id(subject_id) {
            return Err(ReactionError::InvalidSubjectId(subject_id.to_string()));
        }
        let fetched = self.fetch_subject(subject_id).await?;
        let current = self.snapshot(subject_id);
        if current.count == fetched.count
            && current.liked_by_me == fetched.liked_by_me
            && entry_ids(&current.entries) == entry_ids(&fetched.entries)
        {
            return Ok(false);
        }
        self.patch(
            subject_id,
            StatePatch {
                entries: Some(fetched.entries),
                count: Some(fetched.count),
                liked_by_me: Some(fetched.liked_by_me),
                error: Some(None),
                ..StatePatch::default()
            },
        );
        Ok(true)
    }

    async fn fetch_subject(&self, subject_id: &str) -> Result<FetchedSubject> {
        let actor = self.actor();
        let fetch = async {
            let (count, liked_by_me, entries) = tokio::join!(
                self.gateway.reaction_count(subject_id),
                async {
                    match actor.as_deref() {
                        Some(actor_id) => {
                            self.gateway.my_reaction_status(subject_id, actor_id).await
                        }
                        None => Ok(false),
                    }
                },
                self.gateway.list_reactions(subject_id),
            );
            let mut entries = entries?;
            sort_by_recency(&mut entries);
            Ok(FetchedSubject {
                count: count?,
                liked_by_me: liked_by_me?,
                entries,
            })
        };
        timeout(self.config.call_timeout, fetch)
            .await
            .map_err(|_| ReactionError::Timeout(self.config.call_timeout))?
    }

    async fn refresh_aggregates(&self, subject_id: &str) {
        let actor = self.actor();
        let refresh = async {
            let (count, liked_by_me) = tokio::join!(self.gateway.reaction_count(subject_id), async {
                match actor.as_deref() {
                    Some(actor_id) => self.gateway.my_reaction_status(subject_id, actor_id).await,
                    None => Ok(false),
                }
            });
            Ok::<_, ReactionError>((count?, liked_by_me?))
        };
        match timeout(self.config.call_timeout, refresh).await {
            Ok(Ok((count, liked_by_me))) => {
                self.patch(
                    subject_id,
                    StatePatch {
                        count: Some(count),
                        liked_by_me: Some(liked_by_me),
                        ..StatePatch::default()
                    },
                );
            }
            Ok(Err(error)) => {
                debug!("aggregate refresh failed for {subject_id}: {error}");
            }
            Err(_) => {
                debug!("aggregate refresh timed out for {subject_id}");
            }
        }
    }

    fn rollback(&self, subject_id: &str, liked_by_me: bool, count: u64, error: &ReactionError) {
        self.patch(
            subject_id,
            StatePatch {
                liked_by_me: Some(liked_by_me),
                count: Some(count),
                error: Some(Some(error.to_string())),
                ..StatePatch::default()
            },
        );
    }

    fn patch(&self, subject_id: &str, patch: StatePatch) {
        self.store_lock().patch(subject_id, patch);
    }

    fn actor(&self) -> Option<String> {
        lock_recovering(&self.actor).clone()
    }

    fn store_lock(&self) -> MutexGuard<'_, ReactionStore> {
        lock_recovering(&self.store)
    }
}

fn lock_recovering<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

fn sort_by_recency(entries: &mut [ReactionEntry]) {
    entries.sort_by(|left, right| right.created_at.cmp(&left.created_at));
}

fn entry_ids(entries: &[ReactionEntry]) -> Vec<&str> {
    entries.iter().map(|entry| entry.id.as_str()).collect()
}

#[cfg(test)]
mod tests {
    use super::{ReactionEngine, ReactionEngineConfig};
    use crate::error::{ReactionError, Result};
    use crate::events::{ChangeEvent, ChangeOp};
    use crate::gateway::{ReactionGateway, ToggleResponse};
    use crate::store::ReactionEntry;
    use async_trait::async_trait;
    use chrono::{TimeZone, Utc};
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    const SUBJECT: &str = "11111111-1111-1111-1111-111111111111";
    const ACTOR: &str = "u1";

    #[derive(Default)]
    struct Script {
        toggle: Option<ToggleResponse>,
        fail_toggle: bool,
        hang_toggle: bool,
        count: u64,
        liked: bool,
        entries: Vec<ReactionEntry>,
        fail_reads: bool,
    }

    struct MockGateway {
        script: std::sync::Mutex<Script>,
        gate: tokio::sync::Semaphore,
        toggle_calls: AtomicUsize,
        count_calls: AtomicUsize,
        status_calls: AtomicUsize,
        list_calls: AtomicUsize,
    }

    impl MockGateway {
        fn new(script: Script) -> Arc<Self> {
            Self::build(script, tokio::sync::Semaphore::MAX_PERMITS)
        }

        /// A gateway whose toggle call blocks until [`release_toggle`] is
        /// called, so tests can observe mid-flight optimistic state.
        fn gated(script: Script) -> Arc<Self> {
            Self::build(script, 0)
        }

        fn build(script: Script, permits: usize) -> Arc<Self> {
            Arc::new(Self {
                script: std::sync::Mutex::new(script),
                gate: tokio::sync::Semaphore::new(permits),
                toggle_calls: AtomicUsize::new(0),
                count_calls: AtomicUsize::new(0),
                status_calls: AtomicUsize::new(0),
                list_calls: AtomicUsize::new(0),
            })
        }

        fn release_toggle(&self) {
            self.gate.add_permits(1);
        }

        fn total_calls(&self) -> usize {
            self.toggle_calls.load(Ordering::SeqCst)
                + self.count_calls.load(Ordering::SeqCst)
                + self.status_calls.load(Ordering::SeqCst)
                + self.list_calls.load(Ordering::SeqCst)
        }

        fn set_reads(&self, count: u64, liked: bool, entries: Vec<ReactionEntry>) {
            let mut script = self.script.lock().expect("script lock");
            script.count = count;
            script.liked = liked;
            script.entries = entries;
        }
    }

    #[async_trait]
    impl ReactionGateway for MockGateway {
        async fn toggle_reaction(&self, _subject_id: &str, _actor_id: &str) -> Result<ToggleResponse> {
            self.toggle_calls.fetch_add(1, Ordering::SeqCst);
            let _permit = self.gate.acquire().await.expect("gate");
            let (hang, fail, response) = {
                let script = self.script.lock().expect("script lock");
                (script.hang_toggle, script.fail_toggle, script.toggle)
            };
            if hang {
                std::future::pending::<()>().await;
            }
            if fail {
                return Err(ReactionError::Remote("connection reset".to_string()));
            }
            response.ok_or_else(|| ReactionError::Remote("no scripted response".to_string()))
        }

        async fn reaction_count(&self, _subject_id: &str) -> Result<u64> {
            self.count_calls.fetch_add(1, Ordering::SeqCst);
            let script = self.script.lock().expect("script lock");
            if script.fail_reads {
                return Err(ReactionError::Remote("count unavailable".to_string()));
            }
            Ok(script.count)
        }

        async fn my_reaction_status(&self, _subject_id: &str, _actor_id: &str) -> Result<bool> {
            self.status_calls.fetch_add(1, Ordering::SeqCst);
            let script = self.script.lock().expect("script lock");
            if script.fail_reads {
                return Err(ReactionError::Remote("status unavailable".to_string()));
            }
            Ok(script.liked)
        }

        async fn list_reactions(&self, _subject_id: &str) -> Result<Vec<ReactionEntry>> {
            self.list_calls.fetch_add(1, Ordering::SeqCst);
            let script = self.script.lock().expect("script lock");
            if script.fail_reads {
                return Err(ReactionError::Remote("list unavailable".to_string()));
            }
            Ok(script.entries.clone())
        }
    }

    fn engine(gateway: &Arc<MockGateway>) -> ReactionEngine {
        ReactionEngine::new(
            Arc::clone(gateway) as Arc<dyn ReactionGateway>,
            ReactionEngineConfig::default(),
        )
        .with_actor(ACTOR)
    }

    fn entry(id: &str, seconds: i64) -> ReactionEntry {
        ReactionEntry {
            id: id.to_string(),
            subject_id: SUBJECT.to_string(),
            actor_id: format!("actor-{id}"),
            created_at: Utc.timestamp_opt(seconds, 0).single().expect("ts"),
            actor_display_name: "Sam".to_string(),
        }
    }

    /// Seeds `{liked_by_me: false, count: 3}` through an authoritative
    /// toggle pair so the store reaches the scenario's starting state
    /// through its normal mutation path.
    async fn seed_unliked_count(engine: &ReactionEngine, gateway: &Arc<MockGateway>, count: u64) {
        {
            let mut script = gateway.script.lock().expect("script lock");
            script.toggle = Some(ToggleResponse {
                success: true,
                liked_by_me: false,
                count,
            });
        }
        engine.toggle(SUBJECT).await.expect("seed toggle");
        assert_eq!(engine.count(SUBJECT), count);
        assert!(!engine.liked_by_me(SUBJECT));
    }

    #[tokio::test]
    async fn optimistic_flip_is_visible_before_the_remote_resolves() {
        let gateway = MockGateway::gated(Script {
            toggle: Some(ToggleResponse {
                success: true,
                liked_by_me: true,
                count: 1,
            }),
            ..Script::default()
        });
        let engine = engine(&gateway);

        let in_flight = tokio::spawn({
            let engine = engine.clone();
            async move { engine.toggle(SUBJECT).await }
        });
        // Give the spawned toggle a chance to apply its optimistic patch
        // and park on the gated remote call.
        for _ in 0..20 {
            tokio::task::yield_now().await;
        }
        assert!(engine.liked_by_me(SUBJECT));
        assert_eq!(engine.count(SUBJECT), 1);

        gateway.release_toggle();
        let outcome = in_flight.await.expect("join").expect("toggle");
        assert!(outcome.liked_by_me);
        assert_eq!(outcome.count, 1);
    }

    #[tokio::test]
    async fn authoritative_response_overrides_the_optimistic_guess() {
        let gateway = MockGateway::new(Script::default());
        let engine = engine(&gateway);
        seed_unliked_count(&engine, &gateway, 3).await;

        // Another client liked concurrently, so the backend reports 5
        // where the optimistic guess was 4.
        {
            let mut script = gateway.script.lock().expect("script lock");
            script.toggle = Some(ToggleResponse {
                success: true,
                liked_by_me: true,
                count: 5,
            });
        }
        let outcome = engine.toggle(SUBJECT).await.expect("toggle");
        assert!(outcome.liked_by_me);
        assert_eq!(outcome.count, 5);
        assert!(engine.liked_by_me(SUBJECT));
        assert_eq!(engine.count(SUBJECT), 5);
        assert!(engine.snapshot(SUBJECT).error.is_none());
    }

    #[tokio::test]
    async fn failed_toggle_rolls_back_and_records_the_error() {
        let gateway = MockGateway::new(Script::default());
        let engine = engine(&gateway);
        seed_unliked_count(&engine, &gateway, 3).await;

        gateway.script.lock().expect("script lock").fail_toggle = true;
        let result = engine.toggle(SUBJECT).await;
        assert!(matches!(result, Err(ReactionError::Remote(_))));
        assert!(!engine.liked_by_me(SUBJECT));
        assert_eq!(engine.count(SUBJECT), 3);
        let error = engine.snapshot(SUBJECT).error.expect("error populated");
        assert!(error.contains("connection reset"));
    }

    #[tokio::test]
    async fn rejected_toggle_response_is_a_remote_failure() {
        let gateway = MockGateway::new(Script {
            toggle: Some(ToggleResponse {
                success: false,
                liked_by_me: false,
                count: 0,
            }),
            ..Script::default()
        });
        let engine = engine(&gateway);

        let result = engine.toggle(SUBJECT).await;
        assert!(matches!(result, Err(ReactionError::Remote(_))));
        assert!(!engine.liked_by_me(SUBJECT));
        assert_eq!(engine.count(SUBJECT), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn hung_toggle_times_out_and_rolls_back() {
        let gateway = MockGateway::new(Script {
            hang_toggle: true,
            ..Script::default()
        });
        let engine = ReactionEngine::new(
            Arc::clone(&gateway) as Arc<dyn ReactionGateway>,
            ReactionEngineConfig {
                call_timeout: Duration::from_millis(100),
            },
        )
        .with_actor(ACTOR);

        let result = engine.toggle(SUBJECT).await;
        assert!(matches!(result, Err(ReactionError::Timeout(_))));
        assert!(!engine.liked_by_me(SUBJECT));
        assert_eq!(engine.count(SUBJECT), 0);
    }

    #[tokio::test]
    async fn invalid_subject_ids_never_reach_the_gateway() {
        let gateway = MockGateway::new(Script::default());
        let engine = engine(&gateway);

        for subject_id in ["not-a-uuid", "", "11111111-1111-1111-1111-11111111111z"] {
            assert!(matches!(
                engine.toggle(subject_id).await,
                Err(ReactionError::InvalidSubjectId(_))
            ));
            assert!(matches!(
                engine.load_details(subject_id).await,
                Err(ReactionError::InvalidSubjectId(_))
            ));
            assert!(matches!(
                engine.open_details(subject_id).await,
                Err(ReactionError::InvalidSubjectId(_))
            ));
            let snapshot = engine.snapshot(subject_id);
            assert_eq!(snapshot, crate::store::ReactionState::default());
        }
        assert_eq!(gateway.total_calls(), 0);
    }

    #[tokio::test]
    async fn toggle_without_an_actor_fails_without_side_effects() {
        let gateway = MockGateway::new(Script::default());
        let engine = ReactionEngine::new(
            Arc::clone(&gateway) as Arc<dyn ReactionGateway>,
            ReactionEngineConfig::default(),
        );

        let result = engine.toggle(SUBJECT).await;
        assert!(matches!(result, Err(ReactionError::Unauthenticated)));
        assert_eq!(gateway.total_calls(), 0);
        assert!(!engine.liked_by_me(SUBJECT));
        assert_eq!(engine.count(SUBJECT), 0);
    }

    #[tokio::test]
    async fn load_details_patches_the_full_subject_view() {
        let gateway = MockGateway::new(Script {
            count: 2,
            liked: true,
            entries: vec![entry("older", 100), entry("newer", 200)],
            ..Script::default()
        });
        let engine = engine(&gateway);

        engine.load_details(SUBJECT).await.expect("load");
        let state = engine.snapshot(SUBJECT);
        assert_eq!(state.count, 2);
        assert!(state.liked_by_me);
        assert!(!state.is_loading);
        assert!(state.error.is_none());
        let ids = state
            .entries
            .iter()
            .map(|entry| entry.id.as_str())
            .collect::<Vec<_>>();
        assert_eq!(ids, vec!["newer", "older"]);
    }

    #[tokio::test]
    async fn failed_load_resets_to_an_empty_safe_state() {
        let gateway = MockGateway::new(Script {
            count: 2,
            liked: true,
            entries: vec![entry("e1", 100)],
            ..Script::default()
        });
        let engine = engine(&gateway);
        engine.load_details(SUBJECT).await.expect("first load");

        gateway.script.lock().expect("script lock").fail_reads = true;
        let result = engine.load_details(SUBJECT).await;
        assert!(result.is_err());

        let state = engine.snapshot(SUBJECT);
        assert!(state.entries.is_empty());
        assert_eq!(state.count, 0);
        assert!(!state.liked_by_me);
        assert!(!state.is_loading);
        assert!(state.error.is_some());
    }

    #[tokio::test]
    async fn double_open_fetches_details_at_most_once() {
        let gateway = MockGateway::new(Script {
            entries: vec![entry("e1", 100)],
            count: 1,
            ..Script::default()
        });
        let engine = engine(&gateway);

        engine.open_details(SUBJECT).await.expect("first open");
        engine.open_details(SUBJECT).await.expect("second open");
        assert!(engine.is_open(SUBJECT));
        assert_eq!(gateway.list_calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn close_details_flips_the_flag_without_remote_traffic() {
        let gateway = MockGateway::new(Script {
            entries: vec![entry("e1", 100)],
            count: 1,
            ..Script::default()
        });
        let engine = engine(&gateway);
        engine.open_details(SUBJECT).await.expect("open");
        let calls_after_open = gateway.total_calls();

        engine.close_details(SUBJECT).expect("close");
        assert!(!engine.is_open(SUBJECT));
        assert_eq!(gateway.total_calls(), calls_after_open);
        assert_eq!(engine.open_subjects(), Vec::<String>::new());
    }

    #[tokio::test]
    async fn insert_events_dedupe_by_entry_id() {
        let gateway = MockGateway::new(Script {
            count: 1,
            ..Script::default()
        });
        let engine = engine(&gateway);

        let event = ChangeEvent {
            op: ChangeOp::Insert,
            subject_id: SUBJECT.to_string(),
            entry_id: "e1".to_string(),
            entry: Some(entry("e1", 100)),
        };
        engine.merge_change(event.clone()).await;
        engine.merge_change(event).await;

        let state = engine.snapshot(SUBJECT);
        assert_eq!(state.entries.len(), 1);
        // The duplicate insert applied nothing, so only the first event
        // refreshed the aggregates.
        assert_eq!(gateway.count_calls.load(Ordering::SeqCst), 1);
        assert_eq!(state.count, 1);
    }

    #[tokio::test]
    async fn insert_events_keep_entries_sorted_by_recency() {
        let gateway = MockGateway::new(Script::default());
        let engine = engine(&gateway);

        for (id, seconds) in [("older", 100), ("newest", 300), ("middle", 200)] {
            engine
                .merge_change(ChangeEvent {
                    op: ChangeOp::Insert,
                    subject_id: SUBJECT.to_string(),
                    entry_id: id.to_string(),
                    entry: Some(entry(id, seconds)),
                })
                .await;
        }
        let ids = engine
            .snapshot(SUBJECT)
            .entries
            .iter()
            .map(|entry| entry.id.clone())
            .collect::<Vec<_>>();
        assert_eq!(ids, vec!["newest", "middle", "older"]);
    }

    #[tokio::test]
    async fn update_events_replace_in_place_and_skip_aggregate_refresh() {
        let gateway = MockGateway::new(Script::default());
        let engine = engine(&gateway);
        engine
            .merge_change(ChangeEvent {
                op: ChangeOp::Insert,
                subject_id: SUBJECT.to_string(),
                entry_id: "e1".to_string(),
                entry: Some(entry("e1", 100)),
            })
            .await;
        let refreshes_after_insert = gateway.count_calls.load(Ordering::SeqCst);

        let mut updated = entry("e1", 100);
        updated.actor_display_name = "Robin".to_string();
        engine
            .merge_change(ChangeEvent {
                op: ChangeOp::Update,
                subject_id: SUBJECT.to_string(),
                entry_id: "e1".to_string(),
                entry: Some(updated),
            })
            .await;

        let state = engine.snapshot(SUBJECT);
        assert_eq!(state.entries.len(), 1);
        assert_eq!(state.entries[0].actor_display_name, "Robin");
        assert_eq!(
            gateway.count_calls.load(Ordering::SeqCst),
            refreshes_after_insert
        );
    }

    #[tokio::test]
    async fn delete_events_remove_the_row_and_refresh_aggregates() {
        let gateway = MockGateway::new(Script::default());
        let engine = engine(&gateway);
        engine
            .merge_change(ChangeEvent {
                op: ChangeOp::Insert,
                subject_id: SUBJECT.to_string(),
                entry_id: "e1".to_string(),
                entry: Some(entry("e1", 100)),
            })
            .await;

        gateway.set_reads(0, false, Vec::new());
        engine
            .merge_change(ChangeEvent {
                op: ChangeOp::Delete,
                subject_id: SUBJECT.to_string(),
                entry_id: "e1".to_string(),
                entry: None,
            })
            .await;

        let state = engine.snapshot(SUBJECT);
        assert!(state.entries.is_empty());
        assert_eq!(state.count, 0);
    }

    #[tokio::test]
    async fn malformed_events_are_dropped_silently() {
        let gateway = MockGateway::new(Script::default());
        let engine = engine(&gateway);

        engine
            .merge_change(ChangeEvent {
                op: ChangeOp::Insert,
                subject_id: "not-a-uuid".to_string(),
                entry_id: "e1".to_string(),
                entry: Some(entry("e1", 100)),
            })
            .await;
        engine
            .merge_change(ChangeEvent {
                op: ChangeOp::Insert,
                subject_id: SUBJECT.to_string(),
                entry_id: "e2".to_string(),
                entry: None,
            })
            .await;

        assert_eq!(gateway.total_calls(), 0);
        assert!(engine.snapshot(SUBJECT).entries.is_empty());
    }

    #[tokio::test]
    async fn poll_refresh_skips_patching_when_nothing_changed() {
        let gateway = MockGateway::new(Script {
            count: 1,
            liked: false,
            entries: vec![entry("e1", 100)],
            ..Script::default()
        });
        let engine = engine(&gateway);
        engine.load_details(SUBJECT).await.expect("load");

        assert!(!engine.poll_refresh(SUBJECT).await.expect("poll"));

        gateway.set_reads(2, true, vec![entry("e1", 100), entry("e2", 200)]);
        assert!(engine.poll_refresh(SUBJECT).await.expect("poll"));
        let state = engine.snapshot(SUBJECT);
        assert_eq!(state.count, 2);
        assert!(state.liked_by_me);
        assert_eq!(state.entries.len(), 2);
    }
}
