//! Progress event overlay.
//!
//! Surfaces the latest progress report of a project's long-running job.
//! State machine: `Idle -> Subscribed -> Terminal`. Reaching 100% emits one
//! completion signal; later events are ignored until the project is set
//! again, which starts a new run even for the same project.

use crate::context::SyncContext;
use crate::subscription::{RescopePolicy, ScopeTicket};
use huddle_core::change::{ChangeEvent, ChangeFilter, TopicKey, TopicKind};
use huddle_core::error::{HuddleError, Result};
use huddle_core::progress::{ProgressCompletion, ProgressEvent};
use std::sync::Arc;
use tokio::sync::{Mutex, mpsc, watch};
use tokio::task::JoinHandle;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OverlayState {
    Idle,
    Subscribed { project_id: String },
    Terminal { project_id: String },
}

impl OverlayState {
    pub fn project_id(&self) -> Option<&str> {
        match self {
            Self::Idle => None,
            Self::Subscribed { project_id } | Self::Terminal { project_id } => Some(project_id),
        }
    }
}

/// What the tracker did with an inbound event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TrackOutcome {
    Updated,
    Completed(ProgressCompletion),
    Ignored,
}

/// Synchronous core of the overlay.
#[derive(Debug)]
pub struct ProgressTracker {
    state: OverlayState,
    generation: u64,
    latest: Option<ProgressEvent>,
}

impl Default for ProgressTracker {
    fn default() -> Self {
        Self {
            state: OverlayState::Idle,
            generation: 0,
            latest: None,
        }
    }
}

impl ProgressTracker {
    pub fn state(&self) -> &OverlayState {
        &self.state
    }

    pub fn latest(&self) -> Option<&ProgressEvent> {
        self.latest.as_ref()
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Rescopes to `project_id`, dropping the retained event. Returns the new
    /// generation.
    pub fn reset(&mut self, project_id: Option<&str>) -> u64 {
        self.generation += 1;
        self.latest = None;
        self.state = match project_id {
            Some(id) => OverlayState::Subscribed {
                project_id: id.to_string(),
            },
            None => OverlayState::Idle,
        };
        self.generation
    }

    /// Falls back to `Idle` when opening the subscription for `generation`
    /// failed.
    pub fn fail(&mut self, generation: u64) {
        if self.generation == generation {
            self.state = OverlayState::Idle;
        }
    }

    /// Applies an event delivered by the subscription opened under
    /// `generation`.
    pub fn apply(&mut self, generation: u64, event: ChangeEvent<ProgressEvent>) -> TrackOutcome {
        if generation != self.generation {
            return TrackOutcome::Ignored;
        }
        let ChangeEvent::Insert(event) = event else {
            return TrackOutcome::Ignored;
        };
        let OverlayState::Subscribed { project_id } = &self.state else {
            return TrackOutcome::Ignored;
        };
        if &event.project_id != project_id {
            return TrackOutcome::Ignored;
        }

        let project_id = project_id.clone();
        self.latest = Some(event.clone());
        if event.is_complete() {
            self.state = OverlayState::Terminal {
                project_id: project_id.clone(),
            };
            TrackOutcome::Completed(ProgressCompletion { project_id, event })
        } else {
            TrackOutcome::Updated
        }
    }
}

struct Shared {
    tracker: Mutex<ProgressTracker>,
    snapshot: watch::Sender<Option<ProgressEvent>>,
    completions: mpsc::UnboundedSender<ProgressCompletion>,
}

type Inbound = (u64, ChangeEvent<ProgressEvent>);

pub struct ProgressOverlay {
    ctx: SyncContext,
    shared: Arc<Shared>,
    completions: Mutex<Option<mpsc::UnboundedReceiver<ProgressCompletion>>>,
    inbound: mpsc::UnboundedSender<Inbound>,
    pump: JoinHandle<()>,
}

impl ProgressOverlay {
    /// Creates an idle overlay. Must be called within a tokio runtime.
    pub fn new(ctx: SyncContext) -> Self {
        let (snapshot, _) = watch::channel(None);
        let (completions_tx, completions_rx) = mpsc::unbounded_channel();
        let shared = Arc::new(Shared {
            tracker: Mutex::new(ProgressTracker::default()),
            snapshot,
            completions: completions_tx,
        });
        let (inbound, rx) = mpsc::unbounded_channel();
        let pump = tokio::spawn(Self::pump(shared.clone(), rx));

        Self {
            ctx,
            shared,
            completions: Mutex::new(Some(completions_rx)),
            inbound,
            pump,
        }
    }

    async fn pump(shared: Arc<Shared>, mut rx: mpsc::UnboundedReceiver<Inbound>) {
        while let Some((generation, event)) = rx.recv().await {
            let mut tracker = shared.tracker.lock().await;
            match tracker.apply(generation, event) {
                TrackOutcome::Updated => {
                    shared.snapshot.send_replace(tracker.latest().cloned());
                }
                TrackOutcome::Completed(completion) => {
                    shared.snapshot.send_replace(tracker.latest().cloned());
                    tracing::info!(
                        "[ProgressOverlay] Run completed for project {}",
                        completion.project_id
                    );
                    let _ = shared.completions.send(completion);
                }
                TrackOutcome::Ignored => {
                    tracing::trace!("[ProgressOverlay] Ignored event (generation {})", generation);
                }
            }
        }
    }

    /// Scopes the overlay to `project_id`, or to nothing.
    ///
    /// Any prior subscription is torn down first. Setting the same project
    /// again starts a fresh run.
    ///
    /// # Errors
    ///
    /// Returns access or subscription errors; the overlay is then `Idle`. A
    /// request superseded by a newer call returns `Ok(())`.
    pub async fn set_project_id(&self, project_id: Option<&str>) -> Result<()> {
        let (generation, ticket) = {
            let mut tracker = self.shared.tracker.lock().await;
            let generation = tracker.reset(project_id);
            let ticket = self.ctx.subscriptions.reserve(TopicKind::ProgressChanges);
            (generation, ticket)
        };
        self.shared.snapshot.send_replace(None);

        let Some(project_id) = project_id else {
            self.ctx.subscriptions.deactivate(ticket).await;
            tracing::info!("[ProgressOverlay] Idle");
            return Ok(());
        };

        match self.subscribe(project_id, generation, ticket).await {
            Ok(()) => Ok(()),
            Err(e) if e.is_stale() => Ok(()),
            Err(e) => {
                self.shared.tracker.lock().await.fail(generation);
                self.ctx.subscriptions.deactivate(ticket).await;
                tracing::warn!("[ProgressOverlay] Cannot track project {}: {}", project_id, e);
                Err(e)
            }
        }
    }

    async fn subscribe(&self, project_id: &str, generation: u64, ticket: ScopeTicket) -> Result<()> {
        let session = self.ctx.authenticated_session().await?;
        if !self
            .ctx
            .repository
            .is_project_member(project_id, &session.user_id)
            .await?
        {
            return Err(HuddleError::forbidden(project_id, session.user_id));
        }
        if !self.ctx.subscriptions.is_current(ticket) {
            return Err(HuddleError::stale(project_id));
        }

        let inbound = self.inbound.clone();
        self.ctx
            .subscriptions
            .activate(
                ticket,
                TopicKey::progress(project_id),
                ChangeFilter::progress_for(project_id),
                RescopePolicy::AlwaysReplace,
                move |event: ChangeEvent<ProgressEvent>| {
                    let _ = inbound.send((generation, event));
                },
            )
            .await?;
        tracing::info!("[ProgressOverlay] Subscribed to project {}", project_id);
        Ok(())
    }

    pub async fn state(&self) -> OverlayState {
        self.shared.tracker.lock().await.state().clone()
    }

    /// The most recent progress event of the current run.
    pub fn latest(&self) -> Option<ProgressEvent> {
        self.shared.snapshot.borrow().clone()
    }

    pub fn watch(&self) -> watch::Receiver<Option<ProgressEvent>> {
        self.shared.snapshot.subscribe()
    }

    /// Takes the completion stream. It has a single consumer: the first call
    /// returns it, later calls return `None`.
    pub async fn take_completions(&self) -> Option<mpsc::UnboundedReceiver<ProgressCompletion>> {
        self.completions.lock().await.take()
    }
}

impl Drop for ProgressOverlay {
    fn drop(&mut self) {
        self.pump.abort();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn event(project: &str, progress: u8) -> ChangeEvent<ProgressEvent> {
        ChangeEvent::Insert(ProgressEvent {
            id: format!("{project}-{progress}"),
            project_id: project.to_string(),
            step: format!("step at {progress}"),
            progress,
            created_at: Utc::now(),
        })
    }

    #[test]
    fn test_completes_once_on_reaching_100() {
        let mut tracker = ProgressTracker::default();
        let generation = tracker.reset(Some("p1"));

        assert_eq!(tracker.apply(generation, event("p1", 40)), TrackOutcome::Updated);
        assert!(matches!(
            tracker.apply(generation, event("p1", 100)),
            TrackOutcome::Completed(_)
        ));
        assert_eq!(tracker.apply(generation, event("p1", 100)), TrackOutcome::Ignored);
        assert_eq!(
            *tracker.state(),
            OverlayState::Terminal {
                project_id: "p1".to_string()
            }
        );
        assert_eq!(tracker.latest().map(|e| e.progress), Some(100));
    }

    #[test]
    fn test_reset_same_project_starts_new_run() {
        let mut tracker = ProgressTracker::default();
        let first = tracker.reset(Some("p1"));
        tracker.apply(first, event("p1", 100));

        let second = tracker.reset(Some("p1"));
        assert!(tracker.latest().is_none());
        assert_eq!(tracker.apply(first, event("p1", 10)), TrackOutcome::Ignored);
        assert_eq!(tracker.apply(second, event("p1", 10)), TrackOutcome::Updated);
    }

    #[test]
    fn test_idle_ignores_events() {
        let mut tracker = ProgressTracker::default();
        let generation = tracker.reset(None);
        assert_eq!(tracker.apply(generation, event("p1", 50)), TrackOutcome::Ignored);
        assert!(tracker.latest().is_none());
    }

    #[test]
    fn test_other_project_and_non_inserts_are_ignored() {
        let mut tracker = ProgressTracker::default();
        let generation = tracker.reset(Some("p1"));
        assert_eq!(tracker.apply(generation, event("p2", 50)), TrackOutcome::Ignored);

        let update = ChangeEvent::Update(event("p1", 50).into_entity());
        assert_eq!(tracker.apply(generation, update), TrackOutcome::Ignored);
    }

    #[test]
    fn test_latest_event_replaces_previous() {
        let mut tracker = ProgressTracker::default();
        let generation = tracker.reset(Some("p1"));
        tracker.apply(generation, event("p1", 10));
        tracker.apply(generation, event("p1", 20));
        assert_eq!(tracker.latest().map(|e| e.progress), Some(20));
    }
}
