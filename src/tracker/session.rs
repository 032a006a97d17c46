use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;
use tokio::sync::mpsc::{self, UnboundedSender};
use tokio::task::JoinHandle;
use tokio::time::{Instant, sleep_until, timeout};
use tokio_util::sync::CancellationToken;
use tracing::{Instrument, instrument};
use uuid::Uuid;

use crate::constants::{MAX_TRACKED_CHANNELS, SESSION_SHUTDOWN_TIMEOUT, SUB_WAIT};
use crate::notify::Notifier;
use crate::tracker::roster::TrackerState;
use crate::tracker::throttle::Throttle;
use crate::tracker::{ScoutEvent, StopReason};
use crate::util::env::Settings;
use crate::util::helix::{HelixErr, Platform};

/// Timing knobs for one session. Captured when the session starts; changes only take effect on
/// the next `start`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionConfig {
    pub poll_interval: Duration,
    pub linger_ticks: u32,
    pub quiet_window: Duration,
    pub request_timeout: Duration,
}

impl From<&Settings> for SessionConfig {
    fn from(settings: &Settings) -> Self {
        Self {
            poll_interval: settings.poll_interval,
            linger_ticks: settings.linger_ticks,
            quiet_window: settings.quiet_window,
            request_timeout: settings.request_timeout,
        }
    }
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self::from(&Settings::default())
    }
}

#[derive(Debug)]
struct SessionHandle {
    id: Uuid,
    cancel: CancellationToken,
    handle: JoinHandle<StopReason>,
}

/// Owns at most one running tracking session.
///
/// Every session reports through the same event channel, so the display can stay subscribed
/// across restarts.
pub struct Scout {
    platform: Arc<dyn Platform>,
    config: SessionConfig,
    notifier: Notifier,
    events: UnboundedSender<ScoutEvent>,
    active: Option<SessionHandle>,
}

impl Scout {
    pub fn new(
        platform: Arc<dyn Platform>,
        config: SessionConfig,
        notifier: Notifier,
        events: UnboundedSender<ScoutEvent>,
    ) -> Self {
        Self {
            platform,
            config,
            notifier,
            events,
            active: None,
        }
    }

    pub fn notifier(&self) -> &Notifier {
        &self.notifier
    }

    /// Replaces the timing config used by the next `start`. A running session keeps its own.
    pub fn set_config(&mut self, config: SessionConfig) {
        self.config = config;
    }

    pub fn session_id(&self) -> Option<Uuid> {
        self.active.as_ref().map(|s| s.id)
    }

    pub fn is_running(&self) -> bool {
        self.active
            .as_ref()
            .is_some_and(|s| !s.handle.is_finished())
    }

    /// Starts tracking the top `count` live channels in `category`, stopping any running
    /// session first.
    ///
    /// The category is resolved before the poll loop is spawned, so an unknown category is
    /// returned here and no session is left running.
    #[instrument(skip(self))]
    pub async fn start(&mut self, category: &str, count: usize) -> ScoutResult<Uuid> {
        self.stop().await;

        let count = if count > MAX_TRACKED_CHANNELS {
            tracing::warn!(
                requested = count,
                max = MAX_TRACKED_CHANNELS,
                "channel count clamped"
            );
            MAX_TRACKED_CHANNELS
        } else {
            count
        };

        let config = self.config;
        let category_id = timeout(config.request_timeout, self.platform.category_id(category))
            .await
            .map_err(|_| HelixErr::Timeout)??;

        let id = Uuid::new_v4();
        let cancel = CancellationToken::new();

        let session = Session {
            id,
            category_id,
            count,
            config,
            platform: self.platform.clone(),
            notifier: self.notifier.clone(),
            events: self.events.clone(),
            cancel: cancel.clone(),
        };

        _ = self.events.send(ScoutEvent::SessionStarted {
            session: id,
            category: category.to_string(),
            count,
        });

        let span = tracing::info_span!("session", %id, category, count);
        let handle = tokio::spawn(session.run().instrument(span));

        self.active = Some(SessionHandle { id, cancel, handle });
        tracing::info!(session = %id, "tracking session started");

        Ok(id)
    }

    /// Cancels the running session and waits for its loop to wind down. Returns `false` when
    /// there was nothing to stop.
    pub async fn stop(&mut self) -> bool {
        let Some(session) = self.active.take() else {
            tracing::debug!("no active session to stop");
            return false;
        };

        shutdown(session, SESSION_SHUTDOWN_TIMEOUT, &self.events).await;
        true
    }
}

/// Cancels a session and joins its task. A loop that ignores cancellation for longer than
/// `grace` is aborted, and `Stopped` is reported on its behalf.
async fn shutdown(
    mut session: SessionHandle,
    grace: Duration,
    events: &UnboundedSender<ScoutEvent>,
) {
    session.cancel.cancel();

    match timeout(grace, &mut session.handle).await {
        Ok(Ok(reason)) => {
            tracing::info!(session = %session.id, reason = ?reason, "tracking session ended");
        }
        Ok(Err(e)) => {
            tracing::error!(session = %session.id, error = %e, "tracking session panicked");
        }
        Err(_) => {
            tracing::warn!(session = %session.id, "session did not stop in time, aborting");
            session.handle.abort();

            if let Err(e) = (&mut session.handle).await
                && !e.is_cancelled()
            {
                tracing::error!(session = %session.id, error = %e, "tracking session panicked");
            }

            _ = events.send(ScoutEvent::Stopped {
                session: session.id,
                reason: StopReason::Cancelled,
            });
        }
    }
}

/// Everything the poll loop needs, moved into its task.
struct Session {
    id: Uuid,
    category_id: String,
    count: usize,
    config: SessionConfig,
    platform: Arc<dyn Platform>,
    notifier: Notifier,
    events: UnboundedSender<ScoutEvent>,
    cancel: CancellationToken,
}

impl Session {
    async fn run(self) -> StopReason {
        let reason = self.poll_loop().await;

        match &reason {
            StopReason::Cancelled => tracing::info!("poll loop cancelled"),
            StopReason::Failed(e) => tracing::error!(error = %e, "poll loop stopped"),
        }

        _ = self.events.send(ScoutEvent::Stopped {
            session: self.id,
            reason: reason.clone(),
        });

        reason
    }

    async fn poll_loop(&self) -> StopReason {
        let mut state = TrackerState::new(self.config.linger_ticks);
        let throttle = Throttle::new(self.config.quiet_window);

        if self.config.poll_interval < SUB_WAIT {
            tracing::warn!(
                poll_interval = ?self.config.poll_interval,
                min = ?SUB_WAIT,
                "poll interval too short, using the minimum"
            );
        }

        let mut avatars: HashMap<String, String> = HashMap::new();
        let mut requested: HashSet<String> = HashSet::new();
        let (avatar_tx, mut avatar_rx) = mpsc::unbounded_channel::<HashMap<String, String>>();

        'session: loop {
            if self.cancel.is_cancelled() {
                break 'session StopReason::Cancelled;
            }

            let polled = tokio::select! {
                biased;

                _ = self.cancel.cancelled() => break 'session StopReason::Cancelled,

                res = timeout(
                    self.config.request_timeout,
                    self.platform.top_streams(&self.category_id, self.count),
                ) => res.unwrap_or(Err(HelixErr::Timeout)),
            };

            match polled {
                Ok(mut poll) => {
                    for snapshot in poll.iter_mut() {
                        if snapshot.avatar_url.is_none() {
                            snapshot.avatar_url = avatars.get(&snapshot.id).cloned();
                        }
                    }

                    let reconciled = state.reconcile(&poll);
                    tracing::debug!(
                        shown = reconciled.view.shown_count,
                        total = reconciled.view.total_count,
                        restored = ?reconciled.restored,
                        dropped = ?reconciled.dropped,
                        expired = ?reconciled.expired,
                        "roster reconciled"
                    );

                    _ = self.events.send(ScoutEvent::View(reconciled.view));

                    if let Some(arrivals) = reconciled.new_arrivals {
                        let decision =
                            self.notifier
                                .on_arrivals(&throttle, &arrivals, reconciled.first_poll);

                        let names: Vec<&str> =
                            arrivals.iter().map(|s| s.display_name.as_str()).collect();
                        tracing::info!(arrivals = ?names, notified = decision.fires(), "new channels live");

                        _ = self.events.send(ScoutEvent::NewArrivals(arrivals));
                    }

                    let missing: Vec<String> = poll
                        .iter()
                        .filter(|s| s.avatar_url.is_none() && requested.insert(s.id.clone()))
                        .map(|s| s.id.clone())
                        .collect();

                    if !missing.is_empty() {
                        self.spawn_avatar_fetch(missing, avatar_tx.clone());
                    }
                }

                Err(e) if e.is_transient() => {
                    tracing::warn!(error = %e, "poll cycle failed, keeping previous view");
                    _ = self.events.send(ScoutEvent::CycleFailed {
                        reason: e.to_string(),
                    });
                }

                Err(e) => break 'session StopReason::Failed(e.to_string()),
            }

            let deadline = Instant::now() + self.config.poll_interval.max(SUB_WAIT);
            let mut last_shown = None;

            loop {
                let now = Instant::now();
                if now >= deadline {
                    break;
                }

                let remaining_secs = (deadline - now).as_secs_f64().ceil() as u64;
                if last_shown != Some(remaining_secs) {
                    last_shown = Some(remaining_secs);
                    _ = self.events.send(ScoutEvent::Countdown { remaining_secs });
                }

                tokio::select! {
                    biased;

                    _ = self.cancel.cancelled() => break 'session StopReason::Cancelled,

                    Some(found) = avatar_rx.recv() => {
                        avatars.extend(found.iter().map(|(k, v)| (k.clone(), v.clone())));
                        if state.apply_avatars(&found) {
                            tracing::trace!(count = found.len(), "avatars merged");
                            _ = self.events.send(ScoutEvent::View(state.view()));
                        }
                    }

                    _ = sleep_until((now + SUB_WAIT).min(deadline)) => {}
                }
            }
        }
    }

    fn spawn_avatar_fetch(&self, ids: Vec<String>, tx: UnboundedSender<HashMap<String, String>>) {
        let platform = self.platform.clone();

        tokio::spawn(
            async move {
                let found = platform.avatars(&ids).await;
                tracing::debug!(requested = ids.len(), found = found.len(), "avatars fetched");

                // the session may be gone by now
                _ = tx.send(found);
            }
            .in_current_span(),
        );
    }
}

pub type ScoutResult<T> = core::result::Result<T, ScoutErr>;

#[derive(Debug, Error)]
pub enum ScoutErr {
    #[error(transparent)]
    Helix(#[from] HelixErr),
}
