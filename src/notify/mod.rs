use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use tokio::sync::mpsc::UnboundedSender;
use tracing::instrument;

use crate::constants::CUE_TOGGLE_INTERVAL;
use crate::tracker::throttle::{Decision, Throttle};
use crate::tracker::{ChannelSnapshot, ScoutEvent};

pub mod sound;
pub mod visibility;

use sound::SoundPlayer;
use visibility::Visibility;

/// Carries out notification decisions: plays the sound and drives the visual cue.
///
/// Cheap to clone; clones share the enabled flag, visibility and cue state.
#[derive(Debug, Clone)]
pub struct Notifier {
    enabled: Arc<AtomicBool>,
    blinking: Arc<AtomicBool>,
    sound: SoundPlayer,
    visibility: Visibility,
    events: UnboundedSender<ScoutEvent>,
}

impl Notifier {
    pub fn new(
        sound: SoundPlayer,
        visibility: Visibility,
        enabled: bool,
        events: UnboundedSender<ScoutEvent>,
    ) -> Self {
        Self {
            enabled: Arc::new(AtomicBool::new(enabled)),
            blinking: Arc::new(AtomicBool::new(false)),
            sound,
            visibility,
            events,
        }
    }

    pub fn set_enabled(&self, enabled: bool) {
        self.enabled.store(enabled, Ordering::Relaxed);
        tracing::info!(enabled, "notifications toggled");
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled.load(Ordering::Relaxed)
    }

    pub fn visibility(&self) -> &Visibility {
        &self.visibility
    }

    pub fn is_blinking(&self) -> bool {
        self.blinking.load(Ordering::Acquire)
    }

    #[instrument(skip(self, throttle, arrivals), fields(arrival_count = arrivals.len()))]
    pub fn on_arrivals(
        &self,
        throttle: &Throttle,
        arrivals: &[ChannelSnapshot],
        first_poll: bool,
    ) -> Decision {
        let hidden_for = self.visibility.hidden_for();
        let decision = throttle.decide(arrivals, self.is_enabled(), first_poll, hidden_for);

        match decision {
            Decision::Silent => {
                tracing::debug!(enabled = self.is_enabled(), hidden_for = ?hidden_for, "notification held back");
            }
            Decision::Sound => {
                self.sound.play();
            }
            Decision::SoundAndCue => {
                self.sound.play();
                self.start_cue();
            }
        }

        decision
    }

    /// Starts toggling the visual cue until the display is restored. Does nothing if a cue is
    /// already running.
    pub fn start_cue(&self) {
        if self.blinking.swap(true, Ordering::AcqRel) {
            tracing::debug!("cue already running");
            return;
        }

        let mut restored = self.visibility.subscribe();
        let events = self.events.clone();
        let blinking = self.blinking.clone();

        tokio::spawn(async move {
            let mut interval = tokio::time::interval(CUE_TOGGLE_INTERVAL);
            let mut lit = false;

            tracing::debug!("visual cue started");
            loop {
                if restored.borrow_and_update().is_none() {
                    break;
                }

                tokio::select! {
                    _ = interval.tick() => {
                        lit = !lit;
                        if events.send(ScoutEvent::Cue { lit }).is_err() {
                            break;
                        }
                    }

                    changed = restored.changed() => {
                        if changed.is_err() {
                            break;
                        }
                    }
                }
            }

            _ = events.send(ScoutEvent::Cue { lit: false });
            blinking.store(false, Ordering::Release);
            tracing::debug!("visual cue stopped");
        });
    }
}
