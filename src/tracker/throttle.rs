use std::time::Duration;

use crate::tracker::ChannelSnapshot;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    Silent,
    Sound,
    /// Sound plus a blinking cue, for when the display is hidden.
    SoundAndCue,
}

impl Decision {
    pub fn fires(&self) -> bool {
        !matches!(self, Decision::Silent)
    }
}

/// Decides whether a batch of new arrivals is worth interrupting the user for.
///
/// Once the display has been hidden, notifications are held back until it has stayed hidden
/// for `quiet_window`, so closing the window right after a burst of arrivals doesn't keep
/// chiming.
#[derive(Debug, Clone, Copy)]
pub struct Throttle {
    quiet_window: Duration,
}

impl Throttle {
    pub fn new(quiet_window: Duration) -> Self {
        Self { quiet_window }
    }

    /// `hidden_for` is `None` while the display is visible (or was never hidden).
    pub fn decide(
        &self,
        arrivals: &[ChannelSnapshot],
        enabled: bool,
        first_poll: bool,
        hidden_for: Option<Duration>,
    ) -> Decision {
        if !enabled || first_poll || arrivals.is_empty() {
            return Decision::Silent;
        }

        match hidden_for {
            None => Decision::Sound,
            Some(hidden) if hidden >= self.quiet_window => Decision::SoundAndCue,
            Some(_) => Decision::Silent,
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    const QUIET: Duration = Duration::from_secs(30);

    fn arrivals() -> Vec<ChannelSnapshot> {
        vec![ChannelSnapshot {
            id: "1".into(),
            display_name: "one".into(),
            link: "https://twitch.tv/one".into(),
            avatar_url: None,
        }]
    }

    #[test]
    fn test_visible_display_gets_sound_only() {
        let throttle = Throttle::new(QUIET);
        assert_eq!(throttle.decide(&arrivals(), true, false, None), Decision::Sound);
    }

    #[test]
    fn test_hidden_display_waits_for_quiet_window() {
        let throttle = Throttle::new(QUIET);
        let a = arrivals();

        assert_eq!(
            throttle.decide(&a, true, false, Some(Duration::from_secs(29))),
            Decision::Silent
        );
        assert_eq!(throttle.decide(&a, true, false, Some(QUIET)), Decision::SoundAndCue);
        assert_eq!(
            throttle.decide(&a, true, false, Some(Duration::from_secs(600))),
            Decision::SoundAndCue
        );
    }

    #[test]
    fn test_never_fires_when_gated() {
        let throttle = Throttle::new(QUIET);
        let a = arrivals();

        assert!(!throttle.decide(&a, false, false, None).fires());
        assert!(!throttle.decide(&a, true, true, None).fires());
        assert!(!throttle.decide(&[], true, false, None).fires());
        assert!(!throttle.decide(&a, true, true, Some(QUIET)).fires());
    }

    #[test]
    fn test_zero_quiet_window_fires_immediately_when_hidden() {
        let throttle = Throttle::new(Duration::ZERO);
        assert_eq!(
            throttle.decide(&arrivals(), true, false, Some(Duration::ZERO)),
            Decision::SoundAndCue
        );
    }
}
