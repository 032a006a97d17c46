//! Reconciles successive polls into a stable roster.
//!
//! Channels that drop out of a poll are not removed straight away: they linger for
//! `linger_ticks` poll cycles (one tick per cycle) so that a channel briefly slipping out of the
//! top-N does not flicker out of the list, or count as "new" when it comes back. The display can
//! use each entry's `linger_fraction` to fade lingering rows out.

use std::collections::{HashMap, HashSet};

use chrono::Utc;

use crate::tracker::{ChannelSnapshot, EntryState, RosterView, ViewEntry};

#[derive(Debug, Clone)]
struct LingerEntry {
    snapshot: ChannelSnapshot,
    remaining: u32,
}

/// Roster state for a single tracking session. Owned by the session's poll loop and dropped
/// with it.
#[derive(Debug)]
pub struct TrackerState {
    linger_ticks: u32,
    /// Channels live in the latest poll, in rank order.
    active: Vec<ChannelSnapshot>,
    /// Lingering channels in the order they dropped out.
    lingering: Vec<LingerEntry>,
    polls: u64,
}

/// The outcome of reconciling one poll.
#[derive(Debug, Clone)]
pub struct Reconciled {
    pub view: RosterView,
    /// Channels neither active nor lingering before this poll. Always `None` on the first poll
    /// of a session, and never `Some` with an empty list.
    pub new_arrivals: Option<Vec<ChannelSnapshot>>,
    pub first_poll: bool,
    pub restored: Vec<String>,
    pub dropped: Vec<String>,
    pub expired: Vec<String>,
}

impl TrackerState {
    pub fn new(linger_ticks: u32) -> Self {
        Self {
            linger_ticks,
            active: Vec::new(),
            lingering: Vec::new(),
            polls: 0,
        }
    }

    pub fn is_first_poll(&self) -> bool {
        self.polls == 0
    }

    pub fn state_of(&self, id: &str) -> Option<EntryState> {
        if self.active.iter().any(|s| s.id == id) {
            return Some(EntryState::Active);
        }

        self.lingering
            .iter()
            .find(|e| e.snapshot.id == id)
            .map(|e| EntryState::Lingering {
                remaining: e.remaining,
            })
    }

    pub fn reconcile(&mut self, poll: &[ChannelSnapshot]) -> Reconciled {
        let current = dedup_by_id(poll);
        let current_ids: HashSet<&str> = current.iter().map(|s| s.id.as_str()).collect();

        let known: HashSet<String> = self
            .active
            .iter()
            .map(|s| s.id.clone())
            .chain(self.lingering.iter().map(|e| e.snapshot.id.clone()))
            .collect();

        // reappearing channels come back regardless of how much linger they had left
        let mut restored = Vec::new();
        self.lingering.retain(|e| {
            let back = current_ids.contains(e.snapshot.id.as_str());
            if back {
                restored.push(e.snapshot.id.clone());
            }
            !back
        });

        // tick down entries that were already lingering before this poll
        let mut expired = Vec::new();
        self.lingering.retain_mut(|e| {
            e.remaining = e.remaining.saturating_sub(1);
            if e.remaining == 0 {
                expired.push(e.snapshot.id.clone());
            }
            e.remaining > 0
        });

        let mut dropped = Vec::new();
        for snapshot in self.active.drain(..) {
            if current_ids.contains(snapshot.id.as_str()) {
                continue;
            }

            dropped.push(snapshot.id.clone());
            if self.linger_ticks > 0 {
                self.lingering.push(LingerEntry {
                    snapshot,
                    remaining: self.linger_ticks,
                });
            }
        }

        let arrivals: Vec<ChannelSnapshot> = current
            .iter()
            .filter(|s| !known.contains(&s.id))
            .cloned()
            .collect();

        let first_poll = self.is_first_poll();
        self.polls += 1;
        self.active = current;

        let new_arrivals = (!first_poll && !arrivals.is_empty()).then_some(arrivals);

        Reconciled {
            view: self.view(),
            new_arrivals,
            first_poll,
            restored,
            dropped,
            expired,
        }
    }

    /// Fills in avatars for entries that don't have one yet. Returns whether anything changed.
    pub fn apply_avatars(&mut self, avatars: &HashMap<String, String>) -> bool {
        let mut changed = false;

        let snapshots = self
            .active
            .iter_mut()
            .chain(self.lingering.iter_mut().map(|e| &mut e.snapshot));

        for snapshot in snapshots {
            if snapshot.avatar_url.is_none()
                && let Some(url) = avatars.get(&snapshot.id)
            {
                snapshot.avatar_url = Some(url.clone());
                changed = true;
            }
        }

        changed
    }

    pub fn view(&self) -> RosterView {
        let entries: Vec<ViewEntry> = self
            .active
            .iter()
            .map(|s| ViewEntry::new(s, EntryState::Active, self.linger_ticks))
            .chain(self.lingering.iter().map(|e| {
                ViewEntry::new(
                    &e.snapshot,
                    EntryState::Lingering {
                        remaining: e.remaining,
                    },
                    self.linger_ticks,
                )
            }))
            .collect();

        RosterView {
            shown_count: self.active.len(),
            total_count: entries.len(),
            entries,
            polled_at: Utc::now(),
        }
    }
}

/// Keeps the first (highest-ranked) occurrence of each id.
fn dedup_by_id(poll: &[ChannelSnapshot]) -> Vec<ChannelSnapshot> {
    let mut seen = HashSet::new();
    poll.iter()
        .filter(|s| seen.insert(s.id.as_str()))
        .cloned()
        .collect()
}

#[cfg(test)]
mod test {
    use super::*;

    const LINGER: u32 = 10;

    fn snap(id: &str) -> ChannelSnapshot {
        ChannelSnapshot {
            id: id.to_string(),
            display_name: id.to_uppercase(),
            link: format!("https://twitch.tv/{id}"),
            avatar_url: None,
        }
    }

    fn poll(ids: &[&str]) -> Vec<ChannelSnapshot> {
        ids.iter().map(|id| snap(id)).collect()
    }

    fn arrival_ids(r: &Reconciled) -> Vec<String> {
        r.new_arrivals
            .as_ref()
            .map(|a| a.iter().map(|s| s.id.clone()).collect())
            .unwrap_or_default()
    }

    fn view_ids(r: &Reconciled) -> Vec<(&str, bool)> {
        r.view
            .entries
            .iter()
            .map(|e| (e.id.as_str(), e.lingering))
            .collect()
    }

    #[test]
    fn test_walkthrough_scenario() {
        let mut state = TrackerState::new(LINGER);

        let r = state.reconcile(&poll(&["a", "b", "c"]));
        assert!(r.first_poll);
        assert!(r.new_arrivals.is_none());
        assert_eq!(view_ids(&r), [("a", false), ("b", false), ("c", false)]);

        let r = state.reconcile(&poll(&["a", "c", "d"]));
        assert_eq!(arrival_ids(&r), ["d"]);
        assert_eq!(state.state_of("b"), Some(EntryState::Lingering { remaining: 10 }));
        assert_eq!(
            view_ids(&r),
            [("a", false), ("c", false), ("d", false), ("b", true)]
        );
        assert_eq!((r.view.shown_count, r.view.total_count), (3, 4));

        let r = state.reconcile(&poll(&["a", "c"]));
        assert!(r.new_arrivals.is_none());
        assert_eq!(state.state_of("d"), Some(EntryState::Lingering { remaining: 10 }));
        assert_eq!(state.state_of("b"), Some(EntryState::Lingering { remaining: 9 }));

        let r = state.reconcile(&poll(&["a", "b", "c"]));
        assert!(r.new_arrivals.is_none());
        assert_eq!(r.restored, ["b"]);
        assert_eq!(state.state_of("b"), Some(EntryState::Active));
        assert_eq!(state.state_of("d"), Some(EntryState::Lingering { remaining: 9 }));
    }

    #[test]
    fn test_first_poll_never_reports_arrivals() {
        let mut state = TrackerState::new(LINGER);
        let r = state.reconcile(&poll(&["x", "y", "z"]));

        assert!(r.first_poll);
        assert!(r.new_arrivals.is_none());
        assert!(!state.is_first_poll());
    }

    #[test]
    fn test_empty_first_poll_still_counts_as_first() {
        let mut state = TrackerState::new(LINGER);
        state.reconcile(&[]);

        let r = state.reconcile(&poll(&["a"]));
        assert!(!r.first_poll);
        assert_eq!(arrival_ids(&r), ["a"]);
    }

    #[test]
    fn test_always_present_never_lingers() {
        let mut state = TrackerState::new(3);
        let polls = [
            poll(&["a", "b"]),
            poll(&["c", "a"]),
            poll(&["a"]),
            poll(&["d", "e", "a"]),
            poll(&["a", "b"]),
        ];

        for p in &polls {
            let r = state.reconcile(p);
            assert_eq!(state.state_of("a"), Some(EntryState::Active));
            assert!(r.view.entries.iter().any(|e| e.id == "a" && !e.lingering));
            assert!(!r.dropped.contains(&"a".to_string()));
        }
    }

    #[test]
    fn test_reappearance_within_grace_window_is_not_new() {
        for gap in 1..=LINGER {
            let mut state = TrackerState::new(LINGER);
            state.reconcile(&poll(&["a", "b"]));

            // absent for `gap` consecutive polls
            for _ in 0..gap {
                let r = state.reconcile(&poll(&["a"]));
                assert!(r.new_arrivals.is_none());
            }

            assert!(matches!(state.state_of("b"), Some(EntryState::Lingering { .. })));

            let r = state.reconcile(&poll(&["a", "b"]));
            assert!(
                r.new_arrivals.is_none(),
                "reappearance after {gap} absent polls counted as new"
            );
            assert_eq!(state.state_of("b"), Some(EntryState::Active));
        }
    }

    #[test]
    fn test_expired_entry_is_removed_and_counts_as_new_again() {
        let mut state = TrackerState::new(LINGER);
        state.reconcile(&poll(&["a", "b"]));

        // the first absence starts the linger at 10, the next nine tick it down to 1
        for _ in 0..LINGER {
            state.reconcile(&poll(&["a"]));
        }
        assert_eq!(state.state_of("b"), Some(EntryState::Lingering { remaining: 1 }));

        let r = state.reconcile(&poll(&["a"]));
        assert_eq!(r.expired, ["b"]);
        assert_eq!(state.state_of("b"), None);
        assert!(r.view.entries.iter().all(|e| e.id != "b"));

        let r = state.reconcile(&poll(&["a", "b"]));
        assert_eq!(arrival_ids(&r), ["b"]);
    }

    #[test]
    fn test_identical_polls_are_idempotent() {
        let mut state = TrackerState::new(LINGER);
        state.reconcile(&poll(&["a", "b", "c"]));

        let first = state.reconcile(&poll(&["a", "b", "c"]));
        let second = state.reconcile(&poll(&["a", "b", "c"]));

        assert!(first.new_arrivals.is_none());
        assert!(second.new_arrivals.is_none());
        assert_eq!(view_ids(&first), view_ids(&second));
        assert!(second.restored.is_empty() && second.dropped.is_empty() && second.expired.is_empty());
    }

    #[test]
    fn test_linger_fraction_decreases() {
        let mut state = TrackerState::new(4);
        state.reconcile(&poll(&["a", "b"]));

        let fractions: Vec<f32> = (0..4)
            .map(|_| {
                let r = state.reconcile(&poll(&["a"]));
                r.view
                    .entries
                    .iter()
                    .find(|e| e.id == "b")
                    .map(|e| e.linger_fraction)
                    .unwrap_or(0.0)
            })
            .collect();

        assert_eq!(fractions, [1.0, 0.75, 0.5, 0.25]);

        let r = state.reconcile(&poll(&["a"]));
        assert!(r.view.entries.iter().all(|e| e.id != "b"));
        assert_eq!(r.view.entries[0].linger_fraction, 1.0);
    }

    #[test]
    fn test_new_arrivals_are_one_batch() {
        let mut state = TrackerState::new(LINGER);
        state.reconcile(&poll(&["a"]));

        let r = state.reconcile(&poll(&["b", "a", "c"]));
        assert_eq!(arrival_ids(&r), ["b", "c"]);
    }

    #[test]
    fn test_duplicate_ids_in_a_poll_collapse() {
        let mut state = TrackerState::new(LINGER);
        state.reconcile(&poll(&["a"]));

        let mut p = poll(&["b", "a"]);
        p.push(ChannelSnapshot {
            display_name: "B again".into(),
            ..snap("b")
        });

        let r = state.reconcile(&p);
        assert_eq!(r.view.entries.len(), 2);
        assert_eq!(r.view.entries[0].name, "B");
        assert_eq!(arrival_ids(&r), ["b"]);
    }

    #[test]
    fn test_zero_linger_drops_immediately() {
        let mut state = TrackerState::new(0);
        state.reconcile(&poll(&["a", "b"]));

        let r = state.reconcile(&poll(&["a"]));
        assert_eq!(r.dropped, ["b"]);
        assert_eq!(state.state_of("b"), None);

        let r = state.reconcile(&poll(&["a", "b"]));
        assert_eq!(arrival_ids(&r), ["b"]);
    }

    #[test]
    fn test_rank_order_follows_poll_and_renames_apply() {
        let mut state = TrackerState::new(LINGER);
        state.reconcile(&poll(&["a", "b", "c"]));

        let mut p = poll(&["c", "a", "b"]);
        p[1].display_name = "Renamed".into();

        let r = state.reconcile(&p);
        let names: Vec<_> = r.view.entries.iter().map(|e| e.name.as_str()).collect();
        assert_eq!(names, ["C", "Renamed", "B"]);
        assert!(r.new_arrivals.is_none());
    }

    #[test]
    fn test_apply_avatars_fills_missing_only() {
        let mut state = TrackerState::new(LINGER);
        let mut p = poll(&["a", "b"]);
        p[0].avatar_url = Some("https://img/a-old.png".into());
        state.reconcile(&p);
        state.reconcile(&poll(&["a"]));

        let avatars = HashMap::from([
            ("a".to_string(), "https://img/a-new.png".to_string()),
            ("b".to_string(), "https://img/b.png".to_string()),
        ]);

        assert!(state.apply_avatars(&avatars));
        assert!(!state.apply_avatars(&avatars));

        let view = state.view();
        let lingering_b = view.entries.iter().find(|e| e.id == "b").unwrap();
        assert!(lingering_b.lingering);
        assert_eq!(lingering_b.avatar_url.as_deref(), Some("https://img/b.png"));
    }
}
