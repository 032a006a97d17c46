use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

pub mod roster;
pub mod session;
pub mod throttle;

/// One live channel as reported by a single poll. Identity is `id`; the other fields may
/// change between polls.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ChannelSnapshot {
    pub id: String,
    pub display_name: String,
    pub link: String,
    pub avatar_url: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryState {
    Active,
    /// Dropped out of the live list; removed once `remaining` reaches zero.
    Lingering { remaining: u32 },
}

/// A roster row as handed to the display.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ViewEntry {
    pub id: String,
    pub name: String,
    pub link: String,
    pub avatar_url: Option<String>,
    pub lingering: bool,
    /// `1.0` for active entries, `remaining / linger_ticks` for lingering ones.
    pub linger_fraction: f32,
}

impl ViewEntry {
    pub fn new(snapshot: &ChannelSnapshot, state: EntryState, linger_ticks: u32) -> Self {
        let (lingering, linger_fraction) = match state {
            EntryState::Active => (false, 1.0),
            EntryState::Lingering { remaining } => {
                (true, remaining as f32 / linger_ticks.max(1) as f32)
            }
        };

        Self {
            id: snapshot.id.clone(),
            name: snapshot.display_name.clone(),
            link: snapshot.link.clone(),
            avatar_url: snapshot.avatar_url.clone(),
            lingering,
            linger_fraction,
        }
    }
}

/// An immutable view of the roster after one poll cycle.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RosterView {
    /// Active entries in rank order, followed by lingering entries.
    pub entries: Vec<ViewEntry>,
    /// Channels live in the latest poll.
    pub shown_count: usize,
    /// Live plus lingering channels.
    pub total_count: usize,
    pub polled_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StopReason {
    Cancelled,
    Failed(String),
}

/// Everything a tracking session reports to its display.
#[derive(Debug, Clone, PartialEq)]
pub enum ScoutEvent {
    SessionStarted {
        session: Uuid,
        category: String,
        count: usize,
    },
    View(RosterView),
    NewArrivals(Vec<ChannelSnapshot>),
    Countdown {
        remaining_secs: u64,
    },
    /// A transient failure skipped this cycle; the previous view still stands.
    CycleFailed {
        reason: String,
    },
    Cue {
        lit: bool,
    },
    Stopped {
        session: Uuid,
        reason: StopReason,
    },
}
