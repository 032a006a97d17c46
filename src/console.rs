//! Terminal display: renders session events to text and parses the commands typed on stdin.

use std::fmt::Write;
use std::str::FromStr;

use thiserror::Error;

use crate::constants::DEFAULT_STREAMER_COUNT;
use crate::notify::visibility::Visibility;
use crate::tracker::{RosterView, ScoutEvent, StopReason};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConsoleCommand {
    Track { count: usize, category: String },
    Stop,
    Hide,
    Show,
    Notify(bool),
    Help,
    Quit,
}

pub const HELP: &str = "\
commands:
  track [count] <category>   start tracking (restarts a running session)
  stop                       stop tracking
  hide | show                hide or restore the roster display
  notify on|off              toggle new-arrival notifications
  quit                       exit";

impl FromStr for ConsoleCommand {
    type Err = CommandErr;

    fn from_str(line: &str) -> Result<Self, Self::Err> {
        let line = line.trim();
        let (word, rest) = line
            .split_once(char::is_whitespace)
            .map(|(w, r)| (w, r.trim()))
            .unwrap_or((line, ""));

        match word.to_ascii_lowercase().as_str() {
            "" => Err(CommandErr::Empty),
            "track" => {
                let (count, category) = match rest.split_once(char::is_whitespace) {
                    Some((n, category)) => match n.parse::<usize>() {
                        Ok(count) => (count, category.trim()),
                        Err(_) => (DEFAULT_STREAMER_COUNT, rest),
                    },
                    None if rest.parse::<usize>().is_ok() => (0, ""),
                    None => (DEFAULT_STREAMER_COUNT, rest),
                };

                if category.is_empty() {
                    return Err(CommandErr::MissingCategory);
                }

                Ok(ConsoleCommand::Track {
                    count,
                    category: category.to_string(),
                })
            }
            "stop" => Ok(ConsoleCommand::Stop),
            "hide" => Ok(ConsoleCommand::Hide),
            "show" => Ok(ConsoleCommand::Show),
            "notify" => match rest.to_ascii_lowercase().as_str() {
                "on" => Ok(ConsoleCommand::Notify(true)),
                "off" => Ok(ConsoleCommand::Notify(false)),
                other => Err(CommandErr::BadArgument(other.to_string())),
            },
            "help" | "?" => Ok(ConsoleCommand::Help),
            "quit" | "exit" => Ok(ConsoleCommand::Quit),
            other => Err(CommandErr::Unknown(other.to_string())),
        }
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum CommandErr {
    #[error("empty command")]
    Empty,

    #[error("unknown command '{0}' (try 'help')")]
    Unknown(String),

    #[error("usage: track [count] <category>")]
    MissingCategory,

    #[error("expected 'on' or 'off', got '{0}'")]
    BadArgument(String),
}

/// Turns events into lines for stdout. Views are held back while the display is hidden and
/// replayed when it's shown again.
#[derive(Debug)]
pub struct Console {
    visibility: Visibility,
    last_view: Option<RosterView>,
}

impl Console {
    pub fn new(visibility: Visibility) -> Self {
        Self {
            visibility,
            last_view: None,
        }
    }

    pub fn render(&mut self, event: &ScoutEvent) -> Option<String> {
        let hidden = self.visibility.is_hidden();

        match event {
            ScoutEvent::SessionStarted {
                category, count, ..
            } => {
                self.last_view = None;
                Some(format!("[+] tracking top {count} channels in '{category}'"))
            }
            ScoutEvent::View(view) => {
                self.last_view = Some(view.clone());
                (!hidden).then(|| render_view(view))
            }
            ScoutEvent::NewArrivals(arrivals) => {
                let names: Vec<&str> = arrivals.iter().map(|s| s.display_name.as_str()).collect();
                (!hidden).then(|| format!("[+] now live: {}", names.join(", ")))
            }
            // countdown is only shown on the final tick to keep the output readable
            ScoutEvent::Countdown { remaining_secs } => {
                (!hidden && *remaining_secs == 1).then(|| "[~] refreshing in 1s".to_string())
            }
            ScoutEvent::CycleFailed { reason } => {
                Some(format!("[x] refresh failed, keeping previous list: {reason}"))
            }
            ScoutEvent::Cue { lit } => Some(if *lit {
                "[!] *** new channels live ***".to_string()
            } else {
                "[!]".to_string()
            }),
            ScoutEvent::Stopped { reason, .. } => Some(match reason {
                StopReason::Cancelled => "[+] tracking stopped".to_string(),
                StopReason::Failed(e) => format!("[x] tracking stopped: {e}"),
            }),
        }
    }

    /// Called when visibility changes; replays the latest view when the display comes back.
    pub fn on_visibility_change(&self) -> Option<String> {
        if self.visibility.is_hidden() {
            return Some("[+] display hidden".to_string());
        }

        self.last_view.as_ref().map(render_view)
    }
}

pub fn render_view(view: &RosterView) -> String {
    let mut out = format!(
        "[{}] {} live / {} tracked",
        view.polled_at.format("%H:%M:%S"),
        view.shown_count,
        view.total_count
    );

    for (rank, entry) in view.entries.iter().enumerate() {
        if entry.lingering {
            _ = write!(
                out,
                "\n   ~ {:<24} {}  (offline, {:.0}%)",
                entry.name,
                entry.link,
                entry.linger_fraction * 100.0
            );
        } else {
            _ = write!(out, "\n  {:>2}. {:<24} {}", rank + 1, entry.name, entry.link);
        }
    }

    out
}

#[cfg(test)]
mod test {
    use chrono::{TimeZone, Utc};
    use uuid::Uuid;

    use super::*;
    use crate::tracker::{ChannelSnapshot, EntryState, ViewEntry};

    fn view() -> RosterView {
        let snap = |id: &str| ChannelSnapshot {
            id: id.into(),
            display_name: id.into(),
            link: format!("https://twitch.tv/{id}"),
            avatar_url: None,
        };

        RosterView {
            entries: vec![
                ViewEntry::new(&snap("alpha"), EntryState::Active, 10),
                ViewEntry::new(&snap("beta"), EntryState::Lingering { remaining: 7 }, 10),
            ],
            shown_count: 1,
            total_count: 2,
            polled_at: Utc.with_ymd_and_hms(2024, 5, 1, 12, 30, 0).unwrap(),
        }
    }

    #[test]
    fn test_parse_commands() {
        assert_eq!(
            "track 5 Just Chatting".parse::<ConsoleCommand>(),
            Ok(ConsoleCommand::Track {
                count: 5,
                category: "Just Chatting".into()
            })
        );
        assert_eq!(
            "track Chess".parse::<ConsoleCommand>(),
            Ok(ConsoleCommand::Track {
                count: DEFAULT_STREAMER_COUNT,
                category: "Chess".into()
            })
        );
        assert_eq!("  STOP ".parse::<ConsoleCommand>(), Ok(ConsoleCommand::Stop));
        assert_eq!("notify off".parse::<ConsoleCommand>(), Ok(ConsoleCommand::Notify(false)));
        assert_eq!("hide".parse::<ConsoleCommand>(), Ok(ConsoleCommand::Hide));
        assert_eq!("quit".parse::<ConsoleCommand>(), Ok(ConsoleCommand::Quit));
    }

    #[test]
    fn test_parse_errors() {
        assert_eq!("".parse::<ConsoleCommand>(), Err(CommandErr::Empty));
        assert_eq!("track".parse::<ConsoleCommand>(), Err(CommandErr::MissingCategory));
        assert_eq!("track 5".parse::<ConsoleCommand>(), Err(CommandErr::MissingCategory));
        assert_eq!(
            "notify maybe".parse::<ConsoleCommand>(),
            Err(CommandErr::BadArgument("maybe".into()))
        );
        assert!(matches!(
            "dance".parse::<ConsoleCommand>(),
            Err(CommandErr::Unknown(_))
        ));
    }

    #[test]
    fn test_render_view() {
        let out = render_view(&view());
        let lines: Vec<&str> = out.lines().collect();

        assert_eq!(lines[0], "[12:30:00] 1 live / 2 tracked");
        assert!(lines[1].contains("1. alpha") && lines[1].contains("https://twitch.tv/alpha"));
        assert!(lines[2].contains("~ beta") && lines[2].ends_with("(offline, 70%)"));
    }

    #[test]
    fn test_hidden_display_holds_views_until_shown() {
        let visibility = Visibility::new();
        let mut console = Console::new(visibility.clone());

        visibility.hide();
        assert_eq!(console.render(&ScoutEvent::View(view())), None);
        assert_eq!(console.on_visibility_change().as_deref(), Some("[+] display hidden"));

        visibility.restore();
        assert_eq!(console.on_visibility_change(), Some(render_view(&view())));
    }

    #[test]
    fn test_stop_reasons_are_rendered() {
        let mut console = Console::new(Visibility::new());
        let failed = ScoutEvent::Stopped {
            session: Uuid::new_v4(),
            reason: StopReason::Failed("bad token".into()),
        };

        assert_eq!(
            console.render(&failed).as_deref(),
            Some("[x] tracking stopped: bad token")
        );
    }
}
