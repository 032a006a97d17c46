use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

use crate::util::env::Settings;

#[derive(Parser, Debug)]
#[command(version, about = "Tracks the top live Twitch channels in a category")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Track the top live channels in a category (default)
    Track(TrackArgs),

    /// Exchange the configured client id/secret for an app access token and print it
    Token,
}

/// Overrides for values otherwise read from the environment.
#[derive(Args, Debug, Default, Clone)]
pub struct TrackArgs {
    /// Category (game) name to track
    #[arg(short, long)]
    pub game: Option<String>,

    /// Number of top channels to track (max 100)
    #[arg(short, long)]
    pub count: Option<usize>,

    /// Enable new-arrival notifications
    #[arg(short, long)]
    pub notify: bool,

    /// Notification volume, 0.0 to 1.0
    #[arg(long)]
    pub volume: Option<f32>,

    /// Notification sound file
    #[arg(long)]
    pub sound: Option<PathBuf>,

    /// Seconds between polls (at least 1)
    #[arg(long, value_parser = clap::value_parser!(u64).range(1..))]
    pub interval: Option<u64>,
}

impl TrackArgs {
    pub fn apply(&self, settings: &mut Settings) {
        if let Some(game) = &self.game {
            settings.game_name = Some(game.clone());
        }
        if let Some(count) = self.count {
            settings.streamer_count = count;
        }
        if self.notify {
            settings.notify = true;
        }
        if let Some(volume) = self.volume {
            settings.volume = volume.clamp(0.0, 1.0);
        }
        if let Some(sound) = &self.sound {
            settings.sound_file = sound.clone();
        }
        if let Some(secs) = self.interval {
            settings.poll_interval = std::time::Duration::from_secs(secs);
        }
    }
}
