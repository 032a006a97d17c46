use std::path::{Path, PathBuf};
use std::process::{ExitStatus, Stdio};

use thiserror::Error;
use tokio::process::Command;
use tokio::task::JoinHandle;
use tracing::instrument;
use uuid::Uuid;

use crate::constants::{BUNDLED_SOUND, BUNDLED_SOUND_NAME};

/// Plays the notification sound through an external player process.
///
/// Playback is fire-and-forget: `play` spawns a task and returns immediately, and any failure
/// is logged rather than reported back.
#[derive(Debug, Clone)]
pub struct SoundPlayer {
    sound_file: PathBuf,
    volume: f32,
    player: Option<String>,
}

impl SoundPlayer {
    /// `player` overrides the platform default; it is split on whitespace and the sound file is
    /// appended as the last argument.
    ///
    /// `volume` is passed to players with a known volume flag (`afplay`, `paplay`, `mpv`) unless
    /// the override already sets one. Other players, and the Windows default, play at their own
    /// volume.
    pub fn new(sound_file: impl Into<PathBuf>, volume: f32, player: Option<String>) -> Self {
        Self {
            sound_file: sound_file.into(),
            volume: volume.clamp(0.0, 1.0),
            player,
        }
    }

    pub fn is_muted(&self) -> bool {
        self.volume <= 0.0
    }

    pub fn play(&self) -> JoinHandle<()> {
        let player = self.clone();
        tokio::spawn(async move {
            if let Err(e) = player.play_inner().await {
                tracing::warn!(error = %e, "notification sound failed");
            }
        })
    }

    #[instrument(skip(self), fields(sound_file = %self.sound_file.display(), volume = self.volume))]
    async fn play_inner(&self) -> SoundResult<()> {
        if self.is_muted() {
            tracing::debug!("volume is zero, skipping notification sound");
            return Ok(());
        }

        let file = self.resolve().await?;
        let bundled = bundled_path();

        match self.run_player(&file).await {
            Err(e) if file != bundled => {
                tracing::warn!(error = %e, "selected sound failed to play, using bundled default");
                let fallback = materialize_bundled().await?;
                self.run_player(&fallback).await
            }
            res => res,
        }
    }

    /// The configured sound file if it exists, otherwise the bundled default.
    async fn resolve(&self) -> SoundResult<PathBuf> {
        if tokio::fs::try_exists(&self.sound_file).await.unwrap_or(false) {
            return Ok(self.sound_file.clone());
        }

        tracing::warn!(
            sound_file = %self.sound_file.display(),
            "selected sound not found, using bundled default"
        );
        materialize_bundled().await
    }

    async fn run_player(&self, file: &Path) -> SoundResult<()> {
        let mut cmd = self.command(file)?;
        let status = cmd
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .kill_on_drop(true)
            .status()
            .await?;

        if !status.success() {
            return Err(SoundErr::PlayerFailed {
                file: file.to_path_buf(),
                status,
            });
        }

        tracing::debug!(file = %file.display(), "played notification sound");
        Ok(())
    }

    fn command(&self, file: &Path) -> SoundResult<Command> {
        if let Some(player) = &self.player {
            let parts: Vec<&str> = player.split_whitespace().collect();
            let (program, args) = parts.split_first().ok_or(SoundErr::NoPlayer)?;

            let mut cmd = Command::new(program);
            cmd.args(args);
            if !args.iter().any(|a| a.contains("volume")) {
                cmd.args(volume_args(program, self.volume));
            }
            cmd.arg(file);
            return Ok(cmd);
        }

        let cmd = if cfg!(target_os = "macos") {
            let mut cmd = Command::new("afplay");
            cmd.args(volume_args("afplay", self.volume)).arg(file);
            cmd
        } else if cfg!(windows) {
            let script = format!(
                "(New-Object Media.SoundPlayer '{}').PlaySync()",
                file.display().to_string().replace('\'', "''")
            );
            let mut cmd = Command::new("powershell");
            cmd.args(["-NoProfile", "-NonInteractive", "-Command", &script]);
            cmd
        } else if cfg!(unix) {
            let mut cmd = Command::new("paplay");
            cmd.args(volume_args("paplay", self.volume)).arg(file);
            cmd
        } else {
            return Err(SoundErr::NoPlayer);
        };

        Ok(cmd)
    }
}

/// Volume flags for players that take one; empty for anything else.
fn volume_args(program: &str, volume: f32) -> Vec<String> {
    let name = Path::new(program)
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or(program);

    match name {
        "afplay" => vec!["-v".to_string(), format!("{:.2}", volume)],
        // paplay volume is linear, 65536 being 100%
        "paplay" => vec![format!("--volume={}", (volume * 65536.0).round() as u32)],
        "mpv" => vec![format!("--volume={}", (volume * 100.0).round() as u32)],
        _ => Vec::new(),
    }
}

fn bundled_path() -> PathBuf {
    std::env::temp_dir().join(BUNDLED_SOUND_NAME)
}

/// Writes the bundled clip into the temp dir (once) so an external player can open it.
async fn materialize_bundled() -> SoundResult<PathBuf> {
    let path = bundled_path();

    let current = tokio::fs::read(&path).await.ok();
    if current.as_deref() != Some(BUNDLED_SOUND) {
        // write-then-rename so a concurrent reader never sees a partial file
        let staging = path.with_file_name(format!("{}.{}", BUNDLED_SOUND_NAME, Uuid::new_v4()));
        tokio::fs::write(&staging, BUNDLED_SOUND).await?;
        tokio::fs::rename(&staging, &path).await?;
        tracing::debug!(path = %path.display(), "wrote bundled notification sound");
    }

    Ok(path)
}

pub type SoundResult<T> = core::result::Result<T, SoundErr>;

#[derive(Debug, Error)]
pub enum SoundErr {
    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error("no sound player available on this platform")]
    NoPlayer,

    #[error("player exited with {status} while playing '{}'", file.display())]
    PlayerFailed { file: PathBuf, status: ExitStatus },
}
