use std::sync::Arc;

use clap::Parser;
use thiserror::Error;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::mpsc;

use stream_scout::args::{Cli, Command, TrackArgs};
use stream_scout::console::{Console, ConsoleCommand, HELP};
use stream_scout::constants::SUB_WAIT;
use stream_scout::notify::Notifier;
use stream_scout::notify::sound::SoundPlayer;
use stream_scout::notify::visibility::Visibility;
use stream_scout::tracker::ScoutEvent;
use stream_scout::tracker::session::{Scout, SessionConfig};
use stream_scout::util::env::{EnvErr, Settings};
use stream_scout::util::helix::{Helix, HelixErr};
use stream_scout::util::tracing::build_subscriber;

#[derive(Debug, Error)]
enum RunnerErr {
    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Env(#[from] EnvErr),

    #[error(transparent)]
    Helix(#[from] HelixErr),

    #[error(transparent)]
    Std(#[from] Box<dyn std::error::Error + Send + Sync>),
}

type Result<T> = core::result::Result<T, RunnerErr>;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    // settings first: `.env` may carry RUST_LOG
    let mut settings = Settings::from_env()?;
    build_subscriber()?;
    tracing::debug!(settings = ?settings, "loaded settings");

    match cli.command {
        Some(Command::Token) => print_token(&settings).await,
        Some(Command::Track(args)) => {
            args.apply(&mut settings);
            track(settings).await
        }
        None => {
            TrackArgs::default().apply(&mut settings);
            track(settings).await
        }
    }
}

async fn print_token(settings: &Settings) -> Result<()> {
    let creds = &settings.credentials;
    let token = Helix::exchange_token(
        None,
        creds.client_id()?,
        creds.client_secret()?,
        settings.request_timeout,
    )
    .await?;

    println!("{}", token.access_token);
    if let Some(expires_in) = token.expires_in {
        eprintln!("[+] token expires in {}s", expires_in);
    }

    Ok(())
}

async fn track(settings: Settings) -> Result<()> {
    let creds = &settings.credentials;
    let client_id = creds.client_id()?;

    let access_token = match &creds.access_token {
        Some(token) => token.clone(),
        None => {
            tracing::info!("no access token configured, requesting an app token");
            Helix::exchange_token(
                None,
                client_id,
                creds.client_secret()?,
                settings.request_timeout,
            )
            .await?
            .access_token
        }
    };

    let helix = Helix::new(client_id, &access_token, settings.request_timeout)?;

    let (tx_events, mut rx_events) = mpsc::unbounded_channel::<ScoutEvent>();
    let visibility = Visibility::new();
    let sound = SoundPlayer::new(
        &settings.sound_file,
        settings.volume,
        settings.sound_player.clone(),
    );
    let notifier = Notifier::new(sound, visibility.clone(), settings.notify, tx_events.clone());

    let mut scout = Scout::new(
        Arc::new(helix),
        SessionConfig::from(&settings),
        notifier,
        tx_events,
    );

    let mut console = Console::new(visibility.clone());
    let mut visibility_changes = visibility.subscribe();
    let display = tokio::spawn(async move {
        loop {
            tokio::select! {
                event = rx_events.recv() => match event {
                    Some(event) => {
                        if let Some(out) = console.render(&event) {
                            println!("{out}");
                        }
                    }
                    None => break,
                },

                Ok(()) = visibility_changes.changed() => {
                    if let Some(out) = console.on_visibility_change() {
                        println!("{out}");
                    }
                }
            }
        }
    });

    match &settings.game_name {
        Some(game) => {
            if let Err(e) = scout.start(game, settings.streamer_count).await {
                println!("[x] could not start tracking '{}': {}", game, e);
            }
        }
        None => println!("[+] no category configured\n{HELP}"),
    }

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        let line = tokio::select! {
            _ = tokio::signal::ctrl_c() => break,
            line = lines.next_line() => line?,
        };

        let Some(line) = line else {
            break;
        };

        if line.trim().is_empty() {
            continue;
        }

        match line.parse::<ConsoleCommand>() {
            Ok(ConsoleCommand::Track { count, category }) => {
                if let Err(e) = scout.start(&category, count).await {
                    println!("[x] could not start tracking '{}': {}", category, e);
                }
            }
            Ok(ConsoleCommand::Stop) => {
                if !scout.stop().await {
                    println!("[x] not tracking anything");
                }
            }
            Ok(ConsoleCommand::Hide) => visibility.hide(),
            Ok(ConsoleCommand::Show) => visibility.restore(),
            Ok(ConsoleCommand::Notify(enabled)) => {
                scout.notifier().set_enabled(enabled);
                println!("[+] notifications {}", if enabled { "on" } else { "off" });
            }
            Ok(ConsoleCommand::Help) => println!("{HELP}"),
            Ok(ConsoleCommand::Quit) => break,
            Err(e) => println!("[x] {e}"),
        }
    }

    scout.stop().await;
    drop(scout);

    // a running cue can keep the channel open, so don't wait on the display forever
    _ = tokio::time::timeout(SUB_WAIT, display).await;
    tracing::info!("exiting");

    Ok(())
}
