//! Runtime settings, read from the process environment (and a `.env` file if present).
//!
//! Credentials are also accepted under the `YOUR_`-prefixed names written by older releases,
//! e.g. `YOUR_CLIENT_ID`.

use std::collections::HashMap;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use thiserror::Error;

use crate::constants::{
    DEFAULT_LINGER_TICKS, DEFAULT_POLL_INTERVAL_SECS, DEFAULT_QUIET_WINDOW_SECS,
    DEFAULT_REQUEST_TIMEOUT_SECS, DEFAULT_SOUND_FILE, DEFAULT_STREAMER_COUNT, DEFAULT_VOLUME,
    SUB_WAIT,
};

const LEGACY_PREFIX: &str = "YOUR_";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Var {
    ClientId,
    ClientSecret,
    AccessToken,
    GameName,
    StreamerCount,
    Notify,
    SoundFile,
    Volume,
    SoundPlayer,
    PollIntervalSecs,
    LingerTicks,
    QuietWindowSecs,
    RequestTimeoutSecs,
}

impl Var {
    pub fn name(&self) -> &'static str {
        match self {
            Var::ClientId => "CLIENT_ID",
            Var::ClientSecret => "CLIENT_SECRET",
            Var::AccessToken => "ACCESS_TOKEN",
            Var::GameName => "GAME_NAME",
            Var::StreamerCount => "STREAMER_COUNT",
            Var::Notify => "NOTIFY",
            Var::SoundFile => "SOUND_FILE",
            Var::Volume => "VOLUME",
            Var::SoundPlayer => "SOUND_PLAYER",
            Var::PollIntervalSecs => "POLL_INTERVAL_SECS",
            Var::LingerTicks => "LINGER_TICKS",
            Var::QuietWindowSecs => "QUIET_WINDOW_SECS",
            Var::RequestTimeoutSecs => "REQUEST_TIMEOUT_SECS",
        }
    }

    fn is_credential(&self) -> bool {
        matches!(self, Var::ClientId | Var::ClientSecret | Var::AccessToken)
    }
}

#[derive(Clone, Default)]
pub struct Credentials {
    pub client_id: Option<String>,
    pub client_secret: Option<String>,
    pub access_token: Option<String>,
}

// secrets stay out of logs
impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("client_id", &self.client_id)
            .field("client_secret", &self.client_secret.as_ref().map(|_| "[REDACTED]"))
            .field("access_token", &self.access_token.as_ref().map(|_| "[REDACTED]"))
            .finish()
    }
}

impl Credentials {
    pub fn client_id(&self) -> EnvResult<&str> {
        self.client_id
            .as_deref()
            .ok_or(EnvErr::Missing(Var::ClientId.name()))
    }

    pub fn client_secret(&self) -> EnvResult<&str> {
        self.client_secret
            .as_deref()
            .ok_or(EnvErr::Missing(Var::ClientSecret.name()))
    }
}

#[derive(Debug, Clone)]
pub struct Settings {
    pub credentials: Credentials,
    pub game_name: Option<String>,
    pub streamer_count: usize,
    pub notify: bool,
    pub sound_file: PathBuf,
    pub volume: f32,
    pub sound_player: Option<String>,
    pub poll_interval: Duration,
    pub linger_ticks: u32,
    pub quiet_window: Duration,
    pub request_timeout: Duration,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            credentials: Credentials::default(),
            game_name: None,
            streamer_count: DEFAULT_STREAMER_COUNT,
            notify: false,
            sound_file: PathBuf::from(DEFAULT_SOUND_FILE),
            volume: DEFAULT_VOLUME,
            sound_player: None,
            poll_interval: Duration::from_secs(DEFAULT_POLL_INTERVAL_SECS),
            linger_ticks: DEFAULT_LINGER_TICKS,
            quiet_window: Duration::from_secs(DEFAULT_QUIET_WINDOW_SECS),
            request_timeout: Duration::from_secs(DEFAULT_REQUEST_TIMEOUT_SECS),
        }
    }
}

impl Settings {
    /// Loads `.env` (when present) and reads settings from the resulting environment.
    pub fn from_env() -> EnvResult<Self> {
        if let Err(e) = dotenvy::dotenv()
            && !e.not_found()
        {
            return Err(e.into());
        }

        Self::from_iter(dotenvy::vars())
    }

    pub fn from_iter<Iter>(iter: Iter) -> EnvResult<Self>
    where
        Iter: IntoIterator<Item = (String, String)>,
    {
        let vars = Vars(iter.into_iter().collect());
        let defaults = Self::default();

        let credentials = Credentials {
            client_id: vars.get(Var::ClientId),
            client_secret: vars.get(Var::ClientSecret),
            access_token: vars.get(Var::AccessToken),
        };

        // shorter than one sub-wait means polling back to back
        let poll_interval = match vars.parse::<u64>(Var::PollIntervalSecs)? {
            Some(secs) if Duration::from_secs(secs) < SUB_WAIT => {
                return Err(EnvErr::Parse {
                    var: Var::PollIntervalSecs.name(),
                    value: secs.to_string(),
                });
            }
            Some(secs) => Duration::from_secs(secs),
            None => defaults.poll_interval,
        };

        Ok(Self {
            credentials,
            game_name: vars.get(Var::GameName),
            streamer_count: vars.parse(Var::StreamerCount)?.unwrap_or(defaults.streamer_count),
            notify: vars.flag(Var::Notify)?.unwrap_or(defaults.notify),
            sound_file: vars
                .get(Var::SoundFile)
                .map(PathBuf::from)
                .unwrap_or(defaults.sound_file),
            volume: vars
                .parse::<f32>(Var::Volume)?
                .map(|v| v.clamp(0.0, 1.0))
                .unwrap_or(defaults.volume),
            sound_player: vars.get(Var::SoundPlayer),
            poll_interval,
            linger_ticks: vars.parse(Var::LingerTicks)?.unwrap_or(defaults.linger_ticks),
            quiet_window: vars
                .parse(Var::QuietWindowSecs)?
                .map(Duration::from_secs)
                .unwrap_or(defaults.quiet_window),
            request_timeout: vars
                .parse(Var::RequestTimeoutSecs)?
                .map(Duration::from_secs)
                .unwrap_or(defaults.request_timeout),
        })
    }
}

struct Vars(HashMap<String, String>);

impl Vars {
    /// Empty values count as unset.
    fn get(&self, var: Var) -> Option<String> {
        let lookup = |key: &str| {
            self.0
                .get(key)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };

        lookup(var.name()).or_else(|| {
            var.is_credential()
                .then(|| lookup(&format!("{}{}", LEGACY_PREFIX, var.name())))
                .flatten()
        })
    }

    fn parse<T: FromStr>(&self, var: Var) -> EnvResult<Option<T>> {
        self.get(var)
            .map(|value| {
                value.parse::<T>().map_err(|_| EnvErr::Parse {
                    var: var.name(),
                    value,
                })
            })
            .transpose()
    }

    fn flag(&self, var: Var) -> EnvResult<Option<bool>> {
        self.get(var)
            .map(|value| match value.to_lowercase().as_str() {
                "1" | "true" | "yes" | "on" => Ok(true),
                "0" | "false" | "no" | "off" => Ok(false),
                _ => Err(EnvErr::Parse {
                    var: var.name(),
                    value,
                }),
            })
            .transpose()
    }
}

pub type EnvResult<T> = core::result::Result<T, EnvErr>;

#[derive(Debug, Error)]
pub enum EnvErr {
    #[error(transparent)]
    Dotenvy(#[from] dotenvy::Error),

    #[error("required variable '{0}' is not set")]
    Missing(&'static str),

    #[error("could not parse '{value}' for variable '{var}'")]
    Parse { var: &'static str, value: String },
}

#[cfg(test)]
mod test {
    use super::*;

    fn vars(pairs: &[(&str, &str)]) -> Vec<(String, String)> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn test_defaults_when_unset() {
        let settings = Settings::from_iter(Vec::new()).unwrap();

        assert_eq!(settings.streamer_count, 3);
        assert_eq!(settings.linger_ticks, 10);
        assert_eq!(settings.poll_interval, Duration::from_secs(30));
        assert_eq!(settings.quiet_window, Duration::from_secs(30));
        assert_eq!(settings.sound_file, PathBuf::from("default.wav"));
        assert!(!settings.notify);
        assert!(settings.credentials.client_id().is_err());
    }

    #[test]
    fn test_legacy_credential_names() {
        let settings = Settings::from_iter(vars(&[
            ("YOUR_CLIENT_ID", "legacy-id"),
            ("YOUR_ACCESS_TOKEN", "legacy-token"),
            ("CLIENT_SECRET", "secret"),
        ]))
        .unwrap();

        assert_eq!(settings.credentials.client_id().unwrap(), "legacy-id");
        assert_eq!(settings.credentials.access_token.as_deref(), Some("legacy-token"));
        assert_eq!(settings.credentials.client_secret().unwrap(), "secret");
    }

    #[test]
    fn test_current_name_wins_over_legacy() {
        let settings = Settings::from_iter(vars(&[
            ("YOUR_CLIENT_ID", "legacy-id"),
            ("CLIENT_ID", "current-id"),
        ]))
        .unwrap();

        assert_eq!(settings.credentials.client_id().unwrap(), "current-id");
    }

    #[test]
    fn test_parses_tuning_values() {
        let settings = Settings::from_iter(vars(&[
            ("STREAMER_COUNT", "25"),
            ("NOTIFY", "True"),
            ("VOLUME", "3.5"),
            ("POLL_INTERVAL_SECS", "15"),
            ("LINGER_TICKS", "4"),
            ("QUIET_WINDOW_SECS", "12"),
            ("GAME_NAME", "  Minecraft "),
        ]))
        .unwrap();

        assert_eq!(settings.streamer_count, 25);
        assert!(settings.notify);
        assert_eq!(settings.volume, 1.0);
        assert_eq!(settings.poll_interval, Duration::from_secs(15));
        assert_eq!(settings.linger_ticks, 4);
        assert_eq!(settings.quiet_window, Duration::from_secs(12));
        assert_eq!(settings.game_name.as_deref(), Some("Minecraft"));
    }

    #[test]
    fn test_bad_value_is_rejected() {
        let err = Settings::from_iter(vars(&[("STREAMER_COUNT", "lots")])).unwrap_err();
        assert!(matches!(
            err,
            EnvErr::Parse { var: "STREAMER_COUNT", ref value } if value == "lots"
        ));

        let err = Settings::from_iter(vars(&[("NOTIFY", "maybe")])).unwrap_err();
        assert!(matches!(err, EnvErr::Parse { var: "NOTIFY", .. }));
    }

    #[test]
    fn test_zero_poll_interval_is_rejected() {
        let err = Settings::from_iter(vars(&[("POLL_INTERVAL_SECS", "0")])).unwrap_err();
        assert!(matches!(
            err,
            EnvErr::Parse { var: "POLL_INTERVAL_SECS", ref value } if value == "0"
        ));

        let settings = Settings::from_iter(vars(&[("POLL_INTERVAL_SECS", "1")])).unwrap();
        assert_eq!(settings.poll_interval, Duration::from_secs(1));
    }

    #[test]
    fn test_debug_redacts_secrets() {
        let credentials = Credentials {
            client_id: Some("id".into()),
            client_secret: Some("hunter2".into()),
            access_token: Some("tok".into()),
        };

        let printed = format!("{:?}", credentials);
        assert!(!printed.contains("hunter2"));
        assert!(printed.contains("[REDACTED]"));
    }
}
