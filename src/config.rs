use duration_str::deserialize_duration;
use log::LevelFilter;
use serde::Deserialize;
use std::{fs::File, io::Read, path::Path, time::Duration as StdDuration};

#[derive(Deserialize, Debug, Clone)]
pub struct ApiPoll {
  #[serde(deserialize_with = "deserialize_duration")]
  pub period: StdDuration,
  #[serde(deserialize_with = "deserialize_duration")]
  pub timeout: StdDuration,
}

impl Default for ApiPoll {
  fn default() -> Self {
    Self {
      period: StdDuration::from_secs(15),
      timeout: StdDuration::from_secs(3),
    }
  }
}

#[derive(Deserialize, Debug, Clone)]
pub struct ApiBoot {
  pub retries: u32,
  #[serde(deserialize_with = "deserialize_duration")]
  pub retry_cooldown: StdDuration,
}

impl Default for ApiBoot {
  fn default() -> Self {
    Self {
      retries: 5,
      retry_cooldown: StdDuration::from_secs(3),
    }
  }
}

#[derive(Deserialize, Debug, Clone)]
pub struct Api {
  pub url: String,
  pub poll: ApiPoll,
  pub boot: ApiBoot,
}

impl Default for Api {
  fn default() -> Self {
    Self {
      url: "https://data.vatsim.net/v3/vatsim-data.json".to_owned(),
      poll: ApiPoll::default(),
      boot: ApiBoot::default(),
    }
  }
}

#[derive(Deserialize, Debug, Clone)]
pub struct DataPoll {
  #[serde(deserialize_with = "deserialize_duration")]
  pub period: StdDuration,
}

impl Default for DataPoll {
  fn default() -> Self {
    Self {
      period: StdDuration::from_secs(24 * 3600),
    }
  }
}

#[derive(Deserialize, Debug, Clone)]
pub struct RunwaysPoll {
  #[serde(deserialize_with = "deserialize_duration")]
  pub period: StdDuration,
}

impl Default for RunwaysPoll {
  fn default() -> Self {
    Self {
      period: StdDuration::from_secs(24 * 3600),
    }
  }
}

#[derive(Deserialize, Debug, Clone)]
pub struct Web {
  pub addr: String,
  pub cors: bool,
}

impl Default for Web {
  fn default() -> Self {
    Self {
      addr: "localhost:5000".to_owned(),
      cors: false,
    }
  }
}

/// Backend-specific connection settings. Fields not relevant to the chosen
/// `TrackConfig::engine` are simply unused; see `track::build_backend`.
#[derive(Deserialize, Debug, Clone)]
pub struct TrackOptions {
  #[serde(default = "default_purge_period", deserialize_with = "deserialize_chrono_duration")]
  pub purge_period: chrono::Duration,
  pub addr: Option<String>,
  #[serde(default)]
  pub password: Option<String>,
  pub db: Option<u8>,
}

fn default_purge_period() -> chrono::Duration {
  chrono::Duration::hours(24)
}

fn deserialize_chrono_duration<'de, D>(deserializer: D) -> Result<chrono::Duration, D::Error>
where
  D: serde::Deserializer<'de>,
{
  let std_dur = deserialize_duration(deserializer)?;
  chrono::Duration::from_std(std_dur).map_err(serde::de::Error::custom)
}

impl Default for TrackOptions {
  fn default() -> Self {
    Self {
      purge_period: default_purge_period(),
      addr: Some("localhost:6379".to_owned()),
      password: Some(String::new()),
      db: Some(0),
    }
  }
}

#[derive(Deserialize, Debug, Clone)]
pub struct TrackConfig {
  pub engine: String,
  #[serde(default)]
  pub options: TrackOptions,
}

impl Default for TrackConfig {
  fn default() -> Self {
    Self {
      engine: "memory".to_owned(),
      options: TrackOptions::default(),
    }
  }
}

fn default_log_level() -> LevelFilter {
  LevelFilter::Info
}

#[derive(Deserialize, Debug, Clone)]
pub struct Config {
  #[serde(default = "default_log_level")]
  pub log_level: LevelFilter,
  #[serde(default)]
  pub web: Web,
  #[serde(default)]
  pub api: Api,
  #[serde(default)]
  pub data: DataPollConfig,
  #[serde(default)]
  pub runways: RunwaysPollConfig,
  #[serde(default)]
  pub track: TrackConfig,
}

impl Default for Config {
  fn default() -> Self {
    Self {
      log_level: default_log_level(),
      web: Web::default(),
      api: Api::default(),
      data: DataPollConfig::default(),
      runways: RunwaysPollConfig::default(),
      track: TrackConfig::default(),
    }
  }
}

#[derive(Deserialize, Debug, Clone)]
pub struct DataPollConfig {
  pub poll: DataPoll,
}

impl Default for DataPollConfig {
  fn default() -> Self {
    Self {
      poll: DataPoll::default(),
    }
  }
}

#[derive(Deserialize, Debug, Clone)]
pub struct RunwaysPollConfig {
  pub poll: RunwaysPoll,
}

impl Default for RunwaysPollConfig {
  fn default() -> Self {
    Self {
      poll: RunwaysPoll::default(),
    }
  }
}

/// Search order: explicit `-c` path first, then `./skyfan.toml`, then
/// `/etc/skyfan/skyfan.toml`. Falls back to defaults on any read/parse
/// failure rather than treating a missing file as fatal.
pub fn read_config(filename: Option<&str>) -> Config {
  let mut filenames = vec!["./skyfan.toml", "/etc/skyfan/skyfan.toml"];
  if let Some(filename) = filename {
    filenames.insert(0, filename);
  }

  for fname in filenames {
    let path = Path::new(fname);
    log::info!("trying config file {fname}...");
    if path.is_file() {
      let res = File::open(path);
      if let Err(err) = res {
        log::warn!("error opening config file {fname}: {err}");
        continue;
      }
      let mut f = res.unwrap();
      let mut config_raw = String::new();
      if let Err(err) = f.read_to_string(&mut config_raw) {
        log::warn!("error reading config file {fname}: {err}");
        continue;
      }
      match toml::from_str::<Config>(&config_raw) {
        Ok(cfg) => return cfg,
        Err(err) => {
          log::warn!("error parsing config file {fname}: {err}");
          continue;
        }
      }
    }
    log::debug!("config file {fname} does not exist");
  }
  log::info!("no config file found, using default settings");
  Default::default()
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_defaults() {
    let cfg = Config::default();
    assert_eq!(cfg.web.addr, "localhost:5000");
    assert_eq!(cfg.track.engine, "memory");
    assert_eq!(cfg.api.boot.retries, 5);
  }

  #[test]
  fn test_missing_file_falls_back_to_defaults() {
    let cfg = read_config(Some("/nonexistent/skyfan.toml"));
    assert_eq!(cfg.web.addr, "localhost:5000");
  }
}
