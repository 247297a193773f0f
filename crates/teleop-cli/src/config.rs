//! Configuration – reads/writes `~/.teleop/config.toml`.

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use teleop_link::LinkConfig;

/// Persisted operator configuration stored in `~/.teleop/config.toml`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Config {
    /// Host name or IP of the robot's control module.
    #[serde(default = "default_host")]
    pub host: String,

    /// TCP port the control module listens on.
    #[serde(default = "default_port")]
    pub port: u16,

    /// Host loop rate; inbound latency is bounded by one tick.
    #[serde(default = "default_tick_hz")]
    pub tick_hz: u32,

    #[serde(default = "default_connect_timeout_ms")]
    pub connect_timeout_ms: u64,

    #[serde(default = "default_write_timeout_ms")]
    pub write_timeout_ms: u64,
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}
fn default_port() -> u16 {
    8000
}
fn default_tick_hz() -> u32 {
    30
}
fn default_connect_timeout_ms() -> u64 {
    1000
}
fn default_write_timeout_ms() -> u64 {
    500
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            tick_hz: default_tick_hz(),
            connect_timeout_ms: default_connect_timeout_ms(),
            write_timeout_ms: default_write_timeout_ms(),
        }
    }
}

impl Config {
    /// Socket parameters for [`teleop_link::Link::tcp`].
    pub fn link_config(&self) -> LinkConfig {
        LinkConfig {
            connect_timeout: Duration::from_millis(self.connect_timeout_ms.max(1)),
            write_timeout: (self.write_timeout_ms > 0)
                .then(|| Duration::from_millis(self.write_timeout_ms)),
            ..LinkConfig::new(self.host.clone(), self.port)
        }
    }

    /// Sleep between loop iterations.
    pub fn tick_interval(&self) -> Duration {
        Duration::from_secs(1) / self.tick_hz.max(1)
    }
}

/// Return the path to `~/.teleop/config.toml`.
pub fn config_path() -> PathBuf {
    config_path_for_home(
        &std::env::var("HOME")
            .or_else(|_| std::env::var("USERPROFILE"))
            .unwrap_or_else(|_| ".".to_string()),
    )
}

pub(crate) fn config_path_for_home(home: &str) -> PathBuf {
    PathBuf::from(home).join(".teleop").join("config.toml")
}

/// Load the config from disk.  Returns `None` if the file does not exist.
pub fn load() -> Result<Option<Config>, String> {
    load_from(&config_path())
}

/// The configuration to run with: the file if present, defaults otherwise,
/// then environment overrides.
pub fn effective(file: Option<Config>) -> Config {
    let mut cfg = file.unwrap_or_default();
    apply_env_overrides(&mut cfg);
    cfg
}

pub(crate) fn load_from(path: &Path) -> Result<Option<Config>, String> {
    if !path.exists() {
        return Ok(None);
    }
    let raw = fs::read_to_string(path)
        .map_err(|e| format!("Failed to read config at {}: {}", path.display(), e))?;
    let cfg: Config =
        toml::from_str(&raw).map_err(|e| format!("Failed to parse config: {}", e))?;
    Ok(Some(cfg))
}

/// Apply `TELEOP_*` environment variable overrides to `cfg`.
///
/// | Variable | Config field |
/// |---|---|
/// | `TELEOP_HOST` | `host` |
/// | `TELEOP_PORT` | `port` |
/// | `TELEOP_TICK_HZ` | `tick_hz` |
///
/// Values that do not parse are ignored.
pub fn apply_env_overrides(cfg: &mut Config) {
    if let Ok(v) = std::env::var("TELEOP_HOST")
        && !v.trim().is_empty()
    {
        cfg.host = v.trim().to_string();
    }
    if let Ok(v) = std::env::var("TELEOP_PORT")
        && let Ok(port) = v.trim().parse::<u16>()
    {
        cfg.port = port;
    }
    if let Ok(v) = std::env::var("TELEOP_TICK_HZ")
        && let Ok(hz) = v.trim().parse::<u32>()
        && hz > 0
    {
        cfg.tick_hz = hz;
    }
}

/// Save the config to disk, creating `~/.teleop/` if necessary.
pub fn save(cfg: &Config) -> Result<(), String> {
    save_to(cfg, &config_path())
}

pub(crate) fn save_to(cfg: &Config, path: &Path) -> Result<(), String> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .map_err(|e| format!("Failed to create config directory: {}", e))?;
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            fs::set_permissions(parent, fs::Permissions::from_mode(0o700))
                .map_err(|e| format!("Failed to set config directory permissions: {}", e))?;
        }
    }
    let raw = toml::to_string_pretty(cfg)
        .map_err(|e| format!("Failed to serialize config: {}", e))?;
    #[cfg(unix)]
    {
        use std::os::unix::fs::OpenOptionsExt;
        fs::OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(true)
            .mode(0o600)
            .open(path)
            .and_then(|mut f| {
                use std::io::Write;
                f.write_all(raw.as_bytes())
            })
            .map_err(|e| format!("Failed to write config at {}: {}", path.display(), e))?;
    }
    #[cfg(not(unix))]
    fs::write(path, raw)
        .map_err(|e| format!("Failed to write config at {}: {}", path.display(), e))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn roundtrip_default_config() {
        let dir = tempfile::tempdir().expect("tmp dir");
        let path = config_path_for_home(&dir.path().to_string_lossy());

        save_to(&Config::default(), &path).expect("save");
        let loaded = load_from(&path).expect("load ok").expect("some");
        assert_eq!(loaded.port, 8000);
        assert_eq!(loaded.tick_hz, 30);
    }

    #[test]
    fn missing_fields_fall_back_to_defaults() {
        let dir = tempfile::tempdir().expect("tmp dir");
        let path = dir.path().join("config.toml");
        fs::write(&path, "host = \"robot.local\"\n").expect("write");

        let cfg = load_from(&path).expect("load ok").expect("some");
        assert_eq!(cfg.port, 8000);
        assert_eq!(cfg.write_timeout_ms, 500);
    }

    #[test]
    fn unparsable_file_is_an_error() {
        let dir = tempfile::tempdir().expect("tmp dir");
        let path = dir.path().join("config.toml");
        fs::write(&path, "port = \"eight thousand\"\n").expect("write");
        assert!(load_from(&path).is_err());
    }

    #[cfg(unix)]
    #[test]
    fn config_file_has_restrictive_permissions() {
        use std::os::unix::fs::PermissionsExt;
        let dir = tempfile::tempdir().expect("tmp dir");
        let path = config_path_for_home(&dir.path().to_string_lossy());

        save_to(&Config::default(), &path).expect("save");

        let file_mode = fs::metadata(&path).expect("file metadata").permissions().mode() & 0o777;
        assert_eq!(file_mode, 0o600);
        let dir_mode = fs::metadata(path.parent().unwrap())
            .expect("dir metadata")
            .permissions()
            .mode()
            & 0o777;
        assert_eq!(dir_mode, 0o700);
    }

    #[test]
    fn load_from_returns_none_when_missing() {
        let dir = tempfile::tempdir().expect("tmp dir");
        let path = config_path_for_home(&dir.path().to_string_lossy());
        assert!(load_from(&path).expect("no error").is_none());
    }

    #[test]
    fn config_path_points_to_teleop_dir() {
        let p = config_path_for_home("/home/operator");
        assert!(p.to_string_lossy().contains(".teleop"));
        assert!(p.to_string_lossy().ends_with("config.toml"));
    }

    #[test]
    fn link_config_carries_socket_settings() {
        let cfg = Config {
            host: "10.0.0.7".into(),
            port: 9001,
            write_timeout_ms: 0,
            ..Config::default()
        };
        let link = cfg.link_config();
        assert_eq!(link.addr(), "10.0.0.7:9001");
        assert_eq!(link.connect_timeout, Duration::from_millis(1000));
        assert_eq!(link.write_timeout, None);
    }

    #[test]
    fn tick_interval_never_divides_by_zero() {
        let cfg = Config {
            tick_hz: 0,
            ..Config::default()
        };
        assert_eq!(cfg.tick_interval(), Duration::from_secs(1));
        assert_eq!(Config::default().tick_interval(), Duration::from_secs(1) / 30);
    }

    // The env-override tests share process-wide variables, so they live in
    // one test to avoid racing each other.
    #[test]
    fn apply_env_overrides_updates_and_ignores_invalid() {
        // SAFETY: only this test touches TELEOP_* variables.
        unsafe {
            std::env::set_var("TELEOP_HOST", "robot.local");
            std::env::set_var("TELEOP_PORT", "8100");
            std::env::set_var("TELEOP_TICK_HZ", "not-a-rate");
        }
        let mut cfg = Config::default();
        apply_env_overrides(&mut cfg);
        assert_eq!(cfg.host, "robot.local");
        assert_eq!(cfg.port, 8100);
        assert_eq!(cfg.tick_hz, 30);

        unsafe { std::env::set_var("TELEOP_PORT", "99999") };
        let mut cfg = Config::default();
        apply_env_overrides(&mut cfg);
        assert_eq!(cfg.port, 8000);

        unsafe {
            std::env::remove_var("TELEOP_HOST");
            std::env::remove_var("TELEOP_PORT");
            std::env::remove_var("TELEOP_TICK_HZ");
        }
    }
}
