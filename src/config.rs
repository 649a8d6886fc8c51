//! Runtime configuration for the watcher.
//!
//! Everything has a sensible default so the binary runs with nothing but the
//! API credentials set. Live markers can additionally be loaded from a TOML
//! or JSON file:
//! 1) $LIVE_MARKERS_PATH
//! 2) config/live_markers.toml
//! 3) config/live_markers.json
//! 4) built-in defaults

use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::WatchError;
use crate::Result;

const ENV_MARKERS_PATH: &str = "LIVE_MARKERS_PATH";

/// Fallback markers for the title heuristic. Deliberately narrow phrases;
/// a bare "live" would match too many upload titles.
const DEFAULT_LIVE_MARKERS: &[&str] = &["[live]", "live now", "livestream", "🔴"];

#[derive(Debug, Clone)]
pub struct WatchConfig {
    /// Fixed poll interval; a slow cycle skips ticks instead of queueing them.
    pub poll_interval: Duration,
    pub fetch_timeout: Duration,
    pub deliver_timeout: Duration,
    /// Exact-membership capacity of the per-subscription notified set.
    pub notified_window: usize,
    pub live_markers: Vec<String>,
    pub state_path: PathBuf,
}

impl Default for WatchConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_secs(300),
            fetch_timeout: Duration::from_secs(10),
            deliver_timeout: Duration::from_secs(10),
            notified_window: 256,
            live_markers: default_markers(),
            state_path: PathBuf::from("state/subscriptions.json"),
        }
    }
}

impl WatchConfig {
    /// Build from env vars, falling back to defaults for anything unset or
    /// unparsable.
    pub fn from_env() -> Self {
        let defaults = Self::default();

        let live_markers = match load_live_markers_default() {
            Ok(v) if !v.is_empty() => v,
            Ok(_) => defaults.live_markers.clone(),
            Err(e) => {
                tracing::warn!(error = %e, "failed to load live markers, using defaults");
                defaults.live_markers.clone()
            }
        };

        Self {
            poll_interval: env_secs("WATCH_POLL_INTERVAL_SECS", defaults.poll_interval),
            fetch_timeout: env_secs("WATCH_FETCH_TIMEOUT_SECS", defaults.fetch_timeout),
            deliver_timeout: env_secs("WATCH_DELIVER_TIMEOUT_SECS", defaults.deliver_timeout),
            notified_window: std::env::var("WATCH_NOTIFIED_WINDOW")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(defaults.notified_window),
            live_markers,
            state_path: std::env::var("WATCH_STATE_PATH")
                .map(PathBuf::from)
                .unwrap_or(defaults.state_path),
        }
    }
}

fn env_secs(name: &str, default: Duration) -> Duration {
    std::env::var(name)
        .ok()
        .and_then(|v| v.parse().ok())
        .map(Duration::from_secs)
        .unwrap_or(default)
}

fn default_markers() -> Vec<String> {
    DEFAULT_LIVE_MARKERS.iter().map(|s| s.to_string()).collect()
}

/// Load live markers from an explicit path. Supports TOML or JSON.
pub fn load_live_markers_from(path: &Path) -> Result<Vec<String>> {
    let content = std::fs::read_to_string(path)
        .map_err(|e| WatchError::Config(format!("reading {}: {e}", path.display())))?;
    let ext = path
        .extension()
        .and_then(|s| s.to_str())
        .unwrap_or_default()
        .to_ascii_lowercase();
    parse_markers(&content, ext.as_str())
}

/// Load live markers using env var + fallbacks; empty when no file is found.
pub fn load_live_markers_default() -> Result<Vec<String>> {
    if let Ok(p) = std::env::var(ENV_MARKERS_PATH) {
        let pb = PathBuf::from(p);
        if pb.exists() {
            return load_live_markers_from(&pb);
        }
        return Err(WatchError::Config(
            "LIVE_MARKERS_PATH points to non-existent path".to_string(),
        ));
    }
    let toml_p = PathBuf::from("config/live_markers.toml");
    if toml_p.exists() {
        return load_live_markers_from(&toml_p);
    }
    let json_p = PathBuf::from("config/live_markers.json");
    if json_p.exists() {
        return load_live_markers_from(&json_p);
    }
    Ok(Vec::new())
}

fn parse_markers(s: &str, hint_ext: &str) -> Result<Vec<String>> {
    let try_toml = hint_ext == "toml" || s.contains("markers");
    if try_toml {
        if let Ok(v) = parse_toml(s) {
            return Ok(v);
        }
    }
    if let Ok(v) = parse_json(s) {
        return Ok(v);
    }
    if !try_toml {
        if let Ok(v) = parse_toml(s) {
            return Ok(v);
        }
    }
    Err(WatchError::Config(
        "unsupported live markers format".to_string(),
    ))
}

fn parse_toml(s: &str) -> Result<Vec<String>> {
    #[derive(serde::Deserialize)]
    struct MarkersFile {
        markers: Vec<String>,
    }
    let v: MarkersFile =
        toml::from_str(s).map_err(|e| WatchError::Config(format!("toml markers: {e}")))?;
    Ok(clean_list(v.markers))
}

fn parse_json(s: &str) -> Result<Vec<String>> {
    let v: Vec<String> =
        serde_json::from_str(s).map_err(|e| WatchError::Config(format!("json markers: {e}")))?;
    Ok(clean_list(v))
}

fn clean_list(items: Vec<String>) -> Vec<String> {
    use std::collections::BTreeSet;
    let mut set = BTreeSet::new();
    for it in items {
        let t = it.trim();
        if !t.is_empty() {
            set.insert(t.to_string());
        }
    }
    set.into_iter().collect()
}
