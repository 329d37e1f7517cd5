use anyhow::Context;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Daemon configuration: optional TOML file, then `ROLLCALL_*` environment
/// overrides, then defaults.
#[derive(Debug, Clone)]
pub struct Config {
    /// Directory containing ONNX model files.
    pub model_dir: PathBuf,
    /// Path to the SQLite database file.
    pub db_path: PathBuf,
    /// Directory holding uploaded photos and their thumbnails.
    pub media_dir: PathBuf,
    /// Pre-trained classifier gallery (JSON).
    pub gallery_path: PathBuf,
    /// Whether to render a thumbnail for every ingested photo.
    pub thumbnails: bool,
    /// Upper bound on face analysis for one photo.
    pub analyze_timeout_secs: u64,
    /// Reject faces whose nearest gallery sample is farther than this.
    /// Unset: every face is labeled with its nearest identity.
    pub max_match_distance: Option<f32>,
}

/// On-disk form; every key optional.
#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct FileConfig {
    model_dir: Option<PathBuf>,
    db_path: Option<PathBuf>,
    media_dir: Option<PathBuf>,
    gallery_path: Option<PathBuf>,
    thumbnails: Option<bool>,
    analyze_timeout_secs: Option<u64>,
    max_match_distance: Option<f32>,
}

impl Config {
    /// Load from `ROLLCALL_CONFIG` (or `$XDG_CONFIG_HOME/rollcall/config.toml`
    /// when present) and the process environment.
    pub fn load() -> anyhow::Result<Self> {
        let explicit = std::env::var("ROLLCALL_CONFIG").ok().map(PathBuf::from);
        let file = match explicit.or_else(default_config_file).filter(|p| p.exists()) {
            Some(path) => read_file_config(&path)?,
            None => FileConfig::default(),
        };

        Ok(Self::resolve(file, |key| std::env::var(key).ok()))
    }

    fn resolve(file: FileConfig, env: impl Fn(&str) -> Option<String>) -> Self {
        let data_dir = rollcall_core::default_data_dir();

        let path = |key: &str, from_file: Option<PathBuf>, default: PathBuf| -> PathBuf {
            env(key).map(PathBuf::from).or(from_file).unwrap_or(default)
        };

        let model_dir = path("ROLLCALL_MODEL_DIR", file.model_dir, rollcall_core::default_model_dir());
        let gallery_default = model_dir.join("gallery.json");

        Self {
            db_path: path("ROLLCALL_DB_PATH", file.db_path, data_dir.join("photos.db")),
            media_dir: path("ROLLCALL_MEDIA_DIR", file.media_dir, data_dir.join("photos")),
            gallery_path: path("ROLLCALL_GALLERY_PATH", file.gallery_path, gallery_default),
            thumbnails: parsed(&env, "ROLLCALL_THUMBNAILS")
                .map(|Flag(on)| on)
                .or(file.thumbnails)
                .unwrap_or(true),
            analyze_timeout_secs: parsed(&env, "ROLLCALL_ANALYZE_TIMEOUT_SECS")
                .or(file.analyze_timeout_secs)
                .unwrap_or(30),
            max_match_distance: parsed(&env, "ROLLCALL_MAX_MATCH_DISTANCE").or(file.max_match_distance),
            model_dir,
        }
    }

    /// Path to the SCRFD detection model.
    pub fn scrfd_model_path(&self) -> String {
        self.model_dir
            .join("det_10g.onnx")
            .to_string_lossy()
            .into_owned()
    }

    /// Path to the ArcFace recognition model.
    pub fn arcface_model_path(&self) -> String {
        self.model_dir
            .join("w600k_r50.onnx")
            .to_string_lossy()
            .into_owned()
    }

    pub fn analyze_timeout(&self) -> Duration {
        Duration::from_secs(self.analyze_timeout_secs)
    }
}

fn default_config_file() -> Option<PathBuf> {
    let base = std::env::var("XDG_CONFIG_HOME")
        .map(PathBuf::from)
        .or_else(|_| std::env::var("HOME").map(|home| PathBuf::from(home).join(".config")))
        .ok()?;
    Some(base.join("rollcall/config.toml"))
}

fn read_file_config(path: &Path) -> anyhow::Result<FileConfig> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("reading config file {}", path.display()))?;
    let file = toml::from_str(&raw).with_context(|| format!("parsing config file {}", path.display()))?;
    tracing::info!(path = %path.display(), "loaded config file");
    Ok(file)
}

/// Boolean environment value: 1/true/yes/on or 0/false/no/off, any case.
struct Flag(bool);

impl std::str::FromStr for Flag {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "1" | "true" | "yes" | "on" => Ok(Flag(true)),
            "0" | "false" | "no" | "off" => Ok(Flag(false)),
            _ => Err(()),
        }
    }
}

fn parsed<T: std::str::FromStr>(env: &impl Fn(&str) -> Option<String>, key: &str) -> Option<T> {
    let raw = env(key)?;
    match raw.parse() {
        Ok(v) => Some(v),
        Err(_) => {
            tracing::warn!(key, value = %raw, "ignoring unparseable environment override");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn env_of(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_defaults() {
        let config = Config::resolve(FileConfig::default(), env_of(&[]));
        assert!(config.thumbnails);
        assert_eq!(config.analyze_timeout_secs, 30);
        assert_eq!(config.max_match_distance, None);
        assert_eq!(config.gallery_path, config.model_dir.join("gallery.json"));
        assert!(config.scrfd_model_path().ends_with("det_10g.onnx"));
        assert!(config.arcface_model_path().ends_with("w600k_r50.onnx"));
    }

    #[test]
    fn test_file_values() {
        let file: FileConfig = toml::from_str(
            r#"
            model_dir = "/opt/rollcall/models"
            thumbnails = false
            analyze_timeout_secs = 5
            max_match_distance = 1.1
            "#,
        )
        .unwrap();

        let config = Config::resolve(file, env_of(&[]));
        assert_eq!(config.model_dir, PathBuf::from("/opt/rollcall/models"));
        assert_eq!(config.gallery_path, PathBuf::from("/opt/rollcall/models/gallery.json"));
        assert!(!config.thumbnails);
        assert_eq!(config.analyze_timeout(), Duration::from_secs(5));
        assert_eq!(config.max_match_distance, Some(1.1));
    }

    #[test]
    fn test_env_overrides_file() {
        let file: FileConfig = toml::from_str("db_path = \"/srv/file.db\"\nthumbnails = true").unwrap();
        let config = Config::resolve(
            file,
            env_of(&[
                ("ROLLCALL_DB_PATH", "/srv/env.db"),
                ("ROLLCALL_THUMBNAILS", "0"),
                ("ROLLCALL_ANALYZE_TIMEOUT_SECS", "not-a-number"),
            ]),
        );
        assert_eq!(config.db_path, PathBuf::from("/srv/env.db"));
        assert!(!config.thumbnails);
        assert_eq!(config.analyze_timeout_secs, 30);
    }

    #[test]
    fn test_thumbnail_flag_spellings() {
        let thumbnails = |value: &str| {
            Config::resolve(FileConfig::default(), env_of(&[("ROLLCALL_THUMBNAILS", value)])).thumbnails
        };

        for off in ["FALSE", "no", "Off", "0", " false "] {
            assert!(!thumbnails(off), "{off:?}");
        }
        for on in ["TRUE", "yes", "On", "1"] {
            assert!(thumbnails(on), "{on:?}");
        }
    }

    #[test]
    fn test_unrecognized_flag_falls_back_to_file() {
        let file: FileConfig = toml::from_str("thumbnails = false").unwrap();
        let config = Config::resolve(file, env_of(&[("ROLLCALL_THUMBNAILS", "maybe")]));
        assert!(!config.thumbnails);
    }

    #[test]
    fn test_unknown_keys_rejected() {
        assert!(toml::from_str::<FileConfig>("similarity_threshold = 0.4").is_err());
    }
}
