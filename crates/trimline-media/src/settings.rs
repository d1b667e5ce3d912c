//! Persistent application settings.
//!
//! Stored as JSON under the platform config directory. The video layer
//! only consumes the cache configuration (applied when a player is
//! constructed); recent files and export defaults belong to whatever
//! shell hosts it.

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::warn;
use trimline_core::{Result, TrimlineError};

use crate::cache::CacheConfig;
use crate::export::{OutputFormat, OutputMode};

/// Bound on the recent-files list.
pub const MAX_RECENT_FILES: usize = 10;

/// Last-used export configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExportDefaults {
    pub format: OutputFormat,
    pub mode: OutputMode,
    pub last_output_dir: Option<PathBuf>,
}

impl Default for ExportDefaults {
    fn default() -> Self {
        Self {
            format: OutputFormat::Mp4,
            mode: OutputMode::SeparateClips,
            last_output_dir: None,
        }
    }
}

/// Application settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// Frame cache configuration
    pub cache: CacheConfig,
    /// Most recently opened files, newest first
    pub recent_files: Vec<PathBuf>,
    /// Last-used export configuration
    pub export: ExportDefaults,
    /// Playback rate used when the source reports none
    pub playback_fps: u32,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            cache: CacheConfig::default(),
            recent_files: Vec::new(),
            export: ExportDefaults::default(),
            playback_fps: 30,
        }
    }
}

impl Settings {
    /// Default settings file location for this platform.
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join("trimline").join("settings.json"))
    }

    /// Load from `path`, falling back to defaults when the file is
    /// missing or unreadable. A corrupt settings file must never stop
    /// the application from starting.
    pub fn load(path: &Path) -> Self {
        let text = match fs::read_to_string(path) {
            Ok(text) => text,
            Err(_) => return Self::default(),
        };
        match serde_json::from_str(&text) {
            Ok(settings) => settings,
            Err(e) => {
                warn!(path = %path.display(), error = %e, "corrupt settings file, using defaults");
                Self::default()
            }
        }
    }

    /// Save to `path`, creating parent directories as needed.
    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }
        let text = serde_json::to_string_pretty(self)
            .map_err(|e| TrimlineError::Serialization(e.to_string()))?;
        fs::write(path, text)?;
        Ok(())
    }

    /// Record a file at the front of the recent list, deduplicated and
    /// capped at [`MAX_RECENT_FILES`].
    pub fn add_recent_file(&mut self, path: impl Into<PathBuf>) {
        let path = path.into();
        self.recent_files.retain(|p| p != &path);
        self.recent_files.insert(0, path);
        self.recent_files.truncate(MAX_RECENT_FILES);
    }

    /// Clear the recent-files list.
    pub fn clear_recent_files(&mut self) {
        self.recent_files.clear();
    }

    /// Cache configuration handed to the playback coordinator.
    pub fn cache_config(&self) -> CacheConfig {
        self.cache
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let settings = Settings::default();
        assert!(settings.cache.enabled);
        assert_eq!(settings.cache.capacity, 150);
        assert!(settings.recent_files.is_empty());
        assert_eq!(settings.export.format, OutputFormat::Mp4);
    }

    #[test]
    fn test_save_and_load_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("settings.json");

        let mut settings = Settings::default();
        settings.cache.capacity = 42;
        settings.cache.enabled = false;
        settings.add_recent_file("/videos/a.mp4");
        settings.export.mode = OutputMode::SingleFile;

        settings.save(&path).unwrap();
        let loaded = Settings::load(&path);
        assert_eq!(loaded, settings);
        assert_eq!(loaded.cache_config().capacity, 42);
    }

    #[test]
    fn test_missing_file_falls_back_to_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let loaded = Settings::load(&dir.path().join("absent.json"));
        assert_eq!(loaded, Settings::default());
    }

    #[test]
    fn test_corrupt_file_falls_back_to_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");
        fs::write(&path, "{not json").unwrap();
        assert_eq!(Settings::load(&path), Settings::default());
    }

    #[test]
    fn test_recent_files_dedup_and_cap() {
        let mut settings = Settings::default();
        for i in 0..15 {
            settings.add_recent_file(format!("/videos/{i}.mp4"));
        }
        assert_eq!(settings.recent_files.len(), MAX_RECENT_FILES);
        assert_eq!(settings.recent_files[0], PathBuf::from("/videos/14.mp4"));

        // Re-opening an existing file moves it to the front
        settings.add_recent_file("/videos/10.mp4");
        assert_eq!(settings.recent_files.len(), MAX_RECENT_FILES);
        assert_eq!(settings.recent_files[0], PathBuf::from("/videos/10.mp4"));

        settings.clear_recent_files();
        assert!(settings.recent_files.is_empty());
    }
}
