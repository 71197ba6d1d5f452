use crate::types::{RequiredFile, Rubric};
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

fn default_points() -> u32 {
    100
}

fn default_difficulty() -> String {
    "beginner".to_string()
}

fn default_time_limit() -> u64 {
    300
}

fn default_time_warning() -> u64 {
    60
}

/// One challenge as authored in `levels/level_NNN.json`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Level {
    pub id: String,
    pub title: String,
    pub mission_log: String,
    pub challenge: String,
    pub starter_code: String,
    pub solution: String,
    pub checker: Rubric,
    #[serde(default)]
    pub hints: Vec<String>,
    #[serde(default = "default_points")]
    pub points: u32,
    #[serde(default = "default_difficulty")]
    pub difficulty: String,
    #[serde(default)]
    pub requires_file: Option<RequiredFile>,
    /// Seconds the player has for this level
    #[serde(default = "default_time_limit")]
    pub time_limit: u64,
    /// Seconds remaining when the countdown warning fires
    #[serde(default = "default_time_warning")]
    pub time_warning: u64,
}

impl Level {
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read {}", path.display()))?;
        serde_json::from_str(&content).with_context(|| format!("Failed to parse {}", path.display()))
    }
}

#[derive(Debug, Clone)]
pub struct LoadError {
    pub path: PathBuf,
    pub message: String,
}

/// Read-only set of levels loaded from a directory
#[derive(Debug, Clone, Default)]
pub struct LevelLoader {
    levels_dir: PathBuf,
    levels: BTreeMap<String, Level>,
    errors: Vec<LoadError>,
}

impl LevelLoader {
    /// Load every `level_*.json` under `levels_dir`
    ///
    /// A missing directory gives an empty loader. Files that fail to parse are
    /// skipped and kept in [`LevelLoader::load_errors`].
    pub fn load(levels_dir: impl Into<PathBuf>) -> Result<Self> {
        let levels_dir = levels_dir.into();
        let mut loader = Self {
            levels_dir: levels_dir.clone(),
            ..Default::default()
        };

        if !levels_dir.exists() {
            warn!(dir = %levels_dir.display(), "Levels directory not found");
            return Ok(loader);
        }

        let mut level_files = Vec::new();
        for entry in fs::read_dir(&levels_dir)
            .with_context(|| format!("Failed to list {}", levels_dir.display()))?
        {
            let path = entry?.path();
            let is_level = path
                .file_name()
                .and_then(|n| n.to_str())
                .map(|n| n.starts_with("level_") && n.ends_with(".json"))
                .unwrap_or(false);
            if is_level {
                level_files.push(path);
            }
        }
        level_files.sort();

        for path in level_files {
            match Level::from_file(&path) {
                Ok(level) => {
                    debug!(level_id = %level.id, path = %path.display(), "Loaded level");
                    loader.levels.insert(level.id.clone(), level);
                }
                Err(e) => {
                    let message = format!("{:#}", e);
                    warn!(path = %path.display(), error = %message, "Skipping level");
                    loader.errors.push(LoadError { path, message });
                }
            }
        }

        Ok(loader)
    }

    pub fn levels_dir(&self) -> &Path {
        &self.levels_dir
    }

    pub fn get_level(&self, level_id: &str) -> Option<&Level> {
        self.levels.get(level_id)
    }

    /// All levels sorted by id
    pub fn all_levels(&self) -> Vec<&Level> {
        self.levels.values().collect()
    }

    pub fn level_count(&self) -> usize {
        self.levels.len()
    }

    pub fn load_errors(&self) -> &[LoadError] {
        &self.errors
    }
}
