use crate::{backup::BackupStore, game, known::KnownFiles};
use anyhow::{Context, Result};
use directories::BaseDirs;
use serde::{Deserialize, Serialize};
use std::{
    fs,
    path::{Path, PathBuf},
};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    pub game_root: PathBuf,
    pub data_dir: PathBuf,
    /// Uninstall straight to the original release instead of the latest patch.
    #[serde(default)]
    pub rollback_to_vanilla: bool,
}

impl AppConfig {
    pub fn new(game_root: &Path, data_dir: &Path) -> Self {
        Self {
            game_root: game_root.to_path_buf(),
            data_dir: data_dir.to_path_buf(),
            rollback_to_vanilla: false,
        }
    }

    pub fn load_or_create() -> Result<Self> {
        let data_dir = base_data_dir()?;
        fs::create_dir_all(&data_dir).context("create app data dir")?;
        let path = data_dir.join("config.json");
        if path.exists() {
            let raw = fs::read_to_string(&path).context("read app config")?;
            let mut config: AppConfig = serde_json::from_str(&raw).context("parse app config")?;
            if config.data_dir.as_os_str().is_empty() {
                config.data_dir = data_dir;
                config.save()?;
            }
            return Ok(config);
        }

        let game_root = game::detect_game_root().unwrap_or_default();
        let config = AppConfig::new(&game_root, &data_dir);
        config.save()?;
        Ok(config)
    }

    pub fn save(&self) -> Result<()> {
        fs::create_dir_all(&self.data_dir).context("create data dir")?;
        let path = self.data_dir.join("config.json");
        let raw = serde_json::to_string_pretty(self).context("serialize app config")?;
        fs::write(path, raw).context("write app config")?;
        Ok(())
    }

    pub fn backup_root(&self) -> PathBuf {
        self.data_dir.join("backups")
    }

    pub fn known_files_path(&self) -> PathBuf {
        self.data_dir.join("known_files.json")
    }

    pub fn manifest_path(&self) -> PathBuf {
        self.data_dir.join("install_manifest.json")
    }

    pub fn temp_root(&self) -> PathBuf {
        self.data_dir.join("tmp")
    }

    pub fn has_game_root(&self) -> bool {
        !self.game_root.as_os_str().is_empty() && game::looks_like_game_root(&self.game_root)
    }

    pub fn backup_store(&self) -> Result<BackupStore> {
        let known = KnownFiles::load(&self.known_files_path())?;
        Ok(BackupStore::new(&self.game_root, &self.backup_root(), known))
    }
}

fn base_data_dir() -> Result<PathBuf> {
    let base = BaseDirs::new().context("resolve home dir")?;
    Ok(base.data_local_dir().join("vppforge"))
}
