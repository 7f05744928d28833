use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::{
    collections::BTreeMap,
    fs,
    path::Path,
};

use crate::backup::normalize_relative;

pub const KNOWN_FILES_VERSION: u32 = 1;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct KnownFiles {
    #[serde(default = "default_version")]
    pub version: u32,
    root: BTreeMap<String, String>,
    data: BTreeMap<String, String>,
}

fn default_version() -> u32 {
    KNOWN_FILES_VERSION
}

impl KnownFiles {
    pub fn from_paths<R, D>(root: R, data: D) -> Self
    where
        R: IntoIterator,
        R::Item: AsRef<str>,
        D: IntoIterator,
        D::Item: AsRef<str>,
    {
        let mut known = Self {
            version: KNOWN_FILES_VERSION,
            ..Self::default()
        };
        for path in root {
            insert(&mut known.root, path.as_ref());
        }
        for path in data {
            insert(&mut known.data, path.as_ref());
        }
        known
    }

    /// Records the files directly under the game root and directly under its
    /// `data` folder. Only meaningful on an install no mod has touched yet.
    pub fn scan(game_root: &Path) -> Result<Self> {
        let mut root = Vec::new();
        let mut data = Vec::new();
        for entry in fs::read_dir(game_root).with_context(|| format!("read {game_root:?}"))? {
            let entry = entry.context("read game root entry")?;
            let name = entry.file_name().to_string_lossy().to_string();
            let file_type = entry.file_type().context("stat game root entry")?;
            if file_type.is_file() {
                root.push(name);
            } else if file_type.is_dir() && name.eq_ignore_ascii_case("data") {
                for data_entry in
                    fs::read_dir(entry.path()).with_context(|| format!("read {:?}", entry.path()))?
                {
                    let data_entry = data_entry.context("read data entry")?;
                    if data_entry.file_type().map(|t| t.is_file()).unwrap_or(false) {
                        data.push(format!(
                            "{name}/{}",
                            data_entry.file_name().to_string_lossy()
                        ));
                    }
                }
            }
        }
        Ok(Self::from_paths(root, data))
    }

    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let raw = fs::read_to_string(path).context("read known files")?;
        let known: KnownFiles = serde_json::from_str(&raw).context("parse known files")?;
        Ok(known)
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).context("create known files dir")?;
        }
        let raw = serde_json::to_string_pretty(self).context("serialize known files")?;
        fs::write(path, raw).context("write known files")?;
        Ok(())
    }

    pub fn is_empty(&self) -> bool {
        self.root.is_empty() && self.data.is_empty()
    }

    pub fn len(&self) -> usize {
        self.root.len() + self.data.len()
    }

    pub fn contains(&self, relative: &str) -> bool {
        let relative = normalize_relative(relative).to_lowercase();
        let Some(name) = relative.rsplit('/').next() else {
            return false;
        };
        [&self.root, &self.data].iter().any(|map| {
            map.get(name)
                .map(|path| path.to_lowercase() == relative)
                .unwrap_or(false)
        })
    }

    pub fn root_file(&self, name: &str) -> Option<&str> {
        self.root.get(&name.to_lowercase()).map(String::as_str)
    }

    pub fn data_file(&self, name: &str) -> Option<&str> {
        self.data.get(&name.to_lowercase()).map(String::as_str)
    }
}

fn insert(map: &mut BTreeMap<String, String>, path: &str) {
    let path = normalize_relative(path);
    if let Some(name) = path.rsplit('/').next() {
        map.insert(name.to_lowercase(), path.clone());
    }
}
