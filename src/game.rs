use anyhow::{Context, Result};
use std::{
    fs,
    path::{Path, PathBuf},
};

pub const GAME_NAME: &str = "Red Faction Guerrilla Re-Mars-tered";
const STEAM_FOLDERS: [&str; 2] = [
    "Red Faction Guerrilla Re-MARS-tered",
    "Red Faction Guerrilla Re-Mars-tered",
];
const GAME_EXECUTABLES: [&str; 2] = ["rfg.exe", "rfg"];

pub fn detect_game_root() -> Option<PathBuf> {
    let mut candidates = Vec::new();

    if let Some(home) = dirs_home() {
        candidates.push(home.join(".local/share/Steam"));
        candidates.push(home.join(".steam/steam"));
    }

    let mut libraries = Vec::new();
    for base in candidates {
        let vdf = base.join("steamapps/libraryfolders.vdf");
        if vdf.exists() {
            if let Ok(paths) = parse_steam_library_paths(&vdf) {
                libraries.extend(paths);
            }
        }
        libraries.push(base);
    }

    for lib in libraries {
        for folder in STEAM_FOLDERS {
            let candidate = lib.join("steamapps/common").join(folder);
            if looks_like_game_root(&candidate) {
                return Some(candidate);
            }
        }
    }

    None
}

fn parse_steam_library_paths(path: &Path) -> Result<Vec<PathBuf>> {
    let raw = fs::read_to_string(path).context("read libraryfolders.vdf")?;
    let mut paths = Vec::new();

    for line in raw.lines() {
        let line = line.trim();
        if !line.contains("\"path\"") {
            continue;
        }

        let parts: Vec<&str> = line.split('"').collect();
        if parts.len() >= 4 {
            let path = parts[3].replace("\\\\", "\\");
            paths.push(PathBuf::from(path));
        }
    }

    Ok(paths)
}

fn dirs_home() -> Option<PathBuf> {
    std::env::var_os("HOME").map(PathBuf::from)
}

/// A game root holds a `data` folder and the game executable.
pub fn looks_like_game_root(path: &Path) -> bool {
    let has_data = path.join("data").is_dir() || path.join("Data").is_dir();
    has_data
        && GAME_EXECUTABLES
            .iter()
            .any(|exe| path.join(exe).is_file())
}
