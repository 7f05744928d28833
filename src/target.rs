use crate::backup::{normalize_relative, BackupStore};
use crate::error::{Error, Result};
use log::debug;
use std::{
    fs,
    path::{Path, PathBuf},
};

const DISTRIBUTION_FOLDERS: [&str; 2] = ["steam", "gog"];

/// Guesses where a packaged file belongs in the game directory.
///
/// `packaged` is relative to the package's file root. Files that name a
/// shipped file are moved onto it; files that continue a previous mod
/// install keep or adopt the managed path; everything else lands as-is.
pub fn guess_target(store: &BackupStore, packaged: &Path) -> Result<String> {
    let normalized = normalize_relative(&packaged.to_string_lossy());
    let mut segments: Vec<&str> = normalized.split('/').collect();
    if segments.len() > 1
        && DISTRIBUTION_FOLDERS
            .iter()
            .any(|folder| segments[0].eq_ignore_ascii_case(folder))
    {
        segments.remove(0);
    }
    let name = segments.last().copied().unwrap_or_default();

    if segments.len() == 1 {
        if let Some(known) = store
            .known
            .root_file(name)
            .or_else(|| store.known.data_file(name))
        {
            debug!("{normalized} -> known file {known}");
            return Ok(known.to_string());
        }
    } else if segments.len() == 2 && segments[0].eq_ignore_ascii_case("data") {
        if let Some(known) = store.known.data_file(name) {
            debug!("{normalized} -> known data file {known}");
            return Ok(known.to_string());
        }
    }

    let relative = segments.join("/");
    if store.managed_root.join(&relative).exists() {
        return Ok(relative);
    }

    let parent = Path::new(&relative).parent().unwrap_or_else(|| Path::new(""));
    let candidates = paired_candidates(&store.managed_root.join(parent), Path::new(&relative))?;
    match candidates.len() {
        0 => Ok(relative),
        1 => {
            let adopted = normalize_relative(&parent.join(&candidates[0]).to_string_lossy());
            debug!("{normalized} -> paired with managed {adopted}");
            Ok(adopted)
        }
        _ => Err(Error::AmbiguousTarget {
            path: packaged.to_path_buf(),
            candidates: candidates.into_iter().map(|name| parent.join(name)).collect(),
        }),
    }
}

fn paired_candidates(dir: &Path, file: &Path) -> Result<Vec<PathBuf>> {
    let Ok(entries) = fs::read_dir(dir) else {
        return Ok(Vec::new());
    };
    let stem = lower(file.file_stem());
    let extension = lower(file.extension());

    let mut candidates = Vec::new();
    for entry in entries {
        let entry = entry.map_err(|err| Error::io(dir, err))?;
        let path = entry.path();
        if !path.is_file() {
            continue;
        }
        if lower(path.file_stem()) == stem && lower(path.extension()) != extension {
            candidates.push(PathBuf::from(entry.file_name()));
        }
    }
    candidates.sort();
    Ok(candidates)
}

fn lower(part: Option<&std::ffi::OsStr>) -> Option<String> {
    part.map(|value| value.to_string_lossy().to_lowercase())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::known::KnownFiles;
    use tempfile::TempDir;

    fn store(dir: &TempDir) -> BackupStore {
        let known = KnownFiles::from_paths(["rfg.exe"], ["data/misc.vpp_pc", "data/table.vpp_pc"]);
        BackupStore::new(&dir.path().join("game"), &dir.path().join("backups"), known)
    }

    fn mark(store: &BackupStore, relative: &str) {
        let path = store.managed_root.join(relative);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, "").unwrap();
    }

    #[test]
    fn root_files_map_to_known_paths() {
        let dir = TempDir::new().unwrap();
        let store = store(&dir);
        assert_eq!(guess_target(&store, Path::new("misc.vpp_pc")).unwrap(), "data/misc.vpp_pc");
        assert_eq!(guess_target(&store, Path::new("steam/RFG.exe")).unwrap(), "rfg.exe");
        assert_eq!(
            guess_target(&store, Path::new(r"gog\Data\table.vpp_pc")).unwrap(),
            "data/table.vpp_pc"
        );
    }

    #[test]
    fn root_files_win_over_data_files_of_the_same_name() {
        let dir = TempDir::new().unwrap();
        let known = KnownFiles::from_paths(["rfg.exe", "misc.vpp_pc"], ["data/misc.vpp_pc"]);
        let store = BackupStore::new(&dir.path().join("game"), &dir.path().join("backups"), known);
        assert_eq!(guess_target(&store, Path::new("Misc.vpp_pc")).unwrap(), "misc.vpp_pc");
        assert_eq!(
            guess_target(&store, Path::new("data/misc.vpp_pc")).unwrap(),
            "data/misc.vpp_pc"
        );
    }

    #[test]
    fn unknown_files_keep_their_path() {
        let dir = TempDir::new().unwrap();
        let store = store(&dir);
        assert_eq!(
            guess_target(&store, Path::new("data/mods/new.vpp_pc")).unwrap(),
            "data/mods/new.vpp_pc"
        );
        assert_eq!(
            guess_target(&store, Path::new("other/misc.vpp_pc")).unwrap(),
            "other/misc.vpp_pc"
        );
    }

    #[test]
    fn pairs_with_single_managed_file() {
        let dir = TempDir::new().unwrap();
        let store = store(&dir);
        mark(&store, "data/mods/new.vpp_pc");
        assert_eq!(
            guess_target(&store, Path::new("data/mods/new.vpp_pc")).unwrap(),
            "data/mods/new.vpp_pc"
        );
        assert_eq!(
            guess_target(&store, Path::new("data/mods/new.xdelta")).unwrap(),
            "data/mods/new.vpp_pc"
        );
    }

    #[test]
    fn several_pairing_candidates_are_ambiguous() {
        let dir = TempDir::new().unwrap();
        let store = store(&dir);
        mark(&store, "data/mods/new.vpp_pc");
        mark(&store, "data/mods/new.str2_pc");
        assert!(matches!(
            guess_target(&store, Path::new("data/mods/new.xdelta")),
            Err(Error::AmbiguousTarget { candidates, .. }) if candidates.len() == 2
        ));
    }
}
