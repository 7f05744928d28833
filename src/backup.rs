//! Backup stores and rollback for files in the game directory.
//!
//! Three stores sit next to each other under the tool's data dir:
//!
//! - `vanilla`: the original copy of a shipped file, written once.
//! - `patch`: the latest officially updated copy of a file.
//! - `managed`: zero-length markers for files a mod added to the game.
//!
//! A file's [`FileKind`] is never stored; it is read off these stores each
//! time it is asked for.

use crate::error::{Error, Result};
use crate::known::KnownFiles;
use filetime::{set_file_mtime, FileTime};
use log::{debug, info};
use serde::Serialize;
use std::{
    fs, io,
    path::{Path, PathBuf},
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FileKind {
    Stock,
    FromPatch,
    FromMod,
    Unmanaged,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum RollbackOutcome {
    Restored { from: PathBuf },
    Deleted,
    NothingToRollBack,
}

#[derive(Debug, Clone)]
pub struct BackupStore {
    pub game_root: PathBuf,
    pub vanilla_root: PathBuf,
    pub patch_root: PathBuf,
    pub managed_root: PathBuf,
    pub known: KnownFiles,
}

impl BackupStore {
    pub fn new(game_root: &Path, backup_root: &Path, known: KnownFiles) -> Self {
        Self {
            game_root: game_root.to_path_buf(),
            vanilla_root: backup_root.join("vanilla"),
            patch_root: backup_root.join("patch"),
            managed_root: backup_root.join("managed"),
            known,
        }
    }

    pub fn file(&self, relative: &str) -> GameFile<'_> {
        GameFile {
            store: self,
            relative: normalize_relative(relative),
        }
    }
}

#[derive(Debug, Clone)]
pub struct GameFile<'a> {
    store: &'a BackupStore,
    relative: String,
}

impl GameFile<'_> {
    pub fn relative(&self) -> &str {
        &self.relative
    }

    pub fn live_path(&self) -> PathBuf {
        self.store.game_root.join(&self.relative)
    }

    pub fn vanilla_backup_path(&self) -> PathBuf {
        self.store.vanilla_root.join(&self.relative)
    }

    pub fn patch_backup_path(&self) -> PathBuf {
        self.store.patch_root.join(&self.relative)
    }

    pub fn managed_path(&self) -> PathBuf {
        self.store.managed_root.join(&self.relative)
    }

    pub fn is_known(&self) -> bool {
        self.store.known.contains(&self.relative)
    }

    /// Known-ness wins over any backup store content.
    pub fn kind(&self) -> FileKind {
        if self.is_known() {
            FileKind::Stock
        } else if self.patch_backup_path().exists() {
            FileKind::FromPatch
        } else if self.managed_path().exists() {
            FileKind::FromMod
        } else {
            FileKind::Unmanaged
        }
    }

    /// Records the file before it is modified.
    ///
    /// Files new to the game get a marker in the managed store; shipped and
    /// updated files are copied into the vanilla or patch store. Returns the
    /// store location, or `None` when there is no live file to back up.
    pub fn copy_to_backup(&self, overwrite: bool, is_update: bool) -> Result<Option<PathBuf>> {
        let known = self.is_known();
        if !known && !is_update {
            let marker = self.managed_path();
            create_parent(&marker)?;
            fs::write(&marker, []).map_err(|err| Error::io(&marker, err))?;
            debug!("marked {} as mod-managed", self.relative);
            return Ok(Some(marker));
        }

        let live = self.live_path();
        if !live.exists() {
            return Ok(None);
        }

        let vanilla = self.vanilla_backup_path();
        let dest = if known && (!vanilla.exists() || !is_update) {
            vanilla.clone()
        } else {
            self.patch_backup_path()
        };

        if dest.exists() {
            if !overwrite {
                return Ok(Some(dest));
            }
            if dest == vanilla && holds_content(&vanilla) {
                return Err(Error::VanillaBackupOverwrite(vanilla));
            }
            fs::remove_file(&dest).map_err(|err| Error::io(&dest, err))?;
        } else {
            create_parent(&dest)?;
        }
        copy_preserving_mtime(&live, &dest)?;
        info!("backed up {} to {:?}", self.relative, dest);
        Ok(Some(dest))
    }

    /// Restores the file to its pre-mod state and forgets the managed marker.
    ///
    /// With `vanilla` set, shipped files go back to the original release and
    /// files added by updates are removed.
    pub fn rollback(&self, vanilla: bool) -> Result<RollbackOutcome> {
        let live = self.live_path();
        let outcome = match self.kind() {
            FileKind::Stock => {
                let source = if vanilla {
                    self.vanilla_backup_path()
                } else {
                    self.nearest_backup()
                };
                if source.exists() {
                    copy_preserving_mtime(&source, &live)?;
                    RollbackOutcome::Restored { from: source }
                } else {
                    RollbackOutcome::NothingToRollBack
                }
            }
            FileKind::FromPatch if vanilla => remove_if_exists(&live)?,
            FileKind::FromPatch => {
                let source = self.patch_backup_path();
                if !source.exists() {
                    return Err(Error::MissingPatchBackup(source));
                }
                copy_preserving_mtime(&source, &live)?;
                RollbackOutcome::Restored { from: source }
            }
            FileKind::FromMod => remove_if_exists(&live)?,
            FileKind::Unmanaged => return Err(Error::UnmanagedRollback(live)),
        };
        let marker = self.managed_path();
        if let Err(err) = fs::remove_file(&marker) {
            if err.kind() != io::ErrorKind::NotFound {
                return Err(Error::io(&marker, err));
            }
        }
        debug!("rolled back {}: {:?}", self.relative, outcome);
        Ok(outcome)
    }

    fn nearest_backup(&self) -> PathBuf {
        let patch = self.patch_backup_path();
        if patch.exists() {
            patch
        } else {
            self.vanilla_backup_path()
        }
    }
}

/// Game-relative paths use `/` and never start with one.
pub fn normalize_relative(relative: &str) -> String {
    relative
        .replace('\\', "/")
        .split('/')
        .filter(|segment| !segment.is_empty() && *segment != ".")
        .collect::<Vec<_>>()
        .join("/")
}

fn holds_content(path: &Path) -> bool {
    fs::metadata(path)
        .map(|meta| meta.len() > 0)
        .unwrap_or(false)
}

fn remove_if_exists(path: &Path) -> Result<RollbackOutcome> {
    match fs::remove_file(path) {
        Ok(()) => Ok(RollbackOutcome::Deleted),
        Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(RollbackOutcome::Deleted),
        Err(err) => Err(Error::io(path, err)),
    }
}

fn create_parent(path: &Path) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).map_err(|err| Error::io(parent, err))?;
    }
    Ok(())
}

pub(crate) fn copy_preserving_mtime(source: &Path, dest: &Path) -> Result<()> {
    create_parent(dest)?;
    fs::copy(source, dest).map_err(|err| Error::io(dest, err))?;
    if let Ok(modified) = fs::metadata(source).and_then(|meta| meta.modified()) {
        let _ = set_file_mtime(dest, FileTime::from_system_time(modified));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    struct Fixture {
        _dir: TempDir,
        store: BackupStore,
    }

    fn fixture() -> Fixture {
        let dir = TempDir::new().unwrap();
        let game_root = dir.path().join("game");
        fs::create_dir_all(game_root.join("data")).unwrap();
        let known = KnownFiles::from_paths(["rfg.exe"], ["data/misc.vpp_pc"]);
        let store = BackupStore::new(&game_root, &dir.path().join("backups"), known);
        Fixture { _dir: dir, store }
    }

    fn write(path: &Path, content: &str) {
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, content).unwrap();
    }

    #[test]
    fn known_files_are_always_stock() {
        let fx = fixture();
        let file = fx.store.file("data/misc.vpp_pc");
        assert_eq!(file.kind(), FileKind::Stock);
        write(&file.patch_backup_path(), "patched");
        write(&file.managed_path(), "");
        assert_eq!(file.kind(), FileKind::Stock);
        assert_eq!(fx.store.file(r"DATA\Misc.vpp_pc").kind(), FileKind::Stock);
    }

    #[test]
    fn kind_follows_store_priority() {
        let fx = fixture();
        let file = fx.store.file("data/new.vpp_pc");
        assert_eq!(file.kind(), FileKind::Unmanaged);
        write(&file.managed_path(), "");
        assert_eq!(file.kind(), FileKind::FromMod);
        write(&file.patch_backup_path(), "patched");
        assert_eq!(file.kind(), FileKind::FromPatch);
    }

    #[test]
    fn mod_files_only_get_a_marker() {
        let fx = fixture();
        let file = fx.store.file("data/added.vpp_pc");
        write(&file.live_path(), "mod content");
        let location = file.copy_to_backup(true, false).unwrap();
        assert_eq!(location, Some(file.managed_path()));
        assert_eq!(fs::metadata(file.managed_path()).unwrap().len(), 0);
        assert!(!file.vanilla_backup_path().exists());
        assert!(!file.patch_backup_path().exists());
    }

    #[test]
    fn missing_live_file_is_a_no_op() {
        let fx = fixture();
        let file = fx.store.file("data/misc.vpp_pc");
        assert_eq!(file.copy_to_backup(false, true).unwrap(), None);
        assert!(!file.vanilla_backup_path().exists());
    }

    #[test]
    fn vanilla_backup_is_written_once() {
        let fx = fixture();
        let file = fx.store.file("data/misc.vpp_pc");
        write(&file.live_path(), "vanilla");
        assert_eq!(
            file.copy_to_backup(false, false).unwrap(),
            Some(file.vanilla_backup_path())
        );

        write(&file.live_path(), "modded");
        file.copy_to_backup(false, false).unwrap();
        assert_eq!(
            fs::read_to_string(file.vanilla_backup_path()).unwrap(),
            "vanilla"
        );
        assert!(matches!(
            file.copy_to_backup(true, false),
            Err(Error::VanillaBackupOverwrite(_))
        ));
    }

    #[test]
    fn updates_go_to_the_patch_store() {
        let fx = fixture();
        let known = fx.store.file("data/misc.vpp_pc");
        write(&known.live_path(), "vanilla");
        known.copy_to_backup(false, true).unwrap();
        write(&known.live_path(), "patch 1");
        assert_eq!(
            known.copy_to_backup(true, true).unwrap(),
            Some(known.patch_backup_path())
        );
        write(&known.live_path(), "patch 2");
        known.copy_to_backup(true, true).unwrap();
        assert_eq!(fs::read_to_string(known.patch_backup_path()).unwrap(), "patch 2");
        assert_eq!(fs::read_to_string(known.vanilla_backup_path()).unwrap(), "vanilla");

        let added = fx.store.file("data/dlc.vpp_pc");
        write(&added.live_path(), "dlc");
        assert_eq!(
            added.copy_to_backup(false, true).unwrap(),
            Some(added.patch_backup_path())
        );
        assert_eq!(added.kind(), FileKind::FromPatch);
    }

    #[test]
    fn stock_rollback_prefers_requested_backup() {
        let fx = fixture();
        let file = fx.store.file("data/misc.vpp_pc");
        write(&file.vanilla_backup_path(), "vanilla");
        write(&file.patch_backup_path(), "patched");
        write(&file.live_path(), "modded");

        file.rollback(false).unwrap();
        assert_eq!(fs::read_to_string(file.live_path()).unwrap(), "patched");
        file.rollback(true).unwrap();
        assert_eq!(fs::read_to_string(file.live_path()).unwrap(), "vanilla");
    }

    #[test]
    fn stock_rollback_without_backup_is_soft() {
        let fx = fixture();
        let file = fx.store.file("rfg.exe");
        write(&file.live_path(), "exe");
        assert_eq!(file.rollback(true).unwrap(), RollbackOutcome::NothingToRollBack);
        assert_eq!(fs::read_to_string(file.live_path()).unwrap(), "exe");
    }

    #[test]
    fn vanilla_rollback_is_idempotent() {
        let fx = fixture();
        let stock = fx.store.file("data/misc.vpp_pc");
        write(&stock.vanilla_backup_path(), "vanilla");
        write(&stock.live_path(), "modded");
        let patched = fx.store.file("data/dlc.vpp_pc");
        write(&patched.patch_backup_path(), "dlc");
        write(&patched.live_path(), "modded dlc");

        for file in [&stock, &patched] {
            let first = file.rollback(true).unwrap();
            let after_first = fs::read(file.live_path()).ok();
            let second = file.rollback(true).unwrap();
            assert_eq!(first, second);
            assert_eq!(fs::read(file.live_path()).ok(), after_first);
        }
        assert_eq!(fs::read_to_string(stock.live_path()).unwrap(), "vanilla");
        assert!(!patched.live_path().exists());
    }

    #[test]
    fn from_patch_rollback_restores_patch_copy() {
        let fx = fixture();
        let file = fx.store.file("data/dlc.vpp_pc");
        write(&file.patch_backup_path(), "dlc");
        write(&file.live_path(), "modded");
        write(&file.managed_path(), "");
        let outcome = file.rollback(false).unwrap();
        assert_eq!(
            outcome,
            RollbackOutcome::Restored {
                from: file.patch_backup_path()
            }
        );
        assert_eq!(fs::read_to_string(file.live_path()).unwrap(), "dlc");
        assert!(!file.managed_path().exists());
    }

    #[test]
    fn mod_file_rollback_deletes_and_unmarks() {
        let fx = fixture();
        let file = fx.store.file("data/added.vpp_pc");
        write(&file.live_path(), "mod");
        file.copy_to_backup(false, false).unwrap();
        assert_eq!(file.rollback(false).unwrap(), RollbackOutcome::Deleted);
        assert!(!file.live_path().exists());
        assert!(!file.managed_path().exists());
        assert_eq!(file.kind(), FileKind::Unmanaged);
        assert!(matches!(
            file.rollback(false),
            Err(Error::UnmanagedRollback(_))
        ));
    }

    #[test]
    fn mod_file_rollback_tolerates_a_deleted_live_file() {
        let fx = fixture();
        let file = fx.store.file("data/added.vpp_pc");
        write(&file.live_path(), "mod");
        file.copy_to_backup(false, false).unwrap();
        fs::remove_file(file.live_path()).unwrap();
        assert_eq!(file.kind(), FileKind::FromMod);
        assert_eq!(file.rollback(true).unwrap(), RollbackOutcome::Deleted);
        assert!(!file.managed_path().exists());
    }
}
