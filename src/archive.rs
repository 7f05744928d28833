use crate::error::{Error, Result};
use crate::merge::merge_edit;
use crate::operations::ArchiveOperations;
use crate::xml;
use log::{debug, info, warn};
use serde::Serialize;
use std::{
    collections::{HashMap, HashSet},
    fs,
    io::{Read, Write},
    path::{Path, PathBuf},
};
use walkdir::WalkDir;
use zip::write::SimpleFileOptions;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArchiveEntry {
    pub name: String,
    pub order: usize,
    pub content: Vec<u8>,
}

pub trait ArchiveCodec {
    fn read_entries(&self, path: &Path) -> Result<Vec<ArchiveEntry>>;
    fn write_entries(&self, path: &Path, entries: &[ArchiveEntry]) -> Result<()>;
}

/// Archives kept unpacked: the archive path is a directory and every file
/// below it is an entry, ordered by name.
#[derive(Debug, Clone, Copy, Default)]
pub struct UnpackedArchiveCodec;

impl ArchiveCodec for UnpackedArchiveCodec {
    fn read_entries(&self, path: &Path) -> Result<Vec<ArchiveEntry>> {
        let mut files = Vec::new();
        for entry in WalkDir::new(path).follow_links(false).sort_by_file_name() {
            let entry = entry.map_err(|err| {
                let source = err
                    .into_io_error()
                    .unwrap_or_else(|| std::io::Error::other("walk failed"));
                Error::io(path, source)
            })?;
            if !entry.file_type().is_file() {
                continue;
            }
            let relative = entry
                .path()
                .strip_prefix(path)
                .map_err(|err| Error::io(entry.path(), std::io::Error::other(err)))?;
            let name = relative.to_string_lossy().replace('\\', "/");
            let content = fs::read(entry.path()).map_err(|err| Error::io(entry.path(), err))?;
            files.push((name, content));
        }
        Ok(files
            .into_iter()
            .enumerate()
            .map(|(order, (name, content))| ArchiveEntry {
                name,
                order,
                content,
            })
            .collect())
    }

    fn write_entries(&self, path: &Path, entries: &[ArchiveEntry]) -> Result<()> {
        for entry in entries {
            let dest = path.join(&entry.name);
            if let Some(parent) = dest.parent() {
                fs::create_dir_all(parent).map_err(|err| Error::io(parent, err))?;
            }
            let temp = dest.with_extension("vppforge.tmp");
            fs::write(&temp, &entry.content).map_err(|err| Error::io(&temp, err))?;
            fs::rename(&temp, &dest).map_err(|err| Error::io(&dest, err))?;
        }
        Ok(())
    }
}

/// Archives stored as a single zip container, entries in container order.
///
/// Writing rebuilds the whole container with changed entries substituted.
#[derive(Debug, Clone, Copy, Default)]
pub struct ZipArchiveCodec;

impl ArchiveCodec for ZipArchiveCodec {
    fn read_entries(&self, path: &Path) -> Result<Vec<ArchiveEntry>> {
        let file = fs::File::open(path).map_err(|err| Error::io(path, err))?;
        let mut archive = zip::ZipArchive::new(file).map_err(|err| zip_error(path, err))?;
        let mut entries = Vec::with_capacity(archive.len());
        for i in 0..archive.len() {
            let mut file = archive.by_index(i).map_err(|err| zip_error(path, err))?;
            if file.is_dir() {
                continue;
            }
            let mut content = Vec::with_capacity(file.size() as usize);
            file.read_to_end(&mut content)
                .map_err(|err| Error::io(path, err))?;
            entries.push(ArchiveEntry {
                name: file.name().to_string(),
                order: entries.len(),
                content,
            });
        }
        Ok(entries)
    }

    fn write_entries(&self, path: &Path, entries: &[ArchiveEntry]) -> Result<()> {
        let mut changed: HashMap<String, &ArchiveEntry> = entries
            .iter()
            .map(|entry| (entry.name.to_lowercase(), entry))
            .collect();
        let mut all = if path.exists() {
            self.read_entries(path)?
        } else {
            Vec::new()
        };
        for entry in all.iter_mut() {
            if let Some(update) = changed.remove(&entry.name.to_lowercase()) {
                entry.content = update.content.clone();
            }
        }
        let mut added: Vec<&ArchiveEntry> = changed.into_values().collect();
        added.sort_by_key(|entry| entry.order);
        all.extend(added.into_iter().cloned());

        let temp = path.with_extension("vppforge.tmp");
        {
            let file = fs::File::create(&temp).map_err(|err| Error::io(&temp, err))?;
            let mut writer = zip::ZipWriter::new(file);
            let options = SimpleFileOptions::default();
            for entry in &all {
                writer
                    .start_file(entry.name.as_str(), options)
                    .map_err(|err| zip_error(&temp, err))?;
                writer
                    .write_all(&entry.content)
                    .map_err(|err| Error::io(&temp, err))?;
            }
            writer.finish().map_err(|err| zip_error(&temp, err))?;
        }
        fs::rename(&temp, path).map_err(|err| Error::io(path, err))?;
        Ok(())
    }
}

fn zip_error(path: &Path, source: zip::result::ZipError) -> Error {
    Error::Archive {
        path: path.to_path_buf(),
        source,
    }
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct ArchiveReport {
    pub archive: String,
    pub swapped: Vec<String>,
    pub edited: Vec<String>,
    pub missing: Vec<String>,
}

impl ArchiveReport {
    pub fn modified(&self) -> bool {
        !self.swapped.is_empty() || !self.edited.is_empty()
    }
}

/// Runs one archive's operations: per entry, every swap in order, then every
/// edit merged into the parsed tree. The archive is written back once, and
/// only when something changed.
pub fn apply_archive(
    codec: &dyn ArchiveCodec,
    archive_path: &Path,
    operations: &ArchiveOperations,
) -> Result<ArchiveReport> {
    let mut entries = codec.read_entries(archive_path)?;
    let mut report = ArchiveReport {
        archive: operations.archive.clone(),
        ..ArchiveReport::default()
    };
    let mut seen = HashSet::new();
    let mut changed = Vec::new();

    for entry in entries.iter_mut() {
        let key = entry.name.to_lowercase();
        if !operations.touches(&key) {
            continue;
        }
        seen.insert(key.clone());

        if let Some(swaps) = operations.swaps.get(&key) {
            for swap in swaps {
                entry.content =
                    fs::read(&swap.source).map_err(|err| Error::io(&swap.source, err))?;
                debug!("swapped {} from {:?}", swap.path, swap.source);
            }
            report.swapped.push(entry.name.clone());
        }

        if let Some(edits) = operations.edits.get(&key) {
            let mut doc = xml::parse_bytes(&entry.content)?;
            for edit in edits {
                merge_edit(&edit.as_element(), &mut doc.root, edit.action.as_deref())?;
                debug!("merged edit #{} into {}", edit.index, edit.path);
            }
            entry.content = xml::to_bytes(&doc)?;
            report.edited.push(entry.name.clone());
        }
        changed.push(entry.clone());
    }

    for key in operations.entry_keys() {
        if !seen.contains(&key) {
            warn!("{}: no entry named {key}, operations skipped", operations.archive);
            report.missing.push(key);
        }
    }

    if !changed.is_empty() {
        codec.write_entries(archive_path, &changed)?;
        info!(
            "{}: {} entr{} rewritten",
            operations.archive,
            changed.len(),
            if changed.len() == 1 { "y" } else { "ies" }
        );
    }
    Ok(report)
}

pub fn archive_location(game_root: &Path, archive: &str) -> PathBuf {
    game_root.join(archive)
}
