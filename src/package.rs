use crate::modinfo::MODINFO_FILE;
use anyhow::{anyhow, Context, Result};
use filetime::{set_file_mtime, FileTime};
use log::debug;
use std::{
    fs,
    path::{Path, PathBuf},
    sync::atomic::{AtomicUsize, Ordering},
    time::{SystemTime, UNIX_EPOCH},
};
use time::{Date, Month, PrimitiveDateTime, Time as TimeOfDay};
use walkdir::WalkDir;

pub const LOOSE_FILES_DIR: &str = "files";

#[derive(Debug)]
pub struct StagedPackage {
    pub source: PathBuf,
    pub root: PathBuf,
    staging: Option<StagingGuard>,
}

impl StagedPackage {
    pub fn is_extracted(&self) -> bool {
        self.staging.is_some()
    }

    pub fn loose_files(&self) -> Result<Vec<PathBuf>> {
        let Some(base) = find_dir_ignore_case(&self.root, LOOSE_FILES_DIR) else {
            return Ok(Vec::new());
        };
        let mut files = Vec::new();
        for entry in WalkDir::new(&base).follow_links(false).sort_by_file_name() {
            let entry = entry?;
            if !entry.file_type().is_file() {
                continue;
            }
            let rel = entry.path().strip_prefix(&base).context("rel path")?;
            files.push(rel.to_path_buf());
        }
        Ok(files)
    }

    pub fn loose_file_path(&self, relative: &Path) -> PathBuf {
        find_dir_ignore_case(&self.root, LOOSE_FILES_DIR)
            .unwrap_or_else(|| self.root.join(LOOSE_FILES_DIR))
            .join(relative)
    }
}

#[derive(Debug)]
struct StagingGuard {
    path: PathBuf,
}

impl Drop for StagingGuard {
    fn drop(&mut self) {
        if let Err(err) = fs::remove_dir_all(&self.path) {
            debug!("leaving staging dir {:?}: {err}", self.path);
        }
    }
}

pub fn stage_package(path: &Path, temp_root: &Path) -> Result<StagedPackage> {
    if !path.exists() {
        return Err(anyhow!("package not found: {path:?}"));
    }
    if path.is_dir() {
        let root = locate_package_root(path)?;
        return Ok(StagedPackage {
            source: path.to_path_buf(),
            root,
            staging: None,
        });
    }

    let extension = path
        .extension()
        .and_then(|ext| ext.to_str())
        .unwrap_or("")
        .to_ascii_lowercase();
    let temp_dir = make_temp_dir(temp_root, &extension)?;
    let guard = StagingGuard {
        path: temp_dir.clone(),
    };
    match extension.as_str() {
        "zip" => extract_zip(path, &temp_dir)?,
        "7z" => sevenz_rust::decompress_file(path, &temp_dir)
            .with_context(|| format!("extract 7z archive {path:?}"))?,
        _ => return Err(anyhow!("unsupported package format: {path:?}")),
    }
    let root = locate_package_root(&temp_dir)?;
    debug!("staged {path:?} at {root:?}");
    Ok(StagedPackage {
        source: path.to_path_buf(),
        root,
        staging: Some(guard),
    })
}

/// The shallowest folder holding a mod description. Archives often wrap
/// the package in a top-level folder.
fn locate_package_root(dir: &Path) -> Result<PathBuf> {
    let mut candidates: Vec<(PathBuf, usize)> = Vec::new();
    for entry in WalkDir::new(dir).follow_links(false).max_depth(4) {
        let entry = entry?;
        if entry.file_type().is_file()
            && entry
                .file_name()
                .to_string_lossy()
                .eq_ignore_ascii_case(MODINFO_FILE)
        {
            if let Some(parent) = entry.path().parent() {
                candidates.push((parent.to_path_buf(), entry.depth()));
            }
        }
    }
    candidates.sort_by(|a, b| a.1.cmp(&b.1).then_with(|| a.0.cmp(&b.0)));
    candidates
        .into_iter()
        .next()
        .map(|(path, _)| path)
        .ok_or_else(|| anyhow!("no {MODINFO_FILE} found in {dir:?}"))
}

fn find_dir_ignore_case(parent: &Path, name: &str) -> Option<PathBuf> {
    fs::read_dir(parent)
        .ok()?
        .flatten()
        .map(|entry| entry.path())
        .find(|path| {
            path.is_dir()
                && path
                    .file_name()
                    .map(|file| file.to_string_lossy().eq_ignore_ascii_case(name))
                    .unwrap_or(false)
        })
}

fn extract_zip(path: &Path, dest: &Path) -> Result<()> {
    let file = fs::File::open(path).context("open zip")?;
    let mut archive = zip::ZipArchive::new(file).context("read zip")?;

    for i in 0..archive.len() {
        let mut file = archive.by_index(i).context("zip entry")?;
        let Some(out_path) = file.enclosed_name() else {
            continue;
        };

        let out_path = dest.join(out_path);
        if file.is_dir() {
            fs::create_dir_all(&out_path).context("create zip dir")?;
            continue;
        }

        if let Some(parent) = out_path.parent() {
            fs::create_dir_all(parent).context("create zip dir")?;
        }

        let mut out_file = fs::File::create(&out_path).context("write zip entry")?;
        std::io::copy(&mut file, &mut out_file).context("extract zip entry")?;
        if let Some(mtime) = file.last_modified().and_then(zip_time_to_unix) {
            let _ = set_file_mtime(&out_path, FileTime::from_unix_time(mtime, 0));
        }
    }

    Ok(())
}

fn zip_time_to_unix(dt: zip::DateTime) -> Option<i64> {
    let month = Month::try_from(dt.month()).ok()?;
    let date = Date::from_calendar_date(dt.year() as i32, month, dt.day()).ok()?;
    let time = TimeOfDay::from_hms(dt.hour(), dt.minute(), dt.second()).ok()?;
    Some(PrimitiveDateTime::new(date, time).assume_utc().unix_timestamp())
}

static TEMP_COUNTER: AtomicUsize = AtomicUsize::new(0);

fn make_temp_dir(temp_root: &Path, suffix: &str) -> Result<PathBuf> {
    fs::create_dir_all(temp_root).context("create temp root")?;
    let counter = TEMP_COUNTER.fetch_add(1, Ordering::Relaxed);
    let nanos = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_nanos();
    let temp_dir = temp_root.join(format!("package-{nanos}-{counter}-{suffix}"));
    fs::create_dir_all(&temp_dir).context("create temp dir")?;
    Ok(temp_dir)
}
