use crate::archive::{apply_archive, archive_location, ArchiveCodec, ArchiveReport};
use crate::backup::{copy_preserving_mtime, normalize_relative, BackupStore, FileKind, RollbackOutcome};
use crate::config::AppConfig;
use crate::modinfo::ModInfo;
use crate::operations::{group_by_vpp, partition};
use crate::options::{Input, SelectionMap};
use crate::package::{stage_package, StagedPackage};
use crate::target::guess_target;
use anyhow::{anyhow, bail, Context, Result};
use log::{info, warn};
use serde::{Deserialize, Serialize};
use std::{
    collections::HashSet,
    fs,
    path::{Path, PathBuf},
};
use time::{format_description::well_known::Rfc3339, OffsetDateTime};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Choice {
    Index(usize),
    Custom(String),
}

#[derive(Debug, Clone, Default)]
pub struct Selections {
    choices: Vec<(String, Choice)>,
}

impl Selections {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn select(&mut self, input: &str, index: usize) {
        self.set(input, Choice::Index(index));
    }

    pub fn custom(&mut self, input: &str, value: &str) {
        self.set(input, Choice::Custom(value.to_string()));
    }

    pub fn push_index_arg(&mut self, raw: &str) -> Result<()> {
        let (name, value) = split_arg(raw)?;
        let index = value
            .trim()
            .parse::<usize>()
            .with_context(|| format!("selection `{raw}`: expected an option index"))?;
        self.select(name, index);
        Ok(())
    }

    pub fn push_custom_arg(&mut self, raw: &str) -> Result<()> {
        let (name, value) = split_arg(raw)?;
        self.custom(name, value);
        Ok(())
    }

    pub fn apply(&self, inputs: &mut [Input]) -> crate::Result<Vec<String>> {
        let mut used = Vec::new();
        for (name, choice) in &self.choices {
            let Some(input) = inputs
                .iter_mut()
                .find(|input| input.name.eq_ignore_ascii_case(name))
            else {
                continue;
            };
            match choice {
                Choice::Index(index) => input.select(*index)?,
                Choice::Custom(value) => input.set_custom(value)?,
            }
            used.push(name.clone());
        }
        Ok(used)
    }

    fn set(&mut self, input: &str, choice: Choice) {
        let input = input.trim().to_string();
        self.choices
            .retain(|(name, _)| !name.eq_ignore_ascii_case(&input));
        self.choices.push((input, choice));
    }
}

fn split_arg(raw: &str) -> Result<(&str, &str)> {
    match raw.split_once('=') {
        Some((name, value)) if !name.trim().is_empty() => Ok((name.trim(), value)),
        _ => Err(anyhow!("selection `{raw}`: expected name=value")),
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct InstallManifest {
    #[serde(default)]
    pub installed_at: Option<String>,
    #[serde(default)]
    pub mods: Vec<String>,
    #[serde(default)]
    pub files: Vec<InstalledFile>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InstalledFile {
    pub path: String,
    pub hash: String,
}

impl InstallManifest {
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let raw = fs::read_to_string(path).context("read install manifest")?;
        let manifest = serde_json::from_str(&raw).context("parse install manifest")?;
        Ok(manifest)
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        let raw = serde_json::to_string_pretty(self).context("serialize install manifest")?;
        write_atomic_text(path, &raw)
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }

    pub fn contains(&self, relative: &str) -> bool {
        let relative = normalize_relative(relative).to_lowercase();
        self.files
            .iter()
            .any(|file| file.path.to_lowercase() == relative)
    }
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct InstallReport {
    pub mods: Vec<String>,
    pub rolled_back: usize,
    pub archives: Vec<ArchiveReport>,
    pub loose_files: Vec<String>,
    pub warnings: Vec<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct RolledBackFile {
    pub path: String,
    #[serde(flatten)]
    pub outcome: RollbackOutcome,
}

#[derive(Debug, Clone, Serialize)]
pub struct FileStatus {
    pub path: String,
    pub kind: FileKind,
    pub intact: Option<bool>,
}

/// Installs `packages` in order, replacing whatever the last install put in
/// place. Operation indices run across packages in the order given.
pub fn install_mods(
    config: &AppConfig,
    packages: &[PathBuf],
    selections: &Selections,
    codec: &dyn ArchiveCodec,
) -> Result<InstallReport> {
    let store = config.backup_store()?;
    if store.known.is_empty() {
        bail!("no known game files recorded; run `vppforge init` on an unmodded install first");
    }

    let staged = packages
        .iter()
        .map(|path| stage_package(path, &config.temp_root()))
        .collect::<Result<Vec<StagedPackage>>>()?;

    let mut report = InstallReport::default();
    let mut operations = Vec::new();
    let mut used = HashSet::new();
    for package in &staged {
        let modinfo = ModInfo::load(&package.root)
            .with_context(|| format!("load mod description from {:?}", package.source))?;
        let mut inputs = modinfo.resolve_inputs()?;
        for name in selections.apply(&mut inputs)? {
            used.insert(name.to_lowercase());
        }
        let selection_map = SelectionMap::build(&inputs)?;
        operations.extend(
            modinfo
                .operations(&selection_map, operations.len())
                .with_context(|| format!("prepare changes of {}", modinfo.name))?,
        );
        report.mods.push(modinfo.name);
    }
    for (name, _) in &selections.choices {
        if !used.contains(&name.to_lowercase()) {
            bail!("no package declares a user input named `{name}`");
        }
    }

    let manifest_path = config.manifest_path();
    let previous = InstallManifest::load(&manifest_path)?;
    if !previous.is_empty() {
        report.rolled_back = roll_back_files(&store, &previous, false)?.len();
        InstallManifest::default().save(&manifest_path)?;
    }

    let (swaps, edits) = partition(operations);
    let groups = group_by_vpp(swaps, edits);

    let mut touched = Vec::new();
    let applied = apply_packages(&store, &staged, &groups, codec, &mut touched, &mut report);
    if let Err(err) = applied {
        warn!("install failed, rolling back {} file(s)", touched.len());
        for relative in touched.iter().rev() {
            if let Err(rollback_err) = store.file(relative).rollback(false) {
                warn!("rollback of {relative} failed: {rollback_err}");
            }
        }
        return Err(err);
    }

    let mut manifest = InstallManifest {
        installed_at: OffsetDateTime::now_utc().format(&Rfc3339).ok(),
        mods: report.mods.clone(),
        files: Vec::with_capacity(touched.len()),
    };
    for relative in touched {
        let hash = hash_file(&store.file(&relative).live_path())?;
        manifest.files.push(InstalledFile {
            path: relative,
            hash,
        });
    }
    manifest.save(&manifest_path)?;
    info!(
        "installed {} mod(s), {} file(s) touched",
        manifest.mods.len(),
        manifest.files.len()
    );
    Ok(report)
}

/// Loose files first, so archive edits land on top of replaced archives.
fn apply_packages(
    store: &BackupStore,
    staged: &[StagedPackage],
    groups: &crate::operations::OperationGroups,
    codec: &dyn ArchiveCodec,
    touched: &mut Vec<String>,
    report: &mut InstallReport,
) -> Result<()> {
    let mut seen = HashSet::new();

    for package in staged {
        for packaged in package.loose_files()? {
            let relative = guess_target(store, &packaged)?;
            let file = store.file(&relative);
            file.copy_to_backup(false, false)?;
            if seen.insert(file.relative().to_lowercase()) {
                touched.push(file.relative().to_string());
            }
            copy_preserving_mtime(&package.loose_file_path(&packaged), &file.live_path())?;
            report.loose_files.push(file.relative().to_string());
        }
    }

    for operations in groups.values() {
        let file = store.file(&operations.archive);
        let archive_path = archive_location(&store.game_root, file.relative());
        if !archive_path.exists() {
            let message = format!(
                "{}: archive not found, {} operation(s) skipped",
                operations.archive,
                operations.operation_count()
            );
            warn!("{message}");
            report.warnings.push(message);
            continue;
        }
        file.copy_to_backup(false, false)?;
        if seen.insert(file.relative().to_lowercase()) {
            touched.push(file.relative().to_string());
        }
        let archive_report = apply_archive(codec, &archive_path, operations)
            .with_context(|| format!("apply changes to {}", operations.archive))?;
        for missing in &archive_report.missing {
            report
                .warnings
                .push(format!("{}: no entry named {missing}", operations.archive));
        }
        report.archives.push(archive_report);
    }
    Ok(())
}

/// Rolls back every file of the last install, newest first, then forgets it.
pub fn uninstall(config: &AppConfig, vanilla: bool) -> Result<Vec<RolledBackFile>> {
    let store = config.backup_store()?;
    let manifest_path = config.manifest_path();
    let manifest = InstallManifest::load(&manifest_path)?;
    if manifest.is_empty() {
        return Ok(Vec::new());
    }
    let rolled_back = roll_back_files(&store, &manifest, vanilla)?;
    InstallManifest::default().save(&manifest_path)?;
    info!("rolled back {} file(s)", rolled_back.len());
    Ok(rolled_back)
}

fn roll_back_files(
    store: &BackupStore,
    manifest: &InstallManifest,
    vanilla: bool,
) -> Result<Vec<RolledBackFile>> {
    let mut rolled_back = Vec::with_capacity(manifest.files.len());
    for installed in manifest.files.iter().rev() {
        let outcome = store
            .file(&installed.path)
            .rollback(vanilla)
            .with_context(|| format!("roll back {}", installed.path))?;
        rolled_back.push(RolledBackFile {
            path: installed.path.clone(),
            outcome,
        });
    }
    Ok(rolled_back)
}

pub fn record_update(config: &AppConfig, paths: &[String]) -> Result<Vec<(String, Option<PathBuf>)>> {
    let store = config.backup_store()?;
    let manifest = InstallManifest::load(&config.manifest_path())?;
    let mut recorded = Vec::with_capacity(paths.len());
    for path in paths {
        if manifest.contains(path) {
            bail!("{path} is modified by installed mods; uninstall before recording updates");
        }
        let file = store.file(path);
        let location = file
            .copy_to_backup(true, true)
            .with_context(|| format!("record update of {path}"))?;
        if location.is_none() {
            warn!("{path}: no live file to record");
        }
        recorded.push((file.relative().to_string(), location));
    }
    Ok(recorded)
}

pub fn status(config: &AppConfig) -> Result<Vec<FileStatus>> {
    let store = config.backup_store()?;
    let manifest = InstallManifest::load(&config.manifest_path())?;
    let mut statuses = Vec::with_capacity(manifest.files.len());
    for installed in &manifest.files {
        let file = store.file(&installed.path);
        let live = file.live_path();
        let intact = if live.is_file() {
            Some(hash_file(&live)? == installed.hash)
        } else {
            None
        };
        statuses.push(FileStatus {
            path: installed.path.clone(),
            kind: file.kind(),
            intact,
        });
    }
    Ok(statuses)
}

fn hash_file(path: &Path) -> Result<String> {
    let bytes = fs::read(path).with_context(|| format!("read {path:?}"))?;
    Ok(blake3::hash(&bytes).to_hex().to_string())
}

fn write_atomic_text(path: &Path, contents: &str) -> Result<()> {
    let parent = path.parent().context("manifest parent")?;
    fs::create_dir_all(parent).context("create manifest dir")?;
    let file_name = path.file_name().context("manifest filename")?;
    let mut temp_name = std::ffi::OsString::from(file_name);
    temp_name.push(".tmp");
    let temp_path = parent.join(temp_name);
    fs::write(&temp_path, contents).context("write manifest temp")?;
    fs::rename(&temp_path, path).context("finalize manifest")?;
    Ok(())
}
