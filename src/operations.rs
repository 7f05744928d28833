use crate::error::{Error, Result};
use crate::xml::{XmlElement, XmlNode};
use serde::Serialize;
use std::collections::BTreeMap;
use std::fmt;
use std::path::PathBuf;

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct VppPath {
    pub archive: String,
    pub file: String,
}

impl VppPath {
    pub fn new(archive: &str, file: &str) -> Self {
        Self {
            archive: normalize_separators(archive),
            file: normalize_separators(file),
        }
    }

    /// Splits a mod file attribute at the first `*.vpp*` segment.
    pub fn parse(raw: &str) -> Result<Self> {
        let normalized = normalize_separators(raw.trim());
        let segments: Vec<&str> = normalized.split('/').filter(|s| !s.is_empty()).collect();
        let archive_end = segments
            .iter()
            .position(|segment| is_archive_segment(segment))
            .ok_or_else(|| Error::InvalidVppPath(raw.to_string()))?;
        if archive_end + 1 >= segments.len() {
            return Err(Error::InvalidVppPath(raw.to_string()));
        }
        Ok(Self {
            archive: segments[..=archive_end].join("/"),
            file: segments[archive_end + 1..].join("/"),
        })
    }

    pub fn archive_key(&self) -> String {
        self.archive.to_lowercase()
    }

    pub fn file_key(&self) -> String {
        self.file.to_lowercase()
    }
}

impl fmt::Display for VppPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.archive, self.file)
    }
}

fn normalize_separators(value: &str) -> String {
    value.replace('\\', "/").trim_matches('/').to_string()
}

fn is_archive_segment(segment: &str) -> bool {
    segment
        .rsplit_once('.')
        .map(|(_, ext)| ext.to_ascii_lowercase().starts_with("vpp"))
        .unwrap_or(false)
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileSwap {
    pub index: usize,
    pub path: VppPath,
    pub source: PathBuf,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct XmlEdit {
    pub index: usize,
    pub path: VppPath,
    pub action: Option<String>,
    pub fragment: Vec<XmlNode>,
}

impl XmlEdit {
    pub fn as_element(&self) -> XmlElement {
        let mut element = XmlElement::new("Edit");
        element.children = self.fragment.clone();
        element
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Operation {
    FileSwap(FileSwap),
    XmlEdit(XmlEdit),
}

impl Operation {
    pub fn index(&self) -> usize {
        match self {
            Operation::FileSwap(swap) => swap.index,
            Operation::XmlEdit(edit) => edit.index,
        }
    }

    pub fn path(&self) -> &VppPath {
        match self {
            Operation::FileSwap(swap) => &swap.path,
            Operation::XmlEdit(edit) => &edit.path,
        }
    }
}

pub fn partition(operations: Vec<Operation>) -> (Vec<FileSwap>, Vec<XmlEdit>) {
    let mut swaps = Vec::new();
    let mut edits = Vec::new();
    for operation in operations {
        match operation {
            Operation::FileSwap(swap) => swaps.push(swap),
            Operation::XmlEdit(edit) => edits.push(edit),
        }
    }
    (swaps, edits)
}

#[derive(Debug, Clone, Default)]
pub struct ArchiveOperations {
    pub archive: String,
    pub swaps: BTreeMap<String, Vec<FileSwap>>,
    pub edits: BTreeMap<String, Vec<XmlEdit>>,
}

impl ArchiveOperations {
    pub fn touches(&self, entry_key: &str) -> bool {
        self.swaps.contains_key(entry_key) || self.edits.contains_key(entry_key)
    }

    pub fn entry_keys(&self) -> Vec<String> {
        let mut keys: Vec<String> = self.swaps.keys().chain(self.edits.keys()).cloned().collect();
        keys.sort();
        keys.dedup();
        keys
    }

    pub fn operation_count(&self) -> usize {
        self.swaps.values().map(Vec::len).sum::<usize>()
            + self.edits.values().map(Vec::len).sum::<usize>()
    }
}

/// Archive key to its operations. One archive is read and written once no
/// matter how many mods or entries touch it.
pub type OperationGroups = BTreeMap<String, ArchiveOperations>;

pub fn group_by_vpp(swaps: Vec<FileSwap>, edits: Vec<XmlEdit>) -> OperationGroups {
    let mut groups = OperationGroups::new();

    for swap in swaps {
        let group = groups
            .entry(swap.path.archive_key())
            .or_insert_with(|| ArchiveOperations {
                archive: swap.path.archive.clone(),
                ..ArchiveOperations::default()
            });
        group.swaps.entry(swap.path.file_key()).or_default().push(swap);
    }
    for edit in edits {
        let group = groups
            .entry(edit.path.archive_key())
            .or_insert_with(|| ArchiveOperations {
                archive: edit.path.archive.clone(),
                ..ArchiveOperations::default()
            });
        group.edits.entry(edit.path.file_key()).or_default().push(edit);
    }

    for group in groups.values_mut() {
        for bucket in group.swaps.values_mut() {
            bucket.sort_by_key(|swap| swap.index);
        }
        for bucket in group.edits.values_mut() {
            bucket.sort_by_key(|edit| edit.index);
        }
    }
    groups
}
