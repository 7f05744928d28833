use crate::error::{Error, Result};
use crate::merge::LIST_ACTION;
use crate::operations::{FileSwap, Operation, VppPath, XmlEdit};
use crate::options::{resolve_inputs, Input, InputDecl, ModOption, SelectionMap};
use crate::user_input::resolve_user_input;
use crate::xml::{self, XmlElement};
use log::warn;
use std::{
    fs,
    path::{Path, PathBuf},
};

pub const MODINFO_FILE: &str = "modinfo.xml";

#[derive(Debug, Clone)]
pub enum Change {
    Edit {
        path: VppPath,
        action: Option<String>,
        fragment: XmlElement,
    },
    Replace {
        path: VppPath,
        source: PathBuf,
    },
}

#[derive(Debug, Clone)]
pub struct ModInfo {
    pub name: String,
    pub author: Option<String>,
    pub description: Option<String>,
    pub root: PathBuf,
    pub changes: Vec<Change>,
    pub inputs: Vec<InputDecl>,
}

impl ModInfo {
    pub fn load(root: &Path) -> Result<Self> {
        let path = find_modinfo(root)
            .ok_or_else(|| Error::InvalidModInfo(format!("no {MODINFO_FILE} in {root:?}")))?;
        let bytes = fs::read(&path).map_err(|err| Error::io(&path, err))?;
        let doc = xml::parse_bytes(&bytes)?;
        Self::from_element(&doc.root, root)
    }

    pub fn from_element(element: &XmlElement, root: &Path) -> Result<Self> {
        if !element.name.eq_ignore_ascii_case("ModInfo") {
            return Err(Error::InvalidModInfo(format!(
                "expected <ModInfo> root, found <{}>",
                element.name
            )));
        }
        let name = element
            .attribute_ignore_case("Name")
            .map(str::to_string)
            .or_else(|| {
                root.file_name()
                    .map(|name| name.to_string_lossy().to_string())
            })
            .unwrap_or_else(|| "Unnamed mod".to_string());

        let inputs = match element.child_ignore_case("UserInput") {
            Some(block) => parse_inputs(block)?,
            None => Vec::new(),
        };
        let changes = match element.child_ignore_case("Changes") {
            Some(block) => parse_changes(block, root)?,
            None => Vec::new(),
        };

        Ok(Self {
            name,
            author: element.attribute_ignore_case("Author").map(str::to_string),
            description: element
                .attribute_ignore_case("Description")
                .map(str::to_string),
            root: root.to_path_buf(),
            changes,
            inputs,
        })
    }

    pub fn resolve_inputs(&self) -> Result<Vec<Input>> {
        resolve_inputs(self.inputs.clone())
    }

    /// Turns changes into operations numbered from `first_index`, with
    /// selections already inlined into every edit fragment.
    pub fn operations(&self, selections: &SelectionMap, first_index: usize) -> Result<Vec<Operation>> {
        let mut operations = Vec::with_capacity(self.changes.len());
        for (offset, change) in self.changes.iter().enumerate() {
            let index = first_index + offset;
            let operation = match change {
                Change::Edit {
                    path,
                    action,
                    fragment,
                } => {
                    let mut fragment = fragment.clone();
                    resolve_user_input(&mut fragment, selections)?;
                    Operation::XmlEdit(XmlEdit {
                        index,
                        path: path.clone(),
                        action: action.clone(),
                        fragment: fragment.children,
                    })
                }
                Change::Replace { path, source } => Operation::FileSwap(FileSwap {
                    index,
                    path: path.clone(),
                    source: source.clone(),
                }),
            };
            operations.push(operation);
        }
        Ok(operations)
    }
}

fn find_modinfo(root: &Path) -> Option<PathBuf> {
    let entries = fs::read_dir(root).ok()?;
    entries
        .flatten()
        .map(|entry| entry.path())
        .find(|path| {
            path.is_file()
                && path
                    .file_name()
                    .map(|name| name.to_string_lossy().eq_ignore_ascii_case(MODINFO_FILE))
                    .unwrap_or(false)
        })
}

fn parse_inputs(block: &XmlElement) -> Result<Vec<InputDecl>> {
    let mut inputs = Vec::new();
    for element in block.child_elements() {
        if !element.name.eq_ignore_ascii_case("ListBox") {
            warn!("ignoring unsupported user input <{}>", element.name);
            continue;
        }
        let name = required_attribute(element, "Name")?;
        let options = element
            .child_elements()
            .filter(|child| child.name.eq_ignore_ascii_case("Option"))
            .enumerate()
            .map(|(index, option)| {
                if !option.has_children() {
                    return ModOption::Default;
                }
                let name = option
                    .attribute_ignore_case("Name")
                    .map(str::to_string)
                    .unwrap_or_else(|| format!("Option {}", index + 1));
                ModOption::Fixed {
                    name,
                    content: option.clone(),
                }
            })
            .collect();
        inputs.push(InputDecl {
            display_name: element
                .attribute_ignore_case("DisplayName")
                .map(str::to_string)
                .unwrap_or_else(|| name.clone()),
            allow_custom: element
                .attribute_ignore_case("AllowCustom")
                .map(|value| value.trim().eq_ignore_ascii_case("true"))
                .unwrap_or(false),
            same_options_as: element
                .attribute_ignore_case("SameOptionsAs")
                .map(str::to_string),
            name,
            options,
        });
    }
    Ok(inputs)
}

fn parse_changes(block: &XmlElement, root: &Path) -> Result<Vec<Change>> {
    let mut changes = Vec::new();
    for element in block.child_elements() {
        let path = VppPath::parse(&required_attribute(element, "File")?)?;
        if element.name.eq_ignore_ascii_case("Edit") {
            changes.push(Change::Edit {
                path,
                action: element.attribute_ignore_case(LIST_ACTION).map(str::to_string),
                fragment: element.clone(),
            });
        } else if element.name.eq_ignore_ascii_case("Replace") {
            let relative = required_attribute(element, "NewFile")?.replace('\\', "/");
            let source = root.join(relative);
            if !source.is_file() {
                return Err(Error::InvalidModInfo(format!(
                    "replacement {source:?} for {path} does not exist"
                )));
            }
            changes.push(Change::Replace { path, source });
        } else {
            return Err(Error::InvalidModInfo(format!(
                "unknown change <{}>",
                element.name
            )));
        }
    }
    Ok(changes)
}

fn required_attribute(element: &XmlElement, name: &str) -> Result<String> {
    element
        .attribute_ignore_case(name)
        .map(str::to_string)
        .ok_or_else(|| {
            Error::InvalidModInfo(format!("<{}> is missing `{name}`", element.name))
        })
}
