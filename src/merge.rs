//! Structural merge of mod fragments into game tables.
//!
//! A fragment is merged child by child into a target element. How each list
//! of children is combined is chosen by the `LIST_ACTION` attribute on the
//! fragment element, inherited explicitly only where a caller passes one:
//!
//! - `add_new`: reuse the first same-named child, creating it when missing.
//! - `add`: always append a fresh copy.
//! - `replace`: drop the target's children, then `add`.
//! - `combine_by_field:<paths>`: find the first same-named child whose
//!   subnodes at every path carry the same text, merge into it, else append.

use crate::error::{Error, Result};
use crate::xml::{XmlElement, XmlNode};
use log::trace;
use std::str::FromStr;

/// Attribute that selects the list action on a fragment element.
pub const LIST_ACTION: &str = "LIST_ACTION";

/// How a source element's children are combined with the target's.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ListAction {
    AddNew,
    Add,
    Replace,
    /// Slash-separated lookup paths, compared left to right.
    CombineByField(Vec<String>),
}

impl FromStr for ListAction {
    type Err = Error;

    fn from_str(raw: &str) -> Result<Self> {
        let trimmed = raw.trim();
        let (keyword, argument) = match trimmed.split_once(':') {
            Some((keyword, argument)) => (keyword.trim(), Some(argument)),
            None => (trimmed, None),
        };
        let keyword = keyword.to_ascii_lowercase();
        match (keyword.as_str(), argument) {
            ("add_new", None) => Ok(ListAction::AddNew),
            ("add", None) => Ok(ListAction::Add),
            ("replace", None) => Ok(ListAction::Replace),
            ("combine_by_field", Some(criteria)) => {
                let paths: Vec<String> = criteria
                    .split(',')
                    .map(|path| path.trim().replace('\\', "/"))
                    .filter(|path| !path.is_empty())
                    .collect();
                if paths.is_empty() {
                    return Err(Error::MalformedAction {
                        action: raw.to_string(),
                        reason: "no field paths given".to_string(),
                    });
                }
                Ok(ListAction::CombineByField(paths))
            }
            ("combine_by_field", None) => Err(Error::MalformedAction {
                action: raw.to_string(),
                reason: "expected combine_by_field:<paths>".to_string(),
            }),
            _ => Err(Error::UnsupportedAction(raw.to_string())),
        }
    }
}

/// Merges an `<Edit>` block into the root element of a game file.
///
/// A block without `LIST_ACTION` appends its children, so a bare edit never
/// silently folds into existing entries.
pub fn merge_edit(edit: &XmlElement, target: &mut XmlElement, action: Option<&str>) -> Result<()> {
    merge_node(edit, target, action, false, true)
}

/// Merges `source` into `target`.
///
/// `action` overrides the source's `LIST_ACTION`; without either the
/// children are combined with `add_new`.
pub fn merge(
    source: &XmlElement,
    target: &mut XmlElement,
    action: Option<&str>,
    copy_attributes: bool,
) -> Result<()> {
    merge_node(source, target, action, copy_attributes, false)
}

fn merge_node(
    source: &XmlElement,
    target: &mut XmlElement,
    action: Option<&str>,
    copy_attributes: bool,
    top_level: bool,
) -> Result<()> {
    if copy_attributes {
        for (key, value) in &source.attributes {
            if !key.eq_ignore_ascii_case(LIST_ACTION) {
                target.set_attribute(key, value);
            }
        }
    }
    if !source.has_children() {
        return Ok(());
    }

    let action = match action.or_else(|| source.attribute_ignore_case(LIST_ACTION)) {
        Some(raw) => raw.parse()?,
        None if top_level => ListAction::Add,
        None => ListAction::AddNew,
    };
    trace!("merge <{}> into <{}> with {:?}", source.name, target.name, action);

    match action {
        ListAction::AddNew => add_new(source, target),
        ListAction::Add => add(source, target),
        ListAction::Replace => {
            target.children.clear();
            add(source, target)
        }
        ListAction::CombineByField(paths) => combine_by_field(source, target, &paths),
    }
}

fn add_new(source: &XmlElement, target: &mut XmlElement) -> Result<()> {
    for child in &source.children {
        match child {
            XmlNode::Element(child) => {
                let index = match target
                    .children
                    .iter()
                    .position(|node| matches!(node, XmlNode::Element(e) if e.name == child.name))
                {
                    Some(index) => index,
                    None => {
                        target
                            .children
                            .push(XmlNode::Element(XmlElement::new(child.name.clone())));
                        target.children.len() - 1
                    }
                };
                if let XmlNode::Element(existing) = &mut target.children[index] {
                    merge(child, existing, None, true)?;
                }
            }
            XmlNode::Text(text) => target.set_text(text),
            XmlNode::Comment(_) => {}
        }
    }
    Ok(())
}

fn add(source: &XmlElement, target: &mut XmlElement) -> Result<()> {
    for child in &source.children {
        match child {
            XmlNode::Element(child) => append_copy(child, target)?,
            XmlNode::Text(text) => target.set_text(text),
            XmlNode::Comment(_) => {}
        }
    }
    Ok(())
}

fn append_copy(child: &XmlElement, target: &mut XmlElement) -> Result<()> {
    let mut fresh = XmlElement::new(child.name.clone());
    merge(child, &mut fresh, None, true)?;
    target.children.push(XmlNode::Element(fresh));
    Ok(())
}

fn combine_by_field(source: &XmlElement, target: &mut XmlElement, paths: &[String]) -> Result<()> {
    for child in &source.children {
        let child = match child {
            XmlNode::Element(child) => child,
            XmlNode::Text(text) => {
                target.set_text(text);
                continue;
            }
            XmlNode::Comment(_) => continue,
        };

        let found = target.children.iter().position(|node| match node {
            XmlNode::Element(candidate) => {
                candidate.name == child.name && fields_match(child, candidate, paths)
            }
            _ => false,
        });
        match found {
            Some(index) => {
                if let XmlNode::Element(existing) = &mut target.children[index] {
                    merge(child, existing, None, true)?;
                }
            }
            None => append_copy(child, target)?,
        }
    }
    Ok(())
}

/// Every path must resolve on the source child and carry equal text on the
/// candidate. A source child missing the first field matches nothing.
fn fields_match(source: &XmlElement, candidate: &XmlElement, paths: &[String]) -> bool {
    paths.iter().all(|path| match source.text_at(path) {
        Some(expected) => candidate.text_at(path) == Some(expected),
        None => false,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::xml::parse_str;

    fn element(xml: &str) -> XmlElement {
        parse_str(xml).unwrap().root
    }

    fn count(element: &XmlElement, name: &str) -> usize {
        element.child_elements().filter(|c| c.name == name).count()
    }

    #[test]
    fn parses_list_actions() {
        assert_eq!("add_new".parse::<ListAction>().unwrap(), ListAction::AddNew);
        assert_eq!(" ADD ".parse::<ListAction>().unwrap(), ListAction::Add);
        assert_eq!(
            r"combine_by_field:Name,_Editor\Category".parse::<ListAction>().unwrap(),
            ListAction::CombineByField(vec!["Name".into(), "_Editor/Category".into()])
        );
        for legacy in ["combine_by_text", "combine_by_index", "combine_by_attribute:id", "merge"] {
            assert!(matches!(
                legacy.parse::<ListAction>(),
                Err(Error::UnsupportedAction(_))
            ));
        }
        assert!(matches!(
            "combine_by_field:".parse::<ListAction>(),
            Err(Error::MalformedAction { .. })
        ));
    }

    #[test]
    fn combine_by_field_merges_matching_entry() {
        let mut target = element(
            r"<Table>
                <Weapon>
                    <Name>edf_pistol</Name>
                    <_Editor><Category>Entries:EDF</Category></_Editor>
                    <Max_Rounds>100</Max_Rounds>
                </Weapon>
            </Table>",
        );
        let source = element(
            r"<Table LIST_ACTION='combine_by_field:Name,_Editor\Category'>
                <Weapon>
                    <Name>edf_pistol</Name>
                    <_Editor><Category>Entries:EDF</Category></_Editor>
                    <Max_Rounds>9999</Max_Rounds>
                </Weapon>
            </Table>",
        );
        merge(&source, &mut target, None, false).unwrap();
        assert_eq!(count(&target, "Weapon"), 1);
        let weapon = target.child("Weapon").unwrap();
        assert_eq!(weapon.text_at("Max_Rounds"), Some("9999"));
        assert_eq!(count(weapon, "Max_Rounds"), 1);
    }

    #[test]
    fn combine_by_field_appends_when_nothing_matches() {
        let mut target = element("<Table><Weapon><Name>edf_pistol</Name></Weapon></Table>");
        let source = element(
            "<Table LIST_ACTION='combine_by_field:Name'><Weapon><Name>rocket</Name></Weapon></Table>",
        );
        merge(&source, &mut target, None, false).unwrap();
        assert_eq!(count(&target, "Weapon"), 2);
    }

    #[test]
    fn combine_by_field_takes_first_match_only() {
        let mut target = element(
            "<Table>
                <Weapon><Name>a</Name><Value>1</Value></Weapon>
                <Weapon><Name>a</Name><Value>2</Value></Weapon>
            </Table>",
        );
        let source = element(
            "<Table LIST_ACTION='combine_by_field:Name'><Weapon><Name>a</Name><Value>9</Value></Weapon></Table>",
        );
        merge(&source, &mut target, None, false).unwrap();
        let values: Vec<_> = target
            .child_elements()
            .map(|w| w.text_at("Value").unwrap())
            .collect();
        assert_eq!(values, vec!["9", "2"]);
    }

    #[test]
    fn combine_by_field_without_first_field_never_matches() {
        let mut target = element("<Table><Weapon><Value>1</Value></Weapon></Table>");
        let source = element(
            "<Table LIST_ACTION='combine_by_field:Name'><Weapon><Value>2</Value></Weapon></Table>",
        );
        merge(&source, &mut target, None, false).unwrap();
        assert_eq!(count(&target, "Weapon"), 2);
    }

    #[test]
    fn add_new_reuses_existing_child() {
        let mut target = element("<Foo><Bar>1</Bar></Foo>");
        let source = element("<Foo LIST_ACTION='add_new'><Bar>2</Bar></Foo>");
        merge(&source, &mut target, None, false).unwrap();
        assert_eq!(target, element("<Foo><Bar>2</Bar></Foo>"));
    }

    #[test]
    fn add_new_matches_tag_names_case_sensitively() {
        let mut target = element("<Foo><bar>1</bar></Foo>");
        let source = element("<Foo LIST_ACTION='add_new'><Bar>2</Bar></Foo>");
        merge(&source, &mut target, None, false).unwrap();
        assert_eq!(target, element("<Foo><bar>1</bar><Bar>2</Bar></Foo>"));
    }

    #[test]
    fn add_and_replace_assign_text_instead_of_appending() {
        let mut target = element("<Foo>1<Bar/></Foo>");
        let source = element("<Foo LIST_ACTION='add'>2</Foo>");
        merge(&source, &mut target, None, false).unwrap();
        assert_eq!(target.text(), Some("2"));
        assert_eq!(
            target
                .children
                .iter()
                .filter(|node| matches!(node, XmlNode::Text(_)))
                .count(),
            1
        );
        assert_eq!(count(&target, "Bar"), 1);

        let mut target = element("<Foo>1<Bar/></Foo>");
        let source = element("<Foo LIST_ACTION='replace'>2</Foo>");
        merge(&source, &mut target, None, false).unwrap();
        assert_eq!(target, element("<Foo>2</Foo>"));
    }

    #[test]
    fn add_always_duplicates() {
        let mut target = element("<Foo><Bar>1</Bar></Foo>");
        let source = element("<Foo LIST_ACTION='add'><Bar>2</Bar></Foo>");
        merge(&source, &mut target, None, false).unwrap();
        let bars: Vec<_> = target.child_elements().map(|b| b.text().unwrap()).collect();
        assert_eq!(bars, vec!["1", "2"]);
    }

    #[test]
    fn replace_clears_first() {
        let mut target = element("<Foo><A/><B/></Foo>");
        let source = element("<Foo LIST_ACTION='replace'><C/></Foo>");
        merge(&source, &mut target, None, false).unwrap();
        assert_eq!(target, element("<Foo><C/></Foo>"));
    }

    #[test]
    fn explicit_action_wins_over_attribute() {
        let mut target = element("<Foo><Bar>1</Bar></Foo>");
        let source = element("<Foo LIST_ACTION='add'><Bar>2</Bar></Foo>");
        merge(&source, &mut target, Some("add_new"), false).unwrap();
        assert_eq!(count(&target, "Bar"), 1);
    }

    #[test]
    fn copies_attributes_except_list_action() {
        let mut target = element("<root><Foo id='1'/></root>");
        let source = element("<root><Foo id='2' extra='x' list_action='add'><Bar/></Foo></root>");
        merge(&source, &mut target, None, false).unwrap();
        let foo = target.child("Foo").unwrap();
        assert_eq!(foo.attribute("id"), Some("2"));
        assert_eq!(foo.attribute("extra"), Some("x"));
        assert_eq!(foo.attribute_ignore_case(LIST_ACTION), None);
    }

    #[test]
    fn bare_edit_block_appends() {
        let mut root = element("<root><Table><Entry>1</Entry></Table></root>");
        let edit = element("<Edit><Table><Entry>2</Entry></Table></Edit>");
        merge_edit(&edit, &mut root, None).unwrap();
        assert_eq!(count(&root, "Table"), 2);

        let mut root = element("<root><Table><Entry>1</Entry></Table></root>");
        let edit = element("<Edit LIST_ACTION='add_new'><Table><Entry>2</Entry></Table></Edit>");
        merge_edit(&edit, &mut root, None).unwrap();
        assert_eq!(count(&root, "Table"), 1);
        assert_eq!(root.text_at("Table/Entry"), Some("2"));
    }

    #[test]
    fn empty_source_only_copies_attributes() {
        let mut target = element("<Foo><Bar>1</Bar></Foo>");
        let source = element("<Foo LIST_ACTION='bogus' flag='on'/>");
        merge(&source, &mut target, None, true).unwrap();
        assert_eq!(target.attribute("flag"), Some("on"));
        assert_eq!(count(&target, "Bar"), 1);
    }

    #[test]
    fn unsupported_action_is_an_error() {
        let mut target = element("<Foo/>");
        let source = element("<Foo LIST_ACTION='combine_by_index'><Bar/></Foo>");
        assert!(matches!(
            merge(&source, &mut target, None, false),
            Err(Error::UnsupportedAction(_))
        ));
    }
}
