//! Inlines player selections into edit fragments.
//!
//! `<USER_INPUT>name</USER_INPUT>` placeholders are expanded in place with the
//! children of the selected option, then every placeholder shell is removed.

use crate::error::{Error, Result};
use crate::options::SelectionMap;
use crate::xml::{XmlElement, XmlNode};
use log::debug;

/// Reserved placeholder tag, matched case-insensitively.
pub const USER_INPUT: &str = "USER_INPUT";

/// Expands then strips every placeholder below `fragment`.
pub fn resolve_user_input(fragment: &mut XmlElement, selections: &SelectionMap) -> Result<()> {
    insert_selections(fragment, selections, &mut Vec::new())?;
    strip_placeholders(fragment);
    Ok(())
}

fn is_placeholder(element: &XmlElement) -> bool {
    element.name.eq_ignore_ascii_case(USER_INPUT)
}

/// Inserts the selected content right after each placeholder. The content is
/// expanded before it is spliced in, with `active` holding the chain of
/// inputs being expanded; meeting one of them again is a cycle.
fn insert_selections(
    element: &mut XmlElement,
    selections: &SelectionMap,
    active: &mut Vec<String>,
) -> Result<()> {
    let mut index = 0;
    while index < element.children.len() {
        let inserted = match &mut element.children[index] {
            XmlNode::Element(child) if is_placeholder(child) => {
                let name = child.text().unwrap_or_default().trim().to_string();
                match selections.get(&name)? {
                    Some(content) if content.has_children() => {
                        if active.iter().any(|open| open.eq_ignore_ascii_case(&name)) {
                            return Err(Error::RecursiveInput(name));
                        }
                        debug!("inlining {} node(s) for input `{name}`", content.children.len());
                        let mut content = content.clone();
                        active.push(name);
                        insert_selections(&mut content, selections, active)?;
                        active.pop();
                        Some(content.children)
                    }
                    _ => None,
                }
            }
            XmlNode::Element(child) => {
                insert_selections(child, selections, active)?;
                None
            }
            XmlNode::Text(_) | XmlNode::Comment(_) => None,
        };
        index += 1;
        if let Some(nodes) = inserted {
            let count = nodes.len();
            element.children.splice(index..index, nodes);
            index += count;
        }
    }
    Ok(())
}

/// Removes every placeholder element. A removal leaves the cursor in place
/// so the node that slid into the slot is examined next.
fn strip_placeholders(element: &mut XmlElement) {
    let mut index = 0;
    while index < element.children.len() {
        let placeholder = matches!(
            &element.children[index],
            XmlNode::Element(child) if is_placeholder(child)
        );
        if placeholder {
            element.children.remove(index);
            continue;
        }
        if let XmlNode::Element(child) = &mut element.children[index] {
            strip_placeholders(child);
        }
        index += 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::options::{resolve_inputs, InputDecl, ModOption};
    use crate::xml::parse_str;

    fn option(name: &str, xml: &str) -> ModOption {
        ModOption::Fixed {
            name: name.to_string(),
            content: parse_str(xml).unwrap().root,
        }
    }

    fn selections(decls: Vec<(&str, Vec<ModOption>)>) -> SelectionMap {
        let inputs = resolve_inputs(
            decls
                .into_iter()
                .map(|(name, options)| InputDecl {
                    name: name.to_string(),
                    display_name: name.to_string(),
                    allow_custom: false,
                    same_options_as: None,
                    options,
                })
                .collect(),
        )
        .unwrap();
        SelectionMap::build(&inputs).unwrap()
    }

    #[test]
    fn inlines_selected_option() {
        let map = selections(vec![(
            "tank_camera",
            vec![option("Far", "<Option><Distance>50</Distance></Option>")],
        )]);
        let mut fragment =
            parse_str("<Settings><USER_INPUT>tank_camera</USER_INPUT></Settings>").unwrap().root;
        resolve_user_input(&mut fragment, &map).unwrap();
        assert_eq!(
            fragment,
            parse_str("<Settings><Distance>50</Distance></Settings>").unwrap().root
        );
    }

    #[test]
    fn keeps_sibling_order_and_handles_adjacent_placeholders() {
        let map = selections(vec![
            ("a", vec![option("x", "<Option><A1/><A2/></Option>")]),
            ("b", vec![option("y", "<Option><B1/></Option>")]),
        ]);
        let mut fragment = parse_str(
            "<Root><First/><user_input>A</user_input><USER_INPUT> b </USER_INPUT><Last/></Root>",
        )
        .unwrap()
        .root;
        resolve_user_input(&mut fragment, &map).unwrap();
        let names: Vec<_> = fragment.child_elements().map(|e| e.name.as_str()).collect();
        assert_eq!(names, vec!["First", "A1", "A2", "B1", "Last"]);
    }

    #[test]
    fn resolves_chained_placeholders_and_nested_elements() {
        let map = selections(vec![
            (
                "outer",
                vec![option("x", "<Option><Wrap><USER_INPUT>inner</USER_INPUT></Wrap><USER_INPUT>inner</USER_INPUT></Option>")],
            ),
            ("inner", vec![option("y", "<Option><Leaf>1</Leaf></Option>")]),
        ]);
        let mut fragment = parse_str("<Root><Deep><USER_INPUT>outer</USER_INPUT></Deep></Root>")
            .unwrap()
            .root;
        resolve_user_input(&mut fragment, &map).unwrap();
        assert_eq!(
            fragment,
            parse_str("<Root><Deep><Wrap><Leaf>1</Leaf></Wrap><Leaf>1</Leaf></Deep></Root>")
                .unwrap()
                .root
        );
    }

    #[test]
    fn default_option_inserts_nothing() {
        let map = selections(vec![("cam", vec![ModOption::Default])]);
        let mut fragment = parse_str("<Root><A/><USER_INPUT>cam</USER_INPUT><B/></Root>")
            .unwrap()
            .root;
        resolve_user_input(&mut fragment, &map).unwrap();
        assert_eq!(fragment, parse_str("<Root><A/><B/></Root>").unwrap().root);
    }

    #[test]
    fn undeclared_input_is_fatal() {
        let map = selections(Vec::new());
        let mut fragment = parse_str("<Root><USER_INPUT>ghost</USER_INPUT></Root>").unwrap().root;
        assert!(matches!(
            resolve_user_input(&mut fragment, &map),
            Err(Error::UndeclaredInput(name)) if name == "ghost"
        ));
    }

    #[test]
    fn self_referencing_selection_is_rejected() {
        let map = selections(vec![(
            "loop",
            vec![option("x", "<Option><A/><USER_INPUT>loop</USER_INPUT></Option>")],
        )]);
        let mut fragment = parse_str("<Root><USER_INPUT>loop</USER_INPUT></Root>").unwrap().root;
        assert!(matches!(
            resolve_user_input(&mut fragment, &map),
            Err(Error::RecursiveInput(_))
        ));
    }

    #[test]
    fn mutually_recursive_selections_are_rejected() {
        let map = selections(vec![
            ("a", vec![option("x", "<Option><A/><USER_INPUT>b</USER_INPUT></Option>")]),
            ("b", vec![option("y", "<Option><B/><USER_INPUT>A</USER_INPUT></Option>")]),
        ]);
        let mut fragment = parse_str("<Root><USER_INPUT>a</USER_INPUT></Root>").unwrap().root;
        assert!(matches!(
            resolve_user_input(&mut fragment, &map),
            Err(Error::RecursiveInput(name)) if name.eq_ignore_ascii_case("a")
        ));
    }

    #[test]
    fn many_independent_placeholders_all_expand() {
        let map = selections(vec![(
            "rounds",
            vec![option("x", "<Option><Max_Rounds>500</Max_Rounds></Option>")],
        )]);
        let mut fragment = XmlElement::new("Table");
        for _ in 0..5000 {
            let mut weapon = XmlElement::new("Weapon");
            weapon
                .children
                .push(XmlNode::Element(XmlElement::with_text(USER_INPUT, "rounds")));
            fragment.children.push(XmlNode::Element(weapon));
        }
        resolve_user_input(&mut fragment, &map).unwrap();
        assert_eq!(fragment.children.len(), 5000);
        assert!(fragment
            .child_elements()
            .all(|weapon| weapon.text_at("Max_Rounds") == Some("500")));
    }

    #[test]
    fn repeated_input_in_siblings_is_not_a_cycle() {
        let map = selections(vec![
            (
                "outer",
                vec![option("x", "<Option><USER_INPUT>leaf</USER_INPUT><USER_INPUT>leaf</USER_INPUT></Option>")],
            ),
            ("leaf", vec![option("y", "<Option><Leaf/></Option>")]),
        ]);
        let mut fragment = parse_str("<Root><USER_INPUT>outer</USER_INPUT><USER_INPUT>outer</USER_INPUT></Root>")
            .unwrap()
            .root;
        resolve_user_input(&mut fragment, &map).unwrap();
        assert_eq!(fragment.children.len(), 4);
    }
}
