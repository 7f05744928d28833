//! Owned XML trees for game tables and mod fragments.

mod parser;
mod writer;

pub use parser::{parse_bytes, parse_str};
pub use writer::{to_bytes, to_string};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum XmlNode {
    Element(XmlElement),
    Text(String),
    Comment(String),
}

impl XmlNode {
    pub fn as_element(&self) -> Option<&XmlElement> {
        match self {
            XmlNode::Element(element) => Some(element),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct XmlElement {
    pub name: String,
    pub attributes: Vec<(String, String)>,
    pub children: Vec<XmlNode>,
}

impl XmlElement {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            attributes: Vec::new(),
            children: Vec::new(),
        }
    }

    pub fn with_text(name: impl Into<String>, text: impl Into<String>) -> Self {
        let mut element = Self::new(name);
        element.set_text(&text.into());
        element
    }

    pub fn attribute(&self, name: &str) -> Option<&str> {
        self.attributes
            .iter()
            .find(|(key, _)| key == name)
            .map(|(_, value)| value.as_str())
    }

    pub fn attribute_ignore_case(&self, name: &str) -> Option<&str> {
        self.attributes
            .iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.as_str())
    }

    pub fn set_attribute(&mut self, name: &str, value: &str) {
        match self.attributes.iter_mut().find(|(key, _)| key == name) {
            Some((_, existing)) => *existing = value.to_string(),
            None => self
                .attributes
                .push((name.to_string(), value.to_string())),
        }
    }

    pub fn has_children(&self) -> bool {
        !self.children.is_empty()
    }

    pub fn child_elements(&self) -> impl Iterator<Item = &XmlElement> {
        self.children.iter().filter_map(XmlNode::as_element)
    }

    pub fn child(&self, name: &str) -> Option<&XmlElement> {
        self.child_elements().find(|child| child.name == name)
    }

    pub fn child_ignore_case(&self, name: &str) -> Option<&XmlElement> {
        self.child_elements()
            .find(|child| child.name.eq_ignore_ascii_case(name))
    }

    pub fn text(&self) -> Option<&str> {
        self.children.iter().find_map(|node| match node {
            XmlNode::Text(text) => Some(text.as_str()),
            _ => None,
        })
    }

    /// Assigns the element's text value.
    ///
    /// An empty value removes the existing text child; a non-empty value
    /// overwrites it, or appends one when the element had none.
    pub fn set_text(&mut self, value: &str) {
        let existing = self
            .children
            .iter()
            .position(|node| matches!(node, XmlNode::Text(_)));
        match (existing, value.is_empty()) {
            (Some(index), true) => {
                self.children.remove(index);
            }
            (None, true) => {}
            (Some(index), false) => {
                self.children[index] = XmlNode::Text(value.to_string());
            }
            (None, false) => self.children.push(XmlNode::Text(value.to_string())),
        }
    }

    /// Text of the descendant reached by a `/`-separated chain of tag names.
    pub fn text_at(&self, path: &str) -> Option<&str> {
        let mut current = self;
        for segment in path.split('/').filter(|segment| !segment.is_empty()) {
            current = current.child(segment)?;
        }
        current.text()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum XmlMisc {
    Comment(String),
    Instruction(String),
    Doctype(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct XmlDocument {
    pub declaration: bool,
    pub prolog: Vec<XmlMisc>,
    pub root: XmlElement,
    pub epilog: Vec<XmlMisc>,
}
