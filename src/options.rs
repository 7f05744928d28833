use crate::error::{Error, Result};
use crate::xml::{XmlElement, XmlNode};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ModOption {
    Fixed { name: String, content: XmlElement },
    Custom(String),
    Default,
}

impl ModOption {
    pub fn name(&self) -> &str {
        match self {
            ModOption::Fixed { name, .. } => name,
            ModOption::Custom(_) => "Custom",
            ModOption::Default => "Default",
        }
    }

    pub fn content(&self) -> Option<XmlElement> {
        match self {
            ModOption::Fixed { content, .. } => Some(content.clone()),
            ModOption::Custom(text) => {
                let mut content = XmlElement::new("Custom");
                content.children.push(XmlNode::Text(text.clone()));
                Some(content)
            }
            ModOption::Default => None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct InputDecl {
    pub name: String,
    pub display_name: String,
    pub allow_custom: bool,
    pub same_options_as: Option<String>,
    pub options: Vec<ModOption>,
}

#[derive(Debug, Clone)]
pub struct Input {
    pub name: String,
    pub display_name: String,
    pub allow_custom: bool,
    options: Arc<[ModOption]>,
    selected: usize,
    custom: Option<String>,
}

impl Input {
    pub fn options(&self) -> &[ModOption] {
        &self.options
    }

    pub fn shares_options_with(&self, other: &Input) -> bool {
        Arc::ptr_eq(&self.options, &other.options)
    }

    pub fn selected_index(&self) -> usize {
        self.selected
    }

    pub fn select(&mut self, index: usize) -> Result<()> {
        if index >= self.options.len() {
            return Err(Error::InvalidSelection {
                input: self.name.clone(),
                reason: format!(
                    "index {index} out of range ({} options)",
                    self.options.len()
                ),
            });
        }
        self.selected = index;
        self.custom = None;
        Ok(())
    }

    pub fn set_custom(&mut self, value: &str) -> Result<()> {
        if !self.allow_custom {
            return Err(Error::InvalidSelection {
                input: self.name.clone(),
                reason: "custom values are not allowed".to_string(),
            });
        }
        self.custom = Some(value.to_string());
        Ok(())
    }

    /// The option currently in effect. An input with no options is a no-op.
    pub fn selected_option(&self) -> ModOption {
        if let Some(custom) = &self.custom {
            return ModOption::Custom(custom.clone());
        }
        self.options
            .get(self.selected)
            .cloned()
            .unwrap_or(ModOption::Default)
    }
}

pub fn resolve_inputs(decls: Vec<InputDecl>) -> Result<Vec<Input>> {
    let by_name: HashMap<String, usize> = decls
        .iter()
        .enumerate()
        .map(|(index, decl)| (decl.name.to_lowercase(), index))
        .collect();

    let mut shared: Vec<Option<Arc<[ModOption]>>> = decls
        .iter()
        .map(|decl| match decl.same_options_as {
            Some(_) => None,
            None => Some(Arc::from(decl.options.clone())),
        })
        .collect();

    for index in 0..decls.len() {
        if shared[index].is_some() {
            continue;
        }
        let mut seen = HashSet::new();
        let mut current = index;
        let source = loop {
            if let Some(options) = &shared[current] {
                break options.clone();
            }
            if !seen.insert(current) {
                return Err(alias_error(&decls[index]));
            }
            let alias = decls[current]
                .same_options_as
                .as_deref()
                .unwrap_or_default()
                .to_lowercase();
            current = *by_name
                .get(&alias)
                .ok_or_else(|| alias_error(&decls[index]))?;
        };
        shared[index] = Some(source);
    }

    decls
        .into_iter()
        .zip(shared)
        .map(|(decl, options)| {
            let options = options.ok_or_else(|| alias_error(&decl))?;
            Ok(Input {
                name: decl.name,
                display_name: decl.display_name,
                allow_custom: decl.allow_custom,
                options,
                selected: 0,
                custom: None,
            })
        })
        .collect()
}

fn alias_error(decl: &InputDecl) -> Error {
    Error::UnknownOptionAlias {
        input: decl.name.clone(),
        alias: decl.same_options_as.clone().unwrap_or_default(),
    }
}

#[derive(Debug, Clone, Default)]
pub struct SelectionMap {
    values: HashMap<String, Option<XmlElement>>,
}

impl SelectionMap {
    pub fn build(inputs: &[Input]) -> Result<Self> {
        let mut values = HashMap::new();
        for input in inputs {
            let key = input.name.to_lowercase();
            if values.contains_key(&key) {
                return Err(Error::DuplicateInput(input.name.clone()));
            }
            values.insert(key, input.selected_option().content());
        }
        Ok(Self { values })
    }

    /// Looks up a placeholder reference. `Ok(None)` means the default option.
    pub fn get(&self, name: &str) -> Result<Option<&XmlElement>> {
        self.values
            .get(&name.to_lowercase())
            .map(Option::as_ref)
            .ok_or_else(|| Error::UndeclaredInput(name.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fixed(name: &str, tag: &str, value: &str) -> ModOption {
        let mut content = XmlElement::new("Option");
        content
            .children
            .push(XmlNode::Element(XmlElement::with_text(tag, value)));
        ModOption::Fixed {
            name: name.to_string(),
            content,
        }
    }

    fn decl(name: &str, alias: Option<&str>, options: Vec<ModOption>) -> InputDecl {
        InputDecl {
            name: name.to_string(),
            display_name: name.to_string(),
            allow_custom: false,
            same_options_as: alias.map(str::to_string),
            options,
        }
    }

    #[test]
    fn aliased_inputs_share_the_same_list() {
        let inputs = resolve_inputs(vec![
            decl("left", None, vec![fixed("Near", "Distance", "10")]),
            decl("right", Some("LEFT"), Vec::new()),
            decl("third", Some("right"), Vec::new()),
        ])
        .unwrap();
        assert!(inputs[0].shares_options_with(&inputs[1]));
        assert!(inputs[1].shares_options_with(&inputs[2]));
        assert_eq!(inputs[2].options().len(), 1);
    }

    #[test]
    fn unknown_or_cyclic_alias_fails() {
        let err = resolve_inputs(vec![decl("a", Some("missing"), Vec::new())]).unwrap_err();
        assert!(matches!(err, Error::UnknownOptionAlias { .. }));

        let err = resolve_inputs(vec![
            decl("a", Some("b"), Vec::new()),
            decl("b", Some("a"), Vec::new()),
        ])
        .unwrap_err();
        assert!(matches!(err, Error::UnknownOptionAlias { .. }));
    }

    #[test]
    fn custom_values_need_permission() {
        let mut inputs = resolve_inputs(vec![decl("a", None, Vec::new())]).unwrap();
        assert!(inputs[0].set_custom("50").is_err());
        inputs[0].allow_custom = true;
        inputs[0].set_custom("50").unwrap();
        let content = inputs[0].selected_option().content().unwrap();
        assert_eq!(content.text(), Some("50"));
    }

    #[test]
    fn selection_map_rejects_case_collisions() {
        let inputs = resolve_inputs(vec![
            decl("Camera", None, Vec::new()),
            decl("camera", None, Vec::new()),
        ])
        .unwrap();
        assert!(matches!(
            SelectionMap::build(&inputs),
            Err(Error::DuplicateInput(_))
        ));
    }

    #[test]
    fn default_option_resolves_to_nothing() {
        let mut inputs = resolve_inputs(vec![decl(
            "cam",
            None,
            vec![ModOption::Default, fixed("Far", "Distance", "50")],
        )])
        .unwrap();
        let map = SelectionMap::build(&inputs).unwrap();
        assert!(map.get("CAM").unwrap().is_none());

        inputs[0].select(1).unwrap();
        let map = SelectionMap::build(&inputs).unwrap();
        let content = map.get("cam").unwrap().unwrap();
        assert_eq!(content.text_at("Distance"), Some("50"));
        assert!(matches!(map.get("other"), Err(Error::UndeclaredInput(_))));
        assert!(inputs[0].select(2).is_err());
    }
}
