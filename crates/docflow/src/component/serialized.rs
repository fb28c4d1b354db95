//! Serialized component trees.
//!
//! This is the shape the markup parser hands over and the shape composites
//! produce replacements in. It is plain data: comparing two trees is how
//! re-expansion decides which replacements actually changed.

use crate::engine::arena::ComponentId;
use crate::engine::diagnostics::SourcePosition;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SerializedReference {
    #[serde(rename = "ref")]
    pub target: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub prop: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum SerializedNode {
    Text(String),
    Reference(SerializedReference),
    Component(SerializedComponent),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum SerializedAttribute {
    Bool(bool),
    Number(f64),
    /// Text starting with `$` is read as a reference to a named component.
    Text(String),
    Reference(SerializedReference),
    Component(Box<SerializedComponent>),
}

/// A live variable a generated component mirrors instead of computing its
/// own primary value.
#[derive(Debug, Clone, PartialEq)]
pub struct LinkTarget {
    pub component: ComponentId,
    pub variable: String,
    pub key: Option<usize>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SerializedComponent {
    #[serde(rename = "type")]
    pub component_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "IndexMap::is_empty")]
    pub attributes: IndexMap<String, SerializedAttribute>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub children: Vec<SerializedNode>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub position: Option<SourcePosition>,
    #[serde(skip)]
    pub link: Option<LinkTarget>,
}

impl SerializedComponent {
    pub fn new(component_type: &str) -> Self {
        Self {
            component_type: component_type.to_string(),
            name: None,
            attributes: IndexMap::new(),
            children: Vec::new(),
            position: None,
            link: None,
        }
    }

    pub fn named(mut self, name: &str) -> Self {
        self.name = Some(name.to_string());
        self
    }

    pub fn attr(mut self, name: &str, value: impl Into<SerializedAttribute>) -> Self {
        self.attributes.insert(name.to_string(), value.into());
        self
    }

    pub fn child(mut self, child: SerializedComponent) -> Self {
        self.children.push(SerializedNode::Component(child));
        self
    }

    pub fn text(mut self, text: &str) -> Self {
        self.children.push(SerializedNode::Text(text.to_string()));
        self
    }

    /// `$target` as a child: a copy of the named component.
    pub fn reference(mut self, target: &str) -> Self {
        self.children.push(SerializedNode::Reference(SerializedReference {
            target: target.to_string(),
            prop: None,
        }));
        self
    }

    pub fn reference_prop(mut self, target: &str, prop: &str) -> Self {
        self.children.push(SerializedNode::Reference(SerializedReference {
            target: target.to_string(),
            prop: Some(prop.to_string()),
        }));
        self
    }

    pub fn at(mut self, start: usize, end: usize) -> Self {
        self.position = Some(SourcePosition { start, end });
        self
    }

    pub fn linked_to(mut self, component: ComponentId, variable: &str, key: Option<usize>) -> Self {
        self.link = Some(LinkTarget {
            component,
            variable: variable.to_string(),
            key,
        });
        self
    }
}

impl From<f64> for SerializedAttribute {
    fn from(value: f64) -> Self {
        Self::Number(value)
    }
}

impl From<bool> for SerializedAttribute {
    fn from(value: bool) -> Self {
        Self::Bool(value)
    }
}

impl From<&str> for SerializedAttribute {
    fn from(value: &str) -> Self {
        Self::Text(value.to_string())
    }
}

impl From<SerializedComponent> for SerializedAttribute {
    fn from(component: SerializedComponent) -> Self {
        Self::Component(Box::new(component))
    }
}

impl SerializedAttribute {
    /// `$name` or `$name.prop` shorthand.
    pub fn as_reference(&self) -> Option<SerializedReference> {
        match self {
            Self::Reference(reference) => Some(reference.clone()),
            Self::Text(text) => {
                let rest = text.trim().strip_prefix('$')?;
                let (target, prop) = match rest.split_once('.') {
                    Some((target, prop)) => (target, Some(prop.to_string())),
                    None => (rest, None),
                };
                let valid = !target.is_empty()
                    && target
                        .chars()
                        .all(|c| c.is_alphanumeric() || c == '_' || c == '/');
                valid.then(|| SerializedReference {
                    target: target.to_string(),
                    prop,
                })
            }
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn deserializes_mixed_children() {
        let json = r#"{
            "type": "text",
            "name": "t",
            "attributes": { "fixed": true, "bindValueTo": "$other" },
            "children": ["hello ", { "ref": "n" }, { "type": "string", "children": ["world"] }]
        }"#;
        let component: SerializedComponent = serde_json::from_str(json).unwrap();
        assert_eq!(component.children.len(), 3);
        assert!(matches!(component.children[0], SerializedNode::Text(_)));
        assert!(matches!(component.children[1], SerializedNode::Reference(_)));
        assert!(matches!(component.children[2], SerializedNode::Component(_)));
        assert_eq!(
            component.attributes["bindValueTo"].as_reference().map(|r| r.target),
            Some("other".to_string())
        );
        assert_eq!(component.attributes["fixed"], SerializedAttribute::Bool(true));
    }

    #[test]
    fn reference_shorthand() {
        let attribute = SerializedAttribute::from("$p.x1");
        let reference = attribute.as_reference().unwrap();
        assert_eq!(reference.target, "p");
        assert_eq!(reference.prop.as_deref(), Some("x1"));
        assert_eq!(SerializedAttribute::from("$").as_reference(), None);
        assert_eq!(SerializedAttribute::from("3$").as_reference(), None);
    }

    #[test]
    fn links_take_part_in_equality() {
        let id = ComponentId {
            index: 0,
            generation: 0,
        };
        let a = SerializedComponent::new("number").linked_to(id, "values", Some(0));
        let b = SerializedComponent::new("number").linked_to(id, "values", Some(1));
        assert_ne!(a, b);
        assert_eq!(a.clone(), a);
    }
}
