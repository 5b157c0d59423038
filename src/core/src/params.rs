//! Template parameter tree.
//!
//! Parameters arrive as nested YAML mappings. They are held as a tagged tree
//! so lookups are typed instead of walking untyped maps.

use std::collections::BTreeMap;

use serde_yaml::Value;

use crate::error::{KpmError, Result};

/// A node in the parameter tree.
#[derive(Debug, Clone, PartialEq)]
pub enum Node {
    /// Scalar or sequence value
    Leaf(Value),
    /// Keyed children
    Branch(BTreeMap<String, Node>),
}

impl Node {
    /// Parse a YAML document into a tree.
    pub fn from_yaml_str(s: &str) -> Result<Self> {
        let value: Value = serde_yaml::from_str(s)?;
        Self::from_value(value)
    }

    /// Convert a YAML value. Mapping keys must be strings.
    pub fn from_value(value: Value) -> Result<Self> {
        match value {
            Value::Mapping(map) => {
                let mut children = BTreeMap::new();
                for (k, v) in map {
                    let key = match k {
                        Value::String(s) => s,
                        other => {
                            return Err(KpmError::ParamError(format!(
                                "non-string parameter key: {:?}",
                                other
                            )))
                        }
                    };
                    children.insert(key, Node::from_value(v)?);
                }
                Ok(Node::Branch(children))
            }
            Value::Tagged(tagged) => Node::from_value(tagged.value),
            other => Ok(Node::Leaf(other)),
        }
    }

    /// Follow `path` from this node.
    ///
    /// An empty path returns the node itself. Descending through a leaf or a
    /// missing key fails with the path walked so far.
    pub fn index<S: AsRef<str>>(&self, path: &[S]) -> Result<&Node> {
        let mut current = self;
        for (depth, key) in path.iter().enumerate() {
            let key = key.as_ref();
            let walked = || {
                path[..=depth]
                    .iter()
                    .map(|s| s.as_ref())
                    .collect::<Vec<_>>()
                    .join(".")
            };
            current = match current {
                Node::Branch(children) => children.get(key).ok_or_else(|| {
                    KpmError::ParamError(format!("no parameter at '{}'", walked()))
                })?,
                Node::Leaf(_) => {
                    return Err(KpmError::ParamError(format!(
                        "cannot index into scalar at '{}'",
                        walked()
                    )))
                }
            };
        }
        Ok(current)
    }

    /// The leaf value, if this is a leaf.
    pub fn as_leaf(&self) -> Option<&Value> {
        match self {
            Node::Leaf(v) => Some(v),
            Node::Branch(_) => None,
        }
    }

    /// Overlay `other` onto this tree. Branches merge key by key; anything else
    /// in `other` replaces what is here.
    pub fn merge(&mut self, other: Node) {
        match (self, other) {
            (Node::Branch(mine), Node::Branch(theirs)) => {
                for (k, v) in theirs {
                    match mine.get_mut(&k) {
                        Some(existing) => existing.merge(v),
                        None => {
                            mine.insert(k, v);
                        }
                    }
                }
            }
            (slot, other) => *slot = other,
        }
    }
}
