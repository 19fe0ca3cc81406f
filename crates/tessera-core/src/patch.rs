//! JSON patch documents applied against stored entity JSON
//!
//! Supports the RFC 6902 operations with RFC 6901 pointers. A patch is
//! applied to a copy of the document; any failing operation discards the
//! whole patch.

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A single patch operation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "lowercase")]
pub enum PatchOperation {
    Add { path: String, value: Value },
    Remove { path: String },
    Replace { path: String, value: Value },
    Move { from: String, path: String },
    Copy { from: String, path: String },
    Test { path: String, value: Value },
}

/// An ordered sequence of patch operations
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Patch(pub Vec<PatchOperation>);

impl Patch {
    /// Parse a patch document, reporting unknown ops or missing members as malformed
    pub fn from_value(value: Value) -> Result<Self> {
        serde_json::from_value(value).map_err(|e| Error::MalformedPatch(e.to_string()))
    }

    pub fn parse(s: &str) -> Result<Self> {
        serde_json::from_str(s).map_err(|e| Error::MalformedPatch(e.to_string()))
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Apply every operation in order to a copy of `doc`
    pub fn apply(&self, doc: &Value) -> Result<Value> {
        let mut doc = doc.clone();
        for (index, op) in self.0.iter().enumerate() {
            apply_operation(&mut doc, op)
                .map_err(|reason| Error::MalformedPatch(format!("operation {}: {}", index, reason)))?;
        }
        Ok(doc)
    }
}

impl From<Vec<PatchOperation>> for Patch {
    fn from(ops: Vec<PatchOperation>) -> Self {
        Self(ops)
    }
}

type OpResult<T> = std::result::Result<T, String>;

fn apply_operation(doc: &mut Value, op: &PatchOperation) -> OpResult<()> {
    match op {
        PatchOperation::Add { path, value } => add(doc, path, value.clone()),
        PatchOperation::Remove { path } => remove(doc, path).map(|_| ()),
        PatchOperation::Replace { path, value } => {
            let target = doc
                .pointer_mut(path)
                .ok_or_else(|| format!("path {} does not exist", path))?;
            *target = value.clone();
            Ok(())
        }
        PatchOperation::Move { from, path } => {
            if path.starts_with(&format!("{}/", from)) {
                return Err(format!("cannot move {} into its own child {}", from, path));
            }
            let value = remove(doc, from)?;
            add(doc, path, value)
        }
        PatchOperation::Copy { from, path } => {
            let value = doc
                .pointer(from)
                .cloned()
                .ok_or_else(|| format!("path {} does not exist", from))?;
            add(doc, path, value)
        }
        PatchOperation::Test { path, value } => match doc.pointer(path) {
            Some(actual) if actual == value => Ok(()),
            Some(_) => Err(format!("test failed at {}", path)),
            None => Err(format!("path {} does not exist", path)),
        },
    }
}

/// Split a pointer into unescaped reference tokens
fn parse_pointer(path: &str) -> OpResult<Vec<String>> {
    if path.is_empty() {
        return Ok(Vec::new());
    }
    if !path.starts_with('/') {
        return Err(format!("invalid pointer {}", path));
    }
    Ok(path[1..]
        .split('/')
        .map(|token| token.replace("~1", "/").replace("~0", "~"))
        .collect())
}

fn parse_index(token: &str, len: usize, allow_end: bool) -> OpResult<usize> {
    if token.len() > 1 && token.starts_with('0') {
        return Err(format!("invalid array index {}", token));
    }
    let index: usize = token
        .parse()
        .map_err(|_| format!("invalid array index {}", token))?;
    let in_bounds = if allow_end { index <= len } else { index < len };
    if in_bounds {
        Ok(index)
    } else {
        Err(format!("array index {} out of bounds", index))
    }
}

/// Resolve the container holding the last token of `path`
fn parent_mut<'a>(doc: &'a mut Value, tokens: &[String]) -> OpResult<&'a mut Value> {
    let mut current = doc;
    for token in tokens {
        current = match current {
            Value::Object(map) => map
                .get_mut(token)
                .ok_or_else(|| format!("path segment {} does not exist", token))?,
            Value::Array(items) => {
                let index = parse_index(token, items.len(), false)?;
                &mut items[index]
            }
            _ => return Err(format!("path segment {} is not a container", token)),
        };
    }
    Ok(current)
}

fn add(doc: &mut Value, path: &str, value: Value) -> OpResult<()> {
    let tokens = parse_pointer(path)?;
    let Some((last, parents)) = tokens.split_last() else {
        *doc = value;
        return Ok(());
    };
    match parent_mut(doc, parents)? {
        Value::Object(map) => {
            map.insert(last.clone(), value);
            Ok(())
        }
        Value::Array(items) => {
            if last == "-" {
                items.push(value);
            } else {
                let index = parse_index(last, items.len(), true)?;
                items.insert(index, value);
            }
            Ok(())
        }
        _ => Err(format!("cannot add {}: parent is not a container", path)),
    }
}

fn remove(doc: &mut Value, path: &str) -> OpResult<Value> {
    let tokens = parse_pointer(path)?;
    let Some((last, parents)) = tokens.split_last() else {
        return Err("cannot remove the document root".to_string());
    };
    match parent_mut(doc, parents)? {
        Value::Object(map) => map
            .remove(last)
            .ok_or_else(|| format!("path {} does not exist", path)),
        Value::Array(items) => {
            let index = parse_index(last, items.len(), false)?;
            Ok(items.remove(index))
        }
        _ => Err(format!("cannot remove {}: parent is not a container", path)),
    }
}
