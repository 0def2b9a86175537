//! Record types owned by the resource store.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Store-assigned item key.
#[derive(Debug, Clone, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ItemId(pub String);

impl ItemId {
    /// Generate a fresh random id.
    pub fn generate() -> Self {
        Self(uuid::Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ItemId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ItemId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// Reference to a [`Function`].
#[derive(Debug, Clone, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FunctionId(pub String);

impl FunctionId {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for FunctionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for FunctionId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// A function that items are grouped under.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Function {
    #[serde(default)]
    pub id: FunctionId,
    pub name: String,
}

impl Function {
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: FunctionId(id.into()),
            name: name.into(),
        }
    }
}

/// An item as returned by the store, with its function resolved.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Item {
    pub id: ItemId,
    pub name: String,
    pub weight: f64,
    pub function_id: FunctionId,
    pub function: Function,
}

/// A validated item submission, as produced by the entry form.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewItem {
    pub name: String,
    pub weight: f64,
    pub function_id: FunctionId,
}

impl NewItem {
    pub fn new(name: impl Into<String>, weight: f64, function_id: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            weight,
            function_id: FunctionId(function_id.into()),
        }
    }

    /// Reject submissions the store would never accept.
    pub fn validate(&self) -> Result<(), String> {
        if self.name.trim().is_empty() {
            return Err("name is required".to_string());
        }
        if !self.weight.is_finite() {
            return Err(format!("weight must be a finite number, got {}", self.weight));
        }
        if self.function_id.0.trim().is_empty() {
            return Err("functionId is required".to_string());
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_item_wire_format() {
        let json = serde_json::json!({
            "id": "i1",
            "name": "Bolt",
            "weight": 2.5,
            "functionId": "f1",
            "function": { "id": "f1", "name": "Fasteners" }
        });

        let item: Item = serde_json::from_value(json).unwrap();
        assert_eq!(item.id, ItemId::from("i1"));
        assert_eq!(item.function_id, FunctionId::from("f1"));
        assert_eq!(item.function.name, "Fasteners");
    }

    #[test]
    fn test_function_id_optional_on_wire() {
        let function: Function = serde_json::from_str(r#"{"name":"X"}"#).unwrap();
        assert_eq!(function.id, FunctionId::default());
    }

    #[test]
    fn test_new_item_validation() {
        assert!(NewItem::new("Bolt", 1.0, "f1").validate().is_ok());
        assert!(NewItem::new("  ", 1.0, "f1").validate().is_err());
        assert!(NewItem::new("Bolt", f64::NAN, "f1").validate().is_err());
        assert!(NewItem::new("Bolt", 1.0, "").validate().is_err());
    }
}
