//! Query parameters for `find_all` and their client-side evaluation.
//!
//! The same [`Query`] is sent to the remote store for authoritative reads and
//! evaluated locally by [`Query::apply`] for filtered reads against the
//! client-side collection, so both paths agree on what a query means.

use std::cmp::Ordering;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::Item;

/// Item fields that can be filtered and ordered on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Field {
    #[serde(rename = "id")]
    Id,
    #[serde(rename = "name")]
    Name,
    #[serde(rename = "weight")]
    Weight,
    #[serde(rename = "functionId")]
    FunctionId,
    #[serde(rename = "function.name")]
    FunctionName,
}

impl Field {
    fn extract(self, item: &Item) -> Value {
        match self {
            Field::Id => Value::String(item.id.0.clone()),
            Field::Name => Value::String(item.name.clone()),
            Field::Weight => serde_json::Number::from_f64(item.weight)
                .map(Value::Number)
                .unwrap_or(Value::Null),
            Field::FunctionId => Value::String(item.function_id.0.clone()),
            Field::FunctionName => Value::String(item.function.name.clone()),
        }
    }
}

impl FromStr for Field {
    type Err = String;

    /// Accepts the wire names plus `function` as shorthand for `function.name`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "id" => Ok(Field::Id),
            "name" => Ok(Field::Name),
            "weight" => Ok(Field::Weight),
            "functionId" => Ok(Field::FunctionId),
            "function.name" | "function" => Ok(Field::FunctionName),
            other => Err(format!("unknown field '{other}'")),
        }
    }
}

/// Comparison operator of a [`Condition`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Op {
    #[serde(rename = "==")]
    Eq,
    /// Case-insensitive substring match.
    #[serde(rename = "contains")]
    Contains,
    #[serde(rename = ">")]
    Gt,
    #[serde(rename = "<")]
    Lt,
}

/// A single `where` clause.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Condition {
    pub field: Field,
    pub op: Op,
    pub value: Value,
}

impl Condition {
    fn matches(&self, item: &Item) -> bool {
        let actual = self.field.extract(item);
        match self.op {
            Op::Eq => compare_values(&actual, &self.value) == Some(Ordering::Equal),
            Op::Contains => match (&actual, &self.value) {
                (Value::String(a), Value::String(needle)) => {
                    a.to_lowercase().contains(&needle.to_lowercase())
                }
                _ => false,
            },
            Op::Gt => compare_values(&actual, &self.value) == Some(Ordering::Greater),
            Op::Lt => compare_values(&actual, &self.value) == Some(Ordering::Less),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Direction {
    Asc,
    Desc,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct OrderBy {
    pub field: Field,
    pub direction: Direction,
}

/// Filter, ordering and paging criteria for a collection read.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Query {
    #[serde(default, rename = "where", skip_serializing_if = "Vec::is_empty")]
    pub conditions: Vec<Condition>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub order_by: Vec<OrderBy>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub offset: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub limit: Option<usize>,
}

impl Query {
    /// The whole collection, in store order.
    pub fn all() -> Self {
        Self::default()
    }

    pub fn filter(mut self, field: Field, op: Op, value: impl Into<Value>) -> Self {
        self.conditions.push(Condition {
            field,
            op,
            value: value.into(),
        });
        self
    }

    pub fn where_eq(self, field: Field, value: impl Into<Value>) -> Self {
        self.filter(field, Op::Eq, value)
    }

    pub fn order_by(mut self, field: Field, direction: Direction) -> Self {
        self.order_by.push(OrderBy { field, direction });
        self
    }

    pub fn offset(mut self, offset: usize) -> Self {
        self.offset = Some(offset);
        self
    }

    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    /// True when the query selects every item with no paging.
    pub fn is_unbounded(&self) -> bool {
        self.conditions.is_empty() && self.offset.is_none() && self.limit.is_none()
    }

    /// Stable key used to cache responses by query.
    pub fn cache_key(&self) -> String {
        serde_json::to_string(self).unwrap_or_else(|_| format!("{:?}", self))
    }

    pub fn matches(&self, item: &Item) -> bool {
        self.conditions.iter().all(|c| c.matches(item))
    }

    /// Evaluate the query against an in-memory collection.
    ///
    /// Ordering is stable: items equal under every `order_by` key keep their
    /// input order.
    pub fn apply<'a, I>(&self, items: I) -> Vec<Item>
    where
        I: IntoIterator<Item = &'a Item>,
    {
        let mut selected: Vec<Item> = items
            .into_iter()
            .filter(|item| self.matches(item))
            .cloned()
            .collect();

        if !self.order_by.is_empty() {
            selected.sort_by(|a, b| {
                for key in &self.order_by {
                    let ord = compare_values(&key.field.extract(a), &key.field.extract(b))
                        .unwrap_or(Ordering::Equal);
                    let ord = match key.direction {
                        Direction::Asc => ord,
                        Direction::Desc => ord.reverse(),
                    };
                    if ord != Ordering::Equal {
                        return ord;
                    }
                }
                Ordering::Equal
            });
        }

        let offset = self.offset.unwrap_or(0);
        let limit = self.limit.unwrap_or(usize::MAX);
        selected.into_iter().skip(offset).take(limit).collect()
    }
}

fn compare_values(a: &Value, b: &Value) -> Option<Ordering> {
    match (a, b) {
        (Value::Number(a), Value::Number(b)) => a.as_f64()?.partial_cmp(&b.as_f64()?),
        (Value::String(a), Value::String(b)) => Some(a.cmp(b)),
        (Value::Bool(a), Value::Bool(b)) => Some(a.cmp(b)),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{Function, FunctionId, ItemId};
    use pretty_assertions::assert_eq;

    fn item(id: &str, name: &str, weight: f64, function: &str) -> Item {
        Item {
            id: ItemId::from(id),
            name: name.to_string(),
            weight,
            function_id: FunctionId::from(function),
            function: Function::new(function, function.to_uppercase()),
        }
    }

    fn names(items: &[Item]) -> Vec<&str> {
        items.iter().map(|i| i.name.as_str()).collect()
    }

    fn fixture() -> Vec<Item> {
        vec![
            item("1", "bolt", 2.0, "f"),
            item("2", "Nut", 0.5, "f"),
            item("3", "washer", 0.5, "g"),
            item("4", "anchor", 9.0, "g"),
        ]
    }

    #[test]
    fn test_all_keeps_store_order() {
        let items = fixture();
        assert_eq!(names(&Query::all().apply(&items)), vec!["bolt", "Nut", "washer", "anchor"]);
    }

    #[test]
    fn test_where_eq_and_numeric_bounds() {
        let items = fixture();

        let q = Query::all().where_eq(Field::FunctionId, "g");
        assert_eq!(names(&q.apply(&items)), vec!["washer", "anchor"]);

        let q = Query::all().filter(Field::Weight, Op::Gt, 1.0);
        assert_eq!(names(&q.apply(&items)), vec!["bolt", "anchor"]);

        let q = Query::all().filter(Field::Weight, Op::Lt, 1);
        assert_eq!(names(&q.apply(&items)), vec!["Nut", "washer"]);
    }

    #[test]
    fn test_contains_is_case_insensitive() {
        let items = fixture();
        let q = Query::all().filter(Field::Name, Op::Contains, "NU");
        assert_eq!(names(&q.apply(&items)), vec!["Nut"]);
    }

    #[test]
    fn test_order_offset_limit() {
        let items = fixture();
        let q = Query::all()
            .order_by(Field::Weight, Direction::Desc)
            .offset(1)
            .limit(2);
        // Nut and washer tie on weight and keep input order.
        assert_eq!(names(&q.apply(&items)), vec!["bolt", "Nut"]);
    }

    #[test]
    fn test_cache_key_distinguishes_queries() {
        let a = Query::all().limit(10);
        let b = Query::all().limit(10).offset(10);
        assert_ne!(a.cache_key(), b.cache_key());
        assert_eq!(a.cache_key(), Query::all().limit(10).cache_key());
    }

    #[test]
    fn test_field_from_str() {
        assert_eq!("weight".parse::<Field>(), Ok(Field::Weight));
        assert_eq!("function".parse::<Field>(), Ok(Field::FunctionName));
        assert_eq!("functionId".parse::<Field>(), Ok(Field::FunctionId));
        assert!("colour".parse::<Field>().is_err());
    }

    #[test]
    fn test_is_unbounded() {
        assert!(Query::all().is_unbounded());
        assert!(Query::all().order_by(Field::Name, Direction::Asc).is_unbounded());
        assert!(!Query::all().limit(1).is_unbounded());
        assert!(!Query::all().where_eq(Field::Name, "x").is_unbounded());
    }

    #[test]
    fn test_wire_format() {
        let q = Query::all()
            .where_eq(Field::FunctionName, "Fasteners")
            .order_by(Field::Name, Direction::Desc)
            .limit(5);
        let json = serde_json::to_value(&q).unwrap();
        assert_eq!(
            json,
            serde_json::json!({
                "where": [{ "field": "function.name", "op": "==", "value": "Fasteners" }],
                "orderBy": [{ "field": "name", "direction": "DESC" }],
                "limit": 5
            })
        );
    }
}
