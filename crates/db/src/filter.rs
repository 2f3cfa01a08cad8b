//! Filter predicates and sort orders evaluated against stored documents.

use std::cmp::Ordering;

use serde_json::Value;

use crate::Document;

#[derive(Debug, Clone, PartialEq)]
enum Clause {
    /// Field equals the value, or is an array containing it.
    Eq(String, Value),
    /// Field equals any of the values.
    In(String, Vec<Value>),
}

impl Clause {
    fn matches(&self, doc: &Document) -> bool {
        match self {
            Clause::Eq(field, expected) => doc
                .get(field)
                .is_some_and(|actual| value_matches(actual, expected)),
            Clause::In(field, candidates) => doc.get(field).is_some_and(|actual| {
                candidates
                    .iter()
                    .any(|candidate| value_matches(actual, candidate))
            }),
        }
    }
}

fn value_matches(actual: &Value, expected: &Value) -> bool {
    match actual {
        Value::Array(items) if !expected.is_array() => items.contains(expected),
        _ => actual == expected,
    }
}

/// Conjunction of field clauses. An empty filter matches every document.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Filter {
    clauses: Vec<Clause>,
}

impl Filter {
    /// Filter matching every document.
    pub fn all() -> Self {
        Self::default()
    }

    pub fn eq(field: impl Into<String>, value: impl Into<Value>) -> Self {
        Self::all().and_eq(field, value)
    }

    pub fn any_of<I, V>(field: impl Into<String>, values: I) -> Self
    where
        I: IntoIterator<Item = V>,
        V: Into<Value>,
    {
        Self::all().and_any_of(field, values)
    }

    pub fn and_eq(mut self, field: impl Into<String>, value: impl Into<Value>) -> Self {
        self.clauses.push(Clause::Eq(field.into(), value.into()));
        self
    }

    pub fn and_any_of<I, V>(mut self, field: impl Into<String>, values: I) -> Self
    where
        I: IntoIterator<Item = V>,
        V: Into<Value>,
    {
        self.clauses.push(Clause::In(
            field.into(),
            values.into_iter().map(Into::into).collect(),
        ));
        self
    }

    pub fn is_all(&self) -> bool {
        self.clauses.is_empty()
    }

    pub fn matches(&self, doc: &Document) -> bool {
        self.clauses.iter().all(|clause| clause.matches(doc))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Ascending,
    Descending,
}

/// Single-field sort order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Sort {
    pub field: String,
    pub direction: Direction,
}

impl Sort {
    pub fn ascending(field: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            direction: Direction::Ascending,
        }
    }

    pub fn descending(field: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            direction: Direction::Descending,
        }
    }

    pub fn compare(&self, a: &Document, b: &Document) -> Ordering {
        let ordering = compare_values(a.get(&self.field), b.get(&self.field));
        match self.direction {
            Direction::Ascending => ordering,
            Direction::Descending => ordering.reverse(),
        }
    }
}

fn rank(value: Option<&Value>) -> u8 {
    match value {
        None | Some(Value::Null) => 0,
        Some(Value::Bool(_)) => 1,
        Some(Value::Number(_)) => 2,
        Some(Value::String(_)) => 3,
        Some(Value::Array(_)) => 4,
        Some(Value::Object(_)) => 5,
    }
}

/// Total order over JSON values: null < bool < number < string < array < object.
fn compare_values(a: Option<&Value>, b: Option<&Value>) -> Ordering {
    match (a, b) {
        (Some(Value::Bool(x)), Some(Value::Bool(y))) => x.cmp(y),
        (Some(Value::Number(x)), Some(Value::Number(y))) => {
            let x = x.as_f64().unwrap_or(f64::NAN);
            let y = y.as_f64().unwrap_or(f64::NAN);
            x.partial_cmp(&y).unwrap_or(Ordering::Equal)
        }
        (Some(Value::String(x)), Some(Value::String(y))) => x.cmp(y),
        (Some(Value::Array(x)), Some(Value::Array(y))) => x.len().cmp(&y.len()),
        _ => rank(a).cmp(&rank(b)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn doc(value: Value) -> Document {
        match value {
            Value::Object(map) => map,
            _ => panic!("test documents must be objects"),
        }
    }

    #[test]
    fn eq_matches_scalar_field() {
        let d = doc(json!({"status": "Available"}));
        assert!(Filter::eq("status", "Available").matches(&d));
        assert!(!Filter::eq("status", "Loaned").matches(&d));
    }

    #[test]
    fn eq_matches_array_membership() {
        let d = doc(json!({"genres": ["g1", "g2"]}));
        assert!(Filter::eq("genres", "g2").matches(&d));
        assert!(!Filter::eq("genres", "g3").matches(&d));
    }

    #[test]
    fn missing_field_never_matches() {
        let d = doc(json!({"name": "Poetry"}));
        assert!(!Filter::eq("author", "a1").matches(&d));
        assert!(Filter::all().matches(&d));
    }

    #[test]
    fn any_of_matches_one_candidate() {
        let d = doc(json!({"id": "b"}));
        assert!(Filter::any_of("id", ["a", "b"]).matches(&d));
        assert!(!Filter::any_of("id", Vec::<String>::new()).matches(&d));
    }

    #[test]
    fn clauses_are_conjunctive() {
        let d = doc(json!({"book": "w1", "status": "Loaned"}));
        let filter = Filter::eq("book", "w1").and_eq("status", "Available");
        assert!(!filter.matches(&d));
    }

    #[test]
    fn sort_puts_missing_values_first() {
        let a = doc(json!({"name": "Zola"}));
        let b = doc(json!({}));
        assert_eq!(Sort::ascending("name").compare(&a, &b), Ordering::Greater);
        assert_eq!(Sort::descending("name").compare(&a, &b), Ordering::Less);
    }
}
