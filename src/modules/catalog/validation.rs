//! Validation and normalization of raw mutation payloads.
//!
//! A [`Schema`] is an ordered list of [`FieldRule`]s. Normalizing a
//! [`RawInput`] against it checks every field (no short-circuiting) and yields
//! the normalized [`Fields`] together with the failures in declaration order.
//! The normalized fields are kept even when validation fails so that the
//! caller can redisplay what was entered.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use time::macros::format_description;
use time::Date;

use crate::utils::escape_markup;

/// A raw field value as received from the caller.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RawValue {
    Scalar(String),
    Many(Vec<String>),
}

impl From<&str> for RawValue {
    fn from(value: &str) -> Self {
        RawValue::Scalar(value.to_string())
    }
}

impl From<Vec<&str>> for RawValue {
    fn from(values: Vec<&str>) -> Self {
        RawValue::Many(values.into_iter().map(str::to_string).collect())
    }
}

/// Raw mutation payload keyed by field name.
pub type RawInput = BTreeMap<String, RawValue>;

/// A field value after normalization.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum FieldValue {
    Absent,
    Text(String),
    List(Vec<String>),
    Date(Date),
}

/// Normalized fields keyed by field name.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(transparent)]
pub struct Fields(BTreeMap<&'static str, FieldValue>);

impl Fields {
    pub fn get(&self, name: &str) -> Option<&FieldValue> {
        self.0.get(name)
    }

    /// Text value, or `""` when absent or not text.
    pub fn text(&self, name: &str) -> &str {
        match self.0.get(name) {
            Some(FieldValue::Text(value)) => value,
            _ => "",
        }
    }

    /// List value, or empty when absent or not a list.
    pub fn list(&self, name: &str) -> &[String] {
        match self.0.get(name) {
            Some(FieldValue::List(values)) => values,
            _ => &[],
        }
    }

    pub fn date(&self, name: &str) -> Option<Date> {
        match self.0.get(name) {
            Some(FieldValue::Date(date)) => Some(*date),
            _ => None,
        }
    }
}

/// One field-level validation failure.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FieldError {
    pub field: &'static str,
    pub message: String,
    /// The normalized value that was rejected.
    pub value: String,
}

impl FieldError {
    pub fn new(field: &'static str, message: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            field,
            message: message.into(),
            value: value.into(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Shape {
    Text,
    /// Multi-valued: a scalar becomes a one-element list, absence an empty list.
    Many,
    /// Optional ISO-8601 date; empty input counts as absent.
    Date { message: &'static str },
}

/// Rules applied to one field.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldRule {
    name: &'static str,
    shape: Shape,
    required: Option<&'static str>,
    max_len: Option<(usize, &'static str)>,
    choices: Option<(&'static [&'static str], &'static str)>,
    default: Option<&'static str>,
}

impl FieldRule {
    fn new(name: &'static str, shape: Shape) -> Self {
        Self {
            name,
            shape,
            required: None,
            max_len: None,
            choices: None,
            default: None,
        }
    }

    /// Single free-text value; trimmed then escaped.
    pub fn text(name: &'static str) -> Self {
        Self::new(name, Shape::Text)
    }

    pub fn many(name: &'static str) -> Self {
        Self::new(name, Shape::Many)
    }

    pub fn date(name: &'static str, message: &'static str) -> Self {
        Self::new(name, Shape::Date { message })
    }

    pub fn required(mut self, message: &'static str) -> Self {
        self.required = Some(message);
        self
    }

    /// Upper bound in characters, checked after escaping.
    pub fn max_len(mut self, max: usize, message: &'static str) -> Self {
        self.max_len = Some((max, message));
        self
    }

    pub fn one_of(mut self, choices: &'static [&'static str], message: &'static str) -> Self {
        self.choices = Some((choices, message));
        self
    }

    /// Value used when the field is absent or blank.
    pub fn default_value(mut self, value: &'static str) -> Self {
        self.default = Some(value);
        self
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    fn normalize(&self, raw: Option<&RawValue>, errors: &mut Vec<FieldError>) -> FieldValue {
        match self.shape {
            Shape::Text => self.normalize_text(raw, errors),
            Shape::Many => self.normalize_many(raw, errors),
            Shape::Date { message } => self.normalize_date(raw, message, errors),
        }
    }

    fn normalize_text(&self, raw: Option<&RawValue>, errors: &mut Vec<FieldError>) -> FieldValue {
        let scalar = match raw {
            Some(RawValue::Scalar(value)) => Some(value.as_str()),
            Some(RawValue::Many(values)) => values.first().map(String::as_str),
            None => None,
        };
        let value = escape_markup(scalar.unwrap_or_default().trim());

        if value.is_empty() {
            if let Some(message) = self.required {
                errors.push(FieldError::new(self.name, message, value.clone()));
                return FieldValue::Text(value);
            }
            return match self.default {
                Some(default) => FieldValue::Text(default.to_string()),
                None if scalar.is_none() => FieldValue::Absent,
                None => FieldValue::Text(value),
            };
        }

        if let Some(message) = self.check_value(&value) {
            errors.push(FieldError::new(self.name, message, value.clone()));
        }
        FieldValue::Text(value)
    }

    fn normalize_many(&self, raw: Option<&RawValue>, errors: &mut Vec<FieldError>) -> FieldValue {
        let values: Vec<String> = match raw {
            Some(RawValue::Scalar(value)) => vec![value.clone()],
            Some(RawValue::Many(values)) => values.clone(),
            None => Vec::new(),
        }
        .iter()
        .map(|value| escape_markup(value.trim()))
        .filter(|value| !value.is_empty())
        .collect();

        if values.is_empty() {
            if let Some(message) = self.required {
                errors.push(FieldError::new(self.name, message, ""));
            }
        } else if let Some((value, message)) = values
            .iter()
            .find_map(|value| self.check_value(value).map(|message| (value, message)))
        {
            errors.push(FieldError::new(self.name, message, value.clone()));
        }
        FieldValue::List(values)
    }

    fn normalize_date(
        &self,
        raw: Option<&RawValue>,
        message: &'static str,
        errors: &mut Vec<FieldError>,
    ) -> FieldValue {
        let text = match raw {
            Some(RawValue::Scalar(value)) => value.trim(),
            Some(RawValue::Many(values)) => values.first().map(|v| v.trim()).unwrap_or_default(),
            None => "",
        };

        if text.is_empty() {
            if let Some(required) = self.required {
                errors.push(FieldError::new(self.name, required, ""));
            }
            return FieldValue::Absent;
        }

        match parse_iso_date(text) {
            Some(date) => FieldValue::Date(date),
            None => {
                let value = escape_markup(text);
                errors.push(FieldError::new(self.name, message, value.clone()));
                FieldValue::Text(value)
            }
        }
    }

    /// Length and membership checks on a non-empty normalized value.
    fn check_value(&self, value: &str) -> Option<&'static str> {
        if let Some((max, message)) = self.max_len {
            if value.chars().count() > max {
                return Some(message);
            }
        }
        if let Some((choices, message)) = self.choices {
            if !choices.contains(&value) {
                return Some(message);
            }
        }
        None
    }
}

/// Accepts `YYYY-MM-DD`, optionally followed by an ISO-8601 time part.
fn parse_iso_date(text: &str) -> Option<Date> {
    let date_part = match text.split_once('T') {
        Some((date, _time)) => date,
        None => text,
    };
    Date::parse(date_part, format_description!("[year]-[month]-[day]")).ok()
}

/// Ordered field rules for one kind of draft.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Schema {
    rules: Vec<FieldRule>,
}

impl Schema {
    pub fn new(rules: Vec<FieldRule>) -> Self {
        Self { rules }
    }

    pub fn rules(&self) -> &[FieldRule] {
        &self.rules
    }

    fn position(&self, field: &str) -> usize {
        self.rules
            .iter()
            .position(|rule| rule.name == field)
            .unwrap_or(self.rules.len())
    }

    /// Normalize every declared field; unknown input fields are ignored.
    pub fn normalize(&self, input: &RawInput) -> Normalized {
        let mut fields = BTreeMap::new();
        let mut errors = Vec::new();

        for rule in &self.rules {
            let value = rule.normalize(input.get(rule.name), &mut errors);
            fields.insert(rule.name, value);
        }

        Normalized {
            fields: Fields(fields),
            errors,
        }
    }

    /// Merge late failures (e.g. unresolved references) keeping declaration order.
    pub fn merge_errors(&self, normalized: &mut Normalized, extra: Vec<FieldError>) {
        normalized.errors.extend(extra);
        normalized
            .errors
            .sort_by_key(|error| self.position(error.field));
    }
}

/// Output of [`Schema::normalize`].
#[derive(Debug, Clone, PartialEq)]
pub struct Normalized {
    pub fields: Fields,
    pub errors: Vec<FieldError>,
}

impl Normalized {
    pub fn is_valid(&self) -> bool {
        self.errors.is_empty()
    }

    pub fn has_error(&self, field: &str) -> bool {
        self.errors.iter().any(|error| error.field == field)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use time::macros::date;

    fn input(pairs: &[(&str, RawValue)]) -> RawInput {
        pairs
            .iter()
            .map(|(key, value)| (key.to_string(), value.clone()))
            .collect()
    }

    fn work_like() -> Schema {
        Schema::new(vec![
            FieldRule::text("title").required("Title must not be empty."),
            FieldRule::text("summary").required("Summary must not be empty."),
            FieldRule::many("genres"),
        ])
    }

    #[test]
    fn required_fields_are_all_reported_in_order() {
        let normalized = work_like().normalize(&input(&[
            ("summary", "   ".into()),
            ("title", "".into()),
        ]));

        let fields: Vec<_> = normalized.errors.iter().map(|e| e.field).collect();
        assert_eq!(fields, ["title", "summary"]);
        assert!(!normalized.is_valid());
    }

    #[test]
    fn text_is_trimmed_then_escaped() {
        let normalized = work_like().normalize(&input(&[
            ("title", "  <i>Dune</i>  ".into()),
            ("summary", "Spice".into()),
        ]));

        assert!(normalized.is_valid());
        assert_eq!(normalized.fields.text("title"), "&lt;i&gt;Dune&lt;&#x2F;i&gt;");
    }

    #[test]
    fn many_coerces_scalar_list_and_absence() {
        let schema = work_like();

        let scalar = schema.normalize(&input(&[("genres", "g1".into())]));
        assert_eq!(scalar.fields.list("genres"), ["g1"]);

        let many = schema.normalize(&input(&[("genres", vec!["g1", "g2"].into())]));
        assert_eq!(many.fields.list("genres"), ["g1", "g2"]);

        let absent = schema.normalize(&RawInput::new());
        assert_eq!(absent.fields.get("genres"), Some(&FieldValue::List(vec![])));
    }

    #[test]
    fn max_length_counts_escaped_characters() {
        let schema = Schema::new(vec![FieldRule::text("name")
            .required("required")
            .max_len(5, "too long")]);

        assert!(schema.normalize(&input(&[("name", "abcde".into())])).is_valid());

        // "a&b" escapes to "a&amp;b", seven characters.
        let normalized = schema.normalize(&input(&[("name", "a&b".into())]));
        assert_eq!(normalized.errors[0].message, "too long");
        assert_eq!(normalized.errors[0].value, "a&amp;b");
    }

    #[test]
    fn choices_and_defaults() {
        let schema = Schema::new(vec![FieldRule::text("status")
            .one_of(&["Available", "Loaned"], "Invalid status.")
            .default_value("Available")]);

        let defaulted = schema.normalize(&RawInput::new());
        assert!(defaulted.is_valid());
        assert_eq!(defaulted.fields.text("status"), "Available");

        let rejected = schema.normalize(&input(&[("status", "Lost".into())]));
        assert_eq!(rejected.errors[0].message, "Invalid status.");
        assert_eq!(rejected.fields.text("status"), "Lost");
    }

    #[test]
    fn optional_text_without_default_is_absent() {
        let schema = Schema::new(vec![FieldRule::text("note")]);
        let normalized = schema.normalize(&RawInput::new());
        assert_eq!(normalized.fields.get("note"), Some(&FieldValue::Absent));
    }

    #[test]
    fn dates_parse_or_fail_with_raw_value_kept() {
        let schema = Schema::new(vec![FieldRule::date("due_back", "Invalid date.")]);

        let blank = schema.normalize(&input(&[("due_back", "".into())]));
        assert!(blank.is_valid());
        assert_eq!(blank.fields.date("due_back"), None);

        let parsed = schema.normalize(&input(&[("due_back", "2024-03-01T10:00:00Z".into())]));
        assert_eq!(parsed.fields.date("due_back"), Some(date!(2024 - 03 - 01)));

        let invalid = schema.normalize(&input(&[("due_back", "next week".into())]));
        assert_eq!(invalid.errors[0].field, "due_back");
        assert_eq!(invalid.fields.text("due_back"), "next week");
    }

    #[test]
    fn merged_errors_follow_declaration_order() {
        let schema = work_like();
        let mut normalized = schema.normalize(&input(&[("title", "Dune".into())]));
        schema.merge_errors(
            &mut normalized,
            vec![FieldError::new("genres", "Genre not found.", "g9")],
        );
        schema.merge_errors(
            &mut normalized,
            vec![FieldError::new("title", "duplicate", "Dune")],
        );

        let fields: Vec<_> = normalized.errors.iter().map(|e| e.field).collect();
        assert_eq!(fields, ["title", "summary", "genres"]);
    }

    #[test]
    fn raw_values_deserialize_untagged() {
        let raw: RawInput =
            serde_json::from_str(r#"{"title": "Dune", "genres": ["g1", "g2"]}"#).unwrap();
        assert_eq!(raw["title"], RawValue::Scalar("Dune".to_string()));
        assert_eq!(raw["genres"], RawValue::from(vec!["g1", "g2"]));
    }
}
