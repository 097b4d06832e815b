//! Field descriptors and record coercion shared by every entity.
//!
//! Each entity publishes an [`EntitySchema`]: the ordered list of its fields
//! with their kinds. Codecs that flatten values to text (CSV cells, XML
//! element bodies, SQL columns) and the lenient record readers all consult
//! the same table.

use chrono::{DateTime, NaiveDate, NaiveDateTime, SecondsFormat, SubsecRound, TimeZone, Utc};
use serde_json::Value;

use crate::error::{AppError, AppResult};

/// The dictionary form of an entity. Key order follows the schema.
pub type Record = serde_json::Map<String, Value>;

/// Separator used when a list field is flattened to a single text value
pub const LIST_SEPARATOR: char = ';';

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldKind {
    Text,
    OptText,
    Int,
    OptInt,
    Bool,
    DateTime,
    OptDateTime,
    OptDate,
    TextList,
}

#[derive(Debug, Clone, Copy)]
pub struct FieldDef {
    pub name: &'static str,
    pub kind: FieldKind,
    /// Never returned by the REST API
    pub sensitive: bool,
}

impl FieldDef {
    pub const fn new(name: &'static str, kind: FieldKind) -> Self {
        Self {
            name,
            kind,
            sensitive: false,
        }
    }

    pub const fn sensitive(name: &'static str, kind: FieldKind) -> Self {
        Self {
            name,
            kind,
            sensitive: true,
        }
    }
}

/// How an entity is laid out in the SQLite backend
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SqlLayout {
    /// One column per field
    Columns,
    /// `(id TEXT PRIMARY KEY, data TEXT)` with the record serialized as JSON
    JsonBlob,
}

#[derive(Debug)]
pub struct EntitySchema {
    /// Singular, lowercase (`book`); also the XML record element
    pub name: &'static str,
    /// Collection name (`books`); file stem, table name and JSON root key
    pub plural: &'static str,
    pub layout: SqlLayout,
    pub fields: &'static [FieldDef],
}

impl EntitySchema {
    pub fn field(&self, name: &str) -> Option<&'static FieldDef> {
        self.fields.iter().find(|f| f.name == name)
    }

    pub fn field_names(&self) -> Vec<&'static str> {
        self.fields.iter().map(|f| f.name).collect()
    }

    /// Coerce a flat text value (CSV cell, XML body) into its typed form.
    pub fn value_from_text(&self, field: &str, text: &str) -> Result<Value, String> {
        match self.field(field) {
            Some(def) => def.kind.from_text(text),
            None => Ok(Value::String(text.to_string())),
        }
    }

    /// Drop fields flagged as sensitive.
    pub fn public_record(&self, mut record: Record) -> Record {
        for field in self.fields.iter().filter(|f| f.sensitive) {
            record.remove(field.name);
        }
        record
    }
}

impl FieldKind {
    /// Fields compared by case-insensitive substring in searches
    pub fn is_textual(&self) -> bool {
        matches!(self, FieldKind::Text | FieldKind::OptText)
    }

    /// Render a record value as flat text. Missing and null values become "".
    pub fn to_text(&self, value: Option<&Value>) -> String {
        match value {
            None | Some(Value::Null) => String::new(),
            Some(Value::Bool(true)) => "True".to_string(),
            Some(Value::Bool(false)) => "False".to_string(),
            Some(Value::String(s)) => s.clone(),
            Some(Value::Number(n)) => n.to_string(),
            Some(Value::Array(items)) => items
                .iter()
                .map(|item| match item {
                    Value::String(s) => s.clone(),
                    other => other.to_string(),
                })
                .collect::<Vec<_>>()
                .join(&LIST_SEPARATOR.to_string()),
            Some(other @ Value::Object(_)) => other.to_string(),
        }
    }

    /// Inverse of [`FieldKind::to_text`].
    pub fn from_text(&self, text: &str) -> Result<Value, String> {
        match self {
            FieldKind::Text => Ok(Value::String(text.to_string())),
            FieldKind::OptText
            | FieldKind::DateTime
            | FieldKind::OptDateTime
            | FieldKind::OptDate => {
                if text.is_empty() {
                    Ok(Value::Null)
                } else {
                    Ok(Value::String(text.to_string()))
                }
            }
            FieldKind::Int | FieldKind::OptInt => {
                let trimmed = text.trim();
                if trimmed.is_empty() {
                    return Ok(Value::Null);
                }
                trimmed
                    .parse::<i64>()
                    .map(Value::from)
                    .map_err(|_| format!("'{}' is not an integer", text))
            }
            FieldKind::Bool => match text.trim() {
                "" => Ok(Value::Null),
                "True" | "true" | "1" => Ok(Value::Bool(true)),
                "False" | "false" | "0" => Ok(Value::Bool(false)),
                other => Err(format!("'{}' is not a boolean", other)),
            },
            FieldKind::TextList => Ok(Value::Array(
                split_list(text).into_iter().map(Value::String).collect(),
            )),
        }
    }
}

fn split_list(text: &str) -> Vec<String> {
    text.split(LIST_SEPARATOR)
        .map(str::trim)
        .filter(|token| !token.is_empty())
        .map(str::to_string)
        .collect()
}

pub fn record_id(record: &Record) -> Option<&str> {
    record.get("id").and_then(Value::as_str)
}

/// Id of a record read back from storage: a non-blank string or a number.
pub fn stored_id(record: &Record) -> Option<String> {
    match record.get("id")? {
        Value::String(id) if !id.trim().is_empty() => Some(id.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

/// Unwrap a `json!({...})` literal into a record.
pub fn into_record(value: Value) -> Record {
    match value {
        Value::Object(map) => map,
        _ => Record::new(),
    }
}

// ----------------------------------------------------------------------------
// Timestamps
// ----------------------------------------------------------------------------

/// Current time truncated to the precision every backend can store.
pub fn now() -> DateTime<Utc> {
    Utc::now().trunc_subsecs(6)
}

pub fn format_datetime(value: &DateTime<Utc>) -> String {
    value.to_rfc3339_opts(SecondsFormat::Micros, true)
}

pub fn format_date(value: &NaiveDate) -> String {
    value.format("%Y-%m-%d").to_string()
}

/// Accepts RFC 3339, naive ISO datetimes (assumed UTC) and bare dates.
pub fn parse_datetime(text: &str) -> Option<DateTime<Utc>> {
    let text = text.trim();
    if let Ok(parsed) = DateTime::parse_from_rfc3339(text) {
        return Some(parsed.with_timezone(&Utc).trunc_subsecs(6));
    }
    for format in ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f"] {
        if let Ok(naive) = NaiveDateTime::parse_from_str(text, format) {
            return Some(Utc.from_utc_datetime(&naive).trunc_subsecs(6));
        }
    }
    NaiveDate::parse_from_str(text, "%Y-%m-%d")
        .ok()
        .and_then(|date| date.and_hms_opt(0, 0, 0))
        .map(|naive| Utc.from_utc_datetime(&naive))
}

pub fn parse_date(text: &str) -> Option<NaiveDate> {
    NaiveDate::parse_from_str(text.trim(), "%Y-%m-%d")
        .ok()
        .or_else(|| parse_datetime(text).map(|dt| dt.date_naive()))
}

// ----------------------------------------------------------------------------
// Defensive record reading
// ----------------------------------------------------------------------------

/// Typed accessors over a record that tolerate textual encodings and fall
/// back to defaults for absent fields. Unknown keys are never looked at.
pub struct RecordReader<'a> {
    record: &'a Record,
    entity: &'static str,
}

impl<'a> RecordReader<'a> {
    pub fn new(record: &'a Record, entity: &'static str) -> Self {
        Self { record, entity }
    }

    fn get(&self, field: &str) -> Option<&'a Value> {
        match self.record.get(field) {
            None | Some(Value::Null) => None,
            Some(value) => Some(value),
        }
    }

    fn invalid(&self, field: &str, value: &dyn std::fmt::Display, expected: &str) -> AppError {
        AppError::Validation(format!(
            "{}: field '{}' expects {}, got {}",
            self.entity, field, expected, value
        ))
    }

    /// Existing id, or a fresh UUID v4 for a record that is being created.
    pub fn id(&self) -> String {
        self.opt_text("id")
            .unwrap_or_else(|| uuid::Uuid::new_v4().to_string())
    }

    pub fn text(&self, field: &str) -> String {
        self.text_or(field, "")
    }

    pub fn text_or(&self, field: &str, default: &str) -> String {
        match self.get(field) {
            None => default.to_string(),
            Some(Value::String(s)) => s.clone(),
            Some(other) => other.to_string(),
        }
    }

    /// Empty strings read as `None`.
    pub fn opt_text(&self, field: &str) -> Option<String> {
        match self.get(field) {
            None => None,
            Some(Value::String(s)) if s.is_empty() => None,
            Some(Value::String(s)) => Some(s.clone()),
            Some(other) => Some(other.to_string()),
        }
    }

    pub fn opt_int(&self, field: &str) -> AppResult<Option<i64>> {
        match self.get(field) {
            None => Ok(None),
            Some(Value::Number(n)) => n
                .as_i64()
                .or_else(|| n.as_f64().filter(|f| f.fract() == 0.0).map(|f| f as i64))
                .map(Some)
                .ok_or_else(|| self.invalid(field, n, "an integer")),
            Some(Value::String(s)) => {
                let trimmed = s.trim();
                if trimmed.is_empty() {
                    return Ok(None);
                }
                trimmed
                    .parse::<i64>()
                    .map(Some)
                    .map_err(|_| self.invalid(field, s, "an integer"))
            }
            Some(other) => Err(self.invalid(field, other, "an integer")),
        }
    }

    pub fn int_or(&self, field: &str, default: i64) -> AppResult<i64> {
        Ok(self.opt_int(field)?.unwrap_or(default))
    }

    pub fn bool_or(&self, field: &str, default: bool) -> AppResult<bool> {
        match self.get(field) {
            None => Ok(default),
            Some(Value::Bool(b)) => Ok(*b),
            Some(Value::Number(n)) if n.as_i64() == Some(0) => Ok(false),
            Some(Value::Number(n)) if n.as_i64() == Some(1) => Ok(true),
            Some(Value::String(s)) => match FieldKind::Bool.from_text(s) {
                Ok(Value::Bool(b)) => Ok(b),
                Ok(_) => Ok(default),
                Err(_) => Err(self.invalid(field, s, "a boolean")),
            },
            Some(other) => Err(self.invalid(field, other, "a boolean")),
        }
    }

    pub fn opt_datetime(&self, field: &str) -> AppResult<Option<DateTime<Utc>>> {
        match self.get(field) {
            None => Ok(None),
            Some(Value::String(s)) if s.trim().is_empty() => Ok(None),
            Some(Value::String(s)) => parse_datetime(s)
                .map(Some)
                .ok_or_else(|| self.invalid(field, s, "an ISO-8601 datetime")),
            Some(other) => Err(self.invalid(field, other, "an ISO-8601 datetime")),
        }
    }

    pub fn datetime_or_now(&self, field: &str) -> AppResult<DateTime<Utc>> {
        Ok(self.opt_datetime(field)?.unwrap_or_else(now))
    }

    pub fn opt_date(&self, field: &str) -> AppResult<Option<NaiveDate>> {
        match self.get(field) {
            None => Ok(None),
            Some(Value::String(s)) if s.trim().is_empty() => Ok(None),
            Some(Value::String(s)) => parse_date(s)
                .map(Some)
                .ok_or_else(|| self.invalid(field, s, "an ISO-8601 date")),
            Some(other) => Err(self.invalid(field, other, "an ISO-8601 date")),
        }
    }

    /// Accepts a JSON array or a `;`-joined string.
    pub fn list(&self, field: &str) -> Vec<String> {
        match self.get(field) {
            None => Vec::new(),
            Some(Value::Array(items)) => items
                .iter()
                .filter_map(|item| match item {
                    Value::String(s) if !s.is_empty() => Some(s.clone()),
                    Value::String(_) | Value::Null => None,
                    other => Some(other.to_string()),
                })
                .collect(),
            Some(Value::String(s)) => split_list(s),
            Some(other) => vec![other.to_string()],
        }
    }
}

/// Reject blank required text.
pub fn require_non_blank(entity: &str, field: &str, value: &str) -> AppResult<()> {
    if value.trim().is_empty() {
        return Err(AppError::Validation(format!(
            "{}: {} is required",
            entity, field
        )));
    }
    Ok(())
}
