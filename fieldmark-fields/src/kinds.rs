//! Field types and their per-kind capabilities.
//!
//! `FieldType` is a closed, tagged enum. Every variant wraps an options struct
//! implementing [`FieldKind`], and [`FieldType::kind`] is the single place that
//! dispatches from the enum to the capability.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Per-kind capabilities: validation, textual conversion, option listing.
///
/// Values are `serde_json::Value` throughout. `serialize` and `deserialize`
/// convert to and from the inline text form (`name:: value`); header-block
/// values are structured YAML and never pass through `deserialize`.
pub trait FieldKind {
    /// Check a value against this kind's constraints
    fn validate(&self, value: &Value) -> std::result::Result<(), String> {
        match value {
            Value::Object(_) => Err("expected a scalar value".to_string()),
            _ => Ok(()),
        }
    }

    /// Inline text form of a value
    fn serialize(&self, value: &Value) -> String {
        value_to_text(value)
    }

    /// Parse an inline text value
    fn deserialize(&self, raw: &str) -> Value {
        let raw = raw.trim();
        if raw.is_empty() {
            Value::Null
        } else {
            Value::String(raw.to_string())
        }
    }

    /// Human-facing rendering, e.g. select labels instead of values
    fn render(&self, value: &Value) -> String {
        self.serialize(value)
    }

    /// Allowed values, for kinds that enumerate them
    fn list_options(&self) -> Vec<String> {
        Vec::new()
    }

    fn is_multi(&self) -> bool {
        false
    }

    /// Value derived by an engine rather than typed by a person
    fn is_computed(&self) -> bool {
        false
    }

    /// Holds child fields (Object, ObjectList)
    fn is_container(&self) -> bool {
        false
    }

    /// Successor value for stepping kinds (cycle, boolean, number)
    fn next_value(&self, _current: &Value) -> Option<Value> {
        None
    }
}

/// A single option in a select, cycle or multi field.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SelectOption {
    pub value: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub color: Option<String>,
    #[serde(default)]
    pub order: i32,
}

impl SelectOption {
    pub fn new(value: impl Into<String>) -> Self {
        Self {
            value: value.into(),
            label: None,
            color: None,
            order: 0,
        }
    }

    pub fn display(&self) -> &str {
        self.label.as_deref().unwrap_or(&self.value)
    }
}

fn options_from(values: &[&str]) -> Vec<SelectOption> {
    values.iter().map(|v| SelectOption::new(*v)).collect()
}

/// The type of a field, with its per-kind options.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "kind", rename_all = "kebab-case")]
pub enum FieldType {
    Input(InputOptions),
    Number(NumberOptions),
    Date(DateOptions),
    #[serde(rename = "datetime")]
    DateTime(DateTimeOptions),
    Time(TimeOptions),
    Boolean(BooleanOptions),
    Select(SelectOptions),
    Cycle(CycleOptions),
    Multi(MultiOptions),
    File(FileOptions),
    MultiFile(MultiFileOptions),
    Media(FileOptions),
    MultiMedia(MultiFileOptions),
    Object(ObjectOptions),
    ObjectList(ObjectListOptions),
    Lookup(LookupOptions),
    Formula(FormulaOptions),
    Canvas(CanvasOptions),
    CanvasGroup(CanvasOptions),
    CanvasGroupLink(CanvasOptions),
    Json(RawOptions),
    Yaml(RawOptions),
}

impl FieldType {
    pub fn input() -> Self {
        Self::Input(InputOptions::default())
    }

    pub fn number() -> Self {
        Self::Number(NumberOptions::default())
    }

    pub fn boolean() -> Self {
        Self::Boolean(BooleanOptions::default())
    }

    pub fn date() -> Self {
        Self::Date(DateOptions::default())
    }

    pub fn select(values: &[&str]) -> Self {
        Self::Select(SelectOptions {
            values: options_from(values),
            source: None,
        })
    }

    pub fn cycle(values: &[&str]) -> Self {
        Self::Cycle(CycleOptions {
            values: options_from(values),
            allow_null: false,
        })
    }

    pub fn multi(values: &[&str]) -> Self {
        Self::Multi(MultiOptions {
            values: options_from(values),
            source: None,
        })
    }

    pub fn file() -> Self {
        Self::File(FileOptions::default())
    }

    pub fn multi_file() -> Self {
        Self::MultiFile(MultiFileOptions::default())
    }

    pub fn object() -> Self {
        Self::Object(ObjectOptions::default())
    }

    pub fn object_list() -> Self {
        Self::ObjectList(ObjectListOptions::default())
    }

    pub fn lookup(options: LookupOptions) -> Self {
        Self::Lookup(options)
    }

    pub fn formula(expression: impl Into<String>) -> Self {
        Self::Formula(FormulaOptions {
            formula: expression.into(),
            auto_update: true,
        })
    }

    /// The capability implementation behind this type
    pub fn kind(&self) -> &dyn FieldKind {
        match self {
            Self::Input(o) => o,
            Self::Number(o) => o,
            Self::Date(o) => o,
            Self::DateTime(o) => o,
            Self::Time(o) => o,
            Self::Boolean(o) => o,
            Self::Select(o) => o,
            Self::Cycle(o) => o,
            Self::Multi(o) => o,
            Self::File(o) | Self::Media(o) => o,
            Self::MultiFile(o) | Self::MultiMedia(o) => o,
            Self::Object(o) => o,
            Self::ObjectList(o) => o,
            Self::Lookup(o) => o,
            Self::Formula(o) => o,
            Self::Canvas(o) | Self::CanvasGroup(o) | Self::CanvasGroupLink(o) => o,
            Self::Json(o) => o,
            Self::Yaml(o) => o,
        }
    }

    /// Kebab-case name, as written in class files
    pub fn name(&self) -> &'static str {
        match self {
            Self::Input(_) => "input",
            Self::Number(_) => "number",
            Self::Date(_) => "date",
            Self::DateTime(_) => "datetime",
            Self::Time(_) => "time",
            Self::Boolean(_) => "boolean",
            Self::Select(_) => "select",
            Self::Cycle(_) => "cycle",
            Self::Multi(_) => "multi",
            Self::File(_) => "file",
            Self::MultiFile(_) => "multi-file",
            Self::Media(_) => "media",
            Self::MultiMedia(_) => "multi-media",
            Self::Object(_) => "object",
            Self::ObjectList(_) => "object-list",
            Self::Lookup(_) => "lookup",
            Self::Formula(_) => "formula",
            Self::Canvas(_) => "canvas",
            Self::CanvasGroup(_) => "canvas-group",
            Self::CanvasGroupLink(_) => "canvas-group-link",
            Self::Json(_) => "json",
            Self::Yaml(_) => "yaml",
        }
    }

    pub fn as_lookup(&self) -> Option<&LookupOptions> {
        match self {
            Self::Lookup(o) => Some(o),
            _ => None,
        }
    }

    pub fn as_formula(&self) -> Option<&FormulaOptions> {
        match self {
            Self::Formula(o) => Some(o),
            _ => None,
        }
    }

    /// Whether a computed field writes changes without being asked
    pub fn auto_update(&self) -> bool {
        match self {
            Self::Lookup(o) => o.auto_update,
            Self::Formula(o) => o.auto_update,
            _ => false,
        }
    }

    pub fn is_computed(&self) -> bool {
        self.kind().is_computed()
    }

    pub fn is_multi(&self) -> bool {
        self.kind().is_multi()
    }

    pub fn is_container(&self) -> bool {
        self.kind().is_container()
    }
}

/// Plain text form of a value. Lists are joined with `", "`.
pub fn value_to_text(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::String(s) => s.clone(),
        Value::Bool(b) => b.to_string(),
        Value::Number(n) => n.to_string(),
        Value::Array(items) => items
            .iter()
            .map(value_to_text)
            .filter(|s| !s.is_empty())
            .collect::<Vec<_>>()
            .join(", "),
        Value::Object(_) => serde_json::to_string(value).unwrap_or_default(),
    }
}

/// Split a comma-separated list, ignoring commas inside `[[...]]` links and quotes.
pub fn split_list(raw: &str) -> Vec<String> {
    let mut items = Vec::new();
    let mut current = String::new();
    let mut link_depth = 0usize;
    let mut in_quotes = false;
    let mut chars = raw.chars().peekable();
    while let Some(c) = chars.next() {
        match c {
            '[' if !in_quotes && chars.peek() == Some(&'[') => {
                chars.next();
                link_depth += 1;
                current.push_str("[[");
            }
            ']' if !in_quotes && link_depth > 0 && chars.peek() == Some(&']') => {
                chars.next();
                link_depth -= 1;
                current.push_str("]]");
            }
            '"' => {
                in_quotes = !in_quotes;
                current.push(c);
            }
            ',' if link_depth == 0 && !in_quotes => {
                push_item(&mut items, &current);
                current.clear();
            }
            _ => current.push(c),
        }
    }
    push_item(&mut items, &current);
    items
}

fn push_item(items: &mut Vec<String>, raw: &str) {
    let trimmed = raw.trim().trim_matches('"').trim();
    if !trimmed.is_empty() {
        items.push(trimmed.to_string());
    }
}

fn list_value(raw: &str) -> Value {
    let items = split_list(raw);
    if items.is_empty() {
        Value::Null
    } else {
        Value::Array(items.into_iter().map(Value::String).collect())
    }
}

/// Strip one level of `[[...]]`, keeping an alias-free target
fn unwrap_link(s: &str) -> &str {
    s.strip_prefix("[[")
        .and_then(|s| s.strip_suffix("]]"))
        .map(|s| s.split('|').next().unwrap_or(s))
        .unwrap_or(s)
}

fn as_number(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    }
}

fn number_value(n: f64) -> Value {
    if n.fract() == 0.0 && n.abs() < i64::MAX as f64 {
        Value::from(n as i64)
    } else {
        serde_json::Number::from_f64(n)
            .map(Value::Number)
            .unwrap_or(Value::Null)
    }
}

fn check_options(options: &[SelectOption], candidates: &[String]) -> std::result::Result<(), String> {
    if options.is_empty() {
        return Ok(());
    }
    for candidate in candidates {
        if !options.iter().any(|o| &o.value == candidate) {
            return Err(format!("'{candidate}' is not one of the allowed values"));
        }
    }
    Ok(())
}

fn strings_of(value: &Value) -> Vec<String> {
    match value {
        Value::Null => Vec::new(),
        Value::Array(items) => items.iter().map(value_to_text).collect(),
        Value::String(s) => split_list(s),
        other => vec![value_to_text(other)],
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct InputOptions {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub template: Option<String>,
}

impl FieldKind for InputOptions {}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct NumberOptions {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub min: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub step: Option<f64>,
}

impl FieldKind for NumberOptions {
    fn validate(&self, value: &Value) -> std::result::Result<(), String> {
        if value.is_null() {
            return Ok(());
        }
        let n = as_number(value).ok_or_else(|| format!("'{}' is not a number", value_to_text(value)))?;
        if let Some(min) = self.min {
            if n < min {
                return Err(format!("{n} is below the minimum {min}"));
            }
        }
        if let Some(max) = self.max {
            if n > max {
                return Err(format!("{n} is above the maximum {max}"));
            }
        }
        Ok(())
    }

    fn deserialize(&self, raw: &str) -> Value {
        let raw = raw.trim();
        match raw.parse::<f64>() {
            Ok(n) => number_value(n),
            Err(_) if raw.is_empty() => Value::Null,
            Err(_) => Value::String(raw.to_string()),
        }
    }

    fn next_value(&self, current: &Value) -> Option<Value> {
        let n = as_number(current).unwrap_or(0.0) + self.step.unwrap_or(1.0);
        let n = match self.max {
            Some(max) if n > max => max,
            _ => n,
        };
        Some(number_value(n))
    }
}

fn default_date_format() -> String {
    "%Y-%m-%d".to_string()
}

fn default_datetime_format() -> String {
    "%Y-%m-%dT%H:%M".to_string()
}

fn default_time_format() -> String {
    "%H:%M".to_string()
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DateOptions {
    #[serde(default = "default_date_format")]
    pub format: String,
    /// Write dates as `[[...]]` links
    #[serde(default)]
    pub as_link: bool,
}

impl Default for DateOptions {
    fn default() -> Self {
        Self {
            format: default_date_format(),
            as_link: false,
        }
    }
}

impl FieldKind for DateOptions {
    fn validate(&self, value: &Value) -> std::result::Result<(), String> {
        match value {
            Value::Null => Ok(()),
            Value::String(s) => chrono::NaiveDate::parse_from_str(unwrap_link(s.trim()), &self.format)
                .map(|_| ())
                .map_err(|e| format!("'{s}' does not match {}: {e}", self.format)),
            other => Err(format!("'{}' is not a date", value_to_text(other))),
        }
    }

    fn serialize(&self, value: &Value) -> String {
        let text = value_to_text(value);
        if self.as_link && !text.is_empty() && !text.starts_with("[[") {
            format!("[[{text}]]")
        } else {
            text
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DateTimeOptions {
    #[serde(default = "default_datetime_format")]
    pub format: String,
}

impl Default for DateTimeOptions {
    fn default() -> Self {
        Self {
            format: default_datetime_format(),
        }
    }
}

impl FieldKind for DateTimeOptions {
    fn validate(&self, value: &Value) -> std::result::Result<(), String> {
        match value {
            Value::Null => Ok(()),
            Value::String(s) => {
                chrono::NaiveDateTime::parse_from_str(unwrap_link(s.trim()), &self.format)
                    .map(|_| ())
                    .map_err(|e| format!("'{s}' does not match {}: {e}", self.format))
            }
            other => Err(format!("'{}' is not a date-time", value_to_text(other))),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TimeOptions {
    #[serde(default = "default_time_format")]
    pub format: String,
}

impl Default for TimeOptions {
    fn default() -> Self {
        Self {
            format: default_time_format(),
        }
    }
}

impl FieldKind for TimeOptions {
    fn validate(&self, value: &Value) -> std::result::Result<(), String> {
        match value {
            Value::Null => Ok(()),
            Value::String(s) => chrono::NaiveTime::parse_from_str(s.trim(), &self.format)
                .map(|_| ())
                .map_err(|e| format!("'{s}' does not match {}: {e}", self.format)),
            other => Err(format!("'{}' is not a time", value_to_text(other))),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct BooleanOptions {}

impl FieldKind for BooleanOptions {
    fn validate(&self, value: &Value) -> std::result::Result<(), String> {
        match value {
            Value::Null | Value::Bool(_) => Ok(()),
            Value::String(s) if matches!(s.trim(), "true" | "false") => Ok(()),
            other => Err(format!("'{}' is not a boolean", value_to_text(other))),
        }
    }

    fn deserialize(&self, raw: &str) -> Value {
        match raw.trim() {
            "true" => Value::Bool(true),
            "false" => Value::Bool(false),
            "" => Value::Null,
            other => Value::String(other.to_string()),
        }
    }

    fn list_options(&self) -> Vec<String> {
        vec!["true".to_string(), "false".to_string()]
    }

    fn next_value(&self, current: &Value) -> Option<Value> {
        let current = match current {
            Value::Bool(b) => *b,
            Value::String(s) => s.trim() == "true",
            _ => false,
        };
        Some(Value::Bool(!current))
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct SelectOptions {
    pub values: Vec<SelectOption>,
    /// Note path whose lines provide the values instead of `values`
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,
}

impl FieldKind for SelectOptions {
    fn validate(&self, value: &Value) -> std::result::Result<(), String> {
        match value {
            Value::Null => Ok(()),
            Value::Array(_) | Value::Object(_) => Err("expected a single value".to_string()),
            other if self.source.is_none() => check_options(&self.values, &[value_to_text(other)]),
            _ => Ok(()),
        }
    }

    fn render(&self, value: &Value) -> String {
        let text = value_to_text(value);
        self.values
            .iter()
            .find(|o| o.value == text)
            .map(|o| o.display().to_string())
            .unwrap_or(text)
    }

    fn list_options(&self) -> Vec<String> {
        let mut values = self.values.clone();
        values.sort_by_key(|o| o.order);
        values.into_iter().map(|o| o.value).collect()
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct CycleOptions {
    pub values: Vec<SelectOption>,
    /// Cycle through an empty value after the last option
    pub allow_null: bool,
}

impl FieldKind for CycleOptions {
    fn validate(&self, value: &Value) -> std::result::Result<(), String> {
        match value {
            Value::Null => Ok(()),
            other => check_options(&self.values, &[value_to_text(other)]),
        }
    }

    fn list_options(&self) -> Vec<String> {
        self.values.iter().map(|o| o.value.clone()).collect()
    }

    fn next_value(&self, current: &Value) -> Option<Value> {
        let first = self.values.first()?;
        let text = value_to_text(current);
        let position = self.values.iter().position(|o| o.value == text);
        let next = match position {
            None => Some(first),
            Some(i) => self.values.get(i + 1),
        };
        Some(match next {
            Some(option) => Value::String(option.value.clone()),
            None if self.allow_null => Value::Null,
            None => Value::String(first.value.clone()),
        })
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct MultiOptions {
    pub values: Vec<SelectOption>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,
}

impl FieldKind for MultiOptions {
    fn validate(&self, value: &Value) -> std::result::Result<(), String> {
        if self.source.is_some() {
            return Ok(());
        }
        check_options(&self.values, &strings_of(value))
    }

    fn deserialize(&self, raw: &str) -> Value {
        list_value(raw)
    }

    fn list_options(&self) -> Vec<String> {
        self.values.iter().map(|o| o.value.clone()).collect()
    }

    fn is_multi(&self) -> bool {
        true
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct FileOptions {
    /// Selector query restricting the candidate notes
    #[serde(skip_serializing_if = "Option::is_none")]
    pub query: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub folders: Vec<String>,
}

impl FieldKind for FileOptions {
    fn validate(&self, value: &Value) -> std::result::Result<(), String> {
        match value {
            Value::Null | Value::String(_) => Ok(()),
            other => Err(format!("'{}' is not a link", value_to_text(other))),
        }
    }

    fn render(&self, value: &Value) -> String {
        unwrap_link(&value_to_text(value)).to_string()
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct MultiFileOptions {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub query: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub folders: Vec<String>,
}

impl FieldKind for MultiFileOptions {
    fn validate(&self, value: &Value) -> std::result::Result<(), String> {
        match value {
            Value::Object(_) => Err("expected a list of links".to_string()),
            _ => Ok(()),
        }
    }

    fn deserialize(&self, raw: &str) -> Value {
        list_value(raw)
    }

    fn render(&self, value: &Value) -> String {
        strings_of(value)
            .iter()
            .map(|s| unwrap_link(s))
            .collect::<Vec<_>>()
            .join(", ")
    }

    fn is_multi(&self) -> bool {
        true
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ObjectOptions {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub display_template: Option<String>,
}

impl FieldKind for ObjectOptions {
    fn validate(&self, value: &Value) -> std::result::Result<(), String> {
        match value {
            Value::Null | Value::Object(_) => Ok(()),
            _ => Err("expected an object".to_string()),
        }
    }

    fn deserialize(&self, raw: &str) -> Value {
        structured_value(raw)
    }

    fn is_container(&self) -> bool {
        true
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ObjectListOptions {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub item_display_template: Option<String>,
}

impl FieldKind for ObjectListOptions {
    fn validate(&self, value: &Value) -> std::result::Result<(), String> {
        match value {
            Value::Null => Ok(()),
            Value::Array(items) if items.iter().all(|i| i.is_object() || i.is_null()) => Ok(()),
            _ => Err("expected a list of objects".to_string()),
        }
    }

    fn deserialize(&self, raw: &str) -> Value {
        structured_value(raw)
    }

    fn is_multi(&self) -> bool {
        true
    }

    fn is_container(&self) -> bool {
        true
    }
}

fn structured_value(raw: &str) -> Value {
    let raw = raw.trim();
    if raw.is_empty() {
        return Value::Null;
    }
    serde_yaml_ng::from_str::<Value>(raw).unwrap_or_else(|_| Value::String(raw.to_string()))
}

/// How a lookup relates the current note to other notes.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "by", rename_all = "kebab-case")]
pub enum RelationMatch {
    /// Notes whose `field` links to the current note
    LinksTo { field: String },
    /// Notes the current note links to through its own `field`
    LinkedFrom { field: String },
    /// Notes tagged with `label`
    Label { label: String },
    /// Notes whose `color` header key equals `color`
    Color { color: String },
    /// Notes for which a boolean expression holds
    Predicate { expression: String },
}

/// Summaries computed without a user expression
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "kebab-case")]
pub enum SummarizingFunction {
    /// Related notes where the field is non-empty
    Count,
    /// All related notes
    CountAll,
    Sum,
    Average,
    Min,
    Max,
}

/// How lookup results are rendered into the field value.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(tag = "mode", rename_all = "kebab-case")]
pub enum LookupOutput {
    #[default]
    LinksList,
    LinksBulletList,
    CustomList { expression: String },
    CustomSummarizing { expression: String },
    BuiltinSummarizing {
        function: SummarizingFunction,
        field: String,
    },
}

impl LookupOutput {
    pub fn mode_name(&self) -> &'static str {
        match self {
            Self::LinksList => "links-list",
            Self::LinksBulletList => "links-bullet-list",
            Self::CustomList { .. } => "custom-list",
            Self::CustomSummarizing { .. } => "custom-summarizing",
            Self::BuiltinSummarizing { .. } => "builtin-summarizing",
        }
    }
}

fn default_true() -> bool {
    true
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LookupOptions {
    /// Pre-filter applied before the relation
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub query: Option<String>,
    pub relation: RelationMatch,
    #[serde(default)]
    pub output: LookupOutput,
    #[serde(default = "default_true")]
    pub auto_update: bool,
}

impl LookupOptions {
    pub fn new(relation: RelationMatch) -> Self {
        Self {
            query: None,
            relation,
            output: LookupOutput::default(),
            auto_update: true,
        }
    }

    pub fn with_output(mut self, output: LookupOutput) -> Self {
        self.output = output;
        self
    }

    pub fn with_auto_update(mut self, auto_update: bool) -> Self {
        self.auto_update = auto_update;
        self
    }

    pub fn with_query(mut self, query: impl Into<String>) -> Self {
        self.query = Some(query.into());
        self
    }
}

impl FieldKind for LookupOptions {
    fn is_computed(&self) -> bool {
        true
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct FormulaOptions {
    pub formula: String,
    #[serde(default = "default_true")]
    pub auto_update: bool,
}

impl FieldKind for FormulaOptions {
    fn is_computed(&self) -> bool {
        true
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct CanvasOptions {
    /// Canvas file the field is fed from
    #[serde(skip_serializing_if = "Option::is_none")]
    pub canvas_path: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub direction: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub node_colors: Vec<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub group_labels: Vec<String>,
}

impl FieldKind for CanvasOptions {
    fn deserialize(&self, raw: &str) -> Value {
        list_value(raw)
    }

    fn is_multi(&self) -> bool {
        true
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct RawOptions {}

impl FieldKind for RawOptions {
    fn validate(&self, _value: &Value) -> std::result::Result<(), String> {
        Ok(())
    }

    fn deserialize(&self, raw: &str) -> Value {
        structured_value(raw)
    }
}
