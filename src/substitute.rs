use chrono::{DateTime, SecondsFormat, Utc};
use lazy_static::lazy_static;
use regex::{Captures, Regex};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::HashMap;

lazy_static! {
    // $name | [[name]] | [[name:format]] | ${name} | ${name:format}
    static ref VARIABLE_PATTERN: Regex =
        Regex::new(r"\$(\w+)|\[\[(\w+?)(?::([^\]]+))?\]\]|\$\{(\w+)(?::([^}]+))?\}").unwrap();
}

/// Resolves variable references embedded in query text.
pub trait VariableContext: Send + Sync {
    fn replace(&self, text: &str) -> String;
}

impl<F> VariableContext for F
where
    F: Fn(&str) -> String + Send + Sync,
{
    fn replace(&self, text: &str) -> String {
        self(text)
    }
}

/// Resolve variables in every string-valued parameter.
///
/// Numbers, booleans, arrays and objects are copied through untouched, so the
/// context is consulted once per string parameter and never otherwise.
pub fn substitute_parameters(
    parameters: &Map<String, Value>,
    context: &dyn VariableContext,
) -> Map<String, Value> {
    parameters
        .iter()
        .map(|(name, value)| {
            let value = match value {
                Value::String(text) => Value::String(context.replace(text)),
                other => other.clone(),
            };
            (name.clone(), value)
        })
        .collect()
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum VariableValue {
    Single(String),
    Multi(Vec<String>),
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TimeRange {
    pub from: DateTime<Utc>,
    pub to: DateTime<Utc>,
}

/// Dashboard variables plus the `__from` / `__to` built-ins of the query range.
#[derive(Debug, Clone, Default)]
pub struct TemplateVariables {
    variables: HashMap<String, VariableValue>,
    range: Option<TimeRange>,
}

impl TemplateVariables {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_range(mut self, range: TimeRange) -> Self {
        self.range = Some(range);
        self
    }

    pub fn with_variable(mut self, name: impl Into<String>, value: VariableValue) -> Self {
        self.variables.insert(name.into(), value);
        self
    }

    fn resolve(&self, name: &str, format: Option<&str>) -> Option<String> {
        match name {
            "__from" => self.range.map(|r| format_time(r.from, format)),
            "__to" => self.range.map(|r| format_time(r.to, format)),
            _ => self
                .variables
                .get(name)
                .and_then(|value| format_value(value, format)),
        }
    }
}

impl VariableContext for TemplateVariables {
    fn replace(&self, text: &str) -> String {
        VARIABLE_PATTERN
            .replace_all(text, |caps: &Captures| {
                let (name, format) = if let Some(name) = caps.get(1) {
                    (name.as_str(), None)
                } else if let Some(name) = caps.get(2) {
                    (name.as_str(), caps.get(3).map(|f| f.as_str()))
                } else {
                    let name = caps.get(4).map_or("", |m| m.as_str());
                    (name, caps.get(5).map(|f| f.as_str()))
                };
                self.resolve(name, format)
                    .unwrap_or_else(|| caps[0].to_string())
            })
            .into_owned()
    }
}

fn format_time(time: DateTime<Utc>, format: Option<&str>) -> String {
    match format {
        Some("date") | Some("date:iso") => time.to_rfc3339_opts(SecondsFormat::Millis, true),
        Some("date:seconds") => time.timestamp().to_string(),
        _ => time.timestamp_millis().to_string(),
    }
}

fn format_value(value: &VariableValue, format: Option<&str>) -> Option<String> {
    match value {
        VariableValue::Single(v) => match format {
            Some("json") => serde_json::to_string(v).ok(),
            _ => Some(v.clone()),
        },
        VariableValue::Multi(values) => match format {
            Some("csv") | Some("raw") => Some(values.join(",")),
            Some("pipe") => Some(values.join("|")),
            Some("json") => serde_json::to_string(values).ok(),
            _ if values.len() == 1 => Some(values[0].clone()),
            _ => Some(format!("{{{}}}", values.join(","))),
        },
    }
}
