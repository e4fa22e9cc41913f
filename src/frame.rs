use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::{DataSourceError, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FieldType {
    Time,
    Number,
    String,
    Boolean,
    Other,
}

impl FieldType {
    /// Guess a field type from the first non-null value.
    pub fn guess(values: &[Value]) -> Self {
        match values.iter().find(|v| !v.is_null()) {
            Some(Value::Number(_)) => FieldType::Number,
            Some(Value::String(_)) => FieldType::String,
            Some(Value::Bool(_)) => FieldType::Boolean,
            _ => FieldType::Other,
        }
    }

    /// Map a column type name reported by a notebook table.
    pub fn from_column_type(name: &str) -> Self {
        match name {
            "string" => FieldType::String,
            "boolean" => FieldType::Boolean,
            "number" | "integer" => FieldType::Number,
            "datetime" => FieldType::Time,
            _ => FieldType::Other,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Field {
    pub name: String,
    #[serde(rename = "type")]
    pub field_type: FieldType,
    pub values: Vec<Value>,
}

impl Field {
    pub fn new(name: impl Into<String>, field_type: FieldType, values: Vec<Value>) -> Self {
        Self {
            name: name.into(),
            field_type,
            values,
        }
    }

    /// Field whose type is inferred from its values.
    pub fn untyped(name: impl Into<String>, values: Vec<Value>) -> Self {
        let field_type = FieldType::guess(&values);
        Self::new(name, field_type, values)
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

/// A named table of equal-length typed fields.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Frame {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ref_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    pub fields: Vec<Field>,
}

impl Frame {
    pub fn new(ref_id: Option<String>, name: Option<String>) -> Self {
        Self {
            ref_id,
            name,
            fields: Vec::new(),
        }
    }

    pub fn add_field(&mut self, field: Field) -> Result<()> {
        if let Some(first) = self.fields.first() {
            if first.len() != field.len() {
                return Err(DataSourceError::MalformedResult(format!(
                    "field '{}' has {} rows but the frame has {}",
                    field.name,
                    field.len(),
                    first.len()
                )));
            }
        }
        self.fields.push(field);
        Ok(())
    }

    /// Number of rows.
    pub fn len(&self) -> usize {
        self.fields.first().map_or(0, Field::len)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn field(&self, name: &str) -> Option<&Field> {
        self.fields.iter().find(|f| f.name == name)
    }

    pub fn row(&self, index: usize) -> Option<Vec<&Value>> {
        if index >= self.len() {
            return None;
        }
        Some(self.fields.iter().map(|f| &f.values[index]).collect())
    }
}
