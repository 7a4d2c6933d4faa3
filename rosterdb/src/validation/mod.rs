use crate::error::{Result, StoreError};
use crate::schema::{FieldDefinition, FieldType, TableDefinition};
use crate::FieldMap;
use serde_json::Value;

/// Result of checking a record against its table definition
#[derive(Debug, Clone, Default)]
pub struct ValidationResult {
    pub errors: Vec<String>,
}

impl ValidationResult {
    pub fn is_ok(&self) -> bool {
        self.errors.is_empty()
    }
}

/// Check every declared field of `record` against its type and constraints.
/// Fields the table does not declare are left alone.
pub fn validate_record(table: &TableDefinition, record: &FieldMap) -> ValidationResult {
    let mut result = ValidationResult::default();

    for field in &table.definitions {
        let value = record.get(&field.name).unwrap_or(&Value::Null);

        if value.is_null() {
            if field.constraints.not_null {
                result
                    .errors
                    .push(format!("{} cannot be null", field.name));
            }
            continue;
        }

        validate_field_value(field, value, &mut result);
    }

    result
}

fn validate_field_value(field: &FieldDefinition, value: &Value, result: &mut ValidationResult) {
    let name = &field.name;
    let constraints = &field.constraints;

    match &field.field_type {
        FieldType::String => {
            let Some(s) = value.as_str() else {
                result
                    .errors
                    .push(format!("{name} expected string, got {}", type_name(value)));
                return;
            };
            if let Some(length) = constraints.length {
                if s.chars().count() != length {
                    result
                        .errors
                        .push(format!("{name} must be exactly {length} characters long"));
                }
            }
        }
        FieldType::Integer => {
            let Some(n) = value.as_i64() else {
                result
                    .errors
                    .push(format!("{name} expected integer, got {}", type_name(value)));
                return;
            };
            check_range(name, n as f64, constraints.min, constraints.max, result);
        }
        FieldType::Number => {
            let Some(n) = value.as_f64() else {
                result
                    .errors
                    .push(format!("{name} expected number, got {}", type_name(value)));
                return;
            };
            check_range(name, n, constraints.min, constraints.max, result);
        }
        FieldType::Boolean => {
            if !value.is_boolean() {
                result
                    .errors
                    .push(format!("{name} expected boolean, got {}", type_name(value)));
            }
        }
        FieldType::Custom(_) => {}
    }
}

fn check_range(
    name: &str,
    value: f64,
    min: Option<i64>,
    max: Option<i64>,
    result: &mut ValidationResult,
) {
    if let Some(min) = min {
        if value < min as f64 {
            result.errors.push(format!("{name} must be at least {min}"));
        }
    }
    if let Some(max) = max {
        if value > max as f64 {
            result.errors.push(format!("{name} must be at most {max}"));
        }
    }
}

fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(n) if n.is_i64() || n.is_u64() => "integer",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "list",
        Value::Object(_) => "object",
    }
}

/// Validate and fail with a single error listing every problem
pub fn ensure_valid(table: &TableDefinition, record: &FieldMap) -> Result<()> {
    let result = validate_record(table, record);
    if !result.is_ok() {
        return Err(StoreError::Validation(format!(
            "{} record failed validation:\n  - {}",
            table.name,
            result.errors.join("\n  - ")
        )));
    }
    Ok(())
}
