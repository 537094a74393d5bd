use jsonschema::{Draft, JSONSchema};
use serde_json::Value;

use crate::error::{ResolveError, ResolveResult};
use crate::model::Operation;

const DECLARATION_SCHEMA: &str = include_str!("../../schemas/declaration.json");
const CRUD_OPERATION_SCHEMA: &str = include_str!("../../schemas/crud_operation.json");

/// Schemas a document can be checked against.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchemaId {
    /// An operation entry of a descriptor file.
    Declaration,
    /// An operation body submitted over HTTP (`imports` with an `@id`).
    CrudOperation,
}

/// Structural validation of JSON documents.
pub trait SchemaValidator: Send + Sync {
    /// `Err` carries one human-readable line per violation.
    fn validate(&self, schema: SchemaId, document: &Value) -> Result<(), Vec<String>>;
}

/// Validator backed by the bundled draft-07 schemas.
pub struct JsonSchemaValidator {
    declaration: JSONSchema,
    crud_operation: JSONSchema,
}

impl JsonSchemaValidator {
    pub fn new() -> anyhow::Result<Self> {
        Ok(Self {
            declaration: compile(DECLARATION_SCHEMA)?,
            crud_operation: compile(CRUD_OPERATION_SCHEMA)?,
        })
    }
}

fn compile(source: &str) -> anyhow::Result<JSONSchema> {
    let schema: Value = serde_json::from_str(source)?;
    JSONSchema::options()
        .with_draft(Draft::Draft7)
        .compile(&schema)
        .map_err(|e| anyhow::anyhow!("invalid bundled schema: {}", e))
}

impl SchemaValidator for JsonSchemaValidator {
    fn validate(&self, schema: SchemaId, document: &Value) -> Result<(), Vec<String>> {
        let compiled = match schema {
            SchemaId::Declaration => &self.declaration,
            SchemaId::CrudOperation => &self.crud_operation,
        };
        compiled.validate(document).map_err(|errors| {
            errors
                .map(|error| {
                    let path = error.instance_path.to_string();
                    if path.is_empty() {
                        error.to_string()
                    } else {
                        format!("{}: {}", path, error)
                    }
                })
                .collect()
        })
    }
}

/// Validate a raw declaration and convert it into a typed [`Operation`].
pub fn parse_operation(validator: &dyn SchemaValidator, raw: &Value) -> ResolveResult<Operation> {
    let name = raw
        .get("name")
        .and_then(Value::as_str)
        .unwrap_or("<unnamed>")
        .to_string();

    validator
        .validate(SchemaId::Declaration, raw)
        .map_err(|errors| ResolveError::BadDescriptor {
            message: format!("operation '{}' does not match the declaration schema", name),
            errors,
        })?;

    serde_json::from_value(raw.clone()).map_err(|e| ResolveError::BadDescriptor {
        message: format!("operation '{}' could not be read", name),
        errors: vec![e.to_string()],
    })
}
