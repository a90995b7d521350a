// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

//! Field-spec evaluation against JSON payloads, and the canonical form of
//! typed-artifact tokens.
//!
//! Type semantics follow the contract table: `bool` is never an `int`,
//! `number` is int ∪ float (each excluding bool), and `none`/`null` are
//! synonyms. All checks collect every error rather than stopping at the
//! first, so a contract violation message lists the full damage.

use crate::plan::program::FieldSpec;
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;

/// Primitive type tokens accepted in artifact type positions.
const ARTIFACT_PRIMITIVE_TYPES: &[&str] = &[
    "any", "bool", "dict", "float", "int", "list", "none", "null", "number", "str",
];

/// Spellings collapsed at canonicalization time.
const ARTIFACT_TYPE_ALIASES: &[(&str, &str)] = &[
    ("array", "list"),
    ("boolean", "bool"),
    ("integer", "int"),
    ("object", "dict"),
    ("string", "str"),
];

/// Validate a payload against a field-spec list, returning one message per
/// violated spec. An empty result means the payload satisfies the contract.
pub fn validate_schema(payload: &Value, schema: &[FieldSpec]) -> Vec<String> {
    let mut errors = Vec::new();
    for field in schema {
        match resolve_path(payload, &field.path) {
            None => {
                if !field.optional {
                    errors.push(format!(
                        "missing required field '{}' (line {})",
                        field.path, field.line
                    ));
                }
            }
            Some(value) => {
                if !matches_type(value, &field.expected_type) {
                    errors.push(format!(
                        "field '{}' expected {} but got {} (line {})",
                        field.path,
                        field.expected_type,
                        value_type_name(value),
                        field.line
                    ));
                }
            }
        }
    }
    errors
}

/// Walk a dotted path through nested mappings. A missing key or a
/// non-mapping intermediate means the field is absent.
pub fn resolve_path<'a>(payload: &'a Value, path: &str) -> Option<&'a Value> {
    let mut current = payload;
    for token in path.split('.') {
        current = current.as_object()?.get(token)?;
    }
    Some(current)
}

/// Does `value` satisfy the expected-type token?
pub fn matches_type(value: &Value, expected_type: &str) -> bool {
    match expected_type {
        "any" => true,
        "none" | "null" => value.is_null(),
        "bool" => value.is_boolean(),
        "str" => value.is_string(),
        "int" => matches!(value, Value::Number(n) if n.is_i64() || n.is_u64()),
        "float" => matches!(value, Value::Number(n) if n.is_f64()),
        "number" => value.is_number(),
        "dict" => value.is_object(),
        "list" => value.is_array(),
        _ => false,
    }
}

/// The type token a value would be reported as in an error message.
pub fn value_type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "none",
        Value::Bool(_) => "bool",
        Value::Number(n) if n.is_f64() => "float",
        Value::Number(_) => "int",
        Value::String(_) => "str",
        Value::Array(_) => "list",
        Value::Object(_) => "dict",
    }
}

/// Canonical form of a typed-artifact token: a primitive or a named type.
///
/// Producers and consumers agree on an artifact's type iff their canonical
/// forms are equal.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CanonicalType {
    Primitive(String),
    Named(String),
}

impl fmt::Display for CanonicalType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CanonicalType::Primitive(token) => write!(f, "primitive:{token}"),
            CanonicalType::Named(name) => write!(f, "type:{name}"),
        }
    }
}

/// Canonicalize an artifact type token against the program's named types.
///
/// A token matching a named type wins over the primitive reading; aliases
/// (`array`, `boolean`, `integer`, `object`, `string`) collapse to their
/// primitive spelling. Unknown tokens yield `None`.
pub fn canonical_artifact_type(
    token: &str,
    types: &BTreeMap<String, Vec<FieldSpec>>,
) -> Option<CanonicalType> {
    if types.contains_key(token) {
        return Some(CanonicalType::Named(token.to_string()));
    }
    let lowered = token.trim().to_ascii_lowercase();
    let resolved = ARTIFACT_TYPE_ALIASES
        .iter()
        .find(|(alias, _)| *alias == lowered)
        .map(|(_, target)| *target)
        .unwrap_or(lowered.as_str());
    if ARTIFACT_PRIMITIVE_TYPES.contains(&resolved) {
        return Some(CanonicalType::Primitive(resolved.to_string()));
    }
    None
}

/// Check a runtime artifact value against its declared type token.
///
/// Primitive tokens use the type table above; named types validate the value
/// against the type's field-spec list. Returns one message per violation.
pub fn artifact_type_errors(
    value: &Value,
    token: &str,
    types: &BTreeMap<String, Vec<FieldSpec>>,
) -> Vec<String> {
    match canonical_artifact_type(token, types) {
        Some(CanonicalType::Named(name)) => {
            let specs = &types[&name];
            validate_schema(value, specs)
        }
        Some(CanonicalType::Primitive(primitive)) => {
            if matches_type(value, &primitive) {
                Vec::new()
            } else {
                vec![format!(
                    "expected {} but got {}",
                    primitive,
                    value_type_name(value)
                )]
            }
        }
        // Unknown tokens are rejected statically; nothing to check here.
        None => Vec::new(),
    }
}
