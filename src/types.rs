use std::collections::HashMap;

use crate::error::GenerateError;
use crate::ir::{Column, Table};

/// Maps database types to Rust type expressions.
///
/// Resolution consults the user override table before the built-ins, then
/// applies the nullability and array modifiers. Nullability maps to
/// `Option<T>`, the type sqlx round-trips SQL NULL through.
#[derive(Debug, Clone, Default)]
pub struct TypeMapper {
    overrides: HashMap<String, String>,
}

/// Base expression and nullable companion for one canonical database type.
struct Mapping {
    base: &'static str,
    nullable: &'static str,
}

fn builtin(db_type: &str) -> Option<Mapping> {
    let m = |base, nullable| Some(Mapping { base, nullable });
    match db_type {
        "uuid" => m("Uuid", "Option<Uuid>"),
        "text" | "varchar" | "character varying" | "char" | "character" | "inet" | "cidr"
        | "macaddr" | "xml" | "interval" | "point" | "line" | "lseg" | "box" | "path"
        | "polygon" | "circle" | "int4range" | "int8range" | "numrange" | "tsrange"
        | "tstzrange" | "daterange" => m("String", "Option<String>"),
        "smallint" | "int2" => m("i16", "Option<i16>"),
        "integer" | "int" | "int4" => m("i32", "Option<i32>"),
        "bigint" | "int8" => m("i64", "Option<i64>"),
        "real" | "float4" => m("f32", "Option<f32>"),
        "double precision" | "float8" | "numeric" | "decimal" => m("f64", "Option<f64>"),
        "boolean" | "bool" => m("bool", "Option<bool>"),
        "date" | "time" | "timetz" | "timestamp" | "timestamptz"
        | "timestamp with time zone" | "timestamp without time zone" | "time with time zone"
        | "time without time zone" => m("DateTime<Utc>", "Option<DateTime<Utc>>"),
        "bytea" => m("Vec<u8>", "Option<Vec<u8>>"),
        "json" | "jsonb" => m("Value", "Option<Value>"),
        _ => None,
    }
}

impl TypeMapper {
    pub fn new(overrides: HashMap<String, String>) -> TypeMapper {
        let overrides = overrides
            .into_iter()
            .map(|(k, v)| (k.to_ascii_lowercase(), v))
            .collect();
        TypeMapper { overrides }
    }

    /// Resolve `(db_type, nullable, array)` to a Rust type expression.
    pub fn map(
        &self,
        db_type: &str,
        is_nullable: bool,
        is_array: bool,
    ) -> Result<String, GenerateError> {
        self.map_at(db_type, is_nullable, is_array, "<unknown>")
    }

    fn map_at(
        &self,
        db_type: &str,
        is_nullable: bool,
        is_array: bool,
        location: &str,
    ) -> Result<String, GenerateError> {
        let key = db_type.trim().to_ascii_lowercase();
        if key.is_empty() || key.ends_with("[]") {
            // Array element types arrive bare; a trailing `[]` means an
            // array of arrays, which has no mapping.
            return Err(GenerateError::Type {
                db_type: db_type.to_string(),
                location: location.to_string(),
            });
        }

        let (base, nullable) = if let Some(over) = self.overrides.get(&key) {
            (over.clone(), format!("Option<{over}>"))
        } else if let Some(m) = builtin(&key) {
            (m.base.to_string(), m.nullable.to_string())
        } else {
            return Err(GenerateError::Type {
                db_type: db_type.to_string(),
                location: location.to_string(),
            });
        };

        Ok(match (is_array, is_nullable) {
            (true, true) => format!("Vec<{nullable}>"),
            (true, false) => format!("Vec<{base}>"),
            (false, true) => nullable,
            (false, false) => base,
        })
    }

    /// The `use` paths the resolved expressions of `columns` rely on.
    /// Sorted and deduplicated; empty when only prelude types appear.
    pub fn required_imports(&self, columns: &[Column]) -> Vec<String> {
        let mut imports = Vec::new();
        for col in columns {
            for import in imports_for(&col.rust_type) {
                if !imports.contains(&import) {
                    imports.push(import);
                }
            }
        }
        imports.sort();
        imports
    }

    /// Fill in `rust_type` for every column of `table`, stopping at the
    /// first unsupported type.
    pub fn resolve_table(&self, table: &mut Table) -> Result<(), GenerateError> {
        let table_name = table.name.clone();
        for col in &mut table.columns {
            let location = format!("{}.{}", table_name, col.name);
            col.rust_type = self.map_at(&col.db_type, col.is_nullable, col.is_array, &location)?;
        }
        Ok(())
    }

    /// A usable primary key is a non-null, non-array uuid column.
    pub fn validate_uuid_pk(&self, column: &Column) -> Result<(), GenerateError> {
        let fail = |reason: &str| {
            Err(GenerateError::UuidKey {
                table: String::new(),
                reason: format!("primary key column `{}` {reason}", column.name),
            })
        };
        if !column.is_uuid() {
            return fail(&format!("has type `{}`, expected uuid", column.db_type));
        }
        if column.is_nullable {
            return fail("is nullable");
        }
        if column.is_array {
            return fail("is an array");
        }
        Ok(())
    }
}

fn imports_for(rust_type: &str) -> Vec<String> {
    let mut out = Vec::new();
    if rust_type.contains("Uuid") {
        out.push("uuid::Uuid".to_string());
    }
    if rust_type.contains("DateTime") {
        out.push("chrono::{DateTime, Utc}".to_string());
    }
    if rust_type.contains("Value") {
        out.push("serde_json::Value".to_string());
    }
    out
}
