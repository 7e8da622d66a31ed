use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// A single column as read from the catalog. `db_type` holds the element
/// type for array columns; `rust_type` stays empty until the type mapper
/// resolves it.
#[derive(Debug, Serialize, Deserialize, Clone, Default)]
pub struct Column {
    pub name: String,
    pub db_type: String,
    pub is_nullable: bool,
    pub is_array: bool,
    #[serde(default)]
    pub default: Option<String>,
    #[serde(default)]
    pub rust_type: String,
}

impl Column {
    pub fn is_uuid(&self) -> bool {
        self.db_type.eq_ignore_ascii_case("uuid")
    }

    pub fn is_string(&self) -> bool {
        matches!(
            self.db_type.to_ascii_lowercase().as_str(),
            "text" | "varchar" | "character varying" | "char" | "character"
        )
    }

    pub fn is_integer(&self) -> bool {
        matches!(
            self.db_type.to_ascii_lowercase().as_str(),
            "smallint" | "int2" | "integer" | "int" | "int4" | "bigint" | "int8"
        )
    }

    pub fn is_boolean(&self) -> bool {
        matches!(self.db_type.to_ascii_lowercase().as_str(), "boolean" | "bool")
    }

    pub fn is_timestamp(&self) -> bool {
        matches!(
            self.db_type.to_ascii_lowercase().as_str(),
            "date"
                | "time"
                | "timetz"
                | "timestamp"
                | "timestamptz"
                | "timestamp with time zone"
                | "timestamp without time zone"
        )
    }

    /// Field identifier in generated records: snake case, keyword-escaped.
    pub fn field_name(&self) -> String {
        escape_rust_keyword(&to_snake_case(&self.name))
    }
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Index {
    pub name: String,
    pub columns: Vec<String>,
    pub is_unique: bool,
}

/// A foreign-key edge from `column` to `ref_table.ref_column`.
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct ForeignKey {
    pub name: String,
    pub column: String,
    pub ref_table: String,
    pub ref_column: String,
}

#[derive(Debug, Serialize, Deserialize, Clone, Default)]
pub struct Table {
    pub schema: String,
    pub name: String,
    pub columns: Vec<Column>,
    pub primary_key: Vec<String>,
    #[serde(default)]
    pub indexes: Vec<Index>,
    #[serde(default)]
    pub foreign_keys: Vec<ForeignKey>,
}

impl Table {
    pub fn get_column(&self, name: &str) -> Option<&Column> {
        self.columns.iter().find(|c| c.name == name)
    }

    /// The single primary-key column, or `None` when the key is missing or
    /// composite.
    pub fn primary_key_column(&self) -> Option<&Column> {
        match self.primary_key.as_slice() {
            [only] => self.get_column(only),
            _ => None,
        }
    }

    pub fn struct_name(&self) -> String {
        to_pascal_case(&self.name)
    }

    pub fn file_name(&self) -> String {
        format!("{}_generated.rs", to_snake_case(&self.name))
    }
}

/// The annotation-declared shape of a query's result.
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum QueryKind {
    One,
    Many,
    Exec,
    Paginated,
}

impl QueryKind {
    pub fn parse(s: &str) -> Option<QueryKind> {
        match s.to_ascii_lowercase().as_str() {
            "one" => Some(QueryKind::One),
            "many" => Some(QueryKind::Many),
            "exec" => Some(QueryKind::Exec),
            "paginated" => Some(QueryKind::Paginated),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            QueryKind::One => "one",
            QueryKind::Many => "many",
            QueryKind::Exec => "exec",
            QueryKind::Paginated => "paginated",
        }
    }

    /// Kinds that produce a result set and therefore need column analysis.
    pub fn has_result_set(&self) -> bool {
        matches!(self, QueryKind::One | QueryKind::Many | QueryKind::Paginated)
    }
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Parameter {
    pub index: usize,
    pub db_type: String,
    pub rust_type: String,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Query {
    pub name: String,
    pub kind: QueryKind,
    pub sql: String,
    pub source_file: PathBuf,
    #[serde(default)]
    pub parameters: Vec<Parameter>,
    #[serde(default)]
    pub columns: Vec<Column>,
}

impl Query {
    pub fn method_name(&self) -> String {
        escape_rust_keyword(&to_snake_case(&self.name))
    }

    pub fn row_struct_name(&self) -> String {
        format!("{}Row", to_pascal_case(&self.name))
    }
}

pub fn to_pascal_case(s: &str) -> String {
    s.split('_')
        .filter(|p| !p.is_empty())
        .map(|p| {
            let mut c = p.chars();
            match c.next() {
                None => String::new(),
                Some(f) => f.to_ascii_uppercase().to_string() + c.as_str(),
            }
        })
        .collect()
}

pub fn to_snake_case(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    let mut prev_lower = false;
    for ch in s.chars() {
        if ch.is_ascii_uppercase() {
            if prev_lower {
                out.push('_');
            }
            out.push(ch.to_ascii_lowercase());
            prev_lower = false;
        } else {
            prev_lower = ch.is_ascii_lowercase() || ch.is_ascii_digit();
            out.push(ch);
        }
    }
    out
}

const RUST_KEYWORDS: &[&str] = &[
    "as", "break", "const", "continue", "crate", "else", "enum", "extern", "false", "fn", "for",
    "if", "impl", "in", "let", "loop", "match", "mod", "move", "mut", "pub", "ref", "return",
    "self", "static", "struct", "super", "trait", "true", "type", "unsafe", "use", "where",
    "while", "async", "await", "dyn", "abstract", "become", "box", "do", "final", "macro",
    "override", "priv", "try", "typeof", "unsized", "virtual", "yield",
];

pub fn escape_rust_keyword(name: &str) -> String {
    if RUST_KEYWORDS.contains(&name) {
        format!("r#{}", name)
    } else {
        name.to_string()
    }
}

/// Whether `s` is usable as a query identifier: letters or underscore
/// followed by letters, digits or underscores.
pub fn is_valid_identifier(s: &str) -> bool {
    let mut chars = s.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}
