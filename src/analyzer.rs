use regex::Regex;
use sqlx::{Column as _, Either, Executor, PgPool, TypeInfo};

use crate::error::GenerateError;
use crate::ir::{Column, Parameter, Query, QueryKind};
use crate::types::TypeMapper;

/// Resolves parameter and result-column types by describing queries against
/// the live catalog. Queries are prepared, never executed; every prepare
/// used for validation runs inside a transaction that is always rolled back.
pub struct QueryAnalyzer {
    pool: PgPool,
    mapper: TypeMapper,
}

impl QueryAnalyzer {
    pub fn new(pool: PgPool, mapper: TypeMapper) -> QueryAnalyzer {
        QueryAnalyzer { pool, mapper }
    }

    pub async fn analyze(&self, query: &mut Query) -> Result<(), GenerateError> {
        query.parameters = extract_parameters(&query.sql)
            .map_err(|message| GenerateError::analysis(&query.name, message))?;

        // Describe the raw statement inside a rolled-back transaction. For
        // exec queries this doubles as the syntax validation; for queries
        // with a result set it only refines parameter types.
        let described = self.describe_in_tx(&query.sql).await;
        match described {
            Ok(describe) => {
                if let Some(Either::Left(param_types)) = describe.parameters() {
                    if param_types.len() != query.parameters.len() {
                        return Err(GenerateError::analysis(
                            &query.name,
                            format!(
                                "parameter count mismatch: statement expects {}, found {}",
                                param_types.len(),
                                query.parameters.len()
                            ),
                        ));
                    }
                    for (param, info) in query.parameters.iter_mut().zip(param_types) {
                        let (db_type, is_array) = describe_type_name(info.name());
                        param.rust_type = self.mapper.map(&db_type, false, is_array)?;
                        param.db_type = db_type;
                    }
                }
            }
            Err(e) => {
                if query.kind == QueryKind::Exec {
                    return Err(GenerateError::analysis(
                        &query.name,
                        format!("statement preparation failed: {e}"),
                    ));
                }
            }
        }

        if query.kind.has_result_set() {
            self.analyze_columns(query).await?;
        }

        if query.kind == QueryKind::Paginated {
            self.check_paginated(query)?;
        }

        Ok(())
    }

    /// Recover the ordered result columns by describing the query wrapped in
    /// `SELECT * FROM (...) AS sub LIMIT 0` with every placeholder replaced
    /// by NULL. Projected columns are conservatively treated as nullable.
    async fn analyze_columns(&self, query: &mut Query) -> Result<(), GenerateError> {
        let wrapped = wrap_for_column_analysis(&query.sql, query.parameters.len());
        let describe = (&self.pool).describe(&wrapped).await.map_err(|e| {
            GenerateError::analysis(&query.name, format!("failed to analyze columns: {e}"))
        })?;

        let mut columns = Vec::new();
        for col in describe.columns() {
            let (db_type, is_array) = describe_type_name(col.type_info().name());
            let rust_type = self.mapper.map(&db_type, true, is_array)?;
            columns.push(Column {
                name: col.name().to_string(),
                db_type,
                is_nullable: true,
                is_array,
                default: None,
                rust_type,
            });
        }
        query.columns = columns;
        Ok(())
    }

    /// Paginated queries take the cursor as `$1` and the limit as `$2`, and
    /// must project a uuid `id` column to anchor the next cursor. The anchor
    /// is a primary key in practice, so it is the one column the analyzer
    /// refines to non-nullable.
    fn check_paginated(&self, query: &mut Query) -> Result<(), GenerateError> {
        if query.parameters.len() < 2 {
            return Err(GenerateError::analysis(
                &query.name,
                "paginated queries need at least two parameters ($1 cursor, $2 limit)",
            ));
        }
        let Some(id_col) = query.columns.iter_mut().find(|c| c.name == "id") else {
            return Err(GenerateError::analysis(
                &query.name,
                "paginated queries must select an `id` column",
            ));
        };
        if !id_col.is_uuid() || id_col.is_array {
            return Err(GenerateError::analysis(
                &query.name,
                format!(
                    "paginated `id` column has type `{}`, expected uuid",
                    id_col.db_type
                ),
            ));
        }
        id_col.is_nullable = false;
        id_col.rust_type = self.mapper.map(&id_col.db_type, false, false)?;
        Ok(())
    }

    async fn describe_in_tx(
        &self,
        sql: &str,
    ) -> Result<sqlx::Describe<sqlx::Postgres>, sqlx::Error> {
        let mut tx = self.pool.begin().await?;
        let described = (&mut *tx).describe(sql).await;
        // Rolled back unconditionally; prepared-statement metadata must not
        // leave residue behind.
        let _ = tx.rollback().await;
        described
    }
}

/// Extract the dense positional parameter set `$1..$N` from a statement.
/// Placeholders inside string literals and line comments do not count; a gap
/// in the sequence is an error.
pub fn extract_parameters(sql: &str) -> Result<Vec<Parameter>, String> {
    let stripped = strip_strings_and_comments(sql);
    let re = Regex::new(r"\$(\d+)").unwrap();

    let mut indices: Vec<usize> = Vec::new();
    for caps in re.captures_iter(&stripped) {
        let index: usize = caps[1]
            .parse()
            .map_err(|_| format!("invalid parameter number `{}`", &caps[1]))?;
        if index == 0 {
            return Err("parameter $0 is not valid; parameters start at $1".to_string());
        }
        if !indices.contains(&index) {
            indices.push(index);
        }
    }

    if indices.is_empty() {
        return Ok(Vec::new());
    }

    let max = *indices.iter().max().expect("non-empty");
    for i in 1..=max {
        if !indices.contains(&i) {
            return Err(format!(
                "parameter ${i} is missing (parameters must be sequential starting from $1)"
            ));
        }
    }

    Ok((1..=max)
        .map(|index| Parameter {
            index,
            db_type: "text".to_string(),
            rust_type: "String".to_string(),
        })
        .collect())
}

/// Replace string literal and line comment contents with spaces so that `$N`
/// tokens inside them are not mistaken for parameters.
pub fn strip_strings_and_comments(sql: &str) -> String {
    let mut out = String::with_capacity(sql.len());
    let mut chars = sql.chars().peekable();
    while let Some(ch) = chars.next() {
        match ch {
            '\'' => {
                out.push(' ');
                while let Some(c) = chars.next() {
                    if c == '\'' {
                        // A doubled quote is an escaped quote inside the
                        // literal, not its end.
                        if chars.peek() == Some(&'\'') {
                            chars.next();
                        } else {
                            break;
                        }
                    }
                    out.push(' ');
                }
                out.push(' ');
            }
            '-' if chars.peek() == Some(&'-') => {
                chars.next();
                out.push_str("  ");
                for c in chars.by_ref() {
                    if c == '\n' {
                        out.push('\n');
                        break;
                    }
                    out.push(' ');
                }
            }
            _ => out.push(ch),
        }
    }
    out
}

/// The statement used for column analysis: trailing semicolon dropped,
/// wrapped in a LIMIT 0 subselect, placeholders replaced by NULL so the
/// statement describes without bound values.
pub fn wrap_for_column_analysis(sql: &str, param_count: usize) -> String {
    let body = sql.trim().trim_end_matches(';').trim_end();
    let substituted = substitute_null_parameters(body, param_count);
    format!("SELECT * FROM ({substituted}) AS sub LIMIT 0")
}

/// Replace `$1..$count` with NULL, highest index first so `$1` never eats
/// the prefix of `$10`.
pub fn substitute_null_parameters(sql: &str, param_count: usize) -> String {
    let mut out = sql.to_string();
    for i in (1..=param_count).rev() {
        out = out.replace(&format!("${i}"), "NULL");
    }
    out
}

/// Map a driver-reported type name to the canonical db type the type mapper
/// keys on, plus the array flag. Covers the fixed subset the analyzer
/// understands; anything else falls through to text.
pub fn describe_type_name(name: &str) -> (String, bool) {
    let lower = name.to_ascii_lowercase();
    let (base, is_array) = match lower.strip_suffix("[]") {
        Some(element) => (element, true),
        None => (lower.as_str(), false),
    };
    let db_type = match base {
        "bool" => "bool",
        "int2" => "int2",
        "int4" => "int4",
        "int8" => "int8",
        "float4" => "float4",
        "float8" => "float8",
        "text" => "text",
        "varchar" => "varchar",
        "date" => "date",
        "time" => "time",
        "timestamp" => "timestamp",
        "timestamptz" => "timestamptz",
        "numeric" => "numeric",
        "uuid" => "uuid",
        "json" => "json",
        "jsonb" => "jsonb",
        "bytea" => "bytea",
        _ => "text",
    };
    (db_type.to_string(), is_array)
}
