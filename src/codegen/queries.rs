use super::{file_header, sanitize_stem};
use crate::error::GenerateError;
use crate::ir::{to_pascal_case, Column, Query, QueryKind, Table};
use crate::types::TypeMapper;

/// Render one `<stem>_queries_generated.rs` module: row records for every
/// result-producing query plus a queries aggregate with one method per
/// query, shaped by its kind.
pub fn render_query_module(
    stem: &str,
    queries: &[&Query],
    tables: &[Table],
    mapper: &TypeMapper,
    package_name: &str,
) -> Result<String, GenerateError> {
    let aggregate = format!("{}Queries", to_pascal_case(&sanitize_stem(stem)));

    // Result shapes that match an emitted table record verbatim reuse it
    // instead of declaring a twin.
    let mut row_names = Vec::with_capacity(queries.len());
    let mut fresh_rows = Vec::with_capacity(queries.len());
    let mut reused_imports = Vec::new();
    for query in queries {
        if !query.kind.has_result_set() {
            row_names.push(String::new());
            fresh_rows.push(false);
            continue;
        }
        match tables.iter().find(|t| shape_matches(&query.columns, t)) {
            Some(table) => {
                let import = format!(
                    "super::{}::{}",
                    table.file_name().trim_end_matches(".rs"),
                    table.struct_name()
                );
                if !reused_imports.contains(&import) {
                    reused_imports.push(import);
                }
                row_names.push(table.struct_name());
                fresh_rows.push(false);
            }
            None => {
                row_names.push(query.row_struct_name());
                fresh_rows.push(true);
            }
        }
    }

    let needs_pagination = queries.iter().any(|q| q.kind == QueryKind::Paginated);

    let mut out = String::new();
    out.push_str(&file_header(&format!("queries {stem}.sql"), package_name));

    out.push_str("use sqlx::PgPool;\n");
    for import in collect_imports(queries, &fresh_rows, mapper) {
        out.push_str(&format!("use {import};\n"));
    }
    out.push('\n');
    reused_imports.sort();
    for import in &reused_imports {
        out.push_str(&format!("use {import};\n"));
    }
    if needs_pagination {
        out.push_str(
            "use super::pagination::{\n    \
             decode_cursor, encode_cursor, validate_pagination_params, PaginationError,\n    \
             PaginationParams, PaginationResult, DEFAULT_PAGE_LIMIT, MAX_PAGE_LIMIT,\n};\n",
        );
    }
    if !reused_imports.is_empty() || needs_pagination {
        out.push('\n');
    }

    for ((query, row_name), fresh) in queries.iter().zip(&row_names).zip(&fresh_rows) {
        if *fresh {
            out.push_str(&render_row_struct(query, row_name)?);
        }
    }

    out.push_str(&format!("pub struct {aggregate} {{\n    pool: PgPool,\n}}\n\n"));
    out.push_str(&format!("impl {aggregate} {{\n"));
    out.push_str("    pub fn new(pool: PgPool) -> Self {\n        Self { pool }\n    }\n");
    for (query, row_name) in queries.iter().zip(&row_names) {
        out.push('\n');
        out.push_str(&render_method(query, row_name));
    }
    out.push_str("}\n");

    Ok(out)
}

/// Ordered column names and resolved types both line up with the table
/// record.
fn shape_matches(columns: &[Column], table: &Table) -> bool {
    columns.len() == table.columns.len()
        && columns
            .iter()
            .zip(&table.columns)
            .all(|(a, b)| a.name == b.name && a.rust_type == b.rust_type)
}

fn render_row_struct(query: &Query, row_name: &str) -> Result<String, GenerateError> {
    let mut out = String::new();
    out.push_str("#[derive(Debug, Clone, serde::Serialize, sqlx::FromRow)]\n");
    out.push_str(&format!("pub struct {row_name} {{\n"));
    for col in &query.columns {
        out.push_str(&format!("    #[serde(rename = \"{}\")]\n", col.name));
        out.push_str(&format!("    #[sqlx(rename = \"{}\")]\n", col.name));
        out.push_str(&format!("    pub {}: {},\n", col.field_name(), col.rust_type));
    }
    out.push_str("}\n\n");

    if query.kind == QueryKind::Paginated {
        out.push_str(&format!("impl {row_name} {{\n"));
        out.push_str("    /// Cursor anchor for the next page.\n");
        out.push_str("    pub fn get_id(&self) -> Uuid {\n        self.id\n    }\n");
        out.push_str("}\n\n");
    }

    Ok(out)
}

fn render_method(query: &Query, row_name: &str) -> String {
    match query.kind {
        QueryKind::Exec => render_exec_method(query),
        QueryKind::One | QueryKind::Many => render_fetch_method(query, row_name),
        QueryKind::Paginated => render_paginated_method(query, row_name),
    }
}

fn render_exec_method(query: &Query) -> String {
    let mut out = String::new();
    out.push_str(&format!(
        "    pub async fn {}(&self{}) -> Result<u64, sqlx::Error> {{\n",
        query.method_name(),
        method_args(query, 1)
    ));
    out.push_str(&format!(
        "        let result = sqlx::query({})\n",
        raw_string(&query.sql)
    ));
    for param in &query.parameters {
        out.push_str(&format!("            .bind(param{})\n", param.index));
    }
    out.push_str("            .execute(&self.pool)\n            .await?;\n");
    out.push_str("        Ok(result.rows_affected())\n    }\n");
    out
}

fn render_fetch_method(query: &Query, row_name: &str) -> String {
    let (ret, fetch) = match query.kind {
        QueryKind::One => (row_name.to_string(), "fetch_one"),
        _ => (format!("Vec<{row_name}>"), "fetch_all"),
    };

    let mut out = String::new();
    out.push_str(&format!(
        "    pub async fn {}(&self{}) -> Result<{ret}, sqlx::Error> {{\n",
        query.method_name(),
        method_args(query, 1)
    ));
    out.push_str(&format!(
        "        sqlx::query_as::<_, {row_name}>({})\n",
        raw_string(&query.sql)
    ));
    for param in &query.parameters {
        out.push_str(&format!("            .bind(param{})\n", param.index));
    }
    out.push_str(&format!("            .{fetch}(&self.pool)\n            .await\n    }}\n"));
    out
}

/// Paginated methods own `$1` (cursor) and `$2` (limit); author parameters
/// continue from `$3`.
fn render_paginated_method(query: &Query, row_name: &str) -> String {
    let mut out = String::new();
    out.push_str(&format!(
        "    pub async fn {}(\n        &self,\n        params: PaginationParams,{}\n    ) -> Result<PaginationResult<{row_name}>, PaginationError> {{\n",
        query.method_name(),
        paginated_args(query)
    ));
    out.push_str("        validate_pagination_params(&params)?;\n\n");
    out.push_str(
        "        let cursor_id: Option<Uuid> = if params.cursor.is_empty() {\n            None\n        } else {\n            Some(decode_cursor(&params.cursor)?)\n        };\n",
    );
    out.push_str(
        "        let limit = if params.limit == 0 {\n            DEFAULT_PAGE_LIMIT\n        } else {\n            params.limit.min(MAX_PAGE_LIMIT)\n        };\n\n",
    );
    out.push_str(&format!(
        "        let mut items = sqlx::query_as::<_, {row_name}>({})\n",
        raw_string(&query.sql)
    ));
    out.push_str("        .bind(cursor_id)\n        .bind(limit + 1)\n");
    for param in query.parameters.iter().skip(2) {
        out.push_str(&format!("        .bind(param{})\n", param.index));
    }
    out.push_str("        .fetch_all(&self.pool)\n        .await?;\n\n");
    out.push_str(
        "        let has_more = items.len() as i64 > limit;\n        if has_more {\n            items.truncate(limit as usize);\n        }\n",
    );
    out.push_str(
        "        let next_cursor = if has_more {\n            items\n                .last()\n                .map(|item| encode_cursor(item.get_id()))\n                .unwrap_or_default()\n        } else {\n            String::new()\n        };\n\n",
    );
    out.push_str(
        "        Ok(PaginationResult {\n            items,\n            next_cursor,\n            has_more,\n        })\n    }\n",
    );
    out
}

/// `, param1: String, param2: Uuid` for every parameter from `first` on.
fn method_args(query: &Query, first: usize) -> String {
    query
        .parameters
        .iter()
        .filter(|p| p.index >= first)
        .map(|p| format!(", param{}: {}", p.index, p.rust_type))
        .collect()
}

fn paginated_args(query: &Query) -> String {
    query
        .parameters
        .iter()
        .filter(|p| p.index > 2)
        .map(|p| format!("\n        param{}: {},", p.index, p.rust_type))
        .collect()
}

/// Embed author SQL as a raw string literal, widening the delimiter when
/// the text itself contains one.
fn raw_string(sql: &str) -> String {
    let mut hashes = 1;
    while sql.contains(&format!("\"{}", "#".repeat(hashes))) {
        hashes += 1;
    }
    let h = "#".repeat(hashes);
    format!("r{h}\"{sql}\"{h}")
}

/// Union of the `use` paths needed by locally declared row columns and
/// method parameters. Reused table records bring their own module in scope,
/// so their columns do not count.
fn collect_imports(queries: &[&Query], fresh_rows: &[bool], mapper: &TypeMapper) -> Vec<String> {
    let mut pseudo: Vec<Column> = Vec::new();
    for (query, fresh) in queries.iter().zip(fresh_rows) {
        if *fresh {
            pseudo.extend(query.columns.iter().cloned());
        }
        for param in &query.parameters {
            pseudo.push(Column {
                rust_type: param.rust_type.clone(),
                ..Column::default()
            });
        }
        if query.kind == QueryKind::Paginated {
            // The cursor variable is a Uuid even when no column needs one.
            pseudo.push(Column {
                rust_type: "Uuid".to_string(),
                ..Column::default()
            });
        }
    }
    mapper.required_imports(&pseudo)
}
