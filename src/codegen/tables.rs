use super::file_header;
use crate::error::GenerateError;
use crate::ir::{Column, Table};
use crate::types::TypeMapper;

/// Render one `<table>_generated.rs` module: the row record, its create and
/// update parameter records, and a repository exposing the six canonical
/// operations.
pub fn render_table_module(
    table: &Table,
    mapper: &TypeMapper,
    package_name: &str,
) -> Result<String, GenerateError> {
    let pk = table.primary_key_column().ok_or_else(|| GenerateError::UuidKey {
        table: table.name.clone(),
        reason: "expected a single-column primary key".to_string(),
    })?;

    let struct_name = table.struct_name();
    let pk_field = pk.field_name();
    let pk_col = pk.name.clone();

    let mut out = String::new();
    out.push_str(&file_header(
        &format!("table {}", table.name),
        package_name,
    ));

    out.push_str("use sqlx::PgPool;\n");
    for import in mapper.required_imports(&table.columns) {
        out.push_str(&format!("use {import};\n"));
    }
    out.push('\n');
    out.push_str(
        "use super::pagination::{\n    \
         decode_cursor, encode_cursor, validate_pagination_params, PaginationError,\n    \
         PaginationParams, PaginationResult, DEFAULT_PAGE_LIMIT, MAX_PAGE_LIMIT,\n};\n\n",
    );

    out.push_str(&render_record(table, &struct_name, pk, &pk_field));
    out.push_str(&render_params_structs(table, &struct_name, &pk_col));
    out.push_str(&render_repository(table, &struct_name, &pk_col));

    Ok(out)
}

fn render_record(table: &Table, struct_name: &str, pk: &Column, pk_field: &str) -> String {
    let mut out = String::new();

    out.push_str("#[derive(Debug, Clone, serde::Serialize, serde::Deserialize, sqlx::FromRow)]\n");
    out.push_str(&format!("pub struct {struct_name} {{\n"));
    for col in &table.columns {
        out.push_str(&format!("    #[serde(rename = \"{}\")]\n", col.name));
        out.push_str(&format!("    #[sqlx(rename = \"{}\")]\n", col.name));
        out.push_str(&format!("    pub {}: {},\n", col.field_name(), col.rust_type));
    }
    out.push_str("}\n\n");

    out.push_str(&format!("impl {struct_name} {{\n"));
    out.push_str("    /// Primary-key value of this row.\n");
    out.push_str(&format!(
        "    pub fn get_id(&self) -> {} {{\n        self.{pk_field}\n    }}\n",
        pk.rust_type
    ));
    out.push_str("}\n\n");

    out
}

/// Create params exclude the primary key and any column the database fills
/// in itself; update params cover every non-key column.
fn render_params_structs(table: &Table, struct_name: &str, pk_col: &str) -> String {
    let mut out = String::new();

    out.push_str("#[derive(Debug, Clone, serde::Deserialize)]\n");
    out.push_str(&format!("pub struct Create{struct_name}Params {{\n"));
    for col in create_columns(table, pk_col) {
        out.push_str(&format!("    pub {}: {},\n", col.field_name(), col.rust_type));
    }
    out.push_str("}\n\n");

    out.push_str("#[derive(Debug, Clone, serde::Deserialize)]\n");
    out.push_str(&format!("pub struct Update{struct_name}Params {{\n"));
    for col in update_columns(table, pk_col) {
        out.push_str(&format!("    pub {}: {},\n", col.field_name(), col.rust_type));
    }
    out.push_str("}\n\n");

    out
}

fn render_repository(table: &Table, struct_name: &str, pk_col: &str) -> String {
    let table_name = &table.name;
    let select_columns = column_list(table.columns.iter());

    let mut out = String::new();
    out.push_str(&format!("pub struct {struct_name}Repository {{\n    pool: PgPool,\n}}\n\n"));
    out.push_str(&format!("impl {struct_name}Repository {{\n"));
    out.push_str("    pub fn new(pool: PgPool) -> Self {\n        Self { pool }\n    }\n\n");

    // get_by_id
    out.push_str(&format!(
        "    pub async fn get_by_id(&self, id: Uuid) -> Result<{struct_name}, sqlx::Error> {{\n"
    ));
    out.push_str(&format!(
        "        sqlx::query_as::<_, {struct_name}>(\n            \"SELECT {select_columns} FROM {table_name} WHERE {pk_col} = $1\",\n        )\n"
    ));
    out.push_str("        .bind(id)\n        .fetch_one(&self.pool)\n        .await\n    }\n\n");

    // create
    let create_cols = create_columns(table, pk_col);
    let params_ident = if create_cols.is_empty() { "_params" } else { "params" };
    out.push_str(&format!(
        "    pub async fn create(&self, {params_ident}: Create{struct_name}Params) -> Result<{struct_name}, sqlx::Error> {{\n"
    ));
    if create_cols.is_empty() {
        out.push_str(&format!(
            "        sqlx::query_as::<_, {struct_name}>(\n            \"INSERT INTO {table_name} DEFAULT VALUES RETURNING {select_columns}\",\n        )\n"
        ));
    } else {
        let insert_columns = column_list(create_cols.iter().copied());
        let placeholders = (1..=create_cols.len())
            .map(|i| format!("${i}"))
            .collect::<Vec<_>>()
            .join(", ");
        out.push_str(&format!(
            "        sqlx::query_as::<_, {struct_name}>(\n            \"INSERT INTO {table_name} ({insert_columns}) VALUES ({placeholders}) RETURNING {select_columns}\",\n        )\n"
        ));
        for col in &create_cols {
            out.push_str(&format!("        .bind(params.{})\n", col.field_name()));
        }
    }
    out.push_str("        .fetch_one(&self.pool)\n        .await\n    }\n\n");

    // update
    let update_cols = update_columns(table, pk_col);
    let params_ident = if update_cols.is_empty() { "_params" } else { "params" };
    out.push_str(&format!(
        "    pub async fn update(&self, id: Uuid, {params_ident}: Update{struct_name}Params) -> Result<{struct_name}, sqlx::Error> {{\n"
    ));
    if update_cols.is_empty() {
        // Nothing beyond the key to update; the no-op assignment keeps the
        // statement well-formed and still reports a missing row.
        out.push_str(&format!(
            "        sqlx::query_as::<_, {struct_name}>(\n            \"UPDATE {table_name} SET {pk_col} = {pk_col} WHERE {pk_col} = $1 RETURNING {select_columns}\",\n        )\n"
        ));
        out.push_str("        .bind(id)\n");
    } else {
        let set_clauses = update_cols
            .iter()
            .enumerate()
            .map(|(i, c)| format!("{} = ${}", c.name, i + 1))
            .collect::<Vec<_>>()
            .join(", ");
        out.push_str(&format!(
            "        sqlx::query_as::<_, {struct_name}>(\n            \"UPDATE {table_name} SET {set_clauses} WHERE {pk_col} = ${} RETURNING {select_columns}\",\n        )\n",
            update_cols.len() + 1
        ));
        for col in &update_cols {
            out.push_str(&format!("        .bind(params.{})\n", col.field_name()));
        }
        out.push_str("        .bind(id)\n");
    }
    out.push_str("        .fetch_one(&self.pool)\n        .await\n    }\n\n");

    // delete
    out.push_str("    pub async fn delete(&self, id: Uuid) -> Result<(), sqlx::Error> {\n");
    out.push_str(&format!(
        "        let result = sqlx::query(\"DELETE FROM {table_name} WHERE {pk_col} = $1\")\n"
    ));
    out.push_str("            .bind(id)\n            .execute(&self.pool)\n            .await?;\n");
    out.push_str(
        "        if result.rows_affected() == 0 {\n            return Err(sqlx::Error::RowNotFound);\n        }\n        Ok(())\n    }\n\n",
    );

    // list
    out.push_str(&format!(
        "    pub async fn list(&self) -> Result<Vec<{struct_name}>, sqlx::Error> {{\n"
    ));
    out.push_str(&format!(
        "        sqlx::query_as::<_, {struct_name}>(\n            \"SELECT {select_columns} FROM {table_name} ORDER BY {pk_col} ASC\",\n        )\n"
    ));
    out.push_str("        .fetch_all(&self.pool)\n        .await\n    }\n\n");

    // list_paginated
    out.push_str(&format!(
        "    pub async fn list_paginated(\n        &self,\n        params: PaginationParams,\n    ) -> Result<PaginationResult<{struct_name}>, PaginationError> {{\n"
    ));
    out.push_str("        validate_pagination_params(&params)?;\n\n");
    out.push_str(
        "        let cursor_id: Option<Uuid> = if params.cursor.is_empty() {\n            None\n        } else {\n            Some(decode_cursor(&params.cursor)?)\n        };\n",
    );
    out.push_str(
        "        let limit = if params.limit == 0 {\n            DEFAULT_PAGE_LIMIT\n        } else {\n            params.limit.min(MAX_PAGE_LIMIT)\n        };\n\n",
    );
    out.push_str(&format!(
        "        let mut items = sqlx::query_as::<_, {struct_name}>(\n            \"SELECT {select_columns} FROM {table_name} WHERE ($1::uuid IS NULL OR {pk_col} > $1) ORDER BY {pk_col} ASC LIMIT $2\",\n        )\n"
    ));
    out.push_str(
        "        .bind(cursor_id)\n        .bind(limit + 1)\n        .fetch_all(&self.pool)\n        .await?;\n\n",
    );
    out.push_str(
        "        let has_more = items.len() as i64 > limit;\n        if has_more {\n            items.truncate(limit as usize);\n        }\n",
    );
    out.push_str(
        "        let next_cursor = if has_more {\n            items\n                .last()\n                .map(|item| encode_cursor(item.get_id()))\n                .unwrap_or_default()\n        } else {\n            String::new()\n        };\n\n",
    );
    out.push_str(
        "        Ok(PaginationResult {\n            items,\n            next_cursor,\n            has_more,\n        })\n    }\n",
    );

    out.push_str("}\n");
    out
}

fn create_columns<'t>(table: &'t Table, pk_col: &str) -> Vec<&'t Column> {
    table
        .columns
        .iter()
        .filter(|c| c.name != pk_col && c.default.as_deref().unwrap_or("").is_empty())
        .collect()
}

fn update_columns<'t>(table: &'t Table, pk_col: &str) -> Vec<&'t Column> {
    table.columns.iter().filter(|c| c.name != pk_col).collect()
}

fn column_list<'a>(columns: impl Iterator<Item = &'a Column>) -> String {
    columns.map(|c| c.name.as_str()).collect::<Vec<_>>().join(", ")
}
