use sqlx::{PgPool, Row};

use crate::error::GenerateError;
use crate::ir::{Column, ForeignKey, Index, Table};

/// Reads table descriptors out of the live catalog for one schema.
pub struct Introspector {
    pool: PgPool,
    schema: String,
}

impl Introspector {
    pub fn new(pool: PgPool, schema: impl Into<String>) -> Introspector {
        Introspector {
            pool,
            schema: schema.into(),
        }
    }

    /// Names of every base table in the schema, sorted.
    pub async fn table_names(&self) -> Result<Vec<String>, GenerateError> {
        let rows = sqlx::query(
            "SELECT table_name FROM information_schema.tables \
             WHERE table_schema = $1 AND table_type = 'BASE TABLE' \
             ORDER BY table_name",
        )
        .bind(&self.schema)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| GenerateError::introspection("list tables", e))?;

        Ok(rows.iter().map(|r| r.get("table_name")).collect())
    }

    /// Full descriptors for every base table in the schema.
    pub async fn list_tables(&self) -> Result<Vec<Table>, GenerateError> {
        let mut tables = Vec::new();
        for name in self.table_names().await? {
            tables.push(self.table_details(&name).await?);
        }
        Ok(tables)
    }

    /// Descriptor for one table: columns in catalog order, primary key in
    /// key order, secondary indexes and foreign-key edges.
    pub async fn table_details(&self, name: &str) -> Result<Table, GenerateError> {
        let columns = self.read_columns(name).await?;
        let primary_key = self.read_primary_key(name).await?;
        let indexes = self.read_indexes(name).await?;
        let foreign_keys = self.read_foreign_keys(name).await?;

        Ok(Table {
            schema: self.schema.clone(),
            name: name.to_string(),
            columns,
            primary_key,
            indexes,
            foreign_keys,
        })
    }

    async fn read_columns(&self, table: &str) -> Result<Vec<Column>, GenerateError> {
        let rows = sqlx::query(
            "SELECT column_name, data_type, udt_name, is_nullable, column_default \
             FROM information_schema.columns \
             WHERE table_schema = $1 AND table_name = $2 \
             ORDER BY ordinal_position",
        )
        .bind(&self.schema)
        .bind(table)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| GenerateError::introspection(format!("read columns of {table}"), e))?;

        let mut columns = Vec::with_capacity(rows.len());
        for row in rows {
            let name: String = row.get("column_name");
            let data_type: String = row.get("data_type");
            let udt_name: String = row.get("udt_name");
            let nullable: String = row.get("is_nullable");
            let default: Option<String> = row.try_get("column_default").ok().flatten();

            // Array columns report data_type = 'ARRAY' and carry the element
            // type in udt_name with a leading underscore.
            let (db_type, is_array) = if data_type == "ARRAY" {
                let element = udt_name.strip_prefix('_').unwrap_or(&udt_name);
                (normalize_type_name(element), true)
            } else if data_type == "USER-DEFINED" {
                (normalize_type_name(&udt_name), false)
            } else {
                (normalize_type_name(&data_type), false)
            };

            columns.push(Column {
                name,
                db_type,
                is_nullable: nullable == "YES",
                is_array,
                default,
                rust_type: String::new(),
            });
        }
        Ok(columns)
    }

    async fn read_primary_key(&self, table: &str) -> Result<Vec<String>, GenerateError> {
        let rows = sqlx::query(
            "SELECT kcu.column_name \
             FROM information_schema.table_constraints tc \
             JOIN information_schema.key_column_usage kcu \
               ON tc.constraint_name = kcu.constraint_name \
              AND tc.table_schema = kcu.table_schema \
              AND tc.table_name = kcu.table_name \
             WHERE tc.table_schema = $1 AND tc.table_name = $2 \
               AND tc.constraint_type = 'PRIMARY KEY' \
             ORDER BY kcu.ordinal_position",
        )
        .bind(&self.schema)
        .bind(table)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| GenerateError::introspection(format!("read primary key of {table}"), e))?;

        Ok(rows.iter().map(|r| r.get("column_name")).collect())
    }

    async fn read_indexes(&self, table: &str) -> Result<Vec<Index>, GenerateError> {
        let rows = sqlx::query(
            "SELECT indexname, indexdef FROM pg_indexes \
             WHERE schemaname = $1 AND tablename = $2 \
             ORDER BY indexname",
        )
        .bind(&self.schema)
        .bind(table)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| GenerateError::introspection(format!("read indexes of {table}"), e))?;

        let pk_index = format!("{table}_pkey");
        let mut indexes = Vec::new();
        for row in rows {
            let name: String = row.get("indexname");
            if name == pk_index {
                continue;
            }
            let def: String = row.get("indexdef");
            indexes.push(Index {
                columns: parse_index_columns(&def),
                is_unique: def.to_ascii_uppercase().starts_with("CREATE UNIQUE INDEX"),
                name,
            });
        }
        Ok(indexes)
    }

    async fn read_foreign_keys(&self, table: &str) -> Result<Vec<ForeignKey>, GenerateError> {
        let rows = sqlx::query(
            "SELECT tc.constraint_name, kcu.column_name, \
                    ccu.table_name AS foreign_table, ccu.column_name AS foreign_column \
             FROM information_schema.table_constraints tc \
             JOIN information_schema.key_column_usage kcu \
               ON tc.constraint_name = kcu.constraint_name \
              AND tc.table_name = kcu.table_name \
             JOIN information_schema.constraint_column_usage ccu \
               ON ccu.constraint_name = tc.constraint_name \
             WHERE tc.table_schema = $1 AND tc.table_name = $2 \
               AND tc.constraint_type = 'FOREIGN KEY' \
             ORDER BY tc.constraint_name",
        )
        .bind(&self.schema)
        .bind(table)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| GenerateError::introspection(format!("read foreign keys of {table}"), e))?;

        Ok(rows
            .iter()
            .map(|r| ForeignKey {
                name: r.get("constraint_name"),
                column: r.get("column_name"),
                ref_table: r.get("foreign_table"),
                ref_column: r.get("foreign_column"),
            })
            .collect())
    }
}

/// Collapse the catalog's spelled-out type names to the short canonical
/// forms the type mapper keys on.
pub fn normalize_type_name(name: &str) -> String {
    match name.to_ascii_lowercase().as_str() {
        "character varying" => "varchar".to_string(),
        "character" => "char".to_string(),
        "timestamp with time zone" => "timestamptz".to_string(),
        "timestamp without time zone" => "timestamp".to_string(),
        "time with time zone" => "timetz".to_string(),
        "time without time zone" => "time".to_string(),
        "double precision" => "float8".to_string(),
        "integer" => "int4".to_string(),
        "bigint" => "int8".to_string(),
        "smallint" => "int2".to_string(),
        "real" => "float4".to_string(),
        "boolean" => "bool".to_string(),
        other => other.to_string(),
    }
}

/// Pull the ordered column list out of a `CREATE INDEX` definition.
/// Expression columns keep their own parentheses; malformed or empty
/// definitions yield an empty list.
pub fn parse_index_columns(indexdef: &str) -> Vec<String> {
    let Some(open) = indexdef.find('(') else {
        return Vec::new();
    };

    let inner = &indexdef[open + 1..];
    let mut depth = 0usize;
    let mut end = None;
    for (i, ch) in inner.char_indices() {
        match ch {
            '(' => depth += 1,
            ')' if depth == 0 => {
                end = Some(i);
                break;
            }
            ')' => depth -= 1,
            _ => {}
        }
    }
    let Some(end) = end else {
        return Vec::new();
    };

    let list = &inner[..end];
    let mut columns = Vec::new();
    let mut current = String::new();
    let mut depth = 0usize;
    for ch in list.chars() {
        match ch {
            '(' => {
                depth += 1;
                current.push(ch);
            }
            ')' => {
                depth -= 1;
                current.push(ch);
            }
            ',' if depth == 0 => {
                let col = current.trim();
                if !col.is_empty() {
                    columns.push(col.to_string());
                }
                current.clear();
            }
            _ => current.push(ch),
        }
    }
    let col = current.trim();
    if !col.is_empty() {
        columns.push(col.to_string());
    }
    columns
}
