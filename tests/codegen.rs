use std::collections::HashMap;
use std::fs;
use std::path::PathBuf;

use repogen::codegen::pagination::render_pagination_module;
use repogen::codegen::queries::render_query_module;
use repogen::codegen::tables::render_table_module;
use repogen::codegen::{
    group_queries_by_file, is_owned_file, query_file_name, CodeGenerator,
};
use repogen::config::Config;
use repogen::ir::{Column, Parameter, Query, QueryKind, Table};
use repogen::types::TypeMapper;
use tempfile::tempdir;

fn mapper() -> TypeMapper {
    TypeMapper::new(HashMap::new())
}

fn column(name: &str, db_type: &str, nullable: bool, default: Option<&str>) -> Column {
    Column {
        name: name.to_string(),
        db_type: db_type.to_string(),
        is_nullable: nullable,
        is_array: false,
        default: default.map(|s| s.to_string()),
        rust_type: String::new(),
    }
}

/// The canonical fixture: a users table with plain, defaulted, nullable and
/// json columns.
fn users_table() -> Table {
    let mut table = Table {
        schema: "public".to_string(),
        name: "users".to_string(),
        columns: vec![
            column("id", "uuid", false, None),
            column("name", "text", false, None),
            column("email", "text", false, None),
            column("is_active", "bool", true, Some("true")),
            column("created_at", "timestamptz", true, Some("now()")),
            column("metadata", "jsonb", true, None),
        ],
        primary_key: vec!["id".to_string()],
        indexes: Vec::new(),
        foreign_keys: Vec::new(),
    };
    mapper().resolve_table(&mut table).unwrap();
    table
}

#[test]
fn table_module_declares_the_record_with_tags() {
    let code = render_table_module(&users_table(), &mapper(), "repositories").unwrap();

    assert!(code.starts_with("// Code generated by repogen. DO NOT EDIT.\n"));
    assert!(code.contains("// Source: table users"));

    assert!(code.contains("pub struct Users {"));
    assert!(code.contains("pub id: Uuid,"));
    assert!(code.contains("pub name: String,"));
    assert!(code.contains("pub email: String,"));
    assert!(code.contains("pub is_active: Option<bool>,"));
    assert!(code.contains("pub created_at: Option<DateTime<Utc>>,"));
    assert!(code.contains("pub metadata: Option<Value>,"));

    assert!(code.contains("#[serde(rename = \"id\")]"));
    assert!(code.contains("#[sqlx(rename = \"id\")]"));
    assert!(code.contains("#[serde(rename = \"is_active\")]"));
    assert!(code.contains("#[sqlx(rename = \"is_active\")]"));

    assert!(code.contains("pub fn get_id(&self) -> Uuid"));
    assert!(code.contains("self.id"));

    assert!(code.contains("use uuid::Uuid;"));
    assert!(code.contains("use chrono::{DateTime, Utc};"));
    assert!(code.contains("use serde_json::Value;"));
}

#[test]
fn table_module_exposes_the_six_repository_methods() {
    let code = render_table_module(&users_table(), &mapper(), "repositories").unwrap();

    assert!(code.contains("pub struct UsersRepository {"));
    assert!(code.contains("pool: PgPool,"));
    assert!(code.contains("pub fn new(pool: PgPool) -> Self"));

    assert!(code.contains("pub async fn get_by_id(&self, id: Uuid) -> Result<Users, sqlx::Error>"));
    assert!(code.contains(
        "pub async fn create(&self, params: CreateUsersParams) -> Result<Users, sqlx::Error>"
    ));
    assert!(code.contains(
        "pub async fn update(&self, id: Uuid, params: UpdateUsersParams) -> Result<Users, sqlx::Error>"
    ));
    assert!(code.contains("pub async fn delete(&self, id: Uuid) -> Result<(), sqlx::Error>"));
    assert!(code.contains("pub async fn list(&self) -> Result<Vec<Users>, sqlx::Error>"));
    assert!(code.contains("pub async fn list_paginated("));
    assert!(code.contains("Result<PaginationResult<Users>, PaginationError>"));
}

#[test]
fn create_excludes_key_and_defaulted_columns() {
    let code = render_table_module(&users_table(), &mapper(), "repositories").unwrap();

    let create_struct = code
        .split("pub struct CreateUsersParams {")
        .nth(1)
        .and_then(|rest| rest.split('}').next())
        .expect("CreateUsersParams struct");
    assert!(create_struct.contains("pub name: String,"));
    assert!(create_struct.contains("pub email: String,"));
    assert!(create_struct.contains("pub metadata: Option<Value>,"));
    assert!(!create_struct.contains("pub id:"));
    assert!(!create_struct.contains("is_active"));
    assert!(!create_struct.contains("created_at"));

    assert!(code.contains("INSERT INTO users (name, email, metadata) VALUES ($1, $2, $3)"));
    assert!(code.contains(
        "RETURNING id, name, email, is_active, created_at, metadata"
    ));
}

#[test]
fn update_covers_every_non_key_column() {
    let code = render_table_module(&users_table(), &mapper(), "repositories").unwrap();

    let update_struct = code
        .split("pub struct UpdateUsersParams {")
        .nth(1)
        .and_then(|rest| rest.split('}').next())
        .expect("UpdateUsersParams struct");
    for field in [
        "pub name:",
        "pub email:",
        "pub is_active:",
        "pub created_at:",
        "pub metadata:",
    ] {
        assert!(update_struct.contains(field), "missing {field}");
    }
    assert!(!update_struct.contains("pub id:"));

    assert!(code.contains(
        "UPDATE users SET name = $1, email = $2, is_active = $3, created_at = $4, metadata = $5 WHERE id = $6"
    ));
}

#[test]
fn crud_sql_uses_sequential_placeholders_and_key_ordering() {
    let code = render_table_module(&users_table(), &mapper(), "repositories").unwrap();

    assert!(code.contains(
        "SELECT id, name, email, is_active, created_at, metadata FROM users WHERE id = $1"
    ));
    assert!(code.contains("DELETE FROM users WHERE id = $1"));
    assert!(code.contains("ORDER BY id ASC"));
    assert!(code.contains("rows_affected() == 0"));
    assert!(code.contains("sqlx::Error::RowNotFound"));
}

#[test]
fn paginated_list_implements_the_cursor_protocol() {
    let code = render_table_module(&users_table(), &mapper(), "repositories").unwrap();

    assert!(code.contains("WHERE ($1::uuid IS NULL OR id > $1) ORDER BY id ASC LIMIT $2"));
    assert!(code.contains("validate_pagination_params(&params)?;"));
    assert!(code.contains("Some(decode_cursor(&params.cursor)?)"));
    assert!(code.contains("DEFAULT_PAGE_LIMIT"));
    assert!(code.contains("params.limit.min(MAX_PAGE_LIMIT)"));
    assert!(code.contains(".bind(limit + 1)"));
    assert!(code.contains("let has_more = items.len() as i64 > limit;"));
    assert!(code.contains("items.truncate(limit as usize);"));
    assert!(code.contains("encode_cursor(item.get_id())"));

    // The plain list stays free of pagination machinery.
    let list_only = code
        .split("pub async fn list(")
        .nth(1)
        .and_then(|rest| rest.split("pub async fn list_paginated").next())
        .expect("list method");
    assert!(!list_only.contains("LIMIT"));
    assert!(!list_only.contains("decode_cursor"));
    assert!(!list_only.contains("has_more"));
}

#[test]
fn generated_code_has_no_dependency_on_the_generator() {
    let table_code = render_table_module(&users_table(), &mapper(), "repositories").unwrap();
    let pagination_code = render_pagination_module("repositories");
    for code in [&table_code, &pagination_code] {
        assert!(!code.contains("repogen::"));
    }
    assert!(table_code.contains("use super::pagination::{"));
}

#[test]
fn pagination_module_holds_the_shared_protocol() {
    let code = render_pagination_module("repositories");

    assert!(code.contains("// Source: shared pagination support"));
    assert!(code.contains("pub struct PaginationParams {"));
    assert!(code.contains("pub struct PaginationResult<T> {"));
    assert!(code.contains("pub enum PaginationError {"));
    assert!(code.contains("pub const DEFAULT_PAGE_LIMIT: i64 = 20;"));
    assert!(code.contains("pub const MAX_PAGE_LIMIT: i64 = 100;"));
    assert!(code.contains("pub(crate) fn encode_cursor(id: Uuid) -> String"));
    assert!(code.contains("pub(crate) fn decode_cursor(cursor: &str)"));
    assert!(code.contains("pub(crate) fn validate_pagination_params("));
    assert!(code.contains("URL_SAFE_NO_PAD"));
    assert!(code.contains("bytes.len() != 16"));
    assert!(code.contains("limit cannot be negative"));
    assert!(code.contains("limit cannot exceed 100"));
}

#[test]
fn rendering_is_deterministic() {
    let table = users_table();
    let tm = mapper();
    assert_eq!(
        render_table_module(&table, &tm, "repositories").unwrap(),
        render_table_module(&table, &tm, "repositories").unwrap()
    );
    assert_eq!(
        render_pagination_module("repositories"),
        render_pagination_module("repositories")
    );
}

#[test]
fn file_ownership_pattern() {
    assert!(is_owned_file("pagination.rs"));
    assert!(is_owned_file("users_generated.rs"));
    assert!(is_owned_file("users_queries_generated.rs"));
    assert!(!is_owned_file("users.rs"));
    assert!(!is_owned_file("mod.rs"));
    assert!(!is_owned_file("pagination.go"));

    assert_eq!(query_file_name("users"), "users_queries_generated.rs");
    assert_eq!(
        query_file_name("admin-reports"),
        "admin_reports_queries_generated.rs"
    );
}

fn query(name: &str, kind: QueryKind, sql: &str, file: &str) -> Query {
    Query {
        name: name.to_string(),
        kind,
        sql: sql.to_string(),
        source_file: PathBuf::from(file),
        parameters: Vec::new(),
        columns: Vec::new(),
    }
}

fn param(index: usize, db_type: &str, rust_type: &str) -> Parameter {
    Parameter {
        index,
        db_type: db_type.to_string(),
        rust_type: rust_type.to_string(),
    }
}

fn nullable_column(name: &str, db_type: &str, rust_type: &str) -> Column {
    Column {
        name: name.to_string(),
        db_type: db_type.to_string(),
        is_nullable: true,
        is_array: false,
        default: None,
        rust_type: rust_type.to_string(),
    }
}

#[test]
fn one_queries_fetch_a_single_row() {
    let mut q = query(
        "GetByEmail",
        QueryKind::One,
        "SELECT id, email FROM users WHERE email = $1",
        "users.sql",
    );
    q.parameters = vec![param(1, "text", "String")];
    q.columns = vec![
        nullable_column("id", "uuid", "Option<Uuid>"),
        nullable_column("email", "text", "Option<String>"),
    ];

    let code = render_query_module("users", &[&q], &[], &mapper(), "repositories").unwrap();

    assert!(code.contains("// Source: queries users.sql"));
    assert!(code.contains("pub struct UsersQueries {"));
    assert!(code.contains("pub fn new(pool: PgPool) -> Self"));
    assert!(code.contains(
        "pub async fn get_by_email(&self, param1: String) -> Result<GetByEmailRow, sqlx::Error>"
    ));
    assert!(code.contains("pub struct GetByEmailRow {"));
    assert!(code.contains("pub id: Option<Uuid>,"));
    assert!(code.contains("pub email: Option<String>,"));
    assert!(code.contains(".bind(param1)"));
    assert!(code.contains("fetch_one"));
    assert!(code.contains("use uuid::Uuid;"));
}

#[test]
fn exec_queries_report_affected_rows_without_a_row_struct() {
    let mut q = query(
        "MarkSeen",
        QueryKind::Exec,
        "UPDATE users SET last_login = NOW() WHERE id = $1",
        "users.sql",
    );
    q.parameters = vec![param(1, "uuid", "Uuid")];

    let code = render_query_module("users", &[&q], &[], &mapper(), "repositories").unwrap();

    assert!(code.contains(
        "pub async fn mark_seen(&self, param1: Uuid) -> Result<u64, sqlx::Error>"
    ));
    assert!(code.contains(".execute(&self.pool)"));
    assert!(code.contains("rows_affected()"));
    assert!(!code.contains("MarkSeenRow"));
}

#[test]
fn many_queries_fetch_all_rows() {
    let mut q = query(
        "ListEmails",
        QueryKind::Many,
        "SELECT email FROM users ORDER BY email",
        "users.sql",
    );
    q.columns = vec![nullable_column("email", "text", "Option<String>")];

    let code = render_query_module("users", &[&q], &[], &mapper(), "repositories").unwrap();

    assert!(code.contains(
        "pub async fn list_emails(&self) -> Result<Vec<ListEmailsRow>, sqlx::Error>"
    ));
    assert!(code.contains("fetch_all"));
}

#[test]
fn paginated_queries_bind_cursor_and_limit_first() {
    let mut q = query(
        "ListPosts",
        QueryKind::Paginated,
        "SELECT id, title FROM posts WHERE ($1::uuid IS NULL OR id > $1) AND author = $3 ORDER BY id ASC LIMIT $2",
        "posts.sql",
    );
    q.parameters = vec![
        param(1, "uuid", "Uuid"),
        param(2, "int8", "i64"),
        param(3, "uuid", "Uuid"),
    ];
    q.columns = vec![
        Column {
            name: "id".to_string(),
            db_type: "uuid".to_string(),
            is_nullable: false,
            is_array: false,
            default: None,
            rust_type: "Uuid".to_string(),
        },
        nullable_column("title", "text", "Option<String>"),
    ];

    let code = render_query_module("posts", &[&q], &[], &mapper(), "repositories").unwrap();

    assert!(code.contains("params: PaginationParams,"));
    assert!(code.contains("param3: Uuid,"));
    assert!(code.contains("Result<PaginationResult<ListPostsRow>, PaginationError>"));
    assert!(code.contains("validate_pagination_params(&params)?;"));
    assert!(code.contains(".bind(cursor_id)"));
    assert!(code.contains(".bind(limit + 1)"));
    assert!(code.contains(".bind(param3)"));
    assert!(code.contains("impl ListPostsRow {"));
    assert!(code.contains("pub fn get_id(&self) -> Uuid"));
    assert!(code.contains("pub id: Uuid,"));
}

#[test]
fn matching_result_shapes_reuse_the_table_record() {
    let tables = vec![users_table()];
    let mut q = query(
        "AllUsers",
        QueryKind::Many,
        "SELECT id, name, email, is_active, created_at, metadata FROM users",
        "reports.sql",
    );
    q.columns = tables[0].columns.clone();

    let code = render_query_module("reports", &[&q], &tables, &mapper(), "repositories").unwrap();

    assert!(code.contains("use super::users_generated::Users;"));
    assert!(code.contains("pub async fn all_users(&self) -> Result<Vec<Users>, sqlx::Error>"));
    assert!(!code.contains("AllUsersRow"));
}

#[test]
fn queries_group_by_source_file_in_stable_order() {
    let qs = vec![
        query("B", QueryKind::One, "SELECT 1", "dir/users.sql"),
        query("A", QueryKind::One, "SELECT 1", "dir/users.sql"),
        query("C", QueryKind::One, "SELECT 1", "dir/admin.sql"),
    ];
    let groups = group_queries_by_file(&qs);
    let stems: Vec<&String> = groups.keys().collect();
    assert_eq!(stems, ["admin", "users"]);
    let users_names: Vec<&str> = groups["users"].iter().map(|q| q.name.as_str()).collect();
    assert_eq!(users_names, ["A", "B"]);
}

/// Full emission on a temp dir: owned files are overwritten byte-identically
/// across runs and hand-written files are never touched. Needs rustfmt.
#[test]
fn regeneration_is_idempotent_and_leaves_foreign_files_alone() {
    if which::which("rustfmt").is_err() {
        eprintln!("skipping: rustfmt not found");
        return;
    }

    let dir = tempdir().unwrap();
    let config = Config {
        output_dir: dir.path().to_string_lossy().to_string(),
        tables: true,
        ..Config::default()
    };

    let hand_written = dir.path().join("users.rs");
    fs::write(&hand_written, "// my extension file\n").unwrap();

    let table = users_table();
    let mut q = query(
        "GetByEmail",
        QueryKind::One,
        "SELECT id, email FROM users WHERE email = $1",
        "users.sql",
    );
    q.parameters = vec![param(1, "text", "String")];
    q.columns = vec![
        nullable_column("id", "uuid", "Option<Uuid>"),
        nullable_column("email", "text", "Option<String>"),
    ];

    let generator = CodeGenerator::new(&config);
    generator
        .generate_all(std::slice::from_ref(&table), std::slice::from_ref(&q))
        .unwrap();

    let owned = [
        dir.path().join("pagination.rs"),
        dir.path().join("users_generated.rs"),
        dir.path().join("users_queries_generated.rs"),
    ];
    let first: Vec<Vec<u8>> = owned.iter().map(|p| fs::read(p).unwrap()).collect();

    generator
        .generate_all(std::slice::from_ref(&table), std::slice::from_ref(&q))
        .unwrap();
    let second: Vec<Vec<u8>> = owned.iter().map(|p| fs::read(p).unwrap()).collect();

    assert_eq!(first, second, "owned files must be byte-identical across runs");
    assert_eq!(
        fs::read_to_string(&hand_written).unwrap(),
        "// my extension file\n"
    );

    let formatted = fs::read_to_string(&owned[1]).unwrap();
    assert!(formatted.starts_with("// Code generated by repogen. DO NOT EDIT."));
}
