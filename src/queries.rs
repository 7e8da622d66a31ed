use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

use regex::Regex;
use walkdir::WalkDir;

use crate::error::GenerateError;
use crate::ir::{is_valid_identifier, Query, QueryKind};

/// Parses annotated SQL files into query descriptors.
///
/// An annotation line has the shape `-- name: <Identifier> :<kind>` and
/// starts a new query; the body is every following non-blank, non-comment
/// line up to the next annotation or end of file.
pub struct QueryParser {
    dir: PathBuf,
}

impl QueryParser {
    pub fn new(dir: impl Into<PathBuf>) -> QueryParser {
        QueryParser { dir: dir.into() }
    }

    /// Parse every `.sql` file under the directory, recursively, in a
    /// stable path order.
    pub fn parse_queries(&self) -> Result<Vec<Query>, GenerateError> {
        let files = self.find_sql_files()?;
        if files.is_empty() {
            return Err(GenerateError::Config(format!(
                "no SQL files found in {}",
                self.dir.display()
            )));
        }

        let mut queries = Vec::new();
        for file in files {
            queries.extend(parse_file(&file)?);
        }

        // Names must be unique across the whole run, and so must the method
        // names derived from them.
        let mut seen_names: HashMap<String, PathBuf> = HashMap::new();
        let mut seen_methods: HashMap<String, String> = HashMap::new();
        for query in &queries {
            if let Some(first) = seen_names.get(&query.name) {
                return Err(GenerateError::Parse {
                    file: query.source_file.clone(),
                    line: 0,
                    message: format!(
                        "duplicate query name `{}` (first defined in {})",
                        query.name,
                        first.display()
                    ),
                });
            }
            seen_names.insert(query.name.clone(), query.source_file.clone());

            let method = query.method_name();
            if let Some(first) = seen_methods.get(&method) {
                return Err(GenerateError::Parse {
                    file: query.source_file.clone(),
                    line: 0,
                    message: format!(
                        "queries `{first}` and `{}` both generate the method `{method}`",
                        query.name
                    ),
                });
            }
            seen_methods.insert(method, query.name.clone());
        }

        Ok(queries)
    }

    fn find_sql_files(&self) -> Result<Vec<PathBuf>, GenerateError> {
        if !self.dir.is_dir() {
            return Err(GenerateError::Config(format!(
                "queries directory does not exist: {}",
                self.dir.display()
            )));
        }

        let mut files = Vec::new();
        for entry in WalkDir::new(&self.dir).sort_by_file_name() {
            let entry = entry.map_err(|e| {
                GenerateError::Config(format!(
                    "failed to walk queries directory {}: {e}",
                    self.dir.display()
                ))
            })?;
            if !entry.file_type().is_file() {
                continue;
            }
            let is_sql = entry
                .path()
                .extension()
                .map(|ext| ext.eq_ignore_ascii_case("sql"))
                .unwrap_or(false);
            if is_sql {
                files.push(entry.path().to_path_buf());
            }
        }
        Ok(files)
    }
}

struct Annotation {
    name: String,
    kind: QueryKind,
}

/// Parse one SQL file into its query units.
pub fn parse_file(path: &Path) -> Result<Vec<Query>, GenerateError> {
    let text = fs::read_to_string(path).map_err(|e| GenerateError::Parse {
        file: path.to_path_buf(),
        line: 0,
        message: format!("failed to read file: {e}"),
    })?;

    let mut queries = Vec::new();
    let mut current: Option<(Annotation, usize, Vec<String>)> = None;

    for (idx, raw_line) in text.lines().enumerate() {
        let line_no = idx + 1;
        let line = raw_line.trim_end();
        let trimmed = line.trim_start();

        if is_annotation_line(trimmed) {
            if let Some(unit) = current.take() {
                queries.push(finish_query(path, unit)?);
            }
            let annotation = parse_annotation(trimmed).map_err(|message| GenerateError::Parse {
                file: path.to_path_buf(),
                line: line_no,
                message,
            })?;
            current = Some((annotation, line_no, Vec::new()));
            continue;
        }

        // Plain comments and blank lines never become part of a body.
        if trimmed.is_empty() || trimmed.starts_with("--") {
            continue;
        }

        if let Some((_, _, body)) = current.as_mut() {
            body.push(line.to_string());
        }
        // SQL before the first annotation is ignored, matching the
        // annotation-directed contract.
    }

    if let Some(unit) = current.take() {
        queries.push(finish_query(path, unit)?);
    }

    Ok(queries)
}

fn finish_query(
    path: &Path,
    (annotation, line, body): (Annotation, usize, Vec<String>),
) -> Result<Query, GenerateError> {
    let sql = body.join("\n").trim().to_string();
    let query = Query {
        name: annotation.name,
        kind: annotation.kind,
        sql,
        source_file: path.to_path_buf(),
        parameters: Vec::new(),
        columns: Vec::new(),
    };
    validate_query(&query).map_err(|message| GenerateError::Parse {
        file: path.to_path_buf(),
        line,
        message,
    })?;
    Ok(query)
}

/// Lines starting a query annotation, as opposed to ordinary comments.
fn is_annotation_line(line: &str) -> bool {
    let Some(rest) = line.strip_prefix("--") else {
        return false;
    };
    rest.trim_start().starts_with("name:")
}

fn parse_annotation(line: &str) -> Result<Annotation, String> {
    let re = Regex::new(r"^--\s*name:\s*(\S+)\s+:(\S+?);?\s*$").unwrap();
    let caps = re
        .captures(line)
        .ok_or_else(|| format!("malformed query annotation: `{line}`"))?;

    let name = caps[1].to_string();
    if !is_valid_identifier(&name) {
        return Err(format!("invalid query name `{name}`"));
    }

    let kind_text = &caps[2];
    let kind = QueryKind::parse(kind_text)
        .ok_or_else(|| format!("unknown query kind `:{kind_text}`"))?;

    Ok(Annotation { name, kind })
}

/// Per-query validation: non-empty body and statement shape consistent with
/// the declared kind.
pub fn validate_query(query: &Query) -> Result<(), String> {
    if query.name.is_empty() {
        return Err("query has no name".to_string());
    }
    if !is_valid_identifier(&query.name) {
        return Err(format!("invalid query name `{}`", query.name));
    }
    if query.sql.is_empty() {
        return Err(format!("query `{}` has no SQL body", query.name));
    }

    let head = query
        .sql
        .trim_start()
        .split_whitespace()
        .next()
        .unwrap_or("")
        .to_ascii_uppercase();

    let yields_rows = matches!(head.as_str(), "SELECT" | "WITH");
    let is_statement = matches!(head.as_str(), "INSERT" | "UPDATE" | "DELETE");

    if yields_rows && query.kind == QueryKind::Exec {
        return Err(format!(
            "query `{}` is a {head} statement but is declared :exec",
            query.name
        ));
    }
    if is_statement && query.kind != QueryKind::Exec {
        return Err(format!(
            "query `{}` is a {head} statement but is declared :{}",
            query.name,
            query.kind.as_str()
        ));
    }

    Ok(())
}
