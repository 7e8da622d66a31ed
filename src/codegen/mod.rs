pub mod pagination;
pub mod queries;
pub mod tables;

use std::collections::BTreeMap;
use std::fs;
use std::io::Write as _;
use std::path::Path;
use std::process::{Command, Stdio};

use crate::config::Config;
use crate::error::GenerateError;
use crate::ir::{to_snake_case, Query, Table};
use crate::types::TypeMapper;

/// Emits the generated module set: the shared pagination module first, then
/// one module per table, then one module per SQL source file, in a stable
/// order so two runs over the same inputs produce identical bytes.
pub struct CodeGenerator<'a> {
    config: &'a Config,
    mapper: TypeMapper,
}

impl<'a> CodeGenerator<'a> {
    pub fn new(config: &'a Config) -> CodeGenerator<'a> {
        CodeGenerator {
            config,
            mapper: TypeMapper::new(config.type_mappings.clone()),
        }
    }

    pub fn generate_all(&self, tables: &[Table], queries: &[Query]) -> Result<(), GenerateError> {
        fs::create_dir_all(&self.config.output_dir).map_err(|e| {
            GenerateError::Config(format!(
                "failed to create output directory {}: {e}",
                self.config.output_dir
            ))
        })?;

        let pagination_code = pagination::render_pagination_module(&self.config.package_name);
        self.write_artifact("pagination.rs", &pagination_code)?;

        let mut sorted_tables: Vec<&Table> = tables.iter().collect();
        sorted_tables.sort_by(|a, b| a.name.cmp(&b.name));
        for table in sorted_tables {
            let code = tables::render_table_module(table, &self.mapper, &self.config.package_name)?;
            self.write_artifact(&table.file_name(), &code)?;
            if self.config.verbose {
                eprintln!("generated {}", table.file_name());
            }
        }

        for (stem, file_queries) in group_queries_by_file(queries) {
            let code = queries::render_query_module(
                &stem,
                &file_queries,
                tables,
                &self.mapper,
                &self.config.package_name,
            )?;
            let filename = query_file_name(&stem);
            self.write_artifact(&filename, &code)?;
            if self.config.verbose {
                eprintln!("generated {filename}");
            }
        }

        Ok(())
    }

    /// Format and write one owned file. Rendering is complete before the
    /// first byte hits disk, so a cancelled or failed run never leaves a
    /// partially written artifact.
    fn write_artifact(&self, filename: &str, code: &str) -> Result<(), GenerateError> {
        if !is_owned_file(filename) {
            return Err(GenerateError::emission(
                filename,
                "refusing to write a file outside the generated-file pattern",
            ));
        }
        let formatted = format_source(filename, code)?;
        let path = self.config.output_path(filename);
        fs::write(&path, formatted)
            .map_err(|e| GenerateError::emission(filename, format!("write failed: {e}")))?;
        Ok(())
    }
}

/// The generator owns exactly the shared pagination module and the
/// `*_generated.rs` files; everything else in the output directory is
/// off-limits.
pub fn is_owned_file(filename: &str) -> bool {
    filename == "pagination.rs" || filename.ends_with("_generated.rs")
}

pub fn query_file_name(stem: &str) -> String {
    format!("{}_queries_generated.rs", sanitize_stem(stem))
}

/// File stems become module and type names, so anything outside the
/// identifier alphabet collapses to an underscore.
pub fn sanitize_stem(stem: &str) -> String {
    to_snake_case(stem)
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '_' { c } else { '_' })
        .collect()
}

/// Queries grouped by the stem of their source file, stems sorted, queries
/// sorted by name within each file.
pub fn group_queries_by_file(queries: &[Query]) -> BTreeMap<String, Vec<&Query>> {
    let mut groups: BTreeMap<String, Vec<&Query>> = BTreeMap::new();
    for query in queries {
        let stem = file_stem(&query.source_file);
        groups.entry(stem).or_default().push(query);
    }
    for file_queries in groups.values_mut() {
        file_queries.sort_by(|a, b| a.name.cmp(&b.name));
    }
    groups
}

pub fn file_stem(path: &Path) -> String {
    path.file_stem()
        .map(|s| s.to_string_lossy().to_string())
        .unwrap_or_default()
}

/// Run the rendered buffer through rustfmt. The formatter is the validity
/// oracle: a buffer it rejects is a generator bug, reported with the
/// artifact name and rustfmt's own diagnostics.
pub fn format_source(artifact: &str, code: &str) -> Result<String, GenerateError> {
    let rustfmt = which::which("rustfmt")
        .map_err(|e| GenerateError::emission(artifact, format!("rustfmt not found: {e}")))?;

    let mut child = Command::new(rustfmt)
        .arg("--edition")
        .arg("2021")
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .map_err(|e| GenerateError::emission(artifact, format!("failed to run rustfmt: {e}")))?;

    if let Some(mut stdin) = child.stdin.take() {
        stdin
            .write_all(code.as_bytes())
            .map_err(|e| GenerateError::emission(artifact, format!("failed to feed rustfmt: {e}")))?;
    }

    let output = child
        .wait_with_output()
        .map_err(|e| GenerateError::emission(artifact, format!("rustfmt did not finish: {e}")))?;

    if !output.status.success() {
        return Err(GenerateError::emission(
            artifact,
            format!(
                "rustfmt rejected the rendered source:\n{}",
                String::from_utf8_lossy(&output.stderr)
            ),
        ));
    }

    String::from_utf8(output.stdout)
        .map_err(|e| GenerateError::emission(artifact, format!("rustfmt produced non-UTF8: {e}")))
}

/// The immutable header opening every owned file.
pub fn file_header(source: &str, package_name: &str) -> String {
    format!(
        "// Code generated by repogen. DO NOT EDIT.\n\
         // Source: {source}\n\
         // Part of the `{package_name}` module set.\n\n"
    )
}
