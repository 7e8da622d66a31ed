use std::collections::HashMap;
use std::fs;
use std::path::Path;

use serde::Deserialize;

use crate::error::GenerateError;

/// Everything a generation run needs to know. Built by the CLI, optionally
/// merged over a TOML config file, validated once before the pipeline runs.
#[derive(Debug, Clone)]
pub struct Config {
    pub dsn: String,
    pub schema: String,
    pub output_dir: String,
    pub package_name: String,
    pub tables: bool,
    pub queries_dir: Option<String>,
    pub include: Vec<String>,
    pub exclude: Vec<String>,
    pub type_mappings: HashMap<String, String>,
    pub verbose: bool,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            dsn: String::new(),
            schema: "public".to_string(),
            output_dir: "./repositories".to_string(),
            package_name: "repositories".to_string(),
            tables: false,
            queries_dir: None,
            include: Vec::new(),
            exclude: Vec::new(),
            type_mappings: HashMap::new(),
            verbose: false,
        }
    }
}

#[derive(Debug, Deserialize, Default)]
#[serde(deny_unknown_fields)]
struct FileDatabase {
    #[serde(default)]
    dsn: Option<String>,
    #[serde(default)]
    schema: Option<String>,
}

#[derive(Debug, Deserialize, Default)]
#[serde(deny_unknown_fields)]
struct FileOutput {
    #[serde(default)]
    directory: Option<String>,
    #[serde(default)]
    package: Option<String>,
}

#[derive(Debug, Deserialize, Default)]
#[serde(deny_unknown_fields)]
struct FileTables {
    #[serde(default)]
    enabled: bool,
    #[serde(default)]
    include: Vec<String>,
    #[serde(default)]
    exclude: Vec<String>,
}

#[derive(Debug, Deserialize, Default)]
#[serde(deny_unknown_fields)]
struct FileQueries {
    #[serde(default)]
    directory: Option<String>,
}

#[derive(Debug, Deserialize, Default)]
#[serde(deny_unknown_fields)]
struct FileTypes {
    #[serde(default)]
    mappings: HashMap<String, String>,
}

/// On-disk shape of a config file:
///
/// ```toml
/// [database]
/// dsn = "postgres://localhost/app"
/// schema = "public"
///
/// [output]
/// directory = "./repositories"
/// package = "repositories"
///
/// [tables]
/// enabled = true
/// exclude = ["schema_migrations"]
///
/// [queries]
/// directory = "./queries"
///
/// [types]
/// mappings = { citext = "String" }
/// ```
#[derive(Debug, Deserialize, Default)]
#[serde(deny_unknown_fields)]
pub struct FileConfig {
    #[serde(default)]
    database: FileDatabase,
    #[serde(default)]
    output: FileOutput,
    #[serde(default)]
    tables: FileTables,
    #[serde(default)]
    queries: FileQueries,
    #[serde(default)]
    types: FileTypes,
}

impl FileConfig {
    pub fn load(path: &str) -> Result<FileConfig, GenerateError> {
        let text = fs::read_to_string(path)
            .map_err(|e| GenerateError::Config(format!("failed to read config file {path}: {e}")))?;
        toml::from_str(&text)
            .map_err(|e| GenerateError::Config(format!("failed to parse config file {path}: {e}")))
    }
}

impl Config {
    /// Layer CLI values over file values. `None`/empty CLI values fall back
    /// to the file, then to the defaults.
    pub fn merge(cli: Config, file: Option<FileConfig>) -> Config {
        let file = file.unwrap_or_default();
        let defaults = Config::default();
        Config {
            dsn: pick(cli.dsn, file.database.dsn, defaults.dsn),
            schema: pick(cli.schema, file.database.schema, defaults.schema),
            output_dir: pick(cli.output_dir, file.output.directory, defaults.output_dir),
            package_name: pick(cli.package_name, file.output.package, defaults.package_name),
            tables: cli.tables || file.tables.enabled,
            queries_dir: cli.queries_dir.or(file.queries.directory),
            include: if cli.include.is_empty() {
                file.tables.include
            } else {
                cli.include
            },
            exclude: if cli.exclude.is_empty() {
                file.tables.exclude
            } else {
                cli.exclude
            },
            type_mappings: if cli.type_mappings.is_empty() {
                file.types.mappings
            } else {
                cli.type_mappings
            },
            verbose: cli.verbose,
        }
    }

    /// Check the configuration and create the output directory.
    pub fn validate(&self) -> Result<(), GenerateError> {
        if self.dsn.is_empty() {
            return Err(GenerateError::Config(
                "database connection string (dsn) is required".into(),
            ));
        }
        if !self.tables && self.queries_dir.is_none() {
            return Err(GenerateError::Config(
                "must enable table generation (--tables) or query generation (--queries)".into(),
            ));
        }
        if let Some(dir) = &self.queries_dir {
            if !Path::new(dir).is_dir() {
                return Err(GenerateError::Config(format!(
                    "queries directory does not exist: {dir}"
                )));
            }
        }
        fs::create_dir_all(&self.output_dir).map_err(|e| {
            GenerateError::Config(format!(
                "failed to create output directory {}: {e}",
                self.output_dir
            ))
        })?;
        Ok(())
    }

    pub fn output_path(&self, filename: &str) -> std::path::PathBuf {
        Path::new(&self.output_dir).join(filename)
    }

    /// Exclude patterns win over include patterns; an empty include list
    /// admits every table that is not excluded.
    pub fn should_include_table(&self, table_name: &str) -> bool {
        if self.exclude.iter().any(|p| wildcard_match(p, table_name)) {
            return false;
        }
        if self.include.is_empty() {
            return true;
        }
        self.include.iter().any(|p| wildcard_match(p, table_name))
    }
}

fn pick(cli: String, file: Option<String>, default: String) -> String {
    if !cli.is_empty() {
        cli
    } else {
        file.filter(|v| !v.is_empty()).unwrap_or(default)
    }
}

/// Shell-style matching for table filters: `*` matches any run of
/// characters, `?` matches exactly one.
pub fn wildcard_match(pattern: &str, name: &str) -> bool {
    let p: Vec<char> = pattern.chars().collect();
    let n: Vec<char> = name.chars().collect();

    fn matches(p: &[char], n: &[char]) -> bool {
        match (p.first(), n.first()) {
            (None, None) => true,
            (Some('*'), _) => {
                matches(&p[1..], n) || (!n.is_empty() && matches(p, &n[1..]))
            }
            (Some('?'), Some(_)) => matches(&p[1..], &n[1..]),
            (Some(pc), Some(nc)) if pc == nc => matches(&p[1..], &n[1..]),
            _ => false,
        }
    }

    matches(&p, &n)
}
