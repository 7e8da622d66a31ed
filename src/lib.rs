pub mod analyzer;
pub mod codegen;
pub mod config;
pub mod error;
pub mod introspect;
pub mod ir;
pub mod pagination;
pub mod queries;
pub mod types;

use sqlx::PgPool;

use crate::analyzer::QueryAnalyzer;
use crate::codegen::CodeGenerator;
use crate::config::Config;
use crate::error::GenerateError;
use crate::introspect::Introspector;
use crate::ir::Table;
use crate::queries::QueryParser;
use crate::types::TypeMapper;

/// The generation pipeline: validate the configuration, introspect the
/// schema, resolve types, parse and analyze queries, then emit the module
/// set. Descriptors flow one way, from the producers into the emitter.
pub struct Generator {
    config: Config,
}

impl Generator {
    pub fn new(config: Config) -> Generator {
        Generator { config }
    }

    pub async fn generate(&self) -> Result<(), GenerateError> {
        self.config.validate()?;

        let pool = PgPool::connect(&self.config.dsn)
            .await
            .map_err(|e| GenerateError::introspection("connect", e))?;

        let mapper = TypeMapper::new(self.config.type_mappings.clone());

        let mut tables = Vec::new();
        if self.config.tables {
            let introspector = Introspector::new(pool.clone(), self.config.schema.clone());
            for name in introspector.table_names().await? {
                if !self.config.should_include_table(&name) {
                    if self.config.verbose {
                        eprintln!("skipping table {name} (filtered)");
                    }
                    continue;
                }
                let mut table = introspector.table_details(&name).await?;
                validate_table(&table, &mapper)?;
                mapper.resolve_table(&mut table)?;
                if self.config.verbose {
                    eprintln!(
                        "introspected table {} ({} columns)",
                        table.name,
                        table.columns.len()
                    );
                }
                tables.push(table);
            }
        }

        let mut queries = Vec::new();
        if let Some(dir) = &self.config.queries_dir {
            let parser = QueryParser::new(dir);
            let mut parsed = parser.parse_queries()?;
            let query_analyzer = QueryAnalyzer::new(pool.clone(), mapper.clone());
            for query in &mut parsed {
                query_analyzer.analyze(query).await?;
                if self.config.verbose {
                    eprintln!(
                        "analyzed query {} ({} parameters, {} columns)",
                        query.name,
                        query.parameters.len(),
                        query.columns.len()
                    );
                }
            }
            queries = parsed;
        }

        let generator = CodeGenerator::new(&self.config);
        generator.generate_all(&tables, &queries)?;

        Ok(())
    }
}

/// The lifecycle invariants a table must satisfy before it may be emitted:
/// a name and at least one column, and a single non-null uuid primary key.
pub fn validate_table(table: &Table, mapper: &TypeMapper) -> Result<(), GenerateError> {
    if table.name.is_empty() || table.schema.is_empty() {
        return Err(GenerateError::UuidKey {
            table: table.name.clone(),
            reason: "table is missing a schema or name".to_string(),
        });
    }
    if table.columns.is_empty() {
        return Err(GenerateError::UuidKey {
            table: table.name.clone(),
            reason: "table has no columns".to_string(),
        });
    }
    match table.primary_key.len() {
        0 => {
            return Err(GenerateError::UuidKey {
                table: table.name.clone(),
                reason: "table has no primary key".to_string(),
            })
        }
        1 => {}
        n => {
            return Err(GenerateError::UuidKey {
                table: table.name.clone(),
                reason: format!("composite primary key of {n} columns is not supported"),
            })
        }
    }

    let pk = table.primary_key_column().ok_or_else(|| GenerateError::UuidKey {
        table: table.name.clone(),
        reason: format!("primary key column `{}` not found", table.primary_key[0]),
    })?;

    mapper.validate_uuid_pk(pk).map_err(|e| match e {
        GenerateError::UuidKey { reason, .. } => GenerateError::UuidKey {
            table: table.name.clone(),
            reason,
        },
        other => other,
    })
}
