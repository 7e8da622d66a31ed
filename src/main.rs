use anyhow::Result;
use clap::Parser;
use repogen::config::{Config, FileConfig};
use repogen::Generator;

/// Generate typed sqlx repositories and query modules from a live
/// PostgreSQL schema.
#[derive(Parser)]
#[command(author, version, about)]
struct Cli {
    /// PostgreSQL connection string (or use the DATABASE_URL env var)
    #[arg(long, env = "DATABASE_URL")]
    dsn: Option<String>,

    /// Output directory for generated files
    #[arg(long)]
    output: Option<String>,

    /// Database schema to introspect
    #[arg(long)]
    schema: Option<String>,

    /// Directory containing annotated SQL query files
    #[arg(long)]
    queries: Option<String>,

    /// Generate table-based repositories
    #[arg(long)]
    tables: bool,

    /// Comma-separated table name patterns to include
    #[arg(long, value_delimiter = ',')]
    include: Vec<String>,

    /// Comma-separated table name patterns to exclude
    #[arg(long, value_delimiter = ',')]
    exclude: Vec<String>,

    /// Path to a TOML configuration file
    #[arg(long)]
    config: Option<String>,

    /// Module name recorded in generated file headers
    #[arg(long)]
    package: Option<String>,

    /// Report progress while generating
    #[arg(long)]
    verbose: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let file_config = match &cli.config {
        Some(path) => Some(FileConfig::load(path)?),
        None => None,
    };

    let cli_config = Config {
        dsn: cli.dsn.unwrap_or_default(),
        schema: cli.schema.unwrap_or_default(),
        output_dir: cli.output.unwrap_or_default(),
        package_name: cli.package.unwrap_or_default(),
        tables: cli.tables,
        queries_dir: cli.queries,
        include: cli.include.into_iter().map(|s| s.trim().to_string()).collect(),
        exclude: cli.exclude.into_iter().map(|s| s.trim().to_string()).collect(),
        type_mappings: Default::default(),
        verbose: cli.verbose,
    };

    let config = Config::merge(cli_config, file_config);
    let output_dir = config.output_dir.clone();

    Generator::new(config).generate().await?;

    println!("Successfully generated code in {output_dir}");
    Ok(())
}
