//! splc
//!
//! Command-line compiler for Heimsight pipeline queries.
//!
//! # Usage
//!
//! ```bash
//! splc compile "search level=error | stats count by host"
//! splc compile --dialect sqlite --earliest -24h "host=web-01 | head 20"
//! splc ast "search host=web-01 | top 5 app"
//! splc validate "search host= | stats"
//! splc tokens "search host=web-01"
//! ```

#![deny(unsafe_code)]

use clap::{Parser, Subcommand};
use spl::query::tokenize;
use spl::{CompilerConfig, QueryCompiler, SqlDialect};
use std::process::ExitCode;

/// Compile pipeline queries to ClickHouse or SQLite SQL
#[derive(Parser)]
#[command(name = "splc")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Emit logs as JSON lines
    #[arg(long, global = true)]
    json_logs: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Compile a query to SQL
    Compile {
        /// Target SQL dialect (clickhouse or sqlite)
        #[arg(short, long, env = "SPLC_DIALECT", default_value_t = SqlDialect::ClickHouse)]
        dialect: SqlDialect,

        /// Lower time bound (now, -24h, 2024-01-15, ...)
        #[arg(long, allow_hyphen_values = true)]
        earliest: Option<String>,

        /// Upper time bound
        #[arg(long, allow_hyphen_values = true)]
        latest: Option<String>,

        /// Print the compiled query as JSON
        #[arg(long)]
        json: bool,

        /// The query text
        query: String,
    },
    /// Print the parsed AST as JSON
    Ast {
        /// The query text
        query: String,
    },
    /// Check whether a query compiles
    Validate {
        /// Target SQL dialect (clickhouse or sqlite)
        #[arg(short, long, env = "SPLC_DIALECT", default_value_t = SqlDialect::ClickHouse)]
        dialect: SqlDialect,

        /// The query text
        query: String,
    },
    /// Print the token stream
    Tokens {
        /// The query text
        query: String,
    },
}

/// Text to print and whether the command succeeded.
struct Outcome {
    output: String,
    success: bool,
}

impl Outcome {
    fn ok(output: String) -> Self {
        Self {
            output,
            success: true,
        }
    }
}

fn init_tracing(json: bool) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn"));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);
    if json {
        builder.json().init();
    } else {
        builder.init();
    }
}

fn run(command: Commands, compiler: &QueryCompiler) -> anyhow::Result<Outcome> {
    let outcome = match command {
        Commands::Compile {
            dialect,
            earliest,
            latest,
            json,
            query,
        } => {
            let compiled = compiler.compile_with_time_range(
                &query,
                dialect,
                earliest.as_deref(),
                latest.as_deref(),
            )?;
            if json {
                Outcome::ok(serde_json::to_string_pretty(&compiled)?)
            } else {
                Outcome::ok(compiled.sql)
            }
        }
        Commands::Ast { query } => {
            let ast = compiler.parse(&query)?;
            Outcome::ok(serde_json::to_string_pretty(&ast)?)
        }
        Commands::Validate { dialect, query } => {
            let validation = compiler.validate(&query, dialect);
            Outcome {
                output: serde_json::to_string_pretty(&validation)?,
                success: validation.valid,
            }
        }
        Commands::Tokens { query } => {
            let lines: Vec<String> = tokenize(&query)?
                .iter()
                .map(|t| format!("{}:{}\t{:?}\t{}", t.line, t.column, t.kind, t.text))
                .collect();
            Outcome::ok(lines.join("\n"))
        }
    };
    Ok(outcome)
}

fn main() -> anyhow::Result<ExitCode> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();
    init_tracing(cli.json_logs);

    let config = CompilerConfig::from_env()?;
    tracing::debug!(?config, "Starting splc");
    let compiler = QueryCompiler::new(config);

    let outcome = run(cli.command, &compiler)?;
    println!("{}", outcome.output);

    Ok(if outcome.success {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    })
}
