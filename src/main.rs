//! askdb - natural-language questions answered by safe, bounded, read-only SQL.

use std::sync::Arc;

use askdb::cli::{Cli, Command};
use askdb::commands::{handle_ask, handle_health, handle_schema, handle_validate, CommandOutput};
use askdb::config::{redact_url, Config};
use askdb::db::{self, DatabaseClient, MockDatabaseClient};
use askdb::error::Result;
use askdb::logging::{init_file_logging, init_stderr_logging};
use askdb::oracle::create_oracle;
use askdb::query::ExecutionGuard;
use askdb::safety::SqlValidator;
use askdb::workflow::Orchestrator;
use tracing::{error, info};

#[tokio::main]
async fn main() {
    let cli = Cli::parse_args();

    if cli.log_file {
        init_file_logging();
    } else {
        init_stderr_logging();
    }

    match run(cli).await {
        Ok(output) => {
            let rendered = output.render();
            if !rendered.is_empty() {
                println!("{rendered}");
            }
            if output.is_error() {
                std::process::exit(2);
            }
        }
        Err(e) => {
            error!("{}: {}", e.category(), e);
            std::process::exit(1);
        }
    }
}

async fn run(cli: Cli) -> Result<CommandOutput> {
    dotenvy::dotenv().ok();

    let mut config = Config::load(cli.config.as_deref())?;
    cli.apply_overrides(&mut config)?;
    config.validate()?;

    let format = cli.output_format()?;
    let schema = Arc::new(config.schema_descriptor()?);
    let validator = Arc::new(SqlValidator::new(Arc::clone(&schema), config.limit_policy()));

    match &cli.command {
        Command::Validate { sql } => Ok(handle_validate(&validator, sql, format)),
        Command::Schema => Ok(handle_schema(&schema, format)),
        Command::Health => {
            let db = open_database(&cli, &config).await?;
            let output = handle_health(db.as_ref(), &schema, format).await;
            db.close().await?;
            Ok(output)
        }
        Command::Ask { question } => {
            let db = open_database(&cli, &config).await?;
            let oracle = create_oracle(&config.llm)?;
            info!(
                provider = %config.llm.provider,
                oracle = oracle.name(),
                "Answering question"
            );

            let guard = ExecutionGuard::new(
                Arc::clone(&db),
                config.query_timeout(),
                config.limits.max_result_rows,
            );
            let orchestrator = Orchestrator::new(oracle, validator, guard);

            let output = handle_ask(&orchestrator, &question.join(" "), format).await;
            db.close().await?;
            Ok(output)
        }
    }
}

async fn open_database(cli: &Cli, config: &Config) -> Result<Arc<dyn DatabaseClient>> {
    if cli.mock_db {
        info!("Using mock database");
        return Ok(Arc::new(MockDatabaseClient::new()));
    }

    info!("Connecting to {}", redact_url(&config.database.url));
    db::connect(&config.database.url).await
}
