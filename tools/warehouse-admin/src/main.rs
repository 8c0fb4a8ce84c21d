//! Clickstream Warehouse Admin CLI
//!
//! Out-of-band warehouse setup:
//! - init-tables: create the four event tables
//! - ddl: run one allow-listed DDL statement
//! - health / info: connection status

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use colored::*;
use std::sync::Arc;
use std::time::Duration;

use event_pipeline::config::WarehouseConfig;
use event_pipeline::schema::create_table_statements;
use event_pipeline::sinks::{validate_ddl, DdlExecutor, RedshiftStore, StatementJobs, WarehouseStore};

#[derive(Parser)]
#[command(name = "warehouse-admin")]
#[command(about = "Warehouse administration for the clickstream pipeline")]
#[command(version = "0.1.0")]
struct Cli {
    #[command(flatten)]
    connection: Connection,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Args)]
struct Connection {
    /// Postgres-protocol connection URL
    #[arg(long, env = "REDSHIFT_URL", global = true)]
    url: Option<String>,

    /// Target schema
    #[arg(long, env = "REDSHIFT_SCHEMA", default_value = "public", global = true)]
    schema: String,

    /// Seconds between DDL status polls
    #[arg(long, env = "REDSHIFT_DDL_POLL_SECS", default_value = "5", global = true)]
    poll_secs: u64,

    /// Seconds before a DDL statement is abandoned
    #[arg(long, env = "REDSHIFT_DDL_TIMEOUT_SECS", default_value = "300", global = true)]
    timeout_secs: u64,
}

#[derive(Subcommand)]
enum Commands {
    /// Create the page view, click, scroll and session tables
    InitTables {
        /// Print the statements without running them
        #[arg(long)]
        dry_run: bool,
    },

    /// Run a single DDL statement (CREATE, ALTER, DROP, GRANT, REVOKE)
    Ddl {
        /// The statement to run
        sql: String,
    },

    /// Check warehouse connectivity
    Health,

    /// Show the connected database and schema
    Info,
}

impl Connection {
    fn warehouse_config(&self) -> WarehouseConfig {
        WarehouseConfig {
            enabled: true,
            url: self.url.clone(),
            schema: self.schema.clone(),
            ddl_poll_secs: self.poll_secs,
            ddl_timeout_secs: self.timeout_secs,
            ..Default::default()
        }
    }

    fn store(&self) -> Result<RedshiftStore> {
        RedshiftStore::connect_lazy(&self.warehouse_config())
            .context("Failed to configure warehouse connection (is REDSHIFT_URL set?)")
    }

    fn executor(&self, store: &RedshiftStore) -> DdlExecutor {
        DdlExecutor::new(
            Arc::new(StatementJobs::new(store.pool().clone())),
            Duration::from_secs(self.poll_secs),
            Duration::from_secs(self.timeout_secs),
        )
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenv::dotenv().ok();
    let cli = Cli::parse();

    match cli.command {
        Commands::InitTables { dry_run } => init_tables(&cli.connection, dry_run).await,
        Commands::Ddl { sql } => run_ddl(&cli.connection, &sql).await,
        Commands::Health => health(&cli.connection).await,
        Commands::Info => info(&cli.connection).await,
    }
}

async fn init_tables(connection: &Connection, dry_run: bool) -> Result<()> {
    let statements = create_table_statements(&connection.schema);

    if dry_run {
        for statement in &statements {
            println!("{statement};\n");
        }
        return Ok(());
    }

    let store = connection.store()?;
    let executor = connection.executor(&store);

    println!("{}", format!("Creating event tables in schema {}", connection.schema).bold());
    for statement in &statements {
        let id = executor.execute(statement).await.context("Table creation failed")?;
        println!("  {} {}", "✔".green(), id);
    }
    println!("{}", "Warehouse tables initialized".green().bold());
    Ok(())
}

async fn run_ddl(connection: &Connection, sql: &str) -> Result<()> {
    validate_ddl(sql)?;

    let store = connection.store()?;
    let id = connection.executor(&store).execute(sql).await?;
    println!("{} statement {}", "✔ DDL executed:".green().bold(), id);
    Ok(())
}

async fn health(connection: &Connection) -> Result<()> {
    let store = connection.store()?;
    if store.is_healthy().await {
        println!("{}", "Warehouse is healthy".green().bold());
        Ok(())
    } else {
        println!("{}", "Warehouse is unreachable".red().bold());
        anyhow::bail!("warehouse health check failed")
    }
}

async fn info(connection: &Connection) -> Result<()> {
    let store = connection.store()?;
    let healthy = store.is_healthy().await;

    println!("{}", "Warehouse".bold());
    println!("  database: {}", store.current_target().await);
    println!("  schema:   {}", store.schema());
    println!(
        "  status:   {}",
        if healthy { "healthy".green() } else { "unhealthy".red() }
    );
    Ok(())
}
