// =====================================================
// SUPADUMP CLI
// =====================================================

use anyhow::{bail, Context, Result};
use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;
use std::time::Duration;

use supadump::backup::sql_utils;
use supadump::types::{DEFAULT_INSERT_BATCH_SIZE, DEFAULT_PAGE_SIZE};
use supadump::{
    create_backup, parse_backup_summary, BackupOptions, PgSource, RestConfig, RestSource,
    StorageConfig, StorageSync, TableSource,
};

#[derive(Parser)]
#[command(
    name = "supadump",
    about = "Plain-SQL backups and storage migration for hosted Postgres projects",
    version
)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Dump table schemas and data into one annotated SQL file
    Backup(BackupArgs),
    /// Summarize an existing backup file into statement counts
    Inspect(InspectArgs),
    /// Copy a storage bucket between two projects
    StorageSync(StorageSyncArgs),
}

#[derive(Args)]
struct BackupArgs {
    /// Project URL for REST access, e.g. https://abc.supabase.co
    #[arg(long, env = "SUPABASE_URL", conflicts_with = "db_url")]
    url: Option<String>,

    /// Service-role API key for REST access
    #[arg(long, env = "SUPABASE_SERVICE_ROLE_KEY")]
    key: Option<String>,

    /// Direct Postgres connection string (bypasses the REST API)
    #[arg(long, env = "DATABASE_URL")]
    db_url: Option<String>,

    /// Schema to dump
    #[arg(long, default_value = "public")]
    schema: String,

    /// Output file for the generated SQL document
    #[arg(long, short, default_value = "backup.sql")]
    output: PathBuf,

    /// Tables probed when the listing RPC is unavailable (comma separated)
    #[arg(long, value_delimiter = ',')]
    fallback_tables: Vec<String>,

    /// Rows fetched per page while scanning a table
    #[arg(long, default_value_t = DEFAULT_PAGE_SIZE)]
    page_size: u64,

    /// Rows per generated INSERT statement
    #[arg(long, default_value_t = DEFAULT_INSERT_BATCH_SIZE)]
    batch_size: usize,

    /// Seconds before an unresponsive DDL introspection call is abandoned
    #[arg(long, default_value_t = 3)]
    ddl_timeout_secs: u64,
}

#[derive(Args)]
struct InspectArgs {
    /// Backup file to summarize
    file: PathBuf,

    /// Print the summary as JSON
    #[arg(long)]
    json: bool,
}

#[derive(Args)]
struct StorageSyncArgs {
    /// Source project URL
    #[arg(long, env = "SUPADUMP_SOURCE_URL")]
    source_url: String,

    /// Source service-role key
    #[arg(long, env = "SUPADUMP_SOURCE_KEY")]
    source_key: String,

    /// Target project URL
    #[arg(long, env = "SUPADUMP_TARGET_URL")]
    target_url: String,

    /// Target service-role key
    #[arg(long, env = "SUPADUMP_TARGET_KEY")]
    target_key: String,

    /// Bucket to copy
    #[arg(long, default_value = "images")]
    bucket: String,
}

#[tokio::main]
async fn main() -> Result<()> {
    let _ = tracing_log::LogTracer::init();
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "supadump=info,sqlx=warn".into()),
        )
        .with_writer(std::io::stderr)
        .try_init();

    let cli = Cli::parse();
    match cli.command {
        Command::Backup(args) => run_backup(args).await,
        Command::Inspect(args) => run_inspect(args),
        Command::StorageSync(args) => run_storage_sync(args).await,
    }
}

async fn run_backup(args: BackupArgs) -> Result<()> {
    let options = BackupOptions {
        page_size: args.page_size,
        insert_batch_size: args.batch_size,
        ddl_timeout: Duration::from_secs(args.ddl_timeout_secs),
        fallback_tables: args.fallback_tables.clone(),
    };

    let source = connect_source(&args).await?;
    let progress = |label: &str, current: usize, total: usize| {
        if total == 0 {
            eprintln!("{}", label);
        } else {
            eprintln!("[{}/{}] {}", current, total, label);
        }
    };

    let document = create_backup(source.as_ref(), &options, Some(&progress)).await?;
    sql_utils::write_text_file(&args.output, &document)
        .with_context(|| format!("failed to write {}", args.output.display()))?;

    let summary = parse_backup_summary(&document);
    eprintln!(
        "wrote {} ({} schema statements, {} data statements)",
        args.output.display(),
        summary.schema_statements,
        summary.data_statements
    );
    Ok(())
}

async fn connect_source(args: &BackupArgs) -> Result<Box<dyn TableSource>> {
    if let Some(db_url) = &args.db_url {
        let source = PgSource::connect(db_url, &args.schema)
            .await
            .context("failed to open the database connection")?;
        return Ok(Box::new(source));
    }

    match (&args.url, &args.key) {
        (Some(url), Some(key)) => {
            let schema = if args.schema == "public" {
                None
            } else {
                Some(args.schema.clone())
            };
            let source = RestSource::new(RestConfig {
                url: url.clone(),
                api_key: key.clone(),
                schema,
            })
            .context("failed to set up the REST client")?;
            Ok(Box::new(source))
        }
        _ => bail!("pass --db-url, or --url together with --key"),
    }
}

fn run_inspect(args: InspectArgs) -> Result<()> {
    let text = std::fs::read_to_string(&args.file)
        .with_context(|| format!("failed to read {}", args.file.display()))?;
    let summary = parse_backup_summary(&text);

    if args.json {
        println!("{}", serde_json::to_string_pretty(&summary)?);
        return Ok(());
    }

    println!("schema statements: {}", summary.schema_statements);
    println!("data statements:   {}", summary.data_statements);
    println!("total statements:  {}", summary.total_statements);
    println!();
    println!("{}", summary.instructions);
    Ok(())
}

async fn run_storage_sync(args: StorageSyncArgs) -> Result<()> {
    let sync = StorageSync::new(
        StorageConfig {
            url: args.source_url,
            api_key: args.source_key,
        },
        StorageConfig {
            url: args.target_url,
            api_key: args.target_key,
        },
    )?;

    let report = sync.sync_bucket(&args.bucket).await?;
    println!(
        "bucket {}: {} objects found, {} copied, {} failed",
        args.bucket, report.files_found, report.copied, report.failed
    );
    for failure in &report.failures {
        eprintln!("  failed: {}", failure);
    }
    if report.failed > 0 {
        bail!(
            "{} of {} objects failed to copy",
            report.failed,
            report.files_found
        );
    }
    Ok(())
}
