//! xsdrel: derive a SQL Server schema from an XSD, import XML instances
//! against it, and run the file-watching ingestion daemon.

use std::path::{Path, PathBuf};

use anyhow::{anyhow, Context, Result};
use clap::{Args, Parser, Subcommand};
use colored::Colorize;
use tokio_util::sync::CancellationToken;
use xsdrel_daemon::{env_layer, file_layer, Daemon, Options, OptionsLayer};
use xsdrel_import::{ImportOptions, Importer, TiberiusExecutor};
use xsdrel_model::{build_model, emit_ddl, Model};

mod scripts;

#[derive(Parser)]
#[command(name = "xsdrel")]
#[command(author, version, about = "XSD-to-relational schema derivation and ingestion")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Derive the relational model from an XSD and write DDL outputs.
    Schema(SchemaArgs),

    /// Import one XML instance file against an already-provisioned schema.
    Import(ImportArgs),

    /// Watch the ingest directory (and optional remote source) until canceled.
    Watch(DaemonArgs),

    /// Same as `watch`, intended for platform service hosting.
    Daemon(DaemonArgs),
}

#[derive(Args)]
struct SchemaArgs {
    /// Path to the XSD file.
    #[arg(long)]
    xsd: PathBuf,
    /// Output directory for schema.sql and the administrative scripts.
    #[arg(long)]
    out: PathBuf,
    /// SQL Server schema name tables are created under.
    #[arg(long, default_value = "dbo")]
    schema: String,
    /// Also write an example XML instance document to `<out>/example.xml`.
    #[arg(long)]
    xml: bool,
    /// Also write `seed.sql` (one DEFAULT VALUES insert per parentless table).
    #[arg(long)]
    seed: bool,
}

#[derive(Args)]
struct ImportArgs {
    /// Path to the XSD the target schema was derived from.
    #[arg(long)]
    xsd: PathBuf,
    /// Path to the XML instance document to import.
    #[arg(long)]
    xml: PathBuf,
    /// ADO-style SQL Server connection string.
    #[arg(long)]
    connection: String,
    /// Skip the idempotency probe (spec.md §9 open question on probe cost).
    #[arg(long)]
    no_idempotency: bool,
    /// Log each row as it is imported instead of only a summary.
    #[arg(long)]
    verbose_import: bool,
}

#[derive(Args)]
struct DaemonArgs {
    #[arg(long)]
    xsd: Option<PathBuf>,
    #[arg(long)]
    out: Option<PathBuf>,
    #[arg(long)]
    import_dir: Option<PathBuf>,
    #[arg(long)]
    connection: Option<String>,
    #[arg(long)]
    remote_source_dir: Option<PathBuf>,
    #[arg(long)]
    remote_poll_seconds: Option<u64>,
    #[arg(long)]
    remote_history_file: Option<PathBuf>,
    #[arg(long)]
    verbose_import: bool,
    #[arg(long)]
    audit: bool,
    #[arg(long)]
    debounce_ms: Option<u64>,
    #[arg(long)]
    ready_wait_ms: Option<u64>,
    #[arg(long)]
    no_idempotency: bool,
    /// TOML config file, merged beneath environment and above defaults.
    #[arg(long)]
    config: Option<PathBuf>,
}

fn main() -> Result<()> {
    tracing_subscriber::fmt::init();

    let cli = Cli::parse();
    match cli.command {
        Commands::Schema(args) => cmd_schema(args),
        Commands::Import(args) => {
            let runtime = tokio::runtime::Runtime::new().context("failed to start async runtime")?;
            runtime.block_on(cmd_import(args))
        }
        Commands::Watch(args) | Commands::Daemon(args) => {
            let runtime = tokio::runtime::Runtime::new().context("failed to start async runtime")?;
            runtime.block_on(cmd_watch(args))
        }
    }
}

fn load_model(xsd_path: &Path, schema: &str) -> Result<Model> {
    let xsd_text = std::fs::read_to_string(xsd_path).with_context(|| format!("reading {}", xsd_path.display()))?;
    let model = build_model(&xsd_text, schema).map_err(|e| anyhow!("building model from {}: {e}", xsd_path.display()))?;
    for warning in model.validate() {
        eprintln!("{} {}", "warning:".yellow().bold(), warning.0);
    }
    Ok(model)
}

fn cmd_schema(args: SchemaArgs) -> Result<()> {
    let model = load_model(&args.xsd, &args.schema)?;
    std::fs::create_dir_all(&args.out)?;

    write_output(&args.out, "schema.sql", &emit_ddl(&model))?;
    write_output(&args.out, "schema.views.sql", &scripts::render_views(&model))?;
    write_output(&args.out, "schema.drop.sql", &scripts::render_drop(&model))?;
    write_output(&args.out, "schema.clear.sql", &scripts::render_clear(&model))?;
    write_output(&args.out, "schema.samples.sql", &scripts::render_samples(&model))?;

    if args.seed {
        write_output(&args.out, "seed.sql", &scripts::render_seed(&model))?;
    }
    if args.xml {
        write_output(&args.out, "example.xml", &scripts::render_example_xml(&model))?;
    }

    Ok(())
}

fn write_output(out_dir: &Path, name: &str, contents: &str) -> Result<()> {
    let path = out_dir.join(name);
    std::fs::write(&path, contents).with_context(|| format!("writing {}", path.display()))?;
    println!("{} {}", "wrote".green().bold(), path.display());
    Ok(())
}

async fn cmd_import(args: ImportArgs) -> Result<()> {
    let model = load_model(&args.xsd, xsdrel_model::DEFAULT_SCHEMA)?;
    let options = ImportOptions {
        idempotency: !args.no_idempotency,
        ..ImportOptions::default()
    };

    let mut executor = TiberiusExecutor::connect(&args.connection)
        .await
        .map_err(|e| anyhow!("connecting to {}: {e}", redact_connection(&args.connection)))?;

    let importer = Importer::new(&model, options);
    let result = importer
        .import_file(&args.xml, &mut executor)
        .await
        .map_err(|e| anyhow!("importing {}: {e}", args.xml.display()))?;

    println!("{} total_rows={}", "imported".green().bold(), result.total_rows);
    for (table, rows) in &result.per_table {
        if args.verbose_import {
            println!("  {table}: {rows}");
        }
    }
    for skipped in &result.skipped {
        println!("{} {} ({:?})", "skipped".yellow().bold(), skipped.local_name, skipped.reason);
    }

    Ok(())
}

async fn cmd_watch(args: DaemonArgs) -> Result<()> {
    let flags = OptionsLayer {
        xsd: args.xsd,
        out: args.out,
        import_dir: args.import_dir,
        connection: args.connection,
        remote_source_dir: args.remote_source_dir,
        remote_poll_seconds: args.remote_poll_seconds,
        remote_history_file: args.remote_history_file,
        verbose_import: Some(args.verbose_import).filter(|v| *v),
        audit: Some(args.audit).filter(|v| *v),
        debounce_ms: args.debounce_ms,
        ready_wait_ms: args.ready_wait_ms,
        no_idempotency: Some(args.no_idempotency).filter(|v| *v),
    };
    let env = env_layer();
    let file = file_layer(args.config.as_deref());

    let options = Options::resolve(flags, env, file, "out", "in").map_err(|e| anyhow!("{e}"))?;
    let model = load_model(&options.xsd, xsdrel_model::DEFAULT_SCHEMA)?;
    std::fs::create_dir_all(&options.import_dir)?;

    let connection = options.connection.clone();
    let daemon = Daemon::new(model, options);
    let cancel = CancellationToken::new();

    let shutdown_cancel = cancel.clone();
    tokio::spawn(async move {
        let _ = tokio::signal::ctrl_c().await;
        shutdown_cancel.cancel();
    });

    daemon
        .run(cancel, || {
            let connection = connection.clone();
            async move {
                match TiberiusExecutor::connect(&connection).await {
                    Ok(executor) => executor,
                    Err(e) => {
                        tracing::error!(error = %e, "failed to open a database connection for this import");
                        panic!("unrecoverable: cannot reach the database");
                    }
                }
            }
        })
        .await;

    Ok(())
}

fn redact_connection(connection: &str) -> String {
    connection
        .split(';')
        .map(|part| if part.to_ascii_lowercase().starts_with("password") { "Password=***".to_string() } else { part.to_string() })
        .collect::<Vec<_>>()
        .join(";")
}
