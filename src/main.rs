use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use colored::Colorize;
use tracing::info;
use tracing::Level;
use tracing_subscriber::EnvFilter;

use flowsync::config::SyncConfig;
use flowsync::services::flow_importer::ImportBatchSummary;
use flowsync::services::version_resolver;
use flowsync::services::{
    ExportOptions, ExportSummary, FlowExporter, FlowImporter, ImportResult, NifiClient,
    RegistryApi, RegistryClient,
};

#[derive(Parser)]
#[clap(author, version, about)]
struct Cli {
    #[clap(short, long, global = true)]
    log_level: Option<String>,
    /// Shorthand for --log-level debug
    #[clap(short, long, global = true)]
    debug: bool,
    /// TOML or YAML configuration file
    #[clap(short, long, global = true)]
    config: Option<PathBuf>,
    #[clap(long, global = true)]
    registry_url: Option<String>,
    #[clap(long, global = true)]
    nifi_url: Option<String>,
    #[clap(long, global = true)]
    flows_dir: Option<PathBuf>,
    #[clap(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List Registry buckets
    Buckets,
    /// List the flows of a bucket
    Flows {
        #[clap(short, long)]
        bucket_id: String,
    },
    /// List the versions of a flow
    Versions {
        #[clap(short, long)]
        bucket_id: String,
        #[clap(short, long)]
        flow_id: String,
    },
    /// Export the latest version of one flow
    Export {
        #[clap(short, long)]
        bucket_id: String,
        #[clap(short, long)]
        flow_id: String,
    },
    /// Export the latest version of every flow in every bucket
    ExportAll {
        /// Create a backup generation after exporting
        #[clap(short, long)]
        backup: bool,
    },
    /// Import a flow file into a NiFi process group
    Import {
        #[clap(short, long)]
        file: PathBuf,
        /// Target process group id, defaults to the root group
        #[clap(short, long)]
        target_pg: Option<String>,
    },
    /// Copy the current flow files into a new backup generation
    Backup,
    /// Restore flow files from backup generations
    Restore {
        /// Merge all generations instead of using only the newest
        #[clap(short, long)]
        all: bool,
        /// Import each restored flow into NiFi
        #[clap(short, long)]
        import: bool,
        #[clap(short, long)]
        target_pg: Option<String>,
    },
    /// Create a Registry bucket
    CreateBucket {
        #[clap(short, long)]
        name: String,
        #[clap(long)]
        description: Option<String>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Cli::parse();
    setup_logging(&args.log_level, args.debug);

    let mut config = SyncConfig::load(args.config.as_deref())?;
    if let Some(url) = args.registry_url {
        config.registry_url = url;
    }
    if let Some(url) = args.nifi_url {
        config.nifi_url = url;
    }
    if let Some(dir) = args.flows_dir {
        config.flows_dir = dir;
    }

    let success = match args.command {
        Commands::Buckets => {
            let registry = RegistryClient::new(config.registry_http())?;
            for bucket in registry.list_buckets().await? {
                println!("{}  {}", bucket.id, bucket.name.bold());
            }
            true
        }
        Commands::Flows { bucket_id } => {
            let registry = RegistryClient::new(config.registry_http())?;
            for flow in registry.list_flows(&bucket_id).await? {
                println!("{}  {}", flow.id, flow.name.bold());
            }
            true
        }
        Commands::Versions { bucket_id, flow_id } => {
            let registry = RegistryClient::new(config.registry_http())?;
            let versions = registry.list_versions(&bucket_id, &flow_id).await?;
            let latest = version_resolver::latest(&flow_id, &versions)?;
            for version in version_resolver::sorted(&versions) {
                let line = version_resolver::format_version(&version);
                if version.version == latest.version {
                    println!("{} {}", line, "(latest)".green());
                } else {
                    println!("{}", line);
                }
            }
            true
        }
        Commands::Export { bucket_id, flow_id } => {
            info!("Exporting flow {} from bucket {}", flow_id, bucket_id);
            let registry = RegistryClient::new(config.registry_http())?;
            let store = config.flow_store();
            let path = FlowExporter::new(&registry, &store)
                .export_flow(&bucket_id, &flow_id)
                .await?;
            println!("{} {}", "Exported".green(), path.display());
            true
        }
        Commands::ExportAll { backup } => {
            info!("Exporting all flows from {}", config.registry_url);
            let registry = RegistryClient::new(config.registry_http())?;
            let store = config.flow_store();
            let summary = FlowExporter::new(&registry, &store)
                .with_options(ExportOptions {
                    backup_after_export: backup,
                })
                .export_all_flows()
                .await?;
            print_export_summary(&summary);
            summary.is_success()
        }
        Commands::Import { file, target_pg } => {
            info!("Importing {} into {}", file.display(), config.nifi_url);
            let nifi = NifiClient::new(config.nifi_http())?;
            let importer = FlowImporter::new(&nifi, config.import_settings());
            let result = importer
                .import_flow(&file, target_pg.as_deref())
                .await
                .with_context(|| format!("Failed to import {}", file.display()))?;
            print_import_result(&result);
            true
        }
        Commands::Backup => {
            let store = config.flow_store();
            match store.create_backup()? {
                Some(generation) => {
                    println!("{} {}", "Backup created:".green(), generation.display());
                    true
                }
                None => {
                    println!("{}", "Nothing to back up".yellow());
                    false
                }
            }
        }
        Commands::Restore {
            all,
            import,
            target_pg,
        } => {
            let store = config.flow_store();
            let files = if all {
                store.read_all_backup_sets()?
            } else {
                store.read_latest_backup_set()?
            };
            let restored = store.restore(&files)?;
            println!("Restored {} flow files", restored);

            if import {
                let nifi = NifiClient::new(config.nifi_http())?;
                let importer = FlowImporter::new(&nifi, config.import_settings());
                let restored_files = files
                    .iter()
                    .filter_map(|f| f.file_name().map(|n| store.flows_dir().join(n)))
                    .collect::<Vec<_>>();
                let summary = importer
                    .import_flows(&restored_files, target_pg.as_deref())
                    .await;
                print_import_batch(&summary);
                summary.is_success()
            } else {
                true
            }
        }
        Commands::CreateBucket { name, description } => {
            let registry = RegistryClient::new(config.registry_http())?;
            let bucket = registry
                .create_bucket(&name, description.as_deref())
                .await?;
            println!("{} {} ({})", "Created bucket".green(), bucket.name, bucket.id);
            true
        }
    };

    if !success {
        std::process::exit(1);
    }
    Ok(())
}

fn print_export_summary(summary: &ExportSummary) {
    println!();
    println!("{}", "Export summary".bold());
    println!("  Buckets:  {}", summary.total_buckets);
    println!("  Flows:    {}", summary.total_flows);
    println!("  Exported: {}", summary.exported.to_string().green());
    if summary.failed > 0 {
        println!("  Failed:   {}", summary.failed.to_string().red());
        for failure in &summary.failures {
            println!("    {} ({}): {}", failure.flow_name, failure.flow_id, failure.error);
        }
    } else {
        println!("  Failed:   0");
    }
    for path in &summary.overwritten {
        println!("  {} {} was written by more than one flow", "!".yellow(), path.display());
    }
    if let Some(backup) = &summary.backup {
        println!("  Backup:   {}", backup.display());
    }
    if summary.is_success() {
        println!("{}", "Export completed".green());
    } else {
        println!("{}", "Export completed with failures".red());
    }
}

fn print_import_result(result: &ImportResult) {
    println!();
    println!("{} '{}'", "Import summary for".bold(), result.flow_name);
    println!("  Method:        {}", result.method);
    println!("  Process group: {}", result.process_group_id);
    println!("  Processors:    {}", result.created_processor_count);
    println!("  Connections:   {}", result.created_connection_count);
    println!("  Labels:        {}", result.created_label_count);
    for processor in &result.unmapped_processors {
        println!("  {} unmapped processor {}", "!".yellow(), processor);
    }
    for connection in &result.skipped_connections {
        println!("  {} skipped connection {}", "!".yellow(), connection);
    }
    for warning in &result.warnings {
        println!("  {} {}", "!".yellow(), warning);
    }
}

fn print_import_batch(summary: &ImportBatchSummary) {
    for result in &summary.results {
        print_import_result(result);
    }
    println!();
    println!("{}", "Import batch summary".bold());
    println!("  Total:    {}", summary.total);
    println!("  Imported: {}", summary.imported.to_string().green());
    println!("  Failed:   {}", summary.failed);
    for (path, error) in &summary.failures {
        println!("    {}: {}", path.display(), error.red());
    }
}

fn setup_logging(log_level: &Option<String>, debug: bool) {
    let log_level = if debug {
        Level::DEBUG
    } else {
        match log_level
            .as_ref()
            .unwrap_or(&"info".to_string())
            .to_lowercase()
            .as_str()
        {
            "trace" => Level::TRACE,
            "debug" => Level::DEBUG,
            "info" => Level::INFO,
            "warn" => Level::WARN,
            "error" => Level::ERROR,
            _ => Level::INFO,
        }
    };

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(format!(
            "hyper=off,reqwest=warn,{}",
            log_level
        )))
        .without_time()
        .init();
}
