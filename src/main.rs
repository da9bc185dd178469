use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{info, warn};

use stackport::app::{handle_fatal_error, init_logging, AppConfig};
use stackport::config::ConfigLoader;
use stackport::interaction::{AutoConfirm, TerminalInteraction, UserInteraction};
use stackport::pipeline::{map_file, Collaborators, ExportOptions, Pipeline};
use stackport::source::ReqwestTransport;
use stackport::subprocess::{ContainerRuntime, SubprocessManager};

/// Export a Terraform platform organization for migration
#[derive(Parser)]
#[command(name = "stackport")]
#[command(about = "Extract, enrich and map Terraform platform data for migration", long_about = None)]
struct Cli {
    /// Enable verbose output (-v for debug, -vv for trace, -vvv for all)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Extract from the source API, recover secrets and write the migration data
    Export {
        /// Path to configuration file
        #[arg(short = 'c', long)]
        config: Option<PathBuf>,

        /// Directory for the migration data
        #[arg(short = 'o', long, default_value = ".")]
        output_dir: PathBuf,

        /// Also write the extracted source data to this file
        #[arg(long)]
        source_out: Option<PathBuf>,

        /// Do not run the secret recovery step
        #[arg(long)]
        skip_enrichment: bool,

        /// Answer yes to every confirmation
        #[arg(short = 'y', long)]
        yes: bool,
    },
    /// Map previously extracted source data without contacting the source API
    Map {
        /// Source data written by `export --source-out`
        source: PathBuf,

        /// Path to configuration file
        #[arg(short = 'c', long)]
        config: Option<PathBuf>,

        /// Directory for the migration data
        #[arg(short = 'o', long, default_value = ".")]
        output_dir: PathBuf,
    },
}

fn main() {
    let cli = Cli::parse();
    let app = AppConfig::new(cli.verbose);
    init_logging(&app);

    let runtime = match tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
    {
        Ok(runtime) => runtime,
        Err(e) => handle_fatal_error(e.into(), app.verbose),
    };

    if let Err(e) = runtime.block_on(run(cli.command, app.clone())) {
        handle_fatal_error(e, app.verbose);
    }
}

async fn run(command: Commands, app: AppConfig) -> anyhow::Result<()> {
    match command {
        Commands::Export {
            config,
            output_dir,
            source_out,
            skip_enrichment,
            yes,
        } => {
            let app = app.with_config_path(config).with_assume_yes(yes);
            run_export(&app, output_dir, source_out, skip_enrichment).await
        }
        Commands::Map {
            source,
            config,
            output_dir,
        } => {
            let app = app.with_config_path(config);
            run_map(&app, source, output_dir).await
        }
    }
}

async fn run_export(
    app: &AppConfig,
    output_dir: PathBuf,
    source_out: Option<PathBuf>,
    skip_enrichment: bool,
) -> anyhow::Result<()> {
    let settings = ConfigLoader::new(app.config_path.clone()).load().await?;
    let transport = ReqwestTransport::new(settings.source.request_timeout())?;

    let runtime: Option<Arc<dyn ContainerRuntime>> = if skip_enrichment {
        None
    } else {
        SubprocessManager::production()
            .detect_container_runtime()
            .await
            .map(|r| Arc::new(r) as Arc<dyn ContainerRuntime>)
    };

    let interaction: Arc<dyn UserInteraction> = if app.assume_yes {
        Arc::new(AutoConfirm)
    } else {
        Arc::new(TerminalInteraction::new())
    };

    let pipeline = Pipeline::new(
        settings,
        Collaborators {
            transport: Arc::new(transport),
            runtime,
            interaction: Arc::clone(&interaction),
        },
    );
    let summary = pipeline
        .export(&ExportOptions {
            output_dir,
            source_out,
            skip_enrichment,
        })
        .await?;

    if let Some(report) = &summary.enrichment {
        for failure in report.failures() {
            warn!(
                "Recovery failed for organization '{}': {}",
                failure.organization_id,
                failure.error.as_deref().unwrap_or_default()
            );
        }
        info!("Recovered {} sensitive values", report.recovered());
    }
    interaction.display_info(&format!(
        "Migration data written to '{}'",
        summary.data_file.display()
    ));
    Ok(())
}

async fn run_map(app: &AppConfig, source: PathBuf, output_dir: PathBuf) -> anyhow::Result<()> {
    let settings = ConfigLoader::new(app.config_path.clone())
        .load_offline()
        .await?;
    let data_file = map_file(&source, &settings.mapping, &output_dir).await?;
    println!("Migration data written to '{}'", data_file.display());
    Ok(())
}
