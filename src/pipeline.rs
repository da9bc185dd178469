//! Extract, audit, enrich, map and expand, then hand the result off as JSON.

use serde::Serialize;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{info, warn};

use crate::audit::audit;
use crate::config::{MappingConfig, Settings};
use crate::enrich::{EnrichmentReport, Enricher};
use crate::error::Result;
use crate::expand::{expand, ExpandedGraph};
use crate::interaction::UserInteraction;
use crate::mapper::Mapper;
use crate::source::{ApiClient, Extractor, HttpTransport, SourceGraph};
use crate::subprocess::ContainerRuntime;

pub const DATA_FILE: &str = "data.json";

/// External systems the pipeline talks to.
pub struct Collaborators {
    pub transport: Arc<dyn HttpTransport>,
    pub runtime: Option<Arc<dyn ContainerRuntime>>,
    pub interaction: Arc<dyn UserInteraction>,
}

#[derive(Debug, Clone)]
pub struct ExportOptions {
    pub output_dir: PathBuf,
    /// Also write the extracted (and enriched) source graph here.
    pub source_out: Option<PathBuf>,
    pub skip_enrichment: bool,
}

#[derive(Debug)]
pub struct ExportSummary {
    pub data_file: PathBuf,
    pub enrichment: Option<EnrichmentReport>,
    pub graph: ExpandedGraph,
}

pub async fn write_json<T: Serialize>(path: &Path, value: &T) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        tokio::fs::create_dir_all(parent).await?;
    }
    tokio::fs::write(path, serde_json::to_string_pretty(value)?).await?;
    info!("Wrote '{}'", path.display());
    Ok(())
}

/// Map a source graph and expand its relationships.
pub fn map_and_expand(graph: &SourceGraph, config: &MappingConfig) -> Result<ExpandedGraph> {
    let mapped = Mapper::new(config).map(graph)?;
    expand(&mapped)
}

/// Map a previously written source graph, without touching the network.
pub async fn map_file(source: &Path, config: &MappingConfig, output_dir: &Path) -> Result<PathBuf> {
    info!("Reading source data from '{}'", source.display());
    let content = tokio::fs::read_to_string(source).await?;
    let graph: SourceGraph = serde_json::from_str(&content)?;

    let expanded = map_and_expand(&graph, config)?;
    let data_file = output_dir.join(DATA_FILE);
    write_json(&data_file, &expanded).await?;
    Ok(data_file)
}

pub struct Pipeline {
    settings: Settings,
    collaborators: Collaborators,
}

impl Pipeline {
    pub fn new(settings: Settings, collaborators: Collaborators) -> Self {
        Self {
            settings,
            collaborators,
        }
    }

    pub fn client(&self) -> ApiClient {
        ApiClient::new(
            Arc::clone(&self.collaborators.transport),
            &self.settings.source.api_endpoint,
            &self.settings.source.api_token,
        )
    }

    pub async fn export(&self, options: &ExportOptions) -> Result<ExportSummary> {
        let client = self.client();
        let variable_sets = self.settings.mapping.experimental_support_variable_sets;

        let mut graph = Extractor::new(&client, &self.settings.include, variable_sets)
            .extract()
            .await?;

        audit(&mut graph);

        let enrichment = if options.skip_enrichment {
            info!("Skipping data enrichment");
            None
        } else {
            let enricher = Enricher::new(
                &client,
                self.collaborators.runtime.clone(),
                Arc::clone(&self.collaborators.interaction),
                &self.settings.enrichment,
                variable_sets,
            );
            Some(enricher.enrich(&mut graph).await?)
        };

        if let Some(path) = &options.source_out {
            if enrichment.as_ref().is_some_and(|r| r.recovered() > 0) {
                warn!(
                    "'{}' will contain recovered sensitive values in plain text",
                    path.display()
                );
            }
            write_json(path, &graph).await?;
        }

        let expanded = map_and_expand(&graph, &self.settings.mapping)?;
        let data_file = options.output_dir.join(DATA_FILE);
        write_json(&data_file, &expanded).await?;

        Ok(ExportSummary {
            data_file,
            enrichment,
            graph: expanded,
        })
    }
}
