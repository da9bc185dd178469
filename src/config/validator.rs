use super::{NameFilter, Settings};
use crate::error::{Error, Result};

pub struct ConfigValidator;

impl ConfigValidator {
    pub fn validate(settings: &Settings) -> Result<()> {
        Self::validate_source(settings)?;
        Self::validate_filters(settings)?;
        Self::validate_enrichment(settings)
    }

    pub fn validate_source(settings: &Settings) -> Result<()> {
        if settings.source.api_token.trim().is_empty() {
            return Err(Error::Config(
                "API token cannot be empty (set source.api_token or STACKPORT_API_TOKEN)"
                    .to_string(),
            ));
        }

        if !settings.source.api_endpoint.starts_with("http://")
            && !settings.source.api_endpoint.starts_with("https://")
        {
            return Err(Error::Config(format!(
                "API endpoint must be an http(s) URL: {}",
                settings.source.api_endpoint
            )));
        }

        Ok(())
    }

    pub fn validate_filters(settings: &Settings) -> Result<()> {
        if settings
            .include
            .organizations
            .as_ref()
            .is_some_and(NameFilter::is_skip)
        {
            return Err(Error::Config(
                "include.organizations cannot be \"none\" or an empty list".to_string(),
            ));
        }

        for (key, filter) in settings.include.entries() {
            if let Some(filter) = filter {
                filter.compile().map_err(|e| {
                    Error::Config(format!("Invalid filter for include.{key}: {e}"))
                })?;
            }
        }

        Ok(())
    }

    pub fn validate_enrichment(settings: &Settings) -> Result<()> {
        if settings.enrichment.agent_start_attempts == 0 {
            return Err(Error::Config(
                "enrichment.agent_start_attempts must be greater than 0".to_string(),
            ));
        }

        Ok(())
    }
}
