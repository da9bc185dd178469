//! # stackport
//!
//! Exports a Terraform platform organization into migration data for a
//! stack-based platform.
//!
//! ## Usage
//!
//! ```bash
//! stackport export [-c stackport.toml] [-o out/] [--source-out source.json] [--skip-enrichment] [-y]
//! stackport map source.json [-c stackport.toml] [-o out/]
//! ```
//!
//! ## Modules
//!
//! - `source` - API client, record model and extraction of the source graph
//! - `audit` - Compatibility findings attached to extracted records
//! - `enrich` - Recovery of sensitive values through plans on a temporary agent
//! - `mapper` - Source graph to target records
//! - `expand` - Migration ids and inlined relationships
//! - `pipeline` - Extract, enrich, map and expand end to end
//! - `config` - Settings files, environment overlay and validation
//! - `subprocess` - Process and container runtime abstraction
//! - `testing` - Mock transport, runtime and fixtures
pub mod app;
pub mod audit;
pub mod config;
pub mod enrich;
pub mod error;
pub mod expand;
pub mod interaction;
pub mod mapper;
pub mod pipeline;
pub mod source;
pub mod subprocess;

pub mod testing;
