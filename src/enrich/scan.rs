//! Plan-log scraping.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

use crate::error::{Error, Result};

const BRANCH_MARKER: &str = "ATLAS_CONFIGURATION_VERSION_GITHUB_BRANCH=";

/// Values found in one plan log.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ScanResult {
    /// Variable id to recovered value.
    pub values: BTreeMap<String, String>,
    pub branch: Option<String>,
}

/// `*` repeated to the value's length.
pub fn mask(value: &str) -> String {
    "*".repeat(value.chars().count())
}

/// Scan `log` for `KEY=value` lines. `pending` pairs variable ids with their keys.
pub fn scan_plan_log(log: &str, pending: &[(String, String)]) -> ScanResult {
    info!("Extract the env var values from the plan output");

    let mut result = ScanResult::default();
    for line in log.lines() {
        for (variable_id, key) in pending {
            if let Some(value) = line.strip_prefix(key.as_str()).and_then(|rest| rest.strip_prefix('=')) {
                debug!("Found sensitive env var: '{}={}'", key, mask(value));
                result.values.insert(variable_id.clone(), value.to_string());
            }
        }

        if let Some(branch) = line.strip_prefix(BRANCH_MARKER) {
            result.branch = Some(branch.to_string());
        }
    }

    result
}

/// Plan logs shipped by the agent, one `<run-id>.txt` file per run.
#[derive(Debug, Clone)]
pub struct PlanLogStore {
    dir: PathBuf,
}

impl PlanLogStore {
    pub fn new(dir: &Path) -> Self {
        Self {
            dir: dir.to_path_buf(),
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn path_for(&self, run_id: &str) -> PathBuf {
        self.dir.join(format!("{run_id}.txt"))
    }

    pub async fn read(&self, run_id: &str) -> Result<String> {
        let path = self.path_for(run_id);
        info!("Reading log data from '{}'", path.display());
        tokio::fs::read_to_string(&path)
            .await
            .map_err(|source| Error::PlanLog { path, source })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pending(pairs: &[(&str, &str)]) -> Vec<(String, String)> {
        pairs
            .iter()
            .map(|(id, key)| (id.to_string(), key.to_string()))
            .collect()
    }

    #[test]
    fn test_scan_recovers_values_and_branch() {
        let log = "Terraform v1.5.5\nDB_PASSWORD=hunter2=x\nDB_PASSWORD_OLD=nope\nATLAS_CONFIGURATION_VERSION_GITHUB_BRANCH=release\n";
        let result = scan_plan_log(log, &pending(&[("var-1", "DB_PASSWORD")]));

        assert_eq!(result.values.get("var-1").map(String::as_str), Some("hunter2=x"));
        assert_eq!(result.values.len(), 1);
        assert_eq!(result.branch.as_deref(), Some("release"));
    }

    #[test]
    fn test_empty_value_is_recovered_as_empty() {
        let result = scan_plan_log("TOKEN=\n", &pending(&[("var-9", "TOKEN")]));
        assert_eq!(result.values.get("var-9").map(String::as_str), Some(""));
    }

    #[test]
    fn test_unmatched_keys_stay_absent() {
        let result = scan_plan_log("OTHER=1\n", &pending(&[("var-1", "TOKEN")]));
        assert!(result.values.is_empty());
        assert!(result.branch.is_none());
    }

    #[test]
    fn test_mask_matches_length() {
        assert_eq!(mask("s3cr3t"), "******");
        assert_eq!(mask(""), "");
    }

    #[tokio::test]
    async fn test_store_reads_by_run_id() {
        let dir = tempfile::TempDir::new().unwrap();
        std::fs::write(dir.path().join("run-1.txt"), "A=1").unwrap();

        let store = PlanLogStore::new(dir.path());
        assert_eq!(store.read("run-1").await.unwrap(), "A=1");
        assert!(matches!(
            store.read("run-2").await,
            Err(Error::PlanLog { .. })
        ));
    }
}
