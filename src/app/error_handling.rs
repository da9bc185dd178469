//! Error handling utilities

use tracing::error;

use crate::error::Error;

const GENERAL_ERROR: i32 = 1;
const CONFIG_ERROR: i32 = 2;

/// Exit code for an error: 2 for configuration problems, 1 otherwise.
pub fn exit_code(error: &anyhow::Error) -> i32 {
    match error.downcast_ref::<Error>() {
        Some(Error::Config(_) | Error::Toml(_) | Error::Yaml(_) | Error::Pattern(_)) => CONFIG_ERROR,
        _ => GENERAL_ERROR,
    }
}

/// Handle fatal errors and exit with appropriate status code
///
/// - `verbose = 0`: the error message only
/// - `verbose >= 1`: the full error chain
pub fn handle_fatal_error(error: anyhow::Error, verbose: u8) -> ! {
    error!("Fatal error: {}", error);

    eprintln!("Error: {error}");
    if verbose >= 1 {
        eprintln!("\nError chain:");
        for (i, cause) in error.chain().enumerate() {
            eprintln!("  {}: {}", i, cause);
        }
    }

    std::process::exit(exit_code(&error))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_errors_exit_with_two() {
        let error = anyhow::Error::new(Error::Config("bad".into()));
        assert_eq!(exit_code(&error), 2);
    }

    #[test]
    fn test_other_errors_exit_with_one() {
        let error = anyhow::Error::new(Error::AgentStart {
            container: "migration-agent-acme".into(),
        });
        assert_eq!(exit_code(&error), 1);
        assert_eq!(exit_code(&anyhow::anyhow!("boom")), 1);
    }
}
