use std::path::{Path, PathBuf};

use tracing::{info, warn};

use super::domain::Lender;

/// Parse a JSON array of lender policies.
///
/// Criteria that fail [`Criterion::validate`](super::domain::Criterion::validate)
/// are logged and kept; they fail when evaluated.
pub fn parse_lenders(raw: &str) -> Result<Vec<Lender>, SeedError> {
    let lenders: Vec<Lender> = serde_json::from_str(raw)?;

    for lender in &lenders {
        for issue in lender.policy_issues() {
            warn!(lender = %lender.name, %issue, "invalid criterion in lender policy");
        }
    }

    let programs: usize = lenders.iter().map(|lender| lender.programs.len()).sum();
    info!(lenders = lenders.len(), programs, "lender policies loaded");
    Ok(lenders)
}

pub fn load_lenders(path: &Path) -> Result<Vec<Lender>, SeedError> {
    let raw = std::fs::read_to_string(path).map_err(|source| SeedError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    parse_lenders(&raw)
}

#[derive(Debug, thiserror::Error)]
pub enum SeedError {
    #[error("failed to read lender policies from {}", .path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("lender policies are not valid JSON: {0}")]
    Parse(#[from] serde_json::Error),
}
