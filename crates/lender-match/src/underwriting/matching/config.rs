use serde::{Deserialize, Serialize};

/// Outcome assigned to criteria that no handler or heuristic rule recognises.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UnevaluatedPolicy {
    /// Unrecognised criteria pass and are flagged in the audit trail.
    #[default]
    Pass,
    /// Unrecognised criteria fail, so extraction gaps surface as ineligibility.
    Fail,
}

impl UnevaluatedPolicy {
    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "pass" | "permissive" => Some(Self::Pass),
            "fail" | "strict" => Some(Self::Fail),
            _ => None,
        }
    }

    pub const fn passes(self) -> bool {
        matches!(self, UnevaluatedPolicy::Pass)
    }
}

/// Engine-level knobs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct MatchingConfig {
    #[serde(default)]
    pub unevaluated: UnevaluatedPolicy,
}
