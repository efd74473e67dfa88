//! The five-phase analysis pipeline catalog.
//!
//! Phases execute in the fixed order given by [`PhaseId::ORDER`]. The enum's
//! derived `Ord` follows declaration order, which IS the pipeline order —
//! keyed maps iterate phases in execution order for free.

use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// File extensions the lineage phase can extract lineage from.
const SQL_EXTENSIONS: &[&str] = &["sql", "ddl", "dml", "hql"];

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PhaseId {
    Documentation,
    Vectors,
    Lineage,
    Dependencies,
    Analysis,
}

impl PhaseId {
    /// Canonical execution order of the pipeline.
    pub const ORDER: [PhaseId; 5] = [
        PhaseId::Documentation,
        PhaseId::Vectors,
        PhaseId::Lineage,
        PhaseId::Dependencies,
        PhaseId::Analysis,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Documentation => "documentation",
            Self::Vectors => "vectors",
            Self::Lineage => "lineage",
            Self::Dependencies => "dependencies",
            Self::Analysis => "analysis",
        }
    }

    /// Human-readable name shown in status payloads and the terminal UI.
    pub fn display_name(&self) -> &'static str {
        match self {
            Self::Documentation => "Documentation Analysis",
            Self::Vectors => "Vector Generation",
            Self::Lineage => "Lineage Extraction",
            Self::Dependencies => "Dependency Resolution",
            Self::Analysis => "Impact Analysis",
        }
    }

    /// Zero-based position in the pipeline.
    pub fn index(&self) -> usize {
        Self::ORDER.iter().position(|p| p == self).unwrap_or(0)
    }

    /// The phase that runs after this one, if any.
    pub fn next(&self) -> Option<PhaseId> {
        Self::ORDER.get(self.index() + 1).copied()
    }

    pub fn is_last(&self) -> bool {
        *self == PhaseId::Analysis
    }

    /// Whether a file is eligible for this phase. Lineage only processes
    /// SQL-like sources; every other phase processes the full file set.
    pub fn is_eligible(&self, file_path: &str) -> bool {
        match self {
            Self::Lineage => {
                let ext = file_path
                    .rsplit('.')
                    .next()
                    .map(|e| e.to_ascii_lowercase())
                    .unwrap_or_default();
                SQL_EXTENSIONS.contains(&ext.as_str())
            }
            _ => true,
        }
    }
}

impl std::fmt::Display for PhaseId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PhaseId {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "documentation" => Ok(Self::Documentation),
            "vectors" => Ok(Self::Vectors),
            "lineage" => Ok(Self::Lineage),
            "dependencies" => Ok(Self::Dependencies),
            "analysis" => Ok(Self::Analysis),
            _ => Err(format!("Invalid phase id: {}", s)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_phase_id_roundtrip() {
        for s in &[
            "documentation",
            "vectors",
            "lineage",
            "dependencies",
            "analysis",
        ] {
            let parsed: PhaseId = s.parse().unwrap();
            assert_eq!(parsed.as_str(), *s);
        }
        assert!("invalid".parse::<PhaseId>().is_err());
    }

    #[test]
    fn test_order_is_fixed_and_complete() {
        assert_eq!(PhaseId::ORDER.len(), 5);
        assert_eq!(PhaseId::ORDER[0], PhaseId::Documentation);
        assert_eq!(PhaseId::ORDER[4], PhaseId::Analysis);
        for (i, phase) in PhaseId::ORDER.iter().enumerate() {
            assert_eq!(phase.index(), i);
        }
    }

    #[test]
    fn test_next_walks_the_pipeline() {
        assert_eq!(PhaseId::Documentation.next(), Some(PhaseId::Vectors));
        assert_eq!(PhaseId::Vectors.next(), Some(PhaseId::Lineage));
        assert_eq!(PhaseId::Lineage.next(), Some(PhaseId::Dependencies));
        assert_eq!(PhaseId::Dependencies.next(), Some(PhaseId::Analysis));
        assert_eq!(PhaseId::Analysis.next(), None);
        assert!(PhaseId::Analysis.is_last());
    }

    #[test]
    fn test_derived_ord_matches_pipeline_order() {
        assert!(PhaseId::Documentation < PhaseId::Vectors);
        assert!(PhaseId::Vectors < PhaseId::Lineage);
        assert!(PhaseId::Dependencies < PhaseId::Analysis);

        let mut sorted = vec![PhaseId::Analysis, PhaseId::Documentation, PhaseId::Lineage];
        sorted.sort();
        assert_eq!(
            sorted,
            vec![PhaseId::Documentation, PhaseId::Lineage, PhaseId::Analysis]
        );
    }

    #[test]
    fn test_lineage_eligibility_is_sql_only() {
        assert!(PhaseId::Lineage.is_eligible("models/orders.sql"));
        assert!(PhaseId::Lineage.is_eligible("schema/init.DDL"));
        assert!(PhaseId::Lineage.is_eligible("etl/load.hql"));
        assert!(!PhaseId::Lineage.is_eligible("src/main.py"));
        assert!(!PhaseId::Lineage.is_eligible("README.md"));
        assert!(!PhaseId::Lineage.is_eligible("no_extension"));
    }

    #[test]
    fn test_other_phases_accept_everything() {
        for phase in [
            PhaseId::Documentation,
            PhaseId::Vectors,
            PhaseId::Dependencies,
            PhaseId::Analysis,
        ] {
            assert!(phase.is_eligible("src/main.py"));
            assert!(phase.is_eligible("README.md"));
        }
    }

    #[test]
    fn test_serde_produces_snake_case() {
        assert_eq!(
            serde_json::to_string(&PhaseId::Documentation).unwrap(),
            "\"documentation\""
        );
        assert_eq!(
            serde_json::from_str::<PhaseId>("\"lineage\"").unwrap(),
            PhaseId::Lineage
        );
    }
}
