use serde::{Deserialize, Serialize};

/// One of the seven fixed dimensions an answer is scored on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QualityMetric {
    Relevance,
    Accuracy,
    Completeness,
    Coherence,
    FactualConsistency,
    SourceReliability,
    TemporalValidity,
}

impl QualityMetric {
    /// Every metric, in scoring order.
    pub const ALL: [QualityMetric; 7] = [
        QualityMetric::Relevance,
        QualityMetric::Accuracy,
        QualityMetric::Completeness,
        QualityMetric::Coherence,
        QualityMetric::FactualConsistency,
        QualityMetric::SourceReliability,
        QualityMetric::TemporalValidity,
    ];

    /// Share of the overall score. The weights of all metrics sum to 1.0.
    pub fn weight(self) -> f64 {
        match self {
            QualityMetric::Relevance => 0.25,
            QualityMetric::Accuracy => 0.20,
            QualityMetric::Completeness => 0.15,
            QualityMetric::Coherence => 0.15,
            QualityMetric::FactualConsistency => 0.15,
            QualityMetric::SourceReliability => 0.05,
            QualityMetric::TemporalValidity => 0.05,
        }
    }

    /// Score below which the metric is reported as an issue.
    pub fn default_threshold(self) -> f64 {
        match self {
            QualityMetric::Relevance => 0.70,
            QualityMetric::Accuracy => 0.75,
            QualityMetric::Completeness => 0.70,
            QualityMetric::Coherence => 0.70,
            QualityMetric::FactualConsistency => 0.75,
            QualityMetric::SourceReliability => 0.50,
            QualityMetric::TemporalValidity => 0.50,
        }
    }

    /// Corrective actions suggested when this metric falls below its threshold.
    pub fn corrective_actions(self) -> &'static [CorrectiveAction] {
        match self {
            QualityMetric::Relevance => &[CorrectiveAction::RefineQuery, CorrectiveAction::RetrieveMore],
            QualityMetric::Accuracy => &[CorrectiveAction::ValidateSources, CorrectiveAction::FactCheck],
            QualityMetric::Completeness => {
                &[CorrectiveAction::RetrieveMore, CorrectiveAction::CrossReference]
            }
            QualityMetric::Coherence => &[CorrectiveAction::SynthesizeBetter],
            QualityMetric::FactualConsistency => {
                &[CorrectiveAction::CrossReference, CorrectiveAction::ValidateSources]
            }
            QualityMetric::SourceReliability => &[],
            QualityMetric::TemporalValidity => &[CorrectiveAction::TemporalUpdate],
        }
    }

    /// True for metrics scored by a model rather than a local heuristic.
    pub fn is_judged(self) -> bool {
        !matches!(
            self,
            QualityMetric::SourceReliability | QualityMetric::TemporalValidity
        )
    }

    pub fn as_str(self) -> &'static str {
        match self {
            QualityMetric::Relevance => "relevance",
            QualityMetric::Accuracy => "accuracy",
            QualityMetric::Completeness => "completeness",
            QualityMetric::Coherence => "coherence",
            QualityMetric::FactualConsistency => "factual_consistency",
            QualityMetric::SourceReliability => "source_reliability",
            QualityMetric::TemporalValidity => "temporal_validity",
        }
    }
}

impl std::fmt::Display for QualityMetric {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A named remediation strategy applied by the correction engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CorrectiveAction {
    RetrieveMore,
    RefineQuery,
    ValidateSources,
    CrossReference,
    FactCheck,
    SynthesizeBetter,
    TemporalUpdate,
}

impl CorrectiveAction {
    pub fn as_str(self) -> &'static str {
        match self {
            CorrectiveAction::RetrieveMore => "retrieve_more",
            CorrectiveAction::RefineQuery => "refine_query",
            CorrectiveAction::ValidateSources => "validate_sources",
            CorrectiveAction::CrossReference => "cross_reference",
            CorrectiveAction::FactCheck => "fact_check",
            CorrectiveAction::SynthesizeBetter => "synthesize_better",
            CorrectiveAction::TemporalUpdate => "temporal_update",
        }
    }
}

impl std::fmt::Display for CorrectiveAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_weights_sum_to_one() {
        let total: f64 = QualityMetric::ALL.iter().map(|m| m.weight()).sum();
        assert!((total - 1.0).abs() < 1e-12);
    }

    #[test]
    fn test_action_table() {
        assert_eq!(
            QualityMetric::Relevance.corrective_actions(),
            &[CorrectiveAction::RefineQuery, CorrectiveAction::RetrieveMore]
        );
        assert!(QualityMetric::SourceReliability.corrective_actions().is_empty());
        assert_eq!(
            QualityMetric::TemporalValidity.corrective_actions(),
            &[CorrectiveAction::TemporalUpdate]
        );
    }

    #[test]
    fn test_judged_metrics() {
        let judged = QualityMetric::ALL.iter().filter(|m| m.is_judged()).count();
        assert_eq!(judged, 5);
    }

    #[test]
    fn test_names_match_serde() {
        for metric in QualityMetric::ALL {
            let json = serde_json::to_string(&metric).unwrap_or_default();
            assert_eq!(json, format!("\"{metric}\""));
        }
        assert_eq!(CorrectiveAction::FactCheck.to_string(), "fact_check");
    }
}
