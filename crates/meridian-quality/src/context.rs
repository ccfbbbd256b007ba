use crate::assessment::QualityAssessment;
use crate::metric::CorrectiveAction;
use meridian_core::RagAnswer;
use serde::{Deserialize, Serialize};

/// State shared by every correction attempt of one loop run.
///
/// `correction_history` spans the whole run, so an action applied in one
/// iteration is never applied again in a later one.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CorrectionContext {
    pub original_query: String,
    /// The answer the next attempt starts from.
    pub original_result: RagAnswer,
    /// Assessment of `original_result`.
    pub assessment: QualityAssessment,
    pub iteration: u32,
    pub max_iterations: u32,
    #[serde(default)]
    pub correction_history: Vec<CorrectiveAction>,
}

impl CorrectionContext {
    pub fn new(
        query: impl Into<String>,
        result: RagAnswer,
        assessment: QualityAssessment,
        max_iterations: u32,
    ) -> Self {
        Self {
            original_query: query.into(),
            original_result: result,
            assessment,
            iteration: 0,
            max_iterations,
            correction_history: Vec::new(),
        }
    }

    /// Suggested actions not yet applied during this run, in suggestion order.
    pub fn pending_actions(&self) -> Vec<CorrectiveAction> {
        self.assessment
            .suggested_corrections
            .iter()
            .copied()
            .filter(|a| !self.correction_history.contains(a))
            .collect()
    }
}

/// Outcome of one correction attempt.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CorrectionAttempt {
    /// The last answer successfully produced; the input when nothing ran.
    pub answer: RagAnswer,
    /// Actions that completed, in order.
    pub applied: Vec<CorrectiveAction>,
    /// Error text of the handler that stopped the attempt.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub failure: Option<String>,
}

impl CorrectionAttempt {
    /// An attempt that left `answer` untouched.
    pub fn unchanged(answer: RagAnswer) -> Self {
        Self {
            answer,
            applied: Vec::new(),
            failure: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pending_actions_skip_history() {
        let answer = RagAnswer::new("q", "a", Vec::new(), 0.5);
        let mut ctx = CorrectionContext::new("q", answer, QualityAssessment::uniform("q", 0.1), 3);
        assert_eq!(ctx.pending_actions().len(), 7);
        ctx.correction_history.push(CorrectiveAction::RefineQuery);
        ctx.correction_history.push(CorrectiveAction::FactCheck);
        let pending = ctx.pending_actions();
        assert_eq!(pending.len(), 5);
        assert_eq!(pending[0], CorrectiveAction::RetrieveMore);
    }
}
