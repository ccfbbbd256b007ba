use crate::error::{MeridianError, MeridianResult};
use crate::task::TaskId;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::Duration;
use uuid::Uuid;

/// Label of a single reasoning artifact.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ThoughtType {
    Observation,
    Hypothesis,
    Analysis,
    Critique,
    Synthesis,
    Decision,
    Reflection,
}

impl std::fmt::Display for ThoughtType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ThoughtType::Observation => write!(f, "observation"),
            ThoughtType::Hypothesis => write!(f, "hypothesis"),
            ThoughtType::Analysis => write!(f, "analysis"),
            ThoughtType::Critique => write!(f, "critique"),
            ThoughtType::Synthesis => write!(f, "synthesis"),
            ThoughtType::Decision => write!(f, "decision"),
            ThoughtType::Reflection => write!(f, "reflection"),
        }
    }
}

/// One labeled reasoning step with a confidence score.
///
/// Parent and child links are ids into the owning [`ThoughtArena`], never
/// embedded ownership.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Thought {
    pub id: String,
    #[serde(rename = "type")]
    pub thought_type: ThoughtType,
    pub content: String,
    pub confidence: f64,
    pub model_used: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent_id: Option<String>,
    #[serde(default)]
    pub children_ids: Vec<String>,
    /// Set when the thought stands in for a failed generation.
    #[serde(default)]
    pub is_error: bool,
    pub created_at: DateTime<Utc>,
}

impl Thought {
    pub fn new(
        thought_type: ThoughtType,
        content: impl Into<String>,
        confidence: f64,
        model_used: impl Into<String>,
    ) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            thought_type,
            content: content.into(),
            confidence: crate::clamp_unit(confidence),
            model_used: model_used.into(),
            parent_id: None,
            children_ids: Vec::new(),
            is_error: false,
            created_at: Utc::now(),
        }
    }

    /// A thought recording a failed generation: confidence 0, content = error text.
    pub fn error(
        thought_type: ThoughtType,
        error: impl std::fmt::Display,
        model_used: impl Into<String>,
    ) -> Self {
        let mut thought = Self::new(thought_type, error.to_string(), 0.0, model_used);
        thought.is_error = true;
        thought
    }
}

/// Insertion-ordered store of thoughts indexed by id.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(from = "Vec<Thought>", into = "Vec<Thought>")]
pub struct ThoughtArena {
    thoughts: Vec<Thought>,
    index: HashMap<String, usize>,
}

impl ThoughtArena {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a thought, linking it under `parent` when given.
    ///
    /// Fails when `parent` is not in the arena or the id is already taken.
    pub fn insert(&mut self, mut thought: Thought, parent: Option<&str>) -> MeridianResult<String> {
        if self.index.contains_key(&thought.id) {
            return Err(MeridianError::Generation(format!(
                "duplicate thought id {}",
                thought.id
            )));
        }
        let id = thought.id.clone();
        if let Some(parent_id) = parent {
            let parent_idx = *self.index.get(parent_id).ok_or_else(|| {
                MeridianError::Generation(format!("unknown parent thought {parent_id}"))
            })?;
            self.thoughts[parent_idx].children_ids.push(id.clone());
            thought.parent_id = Some(parent_id.to_string());
        }
        self.index.insert(id.clone(), self.thoughts.len());
        self.thoughts.push(thought);
        Ok(id)
    }

    /// Move every thought of `other` into this arena, keeping their links.
    pub fn absorb(&mut self, other: ThoughtArena) {
        for thought in other.thoughts {
            if self.index.contains_key(&thought.id) {
                continue;
            }
            self.index.insert(thought.id.clone(), self.thoughts.len());
            self.thoughts.push(thought);
        }
    }

    pub fn get(&self, id: &str) -> Option<&Thought> {
        self.index.get(id).map(|&i| &self.thoughts[i])
    }

    pub fn children(&self, id: &str) -> Vec<&Thought> {
        self.get(id)
            .map(|t| t.children_ids.iter().filter_map(|c| self.get(c)).collect())
            .unwrap_or_default()
    }

    pub fn iter(&self) -> impl DoubleEndedIterator<Item = &Thought> {
        self.thoughts.iter()
    }

    pub fn last(&self) -> Option<&Thought> {
        self.thoughts.last()
    }

    pub fn len(&self) -> usize {
        self.thoughts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.thoughts.is_empty()
    }
}

impl From<Vec<Thought>> for ThoughtArena {
    fn from(thoughts: Vec<Thought>) -> Self {
        let index = thoughts
            .iter()
            .enumerate()
            .map(|(i, t)| (t.id.clone(), i))
            .collect();
        Self { thoughts, index }
    }
}

impl From<ThoughtArena> for Vec<Thought> {
    fn from(arena: ThoughtArena) -> Self {
        arena.thoughts
    }
}

/// Reasoning topology used to build a chain.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReasoningPattern {
    Linear,
    ChainOfThought,
    TreeOfThought,
    MultiPerspective,
    CritiqueAndRefine,
    Ensemble,
}

impl std::fmt::Display for ReasoningPattern {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ReasoningPattern::Linear => write!(f, "linear"),
            ReasoningPattern::ChainOfThought => write!(f, "chain_of_thought"),
            ReasoningPattern::TreeOfThought => write!(f, "tree_of_thought"),
            ReasoningPattern::MultiPerspective => write!(f, "multi_perspective"),
            ReasoningPattern::CritiqueAndRefine => write!(f, "critique_and_refine"),
            ReasoningPattern::Ensemble => write!(f, "ensemble"),
        }
    }
}

impl std::str::FromStr for ReasoningPattern {
    type Err = MeridianError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().replace('-', "_").as_str() {
            "linear" => Ok(ReasoningPattern::Linear),
            "chain_of_thought" | "cot" => Ok(ReasoningPattern::ChainOfThought),
            "tree_of_thought" | "tot" | "tree" => Ok(ReasoningPattern::TreeOfThought),
            "multi_perspective" | "perspectives" => Ok(ReasoningPattern::MultiPerspective),
            "critique_and_refine" | "refine" => Ok(ReasoningPattern::CritiqueAndRefine),
            "ensemble" => Ok(ReasoningPattern::Ensemble),
            other => Err(MeridianError::Config(format!(
                "unknown reasoning pattern: {other}"
            ))),
        }
    }
}

/// Weighted mean of thought confidences, weight(i) = 1 + 0.1·i.
///
/// Later thoughts weigh more. An empty slice yields 0; the result is always in `[0, 1]`.
pub fn chain_confidence(confidences: &[f64]) -> f64 {
    if confidences.is_empty() {
        return 0.0;
    }
    let (weighted, total) = confidences
        .iter()
        .enumerate()
        .fold((0.0, 0.0), |(sum, weights), (i, &c)| {
            let w = 1.0 + 0.1 * i as f64;
            (sum + w * crate::clamp_unit(c), weights + w)
        });
    crate::clamp_unit(weighted / total)
}

/// An ordered, parent-linked set of thoughts produced for one task.
///
/// Immutable once [`ReasoningChain::complete`] has run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReasoningChain {
    id: String,
    task_id: TaskId,
    pattern: ReasoningPattern,
    thoughts: ThoughtArena,
    final_decision: Option<String>,
    confidence_score: f64,
    #[serde(with = "crate::serde_millis")]
    total_time: Duration,
    models_used: Vec<String>,
    created_at: DateTime<Utc>,
    completed_at: Option<DateTime<Utc>>,
}

impl ReasoningChain {
    pub fn new(task_id: impl Into<TaskId>, pattern: ReasoningPattern) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            task_id: task_id.into(),
            pattern,
            thoughts: ThoughtArena::new(),
            final_decision: None,
            confidence_score: 0.0,
            total_time: Duration::ZERO,
            models_used: Vec::new(),
            created_at: Utc::now(),
            completed_at: None,
        }
    }

    /// Append a thought under `parent` and return its id.
    pub fn add_thought(&mut self, thought: Thought, parent: Option<&str>) -> MeridianResult<String> {
        self.ensure_open()?;
        let model = thought.model_used.clone();
        let id = self.thoughts.insert(thought, parent)?;
        self.note_model(model);
        Ok(id)
    }

    /// Merge the thoughts of a completed sub-chain into this one.
    pub fn absorb(&mut self, sub: ReasoningChain) -> MeridianResult<()> {
        self.ensure_open()?;
        for model in sub.models_used {
            self.note_model(model);
        }
        self.thoughts.absorb(sub.thoughts);
        Ok(())
    }

    /// Seal the chain: set the decision, compute confidence and timing.
    pub fn complete(mut self, final_decision: Option<String>, total_time: Duration) -> Self {
        if self.completed_at.is_some() {
            return self;
        }
        let confidences: Vec<f64> = self.thoughts.iter().map(|t| t.confidence).collect();
        self.confidence_score = chain_confidence(&confidences);
        self.final_decision = final_decision;
        self.total_time = total_time;
        self.completed_at = Some(Utc::now());
        self
    }

    fn ensure_open(&self) -> MeridianResult<()> {
        if self.completed_at.is_some() {
            return Err(MeridianError::Generation(format!(
                "reasoning chain {} is already completed",
                self.id
            )));
        }
        Ok(())
    }

    fn note_model(&mut self, model: String) {
        if !model.is_empty() && !self.models_used.contains(&model) {
            self.models_used.push(model);
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn task_id(&self) -> &str {
        &self.task_id
    }

    pub fn pattern(&self) -> ReasoningPattern {
        self.pattern
    }

    pub fn thoughts(&self) -> &ThoughtArena {
        &self.thoughts
    }

    pub fn thought(&self, id: &str) -> Option<&Thought> {
        self.thoughts.get(id)
    }

    pub fn final_decision(&self) -> Option<&str> {
        self.final_decision.as_deref()
    }

    pub fn confidence_score(&self) -> f64 {
        self.confidence_score
    }

    pub fn total_time(&self) -> Duration {
        self.total_time
    }

    pub fn models_used(&self) -> &[String] {
        &self.models_used
    }

    pub fn is_completed(&self) -> bool {
        self.completed_at.is_some()
    }

    pub fn completed_at(&self) -> Option<DateTime<Utc>> {
        self.completed_at
    }
}
