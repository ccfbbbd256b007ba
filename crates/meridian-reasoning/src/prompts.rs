//! Prompt construction for individual reasoning steps.

use meridian_core::{Thought, ThoughtType};

/// What one step of a chain asks the model for.
#[derive(Debug, Clone)]
pub(crate) struct StepRequest<'a> {
    pub kind: ThoughtType,
    pub task: &'a str,
    pub context: &'a str,
    /// Earlier thoughts this step builds on, oldest first.
    pub prior: Vec<&'a Thought>,
    /// Extra framing such as the branch or perspective label.
    pub focus: Option<String>,
}

impl<'a> StepRequest<'a> {
    pub fn new(kind: ThoughtType, task: &'a str, context: &'a str) -> Self {
        Self {
            kind,
            task,
            context,
            prior: Vec::new(),
            focus: None,
        }
    }

    pub fn after(mut self, prior: impl IntoIterator<Item = &'a Thought>) -> Self {
        self.prior.extend(prior);
        self
    }

    pub fn focus(mut self, focus: impl Into<String>) -> Self {
        self.focus = Some(focus.into());
        self
    }

    pub fn render(&self) -> String {
        let mut prompt = format!(
            "STEP: {}\n{}\n\nTask:\n{}\n",
            self.kind.to_string().to_uppercase(),
            instruction(self.kind),
            self.task
        );
        if !self.context.trim().is_empty() {
            prompt.push_str(&format!("\nContext:\n{}\n", self.context.trim()));
        }
        if let Some(focus) = &self.focus {
            prompt.push_str(&format!("\nFocus: {focus}\n"));
        }
        if !self.prior.is_empty() {
            prompt.push_str("\nPrevious reasoning:\n");
            for thought in &self.prior {
                prompt.push_str(&format!("- [{}] {}\n", thought.thought_type, thought.content));
            }
        }
        prompt.push_str(
            "\nReply with a JSON object: {\"content\": \"<your reasoning>\", \
             \"confidence\": <number between 0 and 1>}",
        );
        prompt
    }
}

fn instruction(kind: ThoughtType) -> &'static str {
    match kind {
        ThoughtType::Observation => "State the key facts and constraints of the task.",
        ThoughtType::Hypothesis => "Propose a candidate approach or answer.",
        ThoughtType::Analysis => "Analyze the task carefully and reach a reasoned conclusion.",
        ThoughtType::Critique => "Point out weaknesses, gaps and errors in the previous analysis.",
        ThoughtType::Synthesis => "Combine the previous reasoning into one final answer.",
        ThoughtType::Decision => "Commit to a single decision.",
        ThoughtType::Reflection => "Reflect on how the reasoning could be improved.",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_render_includes_prior_and_focus() {
        let obs = Thought::new(ThoughtType::Observation, "sky is blue", 0.9, "m");
        let prompt = StepRequest::new(ThoughtType::Hypothesis, "why?", "physics")
            .after([&obs])
            .focus("approach 2 of 3")
            .render();
        assert!(prompt.starts_with("STEP: HYPOTHESIS"));
        assert!(prompt.contains("Context:\nphysics"));
        assert!(prompt.contains("Focus: approach 2 of 3"));
        assert!(prompt.contains("- [observation] sky is blue"));
    }

    #[test]
    fn test_render_skips_empty_context() {
        let prompt = StepRequest::new(ThoughtType::Analysis, "t", "  ").render();
        assert!(!prompt.contains("Context:"));
        assert!(!prompt.contains("Previous reasoning"));
    }
}
