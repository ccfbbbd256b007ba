use serde::{Deserialize, Serialize};

/// A retrieved piece of source material with its retrieval score.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SourceChunk {
    pub id: String,
    pub title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
    pub content: String,
    /// Retrieval or grading score in `[0, 1]`.
    #[serde(default)]
    pub score: f64,
}

impl SourceChunk {
    pub fn new(id: impl Into<String>, title: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            title: title.into(),
            path: None,
            content: content.into(),
            score: 0.0,
        }
    }

    pub fn with_path(mut self, path: impl Into<String>) -> Self {
        self.path = Some(path.into());
        self
    }

    pub fn with_score(mut self, score: f64) -> Self {
        self.score = crate::clamp_unit(score);
        self
    }

    /// Title and path joined, lowercased; the text reliability markers are matched against.
    pub fn locator(&self) -> String {
        match &self.path {
            Some(path) => format!("{} {}", self.title, path).to_lowercase(),
            None => self.title.to_lowercase(),
        }
    }
}

/// A generated answer to a query together with the sources it was built from.
///
/// This is the unit the quality assessor scores and the correction engine rewrites.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RagAnswer {
    pub query: String,
    pub answer: String,
    #[serde(default)]
    pub sources: Vec<SourceChunk>,
    /// Producer's own confidence in `[0, 1]`.
    pub confidence: f64,
}

impl RagAnswer {
    pub fn new(
        query: impl Into<String>,
        answer: impl Into<String>,
        sources: Vec<SourceChunk>,
        confidence: f64,
    ) -> Self {
        Self {
            query: query.into(),
            answer: answer.into(),
            sources,
            confidence: crate::clamp_unit(confidence),
        }
    }

    /// Sources rendered as a numbered context block for prompts.
    pub fn render_sources(&self) -> String {
        render_sources(&self.sources)
    }
}

/// Render chunks as `[n] title (path)\ncontent` blocks separated by blank lines.
pub fn render_sources(sources: &[SourceChunk]) -> String {
    sources
        .iter()
        .enumerate()
        .map(|(i, s)| match &s.path {
            Some(path) => format!("[{}] {} ({})\n{}", i + 1, s.title, path, s.content),
            None => format!("[{}] {}\n{}", i + 1, s.title, s.content),
        })
        .collect::<Vec<_>>()
        .join("\n\n")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_locator_includes_path() {
        let chunk = SourceChunk::new("1", "API Reference", "body").with_path("docs/api.md");
        assert_eq!(chunk.locator(), "api reference docs/api.md");
    }

    #[test]
    fn test_render_sources_numbering() {
        let answer = RagAnswer::new(
            "q",
            "a",
            vec![
                SourceChunk::new("1", "First", "one"),
                SourceChunk::new("2", "Second", "two").with_path("b.md"),
            ],
            1.3,
        );
        let rendered = answer.render_sources();
        assert!(rendered.starts_with("[1] First\none"));
        assert!(rendered.contains("[2] Second (b.md)\ntwo"));
        assert_eq!(answer.confidence, 1.0);
    }
}
