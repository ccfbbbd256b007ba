use crate::bm25::Bm25Index;
use async_trait::async_trait;
use meridian_core::{
    MeridianError, MeridianResult, RetrievalContext, RetrievalProvider, SourceChunk,
};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

/// Longest chunk, in characters, a corpus file is split into.
pub const DEFAULT_CHUNK_CHARS: usize = 1200;

/// File extensions loaded from a corpus directory.
const CORPUS_EXTENSIONS: &[&str] = &["md", "txt", "rst"];

/// A piece of text indexed for retrieval.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Document {
    pub id: String,
    pub title: String,
    #[serde(default)]
    pub path: Option<String>,
    pub content: String,
}

impl Document {
    pub fn new(id: impl Into<String>, title: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            title: title.into(),
            path: None,
            content: content.into(),
        }
    }

    pub fn with_path(mut self, path: impl Into<String>) -> Self {
        self.path = Some(path.into());
        self
    }
}

#[derive(Default)]
struct Corpus {
    index: Bm25Index,
    documents: HashMap<String, Document>,
}

/// In-memory keyword retrieval over BM25.
///
/// Scores are divided by the best score of the query, so the top chunk
/// always scores 1.0 and the rest fall in `[0, 1]`.
#[derive(Default)]
pub struct KeywordRetriever {
    corpus: RwLock<Corpus>,
}

impl KeywordRetriever {
    pub fn new() -> Self {
        Self::default()
    }

    /// Index one document, replacing any with the same id.
    pub async fn add_document(&self, document: Document) {
        let mut corpus = self.corpus.write().await;
        corpus
            .index
            .add_document(&document.id, &format!("{} {}", document.title, document.content));
        corpus.documents.insert(document.id.clone(), document);
    }

    pub async fn remove_document(&self, id: &str) -> bool {
        let mut corpus = self.corpus.write().await;
        corpus.documents.remove(id);
        corpus.index.remove_document(id)
    }

    pub async fn len(&self) -> usize {
        self.corpus.read().await.documents.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    /// Load every text file under `dir`, split into chunks.
    pub async fn from_dir(dir: &Path) -> MeridianResult<Self> {
        let retriever = Self::new();
        let mut pending = vec![dir.to_path_buf()];
        let mut files = 0usize;

        while let Some(current) = pending.pop() {
            let mut entries = tokio::fs::read_dir(&current).await.map_err(|e| {
                MeridianError::Retrieval(format!("cannot read corpus dir {}: {e}", current.display()))
            })?;
            while let Some(entry) = entries.next_entry().await? {
                let path = entry.path();
                if entry.file_type().await?.is_dir() {
                    pending.push(path);
                    continue;
                }
                let indexable = path
                    .extension()
                    .and_then(|e| e.to_str())
                    .is_some_and(|e| CORPUS_EXTENSIONS.contains(&e));
                if !indexable {
                    continue;
                }
                let text = match String::from_utf8(tokio::fs::read(&path).await?) {
                    Ok(text) => text,
                    Err(e) => {
                        warn!(path = %path.display(), "Corpus file is not valid UTF-8, decoding lossily");
                        String::from_utf8_lossy(e.as_bytes()).into_owned()
                    }
                };
                let relative = path.strip_prefix(dir).unwrap_or(&path).display().to_string();
                let title = path
                    .file_stem()
                    .and_then(|s| s.to_str())
                    .unwrap_or("untitled")
                    .to_string();
                for (i, chunk) in chunk_text(&text, DEFAULT_CHUNK_CHARS).into_iter().enumerate() {
                    let document = Document::new(format!("{relative}#{i}"), title.clone(), chunk)
                        .with_path(relative.clone());
                    retriever.add_document(document).await;
                }
                files += 1;
            }
        }

        info!(
            dir = %dir.display(),
            files,
            chunks = retriever.len().await,
            "Loaded corpus"
        );
        Ok(retriever)
    }
}

#[async_trait]
impl RetrievalProvider for KeywordRetriever {
    async fn retrieve(
        &self,
        sub_query: &str,
        context: &RetrievalContext,
    ) -> MeridianResult<Vec<SourceChunk>> {
        let corpus = self.corpus.read().await;
        // Over-fetch so excluded ids do not shrink the result.
        let hits = corpus
            .index
            .search(sub_query, context.top_k + context.exclude_ids.len());
        let best = hits.first().map(|(_, score)| *score).unwrap_or(0.0);

        let chunks: Vec<SourceChunk> = hits
            .into_iter()
            .filter(|(id, _)| !context.exclude_ids.contains(id))
            .filter_map(|(id, score)| {
                let doc = corpus.documents.get(&id)?;
                let mut chunk = SourceChunk::new(doc.id.clone(), doc.title.clone(), doc.content.clone());
                if let Some(path) = &doc.path {
                    chunk = chunk.with_path(path.clone());
                }
                let normalized = if best > 0.0 { score / best } else { 0.0 };
                Some(chunk.with_score(normalized))
            })
            .take(context.top_k)
            .collect();

        debug!(query = %sub_query, hits = chunks.len(), "Keyword retrieval");
        Ok(chunks)
    }
}

/// Split `text` on blank lines, packing paragraphs into chunks of at most
/// `max_chars` characters. A single longer paragraph becomes its own chunk.
pub fn chunk_text(text: &str, max_chars: usize) -> Vec<String> {
    let mut chunks = Vec::new();
    let mut current = String::new();
    for paragraph in text.split("\n\n").map(str::trim).filter(|p| !p.is_empty()) {
        if !current.is_empty() && current.chars().count() + paragraph.chars().count() + 2 > max_chars {
            chunks.push(std::mem::take(&mut current));
        }
        if !current.is_empty() {
            current.push_str("\n\n");
        }
        current.push_str(paragraph);
    }
    if !current.is_empty() {
        chunks.push(current);
    }
    chunks
}
