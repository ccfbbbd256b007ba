use std::collections::HashMap;

/// BM25 parameters.
const K1: f64 = 1.2;
const B: f64 = 0.75;

/// Tokenize text into lowercase words, filtering tokens with length <= 1.
pub(crate) fn tokenize(text: &str) -> Vec<String> {
    text.split(|c: char| !c.is_alphanumeric())
        .map(str::to_lowercase)
        .filter(|w| w.len() > 1)
        .collect()
}

/// A BM25 inverted index over documents keyed by string id.
#[derive(Debug, Clone, Default)]
pub struct Bm25Index {
    /// term -> (doc_id -> term_frequency)
    inverted_index: HashMap<String, HashMap<String, f64>>,
    /// doc_id -> document length in tokens
    doc_lengths: HashMap<String, f64>,
    avg_doc_length: f64,
}

impl Bm25Index {
    pub fn new() -> Self {
        Self::default()
    }

    /// Index `text` under `id`, replacing any document already stored there.
    pub fn add_document(&mut self, id: &str, text: &str) {
        if self.doc_lengths.contains_key(id) {
            self.remove_document(id);
        }
        let tokens = tokenize(text);

        let mut term_freq: HashMap<String, f64> = HashMap::new();
        for token in &tokens {
            *term_freq.entry(token.clone()).or_insert(0.0) += 1.0;
        }
        for (term, freq) in term_freq {
            self.inverted_index
                .entry(term)
                .or_default()
                .insert(id.to_string(), freq);
        }

        self.doc_lengths.insert(id.to_string(), tokens.len() as f64);
        self.recompute_avg_doc_length();
    }

    /// Remove a document. Returns false when `id` was not indexed.
    pub fn remove_document(&mut self, id: &str) -> bool {
        if self.doc_lengths.remove(id).is_none() {
            return false;
        }
        self.inverted_index.retain(|_, postings| {
            postings.remove(id);
            !postings.is_empty()
        });
        self.recompute_avg_doc_length();
        true
    }

    /// Up to `top_k` matching documents, best first.
    ///
    /// ```text
    /// score = sum over query terms of
    ///   IDF(t) * (tf * (k1 + 1)) / (tf + k1 * (1 - b + b * dl / avgdl))
    /// IDF(t) = ln((N - df + 0.5) / (df + 0.5) + 1)
    /// ```
    pub fn search(&self, query: &str, top_k: usize) -> Vec<(String, f64)> {
        if self.doc_lengths.is_empty() {
            return Vec::new();
        }
        let mut query_tokens = tokenize(query);
        query_tokens.sort_unstable();
        query_tokens.dedup();

        let n = self.doc_lengths.len() as f64;
        let avgdl = if self.avg_doc_length > 0.0 {
            self.avg_doc_length
        } else {
            1.0
        };
        let mut scores: HashMap<&str, f64> = HashMap::new();

        for token in &query_tokens {
            let Some(postings) = self.inverted_index.get(token) else {
                continue;
            };
            let df = postings.len() as f64;
            let idf = ((n - df + 0.5) / (df + 0.5) + 1.0).ln();
            for (doc_id, &tf) in postings {
                let dl = self.doc_lengths.get(doc_id).copied().unwrap_or(0.0);
                let term_score = idf * (tf * (K1 + 1.0)) / (tf + K1 * (1.0 - B + B * dl / avgdl));
                *scores.entry(doc_id.as_str()).or_insert(0.0) += term_score;
            }
        }

        let mut results: Vec<(String, f64)> = scores
            .into_iter()
            .map(|(id, score)| (id.to_string(), score))
            .collect();
        // Ties resolve by id so results are deterministic.
        results.sort_by(|a, b| b.1.total_cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
        results.truncate(top_k);
        results
    }

    pub fn document_count(&self) -> usize {
        self.doc_lengths.len()
    }

    pub fn contains(&self, id: &str) -> bool {
        self.doc_lengths.contains_key(id)
    }

    fn recompute_avg_doc_length(&mut self) {
        self.avg_doc_length = if self.doc_lengths.is_empty() {
            0.0
        } else {
            self.doc_lengths.values().sum::<f64>() / self.doc_lengths.len() as f64
        };
    }
}
