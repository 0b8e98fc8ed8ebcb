//! Evidence index over reference documents.
//!
//! Loads every `.md` file in a directory, chunks it by paragraph (long
//! paragraphs re-split on sentence boundaries), and ranks chunks against a
//! query with TF-IDF cosine similarity. Retrieval is deterministic for a
//! fixed corpus and query: files load in sorted order and score ties break
//! by corpus position.
//!
//! A missing directory or an empty corpus is a construction error — the
//! system never starts a run it cannot serve.

use anyhow::Result;
use copilot_common::{CopilotError, Snippet};
use std::collections::HashMap;
use std::fs;
use std::path::Path;
use tracing::{info, warn};

/// Paragraphs shorter than this are noise (headings, separators).
const MIN_PARAGRAPH_CHARS: usize = 20;

/// Common English words excluded from the term space.
const STOP_WORDS: &[&str] = &[
    "a", "an", "and", "are", "as", "at", "be", "by", "for", "from", "how", "in", "is", "it",
    "of", "on", "or", "that", "the", "this", "to", "was", "were", "what", "which", "with",
];

#[derive(Debug)]
struct Chunk {
    id: String,
    content: String,
    source: String,
    /// L2-normalized TF-IDF weights.
    weights: HashMap<String, f64>,
}

/// Corpus statistics for startup logging.
#[derive(Debug, Clone, Copy)]
pub struct IndexStats {
    pub chunks: usize,
    pub documents: usize,
}

/// TF-IDF index over document chunks. Read-only after construction, safe to
/// share across runs.
#[derive(Debug)]
pub struct EvidenceIndex {
    chunks: Vec<Chunk>,
    idf: HashMap<String, f64>,
    documents: usize,
}

impl EvidenceIndex {
    /// Build the index from a directory of markdown files.
    pub fn load(docs_dir: &Path, chunk_size: usize) -> Result<Self> {
        if !docs_dir.is_dir() {
            return Err(CopilotError::DocsDirMissing(docs_dir.display().to_string()).into());
        }

        let mut files: Vec<_> = fs::read_dir(docs_dir)?
            .filter_map(|e| e.ok())
            .map(|e| e.path())
            .filter(|p| p.extension().map(|x| x == "md").unwrap_or(false))
            .collect();
        // Sorted load order keeps chunk ids and tie-breaking stable.
        files.sort();

        let mut raw_chunks: Vec<(String, String, String)> = Vec::new();
        for path in &files {
            let source = path
                .file_name()
                .map(|n| n.to_string_lossy().to_string())
                .unwrap_or_default();
            match fs::read_to_string(path) {
                Ok(text) => {
                    let stem = source.trim_end_matches(".md");
                    for (id, content) in chunk_text(&text, stem, chunk_size) {
                        raw_chunks.push((id, content, source.clone()));
                    }
                }
                Err(e) => warn!("Could not load {}: {}", source, e),
            }
        }

        if raw_chunks.is_empty() {
            return Err(CopilotError::EmptyCorpus(docs_dir.display().to_string()).into());
        }

        // Document frequency over unique terms per chunk.
        let n = raw_chunks.len();
        let mut df: HashMap<String, usize> = HashMap::new();
        let term_lists: Vec<Vec<String>> = raw_chunks
            .iter()
            .map(|(_, content, _)| tokenize(content))
            .collect();
        for terms in &term_lists {
            let mut seen: Vec<&String> = terms.iter().collect();
            seen.sort();
            seen.dedup();
            for term in seen {
                *df.entry(term.clone()).or_insert(0) += 1;
            }
        }

        // Smoothed IDF, so terms present everywhere still carry weight.
        let idf: HashMap<String, f64> = df
            .into_iter()
            .map(|(term, count)| {
                let value = ((1.0 + n as f64) / (1.0 + count as f64)).ln() + 1.0;
                (term, value)
            })
            .collect();

        let chunks: Vec<Chunk> = raw_chunks
            .into_iter()
            .zip(term_lists)
            .map(|((id, content, source), terms)| {
                let weights = weigh(&terms, &idf);
                Chunk {
                    id,
                    content,
                    source,
                    weights,
                }
            })
            .collect();

        let documents = files.len();
        info!(
            "Evidence index ready: {} chunks from {} documents",
            chunks.len(),
            documents
        );

        Ok(Self {
            chunks,
            idf,
            documents,
        })
    }

    /// Return the `top_k` most relevant snippets, relevance descending.
    /// Scores below `min_score` are dropped after ranking.
    pub fn retrieve(&self, query: &str, top_k: usize, min_score: f64) -> Vec<Snippet> {
        let query_weights = weigh(&tokenize(query), &self.idf);

        let mut scored: Vec<(usize, f64)> = self
            .chunks
            .iter()
            .enumerate()
            .map(|(idx, chunk)| (idx, cosine(&query_weights, &chunk.weights)))
            .collect();

        scored.sort_by(|a, b| {
            b.1.partial_cmp(&a.1)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then(a.0.cmp(&b.0))
        });

        scored
            .into_iter()
            .take(top_k)
            .filter(|(_, score)| *score >= min_score)
            .map(|(idx, score)| {
                let chunk = &self.chunks[idx];
                Snippet::new(&chunk.id, &chunk.content, &chunk.source, score.clamp(0.0, 1.0))
            })
            .collect()
    }

    pub fn stats(&self) -> IndexStats {
        IndexStats {
            chunks: self.chunks.len(),
            documents: self.documents,
        }
    }
}

/// Lowercased alphanumeric terms of length >= 2, stop words removed.
fn tokenize(text: &str) -> Vec<String> {
    text.to_lowercase()
        .split(|c: char| !c.is_alphanumeric())
        .filter(|t| t.len() >= 2 && !STOP_WORDS.contains(t))
        .map(String::from)
        .collect()
}

/// L2-normalized TF-IDF weights for a term list. Terms outside the corpus
/// vocabulary are ignored for queries (their IDF is unknown).
fn weigh(terms: &[String], idf: &HashMap<String, f64>) -> HashMap<String, f64> {
    let mut tf: HashMap<&str, f64> = HashMap::new();
    for term in terms {
        *tf.entry(term.as_str()).or_insert(0.0) += 1.0;
    }

    let mut weights: HashMap<String, f64> = tf
        .into_iter()
        .filter_map(|(term, count)| idf.get(term).map(|w| (term.to_string(), count * w)))
        .collect();

    let norm = weights.values().map(|w| w * w).sum::<f64>().sqrt();
    if norm > 0.0 {
        for w in weights.values_mut() {
            *w /= norm;
        }
    }
    weights
}

/// Cosine similarity of two normalized sparse vectors.
fn cosine(a: &HashMap<String, f64>, b: &HashMap<String, f64>) -> f64 {
    let (small, large) = if a.len() <= b.len() { (a, b) } else { (b, a) };
    small
        .iter()
        .filter_map(|(term, wa)| large.get(term).map(|wb| wa * wb))
        .sum()
}

/// Split text into chunks: one per paragraph, with oversized paragraphs
/// re-split on sentence boundaries. Chunk ids are `{stem}::chunk{K}`.
fn chunk_text(text: &str, stem: &str, chunk_size: usize) -> Vec<(String, String)> {
    let mut chunks = Vec::new();
    let mut idx = 0;
    let mut push = |chunks: &mut Vec<(String, String)>, idx: &mut usize, content: &str| {
        chunks.push((format!("{}::chunk{}", stem, idx), content.to_string()));
        *idx += 1;
    };

    for para in text.split("\n\n").map(str::trim).filter(|p| !p.is_empty()) {
        if para.len() < MIN_PARAGRAPH_CHARS {
            continue;
        }

        if para.len() <= chunk_size {
            push(&mut chunks, &mut idx, para);
            continue;
        }

        let mut current = String::new();
        for sentence in para.split(['.', '!', '?']) {
            let sentence = sentence.trim();
            if sentence.is_empty() {
                continue;
            }
            if current.len() + sentence.len() < chunk_size {
                current.push_str(sentence);
                current.push_str(". ");
            } else {
                if !current.is_empty() {
                    push(&mut chunks, &mut idx, current.trim());
                }
                current = format!("{}. ", sentence);
            }
        }
        if !current.is_empty() {
            push(&mut chunks, &mut idx, current.trim());
        }
    }

    chunks
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn corpus() -> TempDir {
        let dir = TempDir::new().unwrap();
        fs::write(
            dir.path().join("product_policy.md"),
            "# Returns\n\n\
             Unopened beverages may be returned within 14 days of purchase with a receipt.\n\n\
             Opened perishables are not eligible for return under any circumstances.\n",
        )
        .unwrap();
        fs::write(
            dir.path().join("marketing_calendar.md"),
            "# Campaigns\n\n\
             Summer Beverages 1997 ran from 1997-06-01 to 1997-06-30 across all regions.\n\n\
             Winter Classics 1997 ran from 1997-12-01 to 1997-12-31 in northern stores.\n",
        )
        .unwrap();
        dir
    }

    #[test]
    fn test_missing_dir_is_fatal() {
        let err = EvidenceIndex::load(Path::new("/nonexistent/docs"), 500).unwrap_err();
        assert!(err.to_string().contains("documents directory not found"));
    }

    #[test]
    fn test_empty_corpus_is_fatal() {
        let dir = TempDir::new().unwrap();
        let err = EvidenceIndex::load(dir.path(), 500).unwrap_err();
        assert!(err.to_string().contains("no usable document chunks"));
    }

    #[test]
    fn test_retrieve_ranks_relevant_chunk_first() {
        let dir = corpus();
        let index = EvidenceIndex::load(dir.path(), 500).unwrap();

        let hits = index.retrieve("return window for unopened beverages", 3, 0.0);
        assert!(!hits.is_empty());
        assert!(hits[0].content.contains("14 days"));
        assert_eq!(hits[0].source, "product_policy.md");
        assert!(hits[0].score > 0.0 && hits[0].score <= 1.0);
    }

    #[test]
    fn test_retrieve_is_deterministic() {
        let dir = corpus();
        let index = EvidenceIndex::load(dir.path(), 500).unwrap();

        let a = index.retrieve("summer campaign dates", 3, 0.0);
        let b = index.retrieve("summer campaign dates", 3, 0.0);
        assert_eq!(a, b);
    }

    #[test]
    fn test_retrieve_honors_top_k_and_order() {
        let dir = corpus();
        let index = EvidenceIndex::load(dir.path(), 500).unwrap();

        let hits = index.retrieve("campaign", 2, 0.0);
        assert!(hits.len() <= 2);
        for pair in hits.windows(2) {
            assert!(pair[0].score >= pair[1].score);
        }
    }

    #[test]
    fn test_min_score_floor() {
        let dir = corpus();
        let index = EvidenceIndex::load(dir.path(), 500).unwrap();

        let hits = index.retrieve("beverages", 3, 0.99);
        for hit in hits {
            assert!(hit.score >= 0.99);
        }
    }

    #[test]
    fn test_chunking_skips_headings_and_splits_long_paragraphs() {
        let long_para = "This is a sentence about retail analytics. ".repeat(20);
        let text = format!("# Title\n\n{}\n\nShort but real paragraph here.", long_para);
        let chunks = chunk_text(&text, "doc", 200);

        // The heading is below the minimum length; the long paragraph splits.
        assert!(chunks.len() > 2);
        assert!(chunks.iter().all(|(_, c)| c.len() >= MIN_PARAGRAPH_CHARS));
        assert_eq!(chunks[0].0, "doc::chunk0");
        assert!(chunks.iter().all(|(_, c)| c.len() <= 250));
    }

    #[test]
    fn test_stats() {
        let dir = corpus();
        let index = EvidenceIndex::load(dir.path(), 500).unwrap();
        let stats = index.stats();
        assert_eq!(stats.documents, 2);
        assert!(stats.chunks >= 4);
    }
}
