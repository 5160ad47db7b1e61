//! Keyword retrieval over manual passages using Tantivy (BM25)

use std::collections::HashSet;
use std::path::Path;

use anyhow::{Context, Result};
use async_trait::async_trait;
use manualbot_core::ChatTurn;
use tantivy::collector::TopDocs;
use tantivy::query::{BooleanQuery, Occur, Query, TermQuery};
use tantivy::schema::{
    Field, IndexRecordOption, Schema, TextFieldIndexing, TextOptions, Value, STORED,
};
use tantivy::tokenizer::{LowerCaser, NgramTokenizer, TextAnalyzer};
use tantivy::{Index, IndexReader, IndexWriter, ReloadPolicy, TantivyDocument, Term};
use tracing::{debug, info};

use super::{Passage, RetrievalError, Retriever};

/// Tokenizer name registered on every opened index
const BIGRAM_TOKENIZER: &str = "manual_bigram";

/// BM25 index of manual passages
///
/// Text is split into lower-cased character bi-grams, so Japanese text
/// without word boundaries matches as well as English.
pub struct PassageIndex {
    index: Index,
    reader: IndexReader,
    writer: Option<IndexWriter>,
    // Field handles
    text_field: Field,
    source_file_field: Field,
    page_field: Field,
}

impl PassageIndex {
    /// Open or create an index (read-write mode)
    pub fn open(index_path: impl AsRef<Path>) -> Result<Self> {
        Self::open_internal(index_path, true)
    }

    /// Open an index for retrieval only (no write lock acquired)
    pub fn open_reader_only(index_path: impl AsRef<Path>) -> Result<Self> {
        Self::open_internal(index_path, false)
    }

    fn open_internal(index_path: impl AsRef<Path>, with_writer: bool) -> Result<Self> {
        let index_path = index_path.as_ref();
        info!(
            "Opening passage index at {:?} (write_mode: {})",
            index_path, with_writer
        );

        let mut schema_builder = Schema::builder();

        let text_options = TextOptions::default()
            .set_indexing_options(
                TextFieldIndexing::default()
                    .set_tokenizer(BIGRAM_TOKENIZER)
                    .set_index_option(IndexRecordOption::WithFreqsAndPositions),
            )
            .set_stored();
        let text_field = schema_builder.add_text_field("text", text_options);
        let source_file_field = schema_builder.add_text_field("source_file", STORED);
        let page_field = schema_builder.add_u64_field("page", STORED);
        let schema = schema_builder.build();

        std::fs::create_dir_all(index_path)
            .with_context(|| format!("Failed to create index directory {:?}", index_path))?;
        let index = Index::open_or_create(
            tantivy::directory::MmapDirectory::open(index_path)?,
            schema,
        )?;

        // Tokenizers are not persisted with the index
        let analyzer = TextAnalyzer::builder(NgramTokenizer::new(2, 2, false)?)
            .filter(LowerCaser)
            .build();
        index.tokenizers().register(BIGRAM_TOKENIZER, analyzer);

        // 50MB writer heap
        let writer = if with_writer {
            Some(index.writer(50_000_000)?)
        } else {
            None
        };

        let reader = index
            .reader_builder()
            .reload_policy(ReloadPolicy::OnCommitWithDelay)
            .try_into()?;

        Ok(Self {
            index,
            reader,
            writer,
            text_field,
            source_file_field,
            page_field,
        })
    }

    /// Add passages to the index (requires write mode)
    pub fn add_passages(&mut self, passages: &[Passage]) -> Result<usize> {
        let writer = self
            .writer
            .as_mut()
            .context("Cannot index: opened in read-only mode")?;

        for passage in passages {
            let mut doc = TantivyDocument::default();
            doc.add_text(self.text_field, &passage.text);
            doc.add_text(self.source_file_field, &passage.source_file);
            if let Some(page) = passage.page {
                doc.add_u64(self.page_field, u64::from(page));
            }
            writer.add_document(doc)?;
        }

        debug!("Queued {} passages for indexing", passages.len());
        Ok(passages.len())
    }

    /// Replace the whole index with `passages` and commit
    pub fn replace_all(&mut self, passages: &[Passage]) -> Result<usize> {
        self.writer
            .as_mut()
            .context("Cannot index: opened in read-only mode")?
            .delete_all_documents()?;
        let added = self.add_passages(passages)?;
        self.commit()?;

        info!("Indexed {} passages", added);
        Ok(added)
    }

    /// Load a JSON array of passages and replace the index with it
    pub fn import_json(&mut self, path: impl AsRef<Path>) -> Result<usize> {
        let path = path.as_ref();
        let data = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read passages from {:?}", path))?;
        let passages: Vec<Passage> = serde_json::from_str(&data)
            .with_context(|| format!("Invalid passage file {:?}", path))?;
        self.replace_all(&passages)
    }

    /// Commit pending changes (requires write mode)
    pub fn commit(&mut self) -> Result<()> {
        if let Some(ref mut writer) = self.writer {
            writer.commit()?;
            self.reader.reload()?;
        }
        Ok(())
    }

    /// Number of indexed passages
    pub fn count(&self) -> usize {
        self.reader.searcher().num_docs() as usize
    }

    /// Top `k` passages for `query` by BM25 score
    pub fn search(&self, query: &str, k: usize) -> Result<Vec<Passage>, RetrievalError> {
        if k == 0 {
            return Ok(Vec::new());
        }

        let terms = self.query_terms(query)?;
        if terms.is_empty() {
            debug!("Query produced no terms: {:?}", query);
            return Ok(Vec::new());
        }

        // Any matching bi-gram contributes; BM25 ranks passages sharing more of them
        let clauses: Vec<(Occur, Box<dyn Query>)> = terms
            .iter()
            .map(|text| {
                let term = Term::from_field_text(self.text_field, text);
                let query: Box<dyn Query> =
                    Box::new(TermQuery::new(term, IndexRecordOption::WithFreqs));
                (Occur::Should, query)
            })
            .collect();
        let query = BooleanQuery::new(clauses);

        let searcher = self.reader.searcher();
        let top_docs = searcher.search(&query, &TopDocs::with_limit(k))?;

        let mut passages = Vec::with_capacity(top_docs.len());
        for (_score, doc_address) in top_docs {
            let doc: TantivyDocument = searcher.doc(doc_address)?;
            passages.push(Passage {
                text: get_text_field(&doc, self.text_field),
                source_file: get_text_field(&doc, self.source_file_field),
                page: doc
                    .get_first(self.page_field)
                    .and_then(|v| v.as_u64())
                    .and_then(|p| u32::try_from(p).ok()),
            });
        }

        Ok(passages)
    }

    /// Distinct analyzer tokens of `query`, in order of first appearance
    fn query_terms(&self, query: &str) -> Result<Vec<String>, RetrievalError> {
        let mut analyzer = self.index.tokenizer_for_field(self.text_field)?;
        let mut stream = analyzer.token_stream(query);

        let mut seen = HashSet::new();
        let mut terms = Vec::new();
        stream.process(&mut |token| {
            if seen.insert(token.text.clone()) {
                terms.push(token.text.clone());
            }
        });
        Ok(terms)
    }
}

#[async_trait]
impl Retriever for PassageIndex {
    async fn retrieve(
        &self,
        query: &str,
        _history: &[ChatTurn],
        k: usize,
    ) -> Result<Vec<Passage>, RetrievalError> {
        let passages = self.search(query, k)?;
        debug!("Retrieved {} passages", passages.len());
        Ok(passages)
    }
}

/// Helper to extract text field value
fn get_text_field(doc: &TantivyDocument, field: Field) -> String {
    doc.get_first(field)
        .and_then(|v| v.as_str())
        .unwrap_or("")
        .to_string()
}
