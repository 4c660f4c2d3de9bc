use super::query::{AnalyzedFields, QueryString, analyze};
use application::{ApplicationError, AuthorSearchRepository};
use async_trait::async_trait;
use dashmap::DashMap;
use domain::{Author, AuthorId, Page, PageRequest};
use serde_json::Value;
use std::sync::Arc;
use tracing::{debug, instrument, trace};

/// An author together with its analysed, searchable representation.
#[derive(Debug)]
struct IndexedAuthor {
    author: Author,
    fields: AnalyzedFields,
}

/// In-memory full-text index over authors.
///
/// Each author is indexed from its JSON form: every scalar value is analysed
/// into lowercase tokens under its (dotted) field path.
#[derive(Debug, Clone, Default)]
pub struct InMemoryAuthorIndex {
    // Author ID -> indexed document
    documents: Arc<DashMap<AuthorId, Arc<IndexedAuthor>>>,
}

impl InMemoryAuthorIndex {
    pub fn new() -> Self {
        Self {
            documents: Arc::new(DashMap::new()),
        }
    }

    pub fn len(&self) -> usize {
        self.documents.len()
    }

    pub fn is_empty(&self) -> bool {
        self.documents.is_empty()
    }

    pub fn contains(&self, id: AuthorId) -> bool {
        self.documents.contains_key(&id)
    }
}

#[async_trait]
impl AuthorSearchRepository for InMemoryAuthorIndex {
    #[instrument(skip(self, author))]
    async fn save(&self, author: &Author) -> Result<(), ApplicationError> {
        let id = author.id.ok_or_else(|| {
            ApplicationError::IndexError("cannot index an author without id".to_string())
        })?;
        debug!(author_id = %id, "Indexing author in-memory");

        let value = serde_json::to_value(author).map_err(|e| {
            ApplicationError::IndexError(format!("failed to serialize author {}: {}", id, e))
        })?;
        let mut fields = AnalyzedFields::new();
        flatten_into(&mut fields, "", &value);
        trace!(author_id = %id, field_count = fields.len(), "Author analysed");

        self.documents.insert(
            id,
            Arc::new(IndexedAuthor {
                author: author.clone(),
                fields,
            }),
        );
        Ok(())
    }

    #[instrument(skip(self))]
    async fn delete(&self, id: AuthorId) -> Result<(), ApplicationError> {
        debug!(author_id = %id, "Removing author from in-memory index");
        // It's okay if the author wasn't indexed
        self.documents.remove(&id);
        Ok(())
    }

    #[instrument(skip(self, page), fields(page = page.page, size = page.size))]
    async fn search(
        &self,
        query: &str,
        page: &PageRequest,
    ) -> Result<Page<Author>, ApplicationError> {
        let parsed =
            QueryString::parse(query).map_err(|e| ApplicationError::InvalidInput(e.to_string()))?;

        // --- Step 1: Match and score ---
        let mut hits: Vec<(usize, Author)> = self
            .documents
            .iter()
            .filter_map(|entry| {
                parsed
                    .score(&entry.value().fields)
                    .map(|score| (score, entry.value().author.clone()))
            })
            .collect();
        trace!(count = hits.len(), "Candidates after query matching");

        // --- Step 2: Order (explicit sort, else relevance), id breaks ties ---
        if page.sort.is_empty() {
            hits.sort_unstable_by(|(score_a, a), (score_b, b)| {
                score_b.cmp(score_a).then(a.id.cmp(&b.id))
            });
        } else {
            hits.sort_unstable_by(|(_, a), (_, b)| {
                a.compare_by(b, &page.sort).then(a.id.cmp(&b.id))
            });
        }

        // --- Step 3: Paginate ---
        let result = Page::paginate(hits.into_iter().map(|(_, author)| author).collect(), page);
        debug!(
            query = %query,
            total_hits = result.total_elements,
            returned_hits = result.content.len(),
            "In-memory search finished."
        );
        Ok(result)
    }
}

/// Collects analysed tokens for every scalar in `value` under its dotted path.
fn flatten_into(fields: &mut AnalyzedFields, path: &str, value: &Value) {
    match value {
        Value::Null => {}
        Value::Bool(b) => push_tokens(fields, path, &b.to_string()),
        Value::Number(n) => push_tokens(fields, path, &n.to_string()),
        Value::String(s) => push_tokens(fields, path, s),
        Value::Array(items) => {
            for item in items {
                flatten_into(fields, path, item);
            }
        }
        Value::Object(map) => {
            for (key, child) in map {
                let child_path = if path.is_empty() {
                    key.clone()
                } else {
                    format!("{}.{}", path, key)
                };
                flatten_into(fields, &child_path, child);
            }
        }
    }
}

fn push_tokens(fields: &mut AnalyzedFields, path: &str, text: &str) {
    fields
        .entry(path.to_string())
        .or_default()
        .extend(analyze(text));
}
