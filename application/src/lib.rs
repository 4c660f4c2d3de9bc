use async_trait::async_trait;
use domain::{Author, AuthorId, DomainError, Page, PageRequest};
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, error, info, instrument, warn};

pub mod reconcile;

pub use reconcile::{
    IndexOperation, IndexOutbox, IndexSynchronizer, PendingIndexOperation, ReconcileReport,
    RetryPolicy,
};

/// Name used for the Author resource in alerts and error payloads.
pub const ENTITY_NAME: &str = "author";

// --- Application Errors ---
#[derive(Error, Debug)]
pub enum ApplicationError {
    /// A client error that carries an alert for the UI (entity name + error key).
    #[error("{message}")]
    BadRequestAlert {
        message: String,
        entity: &'static str,
        error_key: &'static str,
    },
    #[error("Invalid input: {0}")]
    InvalidInput(String),
    #[error("Domain validation error: {0}")]
    DomainError(#[from] DomainError), // Propagate domain errors cleanly
    #[error("Entity store operation failed: {0}")]
    RepositoryError(String),
    #[error("Search index operation failed: {0}")]
    IndexError(String),
    #[error("Search failed: {source}")]
    SearchError {
        source: Box<dyn std::error::Error + Send + Sync>,
    },
}

impl ApplicationError {
    pub fn id_exists() -> Self {
        ApplicationError::BadRequestAlert {
            message: format!("A new {} cannot already have an ID", ENTITY_NAME),
            entity: ENTITY_NAME,
            error_key: "idexists",
        }
    }
}

// --- Infrastructure Interfaces (Traits) ---

/// Interface for the canonical Author store.
#[async_trait]
pub trait AuthorRepository: Send + Sync {
    /// Inserts an author without id (assigning one) or upserts by id.
    /// The returned author always carries an id.
    async fn save(&self, author: &Author) -> Result<Author, ApplicationError>;
    /// Returns one page of authors ordered by the request's sort.
    async fn find_all(&self, page: &PageRequest) -> Result<Page<Author>, ApplicationError>;
    async fn find_one(&self, id: AuthorId) -> Result<Option<Author>, ApplicationError>;
    /// Deletes an author by id. Returns true if a record was removed.
    async fn delete(&self, id: AuthorId) -> Result<bool, ApplicationError>;
}

/// Interface for the secondary full-text index over authors.
#[async_trait]
pub trait AuthorSearchRepository: Send + Sync {
    /// Adds or replaces the indexed representation of an author.
    async fn save(&self, author: &Author) -> Result<(), ApplicationError>;
    /// Removes an author from the index. Removing an unknown id is not an error.
    async fn delete(&self, id: AuthorId) -> Result<(), ApplicationError>;
    /// Runs a query-string expression and returns one page of matches.
    async fn search(
        &self,
        query: &str,
        page: &PageRequest,
    ) -> Result<Page<Author>, ApplicationError>;
}

// --- Application Services (Use Cases) ---

/// Result of an update, which falls back to creation for authors without id.
#[derive(Debug, Clone, PartialEq)]
pub enum SaveOutcome {
    Created(Author),
    Updated(Author),
}

/// Service for managing authors across the entity store and the search index.
pub struct AuthorService {
    author_repo: Arc<dyn AuthorRepository>,
    search_repo: Arc<dyn AuthorSearchRepository>,
    index_sync: Arc<IndexSynchronizer>,
}

impl AuthorService {
    pub fn new(
        author_repo: Arc<dyn AuthorRepository>,
        search_repo: Arc<dyn AuthorSearchRepository>,
        index_sync: Arc<IndexSynchronizer>,
    ) -> Self {
        Self {
            author_repo,
            search_repo,
            index_sync,
        }
    }

    #[instrument(skip(self, author))]
    pub async fn create(&self, author: Author) -> Result<Author, ApplicationError> {
        if let Some(id) = author.id {
            warn!(author_id = %id, "Create rejected: author already has an id");
            return Err(ApplicationError::id_exists());
        }

        let saved = self.author_repo.save(&author).await.map_err(|e| {
            error!("Failed to save author to entity store: {}", e);
            e
        })?;
        let id = persisted_id(&saved)?;
        info!(author_id = %id, "Author created in entity store");

        self.index_sync
            .apply(id, IndexOperation::Upsert(saved.clone()))
            .await;
        Ok(saved)
    }

    /// Updates an author by id. An author without id is created instead.
    #[instrument(skip(self, author))]
    pub async fn update(&self, author: Author) -> Result<SaveOutcome, ApplicationError> {
        if author.id.is_none() {
            debug!("Update received an author without id, creating it instead");
            return self.create(author).await.map(SaveOutcome::Created);
        }

        let saved = self.author_repo.save(&author).await.map_err(|e| {
            error!("Failed to update author in entity store: {}", e);
            e
        })?;
        let id = persisted_id(&saved)?;
        info!(author_id = %id, "Author updated in entity store");

        self.index_sync
            .apply(id, IndexOperation::Upsert(saved.clone()))
            .await;
        Ok(SaveOutcome::Updated(saved))
    }

    #[instrument(skip(self, page), fields(page = page.page, size = page.size))]
    pub async fn find_all(&self, page: &PageRequest) -> Result<Page<Author>, ApplicationError> {
        let result = self.author_repo.find_all(page).await?;
        debug!(
            total = result.total_elements,
            returned = result.content.len(),
            "Fetched page of authors"
        );
        Ok(result)
    }

    #[instrument(skip(self))]
    pub async fn find_one(&self, id: AuthorId) -> Result<Option<Author>, ApplicationError> {
        let author = self.author_repo.find_one(id).await?;
        if author.is_none() {
            debug!(author_id = %id, "Author not found");
        }
        Ok(author)
    }

    #[instrument(skip(self))]
    pub async fn delete(&self, id: AuthorId) -> Result<(), ApplicationError> {
        let deleted = self.author_repo.delete(id).await.map_err(|e| {
            error!(author_id = %id, "Failed to delete author from entity store: {}", e);
            e
        })?;
        if deleted {
            info!(author_id = %id, "Author deleted from entity store");
        } else {
            info!(author_id = %id, "Author not present in entity store (already deleted or never existed)");
        }

        self.index_sync.apply(id, IndexOperation::Delete(id)).await;
        Ok(())
    }

    #[instrument(skip(self, page), fields(page = page.page, size = page.size))]
    pub async fn search(
        &self,
        query: &str,
        page: &PageRequest,
    ) -> Result<Page<Author>, ApplicationError> {
        if query.trim().is_empty() {
            return Err(ApplicationError::InvalidInput(
                "Search query cannot be empty".to_string(),
            ));
        }

        match self.search_repo.search(query, page).await {
            Ok(result) => {
                info!(
                    total_hits = result.total_elements,
                    returned_hits = result.content.len(),
                    "Search successful"
                );
                Ok(result)
            }
            Err(e @ ApplicationError::InvalidInput(_)) => {
                warn!("Search rejected: {}", e);
                Err(e)
            }
            Err(e) => {
                error!("Search failed: {}", e);
                Err(ApplicationError::SearchError {
                    source: Box::new(e),
                })
            }
        }
    }
}

fn persisted_id(author: &Author) -> Result<AuthorId, ApplicationError> {
    author.id.ok_or_else(|| {
        ApplicationError::RepositoryError("entity store returned an author without id".to_string())
    })
}
