use application::{ApplicationError, AuthorRepository};
use async_trait::async_trait;
use dashmap::DashMap;
use domain::{Author, AuthorId, Page, PageRequest};
use std::sync::Arc;
use std::sync::atomic::{AtomicI64, Ordering};
use tracing::{debug, error, instrument};

// Sequence value meaning "no id left to hand out".
const SEQUENCE_EXHAUSTED: i64 = i64::MIN;

/// Entity store for authors held in a concurrent map.
///
/// Ids come from a monotonic sequence starting at 1. Saving an author with an id
/// upserts under that id and moves the sequence past it, so generated ids never
/// collide with explicitly supplied ones. Once `i64::MAX` has been handed out or
/// saved explicitly the sequence is exhausted and inserts without id fail.
#[derive(Debug, Clone)]
pub struct InMemoryAuthorRepository {
    // Author ID -> Author
    store: Arc<DashMap<AuthorId, Arc<Author>>>,
    // Next id to hand out
    sequence: Arc<AtomicI64>,
}

impl Default for InMemoryAuthorRepository {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryAuthorRepository {
    pub fn new() -> Self {
        Self {
            store: Arc::new(DashMap::new()),
            sequence: Arc::new(AtomicI64::new(1)),
        }
    }

    pub fn len(&self) -> usize {
        self.store.len()
    }

    pub fn is_empty(&self) -> bool {
        self.store.is_empty()
    }

    /// Moves the sequence past an explicitly supplied id.
    fn reserve(&self, id: AuthorId) {
        // Err only means the sequence is already exhausted.
        let _ = self
            .sequence
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |next| {
                if next == SEQUENCE_EXHAUSTED {
                    return None;
                }
                Some(match id.value().checked_add(1) {
                    Some(after) => next.max(after),
                    None => SEQUENCE_EXHAUSTED,
                })
            });
    }

    /// Hands out the next id, or `None` once the sequence is exhausted.
    fn next_id(&self) -> Option<AuthorId> {
        self.sequence
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |next| {
                if next == SEQUENCE_EXHAUSTED {
                    None
                } else {
                    Some(next.checked_add(1).unwrap_or(SEQUENCE_EXHAUSTED))
                }
            })
            .ok()
            .map(AuthorId::new)
    }
}

#[async_trait]
impl AuthorRepository for InMemoryAuthorRepository {
    #[instrument(skip(self, author))]
    async fn save(&self, author: &Author) -> Result<Author, ApplicationError> {
        let id = match author.id {
            Some(id) => {
                self.reserve(id);
                id
            }
            None => self.next_id().ok_or_else(|| {
                error!("Author id sequence exhausted");
                ApplicationError::RepositoryError("author id sequence exhausted".to_string())
            })?,
        };
        debug!(author_id = %id, "Saving author to in-memory store");

        let saved = author.clone().with_id(id);
        self.store.insert(id, Arc::new(saved.clone()));
        Ok(saved)
    }

    #[instrument(skip(self, page), fields(page = page.page, size = page.size))]
    async fn find_all(&self, page: &PageRequest) -> Result<Page<Author>, ApplicationError> {
        debug!("Listing authors from in-memory store");
        let mut authors: Vec<Author> = self
            .store
            .iter()
            .map(|entry| (**entry.value()).clone())
            .collect();

        // Id order is the natural order and the final tie-breaker.
        authors.sort_unstable_by(|a, b| a.compare_by(b, &page.sort).then(a.id.cmp(&b.id)));

        Ok(Page::paginate(authors, page))
    }

    #[instrument(skip(self))]
    async fn find_one(&self, id: AuthorId) -> Result<Option<Author>, ApplicationError> {
        debug!(author_id = %id, "Getting author from in-memory store");
        Ok(self.store.get(&id).map(|author_ref| (**author_ref).clone()))
    }

    #[instrument(skip(self))]
    async fn delete(&self, id: AuthorId) -> Result<bool, ApplicationError> {
        debug!(author_id = %id, "Deleting author from in-memory store");
        Ok(self.store.remove(&id).is_some())
    }
}
