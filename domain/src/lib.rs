use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

// --- Domain Errors ---
#[derive(Error, Debug, PartialEq)]
pub enum DomainError {
    #[error("Unknown sort property '{0}'")]
    UnknownSortProperty(String),
    #[error("Sort expression '{0}' does not name a property")]
    EmptySortExpression(String),
}

// --- Author ID ---
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AuthorId(i64);

impl AuthorId {
    pub fn new(id: i64) -> Self {
        Self(id)
    }
    pub fn value(&self) -> i64 {
        self.0
    }
}

impl From<i64> for AuthorId {
    fn from(id: i64) -> Self {
        Self::new(id)
    }
}

impl fmt::Display for AuthorId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

// --- Author ---

/// The Author entity. A missing `id` means the author has not been persisted yet.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq, Default)]
pub struct Author {
    #[serde(default)]
    pub id: Option<AuthorId>,
    #[serde(default)]
    pub name: Option<String>,
}

impl Author {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            id: None,
            name: Some(name.into()),
        }
    }

    pub fn with_id(mut self, id: AuthorId) -> Self {
        self.id = Some(id);
        self
    }

    /// Orders two authors by the given sort criteria, falling through to the next
    /// criterion on ties. Missing values sort before present ones.
    pub fn compare_by(&self, other: &Author, sort: &[SortBy]) -> Ordering {
        for sort_by in sort {
            let comparison = match sort_by.field {
                AuthorField::Id => self.id.cmp(&other.id),
                AuthorField::Name => self.name.cmp(&other.name),
            };
            let result = match sort_by.order {
                SortOrder::Asc => comparison,
                SortOrder::Desc => comparison.reverse(),
            };
            if result != Ordering::Equal {
                return result;
            }
        }
        Ordering::Equal
    }
}

// --- Sorting ---

/// Sortable properties of an Author.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthorField {
    Id,
    Name,
}

impl FromStr for AuthorField {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "id" => Ok(AuthorField::Id),
            "name" => Ok(AuthorField::Name),
            other => Err(DomainError::UnknownSortProperty(other.to_string())),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SortOrder {
    #[default]
    Asc,
    Desc,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SortBy {
    pub field: AuthorField,
    pub order: SortOrder,
}

impl SortBy {
    pub fn asc(field: AuthorField) -> Self {
        Self {
            field,
            order: SortOrder::Asc,
        }
    }

    pub fn desc(field: AuthorField) -> Self {
        Self {
            field,
            order: SortOrder::Desc,
        }
    }

    /// Parses one `sort` expression of the form `prop[,prop...][,asc|desc]`.
    /// The trailing direction, when present, applies to every listed property.
    pub fn parse_expression(expression: &str) -> Result<Vec<SortBy>, DomainError> {
        let mut parts: Vec<&str> = expression
            .split(',')
            .map(str::trim)
            .filter(|part| !part.is_empty())
            .collect();

        let order = match parts.last().map(|last| last.to_ascii_lowercase()) {
            Some(direction) if direction == "asc" => {
                parts.pop();
                SortOrder::Asc
            }
            Some(direction) if direction == "desc" => {
                parts.pop();
                SortOrder::Desc
            }
            _ => SortOrder::Asc,
        };

        if parts.is_empty() {
            return Err(DomainError::EmptySortExpression(expression.to_string()));
        }

        parts
            .into_iter()
            .map(|property| {
                Ok(SortBy {
                    field: property.parse()?,
                    order,
                })
            })
            .collect()
    }
}

// --- Pagination ---

/// A request for one zero-based page of a result set.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageRequest {
    pub page: usize,
    pub size: usize,
    pub sort: Vec<SortBy>,
}

impl PageRequest {
    /// `size` is clamped to at least 1.
    pub fn new(page: usize, size: usize) -> Self {
        Self {
            page,
            size: size.max(1),
            sort: Vec::new(),
        }
    }

    pub fn with_sort(mut self, sort: Vec<SortBy>) -> Self {
        self.sort = sort;
        self
    }

    pub fn offset(&self) -> usize {
        self.page.saturating_mul(self.size)
    }
}

/// A bounded slice of a result set plus the metadata needed to navigate it.
#[derive(Debug, Clone, PartialEq)]
pub struct Page<T> {
    pub content: Vec<T>,
    /// Zero-based page number.
    pub number: usize,
    pub size: usize,
    pub total_elements: usize,
}

impl<T> Page<T> {
    /// Slices an already ordered result set according to `request`.
    pub fn paginate(items: Vec<T>, request: &PageRequest) -> Self {
        let total_elements = items.len();
        let content = items
            .into_iter()
            .skip(request.offset())
            .take(request.size)
            .collect();
        Self {
            content,
            number: request.page,
            size: request.size,
            total_elements,
        }
    }

    pub fn total_pages(&self) -> usize {
        if self.size == 0 {
            0
        } else {
            self.total_elements.div_ceil(self.size)
        }
    }

    pub fn has_next(&self) -> bool {
        self.number.saturating_add(1) < self.total_pages()
    }

    pub fn has_previous(&self) -> bool {
        self.number > 0
    }
}
