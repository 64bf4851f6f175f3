//! Filters, sort orders and pagination options.

use scopedb_codec::{Document, Value};
use std::cmp::Ordering;

/// A predicate over document fields.
///
/// Field names may be dotted paths. Comparisons use [`Value`]'s total
/// order, and a missing field compares as null.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum Filter {
    /// Matches every document.
    #[default]
    All,
    /// Field equals value.
    Eq(String, Value),
    /// Field differs from value.
    Ne(String, Value),
    /// Field sorts after value.
    Gt(String, Value),
    /// Field sorts after or equal to value.
    Gte(String, Value),
    /// Field sorts before value.
    Lt(String, Value),
    /// Field sorts before or equal to value.
    Lte(String, Value),
    /// Field equals one of the values.
    In(String, Vec<Value>),
    /// Field is an array containing the value.
    Contains(String, Value),
    /// Field is present.
    Exists(String),
    /// Every sub-filter matches.
    And(Vec<Filter>),
    /// At least one sub-filter matches.
    Or(Vec<Filter>),
    /// The sub-filter does not match.
    Not(Box<Filter>),
}

impl Filter {
    /// Matches everything.
    #[must_use]
    pub fn all() -> Self {
        Self::All
    }

    /// `field == value`.
    pub fn eq(field: impl Into<String>, value: impl Into<Value>) -> Self {
        Self::Eq(field.into(), value.into())
    }

    /// `field != value`.
    pub fn ne(field: impl Into<String>, value: impl Into<Value>) -> Self {
        Self::Ne(field.into(), value.into())
    }

    /// `field > value`.
    pub fn gt(field: impl Into<String>, value: impl Into<Value>) -> Self {
        Self::Gt(field.into(), value.into())
    }

    /// `field >= value`.
    pub fn gte(field: impl Into<String>, value: impl Into<Value>) -> Self {
        Self::Gte(field.into(), value.into())
    }

    /// `field < value`.
    pub fn lt(field: impl Into<String>, value: impl Into<Value>) -> Self {
        Self::Lt(field.into(), value.into())
    }

    /// `field <= value`.
    pub fn lte(field: impl Into<String>, value: impl Into<Value>) -> Self {
        Self::Lte(field.into(), value.into())
    }

    /// `field` is one of `values`.
    pub fn is_in<I, V>(field: impl Into<String>, values: I) -> Self
    where
        I: IntoIterator<Item = V>,
        V: Into<Value>,
    {
        Self::In(field.into(), values.into_iter().map(Into::into).collect())
    }

    /// Array `field` contains `value`.
    pub fn contains(field: impl Into<String>, value: impl Into<Value>) -> Self {
        Self::Contains(field.into(), value.into())
    }

    /// `field` is present.
    pub fn exists(field: impl Into<String>) -> Self {
        Self::Exists(field.into())
    }

    /// Conjunction, flattening nested `And` and dropping `All`.
    #[must_use]
    pub fn and(self, other: Filter) -> Self {
        let mut parts = Vec::new();
        for filter in [self, other] {
            match filter {
                Self::All => {}
                Self::And(inner) => parts.extend(inner),
                other => parts.push(other),
            }
        }
        match parts.len() {
            0 => Self::All,
            1 => parts.pop().unwrap_or_default(),
            _ => Self::And(parts),
        }
    }

    /// Disjunction, flattening nested `Or`. `All` absorbs the other side.
    #[must_use]
    pub fn or(self, other: Filter) -> Self {
        if matches!(self, Self::All) || matches!(other, Self::All) {
            return Self::All;
        }
        let mut parts = Vec::new();
        for filter in [self, other] {
            match filter {
                Self::Or(inner) => parts.extend(inner),
                other => parts.push(other),
            }
        }
        Self::Or(parts)
    }

    /// Negation.
    #[must_use]
    pub fn negate(self) -> Self {
        match self {
            Self::Not(inner) => *inner,
            other => Self::Not(Box::new(other)),
        }
    }

    /// Evaluates the filter against a document.
    pub fn matches(&self, doc: &Document) -> bool {
        match self {
            Self::All => true,
            Self::Eq(field, value) => field_value(doc, field) == value,
            Self::Ne(field, value) => field_value(doc, field) != value,
            Self::Gt(field, value) => field_value(doc, field) > value,
            Self::Gte(field, value) => field_value(doc, field) >= value,
            Self::Lt(field, value) => field_value(doc, field) < value,
            Self::Lte(field, value) => field_value(doc, field) <= value,
            Self::In(field, values) => values.contains(field_value(doc, field)),
            Self::Contains(field, value) => doc
                .get(field)
                .and_then(Value::as_array)
                .is_some_and(|items| items.contains(value)),
            Self::Exists(field) => doc.contains(field),
            Self::And(filters) => filters.iter().all(|f| f.matches(doc)),
            Self::Or(filters) => filters.iter().any(|f| f.matches(doc)),
            Self::Not(inner) => !inner.matches(doc),
        }
    }
}

static NULL: Value = Value::Null;

fn field_value<'a>(doc: &'a Document, field: &str) -> &'a Value {
    doc.get(field).unwrap_or(&NULL)
}

/// Direction of a sort key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SortDirection {
    /// Smallest first.
    #[default]
    Ascending,
    /// Largest first.
    Descending,
}

/// One sort key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SortOrder {
    /// Field path.
    pub field: String,
    /// Direction.
    pub direction: SortDirection,
}

impl SortOrder {
    /// Ascending on `field`.
    pub fn asc(field: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            direction: SortDirection::Ascending,
        }
    }

    /// Descending on `field`.
    pub fn desc(field: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            direction: SortDirection::Descending,
        }
    }

    /// Orders two documents by this key alone.
    pub fn compare(&self, a: &Document, b: &Document) -> Ordering {
        let ord = field_value(a, &self.field).cmp(field_value(b, &self.field));
        match self.direction {
            SortDirection::Ascending => ord,
            SortDirection::Descending => ord.reverse(),
        }
    }
}

/// Orders two documents by a list of keys, first difference wins.
pub fn compare_documents(sort: &[SortOrder], a: &Document, b: &Document) -> Ordering {
    sort.iter()
        .map(|order| order.compare(a, b))
        .find(|ord| ord.is_ne())
        .unwrap_or(Ordering::Equal)
}

/// Options for paginated reads.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FindOptions {
    /// Page size; the repository default applies when unset.
    pub page_size: Option<usize>,
    /// 1-based page number. Ignored when `continue_from` is set.
    pub page_number: Option<usize>,
    /// Id (either text form) of the last item already seen.
    pub continue_from: Option<String>,
    /// Sort keys. An `_id` tie-breaker is always appended.
    pub sort: Vec<SortOrder>,
}

impl FindOptions {
    /// Default options: first page, sorted by id.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the page size.
    #[must_use]
    pub fn page_size(mut self, size: usize) -> Self {
        self.page_size = Some(size);
        self
    }

    /// Sets the 1-based page number.
    #[must_use]
    pub fn page(mut self, number: usize) -> Self {
        self.page_number = Some(number);
        self
    }

    /// Resumes after the item with this id.
    #[must_use]
    pub fn continue_from(mut self, token: impl Into<String>) -> Self {
        self.continue_from = Some(token.into());
        self
    }

    /// Adds a sort key.
    #[must_use]
    pub fn sort_by(mut self, order: SortOrder) -> Self {
        self.sort.push(order);
        self
    }
}

/// One page of results.
#[derive(Debug, Clone)]
pub struct Page<T> {
    /// Items on this page.
    pub items: Vec<T>,
    /// Token for the next page: the last item's hex id, set only when the
    /// page came back full.
    pub continuation: Option<String>,
}

impl<T> Page<T> {
    /// Number of items.
    pub fn len(&self) -> usize {
        self.items.len()
    }

    /// Returns true if the page has no items.
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Returns true if another page may follow.
    pub fn has_more(&self) -> bool {
        self.continuation.is_some()
    }
}

impl<T> IntoIterator for Page<T> {
    type Item = T;
    type IntoIter = std::vec::IntoIter<T>;

    fn into_iter(self) -> Self::IntoIter {
        self.items.into_iter()
    }
}
