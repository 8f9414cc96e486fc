use serde_json::Value;

use super::Document;

/// A single equality predicate on a top-level document field.
#[derive(Debug, Clone, PartialEq)]
pub struct FieldFilter {
    pub field: String,
    pub value: Value,
}

/// A filtered, key-ordered, limited query against one collection.
///
/// This is the only query shape the feed screens need, so every backend
/// implements exactly these semantics:
///
/// - all `filters` must match (logical AND). Equality is typed: the field
///   must hold a value of the same JSON type, so `true` never matches `1` and
///   `10.0` never matches `10`. Firestore is the one exception: it compares
///   integers and doubles numerically;
/// - `order_by_key` sorts by document key, ascending; without it the
///   backend's natural order is used;
/// - `start_after` keeps only keys strictly after the cursor (requires
///   `order_by_key`);
/// - `limit` caps the number of returned documents.
#[derive(Debug, Clone, PartialEq)]
pub struct Query {
    pub collection: String,
    pub filters: Vec<FieldFilter>,
    pub order_by_key: bool,
    pub start_after: Option<String>,
    pub limit: Option<usize>,
}

impl Query {
    /// Start a query over every document of `collection`.
    pub fn collection(collection: impl Into<String>) -> Self {
        Self {
            collection: collection.into(),
            filters: Vec::new(),
            order_by_key: false,
            start_after: None,
            limit: None,
        }
    }

    pub fn filter_eq(mut self, field: impl Into<String>, value: impl Into<Value>) -> Self {
        self.filters.push(FieldFilter {
            field: field.into(),
            value: value.into(),
        });
        self
    }

    pub fn order_by_key(mut self) -> Self {
        self.order_by_key = true;
        self
    }

    pub fn start_after(mut self, key: impl Into<String>) -> Self {
        self.start_after = Some(key.into());
        self
    }

    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    /// Whether `doc` passes every field filter.
    ///
    /// `null` and absent fields never match.
    pub fn matches(&self, doc: &Document) -> bool {
        self.filters
            .iter()
            .all(|filter| doc.get(&filter.field) == Some(&filter.value))
    }

    /// Whether `key` lies strictly after the cursor.
    pub fn is_after_cursor(&self, key: &str) -> bool {
        match &self.start_after {
            Some(cursor) => key > cursor.as_str(),
            None => true,
        }
    }

    /// Evaluate the query over documents held in natural (insertion) order.
    ///
    /// Used by the in-memory backend; the SQLite and Firestore backends push
    /// the same semantics down to their engines.
    pub fn evaluate<'a, I>(&self, docs: I) -> Vec<Document>
    where
        I: IntoIterator<Item = &'a Document>,
    {
        let mut selected: Vec<&Document> = docs
            .into_iter()
            .filter(|doc| self.matches(doc))
            .collect();

        if self.order_by_key {
            selected.sort_by(|a, b| a.id.cmp(&b.id));
        }

        selected
            .into_iter()
            .filter(|doc| self.is_after_cursor(&doc.id))
            .take(self.limit.unwrap_or(usize::MAX))
            .cloned()
            .collect()
    }
}
