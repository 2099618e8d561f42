// shelfbase-core/src/catalog.rs
//! Catalog service: typed book operations over a [`DocumentStore`]
//!
//! Every operation translates one typed request into one store call (two for
//! the title-keyed writes, which count matches first) and returns a typed
//! result. Argument checks happen before the store is touched.

use crate::book::{validate_price, Book, BookField, PartialBook};
use crate::error::{Result, ShelfError};
use crate::find_options::FindOptions;
use crate::index::{IndexDirection, IndexSpec};
use crate::store::DocumentStore;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Page size used when the caller does not pick one
pub const DEFAULT_PAGE_SIZE: usize = 5;

/// Fields returned by the listing operations
pub const LISTING_FIELDS: [BookField; 3] = [BookField::Title, BookField::Author, BookField::Price];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortOrder {
    #[default]
    Ascending,
    Descending,
}

impl SortOrder {
    pub fn direction(self) -> i32 {
        match self {
            SortOrder::Ascending => 1,
            SortOrder::Descending => -1,
        }
    }
}

/// Number of books per genre; `None` collects records without a genre
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GenreCount {
    pub genre: Option<String>,
    pub count: u64,
}

/// Book operations bound to one collection of one store handle
pub struct CatalogService<S: DocumentStore + ?Sized> {
    store: Arc<S>,
    collection: String,
}

impl<S: DocumentStore + ?Sized> Clone for CatalogService<S> {
    fn clone(&self) -> Self {
        CatalogService {
            store: Arc::clone(&self.store),
            collection: self.collection.clone(),
        }
    }
}

fn decode_all<T: DeserializeOwned>(docs: Vec<Value>) -> Result<Vec<T>> {
    docs.into_iter()
        .map(|doc| serde_json::from_value(doc).map_err(ShelfError::from))
        .collect()
}

fn reject(err: ShelfError) -> ShelfError {
    warn!(error = %err, "rejected catalog request");
    err
}

impl<S: DocumentStore + ?Sized> CatalogService<S> {
    pub fn new(store: Arc<S>, collection: impl Into<String>) -> Self {
        CatalogService {
            store,
            collection: collection.into(),
        }
    }

    pub fn collection(&self) -> &str {
        &self.collection
    }

    pub fn store(&self) -> &Arc<S> {
        &self.store
    }

    // ========== WRITES ==========

    /// Insert all records or none; no deduplication
    pub fn insert_many(&self, books: &[Book]) -> Result<usize> {
        for book in books {
            book.validate().map_err(reject)?;
        }
        let docs = books
            .iter()
            .map(Book::to_document)
            .collect::<Result<Vec<_>>>()?;

        let ids = self.store.insert_many(&self.collection, docs)?;
        info!(collection = %self.collection, inserted = ids.len(), "inserted books");
        Ok(ids.len())
    }

    /// Set the price of the book with `title`; returns the modified count
    pub fn update_price(&self, title: &str, new_price: f64) -> Result<u64> {
        validate_price(new_price).map_err(reject)?;
        let filter = json!({ "title": title });
        if self.ensure_unambiguous(title, &filter)? == 0 {
            return Ok(0);
        }

        let result = self.store.update_one(
            &self.collection,
            &filter,
            &json!({ "$set": { "price": new_price } }),
        )?;
        debug!(title, new_price, modified = result.modified, "update_price");
        Ok(result.modified)
    }

    /// Delete the book with `title`; returns the deleted count
    pub fn delete_by_title(&self, title: &str) -> Result<u64> {
        let filter = json!({ "title": title });
        if self.ensure_unambiguous(title, &filter)? == 0 {
            return Ok(0);
        }

        let deleted = self.store.delete_one(&self.collection, &filter)?;
        debug!(title, deleted, "delete_by_title");
        Ok(deleted)
    }

    /// Titles are not unique in the store, so a title-keyed write refuses
    /// to pick one of several matches
    fn ensure_unambiguous(&self, title: &str, filter: &Value) -> Result<u64> {
        let matches = self.store.count(&self.collection, filter)?;
        if matches > 1 {
            return Err(reject(ShelfError::AmbiguousMatch {
                title: title.to_string(),
                matches,
            }));
        }
        Ok(matches)
    }

    /// Create a secondary index; creating an existing one is a no-op
    pub fn create_index(&self, fields: &[(BookField, IndexDirection)]) -> Result<String> {
        let spec = IndexSpec::new(
            fields
                .iter()
                .map(|(field, dir)| (field.as_str().to_string(), *dir))
                .collect(),
        )
        .map_err(|e| reject(ShelfError::InvalidArgument(e.to_string())))?;
        self.store.create_index(&self.collection, &spec)
    }

    // ========== QUERIES ==========

    fn find_books(&self, filter: Value) -> Result<Vec<Book>> {
        let docs = self.store.find(&self.collection, &filter, &FindOptions::new())?;
        decode_all(docs)
    }

    fn find_partial(&self, filter: Value, options: FindOptions) -> Result<Vec<PartialBook>> {
        let docs = self.store.find(&self.collection, &filter, &options)?;
        decode_all(docs)
    }

    pub fn find_by_genre(&self, genre: &str) -> Result<Vec<Book>> {
        self.find_books(json!({ "genre": genre }))
    }

    /// Books published strictly after `year`
    pub fn find_published_after(&self, year: i32) -> Result<Vec<Book>> {
        self.find_books(json!({ "published_year": { "$gt": year } }))
    }

    pub fn find_by_author(&self, author: &str) -> Result<Vec<Book>> {
        self.find_books(json!({ "author": author }))
    }

    pub fn find_by_title(&self, title: &str) -> Result<Option<Book>> {
        let mut books = self.find_books(json!({ "title": title }))?;
        match books.len() {
            0 | 1 => Ok(books.pop()),
            n => Err(ShelfError::AmbiguousMatch {
                title: title.to_string(),
                matches: n as u64,
            }),
        }
    }

    /// In-stock books published after `year`, optionally projected onto
    /// `fields` (the identifier is never returned)
    pub fn find_in_stock_after(
        &self,
        year: i32,
        fields: Option<&[BookField]>,
    ) -> Result<Vec<PartialBook>> {
        let filter = json!({ "in_stock": true, "published_year": { "$gt": year } });
        let projection = fields.unwrap_or(&BookField::ALL);
        let options = FindOptions::new().with_fields(projection.iter().map(|f| f.as_str()));
        self.find_partial(filter, options)
    }

    /// Every book ordered by `field`; ties keep insertion order
    pub fn list_sorted(&self, field: BookField, order: SortOrder) -> Result<Vec<PartialBook>> {
        let options = FindOptions::new()
            .with_sort(vec![(field.as_str().to_string(), order.direction())])
            .with_fields(LISTING_FIELDS.iter().map(|f| f.as_str()));
        self.find_partial(json!({}), options)
    }

    /// One page of the catalog in insertion order; `page_number` is 1-based
    pub fn list_page(&self, page_number: usize, page_size: usize) -> Result<Vec<PartialBook>> {
        if page_number < 1 {
            return Err(reject(ShelfError::InvalidArgument(format!(
                "page number must be >= 1, got {}",
                page_number
            ))));
        }
        if page_size == 0 {
            return Err(reject(ShelfError::InvalidArgument(
                "page size must be >= 1".to_string(),
            )));
        }

        let options = FindOptions::new()
            .with_skip((page_number - 1).saturating_mul(page_size))
            .with_limit(page_size)
            .with_fields(LISTING_FIELDS.iter().map(|f| f.as_str()));
        self.find_partial(json!({}), options)
    }

    pub fn count(&self) -> Result<u64> {
        self.store.count(&self.collection, &json!({}))
    }

    /// Books per genre, ordered by genre (missing genre first)
    pub fn count_by_genre(&self) -> Result<Vec<GenreCount>> {
        let rows = self.aggregate(&json!([
            { "$group": { "_id": "$genre", "count": { "$sum": 1 } } },
            { "$sort": { "_id": 1 } },
            { "$project": { "_id": 0, "genre": "$_id", "count": 1 } }
        ]))?;
        decode_all(rows)
    }

    /// Raw aggregation over the catalog collection
    pub fn aggregate(&self, pipeline: &Value) -> Result<Vec<Value>> {
        self.store.aggregate(&self.collection, pipeline)
    }

    /// The store's execution statistics for `filter`, unmodified
    pub fn explain_query(&self, filter: &Value) -> Result<Value> {
        self.store.explain(&self.collection, filter)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::book::seed_books;
    use crate::store::MemoryStore;

    fn catalog() -> CatalogService<MemoryStore> {
        let service = CatalogService::new(Arc::new(MemoryStore::new()), "books");
        service.insert_many(&seed_books()).unwrap();
        service
    }

    fn titles(books: &[Book]) -> Vec<&str> {
        books.iter().map(|b| b.title.as_str()).collect()
    }

    #[test]
    fn test_find_filters() {
        let catalog = catalog();
        assert_eq!(
            titles(&catalog.find_by_genre("Fiction").unwrap()),
            vec!["To Kill a Mockingbird", "The Great Gatsby", "Beloved"]
        );
        assert_eq!(
            titles(&catalog.find_by_author("J.R.R. Tolkien").unwrap()),
            vec!["The Hobbit", "The Lord of the Rings"]
        );
        assert_eq!(
            titles(&catalog.find_published_after(1960).unwrap()),
            vec!["Beloved", "Harry Potter and the Philosopher's Stone"]
        );
        assert!(catalog.find_by_genre("Poetry").unwrap().is_empty());
    }

    #[test]
    fn test_in_stock_after_with_projection() {
        let catalog = catalog();
        let fields = [BookField::Title, BookField::Author, BookField::Price];
        let books = catalog.find_in_stock_after(1950, Some(&fields[..])).unwrap();
        let got: Vec<_> = books.iter().map(|b| b.title.as_deref().unwrap()).collect();
        assert_eq!(
            got,
            vec![
                "To Kill a Mockingbird",
                "The Lord of the Rings",
                "Beloved",
                "Harry Potter and the Philosopher's Stone"
            ]
        );
        assert!(books.iter().all(|b| b.genre.is_none() && b.pages.is_none() && b.price.is_some()));

        let full = catalog.find_in_stock_after(1950, None).unwrap();
        assert_eq!(full.len(), 4);
        assert!(full.iter().all(|b| b.publisher.is_some()));
    }

    #[test]
    fn test_list_sorted_by_price() {
        let catalog = catalog();
        let asc = catalog.list_sorted(BookField::Price, SortOrder::Ascending).unwrap();
        assert_eq!(asc.first().unwrap().title.as_deref(), Some("Pride and Prejudice"));
        assert_eq!(asc.last().unwrap().title.as_deref(), Some("The Lord of the Rings"));
        assert!(asc.iter().all(|b| b.genre.is_none()));
    }

    #[test]
    fn test_list_page_bounds() {
        let catalog = catalog();
        assert_eq!(catalog.list_page(1, DEFAULT_PAGE_SIZE).unwrap().len(), 5);
        assert_eq!(catalog.list_page(2, DEFAULT_PAGE_SIZE).unwrap().len(), 5);
        assert!(catalog.list_page(3, DEFAULT_PAGE_SIZE).unwrap().is_empty());
        assert_eq!(catalog.list_page(4, 3).unwrap().len(), 1);

        assert!(matches!(catalog.list_page(0, 5), Err(ShelfError::InvalidArgument(_))));
        assert!(matches!(catalog.list_page(1, 0), Err(ShelfError::InvalidArgument(_))));
    }

    #[test]
    fn test_update_price() {
        let catalog = catalog();
        assert_eq!(catalog.update_price("Beloved", 11.75).unwrap(), 1);
        assert_eq!(catalog.find_by_title("Beloved").unwrap().unwrap().price, 11.75);

        assert_eq!(catalog.update_price("Unwritten", 5.0).unwrap(), 0);

        let err = catalog.update_price("Beloved", -1.0).unwrap_err();
        assert!(matches!(err, ShelfError::InvalidArgument(_)));
        assert_eq!(catalog.find_by_title("Beloved").unwrap().unwrap().price, 11.75);
    }

    #[test]
    fn test_duplicate_titles_are_ambiguous() {
        let catalog = catalog();
        let mut copy = seed_books().remove(1);
        copy.publisher = "Grand Central".to_string();
        catalog.insert_many(&[copy]).unwrap();

        let title = "To Kill a Mockingbird";
        assert!(matches!(
            catalog.update_price(title, 1.0),
            Err(ShelfError::AmbiguousMatch { matches: 2, .. })
        ));
        assert!(matches!(catalog.delete_by_title(title), Err(ShelfError::AmbiguousMatch { .. })));
        assert!(matches!(catalog.find_by_title(title), Err(ShelfError::AmbiguousMatch { .. })));
        assert_eq!(catalog.count().unwrap(), 11);
    }

    #[test]
    fn test_delete_by_title_twice() {
        let catalog = catalog();
        assert_eq!(catalog.delete_by_title("Moby-Dick").unwrap(), 1);
        assert_eq!(catalog.delete_by_title("Moby-Dick").unwrap(), 0);
        assert_eq!(catalog.count().unwrap(), 9);
    }

    #[test]
    fn test_insert_many_validates_before_store() {
        let catalog = catalog();
        let mut bad = seed_books();
        bad[3].author = String::new();
        assert!(matches!(catalog.insert_many(&bad), Err(ShelfError::InvalidArgument(_))));
        assert_eq!(catalog.count().unwrap(), 10);
    }

    #[test]
    fn test_count_by_genre() {
        let counts = catalog().count_by_genre().unwrap();
        let genres: Vec<_> = counts.iter().map(|c| c.genre.as_deref().unwrap()).collect();
        assert_eq!(genres, vec!["Adventure", "Dystopian", "Fantasy", "Fiction", "Romance"]);
        assert_eq!(counts.iter().map(|c| c.count).sum::<u64>(), 10);
    }

    #[test]
    fn test_create_index_validation() {
        let catalog = catalog();
        assert_eq!(
            catalog.create_index(&[(BookField::Title, IndexDirection::Ascending)]).unwrap(),
            "title_1"
        );
        assert!(matches!(catalog.create_index(&[]), Err(ShelfError::InvalidArgument(_))));
    }
}
