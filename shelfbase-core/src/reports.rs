// shelfbase-core/src/reports.rs
//! Read-only reports derived from the catalog through aggregation pipelines

use crate::catalog::CatalogService;
use crate::error::{Result, ShelfError};
use crate::store::DocumentStore;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GenreAverage {
    pub genre: Option<String>,
    pub average_price: f64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthorCount {
    pub author: String,
    pub count: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DecadeCount {
    pub decade: i64,
    pub label: String,
    pub count: u64,
}

fn run<S, T>(catalog: &CatalogService<S>, pipeline: Value) -> Result<Vec<T>>
where
    S: DocumentStore + ?Sized,
    T: DeserializeOwned,
{
    catalog
        .aggregate(&pipeline)?
        .into_iter()
        .map(|row| serde_json::from_value(row).map_err(ShelfError::from))
        .collect()
}

/// Average price per genre rounded to two decimals, ordered by genre.
/// Records without a genre form their own group, listed first.
pub fn average_price_by_genre<S: DocumentStore + ?Sized>(
    catalog: &CatalogService<S>,
) -> Result<Vec<GenreAverage>> {
    run(
        catalog,
        json!([
            { "$group": { "_id": "$genre", "avg": { "$avg": "$price" } } },
            { "$sort": { "_id": 1 } },
            { "$project": {
                "_id": 0,
                "genre": "$_id",
                "average_price": { "$round": ["$avg", 2] }
            } }
        ]),
    )
}

/// The author with the most books; ties go to the alphabetically first name
pub fn author_with_most_books<S: DocumentStore + ?Sized>(
    catalog: &CatalogService<S>,
) -> Result<Option<AuthorCount>> {
    let mut rows: Vec<AuthorCount> = run(
        catalog,
        json!([
            { "$match": { "author": { "$exists": true } } },
            { "$group": { "_id": "$author", "count": { "$sum": 1 } } },
            { "$sort": { "count": -1, "_id": 1 } },
            { "$limit": 1 },
            { "$project": { "_id": 0, "author": "$_id", "count": 1 } }
        ]),
    )?;
    Ok(rows.pop())
}

/// Book count per decade (`1949` falls in `"1940s"`), ascending by decade
pub fn count_by_decade<S: DocumentStore + ?Sized>(
    catalog: &CatalogService<S>,
) -> Result<Vec<DecadeCount>> {
    run(
        catalog,
        json!([
            { "$match": { "published_year": { "$exists": true } } },
            { "$group": {
                "_id": { "$multiply": [{ "$floor": { "$divide": ["$published_year", 10] } }, 10] },
                "count": { "$sum": 1 }
            } },
            { "$sort": { "_id": 1 } },
            { "$project": {
                "_id": 0,
                "decade": "$_id",
                "label": { "$concat": [{ "$toString": "$_id" }, "s"] },
                "count": 1
            } }
        ]),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::book::{seed_books, Book};
    use crate::store::MemoryStore;
    use std::sync::Arc;

    fn seeded() -> CatalogService<MemoryStore> {
        let catalog = CatalogService::new(Arc::new(MemoryStore::new()), "books");
        catalog.insert_many(&seed_books()).unwrap();
        catalog
    }

    #[test]
    fn test_decade_histogram() {
        let decades = count_by_decade(&seeded()).unwrap();
        let got: Vec<(&str, u64)> = decades.iter().map(|d| (d.label.as_str(), d.count)).collect();
        assert_eq!(
            got,
            vec![
                ("1810s", 1),
                ("1850s", 1),
                ("1920s", 1),
                ("1930s", 1),
                ("1940s", 1),
                ("1950s", 2),
                ("1960s", 1),
                ("1980s", 1),
                ("1990s", 1),
            ]
        );
        assert_eq!(decades[0].decade, 1810);
        assert_eq!(decades.iter().map(|d| d.count).sum::<u64>(), 10);
    }

    #[test]
    fn test_fiction_average() {
        let averages = average_price_by_genre(&seeded()).unwrap();
        let fiction = averages
            .iter()
            .find(|a| a.genre.as_deref() == Some("Fiction"))
            .unwrap();
        assert_eq!(fiction.average_price, 11.16);

        let genres: Vec<_> = averages.iter().map(|a| a.genre.clone().unwrap()).collect();
        let mut sorted = genres.clone();
        sorted.sort();
        assert_eq!(genres, sorted);
    }

    #[test]
    fn test_missing_genre_forms_first_group() {
        let catalog = seeded();
        catalog
            .store()
            .insert_many("books", vec![json!({"title": "Untagged", "author": "Anon", "price": 4.0})])
            .unwrap();
        let averages = average_price_by_genre(&catalog).unwrap();
        assert_eq!(
            averages[0],
            GenreAverage {
                genre: None,
                average_price: 4.0
            }
        );
    }

    #[test]
    fn test_top_author() {
        let top = author_with_most_books(&seeded()).unwrap().unwrap();
        assert_eq!(
            top,
            AuthorCount {
                author: "J.R.R. Tolkien".to_string(),
                count: 2
            }
        );
    }

    #[test]
    fn test_top_author_tie_breaks_by_name() {
        let catalog = CatalogService::new(Arc::new(MemoryStore::new()), "books");
        let mut books: Vec<Book> = seed_books().into_iter().take(2).collect();
        books.reverse();
        catalog.insert_many(&books).unwrap();

        let top = author_with_most_books(&catalog).unwrap().unwrap();
        assert_eq!(top.author, "George Orwell");
        assert_eq!(top.count, 1);
    }

    #[test]
    fn test_reports_on_empty_catalog() {
        let catalog = CatalogService::new(Arc::new(MemoryStore::new()), "books");
        assert!(author_with_most_books(&catalog).unwrap().is_none());
        assert!(count_by_decade(&catalog).unwrap().is_empty());
        assert!(average_price_by_genre(&catalog).unwrap().is_empty());
    }
}
