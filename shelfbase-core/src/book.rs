// shelfbase-core/src/book.rs
//! Book records and their field names

use crate::error::{Result, ShelfError};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::str::FromStr;

/// One row in the catalog
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Book {
    pub title: String,
    pub author: String,
    pub genre: String,
    pub published_year: i32,
    pub price: f64,
    pub in_stock: bool,
    pub pages: u32,
    pub publisher: String,
}

impl Book {
    /// Check the record constraints that the store does not enforce
    pub fn validate(&self) -> Result<()> {
        if self.title.trim().is_empty() {
            return Err(ShelfError::InvalidArgument("title must not be empty".to_string()));
        }
        if self.author.trim().is_empty() {
            return Err(ShelfError::InvalidArgument(format!(
                "author of '{}' must not be empty",
                self.title
            )));
        }
        validate_price(self.price)
    }

    pub fn to_document(&self) -> Result<Value> {
        Ok(serde_json::to_value(self)?)
    }
}

pub(crate) fn validate_price(price: f64) -> Result<()> {
    if !price.is_finite() || price < 0.0 {
        return Err(ShelfError::InvalidArgument(format!(
            "price must be a finite value >= 0, got {}",
            price
        )));
    }
    Ok(())
}

/// A book with only some fields present, as returned by projected queries
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PartialBook {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub author: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub genre: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub published_year: Option<i32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub price: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub in_stock: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pages: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub publisher: Option<String>,
}

impl From<Book> for PartialBook {
    fn from(book: Book) -> Self {
        PartialBook {
            title: Some(book.title),
            author: Some(book.author),
            genre: Some(book.genre),
            published_year: Some(book.published_year),
            price: Some(book.price),
            in_stock: Some(book.in_stock),
            pages: Some(book.pages),
            publisher: Some(book.publisher),
        }
    }
}

/// Named book attribute, used for projections, sorting and indexes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BookField {
    Title,
    Author,
    Genre,
    PublishedYear,
    Price,
    InStock,
    Pages,
    Publisher,
}

impl BookField {
    pub const ALL: [BookField; 8] = [
        BookField::Title,
        BookField::Author,
        BookField::Genre,
        BookField::PublishedYear,
        BookField::Price,
        BookField::InStock,
        BookField::Pages,
        BookField::Publisher,
    ];

    /// Document key of this field
    pub fn as_str(self) -> &'static str {
        match self {
            BookField::Title => "title",
            BookField::Author => "author",
            BookField::Genre => "genre",
            BookField::PublishedYear => "published_year",
            BookField::Price => "price",
            BookField::InStock => "in_stock",
            BookField::Pages => "pages",
            BookField::Publisher => "publisher",
        }
    }
}

impl fmt::Display for BookField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for BookField {
    type Err = ShelfError;

    fn from_str(s: &str) -> Result<Self> {
        let wanted = s.trim().to_lowercase().replace('-', "_");
        BookField::ALL
            .into_iter()
            .find(|f| f.as_str() == wanted || (wanted == "year" && *f == BookField::PublishedYear))
            .ok_or_else(|| ShelfError::InvalidArgument(format!("Unknown book field '{}'", s)))
    }
}

/// The ten reference records used by the demo and the test suite
pub fn seed_books() -> Vec<Book> {
    #[allow(clippy::too_many_arguments)]
    fn book(
        title: &str,
        author: &str,
        genre: &str,
        published_year: i32,
        price: f64,
        in_stock: bool,
        pages: u32,
        publisher: &str,
    ) -> Book {
        Book {
            title: title.to_string(),
            author: author.to_string(),
            genre: genre.to_string(),
            published_year,
            price,
            in_stock,
            pages,
            publisher: publisher.to_string(),
        }
    }

    vec![
        book("1984", "George Orwell", "Dystopian", 1949, 15.99, true, 328, "Secker & Warburg"),
        book("To Kill a Mockingbird", "Harper Lee", "Fiction", 1960, 12.99, true, 281, "J. B. Lippincott & Co."),
        book("The Great Gatsby", "F. Scott Fitzgerald", "Fiction", 1925, 9.99, false, 180, "Charles Scribner's Sons"),
        book("Pride and Prejudice", "Jane Austen", "Romance", 1813, 7.99, true, 432, "T. Egerton"),
        book("The Hobbit", "J.R.R. Tolkien", "Fantasy", 1937, 14.5, true, 310, "George Allen & Unwin"),
        book("The Lord of the Rings", "J.R.R. Tolkien", "Fantasy", 1954, 29.99, true, 1178, "George Allen & Unwin"),
        book("Fahrenheit 451", "Ray Bradbury", "Dystopian", 1953, 11.5, false, 194, "Ballantine Books"),
        book("Beloved", "Toni Morrison", "Fiction", 1987, 10.5, true, 324, "Alfred A. Knopf"),
        book("Moby-Dick", "Herman Melville", "Adventure", 1851, 13.25, false, 635, "Harper & Brothers"),
        book("Harry Potter and the Philosopher's Stone", "J.K. Rowling", "Fantasy", 1997, 8.99, true, 223, "Bloomsbury"),
    ]
}
