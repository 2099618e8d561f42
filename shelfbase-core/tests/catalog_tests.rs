// Catalog integration tests: service, reports and connection lifecycle together
use serde_json::json;
use shelfbase_core::reports::{author_with_most_books, average_price_by_genre, count_by_decade};
use shelfbase_core::{
    seed_books, with_connection, BookField, Connection, IndexDirection, ShelfError, SortOrder,
    StoreUri,
};
use tempfile::TempDir;

fn memory() -> StoreUri {
    StoreUri::Memory { label: None }
}

#[test]
fn test_count_by_genre_sums_to_inserted() {
    let conn = Connection::open(&memory()).unwrap();
    let catalog = conn.catalog("books");
    let inserted = catalog.insert_many(&seed_books()).unwrap();

    let total: u64 = catalog.count_by_genre().unwrap().iter().map(|g| g.count).sum();
    assert_eq!(total, inserted as u64);
}

#[test]
fn test_seeded_reports() {
    let conn = Connection::open(&memory()).unwrap();
    let catalog = conn.catalog("books");
    catalog.insert_many(&seed_books()).unwrap();

    let decades = count_by_decade(&catalog).unwrap();
    let fifties = decades.iter().find(|d| d.label == "1950s").unwrap();
    assert_eq!(fifties.count, 2);
    assert_eq!(decades.iter().map(|d| d.count).sum::<u64>(), 10);
    let labels: Vec<_> = decades.iter().map(|d| d.label.clone()).collect();
    let mut sorted = labels.clone();
    sorted.sort();
    assert_eq!(labels, sorted);

    let fiction = average_price_by_genre(&catalog)
        .unwrap()
        .into_iter()
        .find(|a| a.genre.as_deref() == Some("Fiction"))
        .unwrap();
    assert_eq!(fiction.average_price, 11.16);

    let top = author_with_most_books(&catalog).unwrap().unwrap();
    assert_eq!((top.author.as_str(), top.count), ("J.R.R. Tolkien", 2));
}

#[test]
fn test_update_then_lookup() {
    let conn = Connection::open(&memory()).unwrap();
    let catalog = conn.catalog("books");
    catalog.insert_many(&seed_books()).unwrap();

    assert_eq!(catalog.update_price("The Hobbit", 0.0).unwrap(), 1);
    assert_eq!(catalog.find_by_title("The Hobbit").unwrap().unwrap().price, 0.0);

    assert!(matches!(
        catalog.update_price("The Hobbit", -3.0),
        Err(ShelfError::InvalidArgument(_))
    ));
    assert_eq!(catalog.find_by_title("The Hobbit").unwrap().unwrap().price, 0.0);
}

#[test]
fn test_delete_removes_only_the_match() {
    let conn = Connection::open(&memory()).unwrap();
    let catalog = conn.catalog("books");
    catalog.insert_many(&seed_books()).unwrap();

    assert_eq!(catalog.delete_by_title("1984").unwrap(), 1);
    assert!(catalog.find_by_title("1984").unwrap().is_none());
    assert_eq!(catalog.count().unwrap(), 9);
    assert_eq!(catalog.delete_by_title("1984").unwrap(), 0);
    assert_eq!(catalog.count().unwrap(), 9);
}

#[test]
fn test_ambiguous_title_leaves_store_untouched() {
    let conn = Connection::open(&memory()).unwrap();
    let catalog = conn.catalog("books");
    let mut books = seed_books();
    books.push(books[0].clone());
    catalog.insert_many(&books).unwrap();

    let err = catalog.delete_by_title("1984").unwrap_err();
    assert!(matches!(err, ShelfError::AmbiguousMatch { matches: 2, .. }));
    assert!(err.to_string().contains("1984"));
    assert_eq!(catalog.count().unwrap(), 11);
}

#[test]
fn test_explain_before_and_after_index() {
    let conn = Connection::open(&memory()).unwrap();
    let catalog = conn.catalog("books");
    catalog.insert_many(&seed_books()).unwrap();
    let filter = json!({"genre": "Fiction"});

    let before = catalog.explain_query(&filter).unwrap();
    assert_eq!(before["queryPlanner"]["winningPlan"]["stage"], "COLLSCAN");
    assert_eq!(before["executionStats"]["totalDocsExamined"], 10);
    assert_eq!(before["executionStats"]["nReturned"], 3);

    let name = catalog
        .create_index(&[(BookField::Genre, IndexDirection::Ascending)])
        .unwrap();
    assert_eq!(name, "genre_1");
    assert_eq!(
        catalog
            .create_index(&[(BookField::Genre, IndexDirection::Ascending)])
            .unwrap(),
        name
    );

    let after = catalog.explain_query(&filter).unwrap();
    assert_eq!(after["queryPlanner"]["winningPlan"]["stage"], "FETCH");
    assert_eq!(
        after["queryPlanner"]["winningPlan"]["inputStage"]["indexName"],
        "genre_1"
    );
    assert_eq!(after["executionStats"]["totalDocsExamined"], 3);
    assert_eq!(after["executionStats"]["nReturned"], 3);
}

#[test]
fn test_compound_index_serves_range_query() {
    let conn = Connection::open(&memory()).unwrap();
    let catalog = conn.catalog("books");
    catalog.insert_many(&seed_books()).unwrap();

    let name = catalog
        .create_index(&[
            (BookField::PublishedYear, IndexDirection::Descending),
            (BookField::Price, IndexDirection::Ascending),
        ])
        .unwrap();
    assert_eq!(name, "published_year_-1_price_1");

    let filter = json!({"published_year": {"$gt": 1950}});
    let stats = catalog.explain_query(&filter).unwrap();
    assert_eq!(stats["executionStats"]["nReturned"], 5);
    assert_eq!(stats["executionStats"]["totalDocsExamined"], 5);

    let after: Vec<_> = catalog
        .find_published_after(1950)
        .unwrap()
        .into_iter()
        .map(|b| b.title)
        .collect();
    assert_eq!(after.len(), 5);
    assert_eq!(after[0], "To Kill a Mockingbird");
}

#[test]
fn test_operations_fail_after_close() {
    let conn = Connection::open(&memory()).unwrap();
    let catalog = conn.catalog("books");
    catalog.insert_many(&seed_books()).unwrap();
    conn.close().unwrap();

    assert!(matches!(catalog.count(), Err(ShelfError::StoreUnavailable(_))));
    assert!(catalog.insert_many(&seed_books()).unwrap_err().is_unavailable());
    assert!(catalog
        .list_sorted(BookField::Price, SortOrder::Ascending)
        .unwrap_err()
        .is_unavailable());
    assert!(count_by_decade(&catalog).unwrap_err().is_unavailable());
}

#[test]
fn test_invalid_page_rejected_even_when_closed() {
    let conn = Connection::open(&memory()).unwrap();
    let catalog = conn.catalog("books");
    conn.close().unwrap();
    assert!(matches!(catalog.list_page(0, 5), Err(ShelfError::InvalidArgument(_))));
    assert!(matches!(
        catalog.update_price("1984", -1.0),
        Err(ShelfError::InvalidArgument(_))
    ));
}

#[test]
fn test_file_connection_persists_between_scopes() {
    let temp = TempDir::new().unwrap();
    let uri: StoreUri = format!("file://{}", temp.path().join("books.json").display())
        .parse()
        .unwrap();

    with_connection(&uri, |conn| {
        let catalog = conn.catalog("books");
        catalog.insert_many(&seed_books())?;
        catalog.update_price("Beloved", 12.25)?;
        catalog.create_index(&[(BookField::Title, IndexDirection::Ascending)])?;
        Ok(())
    })
    .unwrap();

    let (count, price, indexes) = with_connection(&uri, |conn| {
        let catalog = conn.catalog("books");
        let price = catalog.find_by_title("Beloved")?.map(|b| b.price);
        Ok((catalog.count()?, price, conn.store().list_indexes("books")?))
    })
    .unwrap();
    assert_eq!(count, 10);
    assert_eq!(price, Some(12.25));
    assert_eq!(indexes, vec!["title_1".to_string()]);
}

#[test]
fn test_file_connection_missing_directory() {
    let temp = TempDir::new().unwrap();
    let uri = StoreUri::File(temp.path().join("missing").join("books.json"));
    let err = Connection::open(&uri).err().unwrap();
    assert!(err.is_unavailable());
}
