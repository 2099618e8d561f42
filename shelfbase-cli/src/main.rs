use anyhow::{anyhow, bail, Context, Result};
use clap::{Parser, Subcommand};
use serde::Serialize;
use serde_json::Value;
use shelfbase_core::reports::{author_with_most_books, average_price_by_genre, count_by_decade};
use shelfbase_core::{
    logging, seed_books, Book, BookField, CatalogService, Connection, DocumentStore,
    IndexDirection, LogLevel, PartialBook, ShelfConfig, SortOrder, StoreUri, DEFAULT_PAGE_SIZE,
};
use std::path::PathBuf;

type Catalog = CatalogService<dyn DocumentStore>;

#[derive(Parser)]
#[command(name = "shelfbase")]
#[command(about = "Shelfbase CLI - query and report on a book catalog")]
#[command(version)]
struct Cli {
    /// TOML configuration file
    #[arg(long, global = true, env = "SHELFBASE_CONFIG")]
    config: Option<PathBuf>,
    /// Store URI (memory:// or file://<path>)
    #[arg(long, global = true)]
    uri: Option<String>,
    /// Collection holding the books
    #[arg(long, global = true)]
    collection: Option<String>,
    /// error, warn, info, debug or trace
    #[arg(long, global = true)]
    log_level: Option<LogLevel>,
    /// Print JSON instead of text
    #[arg(long, global = true)]
    json: bool,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Insert the ten reference books
    Seed,
    /// Books in a genre
    Genre { genre: String },
    /// Books published after a year
    After { year: i32 },
    /// Books by an author
    Author { author: String },
    /// In-stock books published after a year
    InStock {
        year: i32,
        /// Comma separated fields to return (all when omitted)
        #[arg(long, value_delimiter = ',')]
        fields: Vec<BookField>,
    },
    /// Title, author and price ordered by a field
    Sorted {
        #[arg(long, default_value = "price")]
        by: BookField,
        #[arg(long)]
        desc: bool,
    },
    /// One page of the catalog (1-based)
    Page {
        page: usize,
        #[arg(long, default_value_t = DEFAULT_PAGE_SIZE)]
        size: usize,
    },
    /// Change the price of a book
    UpdatePrice {
        title: String,
        #[arg(allow_negative_numbers = true)]
        price: f64,
    },
    /// Delete a book by title
    Delete { title: String },
    /// Create an index, e.g. `index genre price:-1`
    Index {
        #[arg(required = true, value_parser = parse_index_field)]
        fields: Vec<(BookField, IndexDirection)>,
    },
    /// Execution statistics for a JSON filter
    Explain { filter: String },
    /// Derived reports
    Report {
        #[command(subcommand)]
        report: ReportKind,
    },
    /// Seed, query, index and report in one run
    Demo,
}

#[derive(Subcommand, Clone, Copy)]
enum ReportKind {
    /// Average price per genre
    GenreAverages,
    /// Author with the most books
    TopAuthor,
    /// Book count per decade
    Decades,
}

/// `field` or `field:<1|-1|asc|desc>`
fn parse_index_field(s: &str) -> std::result::Result<(BookField, IndexDirection), String> {
    let (field, dir) = s.split_once(':').unwrap_or((s, "1"));
    let field: BookField = field.parse().map_err(|e| format!("{}", e))?;
    let dir = match dir {
        "1" | "asc" => IndexDirection::Ascending,
        "-1" | "desc" => IndexDirection::Descending,
        other => return Err(format!("Invalid index direction '{}'", other)),
    };
    Ok((field, dir))
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let mut config =
        ShelfConfig::load(cli.config.as_deref()).context("Failed to load configuration")?;
    if let Some(uri) = cli.uri {
        config.uri = uri;
    }
    if let Some(collection) = cli.collection {
        config.collection = collection;
    }
    if let Some(level) = cli.log_level {
        config.log_level = level;
    }
    config.validate()?;
    logging::init(config.log_level);

    let uri = config.store_uri()?;
    let conn = Connection::open(&uri).with_context(|| format!("Failed to open store: {}", uri))?;
    let catalog = conn.catalog(&config.collection);

    // A memory store starts empty on every run
    let seeds_itself = matches!(cli.command, Commands::Seed | Commands::Demo);
    if matches!(uri, StoreUri::Memory { .. }) && !seeds_itself {
        catalog.insert_many(&seed_books())?;
    }

    let out = Output { json: cli.json };
    let outcome = run(&catalog, cli.command, &out);
    let released = conn.close().context("Failed to release store");
    outcome?;
    released
}

struct Output {
    json: bool,
}

impl Output {
    fn emit<T: Serialize>(&self, value: &T, text: impl FnOnce()) -> Result<()> {
        if self.json {
            println!("{}", serde_json::to_string_pretty(value)?);
        } else {
            text();
        }
        Ok(())
    }

    fn books(&self, books: &[Book]) -> Result<()> {
        self.emit(&books, || {
            for book in books {
                println!(
                    "{} by {} ({}, {}) - ${:.2}{}",
                    book.title,
                    book.author,
                    book.genre,
                    book.published_year,
                    book.price,
                    if book.in_stock { "" } else { " [out of stock]" }
                );
            }
            println!("{} book(s)", books.len());
        })
    }

    fn partials(&self, books: &[PartialBook]) -> Result<()> {
        self.emit(&books, || {
            for book in books {
                let Ok(Value::Object(fields)) = serde_json::to_value(book) else {
                    continue;
                };
                let line: Vec<String> = fields
                    .iter()
                    .map(|(k, v)| match v {
                        Value::String(s) => format!("{}: {}", k, s),
                        other => format!("{}: {}", k, other),
                    })
                    .collect();
                println!("{}", line.join(" | "));
            }
            println!("{} book(s)", books.len());
        })
    }

    fn count(&self, label: &str, n: u64) -> Result<()> {
        self.emit(&serde_json::json!({ label: n }), || println!("{}: {}", label, n))
    }
}

fn run(catalog: &Catalog, command: Commands, out: &Output) -> Result<()> {
    match command {
        Commands::Seed => {
            let n = catalog.insert_many(&seed_books())?;
            out.count("inserted", n as u64)
        }
        Commands::Genre { genre } => out.books(&catalog.find_by_genre(&genre)?),
        Commands::After { year } => out.books(&catalog.find_published_after(year)?),
        Commands::Author { author } => out.books(&catalog.find_by_author(&author)?),
        Commands::InStock { year, fields } => {
            let fields = (!fields.is_empty()).then_some(fields.as_slice());
            out.partials(&catalog.find_in_stock_after(year, fields)?)
        }
        Commands::Sorted { by, desc } => {
            let order = if desc { SortOrder::Descending } else { SortOrder::Ascending };
            out.partials(&catalog.list_sorted(by, order)?)
        }
        Commands::Page { page, size } => out.partials(&catalog.list_page(page, size)?),
        Commands::UpdatePrice { title, price } => {
            out.count("modified", catalog.update_price(&title, price)?)
        }
        Commands::Delete { title } => out.count("deleted", catalog.delete_by_title(&title)?),
        Commands::Index { fields } => {
            let name = catalog.create_index(&fields)?;
            out.emit(&serde_json::json!({ "index": name }), || println!("index: {}", name))
        }
        Commands::Explain { filter } => {
            let filter: Value = serde_json::from_str(&filter).context("Filter must be JSON")?;
            let stats = catalog.explain_query(&filter)?;
            println!("{}", serde_json::to_string_pretty(&stats)?);
            Ok(())
        }
        Commands::Report { report } => print_report(catalog, report, out),
        Commands::Demo => demo(catalog, out),
    }
}

fn print_report(catalog: &Catalog, report: ReportKind, out: &Output) -> Result<()> {
    match report {
        ReportKind::GenreAverages => {
            let rows = average_price_by_genre(catalog)?;
            out.emit(&rows, || {
                for row in &rows {
                    let genre = row.genre.as_deref().unwrap_or("(none)");
                    println!("{}: ${:.2}", genre, row.average_price);
                }
            })
        }
        ReportKind::TopAuthor => {
            let top = author_with_most_books(catalog)?;
            out.emit(&top, || match &top {
                Some(top) => println!("{} ({} books)", top.author, top.count),
                None => println!("catalog is empty"),
            })
        }
        ReportKind::Decades => {
            let rows = count_by_decade(catalog)?;
            out.emit(&rows, || {
                for row in &rows {
                    println!("{}: {}", row.label, row.count);
                }
            })
        }
    }
}

fn section(out: &Output, title: &str) {
    if !out.json {
        println!("\n== {} ==", title);
    }
}

fn plan_summary(stats: &Value) -> Result<String> {
    let plan = &stats["queryPlanner"]["winningPlan"];
    let exec = &stats["executionStats"];
    let stage = match plan["inputStage"]["indexName"].as_str() {
        Some(index) => format!("IXSCAN({})", index),
        None => plan["stage"]
            .as_str()
            .ok_or_else(|| anyhow!("explain output has no winning plan"))?
            .to_string(),
    };
    Ok(format!(
        "{} returned={} docsExamined={} keysExamined={}",
        stage, exec["nReturned"], exec["totalDocsExamined"], exec["totalKeysExamined"]
    ))
}

fn demo(catalog: &Catalog, out: &Output) -> Result<()> {
    if catalog.count()? > 0 {
        bail!("demo needs an empty collection, '{}' already has books", catalog.collection());
    }

    section(out, "seed");
    out.count("inserted", catalog.insert_many(&seed_books())? as u64)?;

    section(out, "genre: Fiction");
    out.books(&catalog.find_by_genre("Fiction")?)?;
    section(out, "published after 1950");
    out.books(&catalog.find_published_after(1950)?)?;
    section(out, "author: J.R.R. Tolkien");
    out.books(&catalog.find_by_author("J.R.R. Tolkien")?)?;
    section(out, "in stock after 1950");
    let listing = [BookField::Title, BookField::Author, BookField::Price];
    out.partials(&catalog.find_in_stock_after(1950, Some(&listing[..]))?)?;
    section(out, "by price, ascending");
    out.partials(&catalog.list_sorted(BookField::Price, SortOrder::Ascending)?)?;
    section(out, "by price, descending");
    out.partials(&catalog.list_sorted(BookField::Price, SortOrder::Descending)?)?;
    section(out, "page 2");
    out.partials(&catalog.list_page(2, DEFAULT_PAGE_SIZE)?)?;

    section(out, "update price of 1984");
    out.count("modified", catalog.update_price("1984", 17.99)?)?;
    section(out, "delete Moby-Dick");
    out.count("deleted", catalog.delete_by_title("Moby-Dick")?)?;

    for (filter, field) in [
        (serde_json::json!({ "author": "J.R.R. Tolkien" }), BookField::Author),
        (serde_json::json!({ "price": { "$lt": 12 } }), BookField::Price),
    ] {
        section(out, &format!("explain {}", filter));
        let before = catalog.explain_query(&filter)?;
        catalog.create_index(&[(field, IndexDirection::Ascending)])?;
        let after = catalog.explain_query(&filter)?;
        let summaries = [plan_summary(&before)?, plan_summary(&after)?];
        out.emit(&serde_json::json!({ "before": before, "after": after }), || {
            println!("before index: {}", summaries[0]);
            println!("after index:  {}", summaries[1]);
        })?;
    }

    for report in [ReportKind::GenreAverages, ReportKind::TopAuthor, ReportKind::Decades] {
        section(out, "report");
        print_report(catalog, report, out)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_index_field() {
        assert_eq!(
            parse_index_field("price:-1").unwrap(),
            (BookField::Price, IndexDirection::Descending)
        );
        assert_eq!(
            parse_index_field("genre").unwrap(),
            (BookField::Genre, IndexDirection::Ascending)
        );
        assert!(parse_index_field("price:up").is_err());
        assert!(parse_index_field("isbn").is_err());
    }

    #[test]
    fn test_cli_parses_global_flags_after_subcommand() {
        let cli = Cli::try_parse_from(["shelfbase", "sorted", "--by", "year", "--desc", "--json"])
            .unwrap();
        assert!(cli.json);
        assert!(matches!(
            cli.command,
            Commands::Sorted { by: BookField::PublishedYear, desc: true }
        ));
    }

    #[test]
    fn test_demo_runs_on_memory_store() {
        let conn = Connection::open(&StoreUri::Memory { label: None }).unwrap();
        let catalog = conn.catalog("books");
        demo(&catalog, &Output { json: true }).unwrap();
        assert_eq!(catalog.count().unwrap(), 9);
        assert!(demo(&catalog, &Output { json: true }).is_err());
    }
}
