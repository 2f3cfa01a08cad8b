//! Read-only catalog operations: the index page, lists, details and the data
//! behind the create, update and delete forms.
//!
//! Each read gathers its records through one [`Query`] so the independent
//! lookups run concurrently, then shapes them into a JSON view.

use std::collections::{BTreeMap, HashMap};

use catalog_db::{Filter, RecordId, Sort};
use serde_json::{json, Value};

use super::controller::Catalog;
use super::dispatch::{Outcome, Target};
use super::error::CatalogError;
use super::integrity::{COPY_BOOK_FIELD, WORK_AUTHOR_FIELD, WORK_GENRES_FIELD};
use super::models::{Author, CopyStatus, Entity, EntityKind, Genre, PhysicalCopy, Work};
use super::orchestrator::Query;

/// JSON shape of a record as handed to views.
pub trait View {
    fn view(&self) -> Value;
}

impl View for Genre {
    fn view(&self) -> Value {
        json!({ "id": self.id, "name": self.name, "url": self.url() })
    }
}

impl View for Author {
    fn view(&self) -> Value {
        json!({
            "id": self.id,
            "first_name": self.first_name,
            "family_name": self.family_name,
            "name": self.name(),
            "lifespan": self.lifespan(),
            "date_of_birth": self.date_of_birth_iso(),
            "date_of_death": self.date_of_death_iso(),
            "url": self.url(),
        })
    }
}

impl View for Work {
    fn view(&self) -> Value {
        json!({
            "id": self.id,
            "title": self.title,
            "summary": self.summary,
            "isbn": self.isbn,
            "author": self.author,
            "genres": self.genres,
            "url": self.url(),
        })
    }
}

impl View for PhysicalCopy {
    fn view(&self) -> Value {
        json!({
            "id": self.id,
            "book": self.book,
            "imprint": self.imprint,
            "status": self.status.as_str(),
            "due_back": self.due_back,
            "due_back_formatted": self.due_back_formatted(),
            "url": self.url(),
        })
    }
}

fn views<T: View>(records: &[T]) -> Vec<Value> {
    records.iter().map(View::view).collect()
}

fn by_id<T: Entity>(records: Vec<T>) -> HashMap<RecordId, T> {
    records
        .into_iter()
        .map(|record| (record.id().clone(), record))
        .collect()
}

/// Work view with its author and genres expanded where they still exist.
fn populated_work(work: &Work, authors: &HashMap<RecordId, Author>, genres: &[Genre]) -> Value {
    let mut view = work.view();
    if let Some(author) = authors.get(&work.author) {
        view["author"] = author.view();
    }
    let expanded: Vec<Value> = genres
        .iter()
        .filter(|genre| work.genres.contains(&genre.id))
        .map(View::view)
        .collect();
    view["genres"] = Value::Array(expanded);
    view
}

fn populated_copy(copy: &PhysicalCopy, works: &HashMap<RecordId, Work>) -> Value {
    let mut view = copy.view();
    if let Some(work) = works.get(&copy.book) {
        view["book"] = work.view();
    }
    view
}

fn rendered(view: &'static str, data: Value) -> Outcome {
    Outcome::Rendered { view, data }
}

fn by_name() -> Option<Sort> {
    Some(Sort::ascending("name"))
}

fn by_family_name() -> Option<Sort> {
    Some(Sort::ascending("family_name"))
}

fn by_title() -> Option<Sort> {
    Some(Sort::ascending("title"))
}

impl Catalog {
    fn settle(&self, view: &'static str, result: Result<Outcome, CatalogError>) -> Outcome {
        result.unwrap_or_else(|err| {
            tracing::error!(view, error = %err, "catalog read failed");
            Outcome::InternalError(err)
        })
    }

    /// Record counts for the home page.
    pub async fn index(&self) -> Outcome {
        self.settle("index", self.read_index().await)
    }

    pub async fn list(&self, kind: EntityKind) -> Outcome {
        self.settle("list", self.read_list(kind).await)
    }

    pub async fn detail(&self, kind: EntityKind, id: &RecordId) -> Outcome {
        self.settle("detail", self.read_detail(kind, id).await)
    }

    pub async fn create_form(&self, kind: EntityKind) -> Outcome {
        self.settle("create_form", self.read_create_form(kind).await)
    }

    pub async fn update_form(&self, kind: EntityKind, id: &RecordId) -> Outcome {
        self.settle("update_form", self.read_update_form(kind, id).await)
    }

    /// Data for the delete confirmation page, listing any blocking dependents.
    /// A record that is already gone redirects to its list.
    pub async fn delete_form(&self, kind: EntityKind, id: &RecordId) -> Outcome {
        self.settle("delete_form", self.read_delete_form(kind, id).await)
    }

    /// Collection counts keyed as on the home page.
    pub async fn counts(&self) -> Result<BTreeMap<&'static str, u64>, CatalogError> {
        let bundle = Query::new()
            .count::<Work>("work_count", Filter::all())
            .count::<PhysicalCopy>("copy_count", Filter::all())
            .count::<PhysicalCopy>(
                "copy_available_count",
                Filter::eq("status", CopyStatus::Available.as_str()),
            )
            .count::<Author>("author_count", Filter::all())
            .count::<Genre>("genre_count", Filter::all())
            .run(self.storage())
            .await?;

        bundle
            .keys()
            .map(|key| bundle.count(key).map(|count| (key, count)))
            .collect()
    }

    async fn read_index(&self) -> Result<Outcome, CatalogError> {
        let counts = self.counts().await?;
        Ok(rendered(
            "index",
            json!({ "title": "Local Library Home", "data": counts }),
        ))
    }

    async fn read_list(&self, kind: EntityKind) -> Result<Outcome, CatalogError> {
        let storage = self.storage();
        match kind {
            EntityKind::Genre => {
                let genres = Query::new()
                    .many::<Genre>("genres", Filter::all(), by_name())
                    .run(storage)
                    .await?
                    .take_many::<Genre>("genres")?;
                Ok(rendered(
                    "genre_list",
                    json!({ "title": "Genre List", "genre_list": views(&genres) }),
                ))
            }
            EntityKind::Author => {
                let authors = Query::new()
                    .many::<Author>("authors", Filter::all(), by_family_name())
                    .run(storage)
                    .await?
                    .take_many::<Author>("authors")?;
                Ok(rendered(
                    "author_list",
                    json!({ "title": "Author List", "author_list": views(&authors) }),
                ))
            }
            EntityKind::Work => {
                let mut bundle = Query::new()
                    .many::<Work>("works", Filter::all(), by_title())
                    .many::<Author>("authors", Filter::all(), None)
                    .run(storage)
                    .await?;
                let works = bundle.take_many::<Work>("works")?;
                let authors = by_id(bundle.take_many::<Author>("authors")?);

                let book_list: Vec<Value> = works
                    .iter()
                    .map(|work| {
                        let mut view = work.view();
                        if let Some(author) = authors.get(&work.author) {
                            view["author"] = author.view();
                        }
                        view
                    })
                    .collect();
                Ok(rendered(
                    "work_list",
                    json!({ "title": "Book List", "book_list": book_list }),
                ))
            }
            EntityKind::Copy => {
                let mut bundle = Query::new()
                    .many::<PhysicalCopy>("copies", Filter::all(), None)
                    .many::<Work>("works", Filter::all(), None)
                    .run(storage)
                    .await?;
                let copies = bundle.take_many::<PhysicalCopy>("copies")?;
                let works = by_id(bundle.take_many::<Work>("works")?);

                let copy_list: Vec<Value> = copies
                    .iter()
                    .map(|copy| populated_copy(copy, &works))
                    .collect();
                Ok(rendered(
                    "copy_list",
                    json!({ "title": "Book Instance List", "copy_list": copy_list }),
                ))
            }
        }
    }

    async fn read_detail(&self, kind: EntityKind, id: &RecordId) -> Result<Outcome, CatalogError> {
        let storage = self.storage();
        match kind {
            EntityKind::Genre => {
                let mut bundle = Query::new()
                    .by_id::<Genre>("genre", id)
                    .many::<Work>("works", Filter::eq(WORK_GENRES_FIELD, id.as_str()), by_title())
                    .run(storage)
                    .await?;
                let Some(genre) = bundle.take_one::<Genre>("genre")? else {
                    return Ok(Outcome::NotFound);
                };
                let works = bundle.take_many::<Work>("works")?;
                Ok(rendered(
                    "genre_detail",
                    json!({
                        "title": "Genre Detail",
                        "genre": genre.view(),
                        "genre_books": views(&works),
                    }),
                ))
            }
            EntityKind::Author => {
                let mut bundle = Query::new()
                    .by_id::<Author>("author", id)
                    .many::<Work>("works", Filter::eq(WORK_AUTHOR_FIELD, id.as_str()), by_title())
                    .run(storage)
                    .await?;
                let Some(author) = bundle.take_one::<Author>("author")? else {
                    return Ok(Outcome::NotFound);
                };
                let works = bundle.take_many::<Work>("works")?;
                Ok(rendered(
                    "author_detail",
                    json!({
                        "title": "Author Detail",
                        "author": author.view(),
                        "author_books": views(&works),
                    }),
                ))
            }
            EntityKind::Work => {
                let mut bundle = Query::new()
                    .by_id::<Work>("work", id)
                    .many::<PhysicalCopy>("copies", Filter::eq(COPY_BOOK_FIELD, id.as_str()), None)
                    .run(storage)
                    .await?;
                let Some(work) = bundle.take_one::<Work>("work")? else {
                    return Ok(Outcome::NotFound);
                };
                let copies = bundle.take_many::<PhysicalCopy>("copies")?;

                let mut related = Query::new()
                    .by_id::<Author>("author", &work.author)
                    .many::<Genre>(
                        "genres",
                        Filter::any_of("id", work.genres.iter().map(RecordId::as_str)),
                        by_name(),
                    )
                    .run(storage)
                    .await?;
                let authors = by_id(related.take_one::<Author>("author")?.into_iter().collect());
                let genres = related.take_many::<Genre>("genres")?;

                Ok(rendered(
                    "work_detail",
                    json!({
                        "title": work.title,
                        "book": populated_work(&work, &authors, &genres),
                        "book_instances": views(&copies),
                    }),
                ))
            }
            EntityKind::Copy => {
                let Some(copy) = Query::new()
                    .by_id::<PhysicalCopy>("copy", id)
                    .run(storage)
                    .await?
                    .take_one::<PhysicalCopy>("copy")?
                else {
                    return Ok(Outcome::NotFound);
                };
                let work = Query::new()
                    .by_id::<Work>("work", &copy.book)
                    .run(storage)
                    .await?
                    .take_one::<Work>("work")?;
                let title = work
                    .as_ref()
                    .map(|work| format!("Copy: {}", work.title))
                    .unwrap_or_else(|| "Copy".to_string());
                let works = by_id(work.into_iter().collect());

                Ok(rendered(
                    "copy_detail",
                    json!({ "title": title, "copy": populated_copy(&copy, &works) }),
                ))
            }
        }
    }

    async fn read_create_form(&self, kind: EntityKind) -> Result<Outcome, CatalogError> {
        let storage = self.storage();
        match kind {
            EntityKind::Author => Ok(rendered("author_form", json!({ "title": "Create Author" }))),
            EntityKind::Genre => Ok(rendered("genre_form", json!({ "title": "Create Genre" }))),
            EntityKind::Work => {
                let mut bundle = Query::new()
                    .many::<Author>("authors", Filter::all(), by_family_name())
                    .many::<Genre>("genres", Filter::all(), by_name())
                    .run(storage)
                    .await?;
                let authors = bundle.take_many::<Author>("authors")?;
                let genres = bundle.take_many::<Genre>("genres")?;
                Ok(rendered(
                    "work_form",
                    json!({
                        "title": "Create Book",
                        "authors": views(&authors),
                        "genres": views(&genres),
                    }),
                ))
            }
            EntityKind::Copy => {
                let works = Query::new()
                    .many::<Work>("works", Filter::all(), by_title())
                    .run(storage)
                    .await?
                    .take_many::<Work>("works")?;
                Ok(rendered(
                    "copy_form",
                    json!({
                        "title": "Create Book Instance",
                        "book_list": views(&works),
                        "status_choices": CopyStatus::CHOICES,
                    }),
                ))
            }
        }
    }

    async fn read_update_form(
        &self,
        kind: EntityKind,
        id: &RecordId,
    ) -> Result<Outcome, CatalogError> {
        let storage = self.storage();
        match kind {
            EntityKind::Author => {
                let Some(author) = Query::new()
                    .by_id::<Author>("author", id)
                    .run(storage)
                    .await?
                    .take_one::<Author>("author")?
                else {
                    return Ok(Outcome::NotFound);
                };
                Ok(rendered(
                    "author_form",
                    json!({ "title": "Update Author", "author": author.view() }),
                ))
            }
            EntityKind::Genre => {
                let Some(genre) = Query::new()
                    .by_id::<Genre>("genre", id)
                    .run(storage)
                    .await?
                    .take_one::<Genre>("genre")?
                else {
                    return Ok(Outcome::NotFound);
                };
                Ok(rendered(
                    "genre_form",
                    json!({ "title": "Update Genre", "genre": genre.view() }),
                ))
            }
            EntityKind::Work => {
                let mut bundle = Query::new()
                    .by_id::<Work>("work", id)
                    .many::<Author>("authors", Filter::all(), by_family_name())
                    .many::<Genre>("genres", Filter::all(), by_name())
                    .run(storage)
                    .await?;
                let Some(work) = bundle.take_one::<Work>("work")? else {
                    return Ok(Outcome::NotFound);
                };
                let authors = bundle.take_many::<Author>("authors")?;
                let genres: Vec<Value> = bundle
                    .take_many::<Genre>("genres")?
                    .iter()
                    .map(|genre| {
                        let mut view = genre.view();
                        view["checked"] = Value::Bool(work.genres.contains(&genre.id));
                        view
                    })
                    .collect();
                Ok(rendered(
                    "work_form",
                    json!({
                        "title": "Update Book",
                        "book": work.view(),
                        "authors": views(&authors),
                        "genres": genres,
                    }),
                ))
            }
            EntityKind::Copy => {
                let mut bundle = Query::new()
                    .by_id::<PhysicalCopy>("copy", id)
                    .many::<Work>("works", Filter::all(), by_title())
                    .run(storage)
                    .await?;
                let Some(copy) = bundle.take_one::<PhysicalCopy>("copy")? else {
                    return Ok(Outcome::NotFound);
                };
                let works = bundle.take_many::<Work>("works")?;
                Ok(rendered(
                    "copy_form",
                    json!({
                        "title": "Update Book Instance",
                        "copy": copy.view(),
                        "book_list": views(&works),
                        "selected_book": copy.book,
                        "status_choices": CopyStatus::CHOICES,
                    }),
                ))
            }
        }
    }

    async fn read_delete_form(
        &self,
        kind: EntityKind,
        id: &RecordId,
    ) -> Result<Outcome, CatalogError> {
        let storage = self.storage();
        let gone = Outcome::Redirected(Target::List { kind });
        match kind {
            EntityKind::Genre => {
                let mut bundle = Query::new()
                    .by_id::<Genre>("genre", id)
                    .many::<Work>("works", Filter::eq(WORK_GENRES_FIELD, id.as_str()), by_title())
                    .run(storage)
                    .await?;
                let Some(genre) = bundle.take_one::<Genre>("genre")? else {
                    return Ok(gone);
                };
                let works = bundle.take_many::<Work>("works")?;
                Ok(rendered(
                    "genre_delete",
                    json!({
                        "title": "Delete Genre",
                        "genre": genre.view(),
                        "genre_books": views(&works),
                    }),
                ))
            }
            EntityKind::Author => {
                let mut bundle = Query::new()
                    .by_id::<Author>("author", id)
                    .many::<Work>("works", Filter::eq(WORK_AUTHOR_FIELD, id.as_str()), by_title())
                    .run(storage)
                    .await?;
                let Some(author) = bundle.take_one::<Author>("author")? else {
                    return Ok(gone);
                };
                let works = bundle.take_many::<Work>("works")?;
                Ok(rendered(
                    "author_delete",
                    json!({
                        "title": "Delete Author",
                        "author": author.view(),
                        "author_books": views(&works),
                    }),
                ))
            }
            EntityKind::Work => {
                let mut bundle = Query::new()
                    .by_id::<Work>("work", id)
                    .many::<PhysicalCopy>("copies", Filter::eq(COPY_BOOK_FIELD, id.as_str()), None)
                    .run(storage)
                    .await?;
                let Some(work) = bundle.take_one::<Work>("work")? else {
                    return Ok(gone);
                };
                let copies = bundle.take_many::<PhysicalCopy>("copies")?;
                Ok(rendered(
                    "work_delete",
                    json!({
                        "title": "Delete Book",
                        "book": work.view(),
                        "book_instances": views(&copies),
                    }),
                ))
            }
            EntityKind::Copy => {
                let Some(copy) = Query::new()
                    .by_id::<PhysicalCopy>("copy", id)
                    .run(storage)
                    .await?
                    .take_one::<PhysicalCopy>("copy")?
                else {
                    return Ok(gone);
                };
                Ok(rendered(
                    "copy_delete",
                    json!({ "title": "Delete Book Instance", "copy": copy.view() }),
                ))
            }
        }
    }
}
