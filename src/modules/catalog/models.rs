//! Catalog records and their drafts.
//!
//! Records are immutable by replacement: updates store a new draft under the
//! existing identifier. Drafts are what the validation pipeline produces and
//! what gets written to storage; records are what storage hands back.

use std::fmt;
use std::str::FromStr;

use catalog_db::{Document, Filter, RecordId};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use time::macros::format_description;
use time::Date;

use super::error::CatalogError;
use super::validation::{FieldRule, Fields, Schema};

/// Path under which the catalog routes are mounted.
pub const URL_PREFIX: &str = "/api/catalog";

/// The four record types held by the catalog.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntityKind {
    Work,
    Author,
    Genre,
    Copy,
}

impl EntityKind {
    pub const ALL: [EntityKind; 4] = [
        EntityKind::Work,
        EntityKind::Author,
        EntityKind::Genre,
        EntityKind::Copy,
    ];

    pub fn name(self) -> &'static str {
        match self {
            EntityKind::Work => "work",
            EntityKind::Author => "author",
            EntityKind::Genre => "genre",
            EntityKind::Copy => "copy",
        }
    }

    /// Storage collection, also used as the plural in list paths.
    pub fn collection(self) -> &'static str {
        match self {
            EntityKind::Work => "works",
            EntityKind::Author => "authors",
            EntityKind::Genre => "genres",
            EntityKind::Copy => "copies",
        }
    }

    pub fn from_collection(collection: &str) -> Option<Self> {
        Self::ALL
            .into_iter()
            .find(|kind| kind.collection() == collection)
    }

    pub fn record_url(self, id: &RecordId) -> String {
        format!("{URL_PREFIX}/{}/{}", self.name(), id)
    }

    pub fn list_url(self) -> String {
        format!("{URL_PREFIX}/{}", self.collection())
    }
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for EntityKind {
    type Err = CatalogError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|kind| kind.name() == value)
            .ok_or_else(|| CatalogError::UnknownKind(value.to_string()))
    }
}

/// A stored record of one kind.
pub trait Entity: Serialize + DeserializeOwned + Clone + Send + Sync + 'static {
    const KIND: EntityKind;

    fn id(&self) -> &RecordId;

    fn url(&self) -> String {
        Self::KIND.record_url(self.id())
    }
}

/// A foreign reference carried by a draft, checked before commit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reference {
    pub field: &'static str,
    pub kind: EntityKind,
    pub id: RecordId,
}

/// Validated content of a record, without its identifier.
pub trait Draft: Serialize + Send + Sync + Sized {
    type Entity: Entity;

    fn schema() -> Schema;

    /// Build the draft from fields that passed [`Self::schema`].
    fn from_fields(fields: &Fields) -> Self;

    fn references(&self) -> Vec<Reference> {
        Vec::new()
    }

    /// When set, creation first looks for a record matching this filter and
    /// returns it instead of writing a duplicate.
    fn identity_filter(&self) -> Option<Filter> {
        None
    }
}

pub(crate) fn decode<T: Entity>(doc: Document) -> Result<T, CatalogError> {
    serde_json::from_value(serde_json::Value::Object(doc)).map_err(|source| {
        CatalogError::Decode {
            kind: T::KIND,
            source,
        }
    })
}

pub(crate) fn encode<D: Draft>(draft: &D) -> Result<Document, CatalogError> {
    let kind = <D::Entity as Entity>::KIND;
    match serde_json::to_value(draft) {
        Ok(serde_json::Value::Object(doc)) => Ok(doc),
        Ok(_) => Err(CatalogError::Encode {
            kind,
            reason: "draft did not serialize to an object".to_string(),
        }),
        Err(err) => Err(CatalogError::Encode {
            kind,
            reason: err.to_string(),
        }),
    }
}

fn format_medium(date: Date) -> String {
    date.format(format_description!(
        "[month repr:short] [day padding:none], [year]"
    ))
    .unwrap_or_default()
}

fn format_iso(date: Date) -> String {
    date.format(format_description!("[year]-[month]-[day]"))
        .unwrap_or_default()
}

// ---------------------------------------------------------------------------
// Work

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Work {
    pub id: RecordId,
    pub title: String,
    pub summary: String,
    pub isbn: String,
    pub author: RecordId,
    #[serde(default)]
    pub genres: Vec<RecordId>,
}

impl Entity for Work {
    const KIND: EntityKind = EntityKind::Work;

    fn id(&self) -> &RecordId {
        &self.id
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct WorkDraft {
    pub title: String,
    pub summary: String,
    pub isbn: String,
    pub author: RecordId,
    pub genres: Vec<RecordId>,
}

impl Draft for WorkDraft {
    type Entity = Work;

    fn schema() -> Schema {
        Schema::new(vec![
            FieldRule::text("title").required("Title must not be empty."),
            FieldRule::text("author").required("Author must not be empty."),
            FieldRule::text("summary").required("Summary must not be empty."),
            FieldRule::text("isbn").required("ISBN must not be empty."),
            FieldRule::many("genres"),
        ])
    }

    fn from_fields(fields: &Fields) -> Self {
        Self {
            title: fields.text("title").to_string(),
            summary: fields.text("summary").to_string(),
            isbn: fields.text("isbn").to_string(),
            author: RecordId::from(fields.text("author")),
            genres: distinct_ids(fields.list("genres")),
        }
    }

    fn references(&self) -> Vec<Reference> {
        let mut references = vec![Reference {
            field: "author",
            kind: EntityKind::Author,
            id: self.author.clone(),
        }];
        references.extend(self.genres.iter().map(|genre| Reference {
            field: "genres",
            kind: EntityKind::Genre,
            id: genre.clone(),
        }));
        references
    }
}

// ---------------------------------------------------------------------------
// Author

pub const NAME_MAX_LENGTH: usize = 100;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Author {
    pub id: RecordId,
    pub first_name: String,
    pub family_name: String,
    #[serde(default)]
    pub date_of_birth: Option<Date>,
    #[serde(default)]
    pub date_of_death: Option<Date>,
}

impl Author {
    /// "Family, First"
    pub fn name(&self) -> String {
        format!("{}, {}", self.family_name, self.first_name)
    }

    /// "Birth - Death", with `Unknown` for absent dates.
    pub fn lifespan(&self) -> String {
        let birth = self
            .date_of_birth
            .map(format_medium)
            .unwrap_or_else(|| "Unknown".to_string());
        let death = self
            .date_of_death
            .map(format_medium)
            .unwrap_or_else(|| "Unknown".to_string());
        format!("{birth} - {death}")
    }

    pub fn date_of_birth_iso(&self) -> String {
        self.date_of_birth.map(format_iso).unwrap_or_default()
    }

    pub fn date_of_death_iso(&self) -> String {
        self.date_of_death.map(format_iso).unwrap_or_default()
    }
}

impl Entity for Author {
    const KIND: EntityKind = EntityKind::Author;

    fn id(&self) -> &RecordId {
        &self.id
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AuthorDraft {
    pub first_name: String,
    pub family_name: String,
    pub date_of_birth: Option<Date>,
    pub date_of_death: Option<Date>,
}

impl Draft for AuthorDraft {
    type Entity = Author;

    fn schema() -> Schema {
        Schema::new(vec![
            FieldRule::text("first_name")
                .required("First name must be specified.")
                .max_len(NAME_MAX_LENGTH, "First name is too long."),
            FieldRule::text("family_name")
                .required("Family name must be specified.")
                .max_len(NAME_MAX_LENGTH, "Family name is too long."),
            FieldRule::date("date_of_birth", "Invalid date of birth."),
            FieldRule::date("date_of_death", "Invalid date of death."),
        ])
    }

    fn from_fields(fields: &Fields) -> Self {
        Self {
            first_name: fields.text("first_name").to_string(),
            family_name: fields.text("family_name").to_string(),
            date_of_birth: fields.date("date_of_birth"),
            date_of_death: fields.date("date_of_death"),
        }
    }
}

// ---------------------------------------------------------------------------
// Genre

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Genre {
    pub id: RecordId,
    pub name: String,
}

impl Entity for Genre {
    const KIND: EntityKind = EntityKind::Genre;

    fn id(&self) -> &RecordId {
        &self.id
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GenreDraft {
    pub name: String,
}

impl Draft for GenreDraft {
    type Entity = Genre;

    fn schema() -> Schema {
        Schema::new(vec![FieldRule::text("name").required("Genre name required.")])
    }

    fn from_fields(fields: &Fields) -> Self {
        Self {
            name: fields.text("name").to_string(),
        }
    }

    // Exact, case-sensitive match on the escaped name.
    fn identity_filter(&self) -> Option<Filter> {
        Some(Filter::eq("name", self.name.as_str()))
    }
}

// ---------------------------------------------------------------------------
// Copy

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum CopyStatus {
    Available,
    #[default]
    Maintenance,
    Loaned,
    Reserved,
}

impl CopyStatus {
    pub const CHOICES: &'static [&'static str] = &["Available", "Maintenance", "Loaned", "Reserved"];

    pub fn as_str(self) -> &'static str {
        match self {
            CopyStatus::Available => "Available",
            CopyStatus::Maintenance => "Maintenance",
            CopyStatus::Loaned => "Loaned",
            CopyStatus::Reserved => "Reserved",
        }
    }
}

impl FromStr for CopyStatus {
    type Err = CatalogError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "Available" => Ok(CopyStatus::Available),
            "Maintenance" => Ok(CopyStatus::Maintenance),
            "Loaned" => Ok(CopyStatus::Loaned),
            "Reserved" => Ok(CopyStatus::Reserved),
            other => Err(CatalogError::UnknownStatus(other.to_string())),
        }
    }
}

/// A physical, loanable instance of a [`Work`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PhysicalCopy {
    pub id: RecordId,
    pub book: RecordId,
    pub imprint: String,
    #[serde(default)]
    pub status: CopyStatus,
    #[serde(default)]
    pub due_back: Option<Date>,
}

impl PhysicalCopy {
    pub fn due_back_formatted(&self) -> String {
        self.due_back.map(format_medium).unwrap_or_default()
    }
}

impl Entity for PhysicalCopy {
    const KIND: EntityKind = EntityKind::Copy;

    fn id(&self) -> &RecordId {
        &self.id
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CopyDraft {
    pub book: RecordId,
    pub imprint: String,
    pub status: CopyStatus,
    pub due_back: Option<Date>,
}

impl Draft for CopyDraft {
    type Entity = PhysicalCopy;

    fn schema() -> Schema {
        Schema::new(vec![
            FieldRule::text("book").required("Book must be specified."),
            FieldRule::text("imprint").required("Imprint must be specified."),
            FieldRule::text("status")
                .one_of(CopyStatus::CHOICES, "Invalid status.")
                .default_value(CopyStatus::Maintenance.as_str()),
            FieldRule::date("due_back", "Invalid date."),
        ])
    }

    fn from_fields(fields: &Fields) -> Self {
        Self {
            book: RecordId::from(fields.text("book")),
            imprint: fields.text("imprint").to_string(),
            status: fields.text("status").parse().unwrap_or_default(),
            due_back: fields.date("due_back"),
        }
    }

    fn references(&self) -> Vec<Reference> {
        vec![Reference {
            field: "book",
            kind: EntityKind::Work,
            id: self.book.clone(),
        }]
    }
}

/// Ids in first-seen order, repeats dropped.
fn distinct_ids(values: &[String]) -> Vec<RecordId> {
    let mut ids: Vec<RecordId> = Vec::with_capacity(values.len());
    for value in values {
        let id = RecordId::from(value.as_str());
        if !ids.contains(&id) {
            ids.push(id);
        }
    }
    ids
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use time::macros::date;

    fn author(birth: Option<Date>, death: Option<Date>) -> Author {
        Author {
            id: RecordId::from("a1"),
            first_name: "Mary".to_string(),
            family_name: "Shelley".to_string(),
            date_of_birth: birth,
            date_of_death: death,
        }
    }

    #[test]
    fn author_display_name_is_family_first() {
        assert_eq!(author(None, None).name(), "Shelley, Mary");
    }

    #[test]
    fn lifespan_substitutes_unknown() {
        assert_eq!(author(None, None).lifespan(), "Unknown - Unknown");
        assert_eq!(
            author(Some(date!(1797 - 08 - 30)), None).lifespan(),
            "Aug 30, 1797 - Unknown"
        );
        assert_eq!(
            author(Some(date!(1797 - 08 - 30)), Some(date!(1851 - 02 - 01))).lifespan(),
            "Aug 30, 1797 - Feb 1, 1851"
        );
    }

    #[test]
    fn iso_dates_are_empty_when_absent() {
        let a = author(Some(date!(1797 - 08 - 30)), None);
        assert_eq!(a.date_of_birth_iso(), "1797-08-30");
        assert_eq!(a.date_of_death_iso(), "");
    }

    #[test]
    fn urls_follow_kind() {
        let genre = Genre {
            id: RecordId::from("g1"),
            name: "Poetry".to_string(),
        };
        assert_eq!(genre.url(), "/api/catalog/genre/g1");
        assert_eq!(EntityKind::Copy.list_url(), "/api/catalog/copies");
    }

    #[test]
    fn kinds_parse_from_names_and_collections() {
        assert_eq!("genre".parse::<EntityKind>().unwrap(), EntityKind::Genre);
        assert!("shelf".parse::<EntityKind>().is_err());
        assert_eq!(EntityKind::from_collection("copies"), Some(EntityKind::Copy));
        assert_eq!(EntityKind::from_collection("copy"), None);
    }

    #[test]
    fn copy_decodes_with_defaults() {
        let doc = match json!({"id": "c1", "book": "w1", "imprint": "Penguin"}) {
            serde_json::Value::Object(map) => map,
            _ => unreachable!(),
        };
        let copy: PhysicalCopy = decode(doc).unwrap();
        assert_eq!(copy.status, CopyStatus::Maintenance);
        assert_eq!(copy.due_back, None);
        assert_eq!(copy.due_back_formatted(), "");
    }

    #[test]
    fn work_draft_encodes_references_as_ids() {
        let draft = WorkDraft {
            title: "Frankenstein".to_string(),
            summary: "A creature.".to_string(),
            isbn: "9780141439471".to_string(),
            author: RecordId::from("a1"),
            genres: vec![RecordId::from("g1")],
        };
        let doc = encode(&draft).unwrap();
        assert_eq!(doc["author"], "a1");
        assert_eq!(doc["genres"], json!(["g1"]));
        assert_eq!(draft.references().len(), 2);
    }
}
