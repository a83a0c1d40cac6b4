//! Diesel models for database tables.
//!
//! These structs map directly to database tables and are used for
//! Diesel queries. They are separate from domain models to allow
//! for different representations (e.g., JSON text vs parsed values).

use diesel::prelude::*;

use crate::schema::{contents, discussions, sources};

/// Source record from the database.
#[derive(Debug, Clone, Queryable, Selectable, Identifiable)]
#[diesel(table_name = sources)]
#[diesel(check_for_backend(diesel::sqlite::Sqlite))]
pub struct SourceRecord {
    pub id: i32,
    pub source_type: String,
    pub name: String,
    pub config: String,
    pub enabled: i32,
    pub created_at: String,
    pub last_fetched_at: Option<String>,
}

/// New source for insertion.
#[derive(Insertable)]
#[diesel(table_name = sources)]
pub struct NewSource<'a> {
    pub source_type: &'a str,
    pub name: &'a str,
    pub config: &'a str,
    pub enabled: i32,
    pub created_at: &'a str,
}

/// Content record from the database.
#[derive(Debug, Clone, Queryable, Selectable, Identifiable)]
#[diesel(table_name = contents)]
#[diesel(check_for_backend(diesel::sqlite::Sqlite))]
pub struct ContentRecord {
    pub id: i32,
    pub canonical_url: String,
    pub domain: Option<String>,
    pub title: Option<String>,
    pub body_text: Option<String>,
    pub raw_html_ref: Option<String>,
    pub fetch_status: String,
    pub fetch_error: Option<String>,
    pub fetched_at: Option<String>,
    pub created_at: String,
    pub transcription_status: Option<String>,
    pub transcription_error: Option<String>,
    pub detected_language: Option<String>,
    pub enriched_at: Option<String>,
}

/// New content for insertion.
#[derive(Insertable)]
#[diesel(table_name = contents)]
pub struct NewContent<'a> {
    pub canonical_url: &'a str,
    pub domain: Option<&'a str>,
    pub fetch_status: &'a str,
    pub created_at: &'a str,
}

/// Discussion record from the database.
#[derive(Debug, Clone, Queryable, Selectable, Identifiable)]
#[diesel(table_name = discussions)]
#[diesel(check_for_backend(diesel::sqlite::Sqlite))]
pub struct DiscussionRecord {
    pub id: i32,
    pub source_id: i32,
    pub content_id: Option<i32>,
    pub source_type: String,
    pub external_id: String,
    pub title: Option<String>,
    pub author: Option<String>,
    pub url: Option<String>,
    pub content_text: Option<String>,
    pub published_at: Option<String>,
    pub fetched_at: String,
    pub meta: String,
    pub comments_status: Option<String>,
    pub comments_json: Option<String>,
    pub score: Option<i32>,
    pub comment_count: Option<i32>,
}

/// New discussion for insertion.
#[derive(Insertable)]
#[diesel(table_name = discussions)]
pub struct NewDiscussion<'a> {
    pub source_id: i32,
    pub content_id: Option<i32>,
    pub source_type: &'a str,
    pub external_id: &'a str,
    pub title: Option<&'a str>,
    pub author: Option<&'a str>,
    pub url: Option<&'a str>,
    pub content_text: Option<&'a str>,
    pub published_at: Option<&'a str>,
    pub fetched_at: &'a str,
    pub meta: &'a str,
    pub comments_status: Option<&'a str>,
    pub score: Option<i32>,
    pub comment_count: Option<i32>,
}

/// Columns rewritten when a discussion is seen again.
///
/// The outer `Option` selects the column, the inner one is the value
/// (`Some(None)` writes NULL).
#[derive(Debug, Default, AsChangeset)]
#[diesel(table_name = discussions)]
pub struct DiscussionChangeset<'a> {
    pub title: Option<Option<&'a str>>,
    pub author: Option<Option<&'a str>>,
    pub url: Option<Option<&'a str>>,
    pub content_text: Option<Option<&'a str>>,
    pub meta: Option<&'a str>,
    pub score: Option<Option<i32>>,
    pub comment_count: Option<Option<i32>>,
}

impl DiscussionChangeset<'_> {
    pub fn is_empty(&self) -> bool {
        self.title.is_none()
            && self.author.is_none()
            && self.url.is_none()
            && self.content_text.is_none()
            && self.meta.is_none()
            && self.score.is_none()
            && self.comment_count.is_none()
    }
}
