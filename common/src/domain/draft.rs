use std::fmt;
use std::str::FromStr;
use std::sync::LazyLock;

use chrono::{DateTime, Utc};
use nutype::nutype;
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::domain::{PostId, TagId, UnknownVariant};

/// Default amount of text (title + excerpt + body) that makes a draft worth recovering.
pub const DEFAULT_MIN_SIGNIFICANT_CHARS: usize = 10;

const WORDS_PER_MINUTE: usize = 200;

static SLUG_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[a-z0-9]+(?:-[a-z0-9]+)*$").expect("SLUG_REGEX must be a valid regex"));

/// URL slug of a published post: lowercase ASCII words joined by single dashes.
#[nutype(
    sanitize(trim, lowercase),
    validate(not_empty, len_char_max = 120, regex = SLUG_REGEX),
    derive(
        Clone,
        Debug,
        Display,
        FromStr,
        AsRef,
        PartialEq,
        Eq,
        Hash,
        Serialize,
        Deserialize
    )
)]
pub struct Slug(String);

/// Derives a slug candidate from a title. May be empty for titles without ASCII letters or digits.
pub fn slugify(title: &str) -> String {
    let mut slug = String::with_capacity(title.len());
    for c in title.chars() {
        if c.is_ascii_alphanumeric() {
            slug.push(c.to_ascii_lowercase());
        } else if !slug.is_empty() && !slug.ends_with('-') {
            slug.push('-');
        }
    }
    while slug.ends_with('-') {
        slug.pop();
    }
    slug
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PostStatus {
    #[default]
    Draft,
    Published,
}

impl PostStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            PostStatus::Draft => "draft",
            PostStatus::Published => "published",
        }
    }
}

impl fmt::Display for PostStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PostStatus {
    type Err = UnknownVariant;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "draft" => Ok(PostStatus::Draft),
            "published" => Ok(PostStatus::Published),
            other => Err(UnknownVariant::new("post status", other)),
        }
    }
}

/// Full editable state of a blog post at one point in time.
///
/// The same document can have one snapshot in local ephemeral storage and one
/// in durable storage. They are reconciled by the user, never merged.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DraftSnapshot {
    pub title: String,
    pub slug: String,
    pub excerpt: String,
    pub content: String,
    pub status: PostStatus,
    pub featured: bool,
    pub reading_time_minutes: Option<u32>,
    pub cover_image_url: Option<String>,
    #[serde(default)]
    pub tag_ids: Vec<TagId>,
    pub saved_at: DateTime<Utc>,
}

impl DraftSnapshot {
    /// Defaults of a brand new post.
    pub fn blank(now: DateTime<Utc>) -> Self {
        Self {
            title: String::new(),
            slug: String::new(),
            excerpt: String::new(),
            content: String::new(),
            status: PostStatus::Draft,
            featured: false,
            reading_time_minutes: None,
            cover_image_url: None,
            tag_ids: Vec::new(),
            saved_at: now,
        }
    }

    /// Number of meaningful characters across title, excerpt and body.
    pub fn text_len(&self) -> usize {
        [&self.title, &self.excerpt, &self.content]
            .iter()
            .map(|text| text.trim().chars().count())
            .sum()
    }

    /// Only significant drafts are kept locally, so trivial edits never cause a recovery prompt.
    pub fn is_significant(&self, min_chars: usize) -> bool {
        self.text_len() >= min_chars
            || self
                .cover_image_url
                .as_deref()
                .is_some_and(|url| !url.trim().is_empty())
            || !self.tag_ids.is_empty()
    }

    /// Equal in everything but the time the snapshot was taken.
    pub fn has_same_content(&self, other: &DraftSnapshot) -> bool {
        self.title == other.title
            && self.slug == other.slug
            && self.excerpt == other.excerpt
            && self.content == other.content
            && self.status == other.status
            && self.featured == other.featured
            && self.reading_time_minutes == other.reading_time_minutes
            && self.cover_image_url == other.cover_image_url
            && self.tag_ids == other.tag_ids
    }

    /// Reading time estimate at 200 words per minute, at least one minute for non-empty bodies.
    pub fn estimated_reading_time(&self) -> Option<u32> {
        let words = self.content.split_whitespace().count();
        if words == 0 {
            return None;
        }
        Some(words.div_ceil(WORDS_PER_MINUTE) as u32)
    }
}

/// Identity under which a draft is stored locally.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DraftKey {
    /// A post that was never saved durably
    NewPost,
    Post(PostId),
}

impl DraftKey {
    pub fn storage_key(&self) -> String {
        match self {
            DraftKey::NewPost => "blog-draft-new".to_string(),
            DraftKey::Post(id) => format!("blog-draft-{}", id),
        }
    }

    pub fn post_id(&self) -> Option<PostId> {
        match self {
            DraftKey::NewPost => None,
            DraftKey::Post(id) => Some(*id),
        }
    }
}

impl From<Option<PostId>> for DraftKey {
    fn from(value: Option<PostId>) -> Self {
        value.map_or(DraftKey::NewPost, DraftKey::Post)
    }
}
