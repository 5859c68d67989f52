//! Structured metadata derivation for corpus files.
//!
//! Everything here is derived from the file's path and the already-extracted
//! text. The collection a file lives under decides its content type; content
//! is never inspected to classify a document, since the three families read
//! similarly enough to misclassify each other. Missing patterns leave the
//! optional fields unset rather than failing.

#[cfg(test)]
mod tests;

use fancy_regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ContentType {
    Email,
    Post,
    Quote,
    Main,
}

impl ContentType {
    #[inline]
    pub fn as_str(self) -> &'static str {
        match self {
            ContentType::Email => "email",
            ContentType::Post => "post",
            ContentType::Quote => "quote",
            ContentType::Main => "main",
        }
    }

    #[inline]
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "email" => Some(ContentType::Email),
            "post" => Some(ContentType::Post),
            "quote" => Some(ContentType::Quote),
            "main" => Some(ContentType::Main),
            _ => None,
        }
    }

}

impl fmt::Display for ContentType {
    #[inline]
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Fixed metadata record carried by every chunk of a document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DocumentMetadata {
    pub source_file: String,
    /// File stem, used as the display name in citations.
    pub filename: String,
    pub content_type: ContentType,
    pub collection: String,
    pub sequence_number: Option<String>,
    pub title: Option<String>,
    pub source_url: Option<String>,
    pub date: Option<String>,
}

impl DocumentMetadata {
    /// Present fields as key/value pairs, for the CSV chunk export.
    #[inline]
    pub fn to_key_values(&self) -> Vec<(&'static str, String)> {
        let mut pairs = vec![
            ("collection", self.collection.clone()),
            ("content_type", self.content_type.as_str().to_string()),
            ("filename", self.filename.clone()),
            ("source_file", self.source_file.clone()),
        ];
        if let Some(date) = &self.date {
            pairs.push(("date", date.clone()));
        }
        if let Some(sequence) = &self.sequence_number {
            pairs.push(("sequence_number", sequence.clone()));
        }
        if let Some(url) = &self.source_url {
            pairs.push(("source_url", url.clone()));
        }
        if let Some(title) = &self.title {
            pairs.push(("title", title.clone()));
        }
        pairs
    }
}

/// Derives [`DocumentMetadata`] from a file path and its extracted text.
pub struct MetadataResolver {
    base_url: String,
    filename_pattern: Regex,
}

impl MetadataResolver {
    #[inline]
    pub fn new(base_url: &str) -> Self {
        Self {
            base_url: base_url.to_string(),
            filename_pattern: Regex::new(r"^(?:email|post|quote)_(\d+)_(.+)$")
                .expect("valid filename pattern"),
        }
    }

    /// Resolve metadata for one document. Deterministic for a fixed
    /// (path, text) pair; fails only by omission.
    #[inline]
    pub fn resolve(&self, path: &Path, text: &str) -> DocumentMetadata {
        let filename = path
            .file_stem()
            .map(|stem| stem.to_string_lossy().into_owned())
            .unwrap_or_default();

        let content_type = content_type_from_path(path);

        let (sequence_number, title) = self.parse_filename(&filename);
        let source_url = self.find_source_url(text);
        let date = find_date(text);

        DocumentMetadata {
            source_file: path.to_string_lossy().into_owned(),
            filename,
            content_type,
            collection: collection_name(content_type).to_string(),
            sequence_number,
            title,
            source_url,
            date,
        }
    }

    /// `<family>_<sequence>_<title>` filenames yield a sequence number and a
    /// human-readable title; anything else yields neither.
    fn parse_filename(&self, filename: &str) -> (Option<String>, Option<String>) {
        match self.filename_pattern.captures(filename) {
            Ok(Some(captures)) => {
                let sequence = captures.get(1).map(|m| m.as_str().to_string());
                let title = captures
                    .get(2)
                    .map(|m| m.as_str().replace('_', " "));
                (sequence, title)
            }
            _ => (None, None),
        }
    }

    /// First `Source:` line carrying the archive's canonical prefix; the URL
    /// runs to the next whitespace or end of line.
    fn find_source_url(&self, text: &str) -> Option<String> {
        text.lines()
            .map(str::trim)
            .filter(|line| line.starts_with("Source:"))
            .find_map(|line| {
                line.split_whitespace()
                    .find(|token| token.starts_with(&self.base_url))
                    .map(str::to_string)
            })
    }
}

/// First `Date: |` line yields the remainder as the document date.
fn find_date(text: &str) -> Option<String> {
    text.lines()
        .map(str::trim)
        .find_map(|line| line.strip_prefix("Date: |"))
        .map(|rest| rest.trim().to_string())
}

fn content_type_from_path(path: &Path) -> ContentType {
    let has_component = |name: &str| {
        path.components()
            .any(|component| component.as_os_str() == name)
    };

    if has_component("emails") {
        ContentType::Email
    } else if has_component("posts") {
        ContentType::Post
    } else if has_component("quotes") {
        ContentType::Quote
    } else {
        ContentType::Main
    }
}

fn collection_name(content_type: ContentType) -> &'static str {
    match content_type {
        ContentType::Email => "emails",
        ContentType::Post => "posts",
        ContentType::Quote => "quotes",
        ContentType::Main => "main",
    }
}
