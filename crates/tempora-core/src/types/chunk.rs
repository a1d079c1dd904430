//! Document chunks supplied by the text source.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Date format used when rendering a chunk header.
pub const CHUNK_DATE_FORMAT: &str = "%B %d, %Y %H:%M UTC";

/// A chunk of a source document, as delivered by the text source.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DocumentChunk {
    #[serde(default)]
    pub title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub author: Option<String>,
    #[serde(default)]
    pub source: String,
    /// ISO-8601 publication timestamp.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub published_at: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
    #[serde(alias = "chunk")]
    pub chunk_text: String,
    #[serde(default, alias = "chunk_idx")]
    pub chunk_index: usize,
}

impl DocumentChunk {
    /// Create a chunk from bare text.
    pub fn from_text(text: impl Into<String>) -> Self {
        Self {
            chunk_text: text.into(),
            ..Default::default()
        }
    }

    /// Set the publication timestamp.
    pub fn with_published_at(mut self, published_at: impl Into<String>) -> Self {
        self.published_at = Some(published_at.into());
        self
    }

    /// Set the URL.
    pub fn with_url(mut self, url: impl Into<String>) -> Self {
        self.url = Some(url.into());
        self
    }

    /// Parsed publication time, if present and valid.
    pub fn published_time(&self) -> Option<DateTime<Utc>> {
        self.published_at
            .as_deref()
            .and_then(|s| DateTime::parse_from_rfc3339(s.trim()).ok())
            .map(|dt| dt.with_timezone(&Utc))
    }

    /// Acquisition timestamp: publication time, or `fallback` when absent.
    pub fn acquired_at(&self, fallback: DateTime<Utc>) -> DateTime<Utc> {
        self.published_time().unwrap_or(fallback)
    }

    /// Render the chunk as the text handed to the extraction model.
    ///
    /// Header fields come first, one per paragraph; author, category and URL
    /// are only included when present.
    pub fn render(&self) -> String {
        let published = match (self.published_time(), self.published_at.as_deref()) {
            (Some(dt), _) => dt.format(CHUNK_DATE_FORMAT).to_string(),
            (None, Some(raw)) => raw.to_string(),
            (None, None) => "Unknown date".to_string(),
        };

        let mut parts = vec![
            format!("Title: {}", self.title.trim()),
            format!("Date: {}", published),
            format!("Source: {}", self.source.trim()),
        ];

        if let Some(author) = non_blank(self.author.as_deref()) {
            parts.push(format!("Author: {}", author));
        }
        if let Some(category) = non_blank(self.category.as_deref()) {
            parts.push(format!("Category: {}", category));
        }
        if let Some(url) = non_blank(self.url.as_deref()) {
            parts.push(format!("URL: {}", url));
        }

        let text = self.chunk_text.trim().replace('\n', " ");
        parts.push(format!("Chunk Text: {}", text));

        parts.join("\n\n")
    }

    /// Stable identifier derived from the rendered text.
    pub fn chunk_id(&self) -> String {
        format!("chunk-{:x}", md5::compute(self.render().as_bytes()))
    }
}

fn non_blank(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|v| !v.is_empty())
}

/// A chunk as persisted by the graph store and returned by retrieval.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredChunk {
    pub chunk_id: String,
    /// Rendered chunk text.
    pub content: String,
    /// URL or file path of the originating document.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file_path: Option<String>,
    pub acquired_at: DateTime<Utc>,
}

impl StoredChunk {
    /// Build the stored form of a document chunk.
    pub fn from_document(chunk: &DocumentChunk, fallback: DateTime<Utc>) -> Self {
        Self {
            chunk_id: chunk.chunk_id(),
            content: chunk.render(),
            file_path: non_blank(chunk.url.as_deref()).map(str::to_string),
            acquired_at: chunk.acquired_at(fallback),
        }
    }

    /// Identifier used in citations.
    pub fn citation_id(&self) -> &str {
        self.file_path.as_deref().unwrap_or(&self.chunk_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> DocumentChunk {
        DocumentChunk {
            title: " Sprint record ".to_string(),
            author: Some("A. Writer".to_string()),
            source: "Sports Daily".to_string(),
            published_at: Some("2024-07-29T08:30:00Z".to_string()),
            url: Some("https://news.example/sprint".to_string()),
            category: None,
            chunk_text: "Noah Carter broke\nthe record.".to_string(),
            chunk_index: 0,
        }
    }

    #[test]
    fn test_render_includes_present_fields() {
        let rendered = sample().render();
        assert_eq!(
            rendered,
            "Title: Sprint record\n\nDate: July 29, 2024 08:30 UTC\n\nSource: Sports Daily\n\n\
             Author: A. Writer\n\nURL: https://news.example/sprint\n\n\
             Chunk Text: Noah Carter broke the record."
        );
    }

    #[test]
    fn test_render_keeps_unparseable_date() {
        let chunk = DocumentChunk::from_text("x").with_published_at("last Tuesday");
        assert!(chunk.render().contains("Date: last Tuesday"));
        assert!(chunk.published_time().is_none());
    }

    #[test]
    fn test_chunk_id_is_stable() {
        assert_eq!(sample().chunk_id(), sample().chunk_id());
        assert!(sample().chunk_id().starts_with("chunk-"));
    }

    #[test]
    fn test_deserialize_source_field_names() {
        let json = r#"{"title": "t", "source": "s", "chunk": "body", "chunk_idx": 3}"#;
        let chunk: DocumentChunk = serde_json::from_str(json).unwrap();
        assert_eq!(chunk.chunk_text, "body");
        assert_eq!(chunk.chunk_index, 3);
    }

    #[test]
    fn test_stored_chunk_citation() {
        let stored = StoredChunk::from_document(&sample(), Utc::now());
        assert_eq!(stored.citation_id(), "https://news.example/sprint");
        assert_eq!(stored.acquired_at, sample().published_time().unwrap());
    }
}
