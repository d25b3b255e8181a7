//! Content negotiation for route selection.
//!
//! Parses `Accept` headers into quality-ordered media types so the
//! dispatcher can prefer a more specific content-type match when several
//! routes share one URL.

use std::cmp::Ordering;
use std::fmt;

/// Represents a media type (MIME type) without parameters.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MediaType {
    /// The type (e.g., "application", "text")
    pub type_: String,
    /// The subtype (e.g., "json", "html")
    pub subtype: String,
}

impl MediaType {
    /// Create a new media type.
    pub fn new(type_: impl Into<String>, subtype: impl Into<String>) -> Self {
        Self {
            type_: type_.into(),
            subtype: subtype.into(),
        }
    }

    /// Create `application/json` media type.
    pub fn json() -> Self {
        Self::new("application", "json")
    }

    /// Create `text/html` media type.
    pub fn html() -> Self {
        Self::new("text", "html")
    }

    /// Create `text/plain` media type.
    pub fn plain_text() -> Self {
        Self::new("text", "plain")
    }

    /// Create `*/*` wildcard media type.
    pub fn any() -> Self {
        Self::new("*", "*")
    }

    /// Parse a media type from a string, ignoring any parameters.
    pub fn parse(s: &str) -> Option<Self> {
        let type_subtype = s.trim().split(';').next()?.trim();
        let mut parts = type_subtype.splitn(2, '/');

        let type_ = parts.next()?.trim().to_lowercase();
        let subtype = parts.next()?.trim().to_lowercase();
        if type_.is_empty() || subtype.is_empty() {
            return None;
        }

        Some(Self { type_, subtype })
    }

    /// Check if this media type matches another (considering wildcards).
    pub fn matches(&self, other: &MediaType) -> bool {
        let type_matches = self.type_ == "*" || other.type_ == "*" || self.type_ == other.type_;
        let subtype_matches =
            self.subtype == "*" || other.subtype == "*" || self.subtype == other.subtype;
        type_matches && subtype_matches
    }

    /// Get the full MIME type string.
    pub fn mime_type(&self) -> String {
        format!("{}/{}", self.type_, self.subtype)
    }
}

impl fmt::Display for MediaType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.type_, self.subtype)
    }
}

/// A parsed `Accept` header with quality values, sorted by preference.
#[derive(Debug, Clone)]
pub struct Accept {
    /// Media types with their quality values, highest preference first.
    pub media_types: Vec<(MediaType, f32)>,
}

impl Accept {
    /// An Accept header that accepts anything.
    pub fn new() -> Self {
        Self {
            media_types: vec![(MediaType::any(), 1.0)],
        }
    }

    /// Parse an Accept header string.
    ///
    /// Entries are sorted by descending quality, then by specificity,
    /// so `quality_for` can return the first matching entry's weight.
    pub fn parse(header: &str) -> Self {
        let mut media_types: Vec<(MediaType, f32)> = header
            .split(',')
            .filter_map(|part| {
                let part = part.trim();
                if part.is_empty() {
                    return None;
                }

                let (media_part, quality) = Self::extract_quality(part);
                MediaType::parse(media_part).map(|mt| (mt, quality))
            })
            .collect();

        media_types.sort_by(|a, b| {
            match b.1.partial_cmp(&a.1) {
                Some(Ordering::Equal) | None => {}
                Some(ord) => return ord,
            }
            Self::specificity(&b.0).cmp(&Self::specificity(&a.0))
        });

        Self { media_types }
    }

    /// Extract the quality value from a media type string.
    fn extract_quality(s: &str) -> (&str, f32) {
        if let Some(q_pos) = s.to_lowercase().find(";q=") {
            let media_part = &s[..q_pos];
            let q_part = &s[q_pos + 3..];

            let quality = q_part
                .split(';')
                .next()
                .and_then(|q| q.trim().parse::<f32>().ok())
                .unwrap_or(1.0)
                .clamp(0.0, 1.0);

            (media_part, quality)
        } else {
            (s, 1.0)
        }
    }

    /// Specificity of a media type; concrete types beat wildcards.
    fn specificity(mt: &MediaType) -> u8 {
        let mut score = 0u8;
        if mt.type_ != "*" {
            score += 2;
        }
        if mt.subtype != "*" {
            score += 1;
        }
        score
    }

    /// Get the quality value the client assigned to a media type.
    pub fn quality_for(&self, media_type: &MediaType) -> f32 {
        for (mt, quality) in &self.media_types {
            if mt.matches(media_type) {
                return *quality;
            }
        }
        0.0
    }

    /// The client's most preferred media type, if any.
    pub fn preferred(&self) -> Option<&MediaType> {
        self.media_types.first().map(|(mt, _)| mt)
    }
}

impl Default for Accept {
    fn default() -> Self {
        Self::new()
    }
}
