//! Upload metadata for publication.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use validator::Validate;

use crate::error::ModelError;

/// Default platform category ("People & Blogs").
pub const DEFAULT_CATEGORY_ID: &str = "22";

/// Visibility of a published video.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema, Default)]
#[serde(rename_all = "lowercase")]
pub enum PrivacyStatus {
    #[default]
    Private,
    Unlisted,
    Public,
}

impl PrivacyStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            PrivacyStatus::Private => "private",
            PrivacyStatus::Unlisted => "unlisted",
            PrivacyStatus::Public => "public",
        }
    }
}

impl fmt::Display for PrivacyStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PrivacyStatus {
    type Err = ModelError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "private" => Ok(PrivacyStatus::Private),
            "unlisted" => Ok(PrivacyStatus::Unlisted),
            "public" => Ok(PrivacyStatus::Public),
            other => Err(ModelError::invalid_metadata(format!(
                "unknown privacy status '{}'",
                other
            ))),
        }
    }
}

/// Title, description and publishing options for one video.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema, Validate)]
pub struct UploadMetadata {
    #[validate(length(min = 1, max = 100))]
    pub title: String,

    #[serde(default)]
    #[validate(length(max = 5000))]
    pub description: String,

    #[serde(default = "default_category_id")]
    #[validate(length(min = 1))]
    pub category_id: String,

    #[serde(default)]
    pub keywords: Vec<String>,

    #[serde(default)]
    pub privacy: PrivacyStatus,

    #[serde(default)]
    pub made_for_kids: bool,
}

fn default_category_id() -> String {
    DEFAULT_CATEGORY_ID.to_string()
}

impl UploadMetadata {
    /// Metadata with the given title and every other field defaulted.
    pub fn new(title: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            description: String::new(),
            category_id: default_category_id(),
            keywords: Vec::new(),
            privacy: PrivacyStatus::default(),
            made_for_kids: false,
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn with_keywords(mut self, keywords: Vec<String>) -> Self {
        self.keywords = keywords;
        self
    }

    pub fn with_privacy(mut self, privacy: PrivacyStatus) -> Self {
        self.privacy = privacy;
        self
    }

    pub fn with_category(mut self, category_id: impl Into<String>) -> Self {
        self.category_id = category_id.into();
        self
    }

    /// Split a comma-separated keyword string, dropping blanks.
    pub fn parse_keywords(raw: &str) -> Vec<String> {
        raw.split(',')
            .map(str::trim)
            .filter(|k| !k.is_empty())
            .map(str::to_string)
            .collect()
    }

    /// Field validation plus the non-blank title rule.
    pub fn check(&self) -> Result<(), ModelError> {
        if self.title.trim().is_empty() {
            return Err(ModelError::invalid_metadata("title is required"));
        }
        self.validate()
            .map_err(|e| ModelError::invalid_metadata(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let meta = UploadMetadata::new("My short");
        assert_eq!(meta.category_id, "22");
        assert_eq!(meta.privacy, PrivacyStatus::Private);
        assert!(!meta.made_for_kids);
        assert!(meta.check().is_ok());
    }

    #[test]
    fn test_blank_title_rejected() {
        assert!(UploadMetadata::new("").check().is_err());
        assert!(UploadMetadata::new("   ").check().is_err());
    }

    #[test]
    fn test_overlong_title_rejected() {
        let meta = UploadMetadata::new("x".repeat(101));
        assert!(matches!(meta.check(), Err(ModelError::InvalidMetadata(_))));
    }

    #[test]
    fn test_parse_keywords() {
        assert_eq!(
            UploadMetadata::parse_keywords("shorts, funny ,, cats"),
            vec!["shorts", "funny", "cats"]
        );
        assert!(UploadMetadata::parse_keywords("").is_empty());
    }

    #[test]
    fn test_privacy_parse() {
        assert_eq!("Public".parse::<PrivacyStatus>().unwrap(), PrivacyStatus::Public);
        assert!("secret".parse::<PrivacyStatus>().is_err());
    }

    #[test]
    fn test_deserialize_with_defaults() {
        let meta: UploadMetadata = serde_json::from_str(r#"{"title":"t"}"#).unwrap();
        assert_eq!(meta.category_id, "22");
        assert!(meta.keywords.is_empty());
    }
}
