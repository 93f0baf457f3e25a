//! Feature identifier validation
//!
//! SWORD identifiers are opaque to the retrieval engine. They are trimmed and
//! checked for characters that would corrupt a query string; nothing else is
//! assumed about their shape.

use crate::FeatureType;
use std::fmt;

/// Length of a SWORD reach id (e.g. `63470800171`)
pub const REACH_ID_LEN: usize = 11;

/// Length of a SWORD node id (e.g. `63470800170011`)
pub const NODE_ID_LEN: usize = 14;

/// Validated feature identifier
///
/// # Examples
///
/// ```
/// use hydrocron_downloader::identifier::FeatureId;
/// use hydrocron_downloader::FeatureType;
///
/// let id = FeatureId::parse(" 63470800171 ").unwrap();
/// assert_eq!(id.as_str(), "63470800171");
/// assert_eq!(id.infer_type(), Some(FeatureType::Reach));
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct FeatureId(String);

impl FeatureId {
    /// Parse and validate an identifier string
    ///
    /// # Errors
    ///
    /// Returns an error if the id is empty after trimming or contains
    /// whitespace, control characters or query delimiters (`,` `&` `=` `#`).
    pub fn parse(s: &str) -> Result<Self, IdentifierError> {
        let id = s.trim();
        if id.is_empty() {
            return Err(IdentifierError::Empty);
        }

        if let Some(bad) = id
            .chars()
            .find(|c| c.is_whitespace() || c.is_control() || matches!(c, ',' | '&' | '=' | '#'))
        {
            return Err(IdentifierError::InvalidCharacter {
                id: id.to_string(),
                character: bad,
            });
        }

        Ok(Self(id.to_string()))
    }

    /// Borrow the identifier text
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// SWORD feature type implied by the id shape, if recognisable
    pub fn infer_type(&self) -> Option<FeatureType> {
        if !self.0.chars().all(|c| c.is_ascii_digit()) {
            return None;
        }

        match self.0.len() {
            REACH_ID_LEN => Some(FeatureType::Reach),
            NODE_ID_LEN => Some(FeatureType::Node),
            _ => None,
        }
    }

    /// Whether the id looks like a SWORD id of the given type
    pub fn matches_type(&self, feature_type: FeatureType) -> bool {
        self.infer_type() == Some(feature_type)
    }
}

impl fmt::Display for FeatureId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for FeatureId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// Errors that can occur during identifier validation
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum IdentifierError {
    /// Empty identifier
    #[error("feature id cannot be empty")]
    Empty,

    /// Identifier contains a character that cannot be sent as a query value
    #[error("feature id {id:?} contains invalid character {character:?}")]
    InvalidCharacter {
        /// Offending identifier
        id: String,
        /// First invalid character
        character: char,
    },
}
