//! Location results carried by the terminal `final_res` event.

use serde::{Deserialize, Deserializer, Serialize};
use thiserror::Error;

/// A single resource returned by the backend. Only `address` is guaranteed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LocationResult {
    pub address: String,
    #[serde(default, deserialize_with = "blank_as_none", skip_serializing_if = "Option::is_none")]
    pub phone: Option<String>,
    #[serde(default, deserialize_with = "blank_as_none", skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(default, deserialize_with = "blank_as_none", skip_serializing_if = "Option::is_none")]
    pub website: Option<String>,
}

impl LocationResult {
    #[must_use]
    pub fn new(address: impl Into<String>) -> Self {
        Self {
            address: address.into(),
            phone: None,
            email: None,
            website: None,
        }
    }

    /// Website without its `http://` or `https://` scheme, for display.
    #[must_use]
    pub fn website_display(&self) -> Option<&str> {
        self.website.as_deref().map(|site| {
            site.strip_prefix("https://")
                .or_else(|| site.strip_prefix("http://"))
                .unwrap_or(site)
        })
    }
}

/// Backends sometimes send `""` or `null` for missing contact details.
fn blank_as_none<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = Option::<String>::deserialize(deserializer)?;
    Ok(raw.and_then(|value| {
        let trimmed = value.trim();
        if trimmed.is_empty() {
            None
        } else {
            Some(trimmed.to_owned())
        }
    }))
}

/// The ordered result list of one submission.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FinalResultSet {
    pub addresses: Vec<LocationResult>,
}

#[derive(Debug, Error)]
#[error("final result is not a valid addresses record: {source}")]
pub struct ResultParseError {
    #[from]
    source: serde_json::Error,
}

impl FinalResultSet {
    /// Parses the JSON text carried in `final_res.message`.
    ///
    /// # Errors
    ///
    /// Returns [`ResultParseError`] if `message` is not JSON of the shape
    /// `{ "addresses": [...] }`.
    pub fn from_message(message: &str) -> Result<Self, ResultParseError> {
        Ok(serde_json::from_str(message)?)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.addresses.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.addresses.is_empty()
    }
}
