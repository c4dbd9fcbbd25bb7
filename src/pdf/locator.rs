//! Document locators

use std::fmt;
use std::path::Path;

/// Errors raised while building a [`DocumentLocator`]
#[derive(Debug, PartialEq, Eq, thiserror::Error)]
pub enum LocatorError {
    #[error("document locator must not be empty")]
    Empty,

    #[error("file id must not be empty")]
    EmptyFileId,
}

/// Opaque, non-blank identifier of a document to render. The string is kept
/// exactly as given.
///
/// A locator with an `http://` or `https://` scheme is fetched over the
/// network; anything else is treated as a local filesystem path.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct DocumentLocator(String);

/// Where the bytes behind a locator live
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DocumentSource<'a> {
    Remote(&'a str),
    Local(&'a Path),
}

impl DocumentLocator {
    pub fn new(locator: impl Into<String>) -> Result<Self, LocatorError> {
        let locator = locator.into();
        if locator.trim().is_empty() {
            return Err(LocatorError::Empty);
        }
        Ok(Self(locator))
    }

    /// Locator for the content of a stored file, served by the API at
    /// `<base>/files/<id>/content`.
    pub fn for_file(api_base: &str, file_id: &str) -> Result<Self, LocatorError> {
        let file_id = file_id.trim();
        if file_id.is_empty() {
            return Err(LocatorError::EmptyFileId);
        }
        let base = api_base.trim().trim_end_matches('/');
        Self::new(format!("{base}/files/{file_id}/content"))
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    #[must_use]
    pub fn source(&self) -> DocumentSource<'_> {
        let lower = self.0.get(..8).unwrap_or(&self.0).to_ascii_lowercase();
        if lower.starts_with("http://") || lower.starts_with("https://") {
            DocumentSource::Remote(&self.0)
        } else {
            DocumentSource::Local(Path::new(&self.0))
        }
    }
}

impl fmt::Display for DocumentLocator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
