//! Errors from document providers and rasterizers

use crate::api::ApiError;

/// Failure inside a render cycle.
///
/// The driver collapses every variant into [`super::RenderState::Failed`];
/// the detail only reaches the log.
#[derive(Debug, thiserror::Error)]
pub enum RenderError {
    /// Document could not be retrieved or parsed
    #[error("could not open {locator}: {detail}")]
    Fetch { locator: String, detail: String },

    /// A specific page failed to rasterize (page is 1-indexed)
    #[error("page {page}: {detail}")]
    PageRender { page: usize, detail: String },

    #[cfg(feature = "pdf")]
    #[error("PDF engine: {0}")]
    Pdf(#[from] mupdf::error::Error),

    #[error("document download: {0}")]
    Api(#[from] ApiError),
}

impl RenderError {
    pub fn fetch(locator: impl ToString, detail: impl Into<String>) -> Self {
        Self::Fetch {
            locator: locator.to_string(),
            detail: detail.into(),
        }
    }

    pub fn page(page: usize, detail: impl Into<String>) -> Self {
        Self::PageRender {
            page,
            detail: detail.into(),
        }
    }
}
