//! Capabilities the render driver consumes but does not implement

use super::error::RenderError;
use super::locator::DocumentLocator;
use super::types::{PageSize, RasterSurface, Viewport};

/// Opens documents.
///
/// The provider is shared with every cycle's worker thread. The handles it
/// returns are created and consumed on that thread, so they need not be
/// `Send`.
pub trait DocumentProvider: Send + Sync {
    type Document: DocumentHandle;

    /// Fetch and parse the document behind `locator`
    fn open(&self, locator: &DocumentLocator) -> Result<Self::Document, RenderError>;
}

/// An opened document, owned by exactly one render cycle
pub trait DocumentHandle {
    type Page: PageHandle;

    fn page_count(&self) -> Result<usize, RenderError>;

    /// Load the page at a 1-based index
    fn page(&self, number: usize) -> Result<Self::Page, RenderError>;
}

/// One loaded page; discarded once its raster is produced
pub trait PageHandle {
    /// Page number (1-indexed)
    fn number(&self) -> usize;

    fn intrinsic_size(&self) -> Result<PageSize, RenderError>;
}

/// Draws a page into a caller-allocated surface
pub trait Rasterizer<P: PageHandle>: Send + Sync {
    fn rasterize(
        &self,
        page: &P,
        viewport: &Viewport,
        target: &mut RasterSurface,
    ) -> Result<(), RenderError>;
}
