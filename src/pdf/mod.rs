//! PDF rendering infrastructure

mod cycle;
mod driver;
mod engine;
mod error;
mod export;
mod locator;
#[cfg(feature = "pdf")]
mod mupdf_backend;
mod provider;
mod state;
mod types;

pub use cycle::{CancelToken, Cancelled, CycleId};
pub use driver::{RenderCycle, RenderDriver};
pub use engine::{EngineConfig, Tint};
pub use error::RenderError;
pub use export::{ExportError, page_file_name, write_pages};
pub use locator::{DocumentLocator, DocumentSource, LocatorError};
#[cfg(feature = "pdf")]
pub use mupdf_backend::{MuPdfDocument, MuPdfPage, MuPdfProvider, MuPdfRasterizer};
pub use provider::{DocumentHandle, DocumentProvider, PageHandle, Rasterizer};
pub use state::{FAILED_MESSAGE, RenderState};
pub use types::*;
