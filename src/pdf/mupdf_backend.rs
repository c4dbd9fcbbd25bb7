//! MuPDF-backed document provider and rasterizer

use log::debug;
use mupdf::{Colorspace, Document, Matrix, Page, Pixmap};

use super::engine::EngineConfig;
use super::error::RenderError;
use super::locator::{DocumentLocator, DocumentSource};
use super::provider::{DocumentHandle, DocumentProvider, PageHandle, Rasterizer};
use super::types::{PageSize, RGB_CHANNELS, RasterSurface, Viewport};
use crate::api::ApiClient;

const PDF_MIME: &str = "application/pdf";

/// Opens local files directly and downloads remote ones through the API
/// client, so stored files carry the session cookie.
pub struct MuPdfProvider {
    api: ApiClient,
}

impl MuPdfProvider {
    #[must_use]
    pub fn new(api: ApiClient) -> Self {
        Self { api }
    }
}

impl DocumentProvider for MuPdfProvider {
    type Document = MuPdfDocument;

    fn open(&self, locator: &DocumentLocator) -> Result<MuPdfDocument, RenderError> {
        let doc = match locator.source() {
            DocumentSource::Local(path) => Document::open(path.to_string_lossy().as_ref())
                .map_err(|e| RenderError::fetch(locator, e.to_string()))?,
            DocumentSource::Remote(url) => {
                let bytes = self.api.download(url)?;
                debug!("Downloaded {} bytes from {url}", bytes.len());
                Document::from_bytes(&bytes, PDF_MIME)
                    .map_err(|e| RenderError::fetch(locator, e.to_string()))?
            }
        };

        Ok(MuPdfDocument { doc })
    }
}

pub struct MuPdfDocument {
    doc: Document,
}

impl DocumentHandle for MuPdfDocument {
    type Page = MuPdfPage;

    fn page_count(&self) -> Result<usize, RenderError> {
        let count = self.doc.page_count()?;
        Ok(usize::try_from(count).unwrap_or(0))
    }

    fn page(&self, number: usize) -> Result<MuPdfPage, RenderError> {
        let index = number
            .checked_sub(1)
            .and_then(|i| i32::try_from(i).ok())
            .ok_or_else(|| RenderError::page(number, "page index out of range"))?;
        let page = self
            .doc
            .load_page(index)
            .map_err(|e| RenderError::page(number, e.to_string()))?;
        Ok(MuPdfPage { page, number })
    }
}

pub struct MuPdfPage {
    page: Page,
    number: usize,
}

impl PageHandle for MuPdfPage {
    fn number(&self) -> usize {
        self.number
    }

    fn intrinsic_size(&self) -> Result<PageSize, RenderError> {
        let bounds = self
            .page
            .bounds()
            .map_err(|e| RenderError::page(self.number, e.to_string()))?;
        Ok(PageSize::new(bounds.x1 - bounds.x0, bounds.y1 - bounds.y0))
    }
}

pub struct MuPdfRasterizer {
    config: EngineConfig,
}

impl MuPdfRasterizer {
    #[must_use]
    pub fn new(config: EngineConfig) -> Self {
        Self { config }
    }
}

impl Rasterizer<MuPdfPage> for MuPdfRasterizer {
    fn rasterize(
        &self,
        page: &MuPdfPage,
        viewport: &Viewport,
        target: &mut RasterSurface,
    ) -> Result<(), RenderError> {
        let number = page.number;
        let transform = Matrix::new_scale(viewport.scale, viewport.scale);
        let rgb = Colorspace::device_rgb();
        let mut pixmap = page
            .page
            .to_pixmap(&transform, &rgb, false, self.config.show_extras)
            .map_err(|e| RenderError::page(number, e.to_string()))?;

        if let Some(tint) = self.config.tint {
            pixmap
                .tint(tint.ink, tint.paper)
                .map_err(|e| RenderError::page(number, e.to_string()))?;
        }

        copy_pixmap(&pixmap, target).map_err(|detail| RenderError::page(number, detail))
    }
}

/// Copy a pixmap into an RGB surface.
///
/// MuPDF rounds the scaled page bounds itself, so the pixmap can be a pixel
/// larger or smaller than the viewport; the overlap is copied and any
/// remaining surface stays white.
fn copy_pixmap(pixmap: &Pixmap, target: &mut RasterSurface) -> Result<(), String> {
    let n = pixmap.n() as usize;
    if n < RGB_CHANNELS {
        return Err(format!("Unsupported pixmap format: {n} channels"));
    }

    let width = pixmap.width() as usize;
    let height = pixmap.height() as usize;
    let stride = pixmap.stride() as usize;
    let samples = pixmap.samples();
    let row_bytes = width * n;
    if samples.len() < stride.saturating_mul(height) || row_bytes > stride {
        return Err("Pixmap buffer size mismatch".to_string());
    }

    let cols = width.min(target.width as usize);
    let rows = height.min(target.height as usize);
    for y in 0..rows {
        let src = &samples[y * stride..y * stride + cols * n];
        let Some(dst) = target.row_mut(y) else {
            break;
        };
        let dst = &mut dst[..cols * RGB_CHANNELS];
        if n == RGB_CHANNELS {
            dst.copy_from_slice(src);
        } else {
            for (out, px) in dst.chunks_exact_mut(RGB_CHANNELS).zip(src.chunks_exact(n)) {
                out.copy_from_slice(&px[..RGB_CHANNELS]);
            }
        }
    }

    Ok(())
}
