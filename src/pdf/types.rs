//! Core types for page rasterization

use std::sync::Arc;

/// Fixed magnification applied to every page
pub const RENDER_SCALE: f32 = 1.5;

/// Largest raster edge we are willing to allocate, in pixels
pub const MAX_RASTER_DIMENSION: u32 = 16_384;

/// Bytes per pixel in a [`RasterSurface`] (R, G, B)
pub const RGB_CHANNELS: usize = 3;

/// Intrinsic page dimensions in document units (points for PDF)
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct PageSize {
    pub width: f32,
    pub height: f32,
}

impl PageSize {
    #[must_use]
    pub const fn new(width: f32, height: f32) -> Self {
        Self { width, height }
    }
}

/// Pixel area a page is rasterized into
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Viewport {
    pub width: u32,
    pub height: u32,
    pub scale: f32,
}

impl Viewport {
    /// Viewport for a page at the given scale.
    ///
    /// Returns `None` when the page has no drawable area or the scaled
    /// raster would exceed [`MAX_RASTER_DIMENSION`].
    #[must_use]
    pub fn at_scale(size: PageSize, scale: f32) -> Option<Self> {
        let width = size.width * scale;
        let height = size.height * scale;
        if !width.is_finite() || !height.is_finite() || width <= 0.0 || height <= 0.0 {
            return None;
        }

        let width = width.ceil();
        let height = height.ceil();
        let max = MAX_RASTER_DIMENSION as f32;
        if width > max || height > max {
            return None;
        }

        Some(Self {
            width: (width as u32).max(1),
            height: (height as u32).max(1),
            scale,
        })
    }

    #[must_use]
    pub fn pixel_count(&self) -> usize {
        self.width as usize * self.height as usize
    }
}

/// Raster output for a single page.
///
/// Pixels are packed RGB rows with no padding. A freshly allocated surface
/// is white.
#[derive(Clone, PartialEq, Eq)]
pub struct RasterSurface {
    /// Page number (1-indexed)
    pub page: usize,
    pub width: u32,
    pub height: u32,
    pub pixels: Vec<u8>,
}

impl RasterSurface {
    #[must_use]
    pub fn allocate(page: usize, viewport: &Viewport) -> Self {
        Self {
            page,
            width: viewport.width,
            height: viewport.height,
            pixels: vec![0xFF; viewport.pixel_count() * RGB_CHANNELS],
        }
    }

    #[must_use]
    pub fn stride(&self) -> usize {
        self.width as usize * RGB_CHANNELS
    }

    /// Mutable access to one pixel row
    pub fn row_mut(&mut self, y: usize) -> Option<&mut [u8]> {
        let stride = self.stride();
        let start = y.checked_mul(stride)?;
        self.pixels.get_mut(start..start + stride)
    }
}

impl std::fmt::Debug for RasterSurface {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RasterSurface")
            .field("page", &self.page)
            .field("width", &self.width)
            .field("height", &self.height)
            .field("bytes", &self.pixels.len())
            .finish()
    }
}

/// Ordered page rasters produced by one render cycle
pub type RenderSurface = Vec<Arc<RasterSurface>>;
