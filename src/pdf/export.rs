//! Write rendered pages to disk as PNG

use std::fs;
use std::path::{Path, PathBuf};

use image::RgbImage;
use log::debug;

use super::types::RasterSurface;

#[derive(Debug, thiserror::Error)]
pub enum ExportError {
    #[error("failed to create {path:?}: {source}")]
    CreateDir {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("page {page} has {actual} bytes, expected {expected}")]
    BufferSize {
        page: usize,
        expected: usize,
        actual: usize,
    },

    #[error("failed to write {path:?}: {source}")]
    Encode {
        path: PathBuf,
        source: image::ImageError,
    },
}

/// File name for a page (1-indexed), e.g. `page-0007.png`
#[must_use]
pub fn page_file_name(page: usize) -> String {
    format!("page-{page:04}.png")
}

/// Write every raster into `dir`, creating it if needed.
///
/// Returns the written paths in page order.
pub fn write_pages<'a, I>(dir: &Path, rasters: I) -> Result<Vec<PathBuf>, ExportError>
where
    I: IntoIterator<Item = &'a RasterSurface>,
{
    fs::create_dir_all(dir).map_err(|source| ExportError::CreateDir {
        path: dir.to_path_buf(),
        source,
    })?;

    let mut written = Vec::new();
    for raster in rasters {
        let path = dir.join(page_file_name(raster.page));
        write_page(&path, raster)?;
        written.push(path);
    }
    Ok(written)
}

fn write_page(path: &Path, raster: &RasterSurface) -> Result<(), ExportError> {
    let expected = raster.stride() * raster.height as usize;
    let image = RgbImage::from_raw(raster.width, raster.height, raster.pixels.clone()).ok_or(
        ExportError::BufferSize {
            page: raster.page,
            expected,
            actual: raster.pixels.len(),
        },
    )?;

    image.save(path).map_err(|source| ExportError::Encode {
        path: path.to_path_buf(),
        source,
    })?;
    debug!("Wrote page {} to {path:?}", raster.page);
    Ok(())
}
