//! PDF rasterisation: decode the document into an ordered list of page images.
//!
//! ## Why spawn_blocking?
//!
//! The `pdfium-render` crate wraps the pdfium C++ library, which is not safe
//! to call from async contexts. All decoding happens inside one
//! `spawn_blocking` call over a single document handle, so pages are rendered
//! strictly in order from one decode context.
//!
//! ## Why scale by DPI *and* cap pixels?
//!
//! OCR accuracy depends on physical resolution, so pages are scaled to the
//! configured DPI. A poster-sized page at 300 DPI would still be enormous;
//! `max_rendered_pixels` caps the longest edge regardless of physical size.

use crate::config::OcrConfig;
use crate::error::OcrError;
use image::DynamicImage;
use pdfium_render::prelude::*;
use std::path::PathBuf;
use tracing::{debug, info};

/// PDF user-space units per inch.
const POINTS_PER_INCH: f32 = 72.0;

/// One rasterised page.
///
/// Ownership moves from the rasterizer to exactly one recognition worker;
/// the bitmap is dropped as soon as that worker produces its result.
pub struct PageImage {
    /// 0-based page ordinal.
    pub ordinal: usize,
    pub image: DynamicImage,
}

impl std::fmt::Debug for PageImage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PageImage")
            .field("ordinal", &self.ordinal)
            .field("width", &self.image.width())
            .field("height", &self.image.height())
            .finish()
    }
}

/// Render settings derived from [`OcrConfig`].
#[derive(Debug, Clone)]
pub struct RenderOptions {
    pub dpi: u32,
    pub max_pixels: u32,
    pub password: Option<String>,
    pub pdfium_lib_path: Option<PathBuf>,
}

impl From<&OcrConfig> for RenderOptions {
    fn from(config: &OcrConfig) -> Self {
        Self {
            dpi: config.dpi,
            max_pixels: config.max_rendered_pixels,
            password: config.password.clone(),
            pdfium_lib_path: config.pdfium_lib_path.clone(),
        }
    }
}

/// Decodes document bytes into page images.
///
/// Implementations are blocking; callers run them via `spawn_blocking`.
/// Any failure aborts the whole job: there is no partial output at this
/// stage because no page has been produced yet.
pub trait Rasterizer: Send + Sync {
    fn rasterize(&self, bytes: &[u8], options: &RenderOptions)
        -> Result<Vec<PageImage>, OcrError>;
}

/// pdfium-backed rasterizer.
#[derive(Debug, Default, Clone, Copy)]
pub struct PdfiumRasterizer;

impl Rasterizer for PdfiumRasterizer {
    fn rasterize(
        &self,
        bytes: &[u8],
        options: &RenderOptions,
    ) -> Result<Vec<PageImage>, OcrError> {
        let pdfium = bind_pdfium(options)?;

        let document = pdfium
            .load_pdf_from_byte_slice(bytes, options.password.as_deref())
            .map_err(|e| {
                let err_str = format!("{:?}", e);
                if err_str.contains("Password") || err_str.contains("password") {
                    OcrError::PasswordRequired
                } else {
                    OcrError::CorruptDocument { detail: err_str }
                }
            })?;

        let pages = document.pages();
        let total_pages = pages.len() as usize;
        if total_pages == 0 {
            return Err(OcrError::NoPages);
        }
        info!("PDF loaded: {} pages", total_pages);

        let render_config = PdfRenderConfig::new()
            .scale_page_by_factor(scale_for_dpi(options.dpi))
            .set_maximum_width(options.max_pixels as i32)
            .set_maximum_height(options.max_pixels as i32);

        let mut results = Vec::with_capacity(total_pages);
        for (ordinal, page) in pages.iter().enumerate() {
            let bitmap = page.render_with_config(&render_config).map_err(|e| {
                OcrError::RasterisationFailed {
                    page: ordinal + 1,
                    detail: format!("{:?}", e),
                }
            })?;

            let image = bitmap.as_image();
            debug!(
                "Rendered page {} → {}x{} px",
                ordinal + 1,
                image.width(),
                image.height()
            );
            results.push(PageImage { ordinal, image });
        }

        Ok(results)
    }
}

/// Rasterise `bytes` off the async executor.
pub async fn render_pages(
    rasterizer: std::sync::Arc<dyn Rasterizer>,
    bytes: Vec<u8>,
    options: RenderOptions,
) -> Result<Vec<PageImage>, OcrError> {
    tokio::task::spawn_blocking(move || rasterizer.rasterize(&bytes, &options))
        .await
        .map_err(|e| OcrError::Internal(format!("Render task panicked: {}", e)))?
}

/// Scale factor that maps PDF points to pixels at `dpi`.
pub fn scale_for_dpi(dpi: u32) -> f32 {
    dpi as f32 / POINTS_PER_INCH
}

fn bind_pdfium(options: &RenderOptions) -> Result<Pdfium, OcrError> {
    let bindings = match &options.pdfium_lib_path {
        Some(dir) => {
            Pdfium::bind_to_library(Pdfium::pdfium_platform_library_name_at_path(dir))
        }
        None => Pdfium::bind_to_system_library(),
    }
    .map_err(|e| OcrError::PdfiumBindingFailed(format!("{:?}", e)))?;

    Ok(Pdfium::new(bindings))
}
