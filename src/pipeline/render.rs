//! PDF rasterisation: one PNG file per page in the request's scratch directory.
//!
//! The `pdfium-render` crate wraps the pdfium C++ library, which keeps
//! thread-local state and whose `Pdfium` handle is `!Send`. Rendering
//! therefore runs inside `tokio::task::spawn_blocking`, and the library is
//! bound freshly for every operation. The OS caches the `dlopen`, so repeat
//! binds are cheap.
//!
//! `max_rendered_pixels` caps the longest edge regardless of DPI, keeping
//! memory and upload size bounded for oversized pages.

use crate::config::ExtractionConfig;
use crate::error::ExtractError;
use crate::output::DocumentInfo;
use crate::pipeline::encode::{encode_png, PNG_MEDIA_TYPE};
use pdfium_render::prelude::*;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info};

/// PDF points per inch.
const POINTS_PER_INCH: f32 = 72.0;

/// Env var holding an explicit path to the pdfium shared library.
pub const PDFIUM_LIB_PATH_ENV: &str = "PDFIUM_LIB_PATH";

/// One rendered page waiting in scratch storage.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageImage {
    /// 1-indexed page number.
    pub page: usize,
    /// Location of the encoded image.
    pub path: PathBuf,
    /// Media type of the file at `path`.
    pub media_type: String,
}

impl PageImage {
    /// Read the encoded image back from scratch storage.
    pub async fn read_bytes(&self) -> Result<Vec<u8>, ExtractError> {
        tokio::fs::read(&self.path)
            .await
            .map_err(|source| ExtractError::Scratch {
                path: self.path.clone(),
                source,
            })
    }
}

/// File name used for page `page` (1-indexed) inside a scratch directory.
///
/// Zero-padded so a lexical directory listing is also page order.
pub fn page_file_name(page: usize) -> String {
    format!("page-{page:04}.png")
}

/// Turns a PDF on disk into one image per page.
///
/// Implementations are blocking and are always called from a blocking
/// thread. Tests inject their own implementation through
/// [`crate::config::ExtractionConfigBuilder::rasterizer`].
pub trait Rasterizer: Send + Sync {
    /// Render every page of `pdf_path` into `scratch_dir`, in page order.
    fn rasterize(&self, pdf_path: &Path, scratch_dir: &Path)
        -> Result<Vec<PageImage>, ExtractError>;

    /// Read page count and metadata without rendering.
    fn inspect(&self, pdf_path: &Path) -> Result<DocumentInfo, ExtractError> {
        Err(ExtractError::Internal(format!(
            "this rasteriser cannot inspect '{}'",
            pdf_path.display()
        )))
    }
}

/// Rasterise on a blocking thread.
pub async fn rasterize_document(
    rasterizer: Arc<dyn Rasterizer>,
    pdf_path: &Path,
    scratch_dir: &Path,
) -> Result<Vec<PageImage>, ExtractError> {
    let path = pdf_path.to_path_buf();
    let dir = scratch_dir.to_path_buf();

    tokio::task::spawn_blocking(move || rasterizer.rasterize(&path, &dir))
        .await
        .map_err(|e| ExtractError::Internal(format!("Render task panicked: {}", e)))?
}

/// Inspect on a blocking thread.
pub async fn inspect_document(
    rasterizer: Arc<dyn Rasterizer>,
    pdf_path: &Path,
) -> Result<DocumentInfo, ExtractError> {
    let path = pdf_path.to_path_buf();

    tokio::task::spawn_blocking(move || rasterizer.inspect(&path))
        .await
        .map_err(|e| ExtractError::Internal(format!("Metadata task panicked: {}", e)))?
}

/// pdfium-backed [`Rasterizer`].
#[derive(Debug, Clone)]
pub struct PdfiumRasterizer {
    dpi: u32,
    max_rendered_pixels: u32,
    password: Option<String>,
}

impl PdfiumRasterizer {
    pub fn new(dpi: u32, max_rendered_pixels: u32, password: Option<String>) -> Self {
        Self {
            dpi,
            max_rendered_pixels,
            password,
        }
    }

    pub fn from_config(config: &ExtractionConfig) -> Self {
        Self::new(config.dpi, config.max_rendered_pixels, config.password.clone())
    }
}

impl Rasterizer for PdfiumRasterizer {
    fn rasterize(
        &self,
        pdf_path: &Path,
        scratch_dir: &Path,
    ) -> Result<Vec<PageImage>, ExtractError> {
        let pdfium = load_pdfium()?;
        let password = self.password.as_deref();
        let document = pdfium
            .load_pdf_from_file(pdf_path, password)
            .map_err(|e| map_load_error(e, pdf_path, password.is_some()))?;

        let pages = document.pages();
        let total_pages = pages.len() as usize;
        if total_pages == 0 {
            return Err(ExtractError::NoPages {
                path: pdf_path.to_path_buf(),
            });
        }
        info!("PDF loaded: {} pages", total_pages);

        let max = self.max_rendered_pixels as i32;
        let render_config = PdfRenderConfig::new()
            .scale_page_by_factor(self.dpi as f32 / POINTS_PER_INCH)
            .set_maximum_width(max)
            .set_maximum_height(max);

        let mut images = Vec::with_capacity(total_pages);
        for (idx, page) in pages.iter().enumerate() {
            let page_no = idx + 1;
            let bitmap = page.render_with_config(&render_config).map_err(|e| {
                ExtractError::RasterisationFailed {
                    page: page_no,
                    detail: format!("{:?}", e),
                }
            })?;

            let image = bitmap.as_image();
            let png = encode_png(&image).map_err(|e| ExtractError::RasterisationFailed {
                page: page_no,
                detail: format!("PNG encoding failed: {e}"),
            })?;

            let path = scratch_dir.join(page_file_name(page_no));
            std::fs::write(&path, &png).map_err(|source| ExtractError::Scratch {
                path: path.clone(),
                source,
            })?;
            debug!(
                "Rendered page {} → {}x{} px, {} bytes",
                page_no,
                image.width(),
                image.height(),
                png.len()
            );

            images.push(PageImage {
                page: page_no,
                path,
                media_type: PNG_MEDIA_TYPE.to_string(),
            });
        }

        Ok(images)
    }

    fn inspect(&self, pdf_path: &Path) -> Result<DocumentInfo, ExtractError> {
        let pdfium = load_pdfium()?;
        let password = self.password.as_deref();
        let document = pdfium
            .load_pdf_from_file(pdf_path, password)
            .map_err(|e| map_load_error(e, pdf_path, password.is_some()))?;

        let metadata = document.metadata();
        let get_meta = |tag: PdfDocumentMetadataTagType| -> Option<String> {
            metadata.get(tag).and_then(|t| {
                let v = t.value().trim().to_string();
                if v.is_empty() {
                    None
                } else {
                    Some(v)
                }
            })
        };

        Ok(DocumentInfo {
            page_count: document.pages().len() as usize,
            pdf_version: format!("{:?}", document.version()),
            title: get_meta(PdfDocumentMetadataTagType::Title),
            author: get_meta(PdfDocumentMetadataTagType::Author),
        })
    }
}

/// Bind the pdfium dynamic library.
///
/// Discovery order:
/// 1. `PDFIUM_LIB_PATH` env var (file or directory)
/// 2. Alongside the running executable
/// 3. System library search paths
fn load_pdfium() -> Result<Pdfium, ExtractError> {
    if let Ok(path) = std::env::var(PDFIUM_LIB_PATH_ENV) {
        let target = if Path::new(&path).is_dir() {
            PathBuf::from(Pdfium::pdfium_platform_library_name_at_path(path.as_str()))
        } else {
            PathBuf::from(&path)
        };
        debug!(path = %target.display(), "Loading pdfium from env var");
        let bindings = Pdfium::bind_to_library(&target).map_err(|e| {
            ExtractError::PdfiumBindingFailed(format!("{}: {e}", target.display()))
        })?;
        return Ok(Pdfium::new(bindings));
    }

    if let Some(exe_dir) = std::env::current_exe()
        .ok()
        .and_then(|exe| exe.parent().map(Path::to_path_buf))
    {
        let lib_path =
            Pdfium::pdfium_platform_library_name_at_path(exe_dir.to_string_lossy().as_ref());
        if let Ok(bindings) = Pdfium::bind_to_library(&lib_path) {
            debug!(dir = %exe_dir.display(), "Loaded pdfium next to executable");
            return Ok(Pdfium::new(bindings));
        }
    }

    let bindings = Pdfium::bind_to_system_library()
        .map_err(|e| ExtractError::PdfiumBindingFailed(e.to_string()))?;
    Ok(Pdfium::new(bindings))
}

/// Classify a load failure: encryption problems get their own variants.
fn map_load_error(e: PdfiumError, path: &Path, had_password: bool) -> ExtractError {
    let detail = format!("{:?}", e);
    classify_load_failure(&detail, path, had_password)
}

fn classify_load_failure(detail: &str, path: &Path, had_password: bool) -> ExtractError {
    let lower = detail.to_lowercase();
    if lower.contains("password") || lower.contains("encrypt") || lower.contains("security") {
        if had_password {
            ExtractError::WrongPassword {
                path: path.to_path_buf(),
            }
        } else {
            ExtractError::PasswordRequired {
                path: path.to_path_buf(),
            }
        }
    } else {
        ExtractError::CorruptPdf {
            path: path.to_path_buf(),
            detail: detail.to_string(),
        }
    }
}
