use image::ImageFormat;
use pdfium_render::prelude::*;
use tracing::{debug, info};

use crate::config::OcrConfig;
use crate::error::{MedsumError, Result};
use crate::ocr::preprocess_image;

/// One decoded raster page, encoded as PNG. Image documents yield one
/// page; PDFs yield one per page. Pages are dropped as soon as OCR has
/// run on them.
#[derive(Debug, Clone)]
pub struct Page {
    /// 1-based page number within the source document.
    pub number: usize,
    pub png: Vec<u8>,
}

const IMAGE_EXTENSIONS: &[&str] = &["png", "jpg", "jpeg", "tiff", "tif", "bmp"];

enum DocumentKind {
    Pdf,
    Image,
}

/// Decode a document into pages, choosing the path from the filename
/// extension with a magic-byte fallback for misnamed uploads.
pub fn decode_document(bytes: &[u8], filename_hint: &str, config: &OcrConfig) -> Result<Vec<Page>> {
    if bytes.is_empty() {
        return Err(MedsumError::Decode("Document is empty".to_string()));
    }

    match sniff_kind(bytes, filename_hint) {
        DocumentKind::Pdf => rasterize_pdf(bytes, config),
        DocumentKind::Image => {
            let png = preprocess_image(bytes, config)?;
            Ok(vec![Page { number: 1, png }])
        }
    }
}

fn sniff_kind(bytes: &[u8], filename_hint: &str) -> DocumentKind {
    let extension = filename_hint
        .rsplit('.')
        .next()
        .map(|e| e.to_lowercase())
        .unwrap_or_default();

    if extension == "pdf" {
        return DocumentKind::Pdf;
    }
    if IMAGE_EXTENSIONS.contains(&extension.as_str()) {
        return DocumentKind::Image;
    }

    // Unknown or missing extension: trust the bytes.
    match infer::get(bytes) {
        Some(kind) if kind.mime_type() == "application/pdf" => DocumentKind::Pdf,
        _ => DocumentKind::Image,
    }
}

/// Render every PDF page to a PNG raster. Scanned medical PDFs carry no
/// text layer, so rasterize-then-OCR is the only path.
fn rasterize_pdf(bytes: &[u8], config: &OcrConfig) -> Result<Vec<Page>> {
    let pdfium = Pdfium::new(
        Pdfium::bind_to_system_library()
            .map_err(|e| MedsumError::Decode(format!("Pdfium library unavailable: {e:?}")))?,
    );

    let document = pdfium
        .load_pdf_from_byte_slice(bytes, None)
        .map_err(|e| MedsumError::Decode(format!("Failed to open PDF: {e:?}")))?;

    let page_count = document.pages().len() as usize;
    if page_count == 0 {
        return Err(MedsumError::Decode("PDF contains no pages".to_string()));
    }

    // Roughly 300 DPI for an A4 scan, clamped to the OCR dimension limit.
    let target_width = 2480.min(config.max_image_dimension as i32);
    let render_config = PdfRenderConfig::new()
        .set_target_width(target_width)
        .set_maximum_height(config.max_image_dimension as i32);

    info!(pages = page_count, "rasterizing PDF");

    let mut pages = Vec::with_capacity(page_count);
    for (i, page) in document.pages().iter().enumerate() {
        let bitmap = page
            .render_with_config(&render_config)
            .map_err(|e| MedsumError::Decode(format!("Failed to render page {}: {e:?}", i + 1)))?;

        let img = bitmap.as_image().grayscale();
        let mut png = Vec::new();
        img.write_to(&mut std::io::Cursor::new(&mut png), ImageFormat::Png)
            .map_err(|e| MedsumError::Decode(format!("Failed to encode page {}: {e}", i + 1)))?;

        debug!(page = i + 1, bytes = png.len(), "page rasterized");
        pages.push(Page {
            number: i + 1,
            png,
        });
    }

    Ok(pages)
}
