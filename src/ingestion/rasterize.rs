/// PDF page rasterization: stage 2 of the ingestion pipeline. Produces one
/// image per page at a fixed DPI, order preserved.
///
/// Uses `pdfium-render`, the common binding for page-level rasterization
/// (as opposed to text-extraction-only crates like `pdf-extract`/`lopdf`,
/// which can't produce the page images the OCR stage needs).
use image::ImageFormat;
use pdfium_render::prelude::*;

use crate::errors::CoreError;

/// One rasterized page, PNG-encoded, in original page order.
pub struct PageImage {
    pub page_index: usize,
    pub png_bytes: Vec<u8>,
}

/// Render every page of `pdf_bytes` to a PNG at `dpi`. Fails fast if the
/// PDF cannot be parsed (permission/corruption) — callers treat that as the
/// same terminal failure as a fetch error.
pub fn rasterize_pages(pdf_bytes: &[u8], dpi: u32) -> Result<Vec<PageImage>, CoreError> {
    let pdfium = Pdfium::new(
        Pdfium::bind_to_system_library()
            .or_else(|_| Pdfium::bind_to_library(Pdfium::pdfium_platform_library_name_at_path("./")))
            .map_err(|e| CoreError::StorageError(format!("failed to bind pdfium library: {}", e)))?,
    );

    let document = pdfium
        .load_pdf_from_byte_slice(pdf_bytes, None)
        .map_err(|e| CoreError::invalid(format!("failed to parse PDF: {}", e)))?;

    // 72 points per inch is the PDF native unit; scale target pixel
    // dimensions by the requested DPI.
    let scale = dpi as f32 / 72.0;

    let mut pages = Vec::with_capacity(document.pages().len() as usize);
    for (index, page) in document.pages().iter().enumerate() {
        let width = (page.width().value * scale).round() as i32;
        let height = (page.height().value * scale).round() as i32;

        let config = PdfRenderConfig::new()
            .set_target_width(width.max(1))
            .set_maximum_height(height.max(1));

        let bitmap = page
            .render_with_config(&config)
            .map_err(|e| CoreError::StorageError(format!("failed to render page {}: {}", index, e)))?;

        let dynamic_image = bitmap.as_image();
        let mut png_bytes = Vec::new();
        dynamic_image
            .write_to(&mut std::io::Cursor::new(&mut png_bytes), ImageFormat::Png)
            .map_err(|e| CoreError::StorageError(format!("failed to encode page {} as PNG: {}", index, e)))?;

        pages.push(PageImage {
            page_index: index,
            png_bytes,
        });
    }

    Ok(pages)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn invalid_pdf_bytes_fail_fast() {
        let result = rasterize_pages(b"not a pdf", 150);
        assert!(result.is_err());
    }
}
