//! Model routing by receipt file type

use std::ffi::OsStr;
use std::path::Path;

/// Which extraction path a receipt file takes.
///
/// Images go straight to the vision model. PDFs try the vision path first,
/// since receipts are usually scans, and fall back to embedded text.
/// Everything else is read as plain text.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExtractionStrategy {
    /// Inline image bytes for the vision model
    Image,
    /// First embedded page image for the vision model, text fallback
    Pdf,
    /// File content prompted to the text model
    Text,
}

impl ExtractionStrategy {
    /// Route by file extension (case-insensitive)
    pub fn from_extension(extension: &str) -> Self {
        match extension.to_lowercase().as_str() {
            "png" | "jpg" | "jpeg" | "tiff" | "webp" | "bmp" => Self::Image,
            "pdf" => Self::Pdf,
            _ => Self::Text,
        }
    }

    pub fn from_path(path: &Path) -> Self {
        let extension = path.extension().and_then(OsStr::to_str).unwrap_or("");
        Self::from_extension(extension)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn images_route_to_vision() {
        for ext in ["png", "jpg", "jpeg", "tiff", "webp", "bmp", "JPG"] {
            assert_eq!(ExtractionStrategy::from_extension(ext), ExtractionStrategy::Image);
        }
    }

    #[test]
    fn pdf_gets_its_own_path() {
        assert_eq!(
            ExtractionStrategy::from_path(Path::new("/tmp/receipt.PDF")),
            ExtractionStrategy::Pdf
        );
    }

    #[test]
    fn everything_else_is_text() {
        for name in ["notes.txt", "receipt.md", "data.csv", "noextension"] {
            assert_eq!(
                ExtractionStrategy::from_path(Path::new(name)),
                ExtractionStrategy::Text
            );
        }
    }
}
