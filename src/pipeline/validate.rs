//! Ingestion validation: reject malformed uploads before any work starts.
//!
//! Checks are pure and ordered cheapest-first: file name, size, then the PDF
//! magic bytes (`%PDF`). Checking magic bytes here gives callers a
//! meaningful validation error rather than an opaque pdfium failure later.
//! Nothing is written and no job exists until every check passes.

use crate::config::OcrConfig;
use crate::error::OcrError;
use tracing::debug;

const PDF_MAGIC: &[u8; 4] = b"%PDF";

/// A raw upload as received from the transport layer.
#[derive(Clone)]
pub struct Upload {
    /// Client-supplied file name; only its extension is trusted.
    pub filename: String,
    pub bytes: Vec<u8>,
}

impl Upload {
    pub fn new(filename: impl Into<String>, bytes: impl Into<Vec<u8>>) -> Self {
        Self {
            filename: filename.into(),
            bytes: bytes.into(),
        }
    }

    pub fn size(&self) -> u64 {
        self.bytes.len() as u64
    }
}

impl std::fmt::Debug for Upload {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Upload")
            .field("filename", &self.filename)
            .field("size", &self.bytes.len())
            .finish()
    }
}

/// Lowercased extension after the last dot, if the name has one.
pub fn file_extension(filename: &str) -> Option<String> {
    let (_, ext) = filename.rsplit_once('.')?;
    if ext.is_empty() {
        return None;
    }
    Some(ext.to_ascii_lowercase())
}

/// Validate an upload against the configured type and size limits.
pub fn validate_upload(upload: &Upload, config: &OcrConfig) -> Result<(), OcrError> {
    let accepted = file_extension(&upload.filename)
        .map(|ext| config.accepts_extension(&ext))
        .unwrap_or(false);
    if !accepted {
        return Err(OcrError::UnsupportedFileType {
            filename: upload.filename.clone(),
            allowed: config.allowed_extensions.join(", "),
        });
    }

    let size = upload.size();
    if size > config.max_upload_bytes {
        return Err(OcrError::FileTooLarge {
            filename: upload.filename.clone(),
            size,
            limit: config.max_upload_bytes,
        });
    }

    if upload.bytes.is_empty() {
        return Err(OcrError::EmptyUpload {
            filename: upload.filename.clone(),
        });
    }

    if upload.bytes.len() < PDF_MAGIC.len() || &upload.bytes[..4] != PDF_MAGIC {
        let mut magic = [0u8; 4];
        let n = upload.bytes.len().min(4);
        magic[..n].copy_from_slice(&upload.bytes[..n]);
        return Err(OcrError::NotAPdf {
            filename: upload.filename.clone(),
            magic,
        });
    }

    debug!("Upload '{}' accepted ({} bytes)", upload.filename, size);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pdf_bytes() -> Vec<u8> {
        b"%PDF-1.7\n%\xe2\xe3\xcf\xd3\n".to_vec()
    }

    #[test]
    fn test_file_extension() {
        assert_eq!(file_extension("scan.PDF").as_deref(), Some("pdf"));
        assert_eq!(file_extension("archive.tar.pdf").as_deref(), Some("pdf"));
        assert_eq!(file_extension("noext"), None);
        assert_eq!(file_extension("trailing."), None);
        assert_eq!(file_extension(""), None);
    }

    #[test]
    fn accepts_well_formed_pdf() {
        let upload = Upload::new("Invoice.Pdf", pdf_bytes());
        validate_upload(&upload, &OcrConfig::default()).unwrap();
    }

    #[test]
    fn rejects_wrong_extension() {
        let upload = Upload::new("notes.docx", pdf_bytes());
        let err = validate_upload(&upload, &OcrConfig::default()).unwrap_err();
        assert!(matches!(err, OcrError::UnsupportedFileType { .. }));
    }

    #[test]
    fn rejects_oversized_upload() {
        let config = OcrConfig::builder().max_upload_bytes(8).build().unwrap();
        let upload = Upload::new("big.pdf", pdf_bytes());
        let err = validate_upload(&upload, &config).unwrap_err();
        assert!(matches!(err, OcrError::FileTooLarge { limit: 8, .. }));
    }

    #[test]
    fn size_limit_is_inclusive() {
        let bytes = pdf_bytes();
        let config = OcrConfig::builder()
            .max_upload_bytes(bytes.len() as u64)
            .build()
            .unwrap();
        validate_upload(&Upload::new("exact.pdf", bytes), &config).unwrap();
    }

    #[test]
    fn rejects_empty_upload() {
        let err = validate_upload(&Upload::new("empty.pdf", Vec::new()), &OcrConfig::default())
            .unwrap_err();
        assert!(matches!(err, OcrError::EmptyUpload { .. }));
    }

    #[test]
    fn rejects_renamed_non_pdf() {
        let upload = Upload::new("photo.pdf", b"\x89PNG\r\n\x1a\n".to_vec());
        match validate_upload(&upload, &OcrConfig::default()).unwrap_err() {
            OcrError::NotAPdf { magic, .. } => assert_eq!(&magic, b"\x89PNG"),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn debug_does_not_dump_bytes() {
        let upload = Upload::new("a.pdf", vec![0u8; 1024]);
        let dbg = format!("{upload:?}");
        assert!(dbg.contains("1024"));
        assert!(dbg.len() < 100);
    }
}
