//! File-type validation gate.
//!
//! Inspects file bytes and filename before any worker is engaged.
//! Classification combines three signals, in priority order: magic-number
//! sniffing of the content, the caller-provided mimetype (fallback only,
//! used when sniffing yields nothing), and the filename extension. A
//! present-but-unsupported extension rejects the request; a missing
//! extension does not. A sniffed mimetype outside the supported family is
//! tolerated only for `text/*` types, so plain-text files with unusual
//! subtypes still convert.

use serde::Serialize;

use crate::error::{ConvertError, Result};
use crate::types::DetectedType;

/// Extensions admitted into the conversion pipeline.
pub const SUPPORTED_EXTENSIONS: &[&str] = &[
    ".pdf", ".docx", ".doc", ".pptx", ".ppt", ".xlsx", ".xls", ".csv", ".html", ".htm", ".epub",
    ".msg", ".mp3", ".m4a", ".wav", ".jpg", ".jpeg", ".png", ".gif", ".bmp", ".xml", ".rss",
    ".txt", ".md", ".json", ".ipynb", ".zip",
];

/// Mimetypes admitted into the conversion pipeline. `text/*` types not on
/// this list are tolerated as well.
const SUPPORTED_MIMETYPES: &[&str] = &[
    "application/pdf",
    "application/vnd.openxmlformats-officedocument.wordprocessingml.document",
    "application/msword",
    "application/vnd.openxmlformats-officedocument.presentationml.presentation",
    "application/vnd.ms-powerpoint",
    "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet",
    "application/vnd.ms-excel",
    "application/x-ole-storage",
    "text/csv",
    "text/html",
    "application/epub+zip",
    "application/vnd.ms-outlook",
    "audio/mpeg",
    "audio/mp4",
    "audio/wav",
    "image/jpeg",
    "image/png",
    "image/gif",
    "image/bmp",
    "application/rss+xml",
    "text/xml",
    "text/plain",
    "text/markdown",
    "application/json",
    "application/x-ipynb+json",
    "application/zip",
    "application/x-zip-compressed",
];

/// One entry of the public supported-formats listing.
#[derive(Debug, Clone, Serialize)]
pub struct SupportedFormat {
    pub extension: &'static str,
    pub mimetype: &'static str,
    pub description: &'static str,
}

/// Static table served by `GET {prefix}/supported-formats`.
pub fn supported_formats() -> &'static [SupportedFormat] {
    &[
        SupportedFormat { extension: ".pdf", mimetype: "application/pdf", description: "Adobe Portable Document Format" },
        SupportedFormat { extension: ".docx", mimetype: "application/vnd.openxmlformats-officedocument.wordprocessingml.document", description: "Microsoft Word Document (DOCX)" },
        SupportedFormat { extension: ".doc", mimetype: "application/msword", description: "Microsoft Word Document (DOC)" },
        SupportedFormat { extension: ".pptx", mimetype: "application/vnd.openxmlformats-officedocument.presentationml.presentation", description: "Microsoft PowerPoint Presentation (PPTX)" },
        SupportedFormat { extension: ".ppt", mimetype: "application/vnd.ms-powerpoint", description: "Microsoft PowerPoint Presentation (PPT)" },
        SupportedFormat { extension: ".xlsx", mimetype: "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet", description: "Microsoft Excel Spreadsheet (XLSX)" },
        SupportedFormat { extension: ".xls", mimetype: "application/vnd.ms-excel", description: "Microsoft Excel Spreadsheet (XLS)" },
        SupportedFormat { extension: ".csv", mimetype: "text/csv", description: "Comma-Separated Values" },
        SupportedFormat { extension: ".html", mimetype: "text/html", description: "HyperText Markup Language" },
        SupportedFormat { extension: ".epub", mimetype: "application/epub+zip", description: "Electronic Publication" },
        SupportedFormat { extension: ".msg", mimetype: "application/vnd.ms-outlook", description: "Microsoft Outlook Message" },
        SupportedFormat { extension: ".mp3", mimetype: "audio/mpeg", description: "MP3 Audio File" },
        SupportedFormat { extension: ".m4a", mimetype: "audio/mp4", description: "MPEG-4 Audio File" },
        SupportedFormat { extension: ".wav", mimetype: "audio/wav", description: "Waveform Audio File" },
        SupportedFormat { extension: ".jpg", mimetype: "image/jpeg", description: "JPEG Image" },
        SupportedFormat { extension: ".png", mimetype: "image/png", description: "Portable Network Graphics" },
        SupportedFormat { extension: ".gif", mimetype: "image/gif", description: "Graphics Interchange Format" },
        SupportedFormat { extension: ".bmp", mimetype: "image/bmp", description: "Bitmap Image" },
        SupportedFormat { extension: ".xml", mimetype: "application/xml", description: "Extensible Markup Language" },
        SupportedFormat { extension: ".txt", mimetype: "text/plain", description: "Plain Text File" },
        SupportedFormat { extension: ".md", mimetype: "text/markdown", description: "Markdown Document" },
        SupportedFormat { extension: ".json", mimetype: "application/json", description: "JavaScript Object Notation" },
        SupportedFormat { extension: ".ipynb", mimetype: "application/x-ipynb+json", description: "Jupyter Notebook" },
        SupportedFormat { extension: ".zip", mimetype: "application/zip", description: "ZIP Archive" },
    ]
}

/// Sniff a mimetype from the leading bytes of the content.
///
/// Container formats are reported as their container: OOXML documents and
/// EPUB sniff as `application/zip`, legacy Office documents as the OLE2
/// storage type. Unknown prefixes return `None` so the caller-provided
/// mimetype can take over.
pub fn sniff_mimetype(content: &[u8]) -> Option<&'static str> {
    if content.starts_with(b"%PDF") {
        return Some("application/pdf");
    }
    if content.starts_with(b"PK\x03\x04") || content.starts_with(b"PK\x05\x06") {
        return Some("application/zip");
    }
    if content.starts_with(&[0xD0, 0xCF, 0x11, 0xE0, 0xA1, 0xB1, 0x1A, 0xE1]) {
        return Some("application/x-ole-storage");
    }
    if content.starts_with(&[0x89, b'P', b'N', b'G']) {
        return Some("image/png");
    }
    if content.starts_with(&[0xFF, 0xD8, 0xFF]) {
        return Some("image/jpeg");
    }
    if content.starts_with(b"GIF87a") || content.starts_with(b"GIF89a") {
        return Some("image/gif");
    }
    if content.starts_with(b"BM") && content.len() > 14 {
        return Some("image/bmp");
    }
    if content.starts_with(b"ID3") || content.starts_with(&[0xFF, 0xFB]) {
        return Some("audio/mpeg");
    }
    if content.starts_with(b"RIFF") && content.get(8..12) == Some(b"WAVE") {
        return Some("audio/wav");
    }
    let head = leading_text(content);
    if head.starts_with("<!doctype html") || head.starts_with("<html") {
        return Some("text/html");
    }
    if head.starts_with("<?xml") {
        return Some("text/xml");
    }
    None
}

/// Lowercased, whitespace-trimmed view of the first bytes, for tag
/// sniffing. Non-UTF-8 content yields an empty string.
fn leading_text(content: &[u8]) -> String {
    let head = &content[..content.len().min(256)];
    match std::str::from_utf8(head) {
        Ok(s) => s.trim_start().to_lowercase(),
        Err(e) if e.valid_up_to() > 0 => {
            // Safe: valid_up_to marks a UTF-8 boundary
            std::str::from_utf8(&head[..e.valid_up_to()])
                .unwrap_or("")
                .trim_start()
                .to_lowercase()
        }
        Err(_) => String::new(),
    }
}

/// Derive the extension from the last dot-segment of the filename,
/// lowercased and dot-prefixed. `None` when the filename has no dot.
pub fn extension_of(filename: &str) -> Option<String> {
    let lower = filename.to_lowercase();
    let mut parts = lower.rsplitn(2, '.');
    let ext = parts.next()?;
    // rsplitn yields the whole name when there is no dot
    parts.next()?;
    if ext.is_empty() {
        return None;
    }
    Some(format!(".{ext}"))
}

/// Classify content and filename into a [`DetectedType`], rejecting
/// inputs that may not enter the pipeline.
///
/// The sniffed mimetype always wins over `provided_mimetype`; the
/// provided value is used only when sniffing yields nothing. Absence of
/// an extension is legal and never rejects by itself.
pub fn classify(
    content: &[u8],
    filename: &str,
    provided_mimetype: Option<&str>,
) -> Result<DetectedType> {
    let sniffed = sniff_mimetype(content);
    let mimetype = sniffed
        .map(str::to_string)
        .or_else(|| provided_mimetype.map(str::to_string));

    let extension = extension_of(filename);

    if let Some(ext) = &extension {
        if !SUPPORTED_EXTENSIONS.contains(&ext.as_str()) {
            return Err(ConvertError::UnsupportedType(ext.clone()));
        }
    }

    if let Some(mime) = &mimetype {
        if !SUPPORTED_MIMETYPES.contains(&mime.as_str()) && !mime.starts_with("text/") {
            return Err(ConvertError::UnsupportedType(mime.clone()));
        }
    }

    Ok(DetectedType {
        mimetype,
        extension,
    })
}

/// Reject payloads over the configured limit. The boundary `size == limit`
/// passes.
pub fn check_size(size: u64, limit: u64) -> Result<()> {
    if size > limit {
        return Err(ConvertError::PayloadTooLarge { size, limit });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extension_from_last_dot_segment() {
        assert_eq!(extension_of("report.PDF").as_deref(), Some(".pdf"));
        assert_eq!(extension_of("archive.tar.gz").as_deref(), Some(".gz"));
        assert_eq!(extension_of("README").as_deref(), None);
        assert_eq!(extension_of("trailing.").as_deref(), None);
    }

    #[test]
    fn sniffs_common_formats() {
        assert_eq!(sniff_mimetype(b"%PDF-1.7 ..."), Some("application/pdf"));
        assert_eq!(sniff_mimetype(b"PK\x03\x04rest"), Some("application/zip"));
        assert_eq!(
            sniff_mimetype(&[0x89, b'P', b'N', b'G', 0x0D, 0x0A]),
            Some("image/png")
        );
        assert_eq!(sniff_mimetype(&[0xFF, 0xD8, 0xFF, 0xE0]), Some("image/jpeg"));
        assert_eq!(sniff_mimetype(b"GIF89a..."), Some("image/gif"));
        assert_eq!(
            sniff_mimetype(b"  <!DOCTYPE html><html>"),
            Some("text/html")
        );
        assert_eq!(sniff_mimetype(b"<?xml version=\"1.0\"?>"), Some("text/xml"));
        assert_eq!(sniff_mimetype(b"plain old text"), None);
        assert_eq!(sniff_mimetype(b""), None);
    }

    #[test]
    fn wav_needs_riff_and_wave() {
        assert_eq!(
            sniff_mimetype(b"RIFF\x00\x00\x00\x00WAVEfmt "),
            Some("audio/wav")
        );
        assert_eq!(sniff_mimetype(b"RIFF\x00\x00\x00\x00AVI "), None);
    }

    #[test]
    fn classify_accepts_supported_extension() {
        let detected = classify(b"hello", "notes.txt", None).unwrap();
        assert_eq!(detected.extension.as_deref(), Some(".txt"));
        assert_eq!(detected.mimetype, None);
    }

    #[test]
    fn classify_rejects_unsupported_extension() {
        let err = classify(b"MZ\x90", "tool.exe", None).unwrap_err();
        assert_eq!(err.status_code(), 415);
        assert!(err.to_string().contains(".exe"));
    }

    #[test]
    fn classify_without_extension_is_legal() {
        let detected = classify(b"%PDF-1.4", "upload", None).unwrap();
        assert_eq!(detected.extension, None);
        assert_eq!(detected.mimetype.as_deref(), Some("application/pdf"));
    }

    #[test]
    fn sniffed_mimetype_wins_over_provided() {
        let detected = classify(b"%PDF-1.4", "doc.pdf", Some("text/plain")).unwrap();
        assert_eq!(detected.mimetype.as_deref(), Some("application/pdf"));
    }

    #[test]
    fn provided_mimetype_is_fallback_only() {
        let detected = classify(b"some plain content", "data.csv", Some("text/csv")).unwrap();
        assert_eq!(detected.mimetype.as_deref(), Some("text/csv"));
    }

    #[test]
    fn unknown_text_subtype_is_tolerated() {
        let detected =
            classify(b"x = 1", "script.txt", Some("text/x-python")).unwrap();
        assert_eq!(detected.mimetype.as_deref(), Some("text/x-python"));
    }

    #[test]
    fn unsupported_binary_mimetype_is_rejected() {
        let err = classify(b"\x7fELF", "prog.txt", Some("application/x-executable"))
            .unwrap_err();
        assert_eq!(err.status_code(), 415);
    }

    #[test]
    fn check_size_boundary() {
        assert!(check_size(100, 100).is_ok());
        assert!(check_size(0, 100).is_ok());
        let err = check_size(101, 100).unwrap_err();
        assert_eq!(err.status_code(), 413);
    }

    #[test]
    fn format_table_is_consistent() {
        for format in supported_formats() {
            assert!(
                SUPPORTED_EXTENSIONS.contains(&format.extension),
                "{} missing from allow-list",
                format.extension
            );
            assert!(!format.description.is_empty());
        }
    }

    #[test]
    fn every_supported_extension_classifies() {
        for ext in SUPPORTED_EXTENSIONS {
            let name = format!("file{ext}");
            let detected = classify(b"content", &name, None).unwrap();
            assert_eq!(detected.extension.as_deref(), Some(*ext));
        }
    }
}
