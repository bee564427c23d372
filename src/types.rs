//! Shared request/result types for the conversion pipeline.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

/// Caller-supplied knobs for one conversion, separate from the file
/// content itself. Overrides win over detection when present.
#[derive(Debug, Clone, Default)]
pub struct ConvertOptions {
    /// Preserve `data:` URIs in the converted markdown.
    pub keep_data_uris: bool,
    /// Override the detected file extension (e.g. `.txt`).
    pub extension: Option<String>,
    /// Override the detected MIME type.
    pub mimetype: Option<String>,
}

/// One fully-resolved unit of conversion work. Immutable once built;
/// owned by the coordinator for the duration of a single call and
/// serialized as-is to the worker process.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConversionRequest {
    #[serde(with = "content_base64")]
    pub content: Vec<u8>,
    pub filename: String,
    pub keep_data_uris: bool,
    pub extension: Option<String>,
    pub mimetype: Option<String>,
}

/// Mimetype/extension pair produced by the validator. Derived per
/// request, never persisted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DetectedType {
    pub mimetype: Option<String>,
    pub extension: Option<String>,
}

/// Raw output of the worker-side converter, before normalization.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RawConversion {
    pub markdown: String,
    pub title: Option<String>,
    #[serde(default)]
    pub metadata: BTreeMap<String, Value>,
}

/// Final conversion result returned to the caller. Exclusively owned by
/// the caller after return; no shared state.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConversionResult {
    pub markdown: String,
    pub title: Option<String>,
    #[serde(default)]
    pub metadata: BTreeMap<String, Value>,
}

/// Serialize raw bytes as base64 so requests stay valid JSON on the
/// worker wire protocol.
mod content_base64 {
    use base64::engine::general_purpose::STANDARD;
    use base64::Engine;
    use serde::{Deserialize, Deserializer, Serialize, Serializer};

    pub fn serialize<S: Serializer>(bytes: &[u8], ser: S) -> Result<S::Ok, S::Error> {
        STANDARD.encode(bytes).serialize(ser)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(de: D) -> Result<Vec<u8>, D::Error> {
        let encoded = String::deserialize(de)?;
        STANDARD.decode(encoded).map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn request_roundtrips_binary_content() {
        let request = ConversionRequest {
            content: vec![0x00, 0xFF, 0x7F, 0x80],
            filename: "blob.bin".to_string(),
            keep_data_uris: false,
            extension: Some(".txt".to_string()),
            mimetype: None,
        };

        let json = serde_json::to_string(&request).unwrap();
        // Raw bytes never appear in the JSON, only base64
        assert!(json.contains("\"content\":\"AP9/gA==\""), "got: {json}");

        let back: ConversionRequest = serde_json::from_str(&json).unwrap();
        assert_eq!(back.content, request.content);
        assert_eq!(back.filename, "blob.bin");
        assert_eq!(back.extension.as_deref(), Some(".txt"));
    }

    #[test]
    fn result_serializes_optional_title() {
        let result = ConversionResult {
            markdown: "# Hi".to_string(),
            title: None,
            metadata: BTreeMap::new(),
        };
        let json = serde_json::to_string(&result).unwrap();
        assert!(json.contains("\"title\":null"));
    }

    #[test]
    fn metadata_accepts_mixed_values() {
        let mut metadata = BTreeMap::new();
        metadata.insert("size_bytes".to_string(), Value::from(42));
        metadata.insert("source_extension".to_string(), Value::from(".html"));

        let raw = RawConversion {
            markdown: String::new(),
            title: Some("T".to_string()),
            metadata,
        };
        let json = serde_json::to_string(&raw).unwrap();
        let back: RawConversion = serde_json::from_str(&json).unwrap();
        assert_eq!(back.metadata["size_bytes"], Value::from(42));
    }
}
