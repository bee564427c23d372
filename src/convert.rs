//! Built-in document converters.
//!
//! This module is the "convert these bytes to markdown" capability the
//! worker pool wraps. It only ever executes inside a worker child
//! process, so a converter that panics or hangs on hostile input cannot
//! take the service down with it.
//!
//! Format support is deliberately narrow: text-like formats are handled
//! natively, HTML goes through `html2md`, and everything else fails with
//! a converter error that the pool surfaces as a conversion failure.

use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::Value;
use std::collections::BTreeMap;

use crate::error::{ConvertError, Result};
use crate::types::{ConversionRequest, RawConversion};
use crate::validate::extension_of;

static RE_HTML_TITLE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?is)<title[^>]*>(.*?)</title>").unwrap());

/// Inline images with `data:` payloads, e.g. `![logo](data:image/png;base64,...)`.
static RE_DATA_URI_IMAGE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"!\[([^\]]*)\]\(\s*data:[^)]*\)").unwrap());

/// Convert one request to raw markdown.
///
/// Dispatches on the resolved extension, falling back to the mimetype
/// when the request has no usable extension.
pub fn convert_document(request: &ConversionRequest) -> Result<RawConversion> {
    let extension = request
        .extension
        .clone()
        .or_else(|| extension_of(&request.filename));
    let mimetype = request.mimetype.as_deref();

    let (converter, output) = match (extension.as_deref(), mimetype) {
        (Some(".txt") | Some(".md"), _)
        | (None, Some("text/plain"))
        | (None, Some("text/markdown")) => ("text", convert_text(&request.content)),
        (Some(".html") | Some(".htm"), _) | (None, Some("text/html")) => {
            ("html", convert_html(&request.content))
        }
        (Some(".csv"), _) | (None, Some("text/csv")) => ("csv", convert_csv(&request.content)),
        (Some(".json") | Some(".ipynb"), _) | (None, Some("application/json")) => {
            ("json", convert_fenced(&request.content, "json"))
        }
        (Some(".xml") | Some(".rss"), _) | (None, Some("text/xml")) => {
            ("xml", convert_fenced(&request.content, "xml"))
        }
        (None, Some(mime)) if mime.starts_with("text/") => {
            ("text", convert_text(&request.content))
        }
        (ext, mime) => {
            let label = ext
                .map(str::to_string)
                .or_else(|| mime.map(str::to_string))
                .unwrap_or_else(|| "unknown".to_string());
            return Err(ConvertError::Failed(format!(
                "no converter available for '{label}'"
            )));
        }
    };

    let (mut markdown, title) = output?;

    if !request.keep_data_uris {
        markdown = strip_data_uris(&markdown);
    }

    let mut metadata = BTreeMap::new();
    metadata.insert("converter".to_string(), Value::from(converter));
    metadata.insert(
        "size_bytes".to_string(),
        Value::from(request.content.len() as u64),
    );
    if let Some(ext) = &extension {
        metadata.insert("source_extension".to_string(), Value::from(ext.clone()));
    }
    if let Some(mime) = mimetype {
        metadata.insert("source_mimetype".to_string(), Value::from(mime));
    }

    Ok(RawConversion {
        markdown,
        title,
        metadata,
    })
}

type Converted = Result<(String, Option<String>)>;

fn convert_text(content: &[u8]) -> Converted {
    Ok((String::from_utf8_lossy(content).into_owned(), None))
}

fn convert_html(content: &[u8]) -> Converted {
    let html = String::from_utf8_lossy(content);
    let title = RE_HTML_TITLE
        .captures(&html)
        .map(|caps| caps[1].trim().to_string())
        .filter(|t| !t.is_empty());
    Ok((html2md::parse_html(&html), title))
}

/// Render CSV as a GFM table: first row is the header, every row is
/// padded to the header width. No quote handling; cells containing
/// pipes are escaped.
fn convert_csv(content: &[u8]) -> Converted {
    let text = String::from_utf8_lossy(content);
    let mut rows: Vec<Vec<String>> = text
        .lines()
        .filter(|line| !line.trim().is_empty())
        .map(|line| {
            line.split(',')
                .map(|cell| cell.trim().replace('|', "\\|"))
                .collect()
        })
        .collect();

    if rows.is_empty() {
        return Ok((String::new(), None));
    }

    let width = rows.iter().map(Vec::len).max().unwrap_or(1);
    for row in &mut rows {
        row.resize(width, String::new());
    }

    let mut out = String::new();
    out.push_str(&format!("| {} |\n", rows[0].join(" | ")));
    out.push_str(&format!("|{}\n", " --- |".repeat(width)));
    for row in &rows[1..] {
        out.push_str(&format!("| {} |\n", row.join(" | ")));
    }
    Ok((out.trim_end().to_string(), None))
}

fn convert_fenced(content: &[u8], lang: &str) -> Converted {
    let text = String::from_utf8_lossy(content);
    Ok((format!("```{lang}\n{}\n```", text.trim_end()), None))
}

/// Replace `![alt](data:...)` images with an italic caption, dropping
/// caption-less ones entirely.
fn strip_data_uris(markdown: &str) -> String {
    RE_DATA_URI_IMAGE
        .replace_all(markdown, |caps: &regex::Captures<'_>| {
            let alt = caps[1].trim();
            if alt.is_empty() {
                String::new()
            } else {
                format!("*{alt}*")
            }
        })
        .to_string()
}
