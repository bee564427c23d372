//! Deterministic markdown normalization.
//!
//! Every raw conversion result passes through [`normalize`] before it is
//! returned. The pass order matters: each step operates on the output of
//! the previous one, and the whole pipeline is idempotent — running it
//! twice yields the same text as running it once. The function is total:
//! it never fails, and empty input yields an empty string.

use once_cell::sync::Lazy;
use regex::Regex;

static RE_EXCESS_NEWLINES: Lazy<Regex> = Lazy::new(|| Regex::new(r"\n{3,}").unwrap());

static RE_BEFORE_HEADING: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"([^\n])\n(#{1,6} )").unwrap());

static RE_AFTER_HEADING: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(#{1,6} .+)\n([^\n])").unwrap());

static RE_BULLET: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?m)^([ \t]*)[•·][ \t]+").unwrap());

static RE_TITLE: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?m)^#[ \t]+(.+)$").unwrap());

/// Normalize raw markdown into its canonical form.
///
/// Passes, in order:
/// 1. Remove zero-width spaces.
/// 2. Strip trailing whitespace from every line (CR included, so CRLF
///    input degrades gracefully to LF).
/// 3. Collapse 3+ consecutive newlines to exactly 2.
/// 4. Surround heading lines with blank lines.
/// 5. Normalize `•`/`·` bullets to `- `, preserving indentation.
/// 6. Make code fences hug their content.
/// 7. Trim the whole document.
///
/// The character-level cleanups (1, 2) run before the newline collapse:
/// both can turn whitespace-carrying lines into blank lines, and
/// collapsing first would leave runs a second invocation would shorten,
/// breaking idempotence.
pub fn normalize(raw: Option<&str>) -> String {
    let raw = match raw {
        Some(s) if !s.is_empty() => s,
        _ => return String::new(),
    };

    let s = raw.replace('\u{200B}', "");
    let s = trim_line_ends(&s);
    let s = collapse_newlines(&s);
    let s = space_headings(&s);
    let s = normalize_bullets(&s);
    let s = hug_code_fences(&s);
    s.trim().to_string()
}

/// Extract the text of the first top-level heading (`# ...`), used as a
/// title fallback when the converter supplies none.
pub fn extract_title(markdown: &str) -> Option<String> {
    RE_TITLE
        .captures(markdown)
        .map(|caps| caps[1].trim().to_string())
        .filter(|title| !title.is_empty())
}

fn collapse_newlines(input: &str) -> String {
    RE_EXCESS_NEWLINES.replace_all(input, "\n\n").to_string()
}

fn trim_line_ends(input: &str) -> String {
    input
        .split('\n')
        .map(str::trim_end)
        .collect::<Vec<_>>()
        .join("\n")
}

/// Insert a blank line before a heading preceded by a non-blank line,
/// and after a heading followed by a non-blank line.
fn space_headings(input: &str) -> String {
    let s = RE_BEFORE_HEADING.replace_all(input, "${1}\n\n${2}");
    RE_AFTER_HEADING.replace_all(&s, "${1}\n\n${2}").to_string()
}

/// `•`/`·` bullets become `- `. Leading indentation is preserved so
/// nested lists keep their structure.
fn normalize_bullets(input: &str) -> String {
    RE_BULLET.replace_all(input, "${1}- ").to_string()
}

/// Drop blank lines directly after an opening fence marker and directly
/// before the matching closing marker. Tracks fence state so a blank
/// line after a *closing* fence is left alone.
fn hug_code_fences(input: &str) -> String {
    let lines: Vec<&str> = input.split('\n').collect();
    let mut out: Vec<&str> = Vec::with_capacity(lines.len());
    let mut in_fence = false;
    let mut skip_blanks = false;

    for line in lines {
        let is_marker = line.trim_start().starts_with("```");
        if is_marker {
            if in_fence {
                // Closing marker: drop blank lines queued just before it
                while out.last().is_some_and(|l| l.trim().is_empty()) {
                    out.pop();
                }
                in_fence = false;
                skip_blanks = false;
            } else {
                in_fence = true;
                skip_blanks = true;
            }
            out.push(line);
            continue;
        }

        if skip_blanks {
            if line.trim().is_empty() {
                continue;
            }
            skip_blanks = false;
        }
        out.push(line);
    }

    out.join("\n")
}
