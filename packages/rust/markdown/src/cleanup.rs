//! Post-conversion cleanup pipeline for transcript text.
//!
//! Each cleanup pass is a function `&str -> String` applied in sequence.

use std::sync::LazyLock;

use regex::Regex;

/// Run the full cleanup pipeline on raw Markdown text.
pub(crate) fn run_pipeline(md: &str) -> String {
    let mut result = md.to_string();

    result = strip_leftover_html(&result);
    result = unescape_entities(&result);
    result = normalize_whitespace(&result);
    result = clean_blank_lines(&result);
    result = ensure_trailing_newline(&result);

    result
}

// ---------------------------------------------------------------------------
// Pass 1: Strip leftover HTML tags
// ---------------------------------------------------------------------------

/// Remove stray container tags that survived the conversion, keeping their text.
fn strip_leftover_html(md: &str) -> String {
    static HTML_TAG_RE: LazyLock<Regex> = LazyLock::new(|| {
        Regex::new(r"</?(?:div|span|section|article|aside|figure|figcaption|details|summary|font|time)(?:\s[^>]*)?>")
            .expect("valid regex")
    });

    HTML_TAG_RE.replace_all(md, "").to_string()
}

// ---------------------------------------------------------------------------
// Pass 2: Unescape leftover entities
// ---------------------------------------------------------------------------

/// Decode the handful of entities htmd leaves untouched in plain text.
fn unescape_entities(md: &str) -> String {
    md.replace("&nbsp;", " ")
        .replace("&#39;", "'")
        .replace("&quot;", "\"")
}

// ---------------------------------------------------------------------------
// Pass 3: Normalize whitespace
// ---------------------------------------------------------------------------

/// Trim trailing whitespace on every line.
fn normalize_whitespace(md: &str) -> String {
    md.lines()
        .map(|line| line.trim_end())
        .collect::<Vec<_>>()
        .join("\n")
}

// ---------------------------------------------------------------------------
// Pass 4: Collapse blank lines
// ---------------------------------------------------------------------------

/// Collapse runs of blank lines into a single paragraph break.
fn clean_blank_lines(md: &str) -> String {
    static MULTI_BLANK_RE: LazyLock<Regex> =
        LazyLock::new(|| Regex::new(r"\n{3,}").expect("valid regex"));

    MULTI_BLANK_RE
        .replace_all(md.trim_start_matches('\n'), "\n\n")
        .to_string()
}

// ---------------------------------------------------------------------------
// Pass 5: Ensure trailing newline
// ---------------------------------------------------------------------------

/// Ensure the text ends with exactly one newline.
fn ensure_trailing_newline(md: &str) -> String {
    let trimmed = md.trim_end_matches('\n');
    format!("{trimmed}\n")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strip_leftover_html_keeps_text() {
        let result = strip_leftover_html("<div class=\"cue\">Chair: <span>hello</span></div>");
        assert_eq!(result, "Chair: hello");
    }

    #[test]
    fn unescape_entities_decodes_common() {
        assert_eq!(unescape_entities("it&#39;s&nbsp;&quot;ok&quot;"), "it's \"ok\"");
    }

    #[test]
    fn clean_blank_lines_collapses_runs() {
        assert_eq!(clean_blank_lines("\n\nA\n\n\n\nB\n\nC"), "A\n\nB\n\nC");
    }

    #[test]
    fn normalize_whitespace_trims_trailing() {
        assert_eq!(normalize_whitespace("A   \nB\t\nC"), "A\nB\nC");
    }

    #[test]
    fn ensure_trailing_newline_normalizes_multiple() {
        assert_eq!(ensure_trailing_newline("Content\n\n\n"), "Content\n");
        assert_eq!(ensure_trailing_newline("Content"), "Content\n");
    }

    #[test]
    fn full_pipeline_cleans_transcript() {
        let input = "\n<div>Chair: Welcome   </div>\n\n\n\n\nAlice: it&#39;s fine";
        assert_eq!(run_pipeline(input), "Chair: Welcome\n\nAlice: it's fine\n");
    }
}
