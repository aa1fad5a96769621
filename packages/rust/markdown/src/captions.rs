//! WebVTT caption flattening.
//!
//! Live captions arrive as timed cues, often with a voice tag naming the
//! speaker and with rolling duplicates of the previous line. The generator
//! only needs the spoken text, one speaker turn per paragraph.

use std::sync::LazyLock;

use regex::Regex;

static VOICE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^<v(?:\.[\w.-]+)?\s+([^>]+)>").expect("valid regex"));

static TAG_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"</?[^>]+>").expect("valid regex"));

/// Flatten WebVTT captions to `Speaker: text` paragraphs.
///
/// Header, `NOTE`/`STYLE`/`REGION` blocks, cue identifiers and timing lines
/// are dropped. Consecutive cues from the same speaker are joined into one
/// paragraph, and a cue repeating the previous line verbatim is skipped.
pub fn captions_to_text(vtt: &str) -> String {
    let mut paragraphs: Vec<(Option<String>, String)> = Vec::new();
    let mut last_line = String::new();

    for block in vtt.replace("\r\n", "\n").split("\n\n") {
        let block = block.trim();
        if block.is_empty() || is_metadata_block(block) {
            continue;
        }

        let mut lines = block.lines().peekable();
        // Optional cue identifier before the timing line
        if lines.peek().is_some_and(|l| !l.contains("-->")) {
            let mut lookahead = lines.clone();
            lookahead.next();
            if lookahead.peek().is_some_and(|l| l.contains("-->")) {
                lines.next();
            }
        }
        if lines.peek().is_some_and(|l| l.contains("-->")) {
            lines.next();
        }

        for raw in lines {
            let (speaker, text) = split_voice(raw.trim());
            let text = text.trim();
            if text.is_empty() || text == last_line {
                continue;
            }
            last_line = text.to_string();

            match paragraphs.last_mut() {
                Some((current, body)) if speaker.is_none() || *current == speaker => {
                    body.push(' ');
                    body.push_str(text);
                }
                _ => paragraphs.push((speaker, text.to_string())),
            }
        }
    }

    let mut out = paragraphs
        .into_iter()
        .map(|(speaker, body)| match speaker {
            Some(name) => format!("{name}: {body}"),
            None => body,
        })
        .collect::<Vec<_>>()
        .join("\n\n");
    if !out.is_empty() {
        out.push('\n');
    }
    out
}

fn is_metadata_block(block: &str) -> bool {
    ["WEBVTT", "NOTE", "STYLE", "REGION"]
        .iter()
        .any(|kw| block.starts_with(kw))
}

/// Split a leading `<v Speaker>` tag off a cue line and strip remaining markup.
fn split_voice(line: &str) -> (Option<String>, String) {
    let speaker = VOICE_RE
        .captures(line)
        .map(|caps| caps[1].trim().to_string());
    let text = TAG_RE.replace_all(line, "").to_string();
    (speaker, text)
}
