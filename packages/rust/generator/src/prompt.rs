//! Prompt text for session summaries.

/// Marker appended to transcripts cut at `max_input_chars`.
pub const TRUNCATION_MARKER: &str = "\n\n[... transcript truncated to fit the model context window ...]";

pub(crate) const SYSTEM_PROMPT: &str = "You summarise IETF working-group sessions for \
engineers who could not attend. Work only from the transcript you are given. \
Write Markdown with these sections: a one-paragraph overview, \"Key discussions\" \
(one bullet per agenda item or draft, naming the draft when mentioned), \
\"Decisions and action items\", and \"Next steps\". Attribute positions to people \
only when the transcript names them. Do not invent outcomes; if the transcript is \
inconclusive, say so. Do not add a top-level heading.";

/// User message for one transcript.
pub(crate) fn user_prompt(display_name: &str, transcript: &str) -> String {
    format!(
        "Working group: {display_name}\n\nTranscript:\n\n{transcript}"
    )
}

/// Cut `content` to at most `max_chars` characters, on a char boundary, with a marker.
pub fn truncate_transcript(content: &str, max_chars: usize) -> String {
    match content.char_indices().nth(max_chars) {
        None => content.to_string(),
        Some((byte_idx, _)) => format!("{}{TRUNCATION_MARKER}", &content[..byte_idx]),
    }
}
