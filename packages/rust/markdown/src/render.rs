//! Building blocks for published Markdown pages.

/// Ordered YAML frontmatter block.
///
/// Only the shapes the site needs are supported: scalar strings, integers,
/// and lists of strings. Values are always double-quoted.
#[derive(Debug, Clone, Default)]
pub struct Frontmatter {
    lines: Vec<String>,
}

impl Frontmatter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn string(mut self, key: &str, value: &str) -> Self {
        self.lines
            .push(format!("{key}: \"{}\"", escape_yaml_string(value)));
        self
    }

    pub fn number(mut self, key: &str, value: impl std::fmt::Display) -> Self {
        self.lines.push(format!("{key}: {value}"));
        self
    }

    /// A list of strings; an empty list renders as `key: []`.
    pub fn list(mut self, key: &str, values: &[String]) -> Self {
        if values.is_empty() {
            self.lines.push(format!("{key}: []"));
            return self;
        }
        self.lines.push(format!("{key}:"));
        for value in values {
            self.lines
                .push(format!("  - \"{}\"", escape_yaml_string(value)));
        }
        self
    }

    /// Render with the `---` fences and a trailing newline.
    pub fn render(&self) -> String {
        let mut fm = String::from("---\n");
        for line in &self.lines {
            fm.push_str(line);
            fm.push('\n');
        }
        fm.push_str("---\n");
        fm
    }
}

/// Escape special characters in a double-quoted YAML string value.
pub fn escape_yaml_string(s: &str) -> String {
    s.replace('\\', "\\\\")
        .replace('"', "\\\"")
        .replace('\n', "\\n")
}

/// File-name-safe slug: lowercase ASCII alphanumerics separated by single dashes.
///
/// Returns `"untitled"` when nothing usable remains.
pub fn slugify(name: &str) -> String {
    let mut slug = String::with_capacity(name.len());
    let mut pending_dash = false;

    for ch in name.chars() {
        if ch.is_ascii_alphanumeric() {
            if pending_dash && !slug.is_empty() {
                slug.push('-');
            }
            pending_dash = false;
            slug.push(ch.to_ascii_lowercase());
        } else {
            pending_dash = true;
        }
    }

    if slug.is_empty() {
        "untitled".to_string()
    } else {
        slug
    }
}

/// A `## {heading}` section with one bullet link per reference.
///
/// Links are labelled `Recording 1`, `Recording 2`, ... in order. Returns an
/// empty string when there are no references.
pub fn link_list(heading: &str, label: &str, refs: &[String]) -> String {
    if refs.is_empty() {
        return String::new();
    }
    let mut out = format!("## {heading}\n\n");
    for (i, href) in refs.iter().enumerate() {
        out.push_str(&format!("- [{label} {}]({href})\n", i + 1));
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn frontmatter_renders_in_order() {
        let fm = Frontmatter::new()
            .string("title", "QUIC \"v2\"")
            .number("collection", 121)
            .list("recordings", &["https://example.com/a".into()])
            .render();

        assert_eq!(
            fm,
            "---\ntitle: \"QUIC \\\"v2\\\"\"\ncollection: 121\nrecordings:\n  - \"https://example.com/a\"\n---\n"
        );
    }

    #[test]
    fn frontmatter_empty_list() {
        let fm = Frontmatter::new().list("recordings", &[]).render();
        assert!(fm.contains("recordings: []\n"));
    }

    #[test]
    fn slugify_normalizes() {
        assert_eq!(slugify("QUIC"), "quic");
        assert_eq!(slugify("IAB Open Meeting"), "iab-open-meeting");
        assert_eq!(slugify("  6MAN / v6ops -- joint "), "6man-v6ops-joint");
        assert_eq!(slugify("???"), "untitled");
    }

    #[test]
    fn link_list_numbers_references() {
        let refs = vec!["https://a".to_string(), "https://b".to_string()];
        assert_eq!(
            link_list("Recordings", "Recording", &refs),
            "## Recordings\n\n- [Recording 1](https://a)\n- [Recording 2](https://b)\n"
        );
        assert_eq!(link_list("Recordings", "Recording", &[]), "");
    }
}
