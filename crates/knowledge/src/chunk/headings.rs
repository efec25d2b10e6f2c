//! Markdown heading outline used for `title_path` metadata.

/// An ATX heading and the byte offset of its line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct Heading {
    pub offset: usize,
    pub level: usize,
    pub title: String,
}

/// Collect ATX headings, ignoring fenced code blocks.
pub(crate) fn outline(text: &str) -> Vec<Heading> {
    let mut headings = Vec::new();
    let mut in_fence = false;
    let mut offset = 0;

    for line in text.split_inclusive('\n') {
        let trimmed = line.trim_end();
        if trimmed.starts_with("```") || trimmed.starts_with("~~~") {
            in_fence = !in_fence;
        } else if !in_fence {
            let level = trimmed.chars().take_while(|&c| c == '#').count();
            if (1..=6).contains(&level) {
                let rest = &trimmed[level..];
                if rest.starts_with(' ') || rest.is_empty() {
                    let title = rest.trim().trim_end_matches('#').trim().to_string();
                    if !title.is_empty() {
                        headings.push(Heading {
                            offset,
                            level,
                            title,
                        });
                    }
                }
            }
        }
        offset += line.len();
    }

    headings
}

/// Headings in force at `offset`, outermost first, joined with " > ".
pub(crate) fn title_path(headings: &[Heading], offset: usize) -> Option<String> {
    let mut stack: Vec<&Heading> = Vec::new();
    for heading in headings.iter().take_while(|h| h.offset <= offset) {
        while stack.last().is_some_and(|top| top.level >= heading.level) {
            stack.pop();
        }
        stack.push(heading);
    }

    if stack.is_empty() {
        None
    } else {
        Some(
            stack
                .iter()
                .map(|h| h.title.as_str())
                .collect::<Vec<_>>()
                .join(" > "),
        )
    }
}
