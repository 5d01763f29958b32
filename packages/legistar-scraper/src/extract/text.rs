//! Visible text of an element.

use scraper::{ElementRef, Node};

/// Text of an element as a reader sees it.
///
/// `<br>` becomes a newline; all other whitespace, including non-breaking
/// spaces and source newlines, collapses to single spaces. Lines are trimmed.
pub fn element_text(el: ElementRef<'_>) -> String {
    let mut raw = String::new();
    for node in el.descendants() {
        match node.value() {
            Node::Text(text) => {
                for ch in text.chars() {
                    raw.push(if ch.is_whitespace() { ' ' } else { ch });
                }
            }
            Node::Element(e) if e.name() == "br" => raw.push('\n'),
            _ => {}
        }
    }
    normalize_lines(&raw)
}

pub(crate) fn normalize_lines(raw: &str) -> String {
    raw.replace("&nbsp;", " ")
        .split('\n')
        .map(|line| line.split_whitespace().collect::<Vec<_>>().join(" "))
        .collect::<Vec<_>>()
        .join("\n")
        .trim()
        .to_string()
}
