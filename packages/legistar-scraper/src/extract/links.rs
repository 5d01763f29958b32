//! Link addresses and media classification.

use regex::Regex;
use scraper::{ElementRef, Selector};
use std::sync::LazyLock;

use crate::extract::text::element_text;
use crate::types::page::{resolve_against, Link};

/// First single-quoted argument of an inline handler,
/// e.g. `window.open('Video.aspx?ID=5','_blank')`.
static HANDLER_PATH: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"'([^']+)'").expect("static regex"));

static IMG: LazyLock<Selector> = LazyLock::new(|| Selector::parse("img").expect("static selector"));

/// Icon images the platform uses for attachments, by file name.
const IMAGE_MEDIA_TYPES: &[(&str, &str)] = &[
    ("pdf.gif", "application/pdf"),
    ("pdf.png", "application/pdf"),
    ("word.gif", "application/msword"),
    ("doc.gif", "application/msword"),
    ("excel.gif", "application/vnd.ms-excel"),
    ("mp3.gif", "audio/mpeg"),
    ("audio.gif", "audio/mpeg"),
    ("video.gif", "text/html"),
    ("video.png", "text/html"),
    ("html.gif", "text/html"),
];

/// Address of a link element: a real `href`, else the path embedded in its
/// click handler. Resolved against `base`.
pub fn link_address(link: ElementRef<'_>, base: &str) -> Option<String> {
    let el = link.value();
    if let Some(href) = el.attr("href") {
        let href = href.trim();
        let scripted = href.is_empty()
            || href.starts_with('#')
            || href.to_ascii_lowercase().starts_with("javascript:");
        if !scripted {
            return resolve_against(base, href);
        }
    }

    let onclick = el.attr("onclick")?;
    let path = HANDLER_PATH.captures(onclick)?.get(1)?.as_str();
    resolve_against(base, path)
}

/// Postback target named in a pager link's `href` or click handler.
pub fn postback_target(link: ElementRef<'_>) -> Option<String> {
    let el = link.value();
    [el.attr("href"), el.attr("onclick")]
        .into_iter()
        .flatten()
        .filter(|handler| handler.contains("__doPostBack"))
        .find_map(|handler| HANDLER_PATH.captures(handler))
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str().to_string())
}

/// MIME type from an icon image path.
pub fn media_type_for_image(src: &str) -> Option<&'static str> {
    let file = src.rsplit('/').next().unwrap_or(src).to_ascii_lowercase();
    IMAGE_MEDIA_TYPES
        .iter()
        .find(|(name, _)| file == *name)
        .map(|(_, mime)| *mime)
}

/// MIME type from the trailing file extension of a URL path or file name.
pub fn media_type_for_name(name: &str) -> Option<String> {
    let path = name.split(['?', '#']).next().unwrap_or(name);
    let file = path.rsplit('/').next().unwrap_or(path);
    let ext = file.rsplit_once('.')?.1.to_ascii_lowercase();
    if matches!(ext.as_str(), "aspx" | "asp" | "ashx") {
        return None;
    }
    mime_guess::from_ext(&ext).first_raw().map(str::to_string)
}

/// Build a link from an anchor (or an element carrying `href`/`onclick`).
///
/// `scope` is searched for an icon image; without one the media type falls
/// back to the link's file extension, then the label's.
pub fn build_link(anchor: ElementRef<'_>, scope: ElementRef<'_>, base: &str) -> Option<Link> {
    let url = link_address(anchor, base)?;
    let label = element_text(anchor);

    let media_type = scope
        .select(&IMG)
        .find_map(|img| img.value().attr("src").and_then(media_type_for_image))
        .map(str::to_string)
        .or_else(|| media_type_for_name(&url))
        .or_else(|| media_type_for_name(&label));

    let mut link = Link::new(label, url);
    link.media_type = media_type;
    Some(link)
}
