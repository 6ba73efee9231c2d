use std::collections::HashSet;

use scraper::{ElementRef, Html, Selector};
use url::Url;

use crate::index::Website;

/// How many characters of page text stand in for a missing description.
const DESCRIPTION_CHARS: usize = 400;

fn select_first<'a>(document: &'a Html, selector: &str) -> Option<ElementRef<'a>> {
    let selector = Selector::parse(selector).ok()?;
    document.select(&selector).next()
}

fn resolve(base: &str, href: &str) -> Option<String> {
    let base = Url::parse(base).ok()?;
    Some(base.join(href).ok()?.to_string())
}

/// Extract metadata from a page and put it into a [`Website`].
///
/// Pages without a title are named after their url, a missing description
/// falls back to a truncated extract of the page text, and a missing icon
/// falls back to `/favicon.ico` the way browsers try it.
pub fn extract_metadata(url: &str, document: &Html) -> Website {
    let name = select_first(document, "title")
        .map(|title| title.text().collect::<String>().trim().to_string())
        .filter(|title| !title.is_empty())
        .unwrap_or_else(|| url.to_string());

    let description = select_first(document, r#"meta[name="description"]"#)
        .and_then(|meta| meta.value().attr("content"))
        .map(|content| content.trim().to_string())
        .unwrap_or_else(|| {
            let mut extract: String = extract_text(document)
                .chars()
                .take(DESCRIPTION_CHARS)
                .collect();
            extract.push_str("...");
            extract
        });

    let icon = select_first(document, r#"link[rel~="icon"]"#)
        .and_then(|link| link.value().attr("href"))
        .and_then(|href| resolve(url, href))
        .or_else(|| resolve(url, "/favicon.ico"))
        .unwrap_or_else(|| format!("{url}/favicon.ico"));

    Website {
        url: url.to_string(),
        name,
        description,
        icon,
        word_count: 0,
    }
}

/// Extract all links from a page, resolved against the page url and with
/// fragments stripped, as a unique set. Hrefs that do not resolve are
/// skipped.
pub fn extract_links(url: &str, document: &Html) -> HashSet<String> {
    let mut links = HashSet::new();

    let Ok(base) = Url::parse(url) else {
        return links;
    };
    let Ok(anchors) = Selector::parse("a") else {
        return links;
    };

    for anchor in document.select(&anchors) {
        let Some(href) = anchor.value().attr("href") else {
            continue;
        };
        let Ok(mut link) = base.join(href) else {
            continue;
        };
        link.set_fragment(None);
        links.insert(link.to_string());
    }

    links
}

/// Extract the visible text of a page. Script, style and noscript content is
/// not text a visitor reads, so it stays out of the index.
pub fn extract_text(document: &Html) -> String {
    let mut text = String::new();

    for node in document.root_element().descendants() {
        let Some(fragment) = node.value().as_text() else {
            continue;
        };

        let parent = node
            .parent()
            .and_then(|parent| parent.value().as_element().map(|el| el.name().to_string()));
        if parent.is_some_and(|name| matches!(name.as_str(), "script" | "style" | "noscript")) {
            continue;
        }

        text.push_str(&fragment.text);
    }

    text
}
