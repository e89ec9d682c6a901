//! Parser for the portal's content listing pages.
//!
//! Both the course table of contents and the per-module partial views render
//! their entries as `li.d2l-datalist-item` children of a `ul.d2l-datalist`.
//! An entry is classified by its markup, never by its title:
//!
//! - a module element id (`...ContentObject.ModuleCO-<id>`) marks a folder
//! - a `a.d2l-link` pointing at `/viewContent/<id>/View` marks a file

use once_cell::sync::Lazy;
use regex::Regex;
use scraper::{ElementRef, Html, Selector};

static DATALIST: Lazy<Selector> = Lazy::new(|| selector("ul.d2l-datalist"));
static MODULE_MARKER: Lazy<Selector> = Lazy::new(|| selector(r#"[id*="ModuleCO-"]"#));
static HEADING: Lazy<Selector> = Lazy::new(|| selector("h1, h2, h3, h4"));
static TEXTBLOCK: Lazy<Selector> = Lazy::new(|| selector(".d2l-textblock"));
static FILE_LINK: Lazy<Selector> = Lazy::new(|| selector("a.d2l-link"));
static TYPE_LABEL: Lazy<Selector> = Lazy::new(|| selector("div.d2l-body-small"));

static MODULE_ID: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"ContentObject\.ModuleCO-(\d+)").expect("valid regex"));
static TOPIC_ID: Lazy<Regex> = Lazy::new(|| Regex::new(r"/viewContent/(\d+)/View").expect("valid regex"));

const XHR_PREFIX: &str = "while(1);";

/// Topic types that are not downloadable material
pub const NON_MATERIAL_TYPES: &[&str] = &["Assignment", "Discussion Topic"];

fn selector(css: &str) -> Selector {
    Selector::parse(css).expect("static selector must parse")
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EntryKind {
    Folder { module_id: String },
    File { topic_id: String, href: String },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListingEntry {
    pub name: String,
    pub kind: EntryKind,
    /// Type label shown under the title (e.g. "PDF document")
    pub type_label: Option<String>,
}

impl ListingEntry {
    pub fn is_folder(&self) -> bool {
        matches!(self.kind, EntryKind::Folder { .. })
    }
}

/// Extract the HTML from an XHR response.
///
/// Partial views come back as `while(1);{"Payload":{"Html":"..."}}`. Plain HTML is
/// returned untouched. `None` when the wrapper is present but unreadable.
pub fn unwrap_xhr(body: &str) -> Option<String> {
    let Some(json) = body.trim_start().strip_prefix(XHR_PREFIX) else {
        return Some(body.to_string());
    };

    let value: serde_json::Value = match serde_json::from_str(json) {
        Ok(value) => value,
        Err(e) => {
            log::debug!("Malformed XHR payload: {}", e);
            return None;
        }
    };

    value
        .pointer("/Payload/Html")
        .and_then(|html| html.as_str())
        .map(str::to_string)
}

/// Parse the entries of the first datalist on the page, in page order
pub fn parse_listing(html: &str) -> Vec<ListingEntry> {
    let document = Html::parse_document(html);
    let Some(list) = document.select(&DATALIST).next() else {
        log::debug!("No content datalist found on page");
        return Vec::new();
    };

    list.children()
        .filter_map(ElementRef::wrap)
        .filter(|el| el.value().name() == "li" && el.value().classes().any(|c| c == "d2l-datalist-item"))
        .filter_map(parse_entry)
        .collect()
}

fn parse_entry(item: ElementRef<'_>) -> Option<ListingEntry> {
    if let Some(module_id) = module_id_of(item) {
        let name = first_text(item, &HEADING).or_else(|| first_text(item, &TEXTBLOCK))?;
        return Some(ListingEntry {
            name,
            kind: EntryKind::Folder { module_id },
            type_label: None,
        });
    }

    let link = item.select(&FILE_LINK).find(|a| {
        a.value()
            .attr("href")
            .map_or(false, |href| TOPIC_ID.is_match(href))
    })?;
    let href = link.value().attr("href")?.to_string();
    let topic_id = TOPIC_ID.captures(&href)?.get(1)?.as_str().to_string();
    let name = collapse_whitespace(&link.text().collect::<String>());
    if name.is_empty() {
        return None;
    }

    let type_label = first_text(item, &TYPE_LABEL);
    if let Some(label) = &type_label {
        if NON_MATERIAL_TYPES.contains(&label.as_str()) {
            log::debug!("Skipping non-material entry '{}' ({})", name, label);
            return None;
        }
    }

    Some(ListingEntry {
        name,
        kind: EntryKind::File { topic_id, href },
        type_label,
    })
}

fn module_id_of(item: ElementRef<'_>) -> Option<String> {
    let own = item.value().id().and_then(capture_module_id);
    own.or_else(|| {
        item.select(&MODULE_MARKER)
            .next()
            .and_then(|el| el.value().id())
            .and_then(capture_module_id)
    })
}

fn capture_module_id(id: &str) -> Option<String> {
    MODULE_ID
        .captures(id)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str().to_string())
}

fn first_text(item: ElementRef<'_>, selector: &Selector) -> Option<String> {
    item.select(selector)
        .map(|el| collapse_whitespace(&el.text().collect::<String>()))
        .find(|text| !text.is_empty())
}

fn collapse_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}
