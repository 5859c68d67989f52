//! Heuristic content extraction for the three page families the archive
//! serves (emails, forum posts, quotes).
//!
//! Each family gets an ordered list of body locators, evaluated in sequence
//! with the first match winning. The order encodes which page layouts the
//! site has used over time, so it is part of the contract rather than an
//! implementation detail. Whatever strategy fires, the output blocks are
//! assembled in a fixed order (source line, title, header, category, date,
//! body) so extraction is deterministic and diffable.


use scraper::{ElementRef, Html, Selector};
use tracing::{debug, warn};

/// Page family declared at scrape time from the section the page was found
/// under. Never inferred from page content.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContentFamily {
    Email,
    Post,
    Quote,
    Unknown,
}

/// Cleaned, markup-free document produced by extraction.
#[derive(Debug, Clone, PartialEq)]
pub struct ExtractedDocument {
    pub family: ContentFamily,
    /// Assembled text blocks, whitespace-trimmed, never empty.
    pub text: String,
    /// Pipe-delimited email header line (From/Subject/Date), when present.
    pub header: Option<String>,
    /// Raw timestamp string detected on the page, when present.
    pub date: Option<String>,
    /// Canonical URL of the page, when the markup carries one.
    pub source_url: Option<String>,
}

type BodyStrategy = (&'static str, fn(&Html) -> Option<String>);

/// Email body locators, most specific layout first.
const EMAIL_BODY_STRATEGIES: &[BodyStrategy] = &[
    ("section.px-8.py-4", email_marked_section),
    ("section.font-mono", email_monospace_section),
    ("main div with email markers", email_marker_div),
];

/// Containers the quote pages have used, most specific first. A candidate is
/// accepted only if its text exceeds [`MIN_QUOTE_CHARS`].
const QUOTE_BODY_SELECTORS: &[&str] = &[
    "div.quote-content",
    "section.px-8",
    "div.prose",
    "blockquote",
    "main section",
];

const MIN_QUOTE_CHARS: usize = 50;
const MIN_MONOSPACE_CHARS: usize = 50;
const MIN_MARKER_DIV_CHARS: usize = 100;
/// Lines at or below this length are boilerplate in the email main-region
/// fallback (nav labels, pagination, footer fragments).
const MIN_EMAIL_LINE_CHARS: usize = 10;

const EMAIL_MARKERS: &[&str] = &[
    "wrote:",
    "from:",
    "subject:",
    "-----",
    "unsubscribe",
    "mailing list",
];

#[derive(Debug, Default)]
struct Parts {
    title: Option<String>,
    header: Option<String>,
    category: Option<String>,
    date: Option<String>,
    body: Option<String>,
}

impl Parts {
    fn assembled_count(&self) -> usize {
        [&self.title, &self.header, &self.category, &self.date, &self.body]
            .iter()
            .filter(|part| part.is_some())
            .count()
    }
}

/// Extract usable content from a page. Returns `None` (logged) when no
/// strategy produced anything; extraction failures never propagate further.
#[inline]
pub fn extract(html: &str, family: ContentFamily, source: &str) -> Option<ExtractedDocument> {
    let doc = Html::parse_document(html);
    let source_url = detect_source_url(&doc);

    let parts = match family {
        ContentFamily::Email => email_parts(&doc),
        ContentFamily::Post | ContentFamily::Unknown => post_parts(&doc),
        ContentFamily::Quote => quote_parts(&doc),
    };

    if parts.assembled_count() == 0 {
        warn!("No usable content extracted from {}", source);
        return None;
    }

    let mut blocks: Vec<String> = Vec::new();
    if let Some(url) = &source_url {
        blocks.push(format!("Source: {}", url));
    }
    if let Some(title) = &parts.title {
        blocks.push(title.clone());
    }
    if let Some(header) = &parts.header {
        blocks.push(header.clone());
    }
    if let Some(category) = &parts.category {
        blocks.push(category.clone());
    }
    if let Some(date) = &parts.date {
        // The email header grid yields "Date: | <ts>" lines downstream; keep
        // the same shape so the metadata scan recognizes it. Posts and quotes
        // carry the raw <time> text.
        if family == ContentFamily::Email {
            blocks.push(format!("Date: | {}", date));
        } else {
            blocks.push(date.clone());
        }
    }
    if let Some(body) = &parts.body {
        blocks.push(body.clone());
    }

    let text = blocks.join("\n").trim().to_string();
    if text.is_empty() {
        warn!("No usable content extracted from {}", source);
        return None;
    }

    debug!(
        "Extracted {} chars from {} ({} blocks)",
        text.chars().count(),
        source,
        blocks.len()
    );

    Some(ExtractedDocument {
        family,
        text,
        header: parts.header,
        date: parts.date,
        source_url,
    })
}

fn email_parts(doc: &Html) -> Parts {
    let mut parts = Parts::default();

    if let Some(cells) = email_header_cells(doc) {
        parts.date = email_header_date(&cells);
        parts.header = Some(cells.join(" | "));
    }

    parts.body = run_body_strategies(doc, EMAIL_BODY_STRATEGIES);
    parts.title = select_text(doc, "h1", " ");
    parts.category = select_text(doc, "h2.small-caps", " ");

    // Header and title alone mean the body locators all missed; pull the
    // whole main region instead, minus chrome and short boilerplate lines.
    if parts.assembled_count() < 3 {
        if let Some(fallback) = email_main_fallback(doc) {
            parts.body = Some(match parts.body.take() {
                Some(body) => format!("{}\n{}", body, fallback),
                None => fallback,
            });
        }
    }

    parts
}

fn post_parts(doc: &Html) -> Parts {
    let mut parts = Parts {
        title: select_text(doc, "h1", " "),
        category: select_text(doc, "h2.small-caps", " "),
        date: select_text(doc, "time", " "),
        body: select_text(doc, "div.post", "\n"),
        ..Parts::default()
    };

    // No post container and no title/date/category either: last resort is
    // the main region with navigation and footer stripped.
    if parts.assembled_count() == 0 {
        parts.body = region_text_without(doc, "main", "nav, footer");
    }

    parts
}

fn quote_parts(doc: &Html) -> Parts {
    let mut parts = Parts {
        title: select_text(doc, "h1", " "),
        date: select_text(doc, "time", " "),
        ..Parts::default()
    };

    parts.body = QUOTE_BODY_SELECTORS.iter().find_map(|selector| {
        let text = select_text(doc, selector, "\n")?;
        if text.chars().count() > MIN_QUOTE_CHARS {
            debug!("Quote body strategy '{}' matched", selector);
            Some(text)
        } else {
            None
        }
    });

    if parts.body.is_none() {
        parts.body = region_text_without(doc, "main", "nav, footer");
    }

    parts
}

fn run_body_strategies(doc: &Html, strategies: &[BodyStrategy]) -> Option<String> {
    for (name, locate) in strategies {
        if let Some(text) = locate(doc) {
            debug!("Body strategy '{}' matched", name);
            return Some(text);
        }
    }
    None
}

fn email_marked_section(doc: &Html) -> Option<String> {
    select_text(doc, "section.px-8.py-4", "\n")
}

fn email_monospace_section(doc: &Html) -> Option<String> {
    let selector = Selector::parse("section.font-mono").expect("valid selector");
    doc.select(&selector)
        .map(|section| element_text(section, "\n"))
        .find(|text| text.chars().count() > MIN_MONOSPACE_CHARS)
}

fn email_marker_div(doc: &Html) -> Option<String> {
    let selector = Selector::parse("main div").expect("valid selector");
    doc.select(&selector)
        .map(|div| element_text(div, "\n"))
        .find(|text| {
            if text.chars().count() <= MIN_MARKER_DIV_CHARS {
                return false;
            }
            let lowered = text.to_lowercase();
            EMAIL_MARKERS.iter().any(|marker| lowered.contains(marker))
        })
}

fn email_main_fallback(doc: &Html) -> Option<String> {
    let text = region_text_without(doc, "main", "nav, footer, header")?;
    let lines: Vec<&str> = text
        .lines()
        .map(str::trim)
        .filter(|line| line.chars().count() > MIN_EMAIL_LINE_CHARS)
        .collect();
    if lines.is_empty() {
        return None;
    }
    Some(lines.join("\n"))
}

/// Header cells (From/Subject/Date labels and values) in document order.
fn email_header_cells(doc: &Html) -> Option<Vec<String>> {
    let selector = Selector::parse("header div.grid").expect("valid selector");
    let grid = doc.select(&selector).next()?;
    let cells: Vec<String> = grid
        .text()
        .map(str::trim)
        .filter(|cell| !cell.is_empty())
        .map(str::to_string)
        .collect();
    if cells.is_empty() { None } else { Some(cells) }
}

/// The value cell following a "Date" label cell, if the header carries one.
fn email_header_date(cells: &[String]) -> Option<String> {
    cells
        .iter()
        .position(|cell| cell.trim_end_matches(':').eq_ignore_ascii_case("date"))
        .and_then(|idx| cells.get(idx + 1))
        .cloned()
}

/// "Source: <url>" marker saved with the page, else the canonical link.
fn detect_source_url(doc: &Html) -> Option<String> {
    if let Some(text) = select_text(doc, "div.source-url", " ") {
        if let Some(url) = text
            .split_whitespace()
            .find(|token| token.starts_with("http"))
        {
            return Some(url.to_string());
        }
    }

    let selector = Selector::parse("link[rel=canonical]").expect("valid selector");
    doc.select(&selector)
        .next()
        .and_then(|link| link.value().attr("href"))
        .map(str::to_string)
}

/// Text of the first element matching `selector`, or `None` when the element
/// is missing or textless.
fn select_text(doc: &Html, selector: &str, separator: &str) -> Option<String> {
    let selector = Selector::parse(selector).expect("valid selector");
    let element = doc.select(&selector).next()?;
    let text = element_text(element, separator);
    if text.is_empty() { None } else { Some(text) }
}

/// Text of the first element matching `region`, after detaching every node
/// matching `unwanted` from a parsed copy.
fn region_text_without(doc: &Html, region: &str, unwanted: &str) -> Option<String> {
    let region_selector = Selector::parse(region).expect("valid selector");
    let unwanted_selector = Selector::parse(unwanted).expect("valid selector");

    let element = doc.select(&region_selector).next()?;
    let mut fragment = Html::parse_fragment(&element.html());

    let unwanted_ids: Vec<_> = fragment
        .select(&unwanted_selector)
        .map(|element| element.id())
        .collect();
    for node_id in unwanted_ids {
        if let Some(mut node) = fragment.tree.get_mut(node_id) {
            node.detach();
        }
    }

    let text = element_text(fragment.root_element(), "\n");
    if text.is_empty() { None } else { Some(text) }
}

fn element_text(element: ElementRef, separator: &str) -> String {
    element
        .text()
        .map(str::trim)
        .filter(|piece| !piece.is_empty())
        .collect::<Vec<_>>()
        .join(separator)
}
