//! Captions of files shown inside `<gallery>` blocks, which the media-list endpoint
//! does not report. Scraped from the rendered page HTML.

use std::collections::BTreeMap;

use scraper::{ElementRef, Html, Selector};
use tracing::debug;

use crate::client::HttpFetch;
use crate::error::{StatsError, StatsResult};
use crate::wiki::normalize_title;

/// File name → caption (the description link's `title`), `None` when the gallery entry
/// has no caption. Files outside galleries are not present.
pub type GalleryCaptions = BTreeMap<String, Option<String>>;

pub fn page_html_url(site: &str, page: &str) -> String {
    format!(
        "https://{site}/api/rest_v1/page/html/{}",
        urlencoding::encode(page)
    )
}

pub fn fetch_gallery_captions<H: HttpFetch>(
    http: &mut H,
    site: &str,
    page: &str,
    gallery_id: Option<&str>,
) -> StatsResult<GalleryCaptions> {
    let url = page_html_url(site, page);
    debug!(site, page, "gallery look-up");
    let response = http.get(&url)?;
    if response.status == 404 {
        return Err(StatsError::EndpointNotFound { url });
    }
    if !response.is_success() {
        return Err(response.client_error());
    }
    Ok(parse_gallery_captions(&response.body, gallery_id))
}

/// Assumes a file appears at most once across the scanned galleries; otherwise the last
/// occurrence wins. `gallery_id` restricts the scan to the gallery list with that id.
pub fn parse_gallery_captions(html: &str, gallery_id: Option<&str>) -> GalleryCaptions {
    let mut captions = GalleryCaptions::new();
    let (Ok(box_selector), Ok(link_selector)) = (
        Selector::parse("li.gallerybox"),
        Selector::parse("a.mw-file-description"),
    ) else {
        return captions;
    };

    let document = Html::parse_document(html);
    for gallery_box in document.select(&box_selector) {
        if gallery_id.is_some_and(|wanted| parent_id(&gallery_box) != Some(wanted)) {
            continue;
        }
        for link in gallery_box.select(&link_selector) {
            let Some(file) = link.value().attr("href").and_then(file_name_from_href) else {
                continue;
            };
            let caption = link
                .value()
                .attr("title")
                .map(str::trim)
                .filter(|title| !title.is_empty())
                .map(ToString::to_string);
            captions.insert(file, caption);
        }
    }
    captions
}

fn parent_id<'a>(element: &ElementRef<'a>) -> Option<&'a str> {
    element
        .parent()
        .and_then(ElementRef::wrap)
        .and_then(|parent| parent.value().id())
}

/// `./File:Old_map.jpg` or `/wiki/Fil:Old_map.jpg` → `Old map.jpg`. The namespace
/// name is localized, so everything up to the first colon is dropped.
fn file_name_from_href(href: &str) -> Option<String> {
    let segment = href.rsplit('/').next().unwrap_or(href);
    let segment = segment.split(['?', '#']).next().unwrap_or(segment);
    let (_, name) = segment.split_once(':')?;
    let decoded = urlencoding::decode(name)
        .map(|value| value.into_owned())
        .unwrap_or_else(|_| name.to_string());
    let name = normalize_title(&decoded);
    (!name.is_empty()).then_some(name)
}
