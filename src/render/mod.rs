//! Channel Renderers (spec §4.9): one result shape, three presentations.
//! Every renderer is a pure function — rendering the same result list twice
//! yields byte-identical output (spec §8).

pub mod http;
pub mod telegram;
pub mod whatsapp;

use crate::catalog::CatalogIndex;
use crate::model::{AttributeValue, Listing, RankedResult};

/// Attribute slugs shown in the compact per-listing line, in display order.
const DISPLAY_ATTRIBUTES: &[&str] = &["rooms", "bathrooms", "area", "year", "brand", "mileage"];

pub fn escape_html(input: &str) -> String {
    input
        .replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
        .replace('\'', "&#39;")
}

/// A listing projected for rendering — catalog lookups (city/neighborhood
/// names) resolved once, up front, so the renderers themselves stay pure
/// functions of plain data.
#[derive(Debug, Clone)]
pub struct ListingView {
    pub id: String,
    pub title: String,
    pub url: String,
    /// Always a display string — falls back to the localized placeholder
    /// when price is absent (spec §4.9); other missing attributes are
    /// simply omitted from `attribute_line`, never placeholder-filled.
    pub price: String,
    pub location: String,
    pub attribute_line: String,
}

fn format_price(listing: &Listing, language: &str) -> String {
    match listing.attribute("price") {
        Some(AttributeValue::Numeric { value, unit }) => match unit {
            Some(unit) => format!("{value:.0} {unit}"),
            None => format!("{value:.0}"),
        },
        Some(AttributeValue::Text(text)) => text.clone(),
        None => no_price_label(language).to_string(),
    }
}

fn format_location(listing: &Listing, catalog: &CatalogIndex, language: &str) -> String {
    let city = catalog.city_by_id(&listing.city_id);
    let city_name = city
        .map(|c| if language == "ar" { c.name_ar } else { c.name_en })
        .unwrap_or_default();

    let neighborhood_name = listing
        .neighborhood_id
        .as_deref()
        .and_then(|id| catalog.neighborhood_by_id(id))
        .map(|n| if language == "ar" { n.name_ar } else { n.name_en });

    match neighborhood_name {
        Some(neighborhood) if !neighborhood.is_empty() => format!("{neighborhood}, {city_name}"),
        _ => city_name,
    }
}

fn format_attribute_value(value: &AttributeValue) -> String {
    match value {
        AttributeValue::Numeric { value, unit } => match unit {
            Some(unit) => format!("{value:.0} {unit}"),
            None => format!("{value:.0}"),
        },
        AttributeValue::Text(text) => text.clone(),
    }
}

fn format_attribute_line(listing: &Listing) -> String {
    DISPLAY_ATTRIBUTES
        .iter()
        .filter_map(|slug| listing.attribute(slug).map(|v| format_attribute_value(v)))
        .collect::<Vec<_>>()
        .join(" · ")
}

fn listing_view(listing: &Listing, catalog: &CatalogIndex, language: &str) -> ListingView {
    ListingView {
        id: listing.id.clone(),
        title: listing.title.clone(),
        url: listing.url(),
        price: format_price(listing, language),
        location: format_location(listing, catalog, language),
        attribute_line: format_attribute_line(listing),
    }
}

pub fn build_views(results: &[RankedResult], catalog: &CatalogIndex, language: &str) -> Vec<ListingView> {
    results
        .iter()
        .map(|r| listing_view(&r.listing, catalog, language))
        .collect()
}

/// Same projection as [`build_views`], for the stats/entity intents that
/// hand back plain `Listing`s rather than scored `RankedResult`s (spec
/// §4.8) — the renderers are otherwise identical across both shapes.
pub fn build_views_from_listings(listings: &[Listing], catalog: &CatalogIndex, language: &str) -> Vec<ListingView> {
    listings.iter().map(|l| listing_view(l, catalog, language)).collect()
}

/// Up to 3 alternate queries synthesized from expanded keywords and sibling
/// categories (spec §4.9), for the HTTP envelope's `data.suggestions` and
/// the Telegram renderer's suggestion buttons.
pub fn build_suggestions(expanded_keywords: &[String], suggested_categories: &[String]) -> Vec<String> {
    let mut suggestions = Vec::new();
    for keyword in expanded_keywords.iter().skip(1) {
        if suggestions.len() >= 3 {
            break;
        }
        suggestions.push(keyword.clone());
    }
    for category in suggested_categories {
        if suggestions.len() >= 3 {
            break;
        }
        if !suggestions.contains(category) {
            suggestions.push(category.clone());
        }
    }
    suggestions.truncate(3);
    suggestions
}

const NO_PRICE_AR: &str = "غير محدد";
const NO_PRICE_EN: &str = "N/A";

pub fn no_price_label(language: &str) -> &'static str {
    if language == "ar" {
        NO_PRICE_AR
    } else {
        NO_PRICE_EN
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn escape_html_neutralizes_markup() {
        let out = escape_html("<script>alert('x')&\"y\"</script>");
        assert!(!out.contains('<'));
        assert!(!out.contains('>'));
        assert!(out.contains("&lt;"));
        assert!(out.contains("&amp;"));
    }

    #[test]
    fn suggestions_cap_at_three() {
        let keywords: Vec<String> = (0..10).map(|i| format!("kw{i}")).collect();
        let suggestions = build_suggestions(&keywords, &[]);
        assert!(suggestions.len() <= 3);
    }
}
