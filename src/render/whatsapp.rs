//! WhatsApp channel renderer (spec §4.9): plain text, asterisk bold, rule
//! lines, pagination handled via a link to the website.

use super::build_views;
use crate::catalog::CatalogIndex;
use crate::model::{SearchOutcome, WEBSITE_BASE_URL};

const MAX_LISTINGS: usize = 3;
const RULE: &str = "----------";

/// WhatsApp has no markup to escape beyond its own bold/italic markers, so
/// this strips characters that would otherwise break the asterisk-bold
/// convention rather than HTML-escaping (spec §4.9 "text-escape").
fn text_escape(input: &str) -> String {
    input.replace('*', "").replace('_', "")
}

pub fn render_search(outcome: &SearchOutcome, catalog: &CatalogIndex, language: &str) -> String {
    let views = build_views(&outcome.results, catalog, language);
    let shown: Vec<_> = views.iter().take(MAX_LISTINGS).collect();

    if shown.is_empty() {
        return outcome
            .fallback_message
            .as_deref()
            .map(text_escape)
            .unwrap_or_default();
    }

    let mut blocks = Vec::new();
    for view in &shown {
        let mut block = format!("*{}*\n{}\n{}", text_escape(&view.title), view.price, text_escape(&view.location));
        if !view.attribute_line.is_empty() {
            block.push('\n');
            block.push_str(&text_escape(&view.attribute_line));
        }
        block.push('\n');
        block.push_str(&view.url);
        blocks.push(block);
    }

    let mut text = blocks.join(&format!("\n{RULE}\n"));

    if outcome.pagination.total > MAX_LISTINGS as u64 {
        text.push_str(&format!("\n{RULE}\n"));
        let more_label = if language == "ar" {
            "لمشاهدة المزيد من النتائج"
        } else {
            "See more results"
        };
        text.push_str(&format!("{more_label}: {WEBSITE_BASE_URL}/search"));
    }

    text
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::snapshot::RawCatalogData;
    use crate::catalog::source::StaticCatalogSource;
    use crate::model::{
        AttributeMatchType, Listing, ListingStatus, MatchBreakdown, Pagination, RankedResult,
        StrategyTag, TextMatchType, TransactionTypeSlug,
    };
    use std::sync::Arc;

    async fn empty_catalog() -> CatalogIndex {
        let source = Arc::new(StaticCatalogSource::new(RawCatalogData::default()));
        CatalogIndex::init(source, None).await.unwrap()
    }

    fn ranked(id: &str, title: &str) -> RankedResult {
        RankedResult {
            listing: Listing {
                id: id.into(),
                title: title.into(),
                description: String::new(),
                category_slug: "cars".into(),
                city_id: "damascus".into(),
                neighborhood_id: None,
                transaction_type: TransactionTypeSlug::Sale,
                views: 0,
                boosted: false,
                priority: 0,
                created_at: chrono::Utc::now(),
                status: ListingStatus::Active,
                images: vec![],
                main_image: None,
                videos: vec![],
                office_id: None,
                user_id: None,
                attributes: vec![],
            },
            match_score: 80,
            breakdown: MatchBreakdown {
                city: false,
                neighborhood: false,
                transaction_type: false,
                text: TextMatchType::Exact,
                attributes_satisfied: 0,
            },
            attribute_match: AttributeMatchType::NoMatch,
            matched_attributes: vec![],
            unmatched_attributes: vec![],
            exclusion_reason: None,
        }
    }

    #[tokio::test]
    async fn caps_at_three_and_appends_website_link_when_more_exist() {
        let catalog = empty_catalog().await;
        let results: Vec<RankedResult> = (0..6).map(|i| ranked(&i.to_string(), "title")).collect();
        let outcome = SearchOutcome {
            results,
            pagination: Pagination { page: 1, limit: 6, total: 6 },
            strategy: StrategyTag::Strict,
            fallback_message: None,
        };
        let text = render_search(&outcome, &catalog, "ar");
        assert_eq!(text.matches("*title*").count(), 3);
        assert!(text.contains(WEBSITE_BASE_URL));
    }

    #[tokio::test]
    async fn rendering_is_idempotent() {
        let catalog = empty_catalog().await;
        let outcome = SearchOutcome {
            results: vec![ranked("1", "شقة")],
            pagination: Pagination { page: 1, limit: 10, total: 1 },
            strategy: StrategyTag::Strict,
            fallback_message: None,
        };
        let a = render_search(&outcome, &catalog, "ar");
        let b = render_search(&outcome, &catalog, "ar");
        assert_eq!(a, b);
    }
}
