//! Telegram channel renderer (spec §4.9): HTML parse mode, inline buttons.

use super::{build_suggestions, build_views, escape_html};
use crate::catalog::CatalogIndex;
use crate::model::{QueryPlan, SearchOutcome};

const MAX_LISTINGS: usize = 5;

#[derive(Debug, Clone, serde::Serialize)]
pub struct InlineButton {
    pub text: String,
    pub callback_data: String,
}

#[derive(Debug, Clone, serde::Serialize)]
pub struct TelegramMessage {
    pub text: String,
    pub parse_mode: &'static str,
    pub buttons: Vec<InlineButton>,
    pub disable_web_page_preview: bool,
}

pub fn render_search(
    outcome: &SearchOutcome,
    plan: &QueryPlan,
    catalog: &CatalogIndex,
    language: &str,
) -> TelegramMessage {
    let views = build_views(&outcome.results, catalog, language);
    let shown: Vec<_> = views.iter().take(MAX_LISTINGS).collect();

    let mut lines = Vec::new();
    if shown.is_empty() {
        if let Some(message) = &outcome.fallback_message {
            lines.push(escape_html(message));
        }
    }
    for view in &shown {
        let title = escape_html(&view.title);
        let location = escape_html(&view.location);
        let price = escape_html(&view.price);
        let mut block = format!("<b>{title}</b>\n{price}\n{location}");
        if !view.attribute_line.is_empty() {
            block.push('\n');
            block.push_str(&escape_html(&view.attribute_line));
        }
        block.push_str(&format!("\n<a href=\"{}\">{}</a>", view.url, view.url));
        lines.push(block);
    }

    let text = lines.join("\n\n");

    let mut buttons = Vec::new();
    if outcome.pagination.total > MAX_LISTINGS as u64 {
        buttons.push(InlineButton {
            text: "عرض الكل على الموقع".to_string(),
            callback_data: format!("{}/listings", crate::model::WEBSITE_BASE_URL),
        });
    }
    buttons.push(InlineButton {
        text: "بحث جديد".to_string(),
        callback_data: "new_search".to_string(),
    });
    for suggestion in build_suggestions(&plan.expanded_keywords, &plan.suggested_categories)
        .into_iter()
        .take(2)
    {
        buttons.push(InlineButton {
            text: suggestion.clone(),
            callback_data: format!("search:{suggestion}"),
        });
    }

    TelegramMessage {
        text,
        parse_mode: "HTML",
        buttons,
        disable_web_page_preview: false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::snapshot::RawCatalogData;
    use crate::catalog::source::StaticCatalogSource;
    use crate::model::{Listing, ListingStatus, Pagination, RankedResult, StrategyTag};
    use crate::model::{AttributeMatchType, MatchBreakdown, TextMatchType, TransactionTypeSlug};
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
    async fn caps_at_five_listings_and_escapes_titles() {
        let catalog = empty_catalog().await;
        let results: Vec<RankedResult> = (0..8)
            .map(|i| ranked(&i.to_string(), &format!("<b>title {i}</b>")))
            .collect();
        let outcome = SearchOutcome {
            results,
            pagination: Pagination { page: 1, limit: 8, total: 8 },
            strategy: StrategyTag::Strict,
            fallback_message: None,
        };
        let plan = QueryPlan::default();
        let message = render_search(&outcome, &plan, &catalog, "ar");
        assert!(!message.text.contains("<b>title"));
        assert!(message.buttons.iter().any(|b| b.callback_data.ends_with("/listings")));
    }
}
