//! HTTP/JSON channel renderer (spec §4.9).

use super::{build_suggestions, build_views, build_views_from_listings, escape_html};
use crate::catalog::CatalogIndex;
use crate::model::{IntentKind, Listing, Office, Pagination, QueryPlan, SearchOutcome};
use crate::stats::OfficeDetails;
use serde::Serialize;

#[derive(Debug, Serialize)]
pub struct QuerySummary {
    pub original: String,
    pub main_keyword: String,
    pub expanded_keywords: Vec<String>,
}

#[derive(Debug, Serialize)]
pub struct ListingPayload {
    pub id: String,
    pub title: String,
    pub url: String,
    pub price: String,
    pub location: String,
    pub attributes: String,
    pub match_score: u32,
}

#[derive(Debug, Serialize)]
pub struct SearchResponseData {
    pub query: QuerySummary,
    pub listings: Vec<ListingPayload>,
    pub pagination: Pagination,
    pub suggestions: Vec<String>,
    pub fallback_message: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct ResponseMeta {
    pub timestamp: chrono::DateTime<chrono::Utc>,
    pub intent: IntentKind,
    pub elapsed_ms: u64,
    pub pagination: Pagination,
}

#[derive(Debug, Serialize)]
pub struct ResponseEnvelope {
    pub success: bool,
    pub data: SearchResponseData,
    pub meta: ResponseMeta,
}

/// Build the success envelope for a `search` intent response. `timestamp`
/// is taken as a parameter rather than read from the clock here, so the
/// renderer itself stays a pure function of its inputs.
pub fn render_search(
    outcome: &SearchOutcome,
    plan: &QueryPlan,
    original_query: &str,
    intent: IntentKind,
    elapsed_ms: u64,
    timestamp: chrono::DateTime<chrono::Utc>,
    catalog: &CatalogIndex,
    language: &str,
) -> ResponseEnvelope {
    let views = build_views(&outcome.results, catalog, language);
    let listings = outcome
        .results
        .iter()
        .zip(views.iter())
        .map(|(ranked, view)| ListingPayload {
            id: view.id.clone(),
            title: escape_html(&view.title),
            url: view.url.clone(),
            price: view.price.clone(),
            location: escape_html(&view.location),
            attributes: view.attribute_line.clone(),
            match_score: ranked.match_score,
        })
        .collect();

    let suggestions = build_suggestions(&plan.expanded_keywords, &plan.suggested_categories);

    ResponseEnvelope {
        success: true,
        data: SearchResponseData {
            query: QuerySummary {
                original: escape_html(original_query),
                main_keyword: plan.main_keyword.clone(),
                expanded_keywords: plan.expanded_keywords.clone(),
            },
            listings,
            pagination: outcome.pagination.clone(),
            suggestions,
            fallback_message: outcome.fallback_message.clone(),
        },
        meta: ResponseMeta {
            timestamp,
            intent,
            elapsed_ms,
            pagination: outcome.pagination.clone(),
        },
    }
}

#[derive(Debug, Serialize)]
pub struct ListingsEnvelope {
    pub success: bool,
    pub data: ListingsData,
    pub meta: ResponseMeta,
}

#[derive(Debug, Serialize)]
pub struct ListingsData {
    pub listings: Vec<ListingPayload>,
    pub pagination: Pagination,
}

/// Renders the non-search "stats/entity" intents (most-viewed,
/// most-impressioned, office listings) with the same listing card shape as
/// `render_search`, just without a query/plan section (spec §4.8).
pub fn render_listings(
    listings: &[Listing],
    pagination: &Pagination,
    intent: IntentKind,
    elapsed_ms: u64,
    timestamp: chrono::DateTime<chrono::Utc>,
    catalog: &CatalogIndex,
    language: &str,
) -> ListingsEnvelope {
    let views = build_views_from_listings(listings, catalog, language);
    let payloads = views
        .into_iter()
        .map(|view| ListingPayload {
            id: view.id,
            title: escape_html(&view.title),
            url: view.url,
            price: view.price,
            location: escape_html(&view.location),
            attributes: view.attribute_line,
            match_score: 0,
        })
        .collect();

    ListingsEnvelope {
        success: true,
        data: ListingsData {
            listings: payloads,
            pagination: pagination.clone(),
        },
        meta: ResponseMeta {
            timestamp,
            intent,
            elapsed_ms,
            pagination: pagination.clone(),
        },
    }
}

#[derive(Debug, Serialize)]
pub struct OfficePayload {
    pub id: String,
    pub name: String,
    pub phone: String,
    pub url: String,
    pub premium: bool,
    pub rating: Option<f64>,
}

fn office_payload(office: &Office) -> OfficePayload {
    OfficePayload {
        id: office.id.clone(),
        name: escape_html(&office.name),
        phone: office.phone.clone(),
        url: office.url(),
        premium: office.premium,
        rating: office.rating,
    }
}

#[derive(Debug, Serialize)]
pub struct OfficesEnvelope {
    pub success: bool,
    pub data: Vec<OfficePayload>,
}

pub fn render_offices(offices: &[Office]) -> OfficesEnvelope {
    OfficesEnvelope {
        success: true,
        data: offices.iter().map(office_payload).collect(),
    }
}

#[derive(Debug, Serialize)]
pub struct OfficeDetailsPayload {
    pub office: OfficePayload,
    pub active_listings_count: u64,
    pub total_listings_count: u64,
}

#[derive(Debug, Serialize)]
pub struct OfficeDetailsEnvelope {
    pub success: bool,
    pub data: OfficeDetailsPayload,
}

pub fn render_office_details(details: &OfficeDetails) -> OfficeDetailsEnvelope {
    OfficeDetailsEnvelope {
        success: true,
        data: OfficeDetailsPayload {
            office: office_payload(&details.office),
            active_listings_count: details.active_listings_count,
            total_listings_count: details.total_listings_count,
        },
    }
}

#[derive(Debug, Serialize)]
pub struct MessageEnvelope {
    pub success: bool,
    pub data: MessageData,
}

#[derive(Debug, Serialize)]
pub struct MessageData {
    pub message: String,
}

/// Canned, localized replies for the `greeting`/`help` intents, which never
/// touch the catalog, cache, or store (spec §4.5).
pub fn render_message(intent: IntentKind, language: &str) -> MessageEnvelope {
    let message = match (intent, language) {
        (IntentKind::Greeting, "ar") => "أهلاً! كيف أقدر أساعدك بالبحث عن إعلان اليوم؟",
        (IntentKind::Greeting, _) => "Hello! What are you looking for today?",
        (IntentKind::Help, "ar") => {
            "اكتب وصف الإعلان اللي بتدور عليه، مثلاً: \"شقة للإيجار بدمشق 3 غرف\"."
        }
        (IntentKind::Help, _) => {
            "Describe what you're looking for, e.g. \"apartment for rent in Damascus, 3 rooms\"."
        }
        (_, "ar") => "",
        (_, _) => "",
    };
    MessageEnvelope {
        success: true,
        data: MessageData {
            message: message.to_string(),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::snapshot::RawCatalogData;
    use crate::catalog::source::StaticCatalogSource;
    use crate::model::{StrategyTag};
    use std::sync::Arc;

    async fn empty_catalog() -> CatalogIndex {
        let source = Arc::new(StaticCatalogSource::new(RawCatalogData::default()));
        CatalogIndex::init(source, None).await.unwrap()
    }

    #[tokio::test]
    async fn rendering_twice_is_byte_identical() {
        let catalog = empty_catalog().await;
        let plan = QueryPlan {
            main_keyword: "شقة".into(),
            expanded_keywords: vec!["شقة".into()],
            ..Default::default()
        };
        let outcome = SearchOutcome {
            results: vec![],
            pagination: Pagination { page: 1, limit: 10, total: 0 },
            strategy: StrategyTag::NoResults,
            fallback_message: Some("لا نتائج".into()),
        };
        let ts = chrono::DateTime::from_timestamp(1_700_000_000, 0).unwrap();
        let first = render_search(&outcome, &plan, "شقة", IntentKind::Search, 12, ts, &catalog, "ar");
        let second = render_search(&outcome, &plan, "شقة", IntentKind::Search, 12, ts, &catalog, "ar");
        assert_eq!(
            serde_json::to_string(&first).unwrap(),
            serde_json::to_string(&second).unwrap()
        );
    }

    #[tokio::test]
    async fn escapes_html_in_original_query() {
        let catalog = empty_catalog().await;
        let plan = QueryPlan::default();
        let outcome = SearchOutcome {
            results: vec![],
            pagination: Pagination { page: 1, limit: 10, total: 0 },
            strategy: StrategyTag::NoResults,
            fallback_message: None,
        };
        let ts = chrono::Utc::now();
        let envelope = render_search(
            &outcome,
            &plan,
            "<script>alert(1)</script>",
            IntentKind::Search,
            1,
            ts,
            &catalog,
            "en",
        );
        assert!(!envelope.data.query.original.contains('<'));
    }

    #[tokio::test]
    async fn render_listings_sets_neutral_match_score() {
        use crate::model::{ListingStatus, TransactionTypeSlug};
        let catalog = empty_catalog().await;
        let listing = Listing {
            id: "1".into(),
            title: "شقة".into(),
            description: String::new(),
            category_slug: "cars".into(),
            city_id: "damascus".into(),
            neighborhood_id: None,
            transaction_type: TransactionTypeSlug::Sale,
            views: 10,
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
        };
        let pagination = Pagination { page: 1, limit: 10, total: 1 };
        let ts = chrono::Utc::now();
        let envelope = render_listings(
            &[listing],
            &pagination,
            IntentKind::MostViewed,
            3,
            ts,
            &catalog,
            "ar",
        );
        assert_eq!(envelope.data.listings[0].match_score, 0);
        assert_eq!(envelope.data.listings[0].url, "https://www.kasioon.com/listing/1");
    }

    #[test]
    fn render_message_is_localized() {
        let ar = render_message(IntentKind::Greeting, "ar");
        let en = render_message(IntentKind::Greeting, "en");
        assert_ne!(ar.data.message, en.data.message);
        assert!(!ar.data.message.is_empty());
    }
}
