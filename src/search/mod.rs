//! Search Executor (spec §4.7): the strategy ladder, text matching, and
//! attribute re-ranking that turn a `QueryPlan` into ranked results.

pub mod scoring;
pub mod store;
pub mod text;

use crate::catalog::CatalogIndex;
use crate::model::{
    AttributeMatchType, Pagination, QueryPlan, RankedResult, SearchOutcome, StrategyTag,
};
use scoring::{score_listing, DEFAULT_MIN_SCORE};
use std::sync::Arc;
use store::{enrich_attributes, ListingFilter, ListingStore};

pub struct SearchExecutor {
    store: Arc<dyn ListingStore>,
    catalog: Arc<CatalogIndex>,
    min_score: u32,
}

impl SearchExecutor {
    pub fn new(store: Arc<dyn ListingStore>, catalog: Arc<CatalogIndex>) -> Self {
        Self {
            store,
            catalog,
            min_score: DEFAULT_MIN_SCORE,
        }
    }

    pub fn with_min_score(mut self, min_score: u32) -> Self {
        self.min_score = min_score;
        self
    }

    /// First leaf slug in `suggested_categories`, if any.
    fn leaf_category(&self, plan: &QueryPlan) -> Option<String> {
        plan.suggested_categories
            .iter()
            .find(|slug| self.catalog.is_leaf(slug))
            .cloned()
    }

    fn resolved_city_id(&self, plan: &QueryPlan) -> Option<String> {
        match &plan.location {
            Some(crate::model::LocationHint::ResolvedCity { city_id, .. }) => {
                Some(city_id.clone())
            }
            _ => None,
        }
    }

    /// Fetch candidates for a filter, score them against the plan's expanded
    /// keywords, drop non-matches and excluded listings, and return the
    /// ranked subset ordered by the fetch order (spec §4.7.3) — match score
    /// gates inclusion, but does not reorder results within a strategy.
    async fn run_rung(
        &self,
        plan: &QueryPlan,
        filter: &ListingFilter,
        limit: usize,
    ) -> anyhow::Result<Vec<RankedResult>> {
        let fetch_limit = limit.saturating_mul(3).max(limit);
        let mut candidates = self.store.fetch_candidates(filter, fetch_limit).await?;
        enrich_attributes(self.store.as_ref(), &mut candidates).await?;

        let mut ranked = Vec::new();
        for listing in candidates {
            let haystack = format!("{} {}", listing.title, listing.description);
            let text_match = text::best_text_match(&plan.expanded_keywords, &haystack);
            if text_match == crate::model::TextMatchType::None {
                continue;
            }

            let scored = score_listing(plan, &listing, text_match, &self.catalog);
            if scored.excluded_reason.is_some() {
                continue;
            }
            if scored.score < self.min_score {
                continue;
            }

            ranked.push(RankedResult {
                listing,
                match_score: scored.score,
                breakdown: scored.breakdown,
                attribute_match: scored.attribute_match,
                matched_attributes: scored.matched_attributes,
                unmatched_attributes: scored.unmatched_attributes,
                exclusion_reason: None,
            });
        }

        Ok(ranked)
    }

    /// Run the six-rung strategy ladder (spec §4.7.1) and paginate the
    /// winning rung's results.
    pub async fn search(
        &self,
        plan: &QueryPlan,
        page: u32,
        limit: u32,
    ) -> anyhow::Result<SearchOutcome> {
        let limit_usize = limit as usize;
        let leaf_category = self.leaf_category(plan);
        let city_id = self.resolved_city_id(plan);

        let strict_filter = ListingFilter {
            category_slugs: leaf_category.clone().map(|s| vec![s]),
            city_id: city_id.clone(),
            transaction_type: plan.transaction_type,
        };
        let ranked = self.run_rung(plan, &strict_filter, limit_usize).await?;
        if !ranked.is_empty() {
            return Ok(self.finish(ranked, page, limit, StrategyTag::Strict, None));
        }

        let relaxed_location_filter = ListingFilter {
            category_slugs: leaf_category.clone().map(|s| vec![s]),
            city_id: None,
            transaction_type: plan.transaction_type,
        };
        let ranked = self.run_rung(plan, &relaxed_location_filter, limit_usize).await?;
        if !ranked.is_empty() {
            return Ok(self.finish(ranked, page, limit, StrategyTag::RelaxedLocation, None));
        }

        let relaxed_category_filter = ListingFilter {
            category_slugs: None,
            city_id: city_id.clone(),
            transaction_type: plan.transaction_type,
        };
        let ranked = self.run_rung(plan, &relaxed_category_filter, limit_usize).await?;
        if !ranked.is_empty() {
            return Ok(self.finish(ranked, page, limit, StrategyTag::RelaxedCategory, None));
        }

        let text_only_filter = ListingFilter::default();
        let ranked = self.run_rung(plan, &text_only_filter, limit_usize).await?;
        if !ranked.is_empty() {
            return Ok(self.finish(ranked, page, limit, StrategyTag::TextOnly, None));
        }

        for category in &plan.suggested_categories {
            if self.catalog.is_leaf(category) {
                continue; // already tried as the strict/relaxed leaf above.
            }
            let subtree = self.catalog.leaf_descendants(category);
            if subtree.is_empty() {
                continue;
            }
            let filter = ListingFilter {
                category_slugs: Some(subtree),
                city_id: None,
                transaction_type: plan.transaction_type,
            };
            let ranked = self.run_rung(plan, &filter, limit_usize).await?;
            if !ranked.is_empty() {
                return Ok(self.finish(ranked, page, limit, StrategyTag::SuggestedCategory, None));
            }
        }

        Ok(SearchOutcome {
            results: Vec::new(),
            pagination: Pagination { page, limit, total: 0 },
            strategy: StrategyTag::NoResults,
            fallback_message: Some(no_results_message()),
        })
    }

    fn finish(
        &self,
        ranked: Vec<RankedResult>,
        page: u32,
        limit: u32,
        strategy: StrategyTag,
        fallback_message: Option<String>,
    ) -> SearchOutcome {
        let total = ranked.len() as u64;
        let start = ((page.saturating_sub(1)) as usize) * (limit as usize);
        let page_slice: Vec<RankedResult> = ranked.into_iter().skip(start).take(limit as usize).collect();

        SearchOutcome {
            results: page_slice,
            pagination: Pagination { page, limit, total },
            strategy,
            fallback_message,
        }
    }
}

fn no_results_message() -> String {
    "لم يتم العثور على نتائج مطابقة تمامًا، جرّب كلمات بحث مختلفة".to_string()
}

/// For each returned result, `type = exact` iff every requested attribute
/// satisfied (spec §4.7.5) — exposed for renderers that want a plain bool.
pub fn is_exact_attribute_match(kind: AttributeMatchType) -> bool {
    matches!(kind, AttributeMatchType::Exact)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::snapshot::RawCatalogData;
    use crate::catalog::source::StaticCatalogSource;
    use crate::model::{
        Attribute, AttributeDomain, AttributeValue, Category, City, Listing, ListingAttribute,
        ListingStatus, LocationHint, TransactionType, TransactionTypeSlug,
    };
    use std::collections::HashMap;
    use store::InMemoryListingStore;

    fn listing(id: &str, category_slug: &str, city_id: &str, title: &str) -> Listing {
        Listing {
            id: id.into(),
            title: title.into(),
            description: String::new(),
            category_slug: category_slug.into(),
            city_id: city_id.into(),
            neighborhood_id: None,
            transaction_type: TransactionTypeSlug::Rent,
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
            attributes: vec![ListingAttribute {
                attribute_slug: "rooms".into(),
                value: AttributeValue::Numeric { value: 3.0, unit: None },
            }],
        }
    }

    async fn sample_catalog() -> Arc<CatalogIndex> {
        let raw = RawCatalogData {
            categories: vec![
                Category {
                    id: "1".into(),
                    slug: "real-estate".into(),
                    name_ar: "عقارات".into(),
                    name_en: "Real Estate".into(),
                    parent_slug: None,
                    is_leaf: false,
                    display_order: 0,
                    active: true,
                },
                Category {
                    id: "2".into(),
                    slug: "apartments".into(),
                    name_ar: "شقق".into(),
                    name_en: "Apartments".into(),
                    parent_slug: Some("real-estate".into()),
                    is_leaf: true,
                    display_order: 0,
                    active: true,
                },
            ],
            cities: vec![City {
                id: "damascus".into(),
                name_ar: "دمشق".into(),
                name_en: "Damascus".into(),
                province: "Damascus".into(),
            }],
            neighborhoods: vec![],
            transaction_types: vec![TransactionType {
                id: "t1".into(),
                slug: TransactionTypeSlug::Rent,
                name_ar: "إيجار".into(),
                name_en: "Rent".into(),
            }],
            attributes: vec![Attribute {
                id: "a1".into(),
                slug: "rooms".into(),
                domain: AttributeDomain::Number,
                display_unit: None,
                category_slug: "apartments".into(),
            }],
        };
        let source = Arc::new(StaticCatalogSource::new(raw));
        Arc::new(CatalogIndex::init(source, None).await.unwrap())
    }

    fn plan_with(expanded_keywords: Vec<String>) -> QueryPlan {
        QueryPlan {
            main_keyword: expanded_keywords.first().cloned().unwrap_or_default(),
            expanded_keywords,
            suggested_categories: vec!["apartments".to_string()],
            location: Some(LocationHint::ResolvedCity {
                city_id: "damascus".into(),
                label: "دمشق".into(),
            }),
            transaction_type: Some(TransactionTypeSlug::Rent),
            requested_attributes: {
                let mut m = HashMap::new();
                m.insert("rooms".to_string(), "3".to_string());
                m
            },
            price_indicator: None,
            condition_indicator: None,
        }
    }

    #[tokio::test]
    async fn strict_strategy_wins_when_everything_agrees() {
        let catalog = sample_catalog().await;
        let store = Arc::new(InMemoryListingStore::new(vec![listing(
            "1",
            "apartments",
            "damascus",
            "شقة للايجار في دمشق",
        )]));
        let executor = SearchExecutor::new(store, catalog);
        let plan = plan_with(vec!["شقة".to_string()]);
        let outcome = executor.search(&plan, 1, 10).await.unwrap();
        assert_eq!(outcome.strategy, StrategyTag::Strict);
        assert_eq!(outcome.results.len(), 1);
        assert!(outcome.results[0].match_score >= 55);
    }

    #[tokio::test]
    async fn falls_back_through_the_ladder_to_text_only() {
        let catalog = sample_catalog().await;
        // Same category, wrong city — strict and relaxed-location both miss
        // on the structured filters the catalog actually has, but text-only
        // should still find it by keyword.
        let store = Arc::new(InMemoryListingStore::new(vec![listing(
            "1",
            "apartments",
            "aleppo",
            "شقة جميلة للايجار",
        )]));
        let executor = SearchExecutor::new(store, catalog);
        let plan = plan_with(vec!["شقة".to_string()]);
        let outcome = executor.search(&plan, 1, 10).await.unwrap();
        assert!(matches!(
            outcome.strategy,
            StrategyTag::RelaxedLocation | StrategyTag::TextOnly
        ));
        assert_eq!(outcome.results.len(), 1);
    }

    #[tokio::test]
    async fn no_matches_anywhere_yields_no_results_with_fallback_message() {
        let catalog = sample_catalog().await;
        let store = Arc::new(InMemoryListingStore::new(vec![listing(
            "1",
            "apartments",
            "damascus",
            "شقة للايجار",
        )]));
        let executor = SearchExecutor::new(store, catalog);
        let plan = plan_with(vec!["غواصة كهربائية".to_string()]);
        let outcome = executor.search(&plan, 1, 10).await.unwrap();
        assert_eq!(outcome.strategy, StrategyTag::NoResults);
        assert!(outcome.results.is_empty());
        assert!(outcome.fallback_message.is_some());
    }

    #[tokio::test]
    async fn pagination_never_returns_more_than_limit() {
        let catalog = sample_catalog().await;
        let listings: Vec<Listing> = (0..5)
            .map(|i| listing(&i.to_string(), "apartments", "damascus", "شقة للايجار"))
            .collect();
        let store = Arc::new(InMemoryListingStore::new(listings));
        let executor = SearchExecutor::new(store, catalog);
        let plan = plan_with(vec!["شقة".to_string()]);
        let outcome = executor.search(&plan, 1, 2).await.unwrap();
        assert!(outcome.results.len() <= 2);
        assert!(outcome.results.len() as u64 <= outcome.pagination.total);
    }
}
