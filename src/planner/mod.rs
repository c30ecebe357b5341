//! Query Planner (spec §4.6): turns a cleaned search query into a `QueryPlan`
//! by asking the LLM to expand keywords and extract structured hints.

use crate::cache::{cache_key, namespace, Cache};
use crate::catalog::CatalogIndex;
use crate::llm::{LlmGateway, Task};
use crate::model::{
    normalize_expanded_keywords, LocationHint, QueryPlan, TransactionTypeSlug,
};
use std::sync::Arc;
use std::time::Duration;

#[derive(serde::Deserialize, Default)]
struct RawPlan {
    #[serde(rename = "mainKeyword")]
    main_keyword: Option<String>,
    #[serde(rename = "expandedKeywords")]
    expanded_keywords: Option<Vec<String>>,
    #[serde(rename = "suggestedCategories")]
    suggested_categories: Option<Vec<String>>,
    location: Option<String>,
    #[serde(rename = "transactionType")]
    transaction_type: Option<String>,
    #[serde(rename = "requestedAttributes")]
    requested_attributes: Option<std::collections::HashMap<String, String>>,
    #[serde(rename = "priceIndicator")]
    price_indicator: Option<String>,
    #[serde(rename = "conditionIndicator")]
    condition_indicator: Option<String>,
}

#[derive(serde::Deserialize)]
struct DeepenResponse {
    slug: Option<String>,
}

fn system_instruction(root_categories: &[String]) -> String {
    format!(
        r#"You analyze a classifieds search query (Arabic or English) and extract a
structured plan. The live root categories are: {categories}.

Return a single JSON object with fields:
- mainKeyword: the single most important search term.
- expandedKeywords: 4-5 orthographic/language variants of mainKeyword (synonyms,
  transliterations, common misspellings). Always include mainKeyword itself.
- suggestedCategories: zero or more of the root category slugs above that this
  query most likely belongs to.
- location: a city name mentioned in the query, or null.
- transactionType: one of "sale", "rent", "exchange", "wanted", "daily_rent",
  or null if not mentioned.
- requestedAttributes: an object mapping attribute slugs (e.g. "rooms", "price",
  "brand", "year", "color") to the raw value the user asked for, for every
  attribute constraint you can detect in the query.
- priceIndicator: a short free-text note about price intent ("cheap", "under
  50000"), or null.
- conditionIndicator: a short free-text note about condition ("new", "used"),
  or null."#,
        categories = root_categories.join(", ")
    )
}

const DEEPEN_INSTRUCTION: &str = r#"Given a non-leaf category and its immediate leaf subcategories, pick the
single leaf that best matches the user's query. Respond with {"slug": "..."},
or {"slug": null} if none of the subcategories fit."#;

pub struct QueryPlanner {
    cache: Arc<dyn Cache>,
    llm: Arc<dyn LlmGateway>,
    catalog: Arc<CatalogIndex>,
    ttl: Duration,
}

impl QueryPlanner {
    pub fn new(
        cache: Arc<dyn Cache>,
        llm: Arc<dyn LlmGateway>,
        catalog: Arc<CatalogIndex>,
        ttl: Duration,
    ) -> Self {
        Self {
            cache,
            llm,
            catalog,
            ttl,
        }
    }

    pub async fn plan(&self, query: &str, language: &str) -> QueryPlan {
        let key = cache_key(namespace::PARAMS, &format!("{query}\u{1}{language}"));
        if let Some(bytes) = self.cache.get(&key).await {
            if let Ok(plan) = serde_json::from_slice::<QueryPlan>(&bytes) {
                return plan;
            }
        }

        let plan = self.plan_via_llm(query, language).await;

        if let Ok(bytes) = serde_json::to_vec(&plan) {
            self.cache.set(&key, bytes, self.ttl).await;
        }
        plan
    }

    fn minimal_plan(&self, query: &str) -> QueryPlan {
        QueryPlan {
            main_keyword: query.to_string(),
            expanded_keywords: vec![query.to_string()],
            suggested_categories: Vec::new(),
            location: None,
            transaction_type: None,
            requested_attributes: Default::default(),
            price_indicator: None,
            condition_indicator: None,
        }
    }

    async fn plan_via_llm(&self, query: &str, language: &str) -> QueryPlan {
        let root_categories = self.catalog.root_category_names(language);
        let system = system_instruction(&root_categories);

        let response = match self.llm.chat_json(Task::Powerful, &system, query).await {
            Ok(value) => value,
            Err(err) => {
                tracing::warn!(error = %err, "query planner LLM call failed, degrading to minimal plan");
                return self.minimal_plan(query);
            }
        };

        let raw: RawPlan = match serde_json::from_value(response) {
            Ok(raw) => raw,
            Err(err) => {
                tracing::warn!(error = %err, "planner LLM response did not match schema, degrading to minimal plan");
                return self.minimal_plan(query);
            }
        };

        let main_keyword = raw
            .main_keyword
            .filter(|k| !k.trim().is_empty())
            .unwrap_or_else(|| query.to_string());

        let expanded_keywords = normalize_expanded_keywords(
            &main_keyword,
            &raw.expanded_keywords.unwrap_or_default(),
        );

        let mut suggested_categories = raw.suggested_categories.unwrap_or_default();
        self.deepen_non_leaf_categories(&mut suggested_categories, query).await;

        let location = raw.location.and_then(|text| {
            let trimmed = text.trim();
            if trimmed.is_empty() {
                return None;
            }
            match self.catalog.lookup_city(trimmed, language) {
                Some(city) => Some(LocationHint::ResolvedCity {
                    city_id: city.id.clone(),
                    label: if language == "ar" { city.name_ar } else { city.name_en },
                }),
                None => Some(LocationHint::FreeText(trimmed.to_string())),
            }
        });

        let transaction_type = raw
            .transaction_type
            .as_deref()
            .and_then(TransactionTypeSlug::from_str);

        QueryPlan {
            main_keyword,
            expanded_keywords,
            suggested_categories,
            location,
            transaction_type,
            requested_attributes: raw.requested_attributes.unwrap_or_default(),
            price_indicator: raw.price_indicator,
            condition_indicator: raw.condition_indicator,
        }
    }

    /// For every suggested category that isn't already a leaf, ask a cheap
    /// secondary prompt to narrow into one of its leaf children. Keeps the
    /// non-leaf slug as-is if the deepen attempt doesn't land on a leaf.
    async fn deepen_non_leaf_categories(&self, suggested: &mut Vec<String>, query: &str) {
        for slug in std::mem::take(suggested) {
            if self.catalog.is_leaf(&slug) {
                suggested.push(slug);
                continue;
            }

            let children = self.catalog.leaf_descendants(&slug);

            if children.is_empty() {
                suggested.push(slug);
                continue;
            }

            let user = format!(
                "Category: {slug}\nSubcategories: {}\nQuery: {query}",
                children.join(", ")
            );
            match self.llm.chat_json(Task::Fast, DEEPEN_INSTRUCTION, &user).await {
                Ok(value) => match serde_json::from_value::<DeepenResponse>(value) {
                    Ok(deepen) => {
                        let resolved = deepen
                            .slug
                            .filter(|s| self.catalog.is_leaf(s))
                            .unwrap_or(slug);
                        suggested.push(resolved);
                    }
                    Err(_) => suggested.push(slug),
                },
                Err(err) => {
                    tracing::debug!(error = %err, slug, "category deepen call failed, keeping non-leaf hint");
                    suggested.push(slug);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::NullCache;
    use crate::catalog::source::StaticCatalogSource;
    use crate::catalog::snapshot::RawCatalogData;
    use crate::llm::{ChatOptions, LlmError};
    use crate::model::{Attribute, AttributeDomain, Category, City, TransactionType};
    use async_trait::async_trait;

    struct FakeLlm {
        response: String,
    }

    #[async_trait]
    impl LlmGateway for FakeLlm {
        async fn chat(
            &self,
            _task: Task,
            _system: &str,
            _user: &str,
            _opts: ChatOptions,
        ) -> Result<String, LlmError> {
            Ok(self.response.clone())
        }

        async fn embed(&self, _texts: &[String]) -> Result<Vec<Vec<f32>>, LlmError> {
            Ok(vec![])
        }

        fn usage(&self) -> (u64, u64) {
            (0, 0)
        }
    }

    struct FailingLlm;

    #[async_trait]
    impl LlmGateway for FailingLlm {
        async fn chat(
            &self,
            _task: Task,
            _system: &str,
            _user: &str,
            _opts: ChatOptions,
        ) -> Result<String, LlmError> {
            Err(LlmError::Transport("boom".into()))
        }

        async fn embed(&self, _texts: &[String]) -> Result<Vec<Vec<f32>>, LlmError> {
            Err(LlmError::Transport("boom".into()))
        }

        fn usage(&self) -> (u64, u64) {
            (0, 0)
        }
    }

    async fn sample_catalog() -> Arc<CatalogIndex> {
        let raw = RawCatalogData {
            categories: vec![
                Category {
                    id: "1".into(),
                    slug: "cars".into(),
                    name_ar: "سيارات".into(),
                    name_en: "Cars".into(),
                    parent_slug: None,
                    is_leaf: false,
                    display_order: 0,
                    active: true,
                },
                Category {
                    id: "2".into(),
                    slug: "sedans".into(),
                    name_ar: "سيدان".into(),
                    name_en: "Sedans".into(),
                    parent_slug: Some("cars".into()),
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
                slug: TransactionTypeSlug::Sale,
                name_ar: "بيع".into(),
                name_en: "Sale".into(),
            }],
            attributes: vec![Attribute {
                id: "a1".into(),
                slug: "brand".into(),
                domain: AttributeDomain::Text,
                display_unit: None,
                category_slug: "sedans".into(),
            }],
        };
        let source = Arc::new(StaticCatalogSource::new(raw));
        Arc::new(CatalogIndex::init(source, None).await.unwrap())
    }

    #[tokio::test]
    async fn llm_failure_degrades_to_minimal_plan() {
        let catalog = sample_catalog().await;
        let planner = QueryPlanner::new(
            Arc::new(NullCache),
            Arc::new(FailingLlm),
            catalog,
            Duration::from_secs(3600),
        );
        let plan = planner.plan("تويوتا كامري", "ar").await;
        assert_eq!(plan.main_keyword, "تويوتا كامري");
        assert_eq!(plan.expanded_keywords, vec!["تويوتا كامري".to_string()]);
        assert!(plan.suggested_categories.is_empty());
    }

    #[tokio::test]
    async fn resolves_location_against_catalog() {
        let catalog = sample_catalog().await;
        let llm = FakeLlm {
            response: r#"{"mainKeyword":"كامري","expandedKeywords":["كامري","camry"],
                "suggestedCategories":[],"location":"دمشق","transactionType":"sale",
                "requestedAttributes":{},"priceIndicator":null,"conditionIndicator":null}"#
                .to_string(),
        };
        let planner =
            QueryPlanner::new(Arc::new(NullCache), Arc::new(llm), catalog, Duration::from_secs(3600));
        let plan = planner.plan("كامري دمشق", "ar").await;
        match plan.location {
            Some(LocationHint::ResolvedCity { city_id, .. }) => assert_eq!(city_id, "damascus"),
            other => panic!("expected resolved city, got {other:?}"),
        }
        assert_eq!(plan.transaction_type, Some(TransactionTypeSlug::Sale));
    }

    #[tokio::test]
    async fn unresolved_location_stays_free_text() {
        let catalog = sample_catalog().await;
        let llm = FakeLlm {
            response: r#"{"mainKeyword":"كامري","expandedKeywords":["كامري"],
                "suggestedCategories":[],"location":"حلب","transactionType":null,
                "requestedAttributes":{},"priceIndicator":null,"conditionIndicator":null}"#
                .to_string(),
        };
        let planner =
            QueryPlanner::new(Arc::new(NullCache), Arc::new(llm), catalog, Duration::from_secs(3600));
        let plan = planner.plan("كامري حلب", "ar").await;
        assert!(matches!(plan.location, Some(LocationHint::FreeText(_))));
    }
}
