//! Orchestrator (spec §4.4, §5): the sequential pipeline that turns one
//! channel request into one rendered response. Dispatches on `IntentKind`,
//! enforces the per-request deadline, and never lets a downstream error
//! surface as anything but a clean `AppError` — callers never see a panic
//! or a partially-applied result.

use crate::catalog::CatalogIndex;
use crate::error::{AppError, AppResult};
use crate::intent::IntentClassifier;
use crate::model::{Intent, IntentKind, Listing, Office, Pagination, QueryPlan, SearchOutcome};
use crate::planner::QueryPlanner;
use crate::search::SearchExecutor;
use crate::stats::{OfficeDetails, StatsError, StatsQueries};
use std::sync::Arc;
use std::time::Duration;

/// Default per-request deadline (spec §5): past this, the whole pipeline is
/// abandoned and a timeout error is returned instead of a partial result.
pub const REQUEST_DEADLINE: Duration = Duration::from_secs(45);

#[derive(Debug, Clone)]
pub struct Request {
    pub query: String,
    pub language: String,
    pub page: u32,
    pub limit: u32,
    /// Pre-resolved office id or name, for channels that route directly to
    /// an office rather than going through intent classification first
    /// (e.g. the `/api/search/category/:categoryId` shortcut does not use
    /// this; office routes populate it from the classified `Intent`).
    pub office_id: Option<String>,
}

/// Everything downstream renderers need, independent of channel. One result
/// shape per intent family; the HTTP/Telegram/WhatsApp renderers each pick
/// the fields they render.
pub enum PipelineOutput {
    Search {
        outcome: SearchOutcome,
        plan: QueryPlan,
    },
    Listings {
        listings: Vec<Listing>,
        pagination: Pagination,
    },
    Offices(Vec<Office>),
    OfficeDetails(OfficeDetails),
    Greeting,
    Help,
}

pub struct Orchestrator {
    catalog: Arc<CatalogIndex>,
    intent_classifier: IntentClassifier,
    query_planner: QueryPlanner,
    search_executor: SearchExecutor,
    stats: StatsQueries,
    deadline: Duration,
}

impl Orchestrator {
    pub fn new(
        catalog: Arc<CatalogIndex>,
        intent_classifier: IntentClassifier,
        query_planner: QueryPlanner,
        search_executor: SearchExecutor,
        stats: StatsQueries,
    ) -> Self {
        Self {
            catalog,
            intent_classifier,
            query_planner,
            search_executor,
            stats,
            deadline: REQUEST_DEADLINE,
        }
    }

    pub fn with_deadline(mut self, deadline: Duration) -> Self {
        self.deadline = deadline;
        self
    }

    /// Classifies the utterance, then runs the pipeline for the classified
    /// intent under the request deadline. Partial progress is discarded on
    /// timeout, never returned.
    pub async fn handle(&self, request: Request) -> AppResult<PipelineOutput> {
        tokio::time::timeout(self.deadline, self.handle_inner(request))
            .await
            .map_err(|_| AppError::Timeout)?
    }

    async fn handle_inner(&self, request: Request) -> AppResult<PipelineOutput> {
        let intent = self
            .intent_classifier
            .classify(&request.query, &request.language)
            .await;
        self.dispatch(intent, request).await
    }

    /// Runs only intent classification + planning, without executing the
    /// search — backs the `/api/analyze` endpoint (spec §6.2).
    pub async fn analyze(&self, query: &str, language: &str) -> AppResult<(Intent, Option<QueryPlan>)> {
        tokio::time::timeout(self.deadline, async {
            let intent = self.intent_classifier.classify(query, language).await;
            let plan = match intent.kind {
                IntentKind::Search => {
                    let effective_query = intent.query.as_deref().unwrap_or(query);
                    Some(self.query_planner.plan(effective_query, language).await)
                }
                _ => None,
            };
            Ok((intent, plan))
        })
        .await
        .map_err(|_| AppError::Timeout)?
    }

    async fn dispatch(&self, intent: Intent, request: Request) -> AppResult<PipelineOutput> {
        match intent.kind {
            IntentKind::Search => {
                let effective_query = intent.query.as_deref().unwrap_or(&request.query);
                let plan = self.query_planner.plan(effective_query, &request.language).await;
                let outcome = self
                    .search_executor
                    .search(&plan, request.page, request.limit)
                    .await
                    .map_err(AppError::internal)?;
                Ok(PipelineOutput::Search { outcome, plan })
            }
            IntentKind::MostViewed => {
                let listings = self
                    .stats
                    .most_viewed(intent.limit)
                    .await
                    .map_err(AppError::internal)?;
                Ok(listings_output(listings, request.page, intent.limit))
            }
            IntentKind::MostImpressioned => {
                let listings = self
                    .stats
                    .most_impressioned(intent.limit)
                    .await
                    .map_err(AppError::internal)?;
                Ok(listings_output(listings, request.page, intent.limit))
            }
            IntentKind::GetOffices => {
                let offices = self
                    .stats
                    .list_offices(intent.limit)
                    .await
                    .map_err(AppError::internal)?;
                Ok(PipelineOutput::Offices(offices))
            }
            IntentKind::GetOfficeDetails => {
                let id_or_name = intent
                    .office_id
                    .or(request.office_id)
                    .ok_or_else(|| AppError::Validation("an office id or name is required".into()))?;
                let details = self.stats.office_details(&id_or_name).await.map_err(|err| {
                    map_stats_error(err, "office not found")
                })?;
                Ok(PipelineOutput::OfficeDetails(details))
            }
            IntentKind::GetOfficeListings => {
                let id_or_name = intent
                    .office_id
                    .or(request.office_id)
                    .ok_or_else(|| AppError::Validation("an office id or name is required".into()))?;
                let listings = self
                    .stats
                    .office_listings(&id_or_name, intent.limit)
                    .await
                    .map_err(|err| map_stats_error(err, "office not found"))?;
                Ok(listings_output(listings, request.page, intent.limit))
            }
            IntentKind::Greeting => Ok(PipelineOutput::Greeting),
            IntentKind::Help => Ok(PipelineOutput::Help),
        }
    }

    pub fn catalog(&self) -> &CatalogIndex {
        &self.catalog
    }

    /// Runs the strategy ladder directly against an already-built plan,
    /// bypassing intent classification and query planning — backs the
    /// `/api/search/category/:categoryId` shortcut (spec §6).
    pub async fn search_category(
        &self,
        plan: &QueryPlan,
        page: u32,
        limit: u32,
    ) -> AppResult<crate::model::SearchOutcome> {
        tokio::time::timeout(self.deadline, self.search_executor.search(plan, page, limit))
            .await
            .map_err(|_| AppError::Timeout)?
            .map_err(AppError::internal)
    }
}

fn listings_output(listings: Vec<Listing>, page: u32, limit: u32) -> PipelineOutput {
    let total = listings.len() as u64;
    PipelineOutput::Listings {
        listings,
        pagination: Pagination { page, limit, total },
    }
}

fn map_stats_error(err: anyhow::Error, not_found_message: &str) -> AppError {
    match err.downcast_ref::<StatsError>() {
        Some(StatsError::OfficeNotFound) => AppError::NotFound(not_found_message.to_string()),
        None => AppError::internal(err),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::NullCache;
    use crate::catalog::snapshot::RawCatalogData;
    use crate::catalog::source::StaticCatalogSource;
    use crate::llm::{ChatOptions, LlmError, LlmGateway, Task};
    use crate::model::{Listing, ListingStatus, Office, TransactionTypeSlug};
    use crate::search::store::InMemoryListingStore;
    use crate::stats::InMemoryOfficeStore;
    use std::sync::Arc;

    /// Always fails, so callers fall back to the built-in minimal plan /
    /// search intent (spec §4.5/§4.6's "never fail the request on LLM
    /// error" rule) without needing network access in tests.
    struct FailingLlm;

    #[async_trait::async_trait]
    impl LlmGateway for FailingLlm {
        async fn chat(
            &self,
            _task: Task,
            _system: &str,
            _user: &str,
            _opts: ChatOptions,
        ) -> Result<String, LlmError> {
            Err(LlmError::Transport("unavailable in tests".into()))
        }

        async fn embed(&self, _texts: &[String]) -> Result<Vec<Vec<f32>>, LlmError> {
            Err(LlmError::Transport("unavailable in tests".into()))
        }

        fn usage(&self) -> (u64, u64) {
            (0, 0)
        }
    }

    /// Returns a canned JSON response regardless of input; used for the
    /// one test that needs the classifier to resolve `get_office_details`.
    struct FakeLlm {
        response: String,
    }

    #[async_trait::async_trait]
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

    async fn build_orchestrator_with_llm(
        listings: Vec<Listing>,
        offices: Vec<Office>,
        llm: Arc<dyn LlmGateway>,
    ) -> Orchestrator {
        let cache: Arc<dyn crate::cache::Cache> = Arc::new(NullCache);
        let source = Arc::new(StaticCatalogSource::new(RawCatalogData::default()));
        let catalog = Arc::new(CatalogIndex::init(source, None).await.unwrap());

        let intent_classifier = IntentClassifier::new(cache.clone(), llm.clone(), Duration::from_secs(60));
        let query_planner = QueryPlanner::new(cache, llm, catalog.clone(), Duration::from_secs(60));
        let store: Arc<dyn crate::search::store::ListingStore> =
            Arc::new(InMemoryListingStore::new(listings));
        let search_executor = SearchExecutor::new(store.clone(), catalog.clone());
        let stats = StatsQueries::new(store, Arc::new(InMemoryOfficeStore::new(offices)));

        Orchestrator::new(catalog, intent_classifier, query_planner, search_executor, stats)
    }

    async fn build_orchestrator(listings: Vec<Listing>, offices: Vec<Office>) -> Orchestrator {
        build_orchestrator_with_llm(listings, offices, Arc::new(FailingLlm)).await
    }

    fn listing(id: &str) -> Listing {
        Listing {
            id: id.into(),
            title: "سيارة للبيع".into(),
            description: "سيارة بحالة ممتازة".into(),
            category_slug: "cars".into(),
            city_id: "damascus".into(),
            neighborhood_id: None,
            transaction_type: TransactionTypeSlug::Sale,
            views: 5,
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
        }
    }

    #[tokio::test]
    async fn greeting_short_circuits_without_touching_search_or_stats() {
        let orchestrator = build_orchestrator(vec![], vec![]).await;
        let request = Request {
            query: "مرحبا".into(),
            language: "ar".into(),
            page: 1,
            limit: 10,
            office_id: None,
        };
        let output = orchestrator.handle(request).await.unwrap();
        assert!(matches!(output, PipelineOutput::Greeting));
    }

    #[tokio::test]
    async fn most_viewed_returns_a_listings_output() {
        let orchestrator = build_orchestrator(vec![listing("1"), listing("2")], vec![]).await;
        let request = Request {
            query: "الأكثر مشاهدة".into(),
            language: "ar".into(),
            page: 1,
            limit: 10,
            office_id: None,
        };
        let output = orchestrator.handle(request).await.unwrap();
        match output {
            PipelineOutput::Listings { listings, .. } => assert_eq!(listings.len(), 2),
            _ => panic!("expected a listings output"),
        }
    }

    #[tokio::test]
    async fn office_details_for_an_unknown_office_is_not_found() {
        let llm = Arc::new(FakeLlm {
            response: r#"{"kind":"get_office_details","query":null,"officeId":"no-such-office","limit":null}"#
                .to_string(),
        });
        let orchestrator = build_orchestrator_with_llm(vec![], vec![], llm).await;
        let request = Request {
            query: "تفاصيل مكتب غير موجود".into(),
            language: "ar".into(),
            page: 1,
            limit: 10,
            office_id: None,
        };
        let result = orchestrator.handle(request).await;
        assert!(matches!(result, Err(AppError::NotFound(_))));
    }

    #[tokio::test]
    async fn analyze_plans_without_executing_search() {
        let orchestrator = build_orchestrator(vec![listing("1")], vec![]).await;
        let (intent, plan) = orchestrator.analyze("سيارة للبيع في دمشق", "ar").await.unwrap();
        assert_eq!(intent.kind, IntentKind::Search);
        assert!(plan.is_some());
    }
}
