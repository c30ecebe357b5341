//! Entry point for the kasioon search gateway (spec §2, §6).
//!
//! Two subcommands: `serve` boots the HTTP gateway described throughout this
//! crate; `keywords-build` is ambient tooling (out of core scope per spec,
//! carried anyway per the "ambient stack regardless of non-goals" rule) that
//! regenerates the category-keywords alias file from the live catalog.

mod cache;
mod catalog;
mod config;
mod error;
mod http;
mod intent;
mod llm;
mod model;
mod orchestrator;
mod planner;
mod ratelimit;
mod render;
mod search;
mod speech;
mod stats;

use clap::{Parser, Subcommand};
use config::Config;
use std::path::PathBuf;
use std::sync::Arc;

#[derive(Parser)]
#[command(name = "kasioon-gateway")]
#[command(about = "Natural-language search gateway for the kasioon classifieds marketplace")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run the HTTP gateway (spec §6).
    Serve,

    /// Regenerate the category-keywords alias file from the live catalog,
    /// merging in the bundled fallback aliases for any slug the catalog
    /// doesn't already cover.
    KeywordsBuild {
        /// Where to write the merged alias file.
        #[arg(long, default_value = "category-keywords.json")]
        output: PathBuf,
    },
}

fn init_tracing() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();
}

fn build_pg_pool(config: &config::DatabaseConfig) -> anyhow::Result<deadpool_postgres::Pool> {
    let pg_config: tokio_postgres::Config = config.url.parse()?;
    let mgr_config = deadpool_postgres::ManagerConfig {
        recycling_method: deadpool_postgres::RecyclingMethod::Fast,
    };
    let manager = deadpool_postgres::Manager::from_config(
        pg_config,
        tokio_postgres::NoTls,
        mgr_config,
    );
    let pool = deadpool_postgres::Pool::builder(manager)
        .max_size(config.pool_size)
        .build()?;
    Ok(pool)
}

async fn run_serve(config: Config) -> anyhow::Result<()> {
    let config = Arc::new(config);

    let pool = build_pg_pool(&config.database)?;

    let catalog_source: Arc<dyn catalog::source::CatalogSource> =
        Arc::new(catalog::source::PostgresCatalogSource::new(pool.clone()));
    let catalog = Arc::new(
        catalog::CatalogIndex::init(catalog_source, config.category_keywords_path.as_deref())
            .await?,
    );
    catalog.spawn_refresh_loop(catalog::DEFAULT_REFRESH_INTERVAL);

    let cache = cache::build_cache(&config.cache).await;

    let llm: Arc<dyn llm::LlmGateway> = Arc::new(llm::HttpLlmGateway::new(
        config.llm.api_key.clone(),
        "https://api.openai.com/v1",
        config.llm.fast_model.clone(),
        config.llm.powerful_model.clone(),
        config.llm.embedding_model.clone(),
        config.llm.embedding_dimension,
    ));

    let speech: Arc<dyn speech::SpeechGateway> = Arc::new(speech::HttpSpeechGateway::new(
        config.speech.api_key.clone(),
        "https://api.openai.com/v1",
    ));

    let listing_store: Arc<dyn search::store::ListingStore> =
        Arc::new(search::store::PostgresListingStore::new(pool.clone()));
    let office_store: Arc<dyn stats::OfficeStore> =
        Arc::new(stats::PostgresOfficeStore::new(pool.clone()));

    let intent_classifier = intent::IntentClassifier::new(
        cache.clone(),
        llm.clone(),
        config.cache.ai_response_ttl,
    );
    let query_planner = planner::QueryPlanner::new(
        cache.clone(),
        llm.clone(),
        catalog.clone(),
        config.cache.ai_response_ttl,
    );
    let search_executor = search::SearchExecutor::new(listing_store.clone(), catalog.clone());
    let stats_queries = stats::StatsQueries::new(listing_store, office_store);

    let orchestrator = Arc::new(orchestrator::Orchestrator::new(
        catalog.clone(),
        intent_classifier,
        query_planner,
        search_executor,
        stats_queries,
    ));

    let rate_limiter = Arc::new(ratelimit::SlidingWindowRateLimiter::from_config(
        config.rate_limit.max_requests,
        config.rate_limit.window_ms,
    ));
    let voice_rate_limiter = Arc::new(ratelimit::SlidingWindowRateLimiter::from_config(
        config.rate_limit.strict_max_requests,
        config.rate_limit.strict_window_ms,
    ));

    let state = http::AppState {
        orchestrator,
        speech,
        catalog,
        config,
        rate_limiter,
        voice_rate_limiter,
    };

    http::serve(state).await
}

async fn run_keywords_build(config: Config, output: PathBuf) -> anyhow::Result<()> {
    let pool = build_pg_pool(&config.database)?;
    let source: Arc<dyn catalog::source::CatalogSource> =
        Arc::new(catalog::source::PostgresCatalogSource::new(pool));
    let raw = source.fetch().await?;

    let mut aliases = catalog::keywords::bundled_fallback_aliases();
    for category in &raw.categories {
        aliases
            .entry(category.slug.clone())
            .or_insert_with(|| vec![category.name_ar.clone(), category.name_en.clone()]);
    }

    let json = serde_json::to_string_pretty(&aliases)?;
    std::fs::write(&output, json)?;
    tracing::info!(path = %output.display(), count = aliases.len(), "wrote category keywords file");
    Ok(())
}

fn main() -> anyhow::Result<()> {
    init_tracing();
    let cli = Cli::parse();
    let config = Config::from_env()?;

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()?;

    match cli.command {
        Command::Serve => runtime.block_on(run_serve(config)),
        Command::KeywordsBuild { output } => runtime.block_on(run_keywords_build(config, output)),
    }
}
