//! In-memory catalog snapshot, refreshed on a timer (spec §4.1).

pub mod keywords;
pub mod snapshot;
pub mod source;

use self::keywords::{bundled_fallback_aliases, load_keyword_file, merge_keyword_overrides};
use self::snapshot::{RawCatalogData, Snapshot};
use self::source::CatalogSource;
use crate::model::{Attribute, Category, City, Neighborhood, TransactionType, TransactionTypeSlug};
use arc_swap::ArcSwap;
use std::sync::Arc;
use std::time::Duration;

/// Default refresh interval when not overridden by the caller.
pub const DEFAULT_REFRESH_INTERVAL: Duration = Duration::from_secs(300);

pub struct CatalogIndex {
    snapshot: Arc<ArcSwap<Snapshot>>,
    source: Arc<dyn CatalogSource>,
    keyword_overrides: std::collections::HashMap<String, Vec<String>>,
}

impl CatalogIndex {
    /// Boot the catalog index: try the live source first, fall back to the
    /// bundled JSON fixture, and fail only if neither is available (spec
    /// §4.1). A keyword aliases file at `keyword_file_path`, if any, is
    /// merged in with "existing entries win" semantics.
    pub async fn init(
        source: Arc<dyn CatalogSource>,
        keyword_file_path: Option<&str>,
    ) -> anyhow::Result<Self> {
        let file_aliases = load_keyword_file(keyword_file_path).unwrap_or_default();
        let keyword_overrides = merge_keyword_overrides(bundled_fallback_aliases(), file_aliases);

        let raw = match source.fetch().await {
            Ok(raw) => raw,
            Err(err) => {
                tracing::warn!(error = %err, "catalog source unreachable at boot, using bundled fallback");
                bundled_fallback_catalog()
            }
        };

        let snapshot = Snapshot::build(raw, keyword_overrides.clone());
        Ok(Self {
            snapshot: Arc::new(ArcSwap::from_pointee(snapshot)),
            source,
            keyword_overrides,
        })
    }

    /// Spawn the background refresh loop. Readers of `snapshot()` never
    /// block on this task — it only ever swaps in a new `Arc<Snapshot>`.
    pub fn spawn_refresh_loop(self: &Arc<Self>, interval: Duration) -> tokio::task::JoinHandle<()> {
        let index = Arc::clone(self);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            loop {
                ticker.tick().await;
                match index.source.fetch().await {
                    Ok(raw) => {
                        let snapshot = Snapshot::build(raw, index.keyword_overrides.clone());
                        index.snapshot.store(Arc::new(snapshot));
                        tracing::debug!("catalog snapshot refreshed");
                    }
                    Err(err) => {
                        tracing::warn!(error = %err, "catalog refresh failed, keeping stale snapshot");
                    }
                }
            }
        })
    }

    pub fn snapshot(&self) -> Arc<Snapshot> {
        self.snapshot.load_full()
    }

    pub fn lookup_category(&self, slug: &str) -> Option<Category> {
        self.snapshot().lookup_category(slug).cloned()
    }

    pub fn leaf_slugs(&self) -> std::collections::HashSet<String> {
        self.snapshot().leaf_slugs().clone()
    }

    pub fn is_leaf(&self, slug: &str) -> bool {
        self.snapshot().is_leaf(slug)
    }

    pub fn category_keywords(&self) -> std::collections::HashMap<String, Vec<String>> {
        self.snapshot().category_keywords().clone()
    }

    pub fn lookup_city(&self, name: &str, lang: &str) -> Option<City> {
        self.snapshot().lookup_city(name, lang).cloned()
    }

    pub fn city_by_id(&self, id: &str) -> Option<City> {
        self.snapshot().city_by_id(id).cloned()
    }

    pub fn neighborhood_by_id(&self, id: &str) -> Option<Neighborhood> {
        self.snapshot().neighborhood_by_id(id).cloned()
    }

    pub fn attributes_of(&self, category_slug: &str) -> Vec<Attribute> {
        self.snapshot().attributes_of(category_slug).to_vec()
    }

    pub fn transaction_type_by_slug(&self, slug: TransactionTypeSlug) -> Option<TransactionType> {
        self.snapshot().transaction_type_by_slug(slug).cloned()
    }

    /// Every leaf slug reachable from `slug` (including `slug` itself if it
    /// is already a leaf). Used by the search executor's suggested-category
    /// rung and by the planner's deepen step.
    pub fn leaf_descendants(&self, slug: &str) -> Vec<String> {
        let snapshot = self.snapshot();
        if snapshot.is_leaf(slug) {
            return vec![slug.to_string()];
        }
        let mut out = Vec::new();
        let mut frontier = vec![slug.to_string()];
        while let Some(current) = frontier.pop() {
            for child in snapshot.children_of(&current) {
                if child.is_leaf {
                    out.push(child.slug.clone());
                } else {
                    frontier.push(child.slug.clone());
                }
            }
        }
        out
    }

    pub fn root_category_names(&self, lang: &str) -> Vec<String> {
        self.snapshot()
            .root_categories()
            .into_iter()
            .map(|c| if lang == "ar" { c.name_ar.clone() } else { c.name_en.clone() })
            .collect()
    }
}

fn bundled_fallback_catalog() -> RawCatalogData {
    RawCatalogData::default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::AttributeDomain;

    fn sample_raw() -> RawCatalogData {
        RawCatalogData {
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
        }
    }

    #[tokio::test]
    async fn is_leaf_reflects_snapshot() {
        let source = Arc::new(source::StaticCatalogSource::new(sample_raw()));
        let index = CatalogIndex::init(source, None).await.unwrap();
        assert!(index.is_leaf("apartments"));
        assert!(!index.is_leaf("real-estate"));
        assert!(!index.is_leaf("nonexistent"));
    }

    #[tokio::test]
    async fn lookup_city_is_language_aware() {
        let source = Arc::new(source::StaticCatalogSource::new(sample_raw()));
        let index = CatalogIndex::init(source, None).await.unwrap();
        assert!(index.lookup_city("دمشق", "ar").is_some());
        assert!(index.lookup_city("Damascus", "en").is_some());
        assert!(index.lookup_city("Aleppo", "en").is_none());
    }

    #[tokio::test]
    async fn refresh_loop_swaps_snapshot_without_blocking_readers() {
        let source = Arc::new(source::StaticCatalogSource::new(sample_raw()));
        let index = Arc::new(CatalogIndex::init(source, None).await.unwrap());
        let handle = index.spawn_refresh_loop(Duration::from_millis(20));
        tokio::time::sleep(Duration::from_millis(60)).await;
        assert!(index.is_leaf("apartments"));
        handle.abort();
    }
}
