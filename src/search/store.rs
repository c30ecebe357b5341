//! The search executor's external collaborator: the listings table itself.
//!
//! Deliberately thin, mirroring `catalog::source` — "the classifieds
//! database itself" stays out of core scope (spec §1); this trait is the
//! seam. `PostgresListingStore` is the concrete production implementation;
//! `InMemoryListingStore` is the fixture every strategy-ladder test runs
//! against, so the ranking logic is fully testable without a live database.

use crate::model::{AttributeValue, Listing, ListingAttribute, ListingStatus, TransactionTypeSlug};
use async_trait::async_trait;
use deadpool_postgres::Pool;
use std::collections::HashMap;

/// Structured filters a strategy rung applies before handing candidates to
/// the in-process text-matching and scoring pass.
#[derive(Debug, Clone, Default)]
pub struct ListingFilter {
    /// OR-matched leaf category slugs (a single leaf for the strict/relaxed
    /// rungs, a whole subtree for the suggested-category rung).
    pub category_slugs: Option<Vec<String>>,
    pub city_id: Option<String>,
    pub transaction_type: Option<TransactionTypeSlug>,
}

#[async_trait]
pub trait ListingStore: Send + Sync {
    /// Fetch up to `limit` active listings matching `filter`, ordered by
    /// boost desc, priority desc, created_at desc, id asc (spec §4.7.3).
    async fn fetch_candidates(
        &self,
        filter: &ListingFilter,
        limit: usize,
    ) -> anyhow::Result<Vec<Listing>>;

    /// Fetch a single listing for detail/enrichment lookups.
    async fn find_by_id(&self, id: &str) -> anyhow::Result<Option<Listing>>;

    /// `MostViewed`/`MostImpressioned` source rows (spec §4.8): active
    /// listings ordered by view count descending then created_at descending.
    /// Impression ranking is computed in-process from `views`/`boosted`/
    /// `priority`, so the same fetch serves both stats queries.
    async fn fetch_active(&self, limit: usize) -> anyhow::Result<Vec<Listing>>;

    async fn fetch_by_office(&self, office_id: &str, limit: usize) -> anyhow::Result<Vec<Listing>>;

    /// Canonical attribute bag (price+currency, area, rooms, bathrooms,
    /// year, mileage, brand, model) for a batch of listings, fetched once
    /// rather than per-row (spec §4.7.6, §4.8).
    async fn fetch_attributes(
        &self,
        listing_ids: &[String],
    ) -> anyhow::Result<HashMap<String, Vec<ListingAttribute>>>;
}

/// Populate `attributes` on every listing via a single batched fetch.
pub async fn enrich_attributes(
    store: &dyn ListingStore,
    listings: &mut [Listing],
) -> anyhow::Result<()> {
    let ids: Vec<String> = listings.iter().map(|l| l.id.clone()).collect();
    if ids.is_empty() {
        return Ok(());
    }
    let mut bag = store.fetch_attributes(&ids).await?;
    for listing in listings.iter_mut() {
        if let Some(attrs) = bag.remove(&listing.id) {
            listing.attributes = attrs;
        }
    }
    Ok(())
}

pub struct PostgresListingStore {
    pool: Pool,
}

impl PostgresListingStore {
    pub fn new(pool: Pool) -> Self {
        Self { pool }
    }
}

fn row_to_listing(row: &tokio_postgres::Row) -> Listing {
    let status_str: String = row.get("status");
    Listing {
        id: row.get("id"),
        title: row.get("title"),
        description: row.get("description"),
        category_slug: row.get("category_slug"),
        city_id: row.get("city_id"),
        neighborhood_id: row.get("neighborhood_id"),
        transaction_type: TransactionTypeSlug::from_str(row.get("transaction_type"))
            .unwrap_or(TransactionTypeSlug::Sale),
        views: row.get("views"),
        boosted: row.get("boosted"),
        priority: row.get("priority"),
        created_at: row.get("created_at"),
        status: if status_str == "active" {
            ListingStatus::Active
        } else {
            ListingStatus::Other
        },
        images: row.get("images"),
        main_image: row.get("main_image"),
        videos: row.get("videos"),
        office_id: row.get("office_id"),
        user_id: row.get("user_id"),
        attributes: Vec::new(),
    }
}

#[async_trait]
impl ListingStore for PostgresListingStore {
    async fn fetch_candidates(
        &self,
        filter: &ListingFilter,
        limit: usize,
    ) -> anyhow::Result<Vec<Listing>> {
        let client = self.pool.get().await?;

        let mut clauses = vec!["status = 'active'".to_string()];
        let mut params: Vec<Box<dyn tokio_postgres::types::ToSql + Sync + Send>> = Vec::new();

        if let Some(slugs) = &filter.category_slugs {
            params.push(Box::new(slugs.clone()));
            clauses.push(format!("category_slug = ANY(${})", params.len()));
        }
        if let Some(city_id) = &filter.city_id {
            params.push(Box::new(city_id.clone()));
            clauses.push(format!("city_id = ${}", params.len()));
        }
        if let Some(transaction_type) = filter.transaction_type {
            params.push(Box::new(transaction_type.as_str().to_string()));
            clauses.push(format!("transaction_type = ${}", params.len()));
        }

        let query = format!(
            "SELECT id, title, description, category_slug, city_id, neighborhood_id, \
             transaction_type, views, boosted, priority, created_at, status, images, \
             main_image, videos, office_id, user_id \
             FROM listings WHERE {} \
             ORDER BY boosted DESC, priority DESC, created_at DESC, id ASC LIMIT {}",
            clauses.join(" AND "),
            limit,
        );

        let param_refs: Vec<&(dyn tokio_postgres::types::ToSql + Sync)> =
            params.iter().map(|p| p.as_ref() as _).collect();
        let rows = client.query(&query, &param_refs).await?;
        Ok(rows.iter().map(row_to_listing).collect())
    }

    async fn find_by_id(&self, id: &str) -> anyhow::Result<Option<Listing>> {
        let client = self.pool.get().await?;
        let row = client
            .query_opt(
                "SELECT id, title, description, category_slug, city_id, neighborhood_id, \
                 transaction_type, views, boosted, priority, created_at, status, images, \
                 main_image, videos, office_id, user_id FROM listings WHERE id = $1",
                &[&id],
            )
            .await?;
        Ok(row.map(|r| row_to_listing(&r)))
    }

    async fn fetch_active(&self, limit: usize) -> anyhow::Result<Vec<Listing>> {
        let client = self.pool.get().await?;
        let rows = client
            .query(
                "SELECT id, title, description, category_slug, city_id, neighborhood_id, \
                 transaction_type, views, boosted, priority, created_at, status, images, \
                 main_image, videos, office_id, user_id FROM listings WHERE status = 'active' \
                 ORDER BY views DESC, created_at DESC LIMIT $1",
                &[&(limit as i64)],
            )
            .await?;
        Ok(rows.iter().map(row_to_listing).collect())
    }

    async fn fetch_by_office(&self, office_id: &str, limit: usize) -> anyhow::Result<Vec<Listing>> {
        let client = self.pool.get().await?;
        let rows = client
            .query(
                "SELECT id, title, description, category_slug, city_id, neighborhood_id, \
                 transaction_type, views, boosted, priority, created_at, status, images, \
                 main_image, videos, office_id, user_id FROM listings \
                 WHERE office_id = $1 AND status = 'active' \
                 ORDER BY boosted DESC, priority DESC, created_at DESC LIMIT $2",
                &[&office_id, &(limit as i64)],
            )
            .await?;
        Ok(rows.iter().map(row_to_listing).collect())
    }

    async fn fetch_attributes(
        &self,
        listing_ids: &[String],
    ) -> anyhow::Result<HashMap<String, Vec<ListingAttribute>>> {
        let client = self.pool.get().await?;
        let rows = client
            .query(
                "SELECT listing_id, attribute_slug, value_numeric, value_text, display_unit \
                 FROM listing_attributes WHERE listing_id = ANY($1)",
                &[&listing_ids],
            )
            .await?;

        let mut bag: HashMap<String, Vec<ListingAttribute>> = HashMap::new();
        for row in &rows {
            let listing_id: String = row.get("listing_id");
            let attribute_slug: String = row.get("attribute_slug");
            let numeric: Option<f64> = row.get("value_numeric");
            let text: Option<String> = row.get("value_text");
            let display_unit: Option<String> = row.get("display_unit");

            let value = match numeric {
                Some(value) => AttributeValue::Numeric { value, unit: display_unit },
                None => AttributeValue::Text(text.unwrap_or_default()),
            };
            bag.entry(listing_id)
                .or_default()
                .push(ListingAttribute { attribute_slug, value });
        }
        Ok(bag)
    }
}

/// Fixed in-memory source used by tests.
pub struct InMemoryListingStore {
    listings: Vec<Listing>,
}

impl InMemoryListingStore {
    pub fn new(listings: Vec<Listing>) -> Self {
        Self { listings }
    }

    fn matches(filter: &ListingFilter, listing: &Listing) -> bool {
        if listing.status != ListingStatus::Active {
            return false;
        }
        if let Some(slugs) = &filter.category_slugs {
            if !slugs.iter().any(|s| s == &listing.category_slug) {
                return false;
            }
        }
        if let Some(city_id) = &filter.city_id {
            if city_id != &listing.city_id {
                return false;
            }
        }
        if let Some(transaction_type) = filter.transaction_type {
            if transaction_type != listing.transaction_type {
                return false;
            }
        }
        true
    }
}

fn ordering_key(listing: &Listing) -> impl Ord + '_ {
    (
        std::cmp::Reverse(listing.boosted),
        std::cmp::Reverse(listing.priority),
        std::cmp::Reverse(listing.created_at),
        listing.id.clone(),
    )
}

#[async_trait]
impl ListingStore for InMemoryListingStore {
    async fn fetch_candidates(
        &self,
        filter: &ListingFilter,
        limit: usize,
    ) -> anyhow::Result<Vec<Listing>> {
        let mut matches: Vec<Listing> = self
            .listings
            .iter()
            .filter(|l| Self::matches(filter, l))
            .cloned()
            .collect();
        matches.sort_by_key(ordering_key);
        matches.truncate(limit);
        Ok(matches)
    }

    async fn find_by_id(&self, id: &str) -> anyhow::Result<Option<Listing>> {
        Ok(self.listings.iter().find(|l| l.id == id).cloned())
    }

    async fn fetch_active(&self, limit: usize) -> anyhow::Result<Vec<Listing>> {
        let mut active: Vec<Listing> = self
            .listings
            .iter()
            .filter(|l| l.status == ListingStatus::Active)
            .cloned()
            .collect();
        active.sort_by(|a, b| b.views.cmp(&a.views).then(b.created_at.cmp(&a.created_at)));
        active.truncate(limit);
        Ok(active)
    }

    async fn fetch_by_office(&self, office_id: &str, limit: usize) -> anyhow::Result<Vec<Listing>> {
        let mut matches: Vec<Listing> = self
            .listings
            .iter()
            .filter(|l| l.status == ListingStatus::Active && l.office_id.as_deref() == Some(office_id))
            .cloned()
            .collect();
        matches.sort_by_key(ordering_key);
        matches.truncate(limit);
        Ok(matches)
    }

    async fn fetch_attributes(
        &self,
        listing_ids: &[String],
    ) -> anyhow::Result<HashMap<String, Vec<ListingAttribute>>> {
        Ok(self
            .listings
            .iter()
            .filter(|l| listing_ids.contains(&l.id))
            .map(|l| (l.id.clone(), l.attributes.clone()))
            .collect())
    }
}
