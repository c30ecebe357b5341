//! Stats / Entity Queries (spec §4.8): the non-search intents.

use crate::model::{Listing, Office};
use crate::search::store::{enrich_attributes, ListingStore};
use std::sync::Arc;

#[derive(Debug, thiserror::Error)]
pub enum StatsError {
    #[error("office not found")]
    OfficeNotFound,
}

/// Office directory, abstracted the same way `ListingStore` abstracts
/// listings — production talks to Postgres, tests use a fixture.
#[async_trait::async_trait]
pub trait OfficeStore: Send + Sync {
    async fn list_approved(&self, limit: usize) -> anyhow::Result<Vec<Office>>;
    async fn find(&self, id_or_name: &str) -> anyhow::Result<Option<Office>>;
    async fn active_listing_count(&self, office_id: &str) -> anyhow::Result<u64>;
    async fn total_listing_count(&self, office_id: &str) -> anyhow::Result<u64>;
}

pub struct OfficeDetails {
    pub office: Office,
    pub active_listings_count: u64,
    pub total_listings_count: u64,
}

fn looks_like_uuid(candidate: &str) -> bool {
    uuid::Uuid::parse_str(candidate).is_ok()
}

pub struct StatsQueries {
    listings: Arc<dyn ListingStore>,
    offices: Arc<dyn OfficeStore>,
}

impl StatsQueries {
    pub fn new(listings: Arc<dyn ListingStore>, offices: Arc<dyn OfficeStore>) -> Self {
        Self { listings, offices }
    }

    /// Active listings ordered by view count desc then created_at desc.
    pub async fn most_viewed(&self, limit: u32) -> anyhow::Result<Vec<Listing>> {
        let mut listings = self.listings.fetch_active(limit as usize).await?;
        enrich_attributes(self.listings.as_ref(), &mut listings).await?;
        Ok(listings)
    }

    /// Active listings ordered by `impression_score` desc then created_at
    /// desc. `fetch_active` already orders by views/created_at, so a wider
    /// fetch is re-sorted here by the impression formula (spec §4.8).
    pub async fn most_impressioned(&self, limit: u32) -> anyhow::Result<Vec<Listing>> {
        let mut candidates = self.listings.fetch_active((limit as usize).saturating_mul(4).max(1)).await?;
        candidates.sort_by(|a, b| {
            b.impression_score()
                .cmp(&a.impression_score())
                .then(b.created_at.cmp(&a.created_at))
        });
        candidates.truncate(limit as usize);
        enrich_attributes(self.listings.as_ref(), &mut candidates).await?;
        Ok(candidates)
    }

    pub async fn list_offices(&self, limit: u32) -> anyhow::Result<Vec<Office>> {
        self.offices.list_approved(limit as usize).await
    }

    /// UUID-test first; if valid, match by id or name (contains,
    /// case-insensitive); else name-only (spec §4.8).
    pub async fn office_details(&self, id_or_name: &str) -> anyhow::Result<OfficeDetails> {
        let office = self
            .offices
            .find(id_or_name)
            .await?
            .ok_or(StatsError::OfficeNotFound)?;

        let active_listings_count = self.offices.active_listing_count(&office.id).await?;
        let total_listings_count = self.offices.total_listing_count(&office.id).await?;

        Ok(OfficeDetails {
            office,
            active_listings_count,
            total_listings_count,
        })
    }

    pub async fn office_listings(&self, id_or_name: &str, limit: u32) -> anyhow::Result<Vec<Listing>> {
        let office = self
            .offices
            .find(id_or_name)
            .await?
            .ok_or(StatsError::OfficeNotFound)?;
        let mut listings = self.listings.fetch_by_office(&office.id, limit as usize).await?;
        enrich_attributes(self.listings.as_ref(), &mut listings).await?;
        Ok(listings)
    }
}

/// In-memory office fixture for tests; also usable as a bundled-fallback
/// directory if the database is briefly unreachable.
pub struct InMemoryOfficeStore {
    offices: Vec<Office>,
}

impl InMemoryOfficeStore {
    pub fn new(offices: Vec<Office>) -> Self {
        Self { offices }
    }
}

#[async_trait::async_trait]
impl OfficeStore for InMemoryOfficeStore {
    async fn list_approved(&self, limit: usize) -> anyhow::Result<Vec<Office>> {
        let mut approved: Vec<Office> = self.offices.iter().filter(|o| o.approved).cloned().collect();
        approved.sort_by(|a, b| {
            b.premium
                .cmp(&a.premium)
                .then(b.rating.partial_cmp(&a.rating).unwrap_or(std::cmp::Ordering::Equal))
        });
        approved.truncate(limit);
        Ok(approved)
    }

    async fn find(&self, id_or_name: &str) -> anyhow::Result<Option<Office>> {
        if looks_like_uuid(id_or_name) {
            if let Some(office) = self.offices.iter().find(|o| o.id == id_or_name) {
                return Ok(Some(office.clone()));
            }
        }
        let needle = id_or_name.to_lowercase();
        Ok(self
            .offices
            .iter()
            .find(|o| o.name.to_lowercase().contains(&needle))
            .cloned())
    }

    async fn active_listing_count(&self, _office_id: &str) -> anyhow::Result<u64> {
        Ok(0)
    }

    async fn total_listing_count(&self, _office_id: &str) -> anyhow::Result<u64> {
        Ok(0)
    }
}

/// Postgres-backed production implementation.
pub struct PostgresOfficeStore {
    pool: deadpool_postgres::Pool,
}

impl PostgresOfficeStore {
    pub fn new(pool: deadpool_postgres::Pool) -> Self {
        Self { pool }
    }
}

fn row_to_office(row: &tokio_postgres::Row) -> Office {
    let lat: Option<f64> = row.get("latitude");
    let lon: Option<f64> = row.get("longitude");
    Office {
        id: row.get("id"),
        name: row.get("name"),
        description_ar: row.get("description_ar"),
        description_en: row.get("description_en"),
        phone: row.get("phone"),
        email: row.get("email"),
        website: row.get("website"),
        logo_url: row.get("logo_url"),
        city_id: row.get("city_id"),
        address: row.get("address"),
        geolocation: lat.zip(lon),
        premium: row.get("premium"),
        rating: row.get("rating"),
        rating_count: row.get("rating_count"),
        approved: row.get("approved"),
    }
}

#[async_trait::async_trait]
impl OfficeStore for PostgresOfficeStore {
    async fn list_approved(&self, limit: usize) -> anyhow::Result<Vec<Office>> {
        let client = self.pool.get().await?;
        let rows = client
            .query(
                "SELECT id, name, description_ar, description_en, phone, email, website, \
                 logo_url, city_id, address, latitude, longitude, premium, rating, \
                 rating_count, approved FROM offices WHERE approved = true \
                 ORDER BY premium DESC, rating DESC NULLS LAST, created_at DESC LIMIT $1",
                &[&(limit as i64)],
            )
            .await?;
        Ok(rows.iter().map(row_to_office).collect())
    }

    async fn find(&self, id_or_name: &str) -> anyhow::Result<Option<Office>> {
        let client = self.pool.get().await?;

        if looks_like_uuid(id_or_name) {
            let row = client
                .query_opt(
                    "SELECT id, name, description_ar, description_en, phone, email, website, \
                     logo_url, city_id, address, latitude, longitude, premium, rating, \
                     rating_count, approved FROM offices WHERE id = $1 OR name ILIKE $2",
                    &[&id_or_name, &format!("%{id_or_name}%")],
                )
                .await?;
            if row.is_some() {
                return Ok(row.as_ref().map(row_to_office));
            }
        }

        let row = client
            .query_opt(
                "SELECT id, name, description_ar, description_en, phone, email, website, \
                 logo_url, city_id, address, latitude, longitude, premium, rating, \
                 rating_count, approved FROM offices WHERE name ILIKE $1 LIMIT 1",
                &[&format!("%{id_or_name}%")],
            )
            .await?;
        Ok(row.map(|r| row_to_office(&r)))
    }

    async fn active_listing_count(&self, office_id: &str) -> anyhow::Result<u64> {
        let client = self.pool.get().await?;
        let row = client
            .query_one(
                "SELECT count(*) AS count FROM listings WHERE office_id = $1 AND status = 'active'",
                &[&office_id],
            )
            .await?;
        let count: i64 = row.get("count");
        Ok(count as u64)
    }

    async fn total_listing_count(&self, office_id: &str) -> anyhow::Result<u64> {
        let client = self.pool.get().await?;
        let row = client
            .query_one(
                "SELECT count(*) AS count FROM listings WHERE office_id = $1",
                &[&office_id],
            )
            .await?;
        let count: i64 = row.get("count");
        Ok(count as u64)
    }
}
