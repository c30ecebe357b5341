//! The catalog's external collaborator: the classifieds database itself.
//!
//! Deliberately thin per spec §1 ("the classifieds database itself" stays
//! out of core scope) — this trait is the seam. `PostgresCatalogSource` is
//! the concrete production implementation; tests use `StaticCatalogSource`.

use super::snapshot::RawCatalogData;
use async_trait::async_trait;
use deadpool_postgres::Pool;

#[async_trait]
pub trait CatalogSource: Send + Sync {
    async fn fetch(&self) -> anyhow::Result<RawCatalogData>;
}

pub struct PostgresCatalogSource {
    pool: Pool,
}

impl PostgresCatalogSource {
    pub fn new(pool: Pool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl CatalogSource for PostgresCatalogSource {
    async fn fetch(&self) -> anyhow::Result<RawCatalogData> {
        let client = self.pool.get().await?;

        let category_rows = client
            .query(
                "SELECT id, slug, name_ar, name_en, parent_slug, is_leaf, display_order, active \
                 FROM categories",
                &[],
            )
            .await?;
        let categories = category_rows
            .iter()
            .map(|row| crate::model::Category {
                id: row.get("id"),
                slug: row.get("slug"),
                name_ar: row.get("name_ar"),
                name_en: row.get("name_en"),
                parent_slug: row.get("parent_slug"),
                is_leaf: row.get("is_leaf"),
                display_order: row.get("display_order"),
                active: row.get("active"),
            })
            .collect();

        let city_rows = client
            .query("SELECT id, name_ar, name_en, province FROM cities", &[])
            .await?;
        let cities = city_rows
            .iter()
            .map(|row| crate::model::City {
                id: row.get("id"),
                name_ar: row.get("name_ar"),
                name_en: row.get("name_en"),
                province: row.get("province"),
            })
            .collect();

        let neighborhood_rows = client
            .query(
                "SELECT id, city_id, name_ar, name_en FROM neighborhoods",
                &[],
            )
            .await?;
        let neighborhoods = neighborhood_rows
            .iter()
            .map(|row| crate::model::Neighborhood {
                id: row.get("id"),
                city_id: row.get("city_id"),
                name_ar: row.get("name_ar"),
                name_en: row.get("name_en"),
            })
            .collect();

        let transaction_type_rows = client
            .query(
                "SELECT id, slug, name_ar, name_en FROM transaction_types",
                &[],
            )
            .await?;
        let transaction_types = transaction_type_rows
            .iter()
            .filter_map(|row| {
                let slug_str: String = row.get("slug");
                let slug = crate::model::TransactionTypeSlug::from_str(&slug_str)?;
                Some(crate::model::TransactionType {
                    id: row.get("id"),
                    slug,
                    name_ar: row.get("name_ar"),
                    name_en: row.get("name_en"),
                })
            })
            .collect();

        let attribute_rows = client
            .query(
                "SELECT id, slug, domain, display_unit, category_slug FROM attributes",
                &[],
            )
            .await?;
        let attributes = attribute_rows
            .iter()
            .filter_map(|row| {
                let domain_str: String = row.get("domain");
                let domain = match domain_str.as_str() {
                    "number" => crate::model::AttributeDomain::Number,
                    "text" => crate::model::AttributeDomain::Text,
                    _ => return None,
                };
                Some(crate::model::Attribute {
                    id: row.get("id"),
                    slug: row.get("slug"),
                    domain,
                    display_unit: row.get("display_unit"),
                    category_slug: row.get("category_slug"),
                })
            })
            .collect();

        Ok(RawCatalogData {
            categories,
            cities,
            neighborhoods,
            transaction_types,
            attributes,
        })
    }
}

/// Fixed in-memory source used by tests and as a last-resort boot fallback
/// when neither the remote database nor a fresher snapshot is reachable.
pub struct StaticCatalogSource {
    data: RawCatalogData,
}

impl StaticCatalogSource {
    pub fn new(data: RawCatalogData) -> Self {
        Self { data }
    }
}

#[async_trait]
impl CatalogSource for StaticCatalogSource {
    async fn fetch(&self) -> anyhow::Result<RawCatalogData> {
        Ok(self.data.clone())
    }
}
