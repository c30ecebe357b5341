//! The immutable payload swapped atomically by the refresh loop (§4.1, §5).

use crate::model::{Attribute, Category, City, Neighborhood, TransactionType, TransactionTypeSlug};
use std::collections::{HashMap, HashSet};

/// Raw catalog rows as fetched from the source, before the index derives
/// its lookup structures (slug map, leaf set, keyword aliases).
#[derive(Debug, Clone, Default)]
pub struct RawCatalogData {
    pub categories: Vec<Category>,
    pub cities: Vec<City>,
    pub neighborhoods: Vec<Neighborhood>,
    pub transaction_types: Vec<TransactionType>,
    pub attributes: Vec<Attribute>,
}

/// A consistent, read-only view of the catalog. Readers never block on
/// refresh — `CatalogIndex` swaps a new `Arc<Snapshot>` in atomically.
#[derive(Debug, Clone)]
pub struct Snapshot {
    categories_by_slug: HashMap<String, Category>,
    leaf_slugs: HashSet<String>,
    cities_by_id: HashMap<String, City>,
    neighborhoods_by_id: HashMap<String, Neighborhood>,
    transaction_types_by_slug: HashMap<TransactionTypeSlug, TransactionType>,
    attributes_by_category: HashMap<String, Vec<Attribute>>,
    /// slug → alias list (bundled keyword file merged with DB-sourced aliases).
    category_keywords: HashMap<String, Vec<String>>,
}

impl Snapshot {
    pub fn build(raw: RawCatalogData, keyword_overrides: HashMap<String, Vec<String>>) -> Self {
        let mut categories_by_slug = HashMap::new();
        let mut leaf_slugs = HashSet::new();
        for category in raw.categories {
            if category.is_leaf {
                leaf_slugs.insert(category.slug.clone());
            }
            categories_by_slug.insert(category.slug.clone(), category);
        }

        let cities_by_id = raw.cities.into_iter().map(|c| (c.id.clone(), c)).collect();
        let neighborhoods_by_id = raw
            .neighborhoods
            .into_iter()
            .map(|n| (n.id.clone(), n))
            .collect();
        let transaction_types_by_slug = raw
            .transaction_types
            .into_iter()
            .map(|t| (t.slug, t))
            .collect();

        let mut attributes_by_category: HashMap<String, Vec<Attribute>> = HashMap::new();
        for attribute in raw.attributes {
            attributes_by_category
                .entry(attribute.category_slug.clone())
                .or_default()
                .push(attribute);
        }

        // "existing entries win": keyword_overrides come from the bundled
        // alias file, but any alias the catalog source already derived for
        // a slug (none, in this raw form) would take precedence.
        let category_keywords = keyword_overrides;

        Self {
            categories_by_slug,
            leaf_slugs,
            cities_by_id,
            neighborhoods_by_id,
            transaction_types_by_slug,
            attributes_by_category,
            category_keywords,
        }
    }

    pub fn lookup_category(&self, slug: &str) -> Option<&Category> {
        self.categories_by_slug.get(slug)
    }

    pub fn leaf_slugs(&self) -> &HashSet<String> {
        &self.leaf_slugs
    }

    pub fn is_leaf(&self, slug: &str) -> bool {
        self.leaf_slugs.contains(slug)
    }

    pub fn root_categories(&self) -> Vec<&Category> {
        let mut roots: Vec<&Category> = self
            .categories_by_slug
            .values()
            .filter(|c| c.parent_slug.is_none() && c.active)
            .collect();
        roots.sort_by_key(|c| c.display_order);
        roots
    }

    pub fn children_of(&self, slug: &str) -> Vec<&Category> {
        let mut children: Vec<&Category> = self
            .categories_by_slug
            .values()
            .filter(|c| c.parent_slug.as_deref() == Some(slug) && c.active)
            .collect();
        children.sort_by_key(|c| c.display_order);
        children
    }

    pub fn category_keywords(&self) -> &HashMap<String, Vec<String>> {
        &self.category_keywords
    }

    pub fn keywords_for(&self, slug: &str) -> &[String] {
        self.category_keywords
            .get(slug)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    pub fn lookup_city(&self, name: &str, lang: &str) -> Option<&City> {
        self.cities_by_id.values().find(|c| {
            let candidate = if lang == "ar" { &c.name_ar } else { &c.name_en };
            candidate.eq_ignore_ascii_case(name)
        })
    }

    pub fn city_by_id(&self, id: &str) -> Option<&City> {
        self.cities_by_id.get(id)
    }

    pub fn neighborhood_by_id(&self, id: &str) -> Option<&Neighborhood> {
        self.neighborhoods_by_id.get(id)
    }

    pub fn attributes_of(&self, category_slug: &str) -> &[Attribute] {
        self.attributes_by_category
            .get(category_slug)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    pub fn transaction_type_by_slug(&self, slug: TransactionTypeSlug) -> Option<&TransactionType> {
        self.transaction_types_by_slug.get(&slug)
    }
}
