//! Canonical internal data model shared by every component.
//!
//! Catalog entities (`Category`, `City`, `Neighborhood`, `TransactionType`,
//! `Attribute`) are read-only snapshots owned by the catalog index.
//! `Listing` and `Office` are the marketplace entities a search ultimately
//! returns. `QueryPlan` and `RankedResult` are ephemeral, request-scoped.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Website origin used to build canonical listing/office URLs.
pub const WEBSITE_BASE_URL: &str = "https://www.kasioon.com";

/// Maximum number of expanded keywords a `QueryPlan` may carry.
pub const MAX_EXPANDED_KEYWORDS: usize = 5;

/// Maximum page size accepted anywhere in the system.
pub const MAX_LIMIT: u32 = 50;

// ── Catalog entities ──────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Category {
    pub id: String,
    pub slug: String,
    pub name_ar: String,
    pub name_en: String,
    pub parent_slug: Option<String>,
    pub is_leaf: bool,
    pub display_order: i32,
    pub active: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct City {
    pub id: String,
    pub name_ar: String,
    pub name_en: String,
    pub province: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Neighborhood {
    pub id: String,
    pub city_id: String,
    pub name_ar: String,
    pub name_en: String,
}

/// Closed variant for the four transaction kinds the marketplace supports.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransactionTypeSlug {
    Sale,
    Rent,
    Exchange,
    Wanted,
    DailyRent,
}

impl TransactionTypeSlug {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Sale => "sale",
            Self::Rent => "rent",
            Self::Exchange => "exchange",
            Self::Wanted => "wanted",
            Self::DailyRent => "daily_rent",
        }
    }

    pub fn from_str(slug: &str) -> Option<Self> {
        match slug {
            "sale" => Some(Self::Sale),
            "rent" => Some(Self::Rent),
            "exchange" => Some(Self::Exchange),
            "wanted" => Some(Self::Wanted),
            "daily_rent" => Some(Self::DailyRent),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransactionType {
    pub id: String,
    pub slug: TransactionTypeSlug,
    pub name_ar: String,
    pub name_en: String,
}

/// Value domain an `Attribute` stores: a number with a display unit, or
/// free text. A given `AttributeValue` instance is always one or the other
/// — never both — per the normalization invariant in the data model.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Attribute {
    pub id: String,
    pub slug: String,
    pub domain: AttributeDomain,
    pub display_unit: Option<String>,
    pub category_slug: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AttributeDomain {
    Number,
    Text,
}

/// A normalized attribute value on a listing. Exactly one of `Numeric`/`Text`
/// is ever constructed for a given attribute instance — this sum type makes
/// the "sometimes `attributes.price`, sometimes `price`" source ambiguity
/// unrepresentable at the core.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum AttributeValue {
    Numeric { value: f64, unit: Option<String> },
    Text(String),
}

impl AttributeValue {
    pub fn as_numeric(&self) -> Option<f64> {
        match self {
            Self::Numeric { value, .. } => Some(*value),
            Self::Text(_) => None,
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            Self::Text(text) => Some(text.as_str()),
            Self::Numeric { .. } => None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ListingAttribute {
    pub attribute_slug: String,
    pub value: AttributeValue,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ListingStatus {
    Active,
    Other,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Listing {
    pub id: String,
    pub title: String,
    pub description: String,
    pub category_slug: String,
    pub city_id: String,
    pub neighborhood_id: Option<String>,
    pub transaction_type: TransactionTypeSlug,
    pub views: i64,
    pub boosted: bool,
    pub priority: i32,
    pub created_at: chrono::DateTime<chrono::Utc>,
    pub status: ListingStatus,
    pub images: Vec<String>,
    pub main_image: Option<String>,
    pub videos: Vec<String>,
    pub office_id: Option<String>,
    pub user_id: Option<String>,
    pub attributes: Vec<ListingAttribute>,
}

impl Listing {
    /// Deterministic public URL. Renderers must use this, never invent one.
    pub fn url(&self) -> String {
        format!("{WEBSITE_BASE_URL}/listing/{}", self.id)
    }

    pub fn attribute(&self, slug: &str) -> Option<&AttributeValue> {
        self.attributes
            .iter()
            .find(|a| a.attribute_slug == slug)
            .map(|a| &a.value)
    }

    /// `impression_score = views + 1000*boosted + 10*priority`, per spec §4.8.
    pub fn impression_score(&self) -> i64 {
        self.views + if self.boosted { 1000 } else { 0 } + 10 * i64::from(self.priority)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Office {
    pub id: String,
    pub name: String,
    pub description_ar: String,
    pub description_en: String,
    pub phone: String,
    pub email: Option<String>,
    pub website: Option<String>,
    pub logo_url: Option<String>,
    pub city_id: String,
    pub address: String,
    pub geolocation: Option<(f64, f64)>,
    pub premium: bool,
    pub rating: Option<f64>,
    pub rating_count: i64,
    pub approved: bool,
}

impl Office {
    pub fn url(&self) -> String {
        format!("{WEBSITE_BASE_URL}/office/{}", self.id)
    }
}

// ── Ephemeral, request-scoped models ──────────────────────────────

/// The eight closed intent kinds the classifier may produce.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IntentKind {
    Search,
    MostViewed,
    MostImpressioned,
    GetOffices,
    GetOfficeDetails,
    GetOfficeListings,
    Greeting,
    Help,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Intent {
    pub kind: IntentKind,
    pub query: Option<String>,
    pub office_id: Option<String>,
    pub limit: u32,
}

impl Intent {
    pub const DEFAULT_LIMIT: u32 = 10;
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct QueryPlan {
    pub main_keyword: String,
    pub expanded_keywords: Vec<String>,
    pub suggested_categories: Vec<String>,
    pub location: Option<LocationHint>,
    pub transaction_type: Option<TransactionTypeSlug>,
    pub requested_attributes: HashMap<String, String>,
    pub price_indicator: Option<String>,
    pub condition_indicator: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum LocationHint {
    ResolvedCity { city_id: String, label: String },
    FreeText(String),
}

/// A dedup-by-case-fold, length-capped keyword set. Always contains the
/// main keyword (invariant enforced by the planner, not by this type).
pub fn normalize_expanded_keywords(main_keyword: &str, candidates: &[String]) -> Vec<String> {
    let mut seen = std::collections::HashSet::new();
    let mut out = Vec::new();

    for kw in std::iter::once(main_keyword.to_string()).chain(candidates.iter().cloned()) {
        let trimmed = kw.trim();
        if trimmed.is_empty() {
            continue;
        }
        let key = trimmed.to_lowercase();
        if seen.insert(key) {
            out.push(trimmed.to_string());
        }
        if out.len() >= MAX_EXPANDED_KEYWORDS {
            break;
        }
    }
    out
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TextMatchType {
    Exact,
    Prefix,
    Trigram,
    None,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AttributeMatchType {
    Exact,
    Partial,
    NoMatch,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MatchBreakdown {
    pub city: bool,
    pub neighborhood: bool,
    pub transaction_type: bool,
    pub text: TextMatchType,
    pub attributes_satisfied: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RankedResult {
    pub listing: Listing,
    pub match_score: u32,
    pub breakdown: MatchBreakdown,
    pub attribute_match: AttributeMatchType,
    pub matched_attributes: Vec<String>,
    pub unmatched_attributes: Vec<String>,
    pub exclusion_reason: Option<String>,
}

impl RankedResult {
    /// Wraps a plain `Listing` with neutral match metadata, so the stats
    /// intents (spec §4.8) can reuse the channel renderers built for
    /// scored search results without inventing a score that doesn't apply.
    pub fn unscored(listing: Listing) -> Self {
        Self {
            listing,
            match_score: 0,
            breakdown: MatchBreakdown {
                city: false,
                neighborhood: false,
                transaction_type: false,
                text: TextMatchType::None,
                attributes_satisfied: 0,
            },
            attribute_match: AttributeMatchType::NoMatch,
            matched_attributes: Vec::new(),
            unmatched_attributes: Vec::new(),
            exclusion_reason: None,
        }
    }
}

/// Which rung of the strategy ladder (spec §4.7.1) produced a search result.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StrategyTag {
    Strict,
    RelaxedLocation,
    RelaxedCategory,
    TextOnly,
    SuggestedCategory,
    NoResults,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Pagination {
    pub page: u32,
    pub limit: u32,
    pub total: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchOutcome {
    pub results: Vec<RankedResult>,
    pub pagination: Pagination,
    pub strategy: StrategyTag,
    pub fallback_message: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn listing_url_is_deterministic() {
        let listing = sample_listing();
        assert_eq!(listing.url(), "https://www.kasioon.com/listing/abc-123");
    }

    #[test]
    fn expanded_keywords_always_includes_main_and_caps_at_five() {
        let candidates: Vec<String> = (0..10).map(|i| format!("kw{i}")).collect();
        let out = normalize_expanded_keywords("toyota", &candidates);
        assert!(out.iter().any(|k| k.eq_ignore_ascii_case("toyota")));
        assert!(out.len() <= MAX_EXPANDED_KEYWORDS);
    }

    #[test]
    fn expanded_keywords_dedups_case_insensitively() {
        let candidates = vec!["Toyota".to_string(), "toyota".to_string(), "TOYOTA".to_string()];
        let out = normalize_expanded_keywords("toyota", &candidates);
        assert_eq!(out.len(), 1);
    }

    fn sample_listing() -> Listing {
        Listing {
            id: "abc-123".into(),
            title: "t".into(),
            description: "d".into(),
            category_slug: "cars".into(),
            city_id: "damascus".into(),
            neighborhood_id: None,
            transaction_type: TransactionTypeSlug::Sale,
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
            attributes: vec![],
        }
    }
}
