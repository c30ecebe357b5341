//! Attribute scoring & re-ranking (spec §4.7.4, §4.7.5).

use crate::catalog::CatalogIndex;
use crate::model::{
    AttributeMatchType, AttributeValue, Listing, LocationHint, MatchBreakdown, QueryPlan,
    TextMatchType,
};

pub const DEFAULT_MIN_SCORE: u32 = 30;

pub struct Scored {
    pub score: u32,
    pub breakdown: MatchBreakdown,
    pub attribute_match: AttributeMatchType,
    pub matched_attributes: Vec<String>,
    pub unmatched_attributes: Vec<String>,
    /// `Some` when a numeric attribute disagreed beyond the 50% tolerance —
    /// the caller must drop this listing regardless of its numeric score.
    pub excluded_reason: Option<String>,
}

fn parse_range(raw: &str) -> Option<(f64, f64)> {
    let (lo, hi) = raw.split_once('-')?;
    let lo: f64 = lo.trim().parse().ok()?;
    let hi: f64 = hi.trim().parse().ok()?;
    Some((lo.min(hi), lo.max(hi)))
}

fn location_bonus(plan: &QueryPlan, listing: &Listing, catalog: &CatalogIndex) -> (bool, bool, u32) {
    match &plan.location {
        Some(LocationHint::ResolvedCity { city_id, .. }) => {
            if &listing.city_id == city_id {
                (true, false, 30)
            } else {
                (false, false, 0)
            }
        }
        Some(LocationHint::FreeText(text)) => {
            let text_fold = text.to_lowercase();
            let neighborhood_match = listing
                .neighborhood_id
                .as_deref()
                .and_then(|id| catalog.neighborhood_by_id(id))
                .map(|n| {
                    text_fold.contains(&n.name_ar.to_lowercase())
                        || text_fold.contains(&n.name_en.to_lowercase())
                })
                .unwrap_or(false);
            if neighborhood_match {
                (false, true, 15)
            } else {
                (false, false, 0)
            }
        }
        None => (false, false, 0),
    }
}

fn text_bonus(text_match: TextMatchType) -> u32 {
    match text_match {
        TextMatchType::Exact => 25,
        TextMatchType::Prefix => 15,
        TextMatchType::Trigram => 8,
        TextMatchType::None => 0,
    }
}

/// A requested numeric attribute satisfies if within 10% relative tolerance
/// of the actual value, or the actual value falls inside a requested range.
/// It is excluded (−20, drop) if it disagrees by more than 50%.
enum NumericVerdict {
    Satisfied,
    Excluded,
    Neutral,
}

fn check_numeric(raw_request: &str, actual: f64) -> NumericVerdict {
    if let Ok(requested) = raw_request.trim().parse::<f64>() {
        let tolerance_base = requested.abs().max(1.0);
        let relative = (requested - actual).abs() / tolerance_base;
        return if relative <= 0.1 {
            NumericVerdict::Satisfied
        } else if relative > 0.5 {
            NumericVerdict::Excluded
        } else {
            NumericVerdict::Neutral
        };
    }
    if let Some((lo, hi)) = parse_range(raw_request) {
        return if actual >= lo && actual <= hi {
            NumericVerdict::Satisfied
        } else {
            NumericVerdict::Neutral
        };
    }
    NumericVerdict::Neutral
}

fn check_text(raw_request: &str, actual: &str) -> bool {
    let requested_fold = raw_request.trim().to_lowercase();
    let actual_fold = actual.to_lowercase();
    actual_fold == requested_fold || actual_fold.contains(&requested_fold)
}

pub fn score_listing(
    plan: &QueryPlan,
    listing: &Listing,
    text_match: TextMatchType,
    catalog: &CatalogIndex,
) -> Scored {
    let (city_match, neighborhood_match, location_points) = location_bonus(plan, listing, catalog);

    let transaction_match = plan
        .transaction_type
        .is_some_and(|requested| listing.transaction_type == requested);

    let mut score = location_points;
    if transaction_match {
        score += 20;
    }
    score += text_bonus(text_match);

    let mut matched_attributes = Vec::new();
    let mut unmatched_attributes = Vec::new();
    let mut excluded_reason = None;
    let mut satisfied_count = 0u32;

    for (slug, raw_value) in &plan.requested_attributes {
        match listing.attribute(slug) {
            None => unmatched_attributes.push(slug.clone()),
            Some(AttributeValue::Numeric { value, .. }) => match check_numeric(raw_value, *value) {
                NumericVerdict::Satisfied => {
                    matched_attributes.push(slug.clone());
                    satisfied_count += 1;
                }
                NumericVerdict::Excluded => {
                    unmatched_attributes.push(slug.clone());
                    excluded_reason.get_or_insert_with(|| {
                        format!("{slug} disagrees with the requested value beyond tolerance")
                    });
                }
                NumericVerdict::Neutral => unmatched_attributes.push(slug.clone()),
            },
            Some(AttributeValue::Text(text)) => {
                if check_text(raw_value, text) {
                    matched_attributes.push(slug.clone());
                    satisfied_count += 1;
                } else {
                    unmatched_attributes.push(slug.clone());
                }
            }
        }
    }

    score += satisfied_count.min(5) * 5;
    let score = score.min(100);

    let attribute_match = if plan.requested_attributes.is_empty() {
        AttributeMatchType::NoMatch
    } else if unmatched_attributes.is_empty() {
        AttributeMatchType::Exact
    } else if !matched_attributes.is_empty() {
        AttributeMatchType::Partial
    } else {
        AttributeMatchType::NoMatch
    };

    let breakdown = MatchBreakdown {
        city: city_match,
        neighborhood: neighborhood_match,
        transaction_type: transaction_match,
        text: text_match,
        attributes_satisfied: satisfied_count,
    };

    Scored {
        score,
        breakdown,
        attribute_match,
        matched_attributes,
        unmatched_attributes,
        excluded_reason,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::snapshot::RawCatalogData;
    use crate::catalog::source::StaticCatalogSource;
    use crate::model::{ListingAttribute, ListingStatus, TransactionTypeSlug};
    use std::collections::HashMap;
    use std::sync::Arc;

    async fn empty_catalog() -> CatalogIndex {
        let source = Arc::new(StaticCatalogSource::new(RawCatalogData::default()));
        CatalogIndex::init(source, None).await.unwrap()
    }

    fn sample_listing() -> Listing {
        Listing {
            id: "1".into(),
            title: "شقة للايجار".into(),
            description: "شقة 3 غرف في دمشق".into(),
            category_slug: "apartments".into(),
            city_id: "damascus".into(),
            neighborhood_id: None,
            transaction_type: TransactionTypeSlug::Rent,
            views: 10,
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

    #[tokio::test]
    async fn city_and_transaction_and_exact_text_and_attribute_score_at_least_55() {
        let catalog = empty_catalog().await;
        let mut requested_attributes = HashMap::new();
        requested_attributes.insert("rooms".to_string(), "3".to_string());
        let plan = QueryPlan {
            location: Some(LocationHint::ResolvedCity {
                city_id: "damascus".into(),
                label: "دمشق".into(),
            }),
            transaction_type: Some(TransactionTypeSlug::Rent),
            requested_attributes,
            ..Default::default()
        };
        let scored = score_listing(&plan, &sample_listing(), TextMatchType::Exact, &catalog);
        assert!(scored.score >= 55, "expected >=55, got {}", scored.score);
        assert_eq!(scored.attribute_match, AttributeMatchType::Exact);
    }

    #[tokio::test]
    async fn numeric_disagreement_beyond_tolerance_is_excluded() {
        let catalog = empty_catalog().await;
        let mut requested_attributes = HashMap::new();
        requested_attributes.insert("rooms".to_string(), "10".to_string());
        let plan = QueryPlan {
            requested_attributes,
            ..Default::default()
        };
        let scored = score_listing(&plan, &sample_listing(), TextMatchType::None, &catalog);
        assert!(scored.excluded_reason.is_some());
    }

    #[tokio::test]
    async fn score_never_exceeds_100() {
        let catalog = empty_catalog().await;
        let mut requested_attributes = HashMap::new();
        requested_attributes.insert("rooms".to_string(), "3".to_string());
        let plan = QueryPlan {
            location: Some(LocationHint::ResolvedCity {
                city_id: "damascus".into(),
                label: "دمشق".into(),
            }),
            transaction_type: Some(TransactionTypeSlug::Rent),
            requested_attributes,
            ..Default::default()
        };
        let scored = score_listing(&plan, &sample_listing(), TextMatchType::Exact, &catalog);
        assert!(scored.score <= 100);
    }
}
