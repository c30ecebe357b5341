//! Intent Classifier (spec §4.5): maps an utterance to one of eight closed
//! intent kinds and extracts the few sub-parameters each kind needs.

use crate::cache::{cache_key, namespace, Cache};
use crate::llm::{LlmGateway, Task};
use crate::model::{Intent, IntentKind};
use std::sync::Arc;
use std::time::Duration;

/// Arabic/English trigger phrases the instruction enumerates for the LLM,
/// and the fast path below checks before paying for a round trip.
const GREETING_PATTERNS: &[&str] = &[
    "مرحبا", "اهلا", "أهلا", "السلام عليكم", "صباح الخير", "مساء الخير",
    "hello", "hi ", "hey", "good morning", "good evening",
];

const HELP_PATTERNS: &[&str] = &[
    "ماذا تستطيع", "كيف استخدم", "شو بتقدر تعمل", "مساعدة",
    "what can you do", "how do i use", "help me", "how does this work",
];

const MOST_VIEWED_PATTERNS: &[&str] = &["الأكثر مشاهدة", "أكثر مشاهدة", "most viewed"];
const MOST_IMPRESSIONED_PATTERNS: &[&str] =
    &["الأكثر تفاعلا", "الأكثر تفاعلاً", "most impressioned", "most engaged"];
const OFFICES_LIST_PATTERNS: &[&str] = &["المكاتب", "show offices", "list offices", "offices"];
const DETAILS_PATTERNS: &[&str] = &["تفاصيل", "details"];
const OFFICE_LISTINGS_PATTERNS: &[&str] =
    &["إعلانات المكتب", "listings of office", "listings for office"];

const SYSTEM_INSTRUCTION: &str = r#"You classify a single user utterance (Arabic or English) into exactly
one of these intent kinds: search, most_viewed, most_impressioned, get_offices,
get_office_details, get_office_listings, greeting, help.

Rules:
- Greetings ("مرحبا", "hello", "hi") -> greeting.
- Questions about your capabilities ("what can you do", "ماذا تستطيع") -> help.
- Mentions of "most viewed" / "أكثر مشاهدة" -> most_viewed.
- Mentions of "most impressioned" / "الأكثر تفاعلاً" -> most_impressioned.
- "show offices" / "المكاتب" with no specific office named -> get_offices.
- An office identifier or name plus "details" / "تفاصيل" -> get_office_details,
  with officeId set to that identifier or name.
- "listings of office X" / "إعلانات المكتب" -> get_office_listings, with
  officeId set to X.
- Anything else is a search, with query set to the cleaned search text.

Respond with a single JSON object: {"kind": "...", "query": string|null,
"officeId": string|null, "limit": number|null}. Use null, not omission, for
fields that do not apply. Default limit to 10 when the user did not ask for
a specific count."#;

#[derive(serde::Deserialize)]
struct RawIntent {
    kind: String,
    query: Option<String>,
    #[serde(rename = "officeId")]
    office_id: Option<String>,
    limit: Option<u32>,
}

fn parse_kind(kind: &str) -> Option<IntentKind> {
    match kind {
        "search" => Some(IntentKind::Search),
        "most_viewed" => Some(IntentKind::MostViewed),
        "most_impressioned" => Some(IntentKind::MostImpressioned),
        "get_offices" => Some(IntentKind::GetOffices),
        "get_office_details" => Some(IntentKind::GetOfficeDetails),
        "get_office_listings" => Some(IntentKind::GetOfficeListings),
        "greeting" => Some(IntentKind::Greeting),
        "help" => Some(IntentKind::Help),
        _ => None,
    }
}

fn contains_any(haystack: &str, needles: &[&str]) -> bool {
    needles.iter().any(|n| haystack.contains(n))
}

/// Cheap pre-LLM shortcut for the unambiguous phrase classes spec §4.5 lists.
/// Anything it doesn't recognize falls through to the LLM call.
fn fast_path(utterance: &str) -> Option<Intent> {
    let lower = utterance.to_lowercase();

    if contains_any(&lower, GREETING_PATTERNS) {
        return Some(Intent {
            kind: IntentKind::Greeting,
            query: None,
            office_id: None,
            limit: Intent::DEFAULT_LIMIT,
        });
    }
    if contains_any(&lower, HELP_PATTERNS) {
        return Some(Intent {
            kind: IntentKind::Help,
            query: None,
            office_id: None,
            limit: Intent::DEFAULT_LIMIT,
        });
    }
    if contains_any(&lower, MOST_IMPRESSIONED_PATTERNS) {
        return Some(Intent {
            kind: IntentKind::MostImpressioned,
            query: None,
            office_id: None,
            limit: Intent::DEFAULT_LIMIT,
        });
    }
    if contains_any(&lower, MOST_VIEWED_PATTERNS) {
        return Some(Intent {
            kind: IntentKind::MostViewed,
            query: None,
            office_id: None,
            limit: Intent::DEFAULT_LIMIT,
        });
    }
    if contains_any(&lower, OFFICE_LISTINGS_PATTERNS) {
        return None; // needs officeId extraction; let the LLM handle it.
    }
    if contains_any(&lower, DETAILS_PATTERNS) {
        return None; // needs officeId/name extraction; let the LLM handle it.
    }
    if contains_any(&lower, OFFICES_LIST_PATTERNS) {
        return Some(Intent {
            kind: IntentKind::GetOffices,
            query: None,
            office_id: None,
            limit: Intent::DEFAULT_LIMIT,
        });
    }
    None
}

pub struct IntentClassifier {
    cache: Arc<dyn Cache>,
    llm: Arc<dyn LlmGateway>,
    ttl: Duration,
}

impl IntentClassifier {
    pub fn new(cache: Arc<dyn Cache>, llm: Arc<dyn LlmGateway>, ttl: Duration) -> Self {
        Self { cache, llm, ttl }
    }

    pub async fn classify(&self, utterance: &str, language: &str) -> Intent {
        if let Some(intent) = fast_path(utterance) {
            return intent;
        }

        let key = cache_key(namespace::INTENT, &format!("{utterance}\u{1}{language}"));
        if let Some(bytes) = self.cache.get(&key).await {
            if let Ok(intent) = serde_json::from_slice::<Intent>(&bytes) {
                return intent;
            }
        }

        let intent = self.classify_via_llm(utterance).await;

        if let Ok(bytes) = serde_json::to_vec(&intent) {
            self.cache.set(&key, bytes, self.ttl).await;
        }
        intent
    }

    async fn classify_via_llm(&self, utterance: &str) -> Intent {
        let fallback = Intent {
            kind: IntentKind::Search,
            query: Some(utterance.to_string()),
            office_id: None,
            limit: Intent::DEFAULT_LIMIT,
        };

        let response = match self
            .llm
            .chat_json(Task::Fast, SYSTEM_INSTRUCTION, utterance)
            .await
        {
            Ok(value) => value,
            Err(err) => {
                tracing::warn!(error = %err, "intent classification LLM call failed, defaulting to search");
                return fallback;
            }
        };

        let raw: RawIntent = match serde_json::from_value(response) {
            Ok(raw) => raw,
            Err(err) => {
                tracing::warn!(error = %err, "intent LLM response did not match schema, defaulting to search");
                return fallback;
            }
        };

        let Some(kind) = parse_kind(&raw.kind) else {
            tracing::warn!(kind = raw.kind, "unknown intent kind from LLM, defaulting to search");
            return fallback;
        };

        Intent {
            kind,
            query: raw.query.or_else(|| {
                matches!(kind, IntentKind::Search).then(|| utterance.to_string())
            }),
            office_id: raw.office_id,
            limit: raw.limit.unwrap_or(Intent::DEFAULT_LIMIT),
        }
    }
}
