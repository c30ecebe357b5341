//! Loads the category-keywords alias file (spec §4.1, §6).
//!
//! The file is an optional JSON object `{ slug: [alias, ...] }` merged into
//! the catalog index at boot. Existing in-memory entries (derived from the
//! catalog source itself) take precedence over the file — the file only
//! fills gaps.

use std::collections::HashMap;
use std::path::Path;

/// Merge `file_aliases` into `existing`, keeping `existing`'s entries for any
/// slug present in both.
pub fn merge_keyword_overrides(
    existing: HashMap<String, Vec<String>>,
    file_aliases: HashMap<String, Vec<String>>,
) -> HashMap<String, Vec<String>> {
    let mut merged = file_aliases;
    for (slug, aliases) in existing {
        merged.insert(slug, aliases);
    }
    merged
}

/// Load the keyword aliases file if `path` is set and readable. A missing
/// or absent path is not an error — callers fall back to an empty map.
pub fn load_keyword_file(path: Option<&str>) -> anyhow::Result<HashMap<String, Vec<String>>> {
    let Some(path) = path else {
        return Ok(HashMap::new());
    };
    let path = Path::new(path);
    if !path.exists() {
        tracing::warn!(path = %path.display(), "category keywords file not found, skipping");
        return Ok(HashMap::new());
    }
    let contents = std::fs::read_to_string(path)?;
    let parsed: HashMap<String, Vec<String>> = serde_json::from_str(&contents)?;
    Ok(parsed)
}

/// Built-in fallback aliases bundled at compile time, used when the catalog
/// source itself cannot be reached at boot (spec §4.1: "fails to initialize
/// only if neither the remote catalog nor a bundled fallback is available").
pub fn bundled_fallback_aliases() -> HashMap<String, Vec<String>> {
    const BUNDLED_JSON: &str = include_str!("fallback_keywords.json");
    serde_json::from_str(BUNDLED_JSON).unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn existing_entries_win_over_file() {
        let mut existing = HashMap::new();
        existing.insert("cars".to_string(), vec!["سيارات".to_string()]);

        let mut from_file = HashMap::new();
        from_file.insert("cars".to_string(), vec!["vehicles".to_string()]);
        from_file.insert("real-estate".to_string(), vec!["عقارات".to_string()]);

        let merged = merge_keyword_overrides(existing, from_file);
        assert_eq!(merged["cars"], vec!["سيارات".to_string()]);
        assert_eq!(merged["real-estate"], vec!["عقارات".to_string()]);
    }

    #[test]
    fn missing_file_path_yields_empty_map() {
        let result = load_keyword_file(None).unwrap();
        assert!(result.is_empty());
    }

    #[test]
    fn bundled_fallback_has_at_least_one_category() {
        let aliases = bundled_fallback_aliases();
        assert!(!aliases.is_empty());
    }
}
