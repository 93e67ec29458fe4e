//! Guesses catalog metadata from an exported file name.
//!
//! `gold_storage_lvl19.png` becomes name "Gold Storage", slug
//! "gold-storage-19" and level "19". A trailing `_0` (added by the export
//! tool) is dropped first. Names without a `lvl<digits>` token have no level.

use once_cell::sync::Lazy;
use regex::Regex;
use std::path::Path;

static EXPORT_SUFFIX: Lazy<Regex> = Lazy::new(|| Regex::new(r"_0$").unwrap());
static LEVEL_TOKEN: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)lvl(\d+)").unwrap());
static LEVEL_TAIL: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)_?lvl\d+.*$").unwrap());
static SEPARATORS: Lazy<Regex> = Lazy::new(|| Regex::new(r"[_\s]+").unwrap());

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InferredAsset {
    pub name: String,
    pub slug: String,
    pub level: Option<String>,
}

pub fn infer_from_path(path: &Path) -> Option<InferredAsset> {
    let stem = path.file_stem()?.to_str()?;
    infer_from_stem(stem)
}

/// `None` when nothing is left to name the asset after.
pub fn infer_from_stem(stem: &str) -> Option<InferredAsset> {
    let clean = EXPORT_SUFFIX.replace(stem, "");

    let level = LEVEL_TOKEN
        .captures(&clean)
        .map(|caps| caps[1].to_string());

    let base = LEVEL_TAIL.replace(&clean, "");
    let name = title_case(SEPARATORS.replace_all(&base, " ").trim());
    if name.is_empty() {
        return None;
    }

    let lowered = clean.to_lowercase();
    let without_marker = LEVEL_TOKEN.replace_all(&lowered, "$1");
    let slug = SEPARATORS
        .replace_all(without_marker.trim(), "-")
        .trim_matches('-')
        .to_string();

    Some(InferredAsset { name, slug, level })
}

/// Upper-cases the first letter of every alphabetic run, lower-cases the rest.
fn title_case(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    let mut prev_alpha = false;
    for c in s.chars() {
        if c.is_alphabetic() {
            if prev_alpha {
                out.extend(c.to_lowercase());
            } else {
                out.extend(c.to_uppercase());
            }
            prev_alpha = true;
        } else {
            out.push(c);
            prev_alpha = false;
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn level_building() {
        let inferred = infer_from_path(Path::new("drop/gold_storage_lvl19.png")).unwrap();
        assert_eq!(
            inferred,
            InferredAsset {
                name: "Gold Storage".to_string(),
                slug: "gold-storage-19".to_string(),
                level: Some("19".to_string()),
            }
        );
    }

    #[test]
    fn no_level_token() {
        let inferred = infer_from_stem("town_hall").unwrap();
        assert_eq!(inferred.name, "Town Hall");
        assert_eq!(inferred.slug, "town-hall");
        assert_eq!(inferred.level, None);
    }

    #[test]
    fn export_suffix_and_mixed_case() {
        let inferred = infer_from_stem("X_Bow_LVL7_0").unwrap();
        assert_eq!(inferred.name, "X Bow");
        assert_eq!(inferred.slug, "x-bow-7");
        assert_eq!(inferred.level.as_deref(), Some("7"));
    }

    #[test]
    fn trailing_text_after_level_stays_in_slug() {
        let inferred = infer_from_stem("cannon_lvl5_night").unwrap();
        assert_eq!(inferred.name, "Cannon");
        assert_eq!(inferred.slug, "cannon-5-night");
    }

    #[test]
    fn bare_level_has_no_name() {
        assert_eq!(infer_from_stem("lvl12"), None);
    }

    #[test]
    fn title_case_words() {
        assert_eq!(title_case("air sweeper"), "Air Sweeper");
        assert_eq!(title_case("MEGA-tesla"), "Mega-Tesla");
    }
}
