//! Loading, validating and repairing the persisted progress blob.
//!
//! Validation rejects blobs whose top-level shape is wrong. Everything else
//! is repaired in one idempotent pass so consumers never see a record that
//! is missing fields added by newer builds.

use quest_core::model::{BadgeCatalog, Category, Loadout, MAX_SEEN, ProgressRecord};
use serde_json::{Map, Value};
use thiserror::Error;
use tracing::{debug, warn};

use crate::cache::{CacheError, ProgressCache};

/// Cache key of the current schema. Older keys are never read or migrated.
pub const PROGRESS_CACHE_KEY: &str = "quest_progress_v3";

/// Reasons a stored blob is rejected and replaced by defaults.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum SchemaError {
    #[error("progress blob is not valid JSON: {0}")]
    Json(String),

    #[error("progress blob is not an object")]
    NotAnObject,

    #[error("`{field}` has the wrong type")]
    WrongType { field: &'static str },

    #[error("progress blob does not match the record shape: {0}")]
    Shape(String),
}

/// What `load_from_cache` found.
#[derive(Debug, Clone, PartialEq)]
pub enum LoadOutcome {
    /// A valid (possibly repaired) record.
    Loaded(ProgressRecord),
    /// Nothing stored under the current key, or the cache could not be read.
    Missing,
    /// A blob was present but rejected.
    Reset(SchemaError),
}

impl LoadOutcome {
    /// The loaded record, or a fresh default.
    #[must_use]
    pub fn into_record(self) -> ProgressRecord {
        match self {
            LoadOutcome::Loaded(record) => record,
            LoadOutcome::Missing | LoadOutcome::Reset(_) => ProgressRecord::default(),
        }
    }
}

/// Read the current-schema blob from `cache`. Never fails; problems are logged.
pub fn load_from_cache(cache: &dyn ProgressCache, catalog: &BadgeCatalog) -> LoadOutcome {
    let raw = match cache.read(PROGRESS_CACHE_KEY) {
        Ok(Some(raw)) => raw,
        Ok(None) => return LoadOutcome::Missing,
        Err(err) => {
            warn!(error = %err, "progress cache unreadable, starting from defaults");
            return LoadOutcome::Missing;
        }
    };

    match decode_blob(&raw, catalog) {
        Ok(record) => LoadOutcome::Loaded(record),
        Err(err) => {
            warn!(error = %err, "invalid progress schema, resetting");
            LoadOutcome::Reset(err)
        }
    }
}

/// Load the record, falling back to defaults on any problem.
pub fn load_progress(cache: &dyn ProgressCache, catalog: &BadgeCatalog) -> ProgressRecord {
    load_from_cache(cache, catalog).into_record()
}

/// Serialize `record` under the current key.
///
/// # Errors
///
/// Returns `CacheError` if serialization or the cache write fails.
pub fn save_progress(cache: &dyn ProgressCache, record: &ProgressRecord) -> Result<(), CacheError> {
    let raw =
        serde_json::to_string(record).map_err(|e| CacheError::Serialization(e.to_string()))?;
    cache.write(PROGRESS_CACHE_KEY, &raw)
}

/// Parse, validate and repair a stored blob.
///
/// # Errors
///
/// Returns `SchemaError` if the blob cannot be turned into a record.
pub fn decode_blob(raw: &str, catalog: &BadgeCatalog) -> Result<ProgressRecord, SchemaError> {
    let value: Value = serde_json::from_str(raw).map_err(|e| SchemaError::Json(e.to_string()))?;
    repair(value, catalog)
}

/// Validate the top-level shape, then repair field contents.
///
/// Running this on its own output changes nothing.
///
/// # Errors
///
/// Returns `SchemaError` if a required field is missing or has the wrong type.
pub fn repair(mut value: Value, catalog: &BadgeCatalog) -> Result<ProgressRecord, SchemaError> {
    let obj = value.as_object_mut().ok_or(SchemaError::NotAnObject)?;
    validate_shape(obj)?;

    repair_level(obj);
    repair_categories(obj);
    repair_seen(obj);
    repair_badges(obj, catalog);
    repair_equipped(obj);

    let mut record: ProgressRecord =
        serde_json::from_value(value).map_err(|e| SchemaError::Shape(e.to_string()))?;

    let owned = &record.badges;
    record.equipped_badges.retain(|slot, id| {
        owned.contains(id) && catalog.get(id.as_str()).is_some_and(|b| b.slot == slot)
    });

    Ok(record)
}

fn validate_shape(obj: &Map<String, Value>) -> Result<(), SchemaError> {
    let checks: [(&'static str, fn(&Value) -> bool); 4] = [
        ("badges", Value::is_array),
        ("level", Value::is_number),
        ("completedCategories", Value::is_object),
        ("seenProblemIds", Value::is_array),
    ];
    for (field, ok) in checks {
        if !obj.get(field).is_some_and(ok) {
            return Err(SchemaError::WrongType { field });
        }
    }
    Ok(())
}

/// Non-negative integer count, accepting whole or fractional JSON numbers.
#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
fn as_count(value: &Value) -> Option<u32> {
    if let Some(n) = value.as_u64() {
        return Some(u32::try_from(n).unwrap_or(u32::MAX));
    }
    let f = value.as_f64()?;
    (f.is_finite() && f >= 0.0).then(|| f.min(f64::from(u32::MAX)).trunc() as u32)
}

fn repair_level(obj: &mut Map<String, Value>) {
    let level = obj.get("level").and_then(as_count).unwrap_or(1).max(1);
    obj.insert("level".into(), Value::from(level));
}

fn repair_categories(obj: &mut Map<String, Value>) {
    let Some(Value::Object(counts)) = obj.get_mut("completedCategories") else {
        return;
    };

    let known: Vec<&str> = Category::ALL.iter().map(|c| c.key()).collect();
    let mut repaired = Map::new();
    for (key, raw) in counts.iter() {
        match as_count(raw) {
            Some(count) => {
                repaired.insert(key.clone(), Value::from(count));
            }
            None if known.contains(&key.as_str()) => {
                repaired.insert(key.clone(), Value::from(0));
            }
            None => debug!(key = %key, "dropping non-numeric legacy category count"),
        }
    }
    for key in known {
        repaired.entry(key).or_insert_with(|| Value::from(0));
    }
    *counts = repaired;
}

fn repair_seen(obj: &mut Map<String, Value>) {
    let Some(Value::Array(seen)) = obj.get_mut("seenProblemIds") else {
        return;
    };
    seen.retain(Value::is_string);
    let excess = seen.len().saturating_sub(MAX_SEEN);
    if excess > 0 {
        seen.drain(..excess);
    }
}

fn repair_badges(obj: &mut Map<String, Value>, catalog: &BadgeCatalog) {
    let Some(Value::Array(badges)) = obj.get_mut("badges") else {
        return;
    };
    badges.retain(|id| id.as_str().is_some_and(|id| catalog.contains(id)));
}

fn repair_equipped(obj: &mut Map<String, Value>) {
    let valid = obj
        .get("equippedBadges")
        .is_some_and(|v| serde_json::from_value::<Loadout>(v.clone()).is_ok());
    if !valid {
        obj.insert("equippedBadges".into(), Value::Object(Map::new()));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::MemoryCache;
    use quest_core::model::{BadgeId, ExerciseId};
    use serde_json::json;

    fn catalog() -> BadgeCatalog {
        BadgeCatalog::standard()
    }

    fn valid_blob() -> Value {
        json!({
            "badges": ["chaos_eyes", "nebula_coat"],
            "level": 2,
            "completedCategories": {
                "ADDITION": 4, "SUBTRACTION": 0, "MULT_BREAKDOWN": 0, "MULT_NEAR": 1,
                "DIVISION": 0, "FRACTIONS": 12, "ESTIMATION": 0
            },
            "seenProblemIds": ["a", "b"],
            "equippedBadges": { "face": "chaos_eyes", "body1": "nebula_coat" },
            "totalSessions": 9,
            "lastSessionAt": 1_700_000_000_000_i64,
            "lastSessionAccuracy": 0.8,
            "streakDays": 3,
            "lastSessionDate": "2023-11-14"
        })
    }

    #[test]
    fn missing_blob_is_missing() {
        let cache = MemoryCache::new();
        assert_eq!(load_from_cache(&cache, &catalog()), LoadOutcome::Missing);
        assert_eq!(load_progress(&cache, &catalog()), ProgressRecord::default());
    }

    #[test]
    fn malformed_json_resets() {
        let cache = MemoryCache::new().with_entry(PROGRESS_CACHE_KEY, "{not json");
        assert!(matches!(
            load_from_cache(&cache, &catalog()),
            LoadOutcome::Reset(SchemaError::Json(_))
        ));
    }

    #[test]
    fn shape_checks_run_in_order() {
        let cases = [
            (json!([1, 2]), SchemaError::NotAnObject),
            (json!({ "badges": {} }), SchemaError::WrongType { field: "badges" }),
            (
                json!({ "badges": [], "level": "3" }),
                SchemaError::WrongType { field: "level" },
            ),
            (
                json!({ "badges": [], "level": 1, "completedCategories": [] }),
                SchemaError::WrongType { field: "completedCategories" },
            ),
            (
                json!({ "badges": [], "level": 1, "completedCategories": {} }),
                SchemaError::WrongType { field: "seenProblemIds" },
            ),
        ];
        for (blob, expected) in cases {
            assert_eq!(repair(blob, &catalog()).unwrap_err(), expected);
        }
    }

    #[test]
    fn wrong_meta_type_resets() {
        let mut blob = valid_blob();
        blob["streakDays"] = json!("lots");
        assert!(matches!(repair(blob, &catalog()), Err(SchemaError::Shape(_))));
    }

    #[test]
    fn missing_category_is_filled_and_rest_preserved() {
        let mut blob = valid_blob();
        blob["completedCategories"]
            .as_object_mut()
            .unwrap()
            .remove("DIVISION");
        let reference = repair(valid_blob(), &catalog()).unwrap();

        let record = repair(blob, &catalog()).unwrap();

        assert_eq!(record.solved_in(Category::Division), 0);
        assert_eq!(record, reference);
        assert_eq!(record.solved_in(Category::Fractions), 12);
        assert_eq!(record.streak_days, 3);
        assert_eq!(record.equipped_badges.face(), Some(&BadgeId::new("chaos_eyes")));
    }

    #[test]
    fn seen_ids_keep_the_most_recent() {
        let mut blob = valid_blob();
        blob["seenProblemIds"] = Value::Array((0..250).map(|i| json!(format!("p{i}"))).collect());

        let record = repair(blob, &catalog()).unwrap();

        assert_eq!(record.seen_problem_ids.len(), MAX_SEEN);
        assert_eq!(record.seen_problem_ids.first(), Some(&ExerciseId::new("p50")));
        assert_eq!(record.seen_problem_ids.last(), Some(&ExerciseId::new("p249")));
    }

    #[test]
    fn invalid_equipped_becomes_empty() {
        let mut blob = valid_blob();
        blob["equippedBadges"] = json!(7);
        assert!(repair(blob, &catalog()).unwrap().equipped_badges.is_empty());

        let mut blob = valid_blob();
        blob.as_object_mut().unwrap().remove("equippedBadges");
        assert!(repair(blob, &catalog()).unwrap().equipped_badges.is_empty());
    }

    #[test]
    fn equipped_must_be_owned_and_in_matching_slot() {
        let mut blob = valid_blob();
        blob["equippedBadges"] = json!({ "head": "chaos_eyes", "aura": "comet_tail_aura", "body1": "nebula_coat" });

        let record = repair(blob, &catalog()).unwrap();

        assert_eq!(record.equipped_badges.head(), None);
        assert_eq!(record.equipped_badges.aura(), None);
        assert_eq!(record.equipped_badges.body()[0], Some(&BadgeId::new("nebula_coat")));
    }

    #[test]
    fn legacy_values_are_normalised() {
        let mut blob = valid_blob();
        blob["level"] = json!(0.0);
        blob["badges"] = json!(["chaos_eyes", "teddy_hugs", 5, "chaos_eyes"]);
        blob["completedCategories"]["ADDITION"] = json!("four");
        blob["completedCategories"]["LEGACY"] = json!(3.0);
        blob["completedCategories"]["BROKEN"] = json!(null);

        let record = repair(blob, &catalog()).unwrap();

        assert_eq!(record.level, 1);
        assert_eq!(record.badges.len(), 1);
        assert_eq!(record.solved_in(Category::Addition), 0);
        assert_eq!(record.completed_categories.get("LEGACY"), Some(&3));
        assert!(!record.completed_categories.contains_key("BROKEN"));
    }

    #[test]
    fn repair_is_idempotent() {
        let mut blob = valid_blob();
        blob["completedCategories"] = json!({ "ADDITION": 2.0 });
        blob["seenProblemIds"] = Value::Array((0..300).map(|i| json!(format!("p{i}"))).collect());

        let once = repair(blob, &catalog()).unwrap();
        let twice = repair(serde_json::to_value(&once).unwrap(), &catalog()).unwrap();
        assert_eq!(once, twice);
    }

    #[test]
    fn save_then_load_round_trips() {
        let cache = MemoryCache::new();
        let record = repair(valid_blob(), &catalog()).unwrap();
        save_progress(&cache, &record).unwrap();
        assert_eq!(load_progress(&cache, &catalog()), record);
    }

    #[test]
    fn older_version_keys_are_ignored() {
        let cache = MemoryCache::new().with_entry("quest_progress_v2", valid_blob().to_string());
        assert_eq!(load_from_cache(&cache, &catalog()), LoadOutcome::Missing);
    }
}
