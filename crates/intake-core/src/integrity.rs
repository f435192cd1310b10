//! Stable digest over a normalized submission.
//!
//! The document is written as canonical JSON (object keys sorted bytewise,
//! no insignificant whitespace) and hashed with SHA-256. Two submissions
//! with the same content therefore hash identically no matter in which order
//! the fields were submitted, which lets downstream consumers spot duplicates.

use serde_json::{Map, Value};
use sha2::{Digest, Sha256};

use crate::normalize::NormalizedSubmission;

/// Computes the `data_hash` of a submission.
#[derive(Debug, Clone, Copy, Default)]
pub struct IntegrityHasher;

impl IntegrityHasher {
    pub fn new() -> Self {
        Self
    }

    /// Lowercase hex SHA-256 of the canonical JSON form of `doc`.
    pub fn digest(&self, doc: &NormalizedSubmission) -> String {
        hex::encode(Sha256::digest(canonical_json(doc.as_map()).as_bytes()))
    }
}

fn canonical_json(map: &Map<String, Value>) -> String {
    let mut out = String::new();
    write_object(&mut out, map);
    out
}

fn write_canonical(out: &mut String, value: &Value) {
    match value {
        Value::Object(map) => write_object(out, map),
        Value::Array(items) => {
            out.push('[');
            for (idx, item) in items.iter().enumerate() {
                if idx > 0 {
                    out.push(',');
                }
                write_canonical(out, item);
            }
            out.push(']');
        }
        scalar => out.push_str(&scalar.to_string()),
    }
}

fn write_object(out: &mut String, map: &Map<String, Value>) {
    let mut entries: Vec<_> = map.iter().collect();
    entries.sort_unstable_by(|a, b| a.0.cmp(b.0));
    out.push('{');
    for (idx, (key, value)) in entries.into_iter().enumerate() {
        if idx > 0 {
            out.push(',');
        }
        out.push_str(&Value::String(key.clone()).to_string());
        out.push(':');
        write_canonical(out, value);
    }
    out.push('}');
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fields::FormFields;
    use crate::form::FormKind;
    use crate::normalize::FormNormalizer;
    use crate::normalize::tests::{pediatric_fields, standard_fields};
    use serde_json::json;

    #[test]
    fn canonical_form_sorts_keys_and_drops_whitespace() {
        let value = json!({"b": [1, {"z": null, "a": "x y"}], "a": true});
        assert_eq!(
            canonical_json(value.as_object().unwrap()),
            r#"{"a":true,"b":[1,{"a":"x y","z":null}]}"#
        );
    }

    #[test]
    fn digest_is_deterministic() {
        let doc = FormNormalizer::new()
            .normalize(FormKind::Standard, &standard_fields())
            .unwrap();
        let hasher = IntegrityHasher::new();
        let first = hasher.digest(&doc);
        assert_eq!(first, hasher.digest(&doc));
        assert_eq!(first.len(), 64);
        assert!(first.chars().all(|c| c.is_ascii_hexdigit() && !c.is_ascii_uppercase()));
    }

    #[test]
    fn digest_ignores_submission_order() {
        let normalizer = FormNormalizer::new();
        let forward = pediatric_fields();
        let reversed: FormFields = {
            let mut pairs: Vec<_> = forward.iter().collect();
            pairs.reverse();
            pairs.into_iter().collect()
        };
        let a = normalizer.normalize(FormKind::Pediatric, &forward).unwrap();
        let b = normalizer.normalize(FormKind::Pediatric, &reversed).unwrap();
        assert_eq!(IntegrityHasher::new().digest(&a), IntegrityHasher::new().digest(&b));
    }

    #[test]
    fn digest_changes_with_any_value() {
        let normalizer = FormNormalizer::new();
        let a = normalizer
            .normalize(FormKind::Standard, &standard_fields())
            .unwrap();
        let b = normalizer
            .normalize(FormKind::Standard, &standard_fields().with("allergies", "Peanuts"))
            .unwrap();
        assert_ne!(IntegrityHasher::new().digest(&a), IntegrityHasher::new().digest(&b));
    }
}
