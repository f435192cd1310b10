//! Conversion of raw submitted fields into the canonical nested document.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Number, Value};
use time::Date;
use time::macros::format_description;

use crate::error::ValidationError;
use crate::fields::FormFields;
use crate::form::FormKind;
use crate::schema::{FieldKind, FormSchema, Node};

/// Normalized submission, keyed by section name.
///
/// Every key declared by the form schema is present; absent optional values
/// are `null` and absent lists are `[]`. No other keys appear.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NormalizedSubmission(Map<String, Value>);

impl NormalizedSubmission {
    pub fn get(&self, section: &str) -> Option<&Value> {
        self.0.get(section)
    }

    /// Look a value up by dotted path, e.g. `consent.treatment_consent`.
    pub fn pointer(&self, path: &str) -> Option<&Value> {
        let mut parts = path.split('.');
        let mut current = self.0.get(parts.next()?)?;
        for part in parts {
            current = current.get(part)?;
        }
        Some(current)
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.0.keys().map(String::as_str)
    }

    pub fn as_map(&self) -> &Map<String, Value> {
        &self.0
    }

    pub fn into_value(self) -> Value {
        Value::Object(self.0)
    }
}

impl From<NormalizedSubmission> for Value {
    fn from(doc: NormalizedSubmission) -> Self {
        doc.into_value()
    }
}

/// Maps flat submitted fields onto a form schema.
#[derive(Debug, Clone, Copy, Default)]
pub struct FormNormalizer;

impl FormNormalizer {
    pub fn new() -> Self {
        Self
    }

    /// Normalize `fields` for `kind`, failing on the first field that does
    /// not satisfy the schema (in schema order).
    pub fn normalize(
        &self,
        kind: FormKind,
        fields: &FormFields,
    ) -> Result<NormalizedSubmission, ValidationError> {
        let schema = FormSchema::for_kind(kind);
        let mut path = Vec::new();
        let doc = normalize_nodes(schema.nodes, fields, &mut path)?;
        Ok(NormalizedSubmission(doc))
    }
}

fn normalize_nodes(
    nodes: &[Node],
    fields: &FormFields,
    path: &mut Vec<&'static str>,
) -> Result<Map<String, Value>, ValidationError> {
    let mut out = Map::new();
    for node in nodes {
        path.push(node.key());
        let value = match node {
            Node::Group { children, .. } | Node::Checked { children, .. } => {
                Value::Object(normalize_nodes(children, fields, path)?)
            }
            Node::Field {
                sources,
                kind,
                required,
                ..
            } => normalize_field(sources, *kind, *required, fields, path)?,
            Node::List {
                sources,
                options,
                required,
                ..
            } => collect_choices(sources, options, *required, fields, path)?,
        };
        path.pop();
        if node.is_forwarded() {
            out.insert(node.key().to_string(), value);
        }
    }
    Ok(out)
}

fn normalize_field(
    sources: &[&str],
    kind: FieldKind,
    required: bool,
    fields: &FormFields,
    path: &[&str],
) -> Result<Value, ValidationError> {
    let invalid = |reason: String| ValidationError::new(path.join("."), reason);

    let raw = sources
        .iter()
        .filter_map(|source| fields.first(source))
        .find_map(sanitize);
    let Some(value) = raw else {
        if required {
            return Err(ValidationError::required(path.join(".")));
        }
        return Ok(Value::Null);
    };

    match kind {
        FieldKind::Text { max_len } => {
            check_length(&value, max_len).map_err(invalid)?;
            Ok(Value::String(value))
        }
        FieldKind::Phone => {
            check_length(&value, 30).map_err(invalid)?;
            Ok(Value::String(value))
        }
        FieldKind::Email { max_len } => {
            check_length(&value, max_len).map_err(invalid)?;
            if !looks_like_email(&value) {
                return Err(invalid("Invalid email address.".into()));
            }
            Ok(Value::String(value))
        }
        FieldKind::Date => {
            let date = Date::parse(&value, format_description!("[year]-[month]-[day]"))
                .map_err(|_| invalid("Not a valid date value.".into()))?;
            Ok(Value::String(date.to_string()))
        }
        FieldKind::Integer { min, max } => {
            let number: i64 = value
                .parse()
                .map_err(|_| invalid("Not a valid integer value.".into()))?;
            if number < min || number > max {
                return Err(invalid(format!("Number must be between {min} and {max}.")));
            }
            Ok(Value::Number(number.into()))
        }
        FieldKind::Decimal => {
            let number = value
                .parse::<f64>()
                .ok()
                .filter(|n| n.is_finite() && *n >= 0.0)
                .and_then(Number::from_f64)
                .ok_or_else(|| invalid("Not a valid decimal value.".into()))?;
            Ok(Value::Number(number))
        }
        FieldKind::Choice { options } => {
            if !options.contains(&value.as_str()) {
                return Err(invalid("Not a valid choice.".into()));
            }
            Ok(Value::String(value))
        }
        FieldKind::Consent => match value.to_ascii_lowercase().as_str() {
            "y" | "yes" | "on" | "true" | "1" | "checked" => Ok(Value::Bool(true)),
            "n" | "no" | "off" | "false" | "0" => {
                if required {
                    Err(invalid("Consent must be given to continue.".into()))
                } else {
                    Ok(Value::Bool(false))
                }
            }
            _ => Err(invalid("Not a valid consent value.".into())),
        },
    }
}

fn collect_choices(
    sources: &[&str],
    options: &[&str],
    required: bool,
    fields: &FormFields,
    path: &[&str],
) -> Result<Value, ValidationError> {
    let mut selected = Vec::new();
    for (name, raw) in fields.iter() {
        if !sources.contains(&name) {
            continue;
        }
        let Some(value) = sanitize(raw) else {
            continue;
        };
        if !options.contains(&value.as_str()) {
            return Err(ValidationError::new(
                path.join("."),
                format!("'{value}' is not a valid choice."),
            ));
        }
        selected.push(Value::String(value));
    }
    if required && selected.is_empty() {
        return Err(ValidationError::required(path.join(".")));
    }
    Ok(Value::Array(selected))
}

/// Trim whitespace and drop control characters; blank becomes `None`.
fn sanitize(raw: &str) -> Option<String> {
    let cleaned: String = raw.trim().chars().filter(|c| *c >= ' ').collect();
    let cleaned = cleaned.trim();
    (!cleaned.is_empty()).then(|| cleaned.to_string())
}

fn check_length(value: &str, max_len: usize) -> Result<(), String> {
    if value.chars().count() > max_len {
        return Err(format!("Field cannot be longer than {max_len} characters."));
    }
    Ok(())
}

fn looks_like_email(value: &str) -> bool {
    let Some((local, domain)) = value.split_once('@') else {
        return false;
    };
    !local.is_empty()
        && !domain.contains('@')
        && !value.contains(char::is_whitespace)
        && domain
            .split_once('.')
            .is_some_and(|(host, tld)| !host.is_empty() && !tld.is_empty() && !tld.ends_with('.'))
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use serde_json::json;

    pub(crate) fn standard_fields() -> FormFields {
        FormFields::new()
            .with("first_name", "Jane")
            .with("last_name", "Doe")
            .with("date_of_birth", "1990-04-12")
            .with("phone", "(713) 555-0100")
            .with("street_address", "1 Main St")
            .with("city", "Houston")
            .with("state", "TX")
            .with("zip_code", "77002")
            .with("emergency_contact_name", "John Doe")
            .with("emergency_contact_phone", "713-555-0101")
            .with("emergency_contact_relationship", "Spouse")
            .with("reason_for_visit", "Annual checkup")
    }

    pub(crate) fn pediatric_fields() -> FormFields {
        FormFields::new()
            .with("patient_name", "Sam Doe")
            .with("patient_age", "4")
            .with("patient_sex", "male")
            .with("patient_dob", "2022-01-15")
            .with("delivery_type", "vaginal")
            .with("birth_timing", "full_term")
            .with("hearing_test_passed", "yes")
            .with("hep_b_vaccine", "yes")
            .with("household_members", "4")
            .with("any_pets", "no")
            .with("anyone_smokes", "no")
            .with("lead_exposure", "unknown")
            .with("voice_message_consent", "yes")
            .with("guardian_signature_name", "Jane Doe")
            .with("guardian_relationship", "Mother")
            .with("signature_date", "2026-05-01")
            .with("patient_last_name", "Doe")
            .with("patient_first_name", "Sam")
            .with("patient_dob_page2", "2022-01-15")
            .with("patient_age_page2", "4")
            .with("patient_gender", "male")
            .with("patient_address", "1 Main St")
            .with("patient_city", "Houston")
            .with("patient_state", "TX")
            .with("patient_zip", "77002")
            .with("emergency_contact_name", "John Doe")
            .with("emergency_contact_phone", "713-555-0101")
            .with("treatment_consent", "y")
            .with("parent_guardian_name_final", "Jane Doe")
            .with("final_signature_date", "2026-05-01")
    }

    fn without(fields: &FormFields, name: &str) -> FormFields {
        fields.iter().filter(|(k, _)| *k != name).collect()
    }

    #[test]
    fn standard_minimal_fields_normalize_with_nulls() {
        let doc = FormNormalizer::new()
            .normalize(FormKind::Standard, &standard_fields())
            .unwrap();
        let mut keys: Vec<_> = doc.keys().collect();
        keys.sort_unstable();
        assert_eq!(
            keys,
            [
                "address",
                "contact_information",
                "emergency_contact",
                "insurance_information",
                "medical_information",
                "personal_information",
                "visit_information",
            ]
        );
        assert_eq!(doc.pointer("emergency_contact.relationship"), Some(&json!("Spouse")));
        assert_eq!(doc.pointer("contact_information.email"), Some(&Value::Null));
        assert_eq!(doc.pointer("medical_information.allergies"), Some(&Value::Null));
    }

    #[test]
    fn pediatric_document_shape() {
        let fields = pediatric_fields()
            .with("child_conditions[]", "asthma_pneumonia")
            .with("mother_name", "Jane Doe")
            .with("birth_weight", "7.25")
            .with("child_conditions[]", "ulcers");
        let doc = FormNormalizer::new()
            .normalize(FormKind::Pediatric, &fields)
            .unwrap();

        assert_eq!(
            doc.pointer("medical_history.child_conditions"),
            Some(&json!(["asthma_pneumonia", "ulcers"]))
        );
        assert_eq!(doc.pointer("medical_history.family_conditions"), Some(&json!([])));
        assert_eq!(doc.pointer("consent.treatment_consent"), Some(&json!(true)));
        assert_eq!(doc.pointer("consent.parent_guardian_name"), Some(&json!("Jane Doe")));
        assert_eq!(doc.pointer("consent.signature_date"), Some(&json!("2026-05-01")));
        assert_eq!(doc.pointer("parent_guardian_info.mother.name"), Some(&json!("Jane Doe")));
        assert_eq!(doc.pointer("parent_guardian_info.father.cell"), Some(&Value::Null));
        let mut guardian_info: Vec<_> = doc
            .pointer("parent_guardian_info")
            .and_then(Value::as_object)
            .unwrap()
            .keys()
            .cloned()
            .collect();
        guardian_info.sort_unstable();
        assert_eq!(guardian_info, ["father", "mother"]);
        assert_eq!(doc.pointer("patient_history.age"), Some(&json!(4)));
        assert_eq!(doc.pointer("birth_history.birth_weight"), Some(&json!(7.25)));
        assert_eq!(doc.pointer("birth_history.birth_weeks"), Some(&Value::Null));
        assert_eq!(doc.get("siblings_info"), Some(&Value::Null));
        assert_eq!(doc.pointer("address.zip"), Some(&json!("77002")));
        assert_eq!(doc.keys().count(), 9);
    }

    #[test]
    fn list_inputs_accept_every_alias_in_submission_order() {
        let fields = pediatric_fields()
            .with("family_medical_history", "diabetes")
            .with("family_conditions[]", "asthma")
            .with("family_conditions", "tb");
        let doc = FormNormalizer::new()
            .normalize(FormKind::Pediatric, &fields)
            .unwrap();
        assert_eq!(
            doc.pointer("medical_history.family_conditions"),
            Some(&json!(["diabetes", "asthma", "tb"]))
        );
    }

    #[test]
    fn missing_treatment_consent_is_reported_by_path() {
        let fields = without(&pediatric_fields(), "treatment_consent");
        let err = FormNormalizer::new()
            .normalize(FormKind::Pediatric, &fields)
            .unwrap_err();
        assert_eq!(err.field, "consent.treatment_consent");
        assert_eq!(err.reason, "This field is required.");
    }

    #[test]
    fn acknowledgement_is_required_but_not_forwarded() {
        let fields = without(&pediatric_fields(), "guardian_relationship");
        let err = FormNormalizer::new()
            .normalize(FormKind::Pediatric, &fields)
            .unwrap_err();
        assert_eq!(err.field, "parent_guardian_info.guardian.relationship");

        let fields = without(&pediatric_fields(), "emergency_contact_phone");
        let err = FormNormalizer::new()
            .normalize(FormKind::Pediatric, &fields)
            .unwrap_err();
        assert_eq!(err.field, "parent_guardian_info.emergency_contact.phone");

        let doc = FormNormalizer::new()
            .normalize(FormKind::Pediatric, &pediatric_fields())
            .unwrap();
        assert!(doc.pointer("parent_guardian_info.guardian").is_none());
        assert!(doc.pointer("parent_guardian_info.emergency_contact").is_none());
    }

    #[test]
    fn declined_consent_is_rejected() {
        let fields = without(&pediatric_fields(), "treatment_consent").with("treatment_consent", "false");
        let err = FormNormalizer::new()
            .normalize(FormKind::Pediatric, &fields)
            .unwrap_err();
        assert_eq!(err.field, "consent.treatment_consent");
    }

    #[test]
    fn unparseable_date_is_rejected() {
        let fields = without(&standard_fields(), "date_of_birth").with("date_of_birth", "12/04/1990");
        let err = FormNormalizer::new()
            .normalize(FormKind::Standard, &fields)
            .unwrap_err();
        assert_eq!(err.field, "personal_information.date_of_birth");
        assert_eq!(err.reason, "Not a valid date value.");
    }

    #[test]
    fn range_choice_and_length_rules() {
        let normalizer = FormNormalizer::new();

        let too_old = without(&pediatric_fields(), "patient_age").with("patient_age", "19");
        let err = normalizer.normalize(FormKind::Pediatric, &too_old).unwrap_err();
        assert_eq!(err.field, "patient_history.age");

        let bad_state = without(&standard_fields(), "state").with("state", "ZZ");
        let err = normalizer.normalize(FormKind::Standard, &bad_state).unwrap_err();
        assert_eq!(err.field, "address.state");

        let long_zip = without(&standard_fields(), "zip_code").with("zip_code", "12345678901");
        let err = normalizer.normalize(FormKind::Standard, &long_zip).unwrap_err();
        assert_eq!(err.field, "address.zip_code");

        let bad_condition = pediatric_fields().with("child_conditions[]", "broken_leg");
        let err = normalizer.normalize(FormKind::Pediatric, &bad_condition).unwrap_err();
        assert_eq!(err.field, "medical_history.child_conditions");

        let bad_email = standard_fields().with("email", "jane.example.com");
        let err = normalizer.normalize(FormKind::Standard, &bad_email).unwrap_err();
        assert_eq!(err.field, "contact_information.email");
    }

    #[test]
    fn values_are_sanitized() {
        let fields = without(&standard_fields(), "first_name")
            .with("first_name", "  Ja\u{0007}ne \n")
            .with("allergies", "   ");
        let doc = FormNormalizer::new()
            .normalize(FormKind::Standard, &fields)
            .unwrap();
        assert_eq!(doc.pointer("personal_information.first_name"), Some(&json!("Jane")));
        assert_eq!(doc.pointer("medical_information.allergies"), Some(&Value::Null));
    }

    #[test]
    fn blank_required_field_counts_as_missing() {
        let fields = without(&standard_fields(), "reason_for_visit").with("reason_for_visit", "  ");
        let err = FormNormalizer::new()
            .normalize(FormKind::Standard, &fields)
            .unwrap_err();
        assert_eq!(err, ValidationError::required("visit_information.reason_for_visit"));
    }

    #[test]
    fn unknown_inputs_are_ignored() {
        let fields = standard_fields().with("csrf_token", "abc").with("debug", "1");
        let doc = FormNormalizer::new()
            .normalize(FormKind::Standard, &fields)
            .unwrap();
        assert!(doc.get("csrf_token").is_none());
        assert_eq!(doc.keys().count(), 7);
    }
}
