//! Declarative schemas of the two intake forms.
//!
//! Each schema is a tree of sections. Leaves name the key in the normalized
//! document, the submitted input names they are read from, the value kind and
//! whether the field is required. Sections marked [`Node::Checked`] are
//! validated like any other but never appear in the normalized document.

use crate::form::FormKind;

/// How a submitted value is checked and converted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldKind {
    /// Free text, at most `max_len` characters.
    Text { max_len: usize },
    /// Telephone number; free text as entered.
    Phone,
    Email { max_len: usize },
    /// ISO calendar date `YYYY-MM-DD`.
    Date,
    Integer { min: i64, max: i64 },
    /// Non-negative decimal number.
    Decimal,
    /// One value out of `options`.
    Choice { options: &'static [&'static str] },
    /// Checkbox that must be ticked when required.
    Consent,
}

/// One node of a schema tree.
#[derive(Debug, Clone, Copy)]
pub enum Node {
    Field {
        key: &'static str,
        sources: &'static [&'static str],
        kind: FieldKind,
        required: bool,
    },
    /// Any number of values out of `options`, collected from repeated inputs
    /// in submission order.
    List {
        key: &'static str,
        sources: &'static [&'static str],
        options: &'static [&'static str],
        required: bool,
    },
    Group {
        key: &'static str,
        children: &'static [Node],
    },
    /// Validated but not forwarded.
    Checked {
        key: &'static str,
        children: &'static [Node],
    },
}

impl Node {
    pub fn key(&self) -> &'static str {
        match self {
            Self::Field { key, .. }
            | Self::List { key, .. }
            | Self::Group { key, .. }
            | Self::Checked { key, .. } => key,
        }
    }

    /// Whether the node shows up in the normalized document.
    pub fn is_forwarded(&self) -> bool {
        !matches!(self, Self::Checked { .. })
    }
}

/// Schema of one form variant.
#[derive(Debug)]
pub struct FormSchema {
    pub kind: FormKind,
    pub nodes: &'static [Node],
}

impl FormSchema {
    pub fn for_kind(kind: FormKind) -> &'static FormSchema {
        match kind {
            FormKind::Standard => &STANDARD,
            FormKind::Pediatric => &PEDIATRIC,
        }
    }

    /// Top-level keys of the normalized document.
    pub fn top_level_keys(&self) -> impl Iterator<Item = &'static str> {
        self.nodes
            .iter()
            .filter(|node| node.is_forwarded())
            .map(Node::key)
    }
}

pub const US_STATES: &[&str] = &[
    "AL", "AK", "AZ", "AR", "CA", "CO", "CT", "DE", "FL", "GA", "HI", "ID", "IL", "IN", "IA",
    "KS", "KY", "LA", "ME", "MD", "MA", "MI", "MN", "MS", "MO", "MT", "NE", "NV", "NH", "NJ",
    "NM", "NY", "NC", "ND", "OH", "OK", "OR", "PA", "RI", "SC", "SD", "TN", "TX", "UT", "VT",
    "VA", "WA", "WV", "WI", "WY",
];

pub const SEX: &[&str] = &["male", "female"];
pub const GENDER: &[&str] = &["male", "female", "other"];
pub const DELIVERY_TYPES: &[&str] = &["vaginal", "csection"];
pub const BIRTH_TIMINGS: &[&str] = &["full_term", "early", "late"];
pub const YES_NO: &[&str] = &["yes", "no"];
pub const YES_NO_UNKNOWN: &[&str] = &["yes", "no", "unknown"];

pub const CHILD_CONDITIONS: &[&str] = &[
    "ulcers",
    "vaccines_behind",
    "stomach_liver_problems",
    "febrile_seizure",
    "asthma_pneumonia",
    "urine_kidney_problems",
    "heart_problems",
    "thyroid_problems",
    "psychiatric_problems",
];

pub const FAMILY_CONDITIONS: &[&str] = &[
    "diabetes",
    "asthma",
    "stomach_liver_problems",
    "teenage_sudden_death",
    "early_heart_disease",
    "seizure",
    "hearing_loss",
    "blindness",
    "tb",
    "tumors_cancer",
];

const REQUIRED: bool = true;
const OPTIONAL: bool = false;

macro_rules! field {
    ($key:literal <- [$($src:literal),+], $kind:expr, $required:expr) => {
        Node::Field {
            key: $key,
            sources: &[$($src),+],
            kind: $kind,
            required: $required,
        }
    };
    ($key:literal, $kind:expr, $required:expr) => {
        field!($key <- [$key], $kind, $required)
    };
}

const fn text(max_len: usize) -> FieldKind {
    FieldKind::Text { max_len }
}

static STANDARD: FormSchema = FormSchema {
    kind: FormKind::Standard,
    nodes: &[
        Node::Group {
            key: "personal_information",
            children: &[
                field!("first_name", text(50), REQUIRED),
                field!("last_name", text(50), REQUIRED),
                field!("date_of_birth", FieldKind::Date, REQUIRED),
            ],
        },
        Node::Group {
            key: "contact_information",
            children: &[
                field!("phone", FieldKind::Phone, REQUIRED),
                field!("email", FieldKind::Email { max_len: 100 }, OPTIONAL),
            ],
        },
        Node::Group {
            key: "address",
            children: &[
                field!("street_address", text(100), REQUIRED),
                field!("city", text(50), REQUIRED),
                field!("state", FieldKind::Choice { options: US_STATES }, REQUIRED),
                field!("zip_code", text(10), REQUIRED),
            ],
        },
        Node::Group {
            key: "emergency_contact",
            children: &[
                field!("name" <- ["emergency_contact_name"], text(100), REQUIRED),
                field!("phone" <- ["emergency_contact_phone"], FieldKind::Phone, REQUIRED),
                field!("relationship" <- ["emergency_contact_relationship"], text(50), REQUIRED),
            ],
        },
        Node::Group {
            key: "insurance_information",
            children: &[
                field!("insurance_provider", text(100), OPTIONAL),
                field!("insurance_id", text(50), OPTIONAL),
                field!("primary_physician", text(100), OPTIONAL),
            ],
        },
        Node::Group {
            key: "medical_information",
            children: &[
                field!("current_medications", text(1000), OPTIONAL),
                field!("allergies", text(500), OPTIONAL),
                field!("medical_history", text(1000), OPTIONAL),
            ],
        },
        Node::Group {
            key: "visit_information",
            children: &[field!("reason_for_visit", text(500), REQUIRED)],
        },
    ],
};

static PEDIATRIC: FormSchema = FormSchema {
    kind: FormKind::Pediatric,
    nodes: &[
        Node::Group {
            key: "patient_history",
            children: &[
                field!("name" <- ["patient_name"], text(100), REQUIRED),
                field!("age" <- ["patient_age"], FieldKind::Integer { min: 0, max: 18 }, REQUIRED),
                field!("sex" <- ["patient_sex"], FieldKind::Choice { options: SEX }, REQUIRED),
                field!("dob" <- ["patient_dob"], FieldKind::Date, REQUIRED),
                field!("last_name" <- ["patient_last_name"], text(50), REQUIRED),
                field!("first_name" <- ["patient_first_name"], text(50), REQUIRED),
                field!("dob_page2" <- ["patient_dob_page2"], FieldKind::Date, REQUIRED),
                field!(
                    "age_page2" <- ["patient_age_page2"],
                    FieldKind::Integer { min: 0, max: 18 },
                    REQUIRED
                ),
                field!("gender" <- ["patient_gender"], FieldKind::Choice { options: GENDER }, REQUIRED),
            ],
        },
        Node::Group {
            key: "birth_history",
            children: &[
                field!("delivery_type", FieldKind::Choice { options: DELIVERY_TYPES }, REQUIRED),
                field!("birth_timing", FieldKind::Choice { options: BIRTH_TIMINGS }, REQUIRED),
                field!("birth_weeks", FieldKind::Integer { min: 20, max: 45 }, OPTIONAL),
                field!("birth_weight", FieldKind::Decimal, OPTIONAL),
                field!(
                    "hearing_test" <- ["hearing_test_passed"],
                    FieldKind::Choice { options: YES_NO_UNKNOWN },
                    REQUIRED
                ),
                field!("hep_b_vaccine", FieldKind::Choice { options: YES_NO_UNKNOWN }, REQUIRED),
                field!("complications" <- ["pregnancy_complications"], text(1000), OPTIONAL),
            ],
        },
        Node::Group {
            key: "medical_history",
            children: &[
                Node::List {
                    key: "child_conditions",
                    sources: &["child_medical_history", "child_conditions[]", "child_conditions"],
                    options: CHILD_CONDITIONS,
                    required: OPTIONAL,
                },
                Node::List {
                    key: "family_conditions",
                    sources: &["family_medical_history", "family_conditions[]", "family_conditions"],
                    options: FAMILY_CONDITIONS,
                    required: OPTIONAL,
                },
            ],
        },
        Node::Group {
            key: "social_history",
            children: &[
                field!("household_members", FieldKind::Integer { min: 1, max: 20 }, REQUIRED),
                field!("pets" <- ["any_pets"], FieldKind::Choice { options: YES_NO }, REQUIRED),
                field!("smoking" <- ["anyone_smokes"], FieldKind::Choice { options: YES_NO }, REQUIRED),
                field!("lead_exposure", FieldKind::Choice { options: YES_NO_UNKNOWN }, REQUIRED),
                field!("voice_message_consent", FieldKind::Choice { options: YES_NO }, REQUIRED),
            ],
        },
        Node::Group {
            key: "parent_guardian_info",
            children: &[
                Node::Group {
                    key: "mother",
                    children: &[
                        field!("name" <- ["mother_name"], text(100), OPTIONAL),
                        field!("phone" <- ["mother_phone"], FieldKind::Phone, OPTIONAL),
                        field!("address" <- ["mother_address"], text(100), OPTIONAL),
                        field!("cell" <- ["mother_cell"], FieldKind::Phone, OPTIONAL),
                    ],
                },
                Node::Group {
                    key: "father",
                    children: &[
                        field!("name" <- ["father_name"], text(100), OPTIONAL),
                        field!("phone" <- ["father_phone"], FieldKind::Phone, OPTIONAL),
                        field!("address" <- ["father_address"], text(100), OPTIONAL),
                        field!("cell" <- ["father_cell"], FieldKind::Phone, OPTIONAL),
                    ],
                },
                Node::Checked {
                    key: "guardian",
                    children: &[
                        field!("name" <- ["guardian_signature_name"], text(100), REQUIRED),
                        field!("relationship" <- ["guardian_relationship"], text(50), REQUIRED),
                        field!("signature_date", FieldKind::Date, REQUIRED),
                    ],
                },
                Node::Checked {
                    key: "emergency_contact",
                    children: &[
                        field!("name" <- ["emergency_contact_name"], text(100), REQUIRED),
                        field!("phone" <- ["emergency_contact_phone"], FieldKind::Phone, REQUIRED),
                    ],
                },
            ],
        },
        Node::Group {
            key: "insurance",
            children: &[
                field!("name" <- ["insurance_name"], text(100), OPTIONAL),
                field!("id" <- ["insurance_id"], text(50), OPTIONAL),
                field!("group" <- ["insurance_group"], text(50), OPTIONAL),
                field!("pharmacy_name", text(100), OPTIONAL),
                field!("pharmacy_phone", FieldKind::Phone, OPTIONAL),
            ],
        },
        Node::Group {
            key: "consent",
            children: &[
                field!("treatment_consent", FieldKind::Consent, REQUIRED),
                field!("parent_guardian_name" <- ["parent_guardian_name_final"], text(100), REQUIRED),
                field!("signature_date" <- ["final_signature_date"], FieldKind::Date, REQUIRED),
            ],
        },
        field!("siblings_info", text(500), OPTIONAL),
        Node::Group {
            key: "address",
            children: &[
                field!("address" <- ["patient_address"], text(100), REQUIRED),
                field!("city" <- ["patient_city"], text(50), REQUIRED),
                field!("state" <- ["patient_state"], FieldKind::Choice { options: US_STATES }, REQUIRED),
                field!("zip" <- ["patient_zip"], text(10), REQUIRED),
            ],
        },
    ],
};
