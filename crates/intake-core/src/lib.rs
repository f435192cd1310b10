//! Core of the patient intake service: signed form links, form
//! normalization, integrity hashing and the submission pipeline.
//!
//! Transport concerns (HTTP, webhook delivery, SMS) live in the
//! `intake-server` and `intake-notifications` crates.

pub mod dispatch;
pub mod envelope;
pub mod error;
pub mod fields;
pub mod form;
pub mod integrity;
pub mod link;
pub mod normalize;
pub mod pipeline;
pub mod schema;
pub mod token;

pub use dispatch::{DispatchResult, EnvelopeSink};
pub use envelope::{SubmissionEnvelope, SubmissionMetadata};
pub use error::{
    DispatchError, LINK_INVALID_MESSAGE, LinkError, SubmissionError, TokenError, ValidationError,
};
pub use fields::FormFields;
pub use form::{FormKind, UnknownFormKind};
pub use integrity::IntegrityHasher;
pub use link::{IssuedLink, LinkIssuer};
pub use normalize::{FormNormalizer, NormalizedSubmission};
pub use pipeline::{SubmissionPipeline, SubmissionReceipt, SubmissionStage};
pub use schema::FormSchema;
pub use token::{
    AccessToken, DEFAULT_TOKEN_TTL, InvalidSecret, MAX_IDENTIFIER_LEN, TokenClaims, TokenCodec,
    generate_secret,
};
