//! Query parameters: detection, validation and binding.
//!
//! - [`extractor`] - Finds `:name` and `?` placeholders and infers their types
//! - [`validators`] - Pluggable per-parameter validators
//! - [`binder`] - Validates supplied values and coerces them into bind-ready values

pub mod binder;
pub mod extractor;
pub mod validators;

pub use binder::{parse_date, BoundParameter, BoundParameters, ParameterBinder, ValidationReport};
pub use extractor::{
    extract_parameters, mask_sql, reextract, scan_tokens, ParamToken, ParameterDescriptor,
    ParameterKind,
};
pub use validators::{
    MaxLengthValidator, ParameterValidator, PatternValidator, PredicateValidator, RangeValidator,
};
