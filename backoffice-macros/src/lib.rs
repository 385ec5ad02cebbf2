extern crate proc_macro;

use proc_macro::TokenStream;
use syn::{parse_macro_input, DeriveInput};

mod error_kind;

/// Derive macro for mapping error variants to a `backoffice::ErrorKind` and an operator summary
///
/// Derive `ErrorKind` by adding `#[error_kind(...)]` to each variant
///
/// `error_kind` accepts one or two arguments
/// - kind (required)
/// - summary message (optional)
///
/// ### Kind
///
/// The name of a `backoffice::ErrorKind` variant (e.g. `Config`, `Fetch`, `Write`).
///
/// The kind is returned by calling `kind()`, which lets callers tell fatal errors from
/// recoverable ones with `kind().is_fatal()`.
///
/// ### Summary Message
///
/// The summary is a string literal which supports basic interpolation.
/// - Tuple variants can interpolate indices: `"first arg {0}, second arg {1}"`
/// - Struct variants can interpolate by field names: `field = {field}`
///
/// When omitted, `summary()` falls back to the `Display` implementation, so the usual
/// `thiserror` message is reused and a summary is only needed when the operator-facing
/// line should be shorter than the logged error.
///
/// ### Example
///
/// ```rust,ignore
/// #[derive(Debug, thiserror::Error, backoffice::ErrorKind)]
/// enum Error {
///     #[error("missing required environment variables: {}", .0.join(", "))]
///     #[error_kind(Config)]
///     Missing(Vec<String>),
///
///     #[error("sheets request failed: {0}")]
///     #[error_kind(Write, "could not update the destination sheet")]
///     Http(#[from] reqwest::Error),
///
///     #[error("duplicate key {key} at record {index}")]
///     #[error_kind(Transform, "record {index} repeats key {key}")]
///     Duplicate { key: String, index: usize },
/// }
///
/// fn report(err: &Error) {
///     if err.kind().is_fatal() {
///         tracing::error!(kind = %err.kind(), "{}", err.summary());
///     }
/// }
/// ```
#[proc_macro_derive(ErrorKind, attributes(error_kind))]
pub fn error_kind_derive(input: TokenStream) -> TokenStream {
    let input = parse_macro_input!(input as DeriveInput);
    error_kind::error_kind_derive_impl(input)
}
