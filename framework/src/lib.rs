//! Back-office automation for the STEMulate program.
//!
//! - [`pipeline`] copies the `applications` collection from Supabase into a Google Sheets
//!   worksheet, resolving each applicant's user id to an email address on the way.
//! - [`mail`] renders templated HTML campaigns and sends them through an SMTP relay.

// Lets `#[derive(ErrorKind)]` refer to `::backoffice::ErrorKind` from inside this crate.
extern crate self as backoffice;

pub use backoffice_macros::ErrorKind;

pub mod config;
pub mod error;
pub mod mail;
pub mod pipeline;
pub mod sheets;
pub mod supabase;

pub use config::EnvConfig;
pub use error::ErrorKind;
