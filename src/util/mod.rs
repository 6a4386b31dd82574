//! Utility functions shared by the storage and request layers.

mod url_validator;

pub use url_validator::{validate_url, UrlValidationError};
