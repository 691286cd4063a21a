pub mod url_validation;
pub use url_validation::{UrlValidationError, validate_engine_url, validate_origin};
