pub mod token;

pub use token::{extract_bearer_from_headers, AccessPolicy, Rejection};
