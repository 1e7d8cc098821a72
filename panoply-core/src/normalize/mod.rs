//! Error normalization for plugin entry points.
//!
//! Configuration and collection steps run through [`wrap_errors`] (or
//! [`wrap_errors_async`]); any error they return leaves as a
//! [`NormalizedError`] with a code from [`ERROR_CODES`], resolved through
//! the process-wide registry filled by [`register_error_code`].

mod registry;
mod types;
mod wrapper;

pub use registry::{register_error_code, registered_code};

pub use types::{
    code_description, is_known_code, NormalizedError, Phase, ERROR_CODES, NORMALIZATION_FAILURE,
    UNCLASSIFIED,
};

pub use wrapper::{normalize, wrap_errors, wrap_errors_async, SourceRef};
