//! The `utils` module provides definitions shared across the `perspectivecast`
//! application: the error taxonomy and logging initialisation.

pub mod error;
pub mod logging;

pub use error::{RelayError, StoreError};
