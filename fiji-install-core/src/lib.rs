pub mod error;
pub mod models;

pub use error::{FijiInstallError, Result};
pub use models::*;
