pub mod cache;
pub mod catalog;
pub mod config;
pub mod error;
pub mod identity;
pub mod manifest;
pub mod source;
pub mod types;

pub use cache::{Clock, ManualClock, ScanCache, SystemClock};
pub use catalog::CatalogSource;
pub use config::Config;
pub use error::{ErrorBody, ErrorKind, RepoError};
pub use identity::{IdentityStore, IdentitySummary};
pub use source::{resolve, RepoSource, SourceError};
pub use types::*;
