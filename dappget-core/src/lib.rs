pub mod aggregate;
pub mod catalog;
pub mod config;
pub mod console;
pub mod diff;
pub mod error;
pub mod fetch;
pub mod operations;
pub mod progress;
pub mod registry;
pub mod resolve;
pub mod sanitize;
pub mod version;

pub use catalog::{DependencyMap, PackageEntry, VersionCatalog};
pub use config::DappGetConfig;
pub use error::DappGetError;
pub use operations::DappGet;
pub use resolve::{Request, Resolution, StateDiff};
pub use version::VersionSpec;

pub type Result<T> = std::result::Result<T, DappGetError>;
