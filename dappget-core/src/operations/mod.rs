pub mod update;

pub use update::DappGet;
