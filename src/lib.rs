pub mod aggregator;
pub mod audit;
pub mod cache;
pub mod config;
pub mod detector;
pub mod error;
pub mod lockfile;
pub mod model;
pub mod scanner;
pub mod server;
pub mod source;

pub use cache::SourceCache;
pub use config::Config;
pub use detector::Detector;
pub use error::{Error, Result};
pub use model::{Dependency, LockfileFormat, ScanResult};
pub use scanner::{ScanOptions, Scanner};
pub use source::IocSource;
