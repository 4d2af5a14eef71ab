pub mod config;
pub mod models;
pub mod image;
pub mod scan;
pub mod web;
pub mod utils;

// 重新导出主要类型
pub use config::Config;
pub use scan::{ScanResult, TumorClass};
pub use utils::error::ScanError;

pub type Result<T> = std::result::Result<T, ScanError>;
