pub mod app;
pub mod catalog;
pub mod check;

pub use app::AppConfig;
pub use catalog::{DocumentType, ValidityPeriod};
pub use check::CheckConfiguration;
