pub mod check_manager;

pub use check_manager::{CheckManager, SharedCheckManager};
