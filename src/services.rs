pub mod import_service;
pub mod reading_service;

pub use import_service::{ImportError, ImportReport, ImportService};
pub use reading_service::ReadingService;
