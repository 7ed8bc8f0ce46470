pub mod error;
pub mod flow_file_repository;
pub mod meter_point_repository;
pub mod meter_repository;
pub mod models;
pub mod pool;
pub mod reading_repository;

pub use error::DbError;
pub use flow_file_repository::FlowFileRepository;
pub use meter_point_repository::MeterPointRepository;
pub use meter_repository::MeterRepository;
pub use models::*;
pub use reading_repository::{ReadingRepository, UpsertOutcome};
