use tracing::debug;

use crate::db::{DbError, ReadingDetail, ReadingRepository};

/// Read-only query surface consumed by the browsing interface.
#[derive(Clone)]
pub struct ReadingService {
    readings: ReadingRepository,
}

impl ReadingService {
    pub fn new(readings: ReadingRepository) -> Self {
        Self { readings }
    }

    /// All readings recorded under one MPAN, newest first.
    pub async fn readings_for_mpan(&self, mpan: &str) -> Result<Vec<ReadingDetail>, DbError> {
        let mpan = mpan.trim();
        debug!("Searching readings for MPAN {}", mpan);
        self.readings.find_by_mpan(mpan).await
    }

    /// All readings taken by one meter, newest first.
    pub async fn readings_for_serial(
        &self,
        serial_number: &str,
    ) -> Result<Vec<ReadingDetail>, DbError> {
        let serial_number = serial_number.trim();
        debug!("Searching readings for serial {}", serial_number);
        self.readings.find_by_serial(serial_number).await
    }
}
