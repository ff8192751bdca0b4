use std::fmt::{self, Display};

use chrono::NaiveDate;
use serde::Serialize;

use crate::types::{
    BatchResult, Commodity, EntityResult, EntityStatus, ExtractionRecord, TargetEntity,
};

/// Date format the portal uses in its tables.
pub const PORTAL_DATE_FORMAT: &str = "%d-%m-%Y";

pub fn portal_date(date: NaiveDate) -> String {
    date.format(PORTAL_DATE_FORMAT).to_string()
}

pub fn parse_portal_date(text: &str) -> Option<NaiveDate> {
    NaiveDate::parse_from_str(text.trim(), PORTAL_DATE_FORMAT).ok()
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ReportRow<'a> {
    pub entity: &'a TargetEntity,
    pub record: &'a ExtractionRecord,
}

/// Entities whose latest `commodity` record is dated `date`, in batch order.
/// The date is compared as text, exactly as the portal rendered it.
pub fn rows_for_date<'a>(
    batch: &'a BatchResult,
    commodity: Commodity,
    date: &str,
) -> Vec<ReportRow<'a>> {
    batch
        .iter()
        .filter_map(|result| {
            let record = result.record(commodity)?;
            if record.date == date {
                Some(ReportRow {
                    entity: &result.entity,
                    record,
                })
            } else {
                log::debug!(
                    "Skipping {} - {} data is dated {}, not {}",
                    result.entity,
                    commodity,
                    record.date,
                    date
                );
                None
            }
        })
        .collect()
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct BatchSummary {
    pub total: usize,
    pub with_data: usize,
    pub without_data: usize,
    pub failed: usize,
    pub not_attempted: usize,
}

impl BatchSummary {
    pub fn from_batch(batch: &BatchResult) -> BatchSummary {
        batch.iter().fold(BatchSummary::default(), |mut summary, result| {
            summary.total += 1;
            summary.tally(result);
            summary
        })
    }

    /// Every entity was attempted; false once a run was cancelled part way.
    pub fn is_complete(&self) -> bool {
        self.not_attempted == 0
    }

    fn tally(&mut self, result: &EntityResult) {
        match result.status {
            EntityStatus::Extracted if result.has_data() => self.with_data += 1,
            EntityStatus::Extracted => self.without_data += 1,
            EntityStatus::TokenUnavailable | EntityStatus::RequestFailed { .. } => self.failed += 1,
            EntityStatus::NotAttempted => self.not_attempted += 1,
        }
    }
}

impl Display for BatchSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "\nSummary:")?;
        writeln!(f, "  Entities:          {}", self.total)?;
        writeln!(f, "  With data:         {}", self.with_data)?;
        writeln!(f, "  Without data:      {}", self.without_data)?;
        writeln!(f, "  Failed:            {}", self.failed)?;
        writeln!(f, "  Not attempted:     {}", self.not_attempted)
    }
}
