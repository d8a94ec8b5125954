use std::fmt;
use std::time::Duration;

use serde::{Serialize, Serializer};

use crate::store::ResultRecord;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BatchStats {
    #[serde(rename = "total_requests")]
    pub total: usize,
    #[serde(rename = "successful_requests")]
    pub succeeded: usize,
    #[serde(rename = "failed_requests")]
    pub failed: usize,
    #[serde(rename = "failed_request_ids")]
    pub failed_ids: Vec<usize>,
    #[serde(rename = "elapsed_time", serialize_with = "as_secs_f64")]
    pub elapsed: Duration,
    /// Successful requests per second of wall time; 0 when nothing ran.
    pub throughput: f64,
}

impl BatchStats {
    pub fn compute(records: &[ResultRecord], elapsed: Duration) -> Self {
        let failed_ids: Vec<usize> = records.iter().filter(|r| !r.is_success()).map(|r| r.id).collect();
        let total = records.len();
        let failed = failed_ids.len();
        let succeeded = total - failed;
        let secs = elapsed.as_secs_f64();
        let throughput = if total == 0 || secs <= 0.0 { 0.0 } else { succeeded as f64 / secs };
        Self { total, succeeded, failed, failed_ids, elapsed, throughput }
    }
}

impl fmt::Display for BatchStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} requests: {} succeeded, {} failed in {:.2}s ({:.3} req/s)",
            self.total,
            self.succeeded,
            self.failed,
            self.elapsed.as_secs_f64(),
            self.throughput
        )
    }
}

fn as_secs_f64<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
    s.serialize_f64(d.as_secs_f64())
}
