use tracing::{debug, warn};

use crate::error::{EngineError, EngineResult};

/// Number of provider requests a plan needs.
pub fn planned_request_count(rule_batches: usize, file_batches: usize) -> u64 {
    let files = file_batches as u64;
    if rule_batches == 0 {
        files
    } else {
        (rule_batches as u64).saturating_mul(files)
    }
}

/// Reject a plan that needs more requests than `quota` allows.
///
/// Returns the planned request count when the plan fits.
pub fn check_request_quota(
    quota: Option<u64>,
    rule_batches: usize,
    file_batches: usize,
) -> EngineResult<u64> {
    let planned = planned_request_count(rule_batches, file_batches);

    let Some(quota) = quota else {
        debug!(planned, "No request quota configured");
        return Ok(planned);
    };

    if planned > quota {
        warn!(planned, quota, rule_batches, file_batches, "Request quota exceeded");
        return Err(EngineError::RequestQuotaExceeded { planned, quota });
    }

    debug!(planned, quota, "Request quota respected");
    Ok(planned)
}
