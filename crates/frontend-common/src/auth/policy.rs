//! Refresh failure policy
//!
//! Every place that reacts to a failed token refresh asks here whether the
//! session should end, so the behaviour can change in one spot.

use ubm_core::RefreshFailurePolicy;
use ubm_http::ClientError;

/// Whether `error`, raised while refreshing, ends the session
pub fn refresh_failure_ends_session(policy: RefreshFailurePolicy, error: &ClientError) -> bool {
    policy.ends_session(error.is_transient())
}
