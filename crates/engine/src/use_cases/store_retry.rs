//! Retrying store writes that lost a race for a unique slot.

use std::future::Future;

use crate::infrastructure::ports::RepoError;

/// Extra attempts after a constraint violation. Each attempt recomputes the
/// slot inside a fresh transaction.
pub const CONSTRAINT_RETRIES: u32 = 3;

/// Run `attempt` again while it fails on a constraint violation, up to
/// [`CONSTRAINT_RETRIES`] extra times. Any other result is returned as is.
pub async fn with_constraint_retry<T, F, Fut>(
    operation: &'static str,
    attempt: F,
) -> Result<T, RepoError>
where
    F: Fn() -> Fut,
    Fut: Future<Output = Result<T, RepoError>>,
{
    let mut retries = 0;
    loop {
        match attempt().await {
            Err(e) if e.is_constraint_violation() && retries < CONSTRAINT_RETRIES => {
                retries += 1;
                tracing::warn!(operation, retries, error = %e, "Constraint violation, retrying");
            }
            other => return other,
        }
    }
}
