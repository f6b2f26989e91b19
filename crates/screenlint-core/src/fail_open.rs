//! Fail-open helpers for best-effort work
//!
//! Cleanup after a job (uninstalling the app under test), remote device connection and
//! proof-image rendering must never change a job's outcome. These helpers log the
//! failure and hand back `None`.
//!
//! Phase work (boot, install, exploration, analysis) is never run through them.

use std::future::Future;
use std::time::Duration;
use tracing::warn;

use crate::poll::Sleeper;
use crate::Result;

/// Run `f`, logging and swallowing its error
///
/// ```no_run
/// use screenlint_core::fail_open::fail_open;
/// use screenlint_core::Result;
///
/// async fn uninstall() -> Result<()> {
///     Ok(())
/// }
///
/// async fn example() {
///     let done = fail_open("cleanup", || uninstall()).await;
///     // None when uninstall() failed
/// }
/// ```
pub async fn fail_open<F, Fut, T>(operation_name: &str, f: F) -> Option<T>
where
    F: FnOnce() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    match f().await {
        Ok(val) => Some(val),
        Err(e) => {
            warn!("{} failed (fail-open): {}", operation_name, e);
            None
        }
    }
}

/// Like [`fail_open`] but retried up to `max_retries` times
///
/// Waits `backoff * attempt` on the given sleeper between attempts.
pub async fn fail_open_with_retries<F, Fut, T>(
    operation_name: &str,
    mut f: F,
    max_retries: usize,
    backoff: Duration,
    sleeper: &dyn Sleeper,
) -> Option<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    for attempt in 1..=max_retries {
        match f().await {
            Ok(val) => return Some(val),
            Err(e) => {
                if attempt == max_retries {
                    warn!(
                        "{} failed after {} retries (fail-open): {}",
                        operation_name, max_retries, e
                    );
                    return None;
                }
                warn!(
                    "{} failed (attempt {}/{}): {}",
                    operation_name, attempt, max_retries, e
                );
                sleeper.sleep(backoff * attempt as u32).await;
            }
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::poll::RecordingSleeper;
    use crate::ScreenlintError;

    #[tokio::test]
    async fn test_fail_open_success() {
        let result = fail_open("cleanup", || async { Ok::<_, ScreenlintError>(7) }).await;
        assert_eq!(result, Some(7));
    }

    #[tokio::test]
    async fn test_fail_open_swallows_error() {
        let result = fail_open("cleanup", || async {
            Err::<(), _>(ScreenlintError::Other("device gone".to_string()))
        })
        .await;
        assert_eq!(result, None);
    }

    #[tokio::test]
    async fn test_retries_until_success() {
        let sleeper = RecordingSleeper::new();
        let mut attempts = 0;
        let result = fail_open_with_retries(
            "adb connect",
            || {
                attempts += 1;
                let current = attempts;
                async move {
                    if current < 3 {
                        Err(ScreenlintError::Other("refused".to_string()))
                    } else {
                        Ok("connected")
                    }
                }
            },
            5,
            Duration::from_secs(1),
            &sleeper,
        )
        .await;

        assert_eq!(result, Some("connected"));
        assert_eq!(attempts, 3);
        assert_eq!(
            sleeper.sleeps(),
            vec![Duration::from_secs(1), Duration::from_secs(2)]
        );
    }

    #[tokio::test]
    async fn test_retries_exhausted() {
        let sleeper = RecordingSleeper::new();
        let mut attempts = 0;
        let result = fail_open_with_retries(
            "adb connect",
            || {
                attempts += 1;
                async move { Err::<(), _>(ScreenlintError::Other("refused".to_string())) }
            },
            3,
            Duration::from_millis(100),
            &sleeper,
        )
        .await;

        assert_eq!(result, None);
        assert_eq!(attempts, 3);
        assert_eq!(sleeper.sleeps().len(), 2);
    }
}
