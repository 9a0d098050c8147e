use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use conductor_errors::{classify, Classification, OrchestratorError};
use conductor_types::{Event, EventKind, EventPayload, EventSink, RunId};
use tracing::debug;

use crate::abort::AbortSignal;
use crate::schedule::{compute_delay, RetrySchedule};

/// Per-call context: identifies the run and provider for the paired
/// `ProviderRequestStarted`/`Finished` events, carries the event sink, the
/// run-scoped abort signal, and the per-attempt wall-clock timeout.
pub struct RetryContext {
    pub run_id: RunId,
    pub provider: String,
    pub model: Option<String>,
    pub sink: Arc<dyn EventSink>,
    pub abort: AbortSignal,
    pub per_call_timeout: Duration,
}

#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub enum CancelledBy {
    Abort,
}

/// Wraps a provider call with retry, backoff, and a per-call timeout. `call`
/// is invoked once per attempt (0-indexed); its failures are classified
/// with [`conductor_errors::classify`] to decide whether to retry.
pub async fn call_with_retry<F, Fut, T>(
    ctx: &RetryContext,
    schedule: &RetrySchedule,
    mut call: F,
) -> Result<T, OrchestratorError>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<T, OrchestratorError>>,
{
    let start = std::time::Instant::now();
    ctx.sink.emit(Event::new(
        ctx.run_id.clone(),
        EventKind::ProviderRequestStarted,
        EventPayload::ProviderRequestStarted {
            provider: ctx.provider.clone(),
            model: ctx.model.clone(),
        },
        now(),
    ));

    let mut rng = rand::thread_rng();

    for attempt in 0..=schedule.max_retries {
        if ctx.abort.is_triggered() {
            let error = OrchestratorError::config("run aborted");
            finish(ctx, start, attempt, Err(&error));
            return Err(error);
        }

        let outcome = tokio::select! {
            _ = ctx.abort.cancelled() => {
                Err(OrchestratorError::config("run aborted"))
            }
            result = tokio::time::timeout(ctx.per_call_timeout, call(attempt)) => {
                match result {
                    Ok(inner) => inner,
                    Err(_elapsed) => Err(OrchestratorError::timeout(ctx.per_call_timeout)),
                }
            }
        };

        match outcome {
            Ok(value) => {
                finish(ctx, start, attempt, Ok(()));
                return Ok(value);
            }
            Err(error) => {
                let is_last_attempt = attempt == schedule.max_retries;
                let retriable = classify(&error) == Classification::Retriable;
                if is_last_attempt || !retriable {
                    finish(ctx, start, attempt, Err(&error));
                    return Err(error);
                }
                let delay = compute_delay(schedule, attempt + 1, &mut rng);
                debug!(
                    provider = %ctx.provider,
                    attempt,
                    delay_ms = delay.as_millis(),
                    %error,
                    "retrying provider call"
                );
                tokio::time::sleep(delay).await;
            }
        }
    }

    unreachable!("loop always returns on its last iteration")
}

fn finish(ctx: &RetryContext, start: std::time::Instant, retries: u32, result: Result<(), &OrchestratorError>) {
    let duration_ms = start.elapsed().as_millis() as u64;
    ctx.sink.emit(Event::new(
        ctx.run_id.clone(),
        EventKind::ProviderRequestFinished,
        EventPayload::ProviderRequestFinished {
            provider: ctx.provider.clone(),
            duration_ms,
            success: result.is_ok(),
            retries,
            error: result.err().map(|e| e.to_string()),
        },
        now(),
    ));
}

fn now() -> chrono::DateTime<chrono::Utc> {
    chrono::Utc::now()
}
