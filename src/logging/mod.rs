use env_logger::{Builder, Env};
use log::{debug, info, warn, LevelFilter};

use crate::{core::ResilienceObserver, resilience::ResilienceEvent};

/// Initialize `env_logger` at `level`, letting `RUST_LOG` override it.
///
/// Safe to call more than once; later calls are ignored.
pub fn init_logger(level: LevelFilter) {
    let _ = Builder::from_env(Env::default())
        .filter(None, level)
        .parse_default_env()
        .try_init();
}

/// Default observer, reports resilience events through `log`
#[derive(Debug, Default)]
pub struct LogObserver;

impl ResilienceObserver for LogObserver {
    fn on_event(&self, event: &ResilienceEvent) {
        match event {
            ResilienceEvent::RetryScheduled {
                request_id,
                attempt,
                delay,
                kind,
            } => {
                debug!(
                    "request {}: attempt {} failed ({}), retrying in {}ms",
                    request_id.as_deref().unwrap_or("-"),
                    attempt,
                    kind,
                    delay.as_millis()
                );
            }
            ResilienceEvent::CircuitTransition(transition) => {
                info!(
                    "circuit breaker {:?} -> {:?}",
                    transition.from, transition.to
                );
            }
            ResilienceEvent::CircuitRejected {
                request_id,
                retry_in,
            } => {
                warn!(
                    "request {}: circuit open, next probe in {}ms",
                    request_id.as_deref().unwrap_or("-"),
                    retry_in.as_millis()
                );
            }
            ResilienceEvent::Exhausted {
                request_id,
                attempts,
                kind,
            } => {
                warn!(
                    "request {}: giving up after {} attempt(s), last error {}",
                    request_id.as_deref().unwrap_or("-"),
                    attempts,
                    kind
                );
            }
        }
    }
}
