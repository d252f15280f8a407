//! Retry policy and backoff state machine
//!
//! Only transport faults are retried. A received response, whatever its
//! status code, ends the loop.

use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, warn};

use super::exchange::{HttpExchange, TransportFault, WireRequest, WireResponse};
use crate::protocol::DriverError;

#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    /// Total attempts including the first one; 0 is treated as 1
    pub max_attempts: u32,
    pub initial_delay: Duration,
    pub multiplier: f64,
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_delay: Duration::from_millis(100),
            multiplier: 2.0,
            max_delay: Duration::from_secs(5),
        }
    }
}

impl RetryPolicy {
    pub fn new() -> Self {
        Self::default()
    }

    /// A single attempt, no retries.
    pub fn none() -> Self {
        Self {
            max_attempts: 1,
            ..Self::default()
        }
    }

    pub fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = max_attempts;
        self
    }

    pub fn with_initial_delay(mut self, delay: Duration) -> Self {
        self.initial_delay = delay;
        self
    }

    pub fn with_multiplier(mut self, multiplier: f64) -> Self {
        self.multiplier = multiplier;
        self
    }

    pub fn with_max_delay(mut self, delay: Duration) -> Self {
        self.max_delay = delay;
        self
    }

    pub fn backoff(&self) -> Backoff {
        Backoff {
            attempt: 0,
            max_attempts: self.max_attempts.max(1),
            next_delay: self.initial_delay,
            multiplier: self.multiplier.max(1.0),
            max_delay: self.max_delay,
        }
    }
}

/// Attempt counter plus delay computation.
#[derive(Debug, Clone)]
pub struct Backoff {
    attempt: u32,
    max_attempts: u32,
    next_delay: Duration,
    multiplier: f64,
    max_delay: Duration,
}

impl Backoff {
    /// Attempts started so far.
    pub fn attempts(&self) -> u32 {
        self.attempt
    }

    /// Record the start of an attempt. False once the budget is spent.
    pub fn start_attempt(&mut self) -> bool {
        if self.attempt >= self.max_attempts {
            return false;
        }
        self.attempt += 1;
        true
    }

    /// Delay before the next attempt, or `None` when no attempt remains.
    pub fn next_delay(&mut self) -> Option<Duration> {
        if self.attempt >= self.max_attempts {
            return None;
        }
        let delay = self.next_delay.min(self.max_delay);
        self.next_delay = Duration::try_from_secs_f64(self.next_delay.as_secs_f64() * self.multiplier)
            .unwrap_or(self.max_delay)
            .min(self.max_delay);
        Some(delay)
    }
}

/// Response plus the number of attempts it took.
#[derive(Debug, Clone)]
pub struct Exchanged {
    pub response: WireResponse,
    pub attempts: u32,
}

/// Executes requests through an `HttpExchange` with bounded retries.
#[derive(Clone)]
pub struct RetryingTransport {
    exchange: Arc<dyn HttpExchange>,
    policy: RetryPolicy,
}

impl RetryingTransport {
    pub fn new(exchange: Arc<dyn HttpExchange>, policy: RetryPolicy) -> Self {
        Self { exchange, policy }
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    /// Run the request, retrying transport faults with exponential backoff.
    ///
    /// Past `deadline` no new attempt starts and no sleep is begun; each
    /// attempt's timeout is also capped at the time remaining.
    pub async fn execute(
        &self,
        request: &WireRequest,
        deadline: Option<Instant>,
    ) -> Result<Exchanged, DriverError> {
        let mut backoff = self.policy.backoff();
        let mut last_fault: Option<TransportFault> = None;

        while backoff.start_attempt() {
            let attempt = backoff.attempts();
            let mut current = request.clone();
            if let Some(deadline) = deadline {
                let remaining = deadline.saturating_duration_since(Instant::now());
                if remaining.is_zero() {
                    return Err(DriverError::DeadlineExceeded {
                        attempts: attempt - 1,
                    });
                }
                current.timeout = current.timeout.min(remaining);
            }

            match self.exchange.exchange(&current).await {
                Ok(response) => {
                    debug!(
                        "POST {} -> HTTP {} (attempt {})",
                        request.url, response.status, attempt
                    );
                    return Ok(Exchanged {
                        response,
                        attempts: attempt,
                    });
                }
                Err(fault) if !fault.is_retryable() => {
                    warn!("POST {} failed without retry: {}", request.url, fault);
                    return Err(DriverError::Transport {
                        attempts: attempt,
                        message: fault.to_string(),
                    });
                }
                Err(fault) => {
                    let delay = backoff.next_delay();
                    warn!(
                        "POST {} attempt {}/{} failed: {}{}",
                        request.url,
                        attempt,
                        self.policy.max_attempts.max(1),
                        fault,
                        delay
                            .map(|d| format!(", retrying in {:?}", d))
                            .unwrap_or_default()
                    );
                    last_fault = Some(fault);

                    let Some(delay) = delay else { break };
                    if let Some(deadline) = deadline {
                        if Instant::now() + delay >= deadline {
                            return Err(DriverError::DeadlineExceeded { attempts: attempt });
                        }
                    }
                    tokio::time::sleep(delay).await;
                }
            }
        }

        Err(DriverError::Transport {
            attempts: backoff.attempts(),
            message: last_fault
                .map(|f| f.to_string())
                .unwrap_or_else(|| "no attempt made".to_string()),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_backoff_delays_grow_and_cap() {
        let policy = RetryPolicy::new()
            .with_max_attempts(5)
            .with_initial_delay(Duration::from_millis(100))
            .with_multiplier(2.0)
            .with_max_delay(Duration::from_millis(300));
        let mut backoff = policy.backoff();
        let mut delays = Vec::new();
        while backoff.start_attempt() {
            if let Some(d) = backoff.next_delay() {
                delays.push(d.as_millis());
            }
        }
        assert_eq!(delays, vec![100, 200, 300, 300]);
        assert_eq!(backoff.attempts(), 5);
    }

    #[test]
    fn test_zero_attempts_means_one() {
        let mut backoff = RetryPolicy::new().with_max_attempts(0).backoff();
        assert!(backoff.start_attempt());
        assert!(backoff.next_delay().is_none());
        assert!(!backoff.start_attempt());
    }
}
