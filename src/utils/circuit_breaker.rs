use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;

// ============================================================================
// Circuit Breaker
// ============================================================================
//
// Guards publishes to the broker. After `failure_threshold` consecutive
// failures the breaker opens and calls fail fast with `CircuitOpen`. Once
// `timeout` has elapsed a call is let through (half-open); enough successes
// close the breaker again, any failure reopens it.
//
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CircuitState {
    Closed,
    Open,
    HalfOpen,
}

impl CircuitState {
    /// Value exported on the circuit-state gauge.
    pub fn as_gauge(&self) -> i64 {
        match self {
            CircuitState::Closed => 0,
            CircuitState::HalfOpen => 1,
            CircuitState::Open => 2,
        }
    }
}

#[derive(Debug, Clone)]
pub struct CircuitBreakerConfig {
    pub failure_threshold: u32,
    pub timeout: Duration,
    pub success_threshold: u32,
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 5,
            timeout: Duration::from_secs(30),
            success_threshold: 3,
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum CircuitBreakerError<E> {
    #[error("Circuit breaker '{0}' is open")]
    CircuitOpen(String),

    #[error(transparent)]
    OperationFailed(E),
}

#[derive(Debug)]
struct Inner {
    state: CircuitState,
    consecutive_failures: u32,
    half_open_successes: u32,
    opened_at: Option<Instant>,
}

impl Inner {
    fn admit(&mut self, config: &CircuitBreakerConfig, name: &str) -> bool {
        match self.state {
            CircuitState::Closed | CircuitState::HalfOpen => true,
            CircuitState::Open => {
                let cooled = self.opened_at.map_or(true, |at| at.elapsed() >= config.timeout);
                if cooled {
                    tracing::info!(breaker = name, "Circuit breaker half-open, probing");
                    self.state = CircuitState::HalfOpen;
                    self.half_open_successes = 0;
                }
                cooled
            }
        }
    }

    fn on_success(&mut self, config: &CircuitBreakerConfig, name: &str) {
        self.consecutive_failures = 0;
        if self.state == CircuitState::HalfOpen {
            self.half_open_successes += 1;
            if self.half_open_successes >= config.success_threshold {
                tracing::info!(breaker = name, "✅ Circuit breaker closed");
                *self = Inner::closed();
            }
        }
    }

    fn on_failure(&mut self, config: &CircuitBreakerConfig, name: &str) {
        self.consecutive_failures += 1;
        let trip = match self.state {
            CircuitState::HalfOpen => true,
            CircuitState::Closed => self.consecutive_failures >= config.failure_threshold,
            CircuitState::Open => false,
        };
        if trip {
            tracing::warn!(
                breaker = name,
                failures = self.consecutive_failures,
                "⚠️ Circuit breaker opened"
            );
            self.state = CircuitState::Open;
            self.opened_at = Some(Instant::now());
            self.half_open_successes = 0;
        }
    }

    fn closed() -> Self {
        Self {
            state: CircuitState::Closed,
            consecutive_failures: 0,
            half_open_successes: 0,
            opened_at: None,
        }
    }
}

#[derive(Clone)]
pub struct CircuitBreaker {
    name: Arc<str>,
    inner: Arc<Mutex<Inner>>,
    config: CircuitBreakerConfig,
}

impl CircuitBreaker {
    pub fn new(name: &str, config: CircuitBreakerConfig) -> Self {
        Self {
            name: Arc::from(name),
            inner: Arc::new(Mutex::new(Inner::closed())),
            config,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Run `operation` unless the breaker is open.
    pub async fn call<F, T, E>(&self, operation: F) -> Result<T, CircuitBreakerError<E>>
    where
        F: Future<Output = Result<T, E>>,
    {
        if !self.inner.lock().await.admit(&self.config, &self.name) {
            return Err(CircuitBreakerError::CircuitOpen(self.name.to_string()));
        }

        let outcome = operation.await;

        let mut inner = self.inner.lock().await;
        match outcome {
            Ok(value) => {
                inner.on_success(&self.config, &self.name);
                Ok(value)
            }
            Err(error) => {
                inner.on_failure(&self.config, &self.name);
                Err(CircuitBreakerError::OperationFailed(error))
            }
        }
    }

    pub async fn state(&self) -> CircuitState {
        self.inner.lock().await.state
    }

    pub async fn failure_count(&self) -> u32 {
        self.inner.lock().await.consecutive_failures
    }

    pub async fn reset(&self) {
        tracing::info!(breaker = %self.name, "Circuit breaker manually reset");
        *self.inner.lock().await = Inner::closed();
    }
}
