//! Fault-tolerance policies wrapping a composed client.
//!
//! A [`PolicySpec`] is declarative data: retry, timeout, circuit breaker, or
//! an ordered composite of those. The [`PolicyLayer`] interprets a spec around
//! the handler chain at dispatch time, so nesting order carries meaning: a
//! timeout outside a retry bounds the whole retry sequence, a timeout inside
//! bounds each attempt.
//!
//! Policies attach statically to a client configuration or are chosen
//! per-request by a [`PolicySelector`]. A selector takes precedence over the
//! static spec when both are configured.
//!
//! # Example
//!
//! ```ignore
//! use clientele::policy::{Backoff, PolicySpec, RetryConfig};
//! use std::time::Duration;
//!
//! // Timeout bounds the whole retry sequence
//! let policy = PolicySpec::composite([
//!     PolicySpec::timeout(Duration::from_secs(10)),
//!     PolicySpec::Retry(RetryConfig::new(3).with_backoff(Backoff::Fixed(Duration::from_millis(100)))),
//! ]);
//! ```

mod breaker;

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};
use std::task::{Context, Poll};
use std::time::Duration;

use bytes::Bytes;
use tower::{Layer, ServiceExt};
use tower_service::Service;

pub use breaker::{CircuitBreakerConfig, CircuitState};
pub(crate) use breaker::BreakerState;

use crate::transport::ServiceFuture;
use crate::{Error, Request, Response, Result};

// ============================================================================
// Policy Specification
// ============================================================================

/// Wait strategy between retry attempts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Backoff {
    /// Retry immediately.
    None,
    /// Wait a fixed duration between attempts.
    Fixed(Duration),
    /// Double the wait after each attempt, capped at `max`.
    Exponential {
        /// Wait before the first re-attempt.
        initial: Duration,
        /// Upper bound on the computed wait.
        max: Duration,
    },
}

impl Backoff {
    /// Wait before re-attempt number `attempt` (1-based: the wait after the
    /// first failed attempt is `delay(1)`).
    #[must_use]
    pub fn delay(&self, attempt: u32) -> Duration {
        match self {
            Self::None => Duration::ZERO,
            Self::Fixed(duration) => *duration,
            Self::Exponential { initial, max } => {
                let exponent = attempt.saturating_sub(1).min(16);
                initial.saturating_mul(2u32.saturating_pow(exponent)).min(*max)
            }
        }
    }
}

/// Retry policy parameters.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryConfig {
    /// Total invocation budget, including the first attempt.
    pub max_attempts: u32,
    /// Wait strategy between attempts.
    pub backoff: Backoff,
    /// Retry non-idempotent methods (POST, PATCH) too.
    ///
    /// The policy never inspects request semantics beyond the method; callers
    /// with side-effect-free POSTs opt in explicitly.
    pub retry_non_idempotent: bool,
}

impl RetryConfig {
    /// Retry up to `max_attempts` total invocations with no backoff.
    #[must_use]
    pub const fn new(max_attempts: u32) -> Self {
        Self {
            max_attempts,
            backoff: Backoff::None,
            retry_non_idempotent: false,
        }
    }

    /// Set the backoff strategy.
    #[must_use]
    pub const fn with_backoff(mut self, backoff: Backoff) -> Self {
        self.backoff = backoff;
        self
    }

    /// Allow retrying non-idempotent methods.
    #[must_use]
    pub const fn retry_non_idempotent(mut self) -> Self {
        self.retry_non_idempotent = true;
        self
    }
}

/// A declarative fault-tolerance policy.
///
/// Composite policies apply in declared order, outermost first.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PolicySpec {
    /// Re-invoke on transient failure (connection errors, 5xx responses).
    Retry(RetryConfig),
    /// Bound the wrapped call, surfacing [`Error::Timeout`].
    Timeout(Duration),
    /// Fail fast after consecutive failures, probing for recovery.
    CircuitBreaker(CircuitBreakerConfig),
    /// Ordered nesting of policies, outermost first.
    Composite(Vec<PolicySpec>),
}

impl PolicySpec {
    /// Retry policy with the given total attempt budget.
    #[must_use]
    pub const fn retry(max_attempts: u32) -> Self {
        Self::Retry(RetryConfig::new(max_attempts))
    }

    /// Timeout policy.
    #[must_use]
    pub const fn timeout(duration: Duration) -> Self {
        Self::Timeout(duration)
    }

    /// Circuit breaker policy.
    #[must_use]
    pub const fn circuit_breaker(config: CircuitBreakerConfig) -> Self {
        Self::CircuitBreaker(config)
    }

    /// Composite policy applying the given specs outermost-first.
    #[must_use]
    pub fn composite(specs: impl IntoIterator<Item = Self>) -> Self {
        Self::Composite(specs.into_iter().collect())
    }

    /// Flatten nested composites into an ordered list of leaf policies,
    /// outermost first.
    #[must_use]
    pub fn flatten(&self) -> Vec<Self> {
        match self {
            Self::Composite(list) => list.iter().flat_map(Self::flatten).collect(),
            leaf => vec![leaf.clone()],
        }
    }

    /// Lower the spec into the ordered leaf steps the interpreter executes,
    /// outermost first. Composites disappear here, so dispatch only ever
    /// deals with the three leaf policies.
    fn steps(&self) -> Vec<Step> {
        match self {
            Self::Retry(config) => vec![Step::Retry(config.clone())],
            Self::Timeout(duration) => vec![Step::Timeout(*duration)],
            Self::CircuitBreaker(config) => vec![Step::CircuitBreaker(*config)],
            Self::Composite(list) => list.iter().flat_map(Self::steps).collect(),
        }
    }
}

/// A leaf policy as executed by the interpreter.
#[derive(Debug, Clone)]
enum Step {
    Retry(RetryConfig),
    Timeout(Duration),
    CircuitBreaker(CircuitBreakerConfig),
}

/// Pure function selecting a policy from the outgoing request.
///
/// Evaluated at dispatch time; takes precedence over any static policy on the
/// same client configuration.
///
/// Circuit-breaker state is kept per distinct breaker configuration for the
/// lifetime of the factory, so selectors should draw breaker configurations
/// from a fixed set rather than derive them from unbounded request data.
pub type PolicySelector = Arc<dyn Fn(&Request<Bytes>) -> PolicySpec + Send + Sync>;

// ============================================================================
// Breaker state registry
// ============================================================================

/// Shared circuit-breaker states, keyed by scope (client name) and breaker
/// configuration so state survives client re-composition and dynamically
/// selected breakers with equal parameters share one counter.
///
/// Entries live as long as the registry: each distinct (scope, configuration)
/// pair retains one state for the process lifetime.
#[derive(Clone, Default)]
pub(crate) struct BreakerRegistry {
    states: Arc<Mutex<HashMap<(Arc<str>, CircuitBreakerConfig), Arc<BreakerState>>>>,
}

impl BreakerRegistry {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    fn state_for(&self, scope: &Arc<str>, config: CircuitBreakerConfig) -> Arc<BreakerState> {
        let mut states = self
            .states
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        Arc::clone(
            states
                .entry((Arc::clone(scope), config))
                .or_insert_with(|| Arc::new(BreakerState::new(config))),
        )
    }
}

// ============================================================================
// Policy Layer
// ============================================================================

#[derive(Clone)]
enum PolicyBinding {
    Static(Arc<PolicySpec>),
    Dynamic(PolicySelector),
}

/// Layer that wraps a service with fault-tolerance policies.
///
/// # Example
///
/// ```ignore
/// use clientele::policy::{PolicyLayer, PolicySpec};
/// use tower::Layer;
///
/// let layer = PolicyLayer::new(PolicySpec::retry(3));
/// let service = layer.layer(client);
/// ```
#[derive(Clone)]
pub struct PolicyLayer {
    binding: PolicyBinding,
    scope: Arc<str>,
    breakers: BreakerRegistry,
}

impl std::fmt::Debug for PolicyLayer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let binding = match &self.binding {
            PolicyBinding::Static(spec) => format!("{spec:?}"),
            PolicyBinding::Dynamic(_) => "<dynamic>".to_string(),
        };
        f.debug_struct("PolicyLayer")
            .field("binding", &binding)
            .field("scope", &self.scope)
            .finish_non_exhaustive()
    }
}

impl PolicyLayer {
    /// Wrap with a static policy.
    #[must_use]
    pub fn new(spec: PolicySpec) -> Self {
        Self {
            binding: PolicyBinding::Static(Arc::new(spec)),
            scope: Arc::from(""),
            breakers: BreakerRegistry::new(),
        }
    }

    /// Wrap with a per-request policy selector.
    #[must_use]
    pub fn dynamic(selector: PolicySelector) -> Self {
        Self {
            binding: PolicyBinding::Dynamic(selector),
            scope: Arc::from(""),
            breakers: BreakerRegistry::new(),
        }
    }

    /// Scope breaker state to a client name and share it across
    /// re-compositions (used by the factory).
    pub(crate) fn scoped(mut self, scope: &str, breakers: BreakerRegistry) -> Self {
        self.scope = Arc::from(scope);
        self.breakers = breakers;
        self
    }
}

impl<S> Layer<S> for PolicyLayer {
    type Service = PolicyEnforcer<S>;

    fn layer(&self, inner: S) -> Self::Service {
        PolicyEnforcer {
            inner,
            binding: self.binding.clone(),
            scope: Arc::clone(&self.scope),
            breakers: self.breakers.clone(),
        }
    }
}

/// Service that interprets a [`PolicySpec`] around each call.
pub struct PolicyEnforcer<S> {
    inner: S,
    binding: PolicyBinding,
    scope: Arc<str>,
    breakers: BreakerRegistry,
}

impl<S: Clone> Clone for PolicyEnforcer<S> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
            binding: self.binding.clone(),
            scope: Arc::clone(&self.scope),
            breakers: self.breakers.clone(),
        }
    }
}

impl<S> Service<Request<Bytes>> for PolicyEnforcer<S>
where
    S: Service<Request<Bytes>, Response = Response<Bytes>, Error = Error> + Clone + Send + 'static,
    S::Future: Send,
{
    type Response = Response<Bytes>;
    type Error = Error;
    type Future = ServiceFuture;

    fn poll_ready(&mut self, _cx: &mut Context<'_>) -> Poll<Result<()>> {
        // The inner service is cloned per call and driven via oneshot
        Poll::Ready(Ok(()))
    }

    fn call(&mut self, request: Request<Bytes>) -> Self::Future {
        let spec = match &self.binding {
            PolicyBinding::Static(spec) => (**spec).clone(),
            PolicyBinding::Dynamic(selector) => selector(&request),
        };
        let steps: Arc<[Step]> = Arc::from(spec.steps());

        drive(
            steps,
            0,
            self.inner.clone(),
            request,
            Arc::clone(&self.scope),
            self.breakers.clone(),
        )
    }
}

/// Interpret the step list from `depth` outward around the service.
fn drive<S>(
    steps: Arc<[Step]>,
    depth: usize,
    svc: S,
    request: Request<Bytes>,
    scope: Arc<str>,
    breakers: BreakerRegistry,
) -> ServiceFuture
where
    S: Service<Request<Bytes>, Response = Response<Bytes>, Error = Error> + Clone + Send + 'static,
    S::Future: Send,
{
    Box::pin(async move {
        let Some(step) = steps.get(depth) else {
            return svc.oneshot(request).await;
        };

        match step {
            Step::Timeout(duration) => {
                let inner = drive(Arc::clone(&steps), depth + 1, svc, request, scope, breakers);
                tokio::time::timeout(*duration, inner)
                    .await
                    .map_err(|_| Error::Timeout)?
            }
            Step::Retry(config) => {
                let retry_allowed =
                    config.retry_non_idempotent || request.method().is_idempotent();
                let max_attempts = config.max_attempts.max(1);
                let mut attempt = 1u32;
                loop {
                    let result = drive(
                        Arc::clone(&steps),
                        depth + 1,
                        svc.clone(),
                        request.clone(),
                        Arc::clone(&scope),
                        breakers.clone(),
                    )
                    .await;

                    let transient = match &result {
                        Ok(response) => response.is_server_error(),
                        Err(error) => error.is_transient(),
                    };
                    if !(transient && retry_allowed && attempt < max_attempts) {
                        return result;
                    }

                    let delay = config.backoff.delay(attempt);
                    if !delay.is_zero() {
                        tokio::time::sleep(delay).await;
                    }
                    attempt += 1;
                }
            }
            Step::CircuitBreaker(config) => {
                let state = breakers.state_for(&scope, *config);
                if !state.try_acquire() {
                    return Err(Error::CircuitOpen);
                }

                let result =
                    drive(Arc::clone(&steps), depth + 1, svc, request, scope, breakers).await;

                match &result {
                    Ok(response) if response.is_server_error() => state.record_failure(),
                    Ok(_) => state.record_success(),
                    Err(_) => state.record_failure(),
                }
                result
            }
        }
    })
}
