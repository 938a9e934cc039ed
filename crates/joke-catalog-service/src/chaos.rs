//! Random error injection for exercising client error handling.
//!
//! When enabled, a request is answered with one of a fixed set of error
//! statuses before it reaches any route, with probability `failure_rate`.
//! Injected responses carry their [`InjectedFailure`] as a response extension.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use axum::extract::{Request, State};
use axum::http::StatusCode;
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use rand::Rng;

use crate::ServiceFailure;

pub const DEFAULT_FAILURE_RATE: f64 = 0.3;

pub const INJECTABLE_FAILURES: [(StatusCode, &str); 6] = [
    (StatusCode::BAD_REQUEST, "Bad Request"),
    (StatusCode::UNAUTHORIZED, "Unauthorized"),
    (StatusCode::FORBIDDEN, "Forbidden"),
    (StatusCode::NOT_FOUND, "Not Found"),
    (StatusCode::INTERNAL_SERVER_ERROR, "Internal Server Error"),
    (StatusCode::SERVICE_UNAVAILABLE, "Service Unavailable"),
];

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ChaosConfig {
    pub enabled: bool,
    pub failure_rate: f64,
}

impl Default for ChaosConfig {
    fn default() -> Self {
        Self { enabled: false, failure_rate: DEFAULT_FAILURE_RATE }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InjectedFailure {
    pub status: StatusCode,
    pub message: &'static str,
}

#[derive(Debug, Default)]
pub struct RandomErrorInjector {
    config: ChaosConfig,
    injected_total: AtomicU64,
}

impl RandomErrorInjector {
    /// Rates outside `[0, 1]` are clamped; NaN falls back to the default rate.
    pub fn new(config: ChaosConfig) -> Self {
        let failure_rate = if config.failure_rate.is_nan() {
            DEFAULT_FAILURE_RATE
        } else {
            config.failure_rate.clamp(0.0, 1.0)
        };
        Self {
            config: ChaosConfig { enabled: config.enabled, failure_rate },
            injected_total: AtomicU64::new(0),
        }
    }

    pub fn config(&self) -> ChaosConfig {
        self.config
    }

    pub fn injected_total(&self) -> u64 {
        self.injected_total.load(Ordering::Relaxed)
    }

    /// Decides whether the current request fails. A draw in `[0, 1)` at or
    /// below the rate fails, with the failure picked uniformly.
    pub fn roll<R>(&self, rng: &mut R) -> Option<InjectedFailure>
    where
        R: Rng + ?Sized,
    {
        if !self.config.enabled {
            return None;
        }
        let draw: f64 = rng.gen();
        if draw > self.config.failure_rate {
            return None;
        }
        let (status, message) = INJECTABLE_FAILURES[rng.gen_range(0..INJECTABLE_FAILURES.len())];
        Some(InjectedFailure { status, message })
    }
}

pub async fn inject_random_errors(
    State(injector): State<Arc<RandomErrorInjector>>,
    request: Request,
    next: Next,
) -> Response {
    let failure = injector.roll(&mut rand::thread_rng());
    let Some(failure) = failure else {
        return next.run(request).await;
    };

    injector.injected_total.fetch_add(1, Ordering::Relaxed);
    tracing::warn!(
        method = %request.method(),
        path = request.uri().path(),
        status = failure.status.as_u16(),
        "injected random error"
    );
    let mut response = ServiceFailure::new(failure.status, failure.message).into_response();
    response.extensions_mut().insert(failure);
    response
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;
    use std::collections::BTreeSet;

    fn injector(enabled: bool, failure_rate: f64) -> RandomErrorInjector {
        RandomErrorInjector::new(ChaosConfig { enabled, failure_rate })
    }

    #[test]
    fn disabled_injector_never_fails() {
        let injector = injector(false, 1.0);
        let mut rng = StdRng::seed_from_u64(11);

        assert!((0..1000).all(|_| injector.roll(&mut rng).is_none()));
    }

    #[test]
    fn full_rate_always_fails_with_known_failures() {
        let injector = injector(true, 1.0);
        let mut rng = StdRng::seed_from_u64(3);
        let mut statuses = BTreeSet::new();

        for _ in 0..600 {
            match injector.roll(&mut rng) {
                Some(failure) => {
                    assert!(
                        INJECTABLE_FAILURES.contains(&(failure.status, failure.message)),
                        "unexpected failure: {failure:?}"
                    );
                    statuses.insert(failure.status.as_u16());
                }
                None => panic!("rate 1.0 must always inject"),
            }
        }
        assert_eq!(statuses.len(), INJECTABLE_FAILURES.len());
    }

    #[test]
    fn zero_rate_passes_through() {
        let injector = injector(true, 0.0);
        let mut rng = StdRng::seed_from_u64(5);

        assert!((0..1000).all(|_| injector.roll(&mut rng).is_none()));
    }

    #[test]
    fn default_rate_fails_about_thirty_percent() {
        let injector = injector(true, DEFAULT_FAILURE_RATE);
        let mut rng = StdRng::seed_from_u64(42);

        let failures = (0..10_000).filter(|_| injector.roll(&mut rng).is_some()).count();
        assert!((2_500..3_500).contains(&failures), "failure count out of range: {failures}");
    }

    #[test]
    fn new_clamps_out_of_range_rates() {
        assert!((injector(true, 4.0).config().failure_rate - 1.0).abs() < f64::EPSILON);
        assert!(injector(true, -1.0).config().failure_rate.abs() < f64::EPSILON);
        assert!(
            (injector(true, f64::NAN).config().failure_rate - DEFAULT_FAILURE_RATE).abs()
                < f64::EPSILON
        );
    }

    #[test]
    fn default_config_is_disabled() {
        let config = ChaosConfig::default();
        assert!(!config.enabled);
        assert!((config.failure_rate - DEFAULT_FAILURE_RATE).abs() < f64::EPSILON);
    }
}
