//! Paired timing of one logical operation against both backends.

use std::fmt;
use std::future::Future;
use std::time::{Duration, Instant};

use serde::Serialize;
use serde_json::Value;
use tracing::{debug, error, info};

/// Result of a single timed call.
#[derive(Debug, Clone, PartialEq)]
pub enum IterationOutcome {
    Success { value: Value, elapsed: Duration },
    Failure { message: String },
}

/// Aggregated outcome of up to N iterations on one backend.
#[derive(Debug, Clone, PartialEq)]
pub struct BackendOutcome {
    /// Mean seconds over successful iterations; `+inf` when none succeeded
    /// or an iteration failed.
    pub mean_secs: f64,
    /// Value returned by the first successful iteration.
    pub result: Option<Value>,
    pub error: Option<String>,
    pub samples: usize,
}

impl BackendOutcome {
    fn from_iterations(outcomes: Vec<IterationOutcome>) -> Self {
        let mut result = None;
        let mut error = None;
        let mut times = Vec::with_capacity(outcomes.len());
        for outcome in outcomes {
            match outcome {
                IterationOutcome::Success { value, elapsed } => {
                    times.push(elapsed.as_secs_f64());
                    result.get_or_insert(value);
                }
                IterationOutcome::Failure { message } => {
                    error = Some(message);
                    break;
                }
            }
        }
        let mean_secs = if error.is_some() || times.is_empty() {
            f64::INFINITY
        } else {
            times.iter().sum::<f64>() / times.len() as f64
        };
        Self {
            mean_secs,
            result,
            error,
            samples: times.len(),
        }
    }
}

/// Run `op` up to `iterations` times, one after another, stopping at the
/// first failure.
pub async fn measure_backend<F, Fut>(iterations: usize, mut op: F) -> BackendOutcome
where
    F: FnMut() -> Fut,
    Fut: Future<Output = anyhow::Result<Value>>,
{
    let mut outcomes = Vec::with_capacity(iterations);
    for i in 0..iterations {
        let start = Instant::now();
        let outcome = match op().await {
            Ok(value) => IterationOutcome::Success {
                value,
                elapsed: start.elapsed(),
            },
            Err(err) => IterationOutcome::Failure {
                message: format!("{err:#}"),
            },
        };
        let failed = matches!(outcome, IterationOutcome::Failure { .. });
        debug!(iteration = i + 1, failed, "iteration finished");
        outcomes.push(outcome);
        if failed {
            break;
        }
    }
    BackendOutcome::from_iterations(outcomes)
}

/// The faster backend of a comparison, or neither when both failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Winner {
    A,
    B,
    #[serde(rename = "none")]
    Neither,
}

impl fmt::Display for Winner {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Winner::A => "A",
            Winner::B => "B",
            Winner::Neither => "none",
        })
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct MeasurementResult {
    pub name: String,
    pub backend_a_time: f64,
    pub backend_b_time: f64,
    pub backend_a_result: Option<Value>,
    pub backend_b_result: Option<Value>,
    pub backend_a_error: Option<String>,
    pub backend_b_error: Option<String>,
}

impl MeasurementResult {
    pub fn from_outcomes(name: impl Into<String>, a: BackendOutcome, b: BackendOutcome) -> Self {
        Self {
            name: name.into(),
            backend_a_time: a.mean_secs,
            backend_b_time: b.mean_secs,
            backend_a_result: a.result,
            backend_b_result: b.result,
            backend_a_error: a.error,
            backend_b_error: b.error,
        }
    }

    /// `A time / B time`; `+inf` when B's time is zero or not finite.
    pub fn performance_ratio(&self) -> f64 {
        if self.backend_b_time == 0.0 || !self.backend_b_time.is_finite() {
            f64::INFINITY
        } else {
            self.backend_a_time / self.backend_b_time
        }
    }

    /// A failed backend always loses; otherwise the lower mean wins, ties to B.
    pub fn winner(&self) -> Winner {
        match (&self.backend_a_error, &self.backend_b_error) {
            (Some(_), Some(_)) => Winner::Neither,
            (Some(_), None) => Winner::B,
            (None, Some(_)) => Winner::A,
            (None, None) if self.backend_a_time < self.backend_b_time => Winner::A,
            (None, None) => Winner::B,
        }
    }
}

/// Measure A fully, then B fully, and combine the outcomes.
pub async fn run_comparison<FA, FutA, FB, FutB>(
    name: &str,
    iterations: usize,
    op_a: FA,
    op_b: FB,
) -> MeasurementResult
where
    FA: FnMut() -> FutA,
    FutA: Future<Output = anyhow::Result<Value>>,
    FB: FnMut() -> FutB,
    FutB: Future<Output = anyhow::Result<Value>>,
{
    info!(test = name, iterations, "running measurement");
    let a = measure_backend(iterations, op_a).await;
    if let Some(err) = &a.error {
        error!(test = name, backend = "A", error = %err, "backend operation failed");
    }
    let b = measure_backend(iterations, op_b).await;
    if let Some(err) = &b.error {
        error!(test = name, backend = "B", error = %err, "backend operation failed");
    }
    MeasurementResult::from_outcomes(name, a, b)
}
