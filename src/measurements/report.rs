use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::info;

use super::harness::{MeasurementResult, Winner};

#[derive(Debug, Clone, Serialize)]
pub struct Backends {
    #[serde(rename = "A")]
    pub a: &'static str,
    #[serde(rename = "B")]
    pub b: &'static str,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Summary {
    pub total_tests: usize,
    #[serde(rename = "backendA_wins")]
    pub backend_a_wins: usize,
    #[serde(rename = "backendB_wins")]
    pub backend_b_wins: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct DetailedResult {
    pub test_name: String,
    pub winner: Winner,
    #[serde(rename = "backendA_time")]
    pub backend_a_time: Option<f64>,
    #[serde(rename = "backendB_time")]
    pub backend_b_time: Option<f64>,
    pub performance_ratio: Option<f64>,
    #[serde(rename = "backendA_error")]
    pub backend_a_error: Option<String>,
    #[serde(rename = "backendB_error")]
    pub backend_b_error: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct Report {
    pub timestamp: DateTime<Utc>,
    pub backends: Backends,
    pub summary: Summary,
    pub detailed_results: Vec<DetailedResult>,
}

impl Report {
    /// `measurement_report_<YYYYmmdd_HHMMSS>.json` from the capture time.
    pub fn default_filename(&self) -> String {
        format!("measurement_report_{}.json", self.timestamp.format("%Y%m%d_%H%M%S"))
    }
}

/// Non-finite values have no JSON number form; they are written as null.
fn finite(x: f64) -> Option<f64> {
    x.is_finite().then_some(x)
}

pub fn generate_report(results: &[MeasurementResult], captured_at: DateTime<Utc>) -> Report {
    let detailed_results: Vec<DetailedResult> = results
        .iter()
        .map(|r| DetailedResult {
            test_name: r.name.clone(),
            winner: r.winner(),
            backend_a_time: finite(r.backend_a_time),
            backend_b_time: finite(r.backend_b_time),
            performance_ratio: finite(r.performance_ratio()),
            backend_a_error: r.backend_a_error.clone(),
            backend_b_error: r.backend_b_error.clone(),
        })
        .collect();
    let wins = |w: Winner| detailed_results.iter().filter(|d| d.winner == w).count();
    Report {
        timestamp: captured_at,
        backends: Backends {
            a: "document",
            b: "relational",
        },
        summary: Summary {
            total_tests: detailed_results.len(),
            backend_a_wins: wins(Winner::A),
            backend_b_wins: wins(Winner::B),
        },
        detailed_results,
    }
}

/// Write the report as pretty JSON. Without an explicit `filename` the file
/// goes to `dir` under the default timestamped name.
pub fn save_report(report: &Report, filename: Option<&Path>, dir: &Path) -> Result<PathBuf> {
    let path = match filename {
        Some(f) => f.to_path_buf(),
        None => dir.join(report.default_filename()),
    };
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent).with_context(|| format!("creating {}", parent.display()))?;
    }
    let body = serde_json::to_string_pretty(report)?;
    fs::write(&path, body).with_context(|| format!("writing report {}", path.display()))?;
    info!(path = %path.display(), "report saved");
    Ok(path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use serde_json::Value;

    fn result(name: &str, a: f64, b: f64, b_err: Option<&str>) -> MeasurementResult {
        MeasurementResult {
            name: name.into(),
            backend_a_time: a,
            backend_b_time: b,
            backend_a_result: None,
            backend_b_result: None,
            backend_a_error: None,
            backend_b_error: b_err.map(str::to_string),
        }
    }

    fn captured() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 9, 26, 12, 21, 23).unwrap()
    }

    #[test]
    fn summary_counts_wins() {
        let results = [
            result("SimpleCountTest", 0.01, 0.02, None),
            result("CategoryFilterTest", 0.03, 0.02, None),
            result("ComplexSearchTest", 0.01, f64::INFINITY, Some("timeout")),
        ];
        let report = generate_report(&results, captured());
        assert_eq!(
            report.summary,
            Summary { total_tests: 3, backend_a_wins: 2, backend_b_wins: 1 }
        );
        assert_eq!(report.detailed_results[2].performance_ratio, None);
        assert_eq!(report.detailed_results[2].backend_b_time, None);
    }

    #[test]
    fn serialized_shape() {
        let report = generate_report(&[result("SimpleCountTest", 0.01, f64::INFINITY, Some("boom"))], captured());
        let v = serde_json::to_value(&report).unwrap();
        assert_eq!(v["backends"]["A"], "document");
        assert_eq!(v["summary"]["backendA_wins"], 1);
        let d = &v["detailed_results"][0];
        assert_eq!(d["test_name"], "SimpleCountTest");
        assert_eq!(d["winner"], "A");
        assert_eq!(d["backendA_time"], 0.01);
        assert_eq!(d["backendB_time"], Value::Null);
        assert_eq!(d["performance_ratio"], Value::Null);
        assert_eq!(d["backendB_error"], "boom");
        assert!(v["timestamp"].as_str().unwrap().starts_with("2024-09-26T12:21:23"));
    }

    #[test]
    fn saves_under_timestamped_name() {
        let dir = tempfile::tempdir().unwrap();
        let report = generate_report(&[], captured());
        let path = save_report(&report, None, &dir.path().join("reports")).unwrap();
        assert_eq!(path.file_name().unwrap(), "measurement_report_20240926_122123.json");
        let back: Value = serde_json::from_str(&fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(back["summary"]["total_tests"], 0);

        let explicit = dir.path().join("custom.json");
        assert_eq!(save_report(&report, Some(&explicit), dir.path()).unwrap(), explicit);
        assert!(explicit.exists());
    }
}
