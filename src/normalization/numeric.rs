use std::sync::OnceLock;

use regex::Regex;
use serde_json::Value;
use tracing::{debug, warn};

fn number_re() -> &'static Regex {
    static NUMBER_RE: OnceLock<Regex> = OnceLock::new();
    NUMBER_RE.get_or_init(|| {
        Regex::new(r"[-+]?\d+(?:[.,]\d+)?").expect("valid number regex")
    })
}

/// Extract a number from a JSON value.
///
/// Numbers pass through unchanged (as `f64`), strings are scanned with
/// [`extract_number_str`], anything else yields `None`.
pub fn extract_number(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => extract_number_str(s),
        _ => None,
    }
}

/// First decimal number found in a mixed-unit string such as `"400g"` or `"< 0,5 g"`.
///
/// Accepts an optional sign and a single `.` or `,` fractional separator.
pub fn extract_number_str(input: &str) -> Option<f64> {
    let Some(m) = number_re().find(input) else {
        debug!(input, "no numeric value in string");
        return None;
    };
    let candidate = m.as_str().replace(',', ".");
    match candidate.parse::<f64>() {
        Ok(n) => Some(n),
        Err(err) => {
            warn!(input, candidate = %candidate, error = %err, "numeric substring did not convert");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::io;
    use std::sync::{Arc, Mutex};
    use tracing_subscriber::fmt::MakeWriter;

    #[test]
    fn numbers_pass_through() {
        assert_eq!(extract_number(&json!(7.2)), Some(7.2));
        assert_eq!(extract_number(&json!(400)), Some(400.0));
    }

    #[test]
    fn pulls_first_number_from_units() {
        assert_eq!(extract_number(&json!("400g")), Some(400.0));
        assert_eq!(extract_number(&json!("3.6 g")), Some(3.6));
        assert_eq!(extract_number(&json!("< 0,5 g")), Some(0.5));
        assert_eq!(extract_number(&json!("2 x 125 g")), Some(2.0));
        assert_eq!(extract_number_str("-4 °C"), Some(-4.0));
    }

    #[test]
    fn absent_when_no_digits_or_wrong_type() {
        assert_eq!(extract_number(&json!("traces")), None);
        assert_eq!(extract_number(&json!("")), None);
        assert_eq!(extract_number(&json!(null)), None);
        assert_eq!(extract_number(&json!(true)), None);
        assert_eq!(extract_number(&json!(["1"])), None);
    }

    #[derive(Clone, Default)]
    struct CapturedLog(Arc<Mutex<Vec<u8>>>);

    impl io::Write for CapturedLog {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    impl<'a> MakeWriter<'a> for CapturedLog {
        type Writer = CapturedLog;

        fn make_writer(&'a self) -> Self::Writer {
            self.clone()
        }
    }

    #[test]
    fn missing_number_is_logged() {
        let log = CapturedLog::default();
        let subscriber = tracing_subscriber::fmt()
            .with_max_level(tracing::Level::DEBUG)
            .with_writer(log.clone())
            .finish();
        let got = tracing::subscriber::with_default(subscriber, || extract_number_str("n/a"));
        assert_eq!(got, None);
        let out = String::from_utf8(log.0.lock().unwrap().clone()).unwrap();
        assert!(out.contains("no numeric value in string"), "log was: {out}");
        assert!(out.contains("n/a"));
    }
}
