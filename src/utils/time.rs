//! Time parsing and formatting utilities

use crate::domain::model::TimeSpec;
use crate::error::{ScramblerError, ScramblerResult};

/// Format seconds as `[H:]MM:SS.mmm`
pub fn format_seconds(seconds: f64) -> String {
    TimeSpec::from_seconds(seconds).format_hms()
}

/// Parse a duration given as plain seconds (`1.5`), milliseconds (`250ms`),
/// seconds with a unit (`2s`) or `MM:SS[.ms]`.
pub fn parse_duration_secs(input: &str) -> ScramblerResult<f64> {
    let input = input.trim();
    let invalid = || ScramblerError::ConfigError {
        message: format!("invalid duration '{}': expected seconds, 250ms, 2s or MM:SS.ms", input),
    };

    let seconds = if let Some(ms) = input.strip_suffix("ms") {
        ms.trim().parse::<f64>().map_err(|_| invalid())? / 1000.0
    } else if let Some(s) = input.strip_suffix('s') {
        s.trim().parse::<f64>().map_err(|_| invalid())?
    } else if let Some((minutes, seconds)) = input.split_once(':') {
        let minutes: f64 = minutes.parse().map_err(|_| invalid())?;
        let seconds: f64 = seconds.parse().map_err(|_| invalid())?;
        if !(0.0..60.0).contains(&seconds) {
            return Err(invalid());
        }
        minutes * 60.0 + seconds
    } else {
        input.parse::<f64>().map_err(|_| invalid())?
    };

    if !seconds.is_finite() || seconds <= 0.0 {
        return Err(invalid());
    }
    Ok(seconds)
}
