//! Human-readable elapsed time formatting
//!
//! Used for observer-facing labels such as "Completed in 2m 05s".

/// Format an elapsed duration in whole seconds
///
/// - under a minute: `Xs`
/// - under an hour: `Mm SSs`
/// - otherwise: `Hh MMm SSs`
///
/// # Examples
///
/// ```
/// use aarc_common::human_time::format_elapsed;
///
/// assert_eq!(format_elapsed(0), "0s");
/// assert_eq!(format_elapsed(45), "45s");
/// assert_eq!(format_elapsed(125), "2m 05s");
/// assert_eq!(format_elapsed(3723), "1h 02m 03s");
/// ```
pub fn format_elapsed(seconds: u64) -> String {
    let hours = seconds / 3600;
    let mins = (seconds % 3600) / 60;
    let secs = seconds % 60;

    if hours > 0 {
        format!("{}h {:02}m {:02}s", hours, mins, secs)
    } else if mins > 0 {
        format!("{}m {:02}s", mins, secs)
    } else {
        format!("{}s", secs)
    }
}

/// Same as [`format_elapsed`], for a `std::time::Duration` (sub-second part truncated)
pub fn format_duration(duration: std::time::Duration) -> String {
    format_elapsed(duration.as_secs())
}
