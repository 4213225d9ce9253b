//! Downloader failure classification
//!
//! Maps the raw error text of a failed downloader run onto a known/unknown
//! taxonomy. Known failures carry a message safe to show observers verbatim;
//! unknown ones get a generic message and the raw detail is only logged.

/// Message surfaced for failures no pattern recognizes
pub const GENERIC_FAILURE_MESSAGE: &str = "Download failed due to an unexpected error";

/// Result of classifying one failure
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Classification {
    pub is_known: bool,
    /// Observer-safe description
    pub safe_message: String,
    /// Joined raw lines, for logs only
    pub raw_detail: String,
}

/// Failure classifier collaborator
pub trait ErrorClassifier: Send + Sync {
    fn classify(&self, raw_lines: &[String]) -> Classification;
}

/// Substring patterns checked in order; first match wins
const KNOWN_PATTERNS: &[(&str, &str)] = &[
    ("HTTP Error 403", "Access to the media was denied (HTTP 403)"),
    ("HTTP Error 404", "The media could not be found (HTTP 404)"),
    ("HTTP Error 410", "The media is no longer available (HTTP 410)"),
    ("HTTP Error 429", "The media host is rate limiting requests (HTTP 429); try again later"),
    ("Private video", "The media is private"),
    ("Video unavailable", "The media is unavailable"),
    ("This video is not available", "The media is unavailable in this region"),
    ("Sign in to confirm your age", "The media is age-restricted and requires sign-in"),
    ("members-only", "The media is restricted to channel members"),
    ("Unsupported URL", "This URL is not supported"),
    ("is not a valid URL", "This URL is not valid"),
    ("Requested format is not available", "No audio format is available for this media"),
    ("ffprobe and ffmpeg not found", "Audio conversion tools are not installed on the server"),
    ("ffmpeg not found", "Audio conversion tools are not installed on the server"),
    ("Unable to extract", "The media page could not be parsed"),
    ("Failed to resolve", "The media host could not be reached"),
    ("Name or service not known", "The media host could not be reached"),
    ("timed out", "The connection to the media host timed out"),
    ("No space left on device", "The server ran out of disk space"),
];

/// Table-driven classifier over the downloader's error output
#[derive(Debug, Default, Clone)]
pub struct PatternClassifier;

impl PatternClassifier {
    pub fn new() -> Self {
        Self
    }
}

impl ErrorClassifier for PatternClassifier {
    fn classify(&self, raw_lines: &[String]) -> Classification {
        let raw_detail = raw_lines.join("\n");

        let known = KNOWN_PATTERNS
            .iter()
            .find(|(pattern, _)| raw_lines.iter().any(|line| line.contains(pattern)));

        match known {
            Some((_, message)) => Classification {
                is_known: true,
                safe_message: (*message).to_string(),
                raw_detail,
            },
            None => Classification {
                is_known: false,
                safe_message: GENERIC_FAILURE_MESSAGE.to_string(),
                raw_detail,
            },
        }
    }
}
