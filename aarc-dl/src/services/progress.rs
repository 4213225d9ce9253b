//! Progress aggregation
//!
//! Maps the downloader's phase-tagged fractional reports onto one 0-100
//! job-level value. Weights:
//!
//! | Segment          | Weight | Range   |
//! |------------------|--------|---------|
//! | admission        | 10     | 0-10    |
//! | pre-processing   | 5      | 10-15   |
//! | downloading      | 70     | 15-85   |
//! | post-processing  | 5      | 85-90   |
//! | finalization     | 10     | 90-100  |
//!
//! Monotonicity is enforced by the job itself (lower values are dropped);
//! this module is pure.

pub const ADMISSION_WEIGHT: u8 = 10;
pub const PRE_PROCESSING_WEIGHT: u8 = 5;
pub const DOWNLOADING_WEIGHT: u8 = 70;
pub const POST_PROCESSING_WEIGHT: u8 = 5;
pub const FINALIZATION_WEIGHT: u8 = 10;

const _: () = assert!(
    ADMISSION_WEIGHT as u16
        + PRE_PROCESSING_WEIGHT as u16
        + DOWNLOADING_WEIGHT as u16
        + POST_PROCESSING_WEIGHT as u16
        + FINALIZATION_WEIGHT as u16
        <= 100
);

/// Progress reported on entering Running
pub const RUNNING_START: u8 = ADMISSION_WEIGHT;

/// Progress at which finalization begins
pub const FINALIZATION_START: u8 =
    RUNNING_START + PRE_PROCESSING_WEIGHT + DOWNLOADING_WEIGHT + POST_PROCESSING_WEIGHT;

/// Downloader phase
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DownloadPhase {
    PreProcessing,
    Downloading,
    PostProcessing,
}

impl DownloadPhase {
    /// (offset, weight) of this phase on the job-level scale
    fn span(self) -> (u8, u8) {
        match self {
            DownloadPhase::PreProcessing => (RUNNING_START, PRE_PROCESSING_WEIGHT),
            DownloadPhase::Downloading => (
                RUNNING_START + PRE_PROCESSING_WEIGHT,
                DOWNLOADING_WEIGHT,
            ),
            DownloadPhase::PostProcessing => (
                RUNNING_START + PRE_PROCESSING_WEIGHT + DOWNLOADING_WEIGHT,
                POST_PROCESSING_WEIGHT,
            ),
        }
    }

    fn label(self) -> &'static str {
        match self {
            DownloadPhase::PreProcessing => "Preparing",
            DownloadPhase::Downloading => "Downloading",
            DownloadPhase::PostProcessing => "Converting",
        }
    }
}

/// One progress notification from the downloader
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PhaseProgress {
    pub phase: DownloadPhase,
    /// Completion within the phase, 0.0-1.0
    pub fraction: f64,
}

impl PhaseProgress {
    pub fn new(phase: DownloadPhase, fraction: f64) -> Self {
        Self { phase, fraction }
    }
}

fn clamp_fraction(fraction: f64) -> f64 {
    if fraction.is_nan() {
        0.0
    } else {
        fraction.clamp(0.0, 1.0)
    }
}

/// Job-level progress value for a phase report
pub fn overall_progress(report: PhaseProgress) -> u8 {
    let (offset, weight) = report.phase.span();
    let within = (clamp_fraction(report.fraction) * weight as f64).floor() as u8;
    offset + within.min(weight)
}

/// Observer-facing label for a phase report, e.g. `Downloading (42%)`
pub fn phase_label(report: PhaseProgress) -> String {
    let percent = (clamp_fraction(report.fraction) * 100.0).round() as u8;
    format!("{} ({}%)", report.phase.label(), percent)
}

/// Value and label in one call
pub fn aggregate(report: PhaseProgress) -> (u8, String) {
    (overall_progress(report), phase_label(report))
}
