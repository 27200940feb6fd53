use thiserror::Error;

/// Failure taxonomy for the competition engine. Absent data and zero
/// denominators resolve to documented defaults at the point of calculation
/// and never surface here; only structural problems that would corrupt the
/// engine's conservation invariants are fatal.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("no measures were supplied for analysis")]
    EmptyAnalysis,
    #[error("no years were supplied for analysis")]
    EmptyYearRange,
    #[error(
        "secondary segment {segment} on measure '{measure}' has no associated primary segment"
    )]
    MissingPrimaryLink { measure: String, segment: String },
    #[error("input could not be ingested: {0}")]
    InvalidInput(#[from] anyhow::Error),
}
