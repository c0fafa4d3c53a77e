use faultreport_backtrace::StackTraceError;

/// A setter was given data of the wrong shape.
///
/// The report is left unchanged when a setter returns this error.
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
#[non_exhaustive]
pub enum ValidationError {
    /// A symbolication map was not a sequence.
    #[error("symbolication map must be a sequence of {{file, uuid}} entries")]
    NotASequence,
    /// A symbolication map entry lacks a field, or the field is empty.
    #[error("symbolication map entry {index} is missing `{field}`")]
    MissingField {
        /// The position of the entry in the map.
        index: usize,
        /// The missing field, `file` or `uuid`.
        field: &'static str,
    },
    /// An annotation was a scalar instead of a mapping or sequence.
    #[error("annotation values must be mappings or sequences")]
    NotStructured,
}

/// Finalizing a report failed.
///
/// Degraded collection (unreadable source files, missing telemetry) never
/// produces this error; it is reserved for failures that leave nothing to
/// report.
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum ReportError {
    /// The stack trace could not be parsed.
    #[error("failed to parse the stack trace")]
    StackTrace(#[from] StackTraceError),
    /// Telemetry collection panicked on the blocking thread pool.
    #[error("telemetry collection task failed")]
    Telemetry(#[source] tokio::task::JoinError),
    /// The payload could not be encoded.
    #[error("failed to encode the payload")]
    Encode(#[from] serde_json::Error),
}
