//! Marker types for the lifecycle of a [`Report`](crate::Report).
//!
//! A report starts out [`Mutable`]: metadata can be added and the fault can
//! be replaced. [`Report::seal`](crate::Report::seal) turns it into a
//! [`Sealed`] report, which can still be finalized (any number of times) but
//! no longer changed.
//!
//! ```
//! use faultreport::{Report, markers};
//!
//! let mut report: Report<markers::Mutable> = Report::from_message("disk full");
//! report.add_attribute("volume", "/var");
//!
//! let sealed: Report<markers::Sealed> = report.seal();
//! assert_eq!(sealed.attributes()["volume"].as_str(), Some("/var"));
//! // sealed.add_attribute("volume", "/tmp"); // ❌ Won't compile
//! ```

/// Marker for reports that can still be changed.
///
/// This is the default state of a [`Report`](crate::Report).
#[derive(Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Debug, Default, Hash)]
pub struct Mutable;

/// Marker for reports whose content is frozen.
///
/// Finalizing a sealed report still collects fresh telemetry on every call.
#[derive(Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Debug, Default, Hash)]
pub struct Sealed;

mod sealed_report_state {
    use super::*;

    pub trait Sealed: 'static {}

    impl Sealed for Mutable {}
    impl Sealed for super::Sealed {}
}

/// Marker trait for the lifecycle states of a [`Report`](crate::Report).
///
/// This trait is sealed and cannot be implemented outside of this crate.
pub trait ReportState: sealed_report_state::Sealed + Send + Sync {}

impl ReportState for Mutable {}
impl ReportState for Sealed {}
