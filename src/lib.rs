#![deny(
    missing_docs,
    unsafe_code,
    rustdoc::invalid_rust_codeblocks,
    rustdoc::broken_intra_doc_links,
    missing_copy_implementations,
    unused_doc_comments
)]
// Make docs.rs generate better docs
#![cfg_attr(docsrs, feature(doc_cfg))]

//! Structured error reports for remote error-aggregation services.
//!
//! ## Overview
//!
//! A [`Report`] describes one fault in a running process: an error value or
//! a plain message, together with everything needed to investigate it after
//! the fact. Finalizing a report produces a [`Payload`], a self-contained
//! JSON document with:
//!
//! - the stack trace of the fault, each frame pointing into an excerpt of
//!   its source file;
//! - a snapshot of process and system telemetry (memory, scheduling, file
//!   descriptors, host and kernel descriptors);
//! - the package that raised the fault, resolved from its Cargo manifest;
//! - caller metadata, split into scalar attributes and structured
//!   annotations.
//!
//! Delivering the payload is left to the caller.
//!
//! ## Quick Example
//!
//! ```
//! use faultreport::Report;
//!
//! async fn report_failure(error: &std::io::Error) -> Result<String, faultreport::ReportError> {
//!     let mut report = Report::from_error(error);
//!     report.add_attribute("component", "uploader");
//!     let payload = report.finalize().await?;
//!     payload.to_json()
//! }
//! ```
//!
//! ## Lifecycle
//!
//! 1. **Construction** fixes the identity of the report (uuid and
//!    timestamp) and captures the stack of the fault, without resolving
//!    symbols.
//! 2. **Mutation** adds metadata or replaces the fault, in any order. See
//!    [`markers`] for freezing a report.
//! 3. **Finalization** resolves the stack, reads source files and
//!    telemetry, and merges everything. Built-in values never override
//!    caller values.
//!
//! ## Symbolication
//!
//! A payload is marked for symbolication when any of these holds:
//! symbolication was turned on with [`Report::set_symbolication`] (or
//! `FAULTREPORT_BACKTRACE=symbolication`), the merged attributes carry a
//! `symbolication_id` (from the caller or a telemetry source), or a symbol
//! map was given with
//! [`Report::set_symbolication_map`]. An explicit map replaces the map
//! derived from the stack trace, and the stack trace parser only resolves
//! identifiers itself when the flag is the sole reason.
//!
//! ## Logging
//!
//! Degraded collection (unreadable files, missing telemetry, unresolved
//! modules) is logged through [`tracing`] at `debug` and `trace` level. The
//! library never installs a subscriber.

use std::panic::Location;

pub mod attributes;
mod collectors;
mod error;
mod fault;
mod identity;
pub mod markers;
mod payload;
mod report;
mod symbolication;

pub use faultreport_backtrace::{
    CargoManifestResolver, EnvOptions, ExecutableBuildId, Frame, FrameFilter, ModuleDescriptor,
    ModuleResolver, RawFrame, RawTrace, SourceCodeOptions, SourceExcerpt, SymbolIdResolver,
    SymbolicationEntry,
};
pub use faultreport_telemetry::{Procfs, TelemetrySource, machine_id};

pub use self::{
    attributes::{AnnotationValue, Annotations, AttributeValue, Attributes},
    collectors::Collectors,
    error::{ReportError, ValidationError},
    fault::Fault,
    payload::{Payload, Thread},
    report::Report,
    symbolication::SymbolicationMode,
};

/// Recognizes the frames of this crate.
pub(crate) const FAULTREPORT_SOURCE: Option<faultreport_backtrace::SourceMatcher> =
    faultreport_backtrace::SourceMatcher::for_crate_root("faultreport", Location::caller());
