#![deny(
    missing_docs,
    unsafe_code,
    rustdoc::invalid_rust_codeblocks,
    rustdoc::broken_intra_doc_links,
    missing_copy_implementations,
    unused_doc_comments
)]

//! Stack trace capture and parsing for faultreport error reports.
//!
//! A fault carries a [`RawTrace`], captured cheaply when the fault is created
//! and resolved only when a report is finalized. The [`StackTraceParser`]
//! turns it into the frames of a report:
//!
//! 1. symbols are resolved and the trace is filtered with a [`FrameFilter`];
//! 2. the source of every referenced file is read once, and a single
//!    [`SourceExcerpt`] covering all frames of that file is cut from it;
//! 3. optionally, the package of the first application frame is looked up
//!    with a [`ModuleResolver`];
//! 4. optionally, a symbol map identifier is attached to every file with a
//!    [`SymbolIdResolver`].
//!
//! Every step degrades instead of failing: an unreadable file has no
//! excerpt, an unknown module is `None`.
//!
//! # Environment Variables
//!
//! - `FAULTREPORT_BACKTRACE=full` - Keep every frame, including those of the
//!   capture machinery and the runtime
//! - `FAULTREPORT_BACKTRACE=symbolication` - Turn symbolication on by default
//! - `FAULTREPORT_CONTEXT_LINES=<n>` - Source lines kept around each frame
//!   (default 200)
//! - `FAULTREPORT_TAB_WIDTH=<n>` - Tab width of source excerpts (default 8)
//!
//! Multiple `FAULTREPORT_BACKTRACE` options can be combined with commas.
//!
//! ```rust
//! use faultreport_backtrace::{ParseRequest, RawTrace, StackTraceParser};
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() {
//! let trace = RawTrace::capture();
//! let parsed = StackTraceParser::new()
//!     .parse(trace, ParseRequest::default())
//!     .await
//!     .unwrap();
//! for frame in &parsed.stack_trace.frames {
//!     println!("{}:{:?}", frame.library, frame.line);
//! }
//! # }
//! ```

use std::panic::Location;

mod build_id;
mod module;
mod options;
mod parser;
mod path;
mod source;
mod symbol;
mod trace;

pub use self::{
    build_id::{ExecutableBuildId, SymbolIdResolver, SymbolicationEntry, read_build_id},
    module::{CargoManifestResolver, ModuleDescriptor, ModuleResolver},
    options::EnvOptions,
    parser::{Frame, ParseRequest, ParsedTrace, StackTrace, StackTraceParser},
    path::{FramePath, FramePrefix, SourceMatcher},
    source::{SourceCodeOptions, SourceExcerpt},
    symbol::short_name,
    trace::{FrameFilter, RawFrame, RawTrace},
};

/// Recognizes the frames of this crate.
pub(crate) const BACKTRACE_SOURCE: Option<SourceMatcher> =
    SourceMatcher::for_crate_root("faultreport-backtrace", Location::caller());

/// Errors returned by [`StackTraceParser::parse`].
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum StackTraceError {
    /// A task on the blocking thread pool panicked or was cancelled.
    #[error("stack trace resolution task failed")]
    Blocking(#[from] tokio::task::JoinError),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_is_send_sync() {
        static_assertions::assert_impl_all!(StackTraceError: Send, Sync, std::error::Error);
    }

    #[test]
    fn test_own_source_matcher() {
        let matcher = BACKTRACE_SOURCE.expect("lib.rs path should be long enough");
        assert_eq!(matcher.crate_name(), "faultreport-backtrace");
    }
}
