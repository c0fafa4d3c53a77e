#![deny(
    missing_docs,
    unsafe_code,
    rustdoc::invalid_rust_codeblocks,
    rustdoc::broken_intra_doc_links,
    missing_copy_implementations,
    unused_doc_comments
)]

//! Process and system telemetry for faultreport error reports.
//!
//! Every report carries a snapshot of the state of the process and the
//! machine it runs on at the moment the report is finalized. This crate
//! provides the sources of that snapshot as flat maps of scalar
//! [`AttributeValue`]s.
//!
//! # Sources
//!
//! - [`TelemetrySource`] is the seam used by the report builder. All of its
//!   readers are infallible: a value that cannot be observed is simply left
//!   out of the map.
//! - [`Procfs`] is the default implementation. It reads `/proc` on Linux and
//!   returns empty memory and process-status maps everywhere else.
//! - [`machine_id`] returns the cached, hashed machine identifier.
//!
//! ```rust
//! use faultreport_telemetry::{Procfs, TelemetrySource};
//!
//! let status = Procfs::new().read_process_status();
//! if let Some(rss) = status.get("vm.rss.size") {
//!     println!("resident set size: {rss}");
//! }
//! ```

mod machine;
mod procfs;
mod system;
mod value;

pub use self::{
    machine::machine_id,
    procfs::Procfs,
    value::{AttributeValue, Attributes},
};

/// A source of process and system telemetry.
///
/// Implementations must never panic and never block for long: the readers
/// are called once per finalized report. A value that cannot be read is
/// omitted from the returned map, and a platform without support for a reader
/// returns an empty map.
pub trait TelemetrySource: Send + Sync {
    /// Reads system-wide memory statistics (`system.memory.*`).
    fn read_memory_information(&self) -> Attributes;

    /// Reads the status of the current process.
    ///
    /// On supported platforms the map contains `sched.cs.involuntary`,
    /// `sched.cs.voluntary`, `descriptor.count`, `vm.data.size`,
    /// `vm.locked.size`, `vm.pte.size`, `vm.rss.peak`, `vm.rss.size`,
    /// `vm.shared.size`, `vm.stack.size`, `vm.swap.size`, `vm.vma.peak` and
    /// `vm.vma.size`. Sizes are in bytes.
    fn read_process_status(&self) -> Attributes;

    /// Reads descriptors of the operating system, the runtime and the host
    /// (`uname.*`, `cpu.*`, `hostname`, `guid`, ...).
    fn read_system_attributes(&self) -> Attributes;
}

impl<T: TelemetrySource + ?Sized> TelemetrySource for std::sync::Arc<T> {
    fn read_memory_information(&self) -> Attributes {
        (**self).read_memory_information()
    }

    fn read_process_status(&self) -> Attributes {
        (**self).read_process_status()
    }

    fn read_system_attributes(&self) -> Attributes {
        (**self).read_system_attributes()
    }
}
