use std::path::{Path, PathBuf};

use crate::{AttributeValue, Attributes, TelemetrySource, system};

/// `/proc/meminfo` field name, attribute name.
const MEMORY_FIELDS: &[(&str, &str)] = &[
    ("MemTotal", "system.memory.total"),
    ("MemFree", "system.memory.free"),
    ("MemAvailable", "system.memory.available"),
    ("Buffers", "system.memory.buffers"),
    ("Cached", "system.memory.cached"),
    ("SwapCached", "system.memory.swap.cached"),
    ("Active", "system.memory.active"),
    ("Inactive", "system.memory.inactive"),
    ("SwapTotal", "system.memory.swap.total"),
    ("SwapFree", "system.memory.swap.free"),
    ("Dirty", "system.memory.dirty"),
    ("Writeback", "system.memory.writeback"),
    ("Slab", "system.memory.slab"),
    ("VmallocTotal", "system.memory.vmalloc.total"),
    ("VmallocUsed", "system.memory.vmalloc.used"),
    ("VmallocChunk", "system.memory.vmalloc.chunk"),
];

/// `/proc/<pid>/status` field name, attribute name, whether the value is a
/// size in kB.
const STATUS_FIELDS: &[(&str, &str, bool)] = &[
    ("nonvoluntary_ctxt_switches", "sched.cs.involuntary", false),
    ("voluntary_ctxt_switches", "sched.cs.voluntary", false),
    ("FDSize", "descriptor.count", false),
    ("VmData", "vm.data.size", true),
    ("VmLck", "vm.locked.size", true),
    ("VmPTE", "vm.pte.size", true),
    ("VmHWM", "vm.rss.peak", true),
    ("VmRSS", "vm.rss.size", true),
    ("VmLib", "vm.shared.size", true),
    ("VmStk", "vm.stack.size", true),
    ("VmSwap", "vm.swap.size", true),
    ("VmPeak", "vm.vma.peak", true),
    ("VmSize", "vm.vma.size", true),
];

/// Telemetry read from the Linux `/proc` filesystem.
///
/// On other platforms [`read_memory_information`] and
/// [`read_process_status`] return empty maps, and
/// [`read_system_attributes`] only reports what the standard library can
/// observe portably.
///
/// [`read_memory_information`]: TelemetrySource::read_memory_information
/// [`read_process_status`]: TelemetrySource::read_process_status
/// [`read_system_attributes`]: TelemetrySource::read_system_attributes
#[derive(Clone, Debug)]
pub struct Procfs {
    root: PathBuf,
}

impl Default for Procfs {
    fn default() -> Self {
        Self::new()
    }
}

impl Procfs {
    /// Creates a source reading from `/proc`.
    pub fn new() -> Self {
        Self::with_root("/proc")
    }

    /// Creates a source reading from a different procfs mount point.
    ///
    /// Useful for containers that mount the host's procfs elsewhere, and for
    /// tests.
    pub fn with_root(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// The procfs mount point this source reads from.
    pub fn root(&self) -> &Path {
        &self.root
    }

    pub(crate) fn read(&self, relative: &str) -> Option<String> {
        let path = self.root.join(relative);
        match std::fs::read_to_string(&path) {
            Ok(content) => Some(content),
            Err(error) => {
                tracing::trace!(path = %path.display(), %error, "procfs entry unavailable");
                None
            }
        }
    }
}

impl TelemetrySource for Procfs {
    fn read_memory_information(&self) -> Attributes {
        if !cfg!(target_os = "linux") {
            return Attributes::new();
        }
        self.read("meminfo")
            .map(|content| parse_meminfo(&content))
            .unwrap_or_default()
    }

    fn read_process_status(&self) -> Attributes {
        if !cfg!(target_os = "linux") {
            return Attributes::new();
        }
        self.read("self/status")
            .map(|content| parse_process_status(&content))
            .unwrap_or_default()
    }

    fn read_system_attributes(&self) -> Attributes {
        system::read_system_attributes(self)
    }
}

/// Splits a `Key:   value [kB]` line.
fn split_field(line: &str) -> Option<(&str, &str)> {
    let (key, rest) = line.split_once(':')?;
    Some((key.trim(), rest.trim()))
}

/// Parses the leading integer of a value, scaling `kB` values to bytes.
fn parse_amount(value: &str, in_kilobytes: bool) -> Option<u64> {
    let number = value.split_whitespace().next()?.parse::<u64>().ok()?;
    if in_kilobytes {
        number.checked_mul(1024)
    } else {
        Some(number)
    }
}

/// Parses the contents of `/proc/meminfo`.
pub(crate) fn parse_meminfo(content: &str) -> Attributes {
    let mut attributes = Attributes::new();
    for line in content.lines() {
        let Some((key, value)) = split_field(line) else {
            continue;
        };
        let Some(&(_, name)) = MEMORY_FIELDS.iter().find(|(field, _)| *field == key) else {
            continue;
        };
        if let Some(bytes) = parse_amount(value, true) {
            attributes.insert(name.to_owned(), AttributeValue::from(bytes));
        }
    }
    attributes
}

/// Parses the contents of `/proc/<pid>/status`.
pub(crate) fn parse_process_status(content: &str) -> Attributes {
    let mut attributes = Attributes::new();
    for line in content.lines() {
        let Some((key, value)) = split_field(line) else {
            continue;
        };
        let Some(&(_, name, in_kilobytes)) =
            STATUS_FIELDS.iter().find(|(field, _, _)| *field == key)
        else {
            continue;
        };
        if let Some(amount) = parse_amount(value, in_kilobytes) {
            attributes.insert(name.to_owned(), AttributeValue::from(amount));
        }
    }
    attributes
}
