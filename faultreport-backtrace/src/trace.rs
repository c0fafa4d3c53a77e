use std::path::PathBuf;

use crate::{
    path::{FramePath, SourceMatcher},
    symbol::is_runtime_entry,
};

/// An unparsed stack trace, as attached to a fault.
///
/// A raw trace is either captured from the current thread with
/// [`RawTrace::capture`], in which case symbol resolution is deferred until
/// the trace is parsed, or assembled from frames collected elsewhere with
/// [`RawTrace::from_frames`].
#[derive(Clone, Debug)]
pub struct RawTrace(Repr);

#[derive(Clone, Debug)]
enum Repr {
    Captured(backtrace::Backtrace),
    Frames(Vec<RawFrame>),
}

/// A single stack frame supplied by the caller.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RawFrame {
    /// The enclosing function, if known.
    pub function: Option<String>,
    /// The source file of the frame.
    pub file: PathBuf,
    /// The 1-based line number, if known.
    pub line: Option<u32>,
    /// The 1-based column number, if known.
    pub column: Option<u32>,
}

impl RawFrame {
    /// Creates a frame at `file:line`.
    pub fn new(file: impl Into<PathBuf>, line: u32) -> Self {
        Self {
            function: None,
            file: file.into(),
            line: Some(line),
            column: None,
        }
    }

    /// Sets the enclosing function name.
    pub fn with_function(mut self, function: impl Into<String>) -> Self {
        self.function = Some(function.into());
        self
    }

    /// Sets the column number.
    pub fn with_column(mut self, column: u32) -> Self {
        self.column = Some(column);
        self
    }
}

impl Default for RawTrace {
    fn default() -> Self {
        Self::empty()
    }
}

impl RawTrace {
    /// Captures the stack of the current thread without resolving symbols.
    #[inline(never)]
    pub fn capture() -> Self {
        Self(Repr::Captured(backtrace::Backtrace::new_unresolved()))
    }

    /// Creates a trace from frames collected elsewhere, innermost first.
    pub fn from_frames(frames: impl IntoIterator<Item = RawFrame>) -> Self {
        Self(Repr::Frames(frames.into_iter().collect()))
    }

    /// Creates a trace without frames.
    pub fn empty() -> Self {
        Self(Repr::Frames(Vec::new()))
    }

    /// Whether symbols still have to be resolved before the trace can be
    /// parsed.
    pub fn needs_resolution(&self) -> bool {
        matches!(self.0, Repr::Captured(_))
    }

    /// Resolves symbols and applies `filter`, innermost frame first.
    ///
    /// This may be slow for captured traces; the parser runs it on the
    /// blocking thread pool.
    pub(crate) fn resolve(self, filter: &FrameFilter, matchers: &[SourceMatcher]) -> Vec<TraceFrame> {
        match self.0 {
            Repr::Captured(mut backtrace) => {
                backtrace.resolve();
                let frames = backtrace.frames().iter().flat_map(|frame| {
                    frame.symbols().iter().filter_map(|symbol| {
                        // Frames without symbol names or filenames carry nothing to report.
                        let (Some(name), Some(filename)) = (symbol.name(), symbol.filename()) else {
                            return None;
                        };
                        Some(TraceFrame {
                            function: Some(format!("{name:#}")),
                            path: FramePath::new(&filename.to_string_lossy(), matchers),
                            line: symbol.lineno(),
                            column: symbol.colno(),
                        })
                    })
                });
                filter.apply(frames)
            }
            Repr::Frames(frames) => filter.apply(frames.into_iter().map(|frame| TraceFrame {
                path: FramePath::new(&frame.file.to_string_lossy(), matchers),
                function: frame.function,
                line: frame.line,
                column: frame.column,
            })),
        }
    }
}

/// A resolved frame with its classified path.
#[derive(Clone, Debug)]
pub(crate) struct TraceFrame {
    pub(crate) function: Option<String>,
    pub(crate) path: FramePath,
    pub(crate) line: Option<u32>,
    pub(crate) column: Option<u32>,
}

impl TraceFrame {
    /// Whether the frame belongs to one of `crates`, judged by its path or,
    /// for crates built from relative paths, by its symbol.
    pub(crate) fn is_in(&self, crates: &[&str]) -> bool {
        if self.path.is_in(crates) {
            return true;
        }
        let Some(function) = self.function.as_deref().and_then(symbol_crate) else {
            return false;
        };
        crates
            .iter()
            .any(|name| name.len() == function.len() && name.replace('-', "_") == function)
    }
}

/// The crate of a demangled symbol: its first path segment, ignoring the
/// `<` of trait implementations.
fn symbol_crate(symbol: &str) -> Option<&str> {
    let symbol = symbol.trim_start_matches('<');
    let (name, _) = symbol.split_once("::")?;
    (!name.is_empty() && name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_'))
        .then_some(name)
}

/// Configuration for filtering frames from certain crates in a trace.
///
/// ```rust
/// use faultreport_backtrace::FrameFilter;
///
/// let filter = FrameFilter {
///     // Hide runtime frames at the end
///     skipped_final_crates: &["std", "tokio", "hyper"],
///     // Keep only the most relevant frames
///     max_frame_count: 32,
///     ..FrameFilter::DEFAULT
/// };
/// # let _ = filter;
/// ```
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct FrameFilter {
    /// Crates whose frames are dropped while they appear at the top of the
    /// trace.
    pub skipped_initial_crates: &'static [&'static str],
    /// Crates whose frames are dropped while they appear at the bottom of the
    /// trace.
    pub skipped_final_crates: &'static [&'static str],
    /// Maximum number of frames to keep.
    pub max_frame_count: usize,
}

impl FrameFilter {
    /// Default filter settings.
    pub const DEFAULT: Self = Self {
        skipped_initial_crates: &[
            "backtrace",
            "faultreport",
            "faultreport-backtrace",
            "core",
            "std",
            "alloc",
        ],
        skipped_final_crates: &["std", "core", "alloc", "tokio"],
        max_frame_count: 100,
    };

    /// Keeps every frame.
    pub const UNFILTERED: Self = Self {
        skipped_initial_crates: &[],
        skipped_final_crates: &[],
        max_frame_count: usize::MAX,
    };

    /// The filter selected by the `FAULTREPORT_BACKTRACE` environment
    /// variable: [`UNFILTERED`](Self::UNFILTERED) with `full`, else
    /// [`DEFAULT`](Self::DEFAULT).
    pub fn from_env() -> Self {
        if crate::EnvOptions::get().full_backtrace {
            Self::UNFILTERED
        } else {
            Self::DEFAULT
        }
    }

    pub(crate) fn apply(&self, frames: impl IntoIterator<Item = TraceFrame>) -> Vec<TraceFrame> {
        let mut initial_filtering = !self.skipped_initial_crates.is_empty();
        let mut kept = Vec::new();

        for frame in frames {
            if initial_filtering {
                if frame.is_in(self.skipped_initial_crates) {
                    continue;
                }
                initial_filtering = false;
            }
            kept.push(frame);
        }

        while let Some(last) = kept.last() {
            let runtime_entry = last
                .function
                .as_deref()
                .is_some_and(|function| is_runtime_entry(function, &last.path.raw_path));
            if runtime_entry || last.is_in(self.skipped_final_crates) {
                kept.pop();
            } else {
                break;
            }
        }

        kept.truncate(self.max_frame_count);
        kept
    }
}

impl Default for FrameFilter {
    fn default() -> Self {
        Self::DEFAULT
    }
}
