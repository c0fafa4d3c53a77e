use std::{fmt, path::Path, sync::Arc};

use indexmap::IndexMap;
use rustc_hash::FxBuildHasher;
use serde::{Deserialize, Serialize};

use crate::{
    CargoManifestResolver, ExecutableBuildId, FrameFilter, ModuleDescriptor, ModuleResolver,
    RawTrace, SourceCodeOptions, SourceExcerpt, SourceMatcher, StackTraceError, SymbolIdResolver,
    SymbolicationEntry,
    source::{excerpt, read_source},
    trace::TraceFrame,
};

/// The crates of the reporting library, never taken for the calling module.
const LIBRARY_CRATES: &[&str] = &["faultreport", "faultreport-backtrace", "faultreport-telemetry"];

/// One frame of a parsed stack trace, as it appears in a report.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Frame {
    /// The enclosing function, when it could be resolved.
    #[serde(rename = "funcName", default, skip_serializing_if = "Option::is_none")]
    pub function: Option<String>,
    /// The source file of the frame.
    pub library: String,
    /// The 1-based line number.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub line: Option<u32>,
    /// The 1-based column number.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub column: Option<u32>,
    /// The key of this frame's excerpt in [`StackTrace::source_code`].
    #[serde(rename = "sourceCode", default, skip_serializing_if = "Option::is_none")]
    pub source_code: Option<String>,
    /// The identifier of the symbol map covering this frame.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub debug_identifier: Option<String>,
}

/// A parsed stack trace: frames, their source excerpts and symbol maps.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StackTrace {
    /// The frames, innermost call first.
    pub frames: Vec<Frame>,
    /// One excerpt per source file, keyed by file path.
    pub source_code: IndexMap<String, SourceExcerpt>,
    /// Symbol map identifiers, one per file, when symbolication was
    /// requested.
    pub symbolication_maps: Vec<SymbolicationEntry>,
}

/// What a single [`StackTraceParser::parse`] call should do beyond building
/// frames.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub struct ParseRequest {
    /// Resolve a symbol map identifier for every file.
    pub include_symbolication: bool,
    /// Look up the package of the first application frame.
    pub resolve_calling_module: bool,
}

/// The result of [`StackTraceParser::parse`].
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ParsedTrace {
    /// The parsed trace.
    pub stack_trace: StackTrace,
    /// The package of the first frame outside the reporting library, the
    /// standard library and the Cargo registry.
    pub calling_module: Option<ModuleDescriptor>,
}

/// Turns [`RawTrace`]s into [`StackTrace`]s.
///
/// Reads of source files are asynchronous; symbol resolution, module and
/// symbol map lookups run on Tokio's blocking thread pool when called from
/// inside a runtime. Failures to read a file or resolve a module degrade the result
/// and are logged at `debug` level.
///
/// ```rust
/// use faultreport_backtrace::{ParseRequest, RawFrame, RawTrace, StackTraceParser};
///
/// # #[tokio::main(flavor = "current_thread")]
/// # async fn main() {
/// let parser = StackTraceParser::new();
/// let trace = RawTrace::from_frames([RawFrame::new("/srv/app/src/main.rs", 3)]);
/// let parsed = parser.parse(trace, ParseRequest::default()).await.unwrap();
/// assert_eq!(parsed.stack_trace.frames[0].library, "/srv/app/src/main.rs");
/// # }
/// ```
#[derive(Clone)]
pub struct StackTraceParser {
    source_code: SourceCodeOptions,
    filter: FrameFilter,
    matchers: Vec<SourceMatcher>,
    modules: Arc<dyn ModuleResolver>,
    symbol_ids: Arc<dyn SymbolIdResolver>,
}

impl fmt::Debug for StackTraceParser {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StackTraceParser")
            .field("source_code", &self.source_code)
            .field("filter", &self.filter)
            .field("matchers", &self.matchers)
            .finish_non_exhaustive()
    }
}

impl Default for StackTraceParser {
    fn default() -> Self {
        Self::new()
    }
}

impl StackTraceParser {
    /// Creates a parser configured from the environment (see
    /// [`EnvOptions`](crate::EnvOptions)), resolving modules from Cargo
    /// manifests and symbol maps from the executable's build-id.
    pub fn new() -> Self {
        Self {
            source_code: SourceCodeOptions::from_env(),
            filter: FrameFilter::from_env(),
            matchers: crate::BACKTRACE_SOURCE.into_iter().collect(),
            modules: Arc::new(CargoManifestResolver),
            symbol_ids: Arc::new(ExecutableBuildId),
        }
    }

    /// Sets how source excerpts are cut.
    pub fn with_source_code_options(mut self, options: SourceCodeOptions) -> Self {
        self.source_code = options;
        self
    }

    /// Sets which frames are kept.
    pub fn with_frame_filter(mut self, filter: FrameFilter) -> Self {
        self.filter = filter;
        self
    }

    /// Adds a crate whose frames are attributed to it by source location
    /// rather than by registry path.
    pub fn with_source_matcher(mut self, matcher: SourceMatcher) -> Self {
        self.matchers.push(matcher);
        self
    }

    /// Sets the resolver for the calling module.
    pub fn with_module_resolver(mut self, resolver: Arc<dyn ModuleResolver>) -> Self {
        self.modules = resolver;
        self
    }

    /// Sets the resolver for symbol map identifiers.
    pub fn with_symbol_id_resolver(mut self, resolver: Arc<dyn SymbolIdResolver>) -> Self {
        self.symbol_ids = resolver;
        self
    }

    /// The source excerpt settings of this parser.
    pub fn source_code_options(&self) -> SourceCodeOptions {
        self.source_code
    }

    /// Parses `trace`.
    ///
    /// # Errors
    ///
    /// Fails only if a task on the blocking thread pool panicked or was
    /// cancelled.
    #[tracing::instrument(level = "debug", skip_all, fields(
        include_symbolication = request.include_symbolication,
        resolve_calling_module = request.resolve_calling_module,
    ))]
    pub async fn parse(
        &self,
        trace: RawTrace,
        request: ParseRequest,
    ) -> Result<ParsedTrace, StackTraceError> {
        let frames = if trace.needs_resolution() {
            let filter = self.filter;
            let matchers = self.matchers.clone();
            run_blocking(move || trace.resolve(&filter, &matchers)).await?
        } else {
            trace.resolve(&self.filter, &self.matchers)
        };

        let calling_module = if request.resolve_calling_module {
            self.resolve_calling_module(&frames).await?
        } else {
            None
        };

        let mut lines_by_file: IndexMap<String, Vec<u32>, FxBuildHasher> = IndexMap::default();
        for frame in &frames {
            let lines = lines_by_file.entry(frame.path.raw_path.clone()).or_default();
            lines.extend(frame.line);
        }

        let mut source_code = IndexMap::new();
        for (file, lines) in &lines_by_file {
            if lines.is_empty() {
                continue;
            }
            let Some(content) = read_source(file).await else {
                continue;
            };
            match excerpt(&content, file, lines, self.source_code) {
                Some(excerpt) => {
                    source_code.insert(file.clone(), excerpt);
                }
                None => tracing::debug!(file, "frame lines outside of source file"),
            }
        }

        let symbolication_maps = if request.include_symbolication {
            let symbol_ids = Arc::clone(&self.symbol_ids);
            let files: Vec<String> = lines_by_file.keys().cloned().collect();
            run_blocking(move || {
                files
                    .into_iter()
                    .filter_map(|file| {
                        let uuid = symbol_ids.symbol_id(&file)?;
                        Some(SymbolicationEntry { file, uuid })
                    })
                    .collect::<Vec<_>>()
            })
            .await?
        } else {
            Vec::new()
        };

        let frames: Vec<Frame> = frames
            .into_iter()
            .map(|frame| {
                let file = frame.path.raw_path;
                Frame {
                    function: frame.function,
                    line: frame.line,
                    column: frame.column,
                    source_code: source_code.contains_key(&file).then(|| file.clone()),
                    debug_identifier: symbolication_maps
                        .iter()
                        .find(|entry| entry.file == file)
                        .map(|entry| entry.uuid.clone()),
                    library: file,
                }
            })
            .collect();

        tracing::debug!(
            frames = frames.len(),
            excerpts = source_code.len(),
            symbol_maps = symbolication_maps.len(),
            calling_module = calling_module.as_ref().map(|module| module.name.as_str()),
            "parsed stack trace"
        );

        Ok(ParsedTrace {
            stack_trace: StackTrace {
                frames,
                source_code,
                symbolication_maps,
            },
            calling_module,
        })
    }

    async fn resolve_calling_module(
        &self,
        frames: &[TraceFrame],
    ) -> Result<Option<ModuleDescriptor>, StackTraceError> {
        let Some(frame) = frames
            .iter()
            .find(|frame| frame.path.split_path.is_none() && !frame.is_in(LIBRARY_CRATES))
        else {
            tracing::debug!("no application frame to resolve the calling module from");
            return Ok(None);
        };

        let modules = Arc::clone(&self.modules);
        let path = frame.path.raw_path.clone();
        let (descriptor, resolved) = run_blocking(move || modules.read_module(Path::new(&path))).await?;
        if descriptor.is_none() {
            tracing::debug!(path = %resolved.display(), "calling module not found");
        }
        Ok(descriptor)
    }
}

/// Runs `f` on the blocking thread pool if a runtime is available, inline
/// otherwise.
async fn run_blocking<T, F>(f: F) -> Result<T, StackTraceError>
where
    T: Send + 'static,
    F: FnOnce() -> T + Send + 'static,
{
    match tokio::runtime::Handle::try_current() {
        Ok(handle) => Ok(handle.spawn_blocking(f).await?),
        Err(_) => Ok(f()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parser_is_send_sync() {
        static_assertions::assert_impl_all!(StackTraceParser: Send, Sync, Clone);
        static_assertions::assert_obj_safe!(ModuleResolver, SymbolIdResolver);
    }

    #[test]
    fn test_frame_serialized_names() {
        let frame = Frame {
            function: Some("app::main".to_owned()),
            library: "/srv/app/src/main.rs".to_owned(),
            line: Some(4),
            column: None,
            source_code: Some("/srv/app/src/main.rs".to_owned()),
            debug_identifier: Some("abcd".to_owned()),
        };
        let value = serde_json::to_value(&frame).unwrap();
        assert_eq!(
            value,
            serde_json::json!({
                "funcName": "app::main",
                "library": "/srv/app/src/main.rs",
                "line": 4,
                "sourceCode": "/srv/app/src/main.rs",
                "debug_identifier": "abcd",
            })
        );
    }
}
