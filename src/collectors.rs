use std::{fmt, sync::Arc};

use faultreport_backtrace::{FrameFilter, ModuleResolver, StackTraceParser, SymbolIdResolver};
use faultreport_telemetry::{Procfs, TelemetrySource};

/// The collaborators a report uses to gather data when it is finalized.
///
/// The defaults read telemetry from procfs, resolve the calling module from
/// Cargo manifests and identify symbol maps by the executable's GNU
/// build-id. Each can be replaced, typically with a fixed source in tests:
///
/// ```
/// use std::sync::Arc;
///
/// use faultreport::{Attributes, Collectors, Report, TelemetrySource};
///
/// struct Quiet;
///
/// impl TelemetrySource for Quiet {
///     fn read_memory_information(&self) -> Attributes {
///         Attributes::new()
///     }
///     fn read_process_status(&self) -> Attributes {
///         Attributes::new()
///     }
///     fn read_system_attributes(&self) -> Attributes {
///         Attributes::new()
///     }
/// }
///
/// let collectors = Collectors::new().with_telemetry(Arc::new(Quiet));
/// let report = Report::from_message("flush failed").with_collectors(collectors);
/// # let _ = report;
/// ```
///
/// Cloning is cheap; collaborators are shared.
#[derive(Clone)]
pub struct Collectors {
    telemetry: Arc<dyn TelemetrySource>,
    parser: StackTraceParser,
}

impl fmt::Debug for Collectors {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Collectors")
            .field("parser", &self.parser)
            .finish_non_exhaustive()
    }
}

impl Default for Collectors {
    fn default() -> Self {
        Self::new()
    }
}

impl Collectors {
    /// Creates the default collectors, configured from the environment.
    pub fn new() -> Self {
        Self {
            telemetry: Arc::new(Procfs::new()),
            parser: StackTraceParser::new(),
        }
        .with_parser_matcher()
    }

    /// Replaces the telemetry source.
    pub fn with_telemetry(mut self, telemetry: Arc<dyn TelemetrySource>) -> Self {
        self.telemetry = telemetry;
        self
    }

    /// Replaces the calling module resolver.
    pub fn with_module_resolver(mut self, resolver: Arc<dyn ModuleResolver>) -> Self {
        self.parser = self.parser.with_module_resolver(resolver);
        self
    }

    /// Replaces the symbol map identifier resolver.
    pub fn with_symbol_id_resolver(mut self, resolver: Arc<dyn SymbolIdResolver>) -> Self {
        self.parser = self.parser.with_symbol_id_resolver(resolver);
        self
    }

    /// Replaces the frame filter.
    pub fn with_frame_filter(mut self, filter: FrameFilter) -> Self {
        self.parser = self.parser.with_frame_filter(filter);
        self
    }

    /// Replaces the whole stack trace parser.
    pub fn with_parser(mut self, parser: StackTraceParser) -> Self {
        self.parser = parser;
        self.with_parser_matcher()
    }

    pub(crate) fn telemetry(&self) -> &Arc<dyn TelemetrySource> {
        &self.telemetry
    }

    pub(crate) fn parser(&self) -> &StackTraceParser {
        &self.parser
    }

    /// Lets the parser recognize frames of this crate, so that frames of the
    /// capture are skipped and never taken for the calling module.
    fn with_parser_matcher(mut self) -> Self {
        if let Some(matcher) = crate::FAULTREPORT_SOURCE {
            self.parser = self.parser.with_source_matcher(matcher);
        }
        self
    }
}
