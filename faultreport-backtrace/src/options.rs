use std::{ffi::OsString, sync::OnceLock};

use crate::SourceCodeOptions;

/// Settings read from the environment once per process.
///
/// # Environment Variables
///
/// - `FAULTREPORT_BACKTRACE`: comma-separated flags. `full` disables frame
///   filtering, `symbolication` turns symbolication on for every report
///   unless the report overrides it.
/// - `FAULTREPORT_CONTEXT_LINES`: number of source lines kept around each
///   frame.
/// - `FAULTREPORT_TAB_WIDTH`: tab width used when expanding source excerpts.
///
/// Values that do not parse are ignored.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct EnvOptions {
    /// Whether frame filtering is disabled.
    pub full_backtrace: bool,
    /// Whether symbolication is on by default.
    pub symbolication: bool,
    /// Source excerpt settings.
    pub source_code: SourceCodeOptions,
}

impl EnvOptions {
    /// The options of this process, read on first use.
    pub fn get() -> &'static Self {
        static FAULTREPORT_FLAGS: OnceLock<EnvOptions> = OnceLock::new();

        FAULTREPORT_FLAGS.get_or_init(|| {
            Self::from_vars(
                std::env::var_os("FAULTREPORT_BACKTRACE"),
                std::env::var_os("FAULTREPORT_CONTEXT_LINES"),
                std::env::var_os("FAULTREPORT_TAB_WIDTH"),
            )
        })
    }

    fn from_vars(
        backtrace: Option<OsString>,
        context_lines: Option<OsString>,
        tab_width: Option<OsString>,
    ) -> Self {
        let mut full_backtrace = false;
        let mut symbolication = false;
        if let Some(var) = backtrace {
            for v in var.to_string_lossy().split(',') {
                let v = v.trim();
                if v.eq_ignore_ascii_case("full") {
                    full_backtrace = true;
                } else if v.eq_ignore_ascii_case("symbolication") {
                    symbolication = true;
                }
            }
        }

        let parse = |var: Option<OsString>| {
            var.and_then(|var| var.to_string_lossy().trim().parse::<usize>().ok())
        };
        let mut source_code = SourceCodeOptions::DEFAULT;
        if let Some(count) = parse(context_lines) {
            source_code.context_line_count = count;
        }
        if let Some(width) = parse(tab_width) {
            source_code.tab_width = width;
        }

        EnvOptions {
            full_backtrace,
            symbolication,
            source_code,
        }
    }
}
