use std::path::Path;

use serde::{Deserialize, Serialize};

/// How source code excerpts are cut from the files referenced by a trace.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct SourceCodeOptions {
    /// Number of columns a tab character advances to.
    pub tab_width: usize,
    /// Number of lines to include around each frame's line.
    pub context_line_count: usize,
}

impl SourceCodeOptions {
    /// Eight-column tabs, 200 lines of context.
    pub const DEFAULT: Self = Self {
        tab_width: 8,
        context_line_count: 200,
    };

    /// The options selected by `FAULTREPORT_TAB_WIDTH` and
    /// `FAULTREPORT_CONTEXT_LINES`, falling back to
    /// [`DEFAULT`](Self::DEFAULT).
    pub fn from_env() -> Self {
        crate::EnvOptions::get().source_code
    }
}

impl Default for SourceCodeOptions {
    fn default() -> Self {
        Self::DEFAULT
    }
}

/// A window of a source file, shared by all frames in that file.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceExcerpt {
    /// The excerpt, with tabs expanded.
    pub text: String,
    /// The 1-based line number of the first line of `text`.
    #[serde(rename = "startLine")]
    pub start_line: u32,
    /// The 1-based column of the first character of `text`.
    #[serde(rename = "startColumn")]
    pub start_column: u32,
    /// The file the excerpt was read from.
    pub path: String,
    /// The tab width used to expand tabs.
    #[serde(rename = "tabWidth")]
    pub tab_width: usize,
}

/// The 1-based inclusive range of `count` lines around `line`, clamped to
/// the file.
///
/// Returns [`None`] when the line is outside the file, which happens when the
/// source changed after the binary was built.
pub(crate) fn window(line: u32, total_lines: usize, count: usize) -> Option<(usize, usize)> {
    let line = usize::try_from(line).ok()?;
    if count == 0 || line == 0 || line > total_lines {
        return None;
    }
    let before = (count - 1) / 2;
    let start = line.saturating_sub(before).max(1);
    let end = start.saturating_add(count - 1).min(total_lines);
    let start = end.saturating_sub(count - 1).max(1);
    Some((start, end))
}

/// Expands tabs to the next multiple of `tab_width`.
pub(crate) fn expand_tabs(line: &str, tab_width: usize) -> String {
    if tab_width == 0 || !line.contains('\t') {
        return line.to_owned();
    }
    let mut expanded = String::with_capacity(line.len());
    let mut column = 0usize;
    for c in line.chars() {
        if c == '\t' {
            let spaces = tab_width - column % tab_width;
            expanded.extend(std::iter::repeat_n(' ', spaces));
            column += spaces;
        } else {
            expanded.push(c);
            column += 1;
        }
    }
    expanded
}

/// Builds one excerpt covering the windows around all of `lines`.
pub(crate) fn excerpt(
    content: &str,
    path: &str,
    lines: &[u32],
    options: SourceCodeOptions,
) -> Option<SourceExcerpt> {
    let file_lines: Vec<&str> = content.lines().collect();
    let (start, end) = lines
        .iter()
        .filter_map(|&line| window(line, file_lines.len(), options.context_line_count))
        .reduce(|(start_a, end_a), (start_b, end_b)| (start_a.min(start_b), end_a.max(end_b)))?;

    let text = file_lines[start - 1..end]
        .iter()
        .map(|line| expand_tabs(line, options.tab_width))
        .collect::<Vec<_>>()
        .join("\n");

    Some(SourceExcerpt {
        text,
        start_line: u32::try_from(start).ok()?,
        start_column: 1,
        path: path.to_owned(),
        tab_width: options.tab_width,
    })
}

/// Reads a source file, logging and swallowing failures.
pub(crate) async fn read_source(path: &str) -> Option<String> {
    match tokio::fs::read_to_string(Path::new(path)).await {
        Ok(content) => Some(content),
        Err(error) => {
            tracing::debug!(path, %error, "source file unavailable, omitting excerpt");
            None
        }
    }
}
