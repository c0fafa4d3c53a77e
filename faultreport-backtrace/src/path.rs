use std::{borrow::Cow, panic::Location, path::Path, sync::OnceLock};

/// Identifies the source files of a crate from the location of its `lib.rs`.
///
/// Frame paths starting with the crate's directory are attributed to that
/// crate, which lets the parser recognize frames of the reporting library
/// itself even when it is built from a path or git dependency.
///
/// The matcher is built at compile time:
///
/// ```rust
/// use std::panic::Location;
///
/// use faultreport_backtrace::SourceMatcher;
///
/// // Must be evaluated from the crate's `src/lib.rs`.
/// const MY_SOURCE: Option<SourceMatcher> =
///     SourceMatcher::for_crate_root("my-crate", Location::caller());
/// # let _ = MY_SOURCE;
/// ```
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct SourceMatcher {
    crate_name: &'static str,
    matcher_prefix: &'static str,
    splitter_prefix_len: usize,
}

impl SourceMatcher {
    /// Builds a matcher from a location inside a crate's `src/lib.rs`.
    ///
    /// Returns [`None`] if the path is too short to contain `/src/lib.rs`.
    ///
    /// # Panics
    ///
    /// When evaluated in a const context, compilation fails if the location
    /// is not in a `src/lib.rs` file.
    pub const fn for_crate_root(
        crate_name: &'static str,
        location: &'static Location<'static>,
    ) -> Option<Self> {
        let file = location.file();

        let Some(prefix_len) = file.len().checked_sub("/src/lib.rs".len()) else {
            return None;
        };

        let (prefix, suffix) = file.split_at(prefix_len);
        if std::path::MAIN_SEPARATOR == '/' {
            assert!(suffix.eq_ignore_ascii_case("/src/lib.rs"));
        } else {
            assert!(suffix.eq_ignore_ascii_case(r#"/src\lib.rs"#));
        }

        let (matcher_prefix, _) = file.split_at(prefix_len + 4);

        let mut splitter_prefix = prefix;
        while !splitter_prefix.is_empty() {
            let (new_prefix, last_char) = splitter_prefix.split_at(splitter_prefix.len() - 1);
            splitter_prefix = new_prefix;
            if last_char.eq_ignore_ascii_case(std::path::MAIN_SEPARATOR_STR) {
                break;
            }
        }

        Some(Self {
            crate_name,
            matcher_prefix,
            splitter_prefix_len: splitter_prefix.len(),
        })
    }

    /// The name of the crate this matcher recognizes.
    pub const fn crate_name(&self) -> &'static str {
        self.crate_name
    }

    /// Splits `path` into the directory holding the crate and the path from
    /// the crate directory on.
    fn split<'a>(&self, path: &'a str) -> Option<(&'a str, &'a str)> {
        let separator_len = usize::from(self.splitter_prefix_len > 0);

        if path.starts_with(self.matcher_prefix) {
            let suffix_start = if self.splitter_prefix_len == 0
                && !path.starts_with(std::path::MAIN_SEPARATOR)
            {
                0
            } else {
                self.splitter_prefix_len + 1
            };
            return Some((&path[..self.splitter_prefix_len], &path[suffix_start..]));
        }

        // Workspace members are compiled with paths relative to the workspace
        // root, while debug info may record them as absolute paths.
        if Path::new(self.matcher_prefix).is_relative() {
            let needle = format!("{}{}", std::path::MAIN_SEPARATOR, self.matcher_prefix);
            let index = path.find(&needle)?;
            let crate_start = index + 1 + self.splitter_prefix_len + separator_len;
            return Some((&path[..crate_start - 1], &path[crate_start..]));
        }

        None
    }
}

/// File path information for a stack frame.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FramePath {
    /// The raw file path from the debug information.
    pub raw_path: String,
    /// The crate name if detected from the path.
    pub crate_name: Option<Cow<'static, str>>,
    /// Common path prefix information for shortening display.
    pub split_path: Option<FramePrefix>,
}

/// A known prefix split off a frame path.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FramePrefix {
    /// The kind of prefix: `"RUST_SRC"` for the standard library, `"CARGO"`
    /// for the Cargo registry, `"CRATE"` for a crate recognized by a
    /// [`SourceMatcher`].
    pub prefix_kind: &'static str,
    /// The prefix that was removed from the original path.
    pub prefix: String,
    /// The remaining path, starting with the crate directory.
    pub suffix: String,
}

impl FramePath {
    /// Classifies a raw frame path, consulting `matchers` for crates that are
    /// neither part of the standard library nor downloaded from a registry.
    pub fn new(path_str: &str, matchers: &[SourceMatcher]) -> Self {
        static REGEXES: OnceLock<[regex::Regex; 2]> = OnceLock::new();
        let [std_regex, registry_regex] = REGEXES.get_or_init(|| {
            [
                // Matches Rust standard library paths:
                // - /lib/rustlib/src/rust/library/{std|core|alloc}/src/...
                // - /rustc/{40-char-hash}/library/{std|core|alloc}/src/...
                regex::Regex::new(
                    r"(?:/lib/rustlib/src/rust|^/rustc/[0-9a-f]{40})/library/(std|core|alloc)/src/.*$",
                )
                .expect("built-in regex pattern for std library paths should be valid"),
                // Matches Cargo registry paths:
                // - /.cargo/registry/src/{index}-{16-char-hash}/{crate}-{version}/src/...
                regex::Regex::new(
                    r"/\.cargo/registry/src/[^/]+-[0-9a-f]{16}/([^./]+)-[0-9]+\.[^/]*/src/.*$",
                )
                .expect("built-in regex pattern for cargo registry paths should be valid"),
            ]
        });

        let raw_path = path_str.to_owned();

        for (regex, prefix_kind) in [(std_regex, "RUST_SRC"), (registry_regex, "CARGO")] {
            if let Some(captures) = regex.captures(path_str) {
                let crate_capture = captures
                    .get(1)
                    .expect("regex capture group 1 should exist for known path prefixes");
                let split = crate_capture.start();
                return Self {
                    raw_path,
                    crate_name: Some(crate_capture.as_str().to_owned().into()),
                    split_path: Some(FramePrefix {
                        prefix_kind,
                        prefix: path_str[..split - 1].to_owned(),
                        suffix: path_str[split..].to_owned(),
                    }),
                };
            }
        }

        for matcher in matchers {
            if let Some((prefix, suffix)) = matcher.split(path_str) {
                return Self {
                    split_path: Some(FramePrefix {
                        prefix_kind: "CRATE",
                        prefix: prefix.to_owned(),
                        suffix: suffix.to_owned(),
                    }),
                    crate_name: Some(Cow::Borrowed(matcher.crate_name)),
                    raw_path,
                };
            }
        }

        Self {
            raw_path,
            crate_name: None,
            split_path: None,
        }
    }

    /// Whether this path belongs to one of `crates`.
    pub fn is_in(&self, crates: &[&str]) -> bool {
        self.crate_name
            .as_deref()
            .is_some_and(|name| crates.contains(&name))
    }
}
