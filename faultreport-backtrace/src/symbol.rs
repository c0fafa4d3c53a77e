/// Returns the last path segment of a demangled Rust path, without generic
/// arguments.
///
/// ```rust
/// use faultreport_backtrace::short_name;
///
/// assert_eq!(short_name("core::num::error::ParseIntError"), "ParseIntError");
/// assert_eq!(short_name("my_app::Wrapper<alloc::string::String>"), "Wrapper");
/// assert_eq!(short_name("my_app::main::{{closure}}"), "{{closure}}");
/// ```
pub fn short_name(path: &str) -> &str {
    let bytes = path.as_bytes();
    let mut depth = 0usize;
    let mut start = 0;
    let mut end = path.len();

    let mut index = 0;
    while index < bytes.len() {
        match bytes[index] {
            b'<' => {
                // A leading `<` opens a qualified path, not generic arguments.
                if depth == 0 && index > start {
                    end = index;
                }
                depth += 1;
            }
            // The `>` of `->` closes nothing.
            b'>' if index > 0 && bytes[index - 1] == b'-' => {}
            b'>' => depth = depth.saturating_sub(1),
            b':' if depth == 0 && bytes.get(index + 1) == Some(&b':') => {
                index += 1;
                start = index + 1;
                end = path.len();
            }
            _ => {}
        }
        index += 1;
    }

    &path[start..end]
}

/// Symbols of the C runtime start-up code that end every native trace.
pub(crate) fn is_runtime_entry(symbol: &str, raw_path: &str) -> bool {
    symbol == "__libc_start_call_main"
        || symbol == "__libc_start_main_impl"
        || (symbol == "_start" && raw_path.contains("zig/libc/glibc"))
}
