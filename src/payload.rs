use faultreport_backtrace::{Frame, ModuleDescriptor, SourceExcerpt, StackTrace, SymbolicationEntry};
use faultreport_telemetry::TelemetrySource;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use crate::{
    AnnotationValue, Annotations, Attributes, Fault, ReportError, SymbolicationMode,
};

/// The name of the only thread of a report.
pub(crate) const MAIN_THREAD: &str = "main";

/// A finalized report, ready to be sent.
///
/// The payload is a snapshot: it owns all its data and is unaffected by
/// later changes to the report it came from. Its JSON form is the wire
/// format of the aggregation service.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Payload {
    /// The report identifier.
    pub uuid: String,
    /// Seconds since the Unix epoch at which the report was created.
    pub timestamp: i64,
    /// Always `"rust"`.
    pub lang: String,
    /// The compiler version.
    #[serde(rename = "langVersion")]
    pub lang_version: String,
    /// The key of the faulting thread in [`threads`](Self::threads).
    #[serde(rename = "mainThread")]
    pub main_thread: String,
    /// The fault classifiers.
    pub classifiers: Vec<String>,
    /// The stacks of the reported threads.
    pub threads: IndexMap<String, Thread>,
    /// Always `"faultreport"`.
    pub agent: String,
    /// The version of this crate.
    #[serde(rename = "agentVersion")]
    pub agent_version: String,
    /// Built-in and caller annotations.
    pub annotations: Annotations,
    /// Built-in and caller attributes.
    pub attributes: Attributes,
    /// Source excerpts, keyed by file path.
    #[serde(rename = "sourceCode")]
    pub source_code: IndexMap<String, SourceExcerpt>,
    /// Symbol map identifiers.
    pub symbolication_maps: Vec<SymbolicationEntry>,
    /// Present only when symbolication is active.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub symbolication: Option<SymbolicationMode>,
}

impl Payload {
    /// Encodes the payload as JSON.
    ///
    /// # Errors
    ///
    /// Fails only if a value cannot be represented in JSON.
    pub fn to_json(&self) -> Result<String, ReportError> {
        Ok(serde_json::to_string(self)?)
    }
}

/// The stack of one thread.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Thread {
    /// The thread name.
    pub name: String,
    /// Whether this thread raised the fault.
    pub fault: bool,
    /// The frames, innermost first.
    pub stack: Vec<Frame>,
}

/// Merges built-in and caller attributes; later sources win.
///
/// Memory information, process status, system attributes, fault attributes,
/// calling module attributes, caller attributes.
pub(crate) fn merge_attributes(
    telemetry: Attributes,
    fault: &Fault,
    module: Option<&ModuleDescriptor>,
    caller: &Attributes,
) -> Attributes {
    let mut attributes = telemetry;
    attributes.insert("error.message".to_owned(), fault.message().into());
    if let Some(module) = module {
        attributes.extend(module_attributes(module));
    }
    attributes.extend(caller.iter().map(|(key, value)| (key.clone(), value.clone())));
    attributes
}

/// Reads the three telemetry maps in merge order.
pub(crate) fn collect_telemetry(telemetry: &dyn TelemetrySource) -> Attributes {
    let mut attributes = telemetry.read_memory_information();
    attributes.extend(telemetry.read_process_status());
    attributes.extend(telemetry.read_system_attributes());
    attributes
}

fn module_attributes(module: &ModuleDescriptor) -> Attributes {
    let mut attributes = Attributes::new();
    attributes.insert("application".to_owned(), module.name.as_str().into());
    if let Some(version) = &module.version {
        attributes.insert("application.version".to_owned(), version.as_str().into());
    }
    if let Some(description) = &module.description {
        attributes.insert("application.description".to_owned(), description.as_str().into());
    }
    if !module.authors.is_empty() {
        attributes.insert("application.author".to_owned(), module.authors.join(", ").into());
    }
    if let Some(repository) = &module.repository {
        attributes.insert("application.repository".to_owned(), repository.as_str().into());
    }
    attributes
}

/// Merges built-in and caller annotations; caller annotations win.
pub(crate) fn merge_annotations(fault: &Fault, caller: &Annotations) -> Annotations {
    let mut annotations = Annotations::new();
    annotations.insert(
        "Environment Variables".to_owned(),
        AnnotationValue::map(std::env::vars_os().map(|(key, value)| {
            (
                key.to_string_lossy().into_owned(),
                value.to_string_lossy().into_owned(),
            )
        })),
    );
    annotations.insert(
        "Exec Arguments".to_owned(),
        AnnotationValue::list(std::env::args_os().map(|arg| arg.to_string_lossy().into_owned())),
    );
    if let Some(error) = fault.annotation() {
        annotations.insert("Error".to_owned(), error);
    }
    annotations.extend(caller.iter().map(|(key, value)| (key.clone(), value.clone())));
    annotations
}

/// The `threads` field for a single faulting main thread.
pub(crate) fn main_thread(stack_trace: &mut StackTrace) -> IndexMap<String, Thread> {
    let mut threads = IndexMap::new();
    threads.insert(
        MAIN_THREAD.to_owned(),
        Thread {
            name: MAIN_THREAD.to_owned(),
            fault: true,
            stack: std::mem::take(&mut stack_trace.frames),
        },
    );
    threads
}

#[cfg(test)]
mod tests {
    use super::*;

    fn telemetry() -> Attributes {
        let mut attributes = Attributes::new();
        attributes.insert("a".to_owned(), 2.into());
        attributes.insert("vm.rss.size".to_owned(), 4096.into());
        attributes.insert("application".to_owned(), "from-telemetry".into());
        attributes
    }

    #[test]
    fn test_caller_attributes_win() {
        let mut caller = Attributes::new();
        caller.insert("a".to_owned(), 1.into());
        caller.insert("error.message".to_owned(), "overridden".into());

        let merged = merge_attributes(telemetry(), &Fault::from("boom"), None, &caller);
        assert_eq!(merged["a"].as_i64(), Some(1));
        assert_eq!(merged["error.message"].as_str(), Some("overridden"));
        assert_eq!(merged["vm.rss.size"].as_i64(), Some(4096));
    }

    #[test]
    fn test_module_attributes() {
        let module = ModuleDescriptor {
            name: "billing".to_owned(),
            version: Some("2.0.0".to_owned()),
            description: None,
            authors: vec!["Ada".to_owned(), "Grace".to_owned()],
            repository: Some("https://example.com/billing".to_owned()),
        };
        let merged = merge_attributes(
            telemetry(),
            &Fault::from("boom"),
            Some(&module),
            &Attributes::new(),
        );
        assert_eq!(merged["application"].as_str(), Some("billing"));
        assert_eq!(merged["application.version"].as_str(), Some("2.0.0"));
        assert_eq!(merged["application.author"].as_str(), Some("Ada, Grace"));
        assert!(!merged.contains_key("application.description"));
        assert_eq!(merged["error.message"].as_str(), Some("boom"));
    }

    #[test]
    fn test_builtin_annotations() {
        let annotations = merge_annotations(&Fault::from("boom"), &Annotations::new());
        assert_eq!(
            annotations.keys().collect::<Vec<_>>(),
            ["Environment Variables", "Exec Arguments"]
        );
        assert!(annotations.values().all(AnnotationValue::is_structured));
    }

    #[test]
    fn test_caller_annotations_win() {
        let error = std::io::Error::other("disk gone");
        let mut caller = Annotations::new();
        caller.insert("Error".to_owned(), AnnotationValue::list(["custom"]));

        let annotations = merge_annotations(&Fault::from_error(&error), &caller);
        assert_eq!(annotations["Error"], AnnotationValue::list(["custom"]));
    }

    #[test]
    fn test_main_thread() {
        let mut stack_trace = StackTrace {
            frames: vec![Frame {
                function: None,
                library: "/srv/app/src/main.rs".to_owned(),
                line: Some(1),
                column: None,
                source_code: None,
                debug_identifier: None,
            }],
            ..StackTrace::default()
        };
        let threads = main_thread(&mut stack_trace);
        assert!(stack_trace.frames.is_empty());
        let thread = &threads[MAIN_THREAD];
        assert!(thread.fault);
        assert_eq!(thread.name, "main");
        assert_eq!(thread.stack.len(), 1);
    }
}
