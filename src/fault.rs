use std::error::Error;

use faultreport_backtrace::{RawTrace, short_name};

use crate::{AnnotationValue, Annotations};

/// The name given to faults created from a plain message.
const MESSAGE_FAULT_NAME: &str = "Error";

/// The thing a report describes: an error value or a plain message.
///
/// Both kinds are normalized into the same shape: a name, a message, the
/// chain of underlying error messages and the stack trace captured when the
/// fault was created. Only errors contribute a classifier to the report.
///
/// ```
/// use faultreport::Fault;
///
/// let error = "x".parse::<u32>().unwrap_err();
/// let fault = Fault::from_error(&error);
/// assert_eq!(fault.name(), "ParseIntError");
/// assert!(fault.is_error());
///
/// let fault = Fault::from("cache miss storm");
/// assert_eq!(fault.name(), "Error");
/// assert!(!fault.is_error());
/// ```
#[derive(Clone, Debug)]
pub struct Fault {
    is_error: bool,
    name: String,
    message: String,
    sources: Vec<String>,
    trace: RawTrace,
}

impl Fault {
    /// Creates a fault from an error value, capturing the current stack.
    ///
    /// The name is the unqualified type name of `E`; use
    /// [`with_name`](Self::with_name) when `E` is a type-erased wrapper.
    #[inline(never)]
    pub fn from_error<E: Error + ?Sized>(error: &E) -> Self {
        let mut sources = Vec::new();
        let mut source = error.source();
        while let Some(current) = source {
            sources.push(current.to_string());
            source = current.source();
        }

        Self {
            is_error: true,
            name: short_name(std::any::type_name::<E>()).to_owned(),
            message: error.to_string(),
            sources,
            trace: RawTrace::capture(),
        }
    }

    /// Creates a fault from a plain message, capturing the current stack.
    #[inline(never)]
    pub fn from_message(message: impl Into<String>) -> Self {
        Self {
            is_error: false,
            name: MESSAGE_FAULT_NAME.to_owned(),
            message: message.into(),
            sources: Vec::new(),
            trace: RawTrace::capture(),
        }
    }

    /// Overrides the name of the fault.
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Replaces the captured stack trace, for faults observed elsewhere.
    pub fn with_trace(mut self, trace: RawTrace) -> Self {
        self.trace = trace;
        self
    }

    /// The name of the fault.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The message of the fault.
    pub fn message(&self) -> &str {
        &self.message
    }

    /// Messages of the errors underlying this one, outermost first.
    pub fn sources(&self) -> &[String] {
        &self.sources
    }

    /// Whether the fault was created from an error value.
    pub fn is_error(&self) -> bool {
        self.is_error
    }

    /// The stack trace captured with the fault.
    pub fn trace(&self) -> &RawTrace {
        &self.trace
    }

    pub(crate) fn classifiers(&self) -> Vec<String> {
        if self.is_error {
            vec![self.name.clone()]
        } else {
            Vec::new()
        }
    }

    /// The `Error` annotation; only error faults have one.
    pub(crate) fn annotation(&self) -> Option<AnnotationValue> {
        if !self.is_error {
            return None;
        }
        let mut fields = Annotations::new();
        fields.insert("name".to_owned(), self.name.as_str().into());
        fields.insert("message".to_owned(), self.message.as_str().into());
        fields.insert(
            "sources".to_owned(),
            AnnotationValue::list(self.sources.iter().map(String::as_str)),
        );
        Some(AnnotationValue::Map(fields))
    }
}

impl Default for Fault {
    fn default() -> Self {
        Self::from_message("")
    }
}

impl From<&str> for Fault {
    fn from(message: &str) -> Self {
        Self::from_message(message)
    }
}

impl From<String> for Fault {
    fn from(message: String) -> Self {
        Self::from_message(message)
    }
}
