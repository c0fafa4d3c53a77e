use std::{marker::PhantomData, path::PathBuf, sync::Arc};

use faultreport_backtrace::{EnvOptions, ParseRequest, SourceCodeOptions, SymbolicationEntry};
use faultreport_telemetry::TelemetrySource;
use serde_json::{Map, Value};

use crate::{
    AnnotationValue, Annotations, AttributeValue, Attributes, Collectors, Fault, Payload,
    ReportError, ValidationError,
    attributes::classify,
    identity::{AGENT_VERSION, LANG_VERSION, current_timestamp, generate_uuid},
    markers::{Mutable, ReportState, Sealed},
    payload::{MAIN_THREAD, collect_telemetry, main_thread, merge_annotations, merge_attributes},
    symbolication::{self, SymbolicationPlan},
};

/// The attribute that names the application; when set by the caller, the
/// calling module is not resolved.
const APPLICATION_ATTRIBUTE: &str = "application";

/// An error report under construction.
///
/// A report has a fixed identity (its uuid and timestamp, chosen at
/// construction), a [`Fault`], caller metadata and attachments. Calling
/// [`finalize`](Self::finalize) collects the stack trace, source code and
/// process telemetry and produces a [`Payload`].
///
/// The state marker `S` is [`Mutable`] for reports that can still be
/// changed and [`Sealed`] for reports that can only be finalized.
///
/// # Examples
///
/// ```
/// use faultreport::Report;
/// use serde_json::json;
///
/// # #[tokio::main(flavor = "current_thread")]
/// # async fn main() -> Result<(), Box<dyn std::error::Error>> {
/// let error = "12a".parse::<u16>().unwrap_err();
/// let mut report = Report::from_error(&error);
/// report.add_attribute("request.id", "f3a1");
/// report.add_object_attributes(json!({"tenant": {"id": 7}}).as_object().cloned().unwrap());
///
/// let payload = report.finalize().await?;
/// assert_eq!(payload.classifiers, ["ParseIntError"]);
/// assert_eq!(payload.attributes["request.id"].as_str(), Some("f3a1"));
/// assert!(payload.annotations.contains_key("tenant"));
/// # Ok(())
/// # }
/// ```
///
/// # Repeated finalization
///
/// Every call to `finalize` runs the whole collection again: telemetry is
/// read afresh and the calling module is resolved again, so two payloads of
/// the same report can differ in those values. The uuid, timestamp and
/// classifiers are the same in both.
///
/// # Cloning
///
/// A clone is the same report: it keeps the uuid and timestamp, so the
/// service deduplicates payloads of a report and its clones. Create a new
/// report with [`Report::new`] for an independent occurrence of a fault.
#[derive(Clone, Debug)]
pub struct Report<S: ReportState = Mutable> {
    uuid: String,
    timestamp: i64,
    fault: Fault,
    classifiers: Vec<String>,
    attributes: Attributes,
    annotations: Annotations,
    attachments: Vec<PathBuf>,
    symbolication: bool,
    symbolication_map: Option<Vec<SymbolicationEntry>>,
    source_code: Option<SourceCodeOptions>,
    collectors: Collectors,
    _state: PhantomData<S>,
}

impl Default for Report<Mutable> {
    fn default() -> Self {
        Self::new(Fault::default(), Map::new(), Vec::<PathBuf>::new())
    }
}

impl Report<Mutable> {
    /// Creates a report for `fault` with caller metadata and attachments.
    ///
    /// The metadata is split into attributes and annotations right away: see
    /// the [`attributes`](crate::attributes) module for the rules.
    pub fn new<P: Into<PathBuf>>(
        fault: impl Into<Fault>,
        metadata: Map<String, Value>,
        attachments: impl IntoIterator<Item = P>,
    ) -> Self {
        let fault = fault.into();
        let classified = classify(metadata);
        Self {
            uuid: generate_uuid(),
            timestamp: current_timestamp(),
            classifiers: fault.classifiers(),
            fault,
            attributes: classified.attributes,
            annotations: classified.annotations,
            attachments: attachments.into_iter().map(Into::into).collect(),
            symbolication: EnvOptions::get().symbolication,
            symbolication_map: None,
            source_code: None,
            collectors: Collectors::new(),
            _state: PhantomData,
        }
    }

    /// Creates a report for an error value, capturing the current stack.
    #[inline(never)]
    pub fn from_error<E: std::error::Error + ?Sized>(error: &E) -> Self {
        Self::new(Fault::from_error(error), Map::new(), Vec::<PathBuf>::new())
    }

    /// Creates a report for a plain message, capturing the current stack.
    #[inline(never)]
    pub fn from_message(message: impl Into<String>) -> Self {
        Self::new(Fault::from_message(message), Map::new(), Vec::<PathBuf>::new())
    }

    /// Adds caller metadata, split into attributes and annotations.
    pub fn with_attributes(mut self, metadata: Map<String, Value>) -> Self {
        self.add_object_attributes(metadata);
        self
    }

    /// Adds files to attach to the report.
    pub fn with_attachments<P: Into<PathBuf>>(mut self, attachments: impl IntoIterator<Item = P>) -> Self {
        self.attachments.extend(attachments.into_iter().map(Into::into));
        self
    }

    /// Replaces the collaborators used by [`finalize`](Self::finalize).
    pub fn with_collectors(mut self, collectors: Collectors) -> Self {
        self.collectors = collectors;
        self
    }

    /// Replaces the fault and recomputes the classifiers.
    pub fn set_fault(&mut self, fault: impl Into<Fault>) {
        self.fault = fault.into();
        self.classifiers = self.fault.classifiers();
    }

    /// Sets an attribute, replacing any previous value.
    pub fn add_attribute(&mut self, key: impl Into<String>, value: impl Into<AttributeValue>) {
        self.attributes.insert(key.into(), value.into());
    }

    /// Sets an annotation, replacing any previous value.
    ///
    /// # Errors
    ///
    /// Returns [`ValidationError::NotStructured`] if `value` is not a mapping
    /// or a sequence.
    pub fn add_annotation(
        &mut self,
        key: impl Into<String>,
        value: impl Into<AnnotationValue>,
    ) -> Result<(), ValidationError> {
        let value = value.into();
        if !value.is_structured() {
            return Err(ValidationError::NotStructured);
        }
        self.annotations.insert(key.into(), value);
        Ok(())
    }

    /// Adds caller metadata, split into attributes and annotations. Existing
    /// keys are replaced.
    pub fn add_object_attributes(&mut self, metadata: Map<String, Value>) {
        classify(metadata).merge_into(&mut self.attributes, &mut self.annotations);
    }

    /// Turns symbolication on or off.
    ///
    /// The default is taken from `FAULTREPORT_BACKTRACE=symbolication`.
    pub fn set_symbolication(&mut self, enabled: bool) {
        self.symbolication = enabled;
    }

    /// Sets the symbol maps of this report explicitly, in place of the ones
    /// the stack trace parser would derive.
    ///
    /// # Errors
    ///
    /// Returns [`ValidationError::MissingField`] if an entry has an empty
    /// `file` or `uuid`; the report is left unchanged.
    pub fn set_symbolication_map(
        &mut self,
        entries: impl IntoIterator<Item = SymbolicationEntry>,
    ) -> Result<(), ValidationError> {
        let entries: Vec<_> = entries.into_iter().collect();
        symbolication::validate(&entries)?;
        self.symbolication_map = Some(entries);
        Ok(())
    }

    /// Like [`set_symbolication_map`](Self::set_symbolication_map), for a map
    /// given as JSON (an array of `{"file": ..., "uuid": ...}` objects).
    ///
    /// # Errors
    ///
    /// Returns [`ValidationError::NotASequence`] if `value` is not an array
    /// and [`ValidationError::MissingField`] if an entry lacks a string
    /// `file` or `uuid`; the report is left unchanged.
    pub fn set_symbolication_map_value(&mut self, value: &Value) -> Result<(), ValidationError> {
        self.symbolication_map = Some(symbolication::parse_map(value)?);
        Ok(())
    }

    /// Sets how source excerpts are cut for this report.
    pub fn set_source_code_options(&mut self, tab_width: usize, context_line_count: usize) {
        self.source_code = Some(SourceCodeOptions {
            tab_width,
            context_line_count,
        });
    }

    /// Freezes the report.
    pub fn seal(self) -> Report<Sealed> {
        Report {
            uuid: self.uuid,
            timestamp: self.timestamp,
            fault: self.fault,
            classifiers: self.classifiers,
            attributes: self.attributes,
            annotations: self.annotations,
            attachments: self.attachments,
            symbolication: self.symbolication,
            symbolication_map: self.symbolication_map,
            source_code: self.source_code,
            collectors: self.collectors,
            _state: PhantomData,
        }
    }
}

impl<S: ReportState> Report<S> {
    /// The report identifier.
    pub fn uuid(&self) -> &str {
        &self.uuid
    }

    /// Seconds since the Unix epoch at which the report was created.
    pub fn timestamp(&self) -> i64 {
        self.timestamp
    }

    /// The fault this report describes.
    pub fn fault(&self) -> &Fault {
        &self.fault
    }

    /// The classifiers derived from the fault.
    pub fn classifiers(&self) -> &[String] {
        &self.classifiers
    }

    /// The caller attributes.
    pub fn attributes(&self) -> &Attributes {
        &self.attributes
    }

    /// The caller annotations.
    pub fn annotations(&self) -> &Annotations {
        &self.annotations
    }

    /// The files attached to the report.
    pub fn attachments(&self) -> &[PathBuf] {
        &self.attachments
    }

    /// Whether the fault is an error rather than a plain message.
    pub fn is_fault_report(&self) -> bool {
        self.fault.is_error()
    }

    /// Collects the stack trace and telemetry and assembles the payload.
    ///
    /// Source files are read asynchronously; symbol resolution, module
    /// lookups and telemetry reads run on Tokio's blocking thread pool.
    /// Unreadable files and unavailable telemetry are left out of the
    /// payload.
    ///
    /// # Errors
    ///
    /// Fails only if a task on the blocking thread pool panicked.
    #[tracing::instrument(level = "debug", skip_all, fields(uuid = %self.uuid))]
    pub async fn finalize(&self) -> Result<Payload, ReportError> {
        let plan = SymbolicationPlan::new(
            self.symbolication,
            &self.attributes,
            self.symbolication_map.is_some(),
        );
        let request = ParseRequest {
            include_symbolication: plan.resolve_frames,
            resolve_calling_module: !self.attributes.contains_key(APPLICATION_ATTRIBUTE),
        };

        let mut parser = self.collectors.parser().clone();
        if let Some(options) = self.source_code {
            parser = parser.with_source_code_options(options);
        }
        let parsed = parser.parse(self.fault.trace().clone(), request).await?;
        let mut stack_trace = parsed.stack_trace;

        let telemetry = read_telemetry(Arc::clone(self.collectors.telemetry())).await?;
        let attributes = merge_attributes(
            telemetry,
            &self.fault,
            parsed.calling_module.as_ref(),
            &self.attributes,
        );
        let annotations = merge_annotations(&self.fault, &self.annotations);
        let plan = plan.with_merged_attributes(&attributes);

        let symbolication_maps = match &self.symbolication_map {
            Some(entries) => entries.clone(),
            None => std::mem::take(&mut stack_trace.symbolication_maps),
        };

        tracing::debug!(
            frames = stack_trace.frames.len(),
            attributes = attributes.len(),
            annotations = annotations.len(),
            symbolication = plan.active,
            "finalized report"
        );

        Ok(Payload {
            uuid: self.uuid.clone(),
            timestamp: self.timestamp,
            lang: "rust".to_owned(),
            lang_version: LANG_VERSION.to_owned(),
            main_thread: MAIN_THREAD.to_owned(),
            classifiers: self.classifiers.clone(),
            threads: main_thread(&mut stack_trace),
            agent: env!("CARGO_PKG_NAME").to_owned(),
            agent_version: AGENT_VERSION.to_owned(),
            annotations,
            attributes,
            source_code: stack_trace.source_code,
            symbolication_maps,
            symbolication: plan.mode(),
        })
    }
}

/// Reads telemetry on the blocking thread pool if a runtime is available.
async fn read_telemetry(telemetry: Arc<dyn TelemetrySource>) -> Result<Attributes, ReportError> {
    match tokio::runtime::Handle::try_current() {
        Ok(handle) => handle
            .spawn_blocking(move || collect_telemetry(&*telemetry))
            .await
            .map_err(ReportError::Telemetry),
        Err(_) => Ok(collect_telemetry(&*telemetry)),
    }
}
