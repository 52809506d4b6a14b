//! The `Workflow` trait and its type-erased registry. A workflow type
//! exposes a static `descriptor()` carrying its `run` function; signal,
//! query, and update handlers are registered dynamically from inside `run`
//! via [`super::context::WfContext`] rather than discovered by reflection.

use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::rc::Rc;

use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::payload::{DataConverter, Payload, PayloadError};

use super::context::{WfContext, WorkflowInfo};
use super::WorkflowError;

type LocalBoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + 'a>>;

/// A concrete workflow implementation.
///
/// `descriptor()` is called once per execution (not cached across runs) so
/// it can close over fresh per-run state; the function pointer it returns
/// is what the state machine actually invokes.
pub trait Workflow: 'static {
    const WORKFLOW_TYPE: &'static str;
    type Input: DeserializeOwned + 'static;
    type Output: Serialize + 'static;

    fn descriptor() -> WorkflowDescriptor<Self>
    where
        Self: Sized;
}

/// The function pointer a workflow type hands the state machine: given a
/// context and decoded input, produce the future driving the run to
/// completion.
pub struct WorkflowDescriptor<W: Workflow> {
    run: Rc<dyn Fn(WfContext, W::Input) -> LocalBoxFuture<'static, Result<W::Output, WorkflowError>>>,
}

impl<W: Workflow> WorkflowDescriptor<W> {
    pub fn new<F, Fut>(run: F) -> Self
    where
        F: Fn(WfContext, W::Input) -> Fut + 'static,
        Fut: Future<Output = Result<W::Output, WorkflowError>> + 'static,
    {
        Self { run: Rc::new(move |ctx, input| Box::pin(run(ctx, input))) }
    }
}

/// Error constructing or running a registered workflow entry: unknown type,
/// or an input/output payload failed to (de)serialize.
#[derive(Debug, thiserror::Error)]
pub enum WorkflowRegistryError {
    #[error("workflow type {0} is not registered")]
    UnknownWorkflowType(String),

    #[error(transparent)]
    Payload(#[from] PayloadError),
}

/// A type-erased entry: given a context, the raw input payloads, and the
/// data converter, build the boxed future that runs the workflow and
/// serializes its eventual output back into a `Payload`.
trait ErasedEntry {
    fn spawn_run(
        &self,
        ctx: WfContext,
        input: Vec<Payload>,
        data_converter: &DataConverter,
    ) -> Result<LocalBoxFuture<'static, Result<Payload, WorkflowError>>, WorkflowRegistryError>;
}

struct Entry<W: Workflow> {
    descriptor: WorkflowDescriptor<W>,
}

impl<W: Workflow> ErasedEntry for Entry<W> {
    fn spawn_run(
        &self,
        ctx: WfContext,
        input: Vec<Payload>,
        data_converter: &DataConverter,
    ) -> Result<LocalBoxFuture<'static, Result<Payload, WorkflowError>>, WorkflowRegistryError> {
        let decoded: W::Input = match input.first() {
            Some(payload) => data_converter.from_payload(payload, "input.0")?,
            None => {
                let null_payload = Payload::with_encoding("binary/null", Vec::new());
                data_converter.from_payload(&null_payload, "input.0")?
            }
        };

        let run = self.descriptor.run.clone();
        let data_converter = data_converter.clone();
        Ok(Box::pin(async move {
            let output = (run)(ctx, decoded).await?;
            let payload = data_converter
                .to_payload(&output, "output")
                .map_err(|e| WorkflowError::Failure(crate::failure::Failure::application(
                    "DataConverterError",
                    e.to_string(),
                )))?;
            Ok(payload)
        }))
    }
}

/// Maps workflow type names to registered [`Workflow`] implementations,
/// consulted by the workflow worker on `initialize_workflow`.
#[derive(Default)]
pub struct WorkflowRegistry {
    entries: HashMap<String, Box<dyn ErasedEntry>>,
}

impl WorkflowRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register<W: Workflow>(&mut self) {
        self.entries.insert(
            W::WORKFLOW_TYPE.to_string(),
            Box::new(Entry { descriptor: W::descriptor() }),
        );
    }

    pub fn is_registered(&self, workflow_type: &str) -> bool {
        self.entries.contains_key(workflow_type)
    }

    pub(crate) fn spawn_run(
        &self,
        workflow_type: &str,
        ctx: WfContext,
        input: Vec<Payload>,
        data_converter: &DataConverter,
    ) -> Result<LocalBoxFuture<'static, Result<Payload, WorkflowError>>, WorkflowRegistryError> {
        let entry = self
            .entries
            .get(workflow_type)
            .ok_or_else(|| WorkflowRegistryError::UnknownWorkflowType(workflow_type.to_string()))?;
        entry.spawn_run(ctx, input, data_converter)
    }
}

// Re-exported so downstream code can name it without importing `context`.
pub use super::context::WfContext as Context;
pub type Info = WorkflowInfo;

</content>
