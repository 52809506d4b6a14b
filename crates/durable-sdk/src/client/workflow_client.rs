//! The top-level client surface: start/execute workflows, hand out
//! handles, stream visibility queries, and the thin schedule CRUD surface,
//! all routed through a [`WorkflowService`] and wrapped with the
//! [`ClientOutboundInterceptorChain`].

use std::collections::HashMap;
use std::sync::Arc;

use tracing::instrument;

use crate::bridge::WorkflowExecution;
use crate::failure::FailureConverter;
use crate::interceptor::{ClientOutboundCall, ClientOutboundInterceptorChain};
use crate::payload::{DataConverter, Payload};

use super::error::ClientError;
use super::handle::{AsyncActivityHandle, WorkflowHandle};
use super::options::{ClientOptions, WorkflowStartOptions};
use super::paginated::PaginatedStream;
use super::schedule::{CreateScheduleRequest, Schedule, ScheduleListEntry};
use super::service::{
    ListWorkflowsRequest, StartWorkflowRequest, WorkflowExecutionSummary, WorkflowService,
};

/// A client for one namespace, backed by a [`WorkflowService`] connection.
pub struct WorkflowClient<S: WorkflowService> {
    service: Arc<S>,
    options: ClientOptions,
    data_converter: Arc<DataConverter>,
    failure_converter: Arc<FailureConverter>,
    interceptors: ClientOutboundInterceptorChain,
}

impl<S: WorkflowService> WorkflowClient<S> {
    pub fn new(service: Arc<S>, options: ClientOptions, data_converter: Arc<DataConverter>) -> Self {
        let failure_converter = Arc::new(FailureConverter::new(data_converter.clone()));
        Self { service, options, data_converter, failure_converter, interceptors: ClientOutboundInterceptorChain::default() }
    }

    pub fn with_interceptors(mut self, interceptors: ClientOutboundInterceptorChain) -> Self {
        self.interceptors = interceptors;
        self
    }

    pub fn with_failure_converter(mut self, failure_converter: Arc<FailureConverter>) -> Self {
        self.failure_converter = failure_converter;
        self
    }

    pub fn options(&self) -> &ClientOptions {
        &self.options
    }

    #[instrument(skip(self, input), fields(namespace = %self.options.namespace, workflow_type = %workflow_type.as_ref()))]
    pub async fn start(
        &self,
        workflow_type: impl AsRef<str>,
        options: WorkflowStartOptions,
        input: Vec<Payload>,
    ) -> Result<WorkflowHandle<S>, ClientError> {
        let workflow_type = workflow_type.as_ref().to_string();
        let call = ClientOutboundCall::StartWorkflow { workflow_type: workflow_type.clone(), workflow_id: options.id.clone() };
        self.interceptors.before_call(&call);

        let response = self
            .service
            .start_workflow_execution(StartWorkflowRequest { workflow_type, options: options.clone(), input, headers: HashMap::new() })
            .await
            .map_err(ClientError::from);

        let interceptor_view: Result<Option<Payload>, ClientError> = match &response {
            Ok(_) => Ok(None),
            Err(_) => Err(ClientError::Service(super::service::ServiceError::Transport("start_workflow_execution failed".to_string()))),
        };
        self.interceptors.after_call(&call, &interceptor_view);

        let response = response?;
        Ok(WorkflowHandle::new(
            self.service.clone(),
            self.data_converter.clone(),
            self.failure_converter.clone(),
            self.interceptors.clone(),
            WorkflowExecution { workflow_id: options.id, run_id: response.run_id },
        ))
    }

    /// Start + await result, following continue-as-new runs transparently.
    pub async fn execute<T: serde::de::DeserializeOwned>(
        &self,
        workflow_type: impl AsRef<str>,
        options: WorkflowStartOptions,
        input: Vec<Payload>,
    ) -> Result<T, ClientError> {
        let handle = self.start(workflow_type, options, input).await?;
        handle.result(true).await
    }

    pub async fn signal_with_start(
        &self,
        workflow_type: impl AsRef<str>,
        options: WorkflowStartOptions,
        input: Vec<Payload>,
        signal_name: impl Into<String>,
        signal_input: Vec<Payload>,
    ) -> Result<WorkflowHandle<S>, ClientError> {
        let workflow_type = workflow_type.as_ref().to_string();
        let response = self
            .service
            .signal_with_start_workflow_execution(
                StartWorkflowRequest { workflow_type, options: options.clone(), input, headers: HashMap::new() },
                signal_name.into(),
                signal_input,
            )
            .await
            .map_err(ClientError::from)?;
        Ok(WorkflowHandle::new(
            self.service.clone(),
            self.data_converter.clone(),
            self.failure_converter.clone(),
            self.interceptors.clone(),
            WorkflowExecution { workflow_id: options.id, run_id: response.run_id },
        ))
    }

    /// A handle to an execution without contacting the server: `run_id`
    /// empty means "the current run" and is resolved lazily by whatever
    /// call needs it.
    pub fn handle_for(&self, workflow_id: impl Into<String>, run_id: impl Into<String>) -> WorkflowHandle<S> {
        WorkflowHandle::new(
            self.service.clone(),
            self.data_converter.clone(),
            self.failure_converter.clone(),
            self.interceptors.clone(),
            WorkflowExecution { workflow_id: workflow_id.into(), run_id: run_id.into() },
        )
    }

    pub fn async_activity_handle(&self, execution: WorkflowExecution, activity_id: impl Into<String>) -> AsyncActivityHandle<S> {
        AsyncActivityHandle::by_id(self.service.clone(), self.failure_converter.clone(), execution, activity_id)
    }

    /// Stream matching executions for a visibility query string, as a
    /// lazily-paginated async sequence.
    pub fn list(&self, query: impl Into<String>) -> PaginatedStream<WorkflowExecutionSummary> {
        let service = self.service.clone();
        let query = query.into();
        PaginatedStream::new(Box::new(move |token| {
            let service = service.clone();
            let query = query.clone();
            Box::pin(async move {
                let response = service
                    .list_workflow_executions(ListWorkflowsRequest { query, next_page_token: token })
                    .await
                    .map_err(ClientError::from)?;
                Ok((response.executions, response.next_page_token))
            })
        }))
    }

    pub async fn count(&self, query: impl Into<String>) -> Result<i64, ClientError> {
        self.service.count_workflow_executions(query.into()).await.map_err(ClientError::from)
    }

    pub async fn create_schedule(&self, schedule_id: impl Into<String>, schedule: Schedule) -> Result<(), ClientError> {
        self.service
            .create_schedule(CreateScheduleRequest { schedule_id: schedule_id.into(), schedule })
            .await
            .map_err(ClientError::from)
    }

    pub async fn describe_schedule(&self, schedule_id: impl AsRef<str>) -> Result<Schedule, ClientError> {
        self.service.describe_schedule(schedule_id.as_ref()).await.map_err(ClientError::from)
    }

    pub fn list_schedules(&self) -> PaginatedStream<ScheduleListEntry> {
        let service = self.service.clone();
        PaginatedStream::new(Box::new(move |token| {
            let service = service.clone();
            Box::pin(async move { service.list_schedules(token).await.map_err(ClientError::from) })
        }))
    }

    pub async fn delete_schedule(&self, schedule_id: impl AsRef<str>) -> Result<(), ClientError> {
        self.service.delete_schedule(schedule_id.as_ref()).await.map_err(ClientError::from)
    }
}
