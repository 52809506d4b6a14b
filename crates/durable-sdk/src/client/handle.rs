//! A handle to one workflow execution: signal, query, cancel, terminate,
//! describe, and the long-polling `result(follow_runs)` tail read, plus
//! handles for in-flight updates and outstanding async activity
//! completions.

use std::collections::HashMap;
use std::sync::Arc;

use tracing::instrument;

use crate::bridge::WorkflowExecution;
use crate::failure::{Failure, FailureConverter};
use crate::interceptor::{ClientOutboundCall, ClientOutboundInterceptorChain};
use crate::payload::{DataConverter, Payload};

use super::error::ClientError;
use super::options::{UpdateLifecycleStage, UpdateOptions};
use super::service::{
    ActivityTaskIdentifier, GetHistoryRequest, HistoryEventAttributes, ServiceError, UpdateWorkflowRequest, UpdateWorkflowResponse,
    WorkflowExecutionDescription, WorkflowService,
};

/// A reference to one workflow execution, following continue-as-new runs
/// as `result()` is awaited if asked to.
pub struct WorkflowHandle<S: WorkflowService> {
    service: Arc<S>,
    data_converter: Arc<DataConverter>,
    failure_converter: Arc<FailureConverter>,
    interceptors: ClientOutboundInterceptorChain,
    workflow_id: String,
    run_id: std::sync::Mutex<String>,
}

impl<S: WorkflowService> WorkflowHandle<S> {
    pub(super) fn new(
        service: Arc<S>,
        data_converter: Arc<DataConverter>,
        failure_converter: Arc<FailureConverter>,
        interceptors: ClientOutboundInterceptorChain,
        execution: WorkflowExecution,
    ) -> Self {
        Self {
            service,
            data_converter,
            failure_converter,
            interceptors,
            workflow_id: execution.workflow_id,
            run_id: std::sync::Mutex::new(execution.run_id),
        }
    }

    pub fn workflow_id(&self) -> &str {
        &self.workflow_id
    }

    pub fn run_id(&self) -> String {
        self.run_id.lock().unwrap().clone()
    }

    fn execution(&self) -> WorkflowExecution {
        WorkflowExecution { workflow_id: self.workflow_id.clone(), run_id: self.run_id() }
    }

    #[instrument(skip(self, input), fields(workflow_id = %self.workflow_id, name = %name))]
    pub async fn signal(&self, name: impl Into<String>, input: Vec<Payload>) -> Result<(), ClientError> {
        let name = name.into();
        let call = ClientOutboundCall::SignalWorkflow { workflow_id: self.workflow_id.clone(), name: name.clone() };
        self.interceptors.before_call(&call);
        let result = self
            .service
            .signal_workflow_execution(self.execution(), name, input, HashMap::new())
            .await
            .map(|_| None)
            .map_err(ClientError::from);
        self.interceptors.after_call(&call, &result);
        result.map(|_| ())
    }

    #[instrument(skip(self, input), fields(workflow_id = %self.workflow_id, name = %name))]
    pub async fn query<T: serde::de::DeserializeOwned>(&self, name: impl Into<String>, input: Vec<Payload>) -> Result<T, ClientError> {
        let name = name.into();
        let call = ClientOutboundCall::QueryWorkflow { workflow_id: self.workflow_id.clone(), name: name.clone() };
        self.interceptors.before_call(&call);
        let outcome = self.service.query_workflow(self.execution(), name, input, HashMap::new()).await;
        let interceptor_view: Result<Option<Payload>, ClientError> = match &outcome {
            Ok(Ok(payload)) => Ok(Some(payload.clone())),
            Ok(Err(failure)) => Err(ClientError::WorkflowFailed(failure.clone())),
            Err(_) => Err(ClientError::Service(ServiceError::Transport("query_workflow failed".to_string()))),
        };
        self.interceptors.after_call(&call, &interceptor_view);
        match outcome.map_err(ClientError::from)? {
            Ok(payload) => self.data_converter.from_payload(&payload, "query.result").map_err(ClientError::from),
            Err(failure) => Err(ClientError::WorkflowFailed(failure)),
        }
    }

    #[instrument(skip(self), fields(workflow_id = %self.workflow_id))]
    pub async fn cancel(&self) -> Result<(), ClientError> {
        let call = ClientOutboundCall::CancelWorkflow { workflow_id: self.workflow_id.clone() };
        self.interceptors.before_call(&call);
        let result = self.service.request_cancel_workflow_execution(self.execution()).await.map(|_| None).map_err(ClientError::from);
        self.interceptors.after_call(&call, &result);
        result.map(|_| ())
    }

    #[instrument(skip(self, details), fields(workflow_id = %self.workflow_id))]
    pub async fn terminate(&self, reason: impl Into<String>, details: Vec<Payload>) -> Result<(), ClientError> {
        let call = ClientOutboundCall::TerminateWorkflow { workflow_id: self.workflow_id.clone() };
        self.interceptors.before_call(&call);
        let result = self
            .service
            .terminate_workflow_execution(self.execution(), reason.into(), details)
            .await
            .map(|_| None)
            .map_err(ClientError::from);
        self.interceptors.after_call(&call, &result);
        result.map(|_| ())
    }

    pub async fn describe(&self) -> Result<WorkflowExecutionDescription, ClientError> {
        self.service.describe_workflow_execution(self.execution()).await.map_err(ClientError::from)
    }

    /// Fetch raw history events without interpreting them.
    pub async fn fetch_history_events(
        &self,
        wait_new_event: bool,
        next_page_token: Option<Vec<u8>>,
    ) -> Result<(Vec<crate::client::service::HistoryEvent>, Option<Vec<u8>>), ClientError> {
        let response = self
            .service
            .get_workflow_execution_history(GetHistoryRequest {
                execution: self.execution(),
                wait_new_event,
                close_event_only: false,
                next_page_token,
            })
            .await?;
        Ok((response.events, response.next_page_token))
    }

    /// Long-poll the history tail until a terminal event resolves this
    /// execution's result, optionally following continue-as-new runs.
    #[instrument(skip(self), fields(workflow_id = %self.workflow_id))]
    pub async fn result<T: serde::de::DeserializeOwned>(&self, follow_runs: bool) -> Result<T, ClientError> {
        loop {
            let response = self
                .service
                .get_workflow_execution_history(GetHistoryRequest {
                    execution: self.execution(),
                    wait_new_event: true,
                    close_event_only: true,
                    next_page_token: None,
                })
                .await?;

            for event in response.events {
                match event.attributes {
                    HistoryEventAttributes::WorkflowExecutionCompleted { result, new_execution_run_id } => {
                        match new_execution_run_id {
                            Some(next_run) if follow_runs => {
                                *self.run_id.lock().unwrap() = next_run;
                                continue;
                            }
                            _ => return self.data_converter.from_payload(&result, "result").map_err(ClientError::from),
                        }
                    }
                    HistoryEventAttributes::WorkflowExecutionFailed { failure, new_execution_run_id } => {
                        match new_execution_run_id {
                            Some(next_run) if follow_runs => {
                                *self.run_id.lock().unwrap() = next_run;
                                continue;
                            }
                            _ => return Err(ClientError::WorkflowFailed(self.decode_cause(failure))),
                        }
                    }
                    HistoryEventAttributes::WorkflowExecutionContinuedAsNew { new_execution_run_id } => {
                        if follow_runs {
                            *self.run_id.lock().unwrap() = new_execution_run_id;
                            continue;
                        }
                        return Err(ClientError::WorkflowContinuedAsNew(new_execution_run_id));
                    }
                    HistoryEventAttributes::WorkflowExecutionTimedOut => {
                        return Err(ClientError::WorkflowFailed(Failure::application(
                            "TimeoutError",
                            "workflow execution timed out",
                        )));
                    }
                    HistoryEventAttributes::WorkflowExecutionCanceled { details } => {
                        let mut failure = Failure::cancelled("workflow execution was canceled");
                        if let Some(first) = details.first() {
                            failure = failure.with_source(format!("{first:?}"));
                        }
                        return Err(ClientError::WorkflowFailed(failure));
                    }
                    HistoryEventAttributes::WorkflowExecutionTerminated { reason, .. } => {
                        return Err(ClientError::WorkflowFailed(Failure::application("TerminatedError", reason)));
                    }
                    HistoryEventAttributes::Other => return Err(ClientError::UnknownCloseEvent),
                }
            }
        }
    }

    fn decode_cause(&self, failure: Failure) -> Failure {
        self.failure_converter.decode(failure).unwrap_or_else(|_| Failure::application("DataConverterError", "failed to decode failure attributes"))
    }

    #[instrument(skip(self, input), fields(workflow_id = %self.workflow_id, name = %name))]
    pub async fn start_update(&self, name: impl Into<String>, input: Vec<Payload>, options: UpdateOptions) -> Result<UpdateHandle<S>, ClientError> {
        let name = name.into();
        let update_id = uuid::Uuid::now_v7().to_string();
        let call = ClientOutboundCall::UpdateWorkflow { workflow_id: self.workflow_id.clone(), name: name.clone() };
        self.interceptors.before_call(&call);
        let response = self
            .service
            .update_workflow_execution(UpdateWorkflowRequest {
                execution: self.execution(),
                name,
                update_id: update_id.clone(),
                input,
                headers: HashMap::new(),
                options,
            })
            .await
            .map_err(ClientError::from);
        let interceptor_view: Result<Option<Payload>, ClientError> = match &response {
            Ok(_) => Ok(None),
            Err(_) => Err(ClientError::Service(ServiceError::Transport("update_workflow_execution failed".to_string()))),
        };
        self.interceptors.after_call(&call, &interceptor_view);
        response?;
        Ok(UpdateHandle {
            service: self.service.clone(),
            data_converter: self.data_converter.clone(),
            execution: self.execution(),
            update_id,
        })
    }

    pub async fn execute_update<T: serde::de::DeserializeOwned>(
        &self,
        name: impl Into<String>,
        input: Vec<Payload>,
    ) -> Result<T, ClientError> {
        let handle = self.start_update(name, input, UpdateOptions { wait_for_stage: UpdateLifecycleStage::Completed }).await?;
        handle.result().await
    }
}

/// A reference to an in-flight (or already-resolved) workflow update.
pub struct UpdateHandle<S: WorkflowService> {
    service: Arc<S>,
    data_converter: Arc<DataConverter>,
    execution: WorkflowExecution,
    update_id: String,
}

impl<S: WorkflowService> UpdateHandle<S> {
    pub fn update_id(&self) -> &str {
        &self.update_id
    }

    /// Poll until the update resolves, then decode its outcome.
    pub async fn result<T: serde::de::DeserializeOwned>(&self) -> Result<T, ClientError> {
        loop {
            match self.service.poll_update_workflow_execution(self.execution.clone(), self.update_id.clone()).await? {
                UpdateWorkflowResponse::Completed(Ok(payload)) => return self.data_converter.from_payload(&payload, "update.result").map_err(ClientError::from),
                UpdateWorkflowResponse::Completed(Err(failure)) => return Err(ClientError::WorkflowFailed(failure)),
                UpdateWorkflowResponse::Accepted | UpdateWorkflowResponse::Rejected(_) => continue,
            }
        }
    }
}

/// A reference to an async-completed activity task, identified either by
/// its task token or by `(workflow execution, activity id)`, for use after
/// an activity returns [`crate::worker::ActivityError::CompleteAsync`].
pub struct AsyncActivityHandle<S: WorkflowService> {
    service: Arc<S>,
    failure_converter: Arc<FailureConverter>,
    id: ActivityTaskIdentifier,
}

impl<S: WorkflowService> AsyncActivityHandle<S> {
    pub fn by_id(service: Arc<S>, failure_converter: Arc<FailureConverter>, execution: WorkflowExecution, activity_id: impl Into<String>) -> Self {
        Self { service, failure_converter, id: ActivityTaskIdentifier::ById { workflow_execution: execution, activity_id: activity_id.into() } }
    }

    pub async fn heartbeat(&self, details: Vec<Payload>) -> Result<crate::bridge::HeartbeatResponse, ClientError> {
        self.service.record_activity_task_heartbeat_by_id(self.id.clone(), details).await.map_err(ClientError::from)
    }

    pub async fn complete(&self, result: Payload) -> Result<(), ClientError> {
        self.service.respond_activity_task_completed_by_id(self.id.clone(), result).await.map_err(ClientError::from)
    }

    pub async fn fail(&self, failure: Failure) -> Result<(), ClientError> {
        let encoded = self.failure_converter.encode(failure).map_err(ClientError::from)?;
        self.service.respond_activity_task_failed_by_id(self.id.clone(), encoded).await.map_err(ClientError::from)
    }

    pub async fn report_cancellation(&self, details: Vec<Payload>) -> Result<(), ClientError> {
        self.service.respond_activity_task_canceled_by_id(self.id.clone(), details).await.map_err(ClientError::from)
    }
}
