//! Asynchronous front for a `DocumentCore`.
//!
//! The worker owns the core and runs one command at a time, each to
//! fixpoint, so concurrent callers never observe a half-applied update.
//! Handles are cheap to clone; every call is a message plus a oneshot
//! reply.

use crate::document::DocumentCore;
use crate::engine::diagnostics::Diagnostic;
use crate::error::CoreError;
use crate::orchestrator::{UpdateOptions, UpdateOutcome, ValueRequest, VariableValue};
use crate::value::Value;
use futures_channel::{mpsc, oneshot};
use futures_util::{SinkExt, StreamExt};
use std::fmt;

/// Pending commands before senders wait.
const COMMAND_CAPACITY: usize = 16;

#[derive(Debug, Clone, PartialEq)]
pub enum ServiceError {
    /// The worker has stopped.
    Closed,
    Core(CoreError),
}

impl fmt::Display for ServiceError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Closed => write!(f, "document worker stopped"),
            Self::Core(error) => write!(f, "{error}"),
        }
    }
}

impl std::error::Error for ServiceError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Closed => None,
            Self::Core(error) => Some(error),
        }
    }
}

impl From<CoreError> for ServiceError {
    fn from(error: CoreError) -> Self {
        Self::Core(error)
    }
}

enum Command {
    Resolve {
        component: String,
        variable: String,
        reply: oneshot::Sender<Result<Value, CoreError>>,
    },
    RequestValue {
        component: String,
        variable: String,
        value: Value,
        options: UpdateOptions,
        reply: oneshot::Sender<Result<UpdateOutcome, CoreError>>,
    },
    RequestValues {
        requests: Vec<ValueRequest>,
        options: UpdateOptions,
        reply: oneshot::Sender<Result<UpdateOutcome, CoreError>>,
    },
    PerformAction {
        component: String,
        action: String,
        args: Value,
        options: UpdateOptions,
        reply: oneshot::Sender<Result<UpdateOutcome, CoreError>>,
    },
    RendererState {
        reply: oneshot::Sender<Result<Vec<VariableValue>, CoreError>>,
    },
    Diagnostics {
        reply: oneshot::Sender<Vec<Diagnostic>>,
    },
}

/// Split a core into a handle for callers and the worker that drives it.
pub fn channel(core: DocumentCore) -> (CoreHandle, CoreWorker) {
    let (commands, receiver) = mpsc::channel(COMMAND_CAPACITY);
    (CoreHandle { commands }, CoreWorker { core, receiver })
}

pub struct CoreWorker {
    core: DocumentCore,
    receiver: mpsc::Receiver<Command>,
}

impl CoreWorker {
    /// Serve commands until every handle is dropped, then hand the core
    /// back.
    pub async fn run(mut self) -> DocumentCore {
        let mut served = 0usize;
        while let Some(command) = self.receiver.next().await {
            self.handle(command);
            served += 1;
        }
        log::debug!("document worker stopped after {served} command(s)");
        self.core
    }

    fn handle(&mut self, command: Command) {
        // A dropped reply receiver means the caller gave up; nothing to do.
        let delivered = match command {
            Command::Resolve {
                component,
                variable,
                reply,
            } => reply.send(self.core.resolve(&component, &variable)).is_ok(),
            Command::RequestValue {
                component,
                variable,
                value,
                options,
                reply,
            } => reply
                .send(self.core.request_value(&component, &variable, value, &options))
                .is_ok(),
            Command::RequestValues {
                requests,
                options,
                reply,
            } => reply.send(self.core.request_values(requests, &options)).is_ok(),
            Command::PerformAction {
                component,
                action,
                args,
                options,
                reply,
            } => reply
                .send(self.core.perform_action(&component, &action, args, &options))
                .is_ok(),
            Command::RendererState { reply } => reply.send(self.core.resolve_renderer_state()).is_ok(),
            Command::Diagnostics { reply } => reply
                .send(self.core.diagnostics().entries().cloned().collect())
                .is_ok(),
        };
        if !delivered {
            log::trace!("caller dropped before its reply");
        }
    }
}

#[derive(Clone)]
pub struct CoreHandle {
    commands: mpsc::Sender<Command>,
}

impl CoreHandle {
    async fn call<T>(&self, command: impl FnOnce(oneshot::Sender<T>) -> Command) -> Result<T, ServiceError> {
        let (reply, response) = oneshot::channel();
        self.commands
            .clone()
            .send(command(reply))
            .await
            .map_err(|_| ServiceError::Closed)?;
        response.await.map_err(|_| ServiceError::Closed)
    }

    pub async fn resolve(&self, component: &str, variable: &str) -> Result<Value, ServiceError> {
        let (component, variable) = (component.to_string(), variable.to_string());
        Ok(self
            .call(|reply| Command::Resolve {
                component,
                variable,
                reply,
            })
            .await??)
    }

    pub async fn request_value(
        &self,
        component: &str,
        variable: &str,
        value: Value,
        options: UpdateOptions,
    ) -> Result<UpdateOutcome, ServiceError> {
        let (component, variable) = (component.to_string(), variable.to_string());
        Ok(self
            .call(|reply| Command::RequestValue {
                component,
                variable,
                value,
                options,
                reply,
            })
            .await??)
    }

    pub async fn request_values(
        &self,
        requests: Vec<ValueRequest>,
        options: UpdateOptions,
    ) -> Result<UpdateOutcome, ServiceError> {
        Ok(self
            .call(|reply| Command::RequestValues {
                requests,
                options,
                reply,
            })
            .await??)
    }

    pub async fn perform_action(
        &self,
        component: &str,
        action: &str,
        args: Value,
        options: UpdateOptions,
    ) -> Result<UpdateOutcome, ServiceError> {
        let (component, action) = (component.to_string(), action.to_string());
        Ok(self
            .call(|reply| Command::PerformAction {
                component,
                action,
                args,
                options,
                reply,
            })
            .await??)
    }

    pub async fn renderer_state(&self) -> Result<Vec<VariableValue>, ServiceError> {
        Ok(self.call(|reply| Command::RendererState { reply }).await??)
    }

    pub async fn diagnostics(&self) -> Result<Vec<Diagnostic>, ServiceError> {
        self.call(|reply| Command::Diagnostics { reply }).await
    }
}
