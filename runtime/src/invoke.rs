use std::sync::Arc;

use fnrun_types::{
    ConfigError, FUNCTION_NAME_VAR, FunctionConfig, InvocationId, InvocationRequest,
};
use tracing::Instrument;

use crate::code_dir::CodeDir;
use crate::config::StagingConfig;
use crate::event::StagedEvent;
use crate::{Executor, Invocation, InvocationOutcome, InvokeError, Output};

/// Runs functions locally through one [`Executor`].
///
/// `invoke` is a long blocking call: it returns only after the function finished, timed
/// out or was interrupted, and every transient resource has been released.
#[derive(Clone)]
pub struct LocalRuntime {
    executor: Arc<dyn Executor>,
    staging: StagingConfig,
}

impl std::fmt::Debug for LocalRuntime {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LocalRuntime")
            .field("executor", &self.executor.name())
            .field("staging", &self.staging)
            .finish()
    }
}

impl LocalRuntime {
    #[must_use]
    pub fn new(executor: Arc<dyn Executor>, staging: StagingConfig) -> Self {
        Self { executor, staging }
    }

    pub async fn invoke(
        &self,
        function: &FunctionConfig,
        request: &InvocationRequest,
        output: &mut Output<'_>,
    ) -> Result<InvocationOutcome, InvokeError> {
        let id = InvocationId::new();
        let span = tracing::info_span!(
            "invoke",
            function = %function.name,
            runtime = %function.runtime,
            invocation = %id.short(),
            executor = self.executor.name(),
        );
        self.invoke_inner(id, function, request, output)
            .instrument(span)
            .await
    }

    async fn invoke_inner(
        &self,
        id: InvocationId,
        function: &FunctionConfig,
        request: &InvocationRequest,
        output: &mut Output<'_>,
    ) -> Result<InvocationOutcome, InvokeError> {
        if request.debug.is_some() {
            function.runtime.ensure_debuggable()?;
        }
        if !request.installing && !function.code_path.exists() {
            return Err(ConfigError::MissingCode {
                path: function.code_path.clone(),
            }
            .into());
        }

        let mut env = function.environment(request.installing);
        env.insert(FUNCTION_NAME_VAR.to_string(), function.name.clone());

        let event = StagedEvent::write(&request.event, &self.staging).map_err(InvokeError::Stage)?;
        // A failure here drops `event`, removing the staged file.
        let code_dir = CodeDir::resolve(function, &request.cwd, request.installing, &self.staging)
            .map_err(|source| InvokeError::CodeDir {
                path: function.code_path.clone(),
                source,
            })?;
        tracing::debug!(code_dir = %code_dir.path().display(), "Resolved code directory");

        let invocation = Invocation {
            id,
            function,
            env,
            event,
            code_dir: code_dir.path(),
            debug: request.debug.as_ref(),
            installing: request.installing,
        };
        let result = self.executor.execute(invocation, output).await;
        code_dir.release();

        match &result {
            Ok(InvocationOutcome::Completed {
                exit_code: Some(code),
            }) if *code != 0 => {
                tracing::info!(exit_code = code, "Function exited with a failure status");
            }
            Ok(outcome) => tracing::debug!(?outcome, "Invocation finished"),
            Err(e) => tracing::debug!("Invocation aborted: {e}"),
        }
        result
    }
}
