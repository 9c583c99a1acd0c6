//! The impairment control engine.
//!
//! [`Engine`] exposes one method per control-plane operation. It holds no interface state of
//! its own: reads re-query `tc`, writes are submitted as a single `tc -force -batch -` script.
//! Concurrent writes to the same interface are not serialized, the last batch to complete
//! determines the final state.

use std::{sync::Arc, time::Duration};

use rand::Rng;

use crate::{
    command::{self, BoxedExecutor, Invocation, Output},
    iface::{self, Interface, InterfaceLister},
    plan::{plan_randomized, ControlPair, InsufficientTopology, Plan},
    tc::{batch, report, CommandSequence, Impairment, InspectionError, ValidationError},
};

/// Default bound on a single `tc` invocation.
pub const DEFAULT_TC_TIMEOUT: Duration = Duration::from_secs(3);

/// Reading the qdisc state failed. Nothing was changed, the read may be retried.
#[derive(Debug, thiserror::Error)]
pub enum InspectionFailure {
    /// Running `tc qdisc show` failed.
    #[error("query failed: {0}")]
    Query(#[from] command::Error),
    /// The report could not be parsed.
    #[error("malformed report: {0}")]
    Report(#[from] InspectionError),
}

/// Failure of an engine operation.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// The request is malformed and was not submitted.
    #[error("invalid request: {0}")]
    Validation(#[from] ValidationError),
    /// The current state could not be read.
    #[error("inspection failed: {0}")]
    Inspection(#[from] InspectionFailure),
    /// No control pair can be chosen among the listed interfaces.
    #[error("insufficient topology: {0}")]
    InsufficientTopology(#[from] InsufficientTopology),
    /// `tc` did not finish in time. The batch may or may not have been applied, callers should
    /// re-inspect.
    #[error("tc did not complete within {timeout:?}, outcome undetermined")]
    ExecutionUncertain {
        /// The bound that elapsed.
        timeout: Duration,
        /// Output captured before the bound elapsed.
        output: Output,
    },
    /// `tc` could not be run, or failed without naming a failed line.
    #[error("execution failed: {0}")]
    Execution(command::Error),
    /// `tc` ran but refused at least one non-delete line.
    #[error("tc rejected: {}", .commands.join("; "))]
    Rejected {
        /// The refused lines, as submitted.
        commands: Vec<String>,
        /// Full stderr of the batch.
        stderr: String,
    },
}

impl Error {
    /// Returns `true` if the caller can fix the request, `false` for server-side failures.
    pub fn is_client_error(&self) -> bool {
        matches!(self, Self::Validation(_))
    }
}

/// Result of an engine operation.
pub type Result<T> = std::result::Result<T, Error>;

/// Options controlling how the engine invokes `tc`.
#[derive(Debug, Clone)]
pub struct EngineOptions {
    /// The `tc` program to run.
    tc_program: String,
    /// Whether mutating invocations are run through `sudo`.
    sudo: bool,
    /// Bound on each `tc` invocation.
    tc_timeout: Duration,
}

impl Default for EngineOptions {
    fn default() -> Self {
        Self { tc_program: "tc".to_string(), sudo: true, tc_timeout: DEFAULT_TC_TIMEOUT }
    }
}

impl EngineOptions {
    /// Sets the `tc` program path.
    pub fn tc_program(mut self, program: impl Into<String>) -> Self {
        self.tc_program = program.into();
        self
    }

    /// Sets whether batches are submitted through `sudo`.
    pub fn sudo(mut self, sudo: bool) -> Self {
        self.sudo = sudo;
        self
    }

    /// Sets the timeout applied to each `tc` invocation.
    pub fn tc_timeout(mut self, timeout: Duration) -> Self {
        self.tc_timeout = timeout;
        self
    }
}

/// Drives `tc` on behalf of the control plane.
#[derive(Debug)]
pub struct Engine {
    executor: BoxedExecutor,
    lister: Arc<dyn InterfaceLister>,
    options: EngineOptions,
}

impl Engine {
    /// Creates an engine with default [`EngineOptions`].
    pub fn new(executor: BoxedExecutor, lister: Arc<dyn InterfaceLister>) -> Self {
        Self::with_options(executor, lister, EngineOptions::default())
    }

    /// Creates an engine invoking `tc` as described by `options`.
    pub fn with_options(
        executor: BoxedExecutor,
        lister: Arc<dyn InterfaceLister>,
        options: EngineOptions,
    ) -> Self {
        Self { executor, lister, options }
    }

    /// Lists interfaces as reported by the lister.
    pub async fn list_interfaces(&self) -> Vec<String> {
        let interfaces = self.lister.list().await;
        tracing::info!(?interfaces, "listing interfaces");
        interfaces
    }

    /// Inspects the impairment applied to `name`.
    pub async fn show_interface(&self, name: &str) -> Result<Interface> {
        iface::validate_name(name)?;

        let output = self.query(["qdisc", "show", "dev", name]).await?;
        let iface = report::parse_one(name, &output.stdout).map_err(InspectionFailure::from)?;

        tracing::info!(name, loss = ?iface.loss, delay = ?iface.delay, "show interface");
        Ok(iface)
    }

    /// Inspects every interface, leaving out management, loopback and shadow interfaces.
    pub async fn show_interfaces(&self) -> Result<Vec<Interface>> {
        let output = self.query(["qdisc", "show"]).await?;
        let interfaces = report::parse_all(&output.stdout).map_err(InspectionFailure::from)?;

        tracing::debug!(count = interfaces.len(), "show interfaces");
        Ok(interfaces)
    }

    /// Replaces whatever is installed on `name` with a netem qdisc applying `loss` percent and
    /// `delay` milliseconds.
    pub async fn impair_interface(&self, name: &str, loss: i64, delay: i64) -> Result<()> {
        iface::validate_name(name)?;
        let impairment = Impairment::new(loss, delay)?;

        self.apply(&batch::build(name, impairment)).await?;

        tracing::info!(name, loss, delay, "impaired interface to {loss}% loss, with {delay}ms delay");
        Ok(())
    }

    /// Removes any impairment from `name`.
    pub async fn clear_interface(&self, name: &str) -> Result<()> {
        iface::validate_name(name)?;

        self.apply(&batch::clear(name)).await?;

        tracing::info!(name, "cleared interface of all impairments");
        Ok(())
    }

    /// Removes any impairment from every listed interface.
    pub async fn clear_interfaces(&self) -> Result<()> {
        let commands = self
            .bulk_targets()
            .await
            .iter()
            .fold(CommandSequence::new(), |seq, name| seq.clear(name));

        if commands.is_empty() {
            tracing::info!("no interfaces to clear");
            return Ok(());
        }

        self.apply(&commands).await?;

        tracing::info!(count = commands.len(), "cleared all interfaces of impairments");
        Ok(())
    }

    /// Clears a random control pair and applies random loss and delay to every other listed
    /// interface.
    pub async fn randomize_impair(&self) -> Result<ControlPair> {
        let targets = self.bulk_targets().await;
        let plan = plan_randomized(&targets, &mut rand::thread_rng())?;

        self.apply_plan(plan).await
    }

    /// Same as [`Engine::randomize_impair`], drawing from the provided source.
    pub async fn randomize_impair_with<R: Rng + Send>(&self, rng: &mut R) -> Result<ControlPair> {
        let targets = self.bulk_targets().await;
        let plan = plan_randomized(&targets, rng)?;

        self.apply_plan(plan).await
    }

    async fn apply_plan(&self, plan: Plan) -> Result<ControlPair> {
        self.apply(&plan.commands).await?;

        tracing::info!(left = %plan.control.left, right = %plan.control.right, "randomized interface impairments");
        Ok(plan.control)
    }

    /// Listed interfaces that bulk operations may touch.
    async fn bulk_targets(&self) -> Vec<String> {
        self.lister
            .list()
            .await
            .into_iter()
            .filter(|name| !iface::is_excluded(name))
            .filter(|name| match iface::validate_name(name) {
                Ok(()) => true,
                Err(e) => {
                    tracing::warn!(error = %e, "skipping listed interface");
                    false
                }
            })
            .collect()
    }

    async fn query<const N: usize>(&self, args: [&str; N]) -> Result<Output> {
        let invocation = Invocation::new(&self.options.tc_program).args(args);

        self.executor
            .run(&invocation, self.options.tc_timeout)
            .await
            .map_err(|e| Error::Inspection(InspectionFailure::Query(e)))
    }

    /// Submits `commands` as a single batch.
    ///
    /// Failed delete lines are ignored, deleting a root qdisc that is not there is a no-op.
    async fn apply(&self, commands: &CommandSequence) -> Result<()> {
        let script = commands.to_script();
        tracing::debug!(%script, "submitting tc batch");

        let invocation = Invocation::new(&self.options.tc_program)
            .args(["-force", "-batch", "-"])
            .stdin(script)
            .with_sudo(self.options.sudo);

        match self.executor.run(&invocation, self.options.tc_timeout).await {
            Ok(_) => Ok(()),
            Err(command::Error::NonZero(output)) => match commands.failed_commands(&output.stderr) {
                Some(failed) if failed.iter().all(|c| c.is_delete()) => {
                    let devs: Vec<&str> = failed.iter().map(|c| c.dev()).collect();
                    tracing::debug!(?devs, "ignoring failed root qdisc deletes");
                    Ok(())
                }
                Some(failed) => Err(Error::Rejected {
                    commands: failed.iter().map(ToString::to_string).collect(),
                    stderr: output.stderr,
                }),
                None => Err(Error::Execution(command::Error::NonZero(output))),
            },
            Err(command::Error::TimedOut(timeout, output)) => {
                Err(Error::ExecutionUncertain { timeout, output })
            }
            Err(e) => Err(Error::Execution(e)),
        }
    }
}
