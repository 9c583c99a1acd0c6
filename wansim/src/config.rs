//! Service configuration.

use std::{env, net::SocketAddr, sync::Arc, time::Duration};

use config::{Config, Environment, File};
use serde::Deserialize;
use wansim_tc::{
    command::{BoxedExecutor, Invocation},
    CommandLister, EngineOptions, InterfaceLister, SysfsLister,
};

use crate::error::{ApiError, Result};

/// Top-level configuration of `wansimd`.
#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    /// Address the HTTP server binds to.
    pub listen: SocketAddr,
    /// How `tc` is invoked.
    pub tc: TcConfig,
    /// Where interface names come from.
    pub lister: ListerConfig,
}

/// `tc` invocation settings.
#[derive(Debug, Clone, Deserialize)]
pub struct TcConfig {
    /// Program name or path.
    pub program: String,
    /// Run mutating `tc` batches through `sudo`.
    pub sudo: bool,
    /// Bound on each invocation.
    pub timeout_ms: u64,
}

/// Interface lister settings.
#[derive(Debug, Clone, Deserialize)]
pub struct ListerConfig {
    /// Which lister to use.
    pub kind: ListerKind,
    /// Program printing whitespace separated interface names, used by [`ListerKind::Command`].
    pub program: String,
    /// Bound on each run of `program`.
    pub timeout_ms: u64,
}

/// Source of interface names.
#[derive(Debug, Clone, Copy, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ListerKind {
    /// Run an external program.
    Command,
    /// Read `/sys/class/net`.
    Sysfs,
}

impl AppConfig {
    /// Loads defaults, then `config/default` and `config/{RUN_MODE}` files if present, then
    /// `WANSIM__*` environment variables (e.g. `WANSIM__TC__SUDO=false`).
    pub fn load() -> Result<Self> {
        let run_mode = env::var("RUN_MODE").unwrap_or_else(|_| "dev".into());

        let config = Config::builder()
            .set_default("listen", "0.0.0.0:8080")?
            .set_default("tc.program", "tc")?
            .set_default("tc.sudo", true)?
            .set_default("tc.timeout_ms", 3_000_i64)?
            .set_default("lister.kind", "command")?
            .set_default("lister.program", "/bin/listInterfaces")?
            .set_default("lister.timeout_ms", 1_000_i64)?
            .add_source(File::with_name("config/default").required(false))
            .add_source(File::with_name(&format!("config/{run_mode}")).required(false))
            .add_source(
                Environment::with_prefix("WANSIM")
                    .prefix_separator("__")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        config.try_deserialize().map_err(|e| ApiError::Config(e.to_string()))
    }

    /// Engine settings derived from the `tc` section.
    pub fn engine_options(&self) -> EngineOptions {
        EngineOptions::default()
            .tc_program(&self.tc.program)
            .sudo(self.tc.sudo)
            .tc_timeout(Duration::from_millis(self.tc.timeout_ms))
    }

    /// Builds the configured lister, running commands through `executor`.
    pub fn lister(&self, executor: BoxedExecutor) -> Arc<dyn InterfaceLister> {
        match self.lister.kind {
            ListerKind::Command => Arc::new(CommandLister::new(
                executor,
                Invocation::new(&self.lister.program),
                Duration::from_millis(self.lister.timeout_ms),
            )),
            ListerKind::Sysfs => Arc::new(SysfsLister::default()),
        }
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            listen: SocketAddr::from(([0, 0, 0, 0], 8080)),
            tc: TcConfig { program: "tc".to_string(), sudo: true, timeout_ms: 3_000 },
            lister: ListerConfig {
                kind: ListerKind::Command,
                program: "/bin/listInterfaces".to_string(),
                timeout_ms: 1_000,
            },
        }
    }
}
