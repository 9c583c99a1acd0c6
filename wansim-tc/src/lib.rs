#![cfg_attr(docsrs, feature(doc_cfg, doc_auto_cfg))]

//! Impairment control engine: drives `tc`/netem to apply packet loss and delay to host
//! interfaces.

pub mod command;
pub mod engine;
pub mod iface;
pub mod plan;
pub mod tc;

#[cfg(any(test, feature = "testing"))]
pub mod testing;

pub use engine::{Engine, EngineOptions, Error, InspectionFailure, Result};
pub use iface::{CommandLister, Interface, InterfaceLister, SysfsLister};
pub use plan::{ControlPair, InsufficientTopology};
