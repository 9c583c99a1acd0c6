//! # Traffic Control
//!
//! Everything the engine knows about `tc`: the legal impairment domain, the batch scripts
//! that apply or clear a netem root qdisc, and the parsing of `tc qdisc show` reports.
//!
//! Only a root netem qdisc per interface is managed:
//!
//! ```text
//! qdisc del dev <dev> root
//! qdisc add dev <dev> root netem [loss <L>%] [delay <D>ms]
//! ```
//!
//! The kernel is the only source of truth. Nothing is cached between calls; every read
//! re-runs `tc qdisc show`.

pub mod batch;
pub mod impairment;
pub mod report;

pub use batch::{CommandSequence, QdiscCommand};
pub use impairment::{validate, Impairment, ValidationError};
pub use report::InspectionError;
