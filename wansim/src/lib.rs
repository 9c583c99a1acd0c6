#![cfg_attr(docsrs, feature(doc_cfg, doc_auto_cfg))]

//! HTTP control plane exposing the [`wansim_tc`] impairment engine.

mod api;
pub mod config;
pub mod error;

pub use api::{router, AppState};
pub use error::ApiError;
