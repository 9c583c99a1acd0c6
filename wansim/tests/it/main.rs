//! Integration tests for the HTTP control plane.

mod api;
