// THEORY:
// This file is the main entry point for the `leaf_scan` library crate.
// It defines the public API exposed to external consumers (the HTTP surface in
// `leaf_scan_server`, or any host application that renders results).
//
// The primary goal is to export the `DetectionSession` and its associated data
// structures (`SessionConfig`, `DetectionResult`, the acquisition surfaces) as
// the high-level interface of the detection pipeline. The individual stages
// (`core_modules`) stay public so a host can swap a stage, most importantly the
// `Classifier`, without touching the orchestration.

pub mod config;
pub mod core_modules;
pub mod error;
pub mod pipeline;
pub mod session;
