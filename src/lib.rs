//! # httpmonitor
//!
//! Monitors HTTP(S) endpoints on independent schedules and breaks each
//! request's latency down into network phases.
//!
//! - **[`probe`]**: the instrumented request (DNS, TCP, TLS, server
//!   processing, content transfer), the authenticating transport and the
//!   [`probe::CheckResult`] model
//! - **[`monitor`]**: per-target check loops, bounded result history,
//!   notification policy and the registry of running clients
//! - **[`config`]**: target configuration loading, defaults and validation

pub mod config;
pub mod monitor;
pub mod probe;
