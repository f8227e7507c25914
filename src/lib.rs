// src/lib.rs

//! kafka-converge
//!
//! Idempotent reconciler that installs, configures and runs an Apache Kafka
//! console consumer as a systemd service on a single host.
//!
//! # Architecture
//!
//! - Resources: the host is described as an ordered list of desired states
//!   (group, user, directories, archive, symlink, files, unit, service)
//! - Probe, decide, apply: each resource is observed, compared with its
//!   desired state and changed only when it drifted
//! - Host boundary: every read and mutation goes through the [`host::Host`]
//!   trait, implemented for real systems and for tests
//! - Sequential runs: the first failure halts the run and is reported with
//!   the resource that caused it

pub mod config;
pub mod consumer;
pub mod converge;
pub mod hash;
pub mod host;
pub mod probe;
pub mod report;
pub mod resource;
pub mod runner;

pub use config::{ConsumerConfig, OsFamily, load_config};
pub use consumer::desired_state;
pub use converge::{Action, FailureKind, Outcome, ResourceResult};
pub use host::{FakeHost, Host, HostError, SystemHost};
pub use resource::{DesiredState, Observation, ResourceId, ResourceKind};
pub use runner::{ConvergencePlan, ConvergenceRunner, PlanError, RunOptions, RunReport};
