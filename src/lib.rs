//! cordon - firewall chain precedence simulator and auditor
//!
//! Models a host firewall chain with two uncoordinated writers (an
//! administrator front-end and a container runtime that injects permissive
//! rules for published ports) and makes the resulting silent policy
//! violations visible. The chain evaluates front-to-back, first match wins;
//! nothing about a rule's author grants it precedence, only its position.
//!
//! The crate provides:
//! - A pure first-match evaluator ([`core::eval`])
//! - An event simulation of the dual-writer system, transition hazards
//!   included ([`core::runtime`])
//! - A single-writer reconciler that renders one authoritative chain from
//!   declarative intent ([`core::reconcile`])
//! - Static analysis for shadowed rules and unreachable published ports
//!   ([`core::analysis`]), with plain-language remediation ([`core::diagnose`])

// Pedantic clippy compliance notes:
#![allow(clippy::must_use_candidate)] // Verbose for little gain on small accessors
#![allow(clippy::return_self_not_must_use)] // Builder methods are self-evidently consumed
#![allow(clippy::missing_errors_doc)] // Error conditions documented where non-obvious

pub mod audit;
pub mod config;
pub mod core;
pub mod utils;
pub mod validators;

pub use crate::core::error::{Error, Result};

pub use crate::core::analysis::{Report, ShadowFinding, ShadowKind, UnreachablePort};
pub use crate::core::chain::{Action, Chain, Origin, Packet, PortRange, Protocol, Rule};
pub use crate::core::eval::{Verdict, evaluate};
pub use crate::core::reconcile::{Intent, PortMapping, RuleManagement, Workload, render};
pub use crate::core::runtime::{Event, Simulation};
