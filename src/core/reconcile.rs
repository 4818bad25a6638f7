//! Single-writer chain reconciliation
//!
//! The kernel rule table in the modeled system has two uncoordinated writers:
//! the administrator's firewall front-end and the container runtime's rule
//! injector. Neither knows the other's intentions; ordering is whatever the
//! temporal sequence of writes produced. This module is the fix for that:
//! a reconciler that owns the chain outright and rebuilds it deterministically
//! from two declarative inputs: the administrator's intent and the declared
//! published-ports set.
//!
//! # Insertion-priority contract
//!
//! - Administrator rules appear in declaration order.
//! - Under [`RuleManagement::RuntimeManaged`], publish rules for declared
//!   ports are injected ahead of all administrator rules (this reproduces the
//!   real injector's head insertion, shadowing included; rendering is
//!   faithful, not sanitizing).
//! - Under [`RuleManagement::AdminManaged`] the runtime contributes nothing
//!   and nothing is auto-provisioned for published ports; reachability is the
//!   administrator's responsibility alone.
//!
//! Given the same inputs, [`render`] always produces the same chain.

use crate::core::chain::{Action, Chain, PortRange, Protocol, Rule};
use crate::validators::validate_port;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Who owns chain mutation, selected by the runtime daemon's config flag
///
/// The flag is read once at daemon start; changing it on a running system
/// has no effect until the daemon restarts.
#[derive(
    Debug,
    Clone,
    Copy,
    Serialize,
    Deserialize,
    PartialEq,
    Eq,
    Default,
    strum::Display,
    strum::EnumString,
    strum::EnumIter,
    strum::AsRefStr,
)]
#[serde(rename_all = "kebab-case")]
pub enum RuleManagement {
    /// Runtime inserts permissive rules for published ports at the head of
    /// the chain on every container start (flag unset/true)
    #[default]
    #[strum(serialize = "runtime-managed")]
    RuntimeManaged,
    /// Runtime performs no chain mutation; the administrator's front-end
    /// owns the entire chain (flag = false)
    #[strum(serialize = "admin-managed")]
    AdminManaged,
}

/// A host-to-container published port mapping
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct PortMapping {
    pub host_port: u16,
    pub container_port: u16,
    pub protocol: Protocol,
}

impl fmt::Display for PortMapping {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}:{}/{}",
            self.host_port, self.container_port, self.protocol
        )
    }
}

impl FromStr for PortMapping {
    type Err = String;

    /// Parses the compose-style `HOST:CONTAINER[/proto]` form, e.g.
    /// `8089:8080/tcp`. The protocol defaults to tcp.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (ports, protocol) = match s.split_once('/') {
            Some((p, proto)) => (
                p,
                proto
                    .parse::<Protocol>()
                    .map_err(|_| format!("unknown protocol '{proto}'"))?,
            ),
            None => (s, Protocol::Tcp),
        };

        if protocol == Protocol::Any || protocol == Protocol::Icmp {
            return Err(format!("cannot publish a port over '{protocol}'"));
        }

        let (host, container) = ports
            .split_once(':')
            .ok_or_else(|| format!("expected HOST:CONTAINER, got '{ports}'"))?;
        let host_port = host
            .parse::<u16>()
            .map_err(|_| format!("invalid host port '{host}'"))?;
        let container_port = container
            .parse::<u16>()
            .map_err(|_| format!("invalid container port '{container}'"))?;

        validate_port(host_port)?;
        validate_port(container_port)?;

        Ok(Self {
            host_port,
            container_port,
            protocol,
        })
    }
}

/// A container workload and the ports it publishes to the host
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Workload {
    pub name: String,
    #[serde(default)]
    pub published: Vec<PortMapping>,
}

impl Workload {
    pub fn new(name: impl Into<String>, published: Vec<PortMapping>) -> Self {
        Self {
            name: name.into(),
            published,
        }
    }
}

/// Administrator's declarative intent plus the declared workload set
///
/// This is the unit of persistence (see [`crate::core::intent`]): what the
/// administrator wants the chain to enforce, independent of what either
/// writer has done to the live table so far.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Intent {
    /// Administrator rules in priority order
    #[serde(default)]
    pub rules: Vec<Rule>,
    /// Disposition when no rule matches
    #[serde(default = "default_policy")]
    pub default_policy: Action,
    /// Declared workloads and their published ports
    #[serde(default)]
    pub workloads: Vec<Workload>,
}

fn default_policy() -> Action {
    Action::Drop
}

impl Default for Intent {
    fn default() -> Self {
        Self::new()
    }
}

impl Intent {
    pub fn new() -> Self {
        Self {
            rules: Vec::new(),
            default_policy: Action::Drop,
            workloads: Vec::new(),
        }
    }

    /// Flattens the declared workloads into (workload, mapping) pairs.
    pub fn published(&self) -> Vec<(String, PortMapping)> {
        self.workloads
            .iter()
            .flat_map(|w| w.published.iter().map(|m| (w.name.clone(), *m)))
            .collect()
    }
}

/// Builds the publish rule the runtime would inject for one mapping.
pub fn publish_rule(workload: &str, mapping: &PortMapping) -> Rule {
    Rule::runtime(
        workload,
        format!("publish {workload} {}/{}", mapping.protocol, mapping.host_port),
        mapping.protocol,
        Some(PortRange::single(mapping.host_port)),
    )
}

/// Renders the one authoritative chain from intent and management mode.
///
/// Pure function of its inputs; the only writer the rendered chain ever had.
pub fn render(intent: &Intent, management: RuleManagement) -> Chain {
    let mut chain = Chain::new(intent.default_policy);

    for rule in &intent.rules {
        chain.append(rule.clone());
    }

    if management == RuleManagement::RuntimeManaged {
        // Head insertion per workload, mirroring the injector: the most
        // recently started workload ends up frontmost.
        for workload in &intent.workloads {
            for mapping in &workload.published {
                chain.insert_head(publish_rule(&workload.name, mapping));
            }
        }
    }

    tracing::debug!(
        rules = chain.len(),
        %management,
        policy = %chain.default_policy,
        "rendered authoritative chain"
    );

    chain
}
