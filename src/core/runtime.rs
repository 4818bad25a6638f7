//! Dual-writer chain mutation, as documented
//!
//! This module reproduces the behavior of the real system: two independent
//! writers mutating one shared chain with no coordination between them. The
//! administrator's front-end appends and removes rules at will; the container
//! runtime injects permissive rules at the head of the chain on every
//! container start, as long as its rule-management flag was enabled when the
//! daemon last started.
//!
//! The flag lives in the daemon's configuration and is read exactly once, at
//! daemon start. [`Event::Configure`] therefore changes only the *configured*
//! value; the *active* value, the one that governs injection, follows on
//! the next [`Event::RuntimeRestart`]. Until then the chain keeps whatever
//! stale rules the previous mode left behind. That gap is the documented
//! transition hazard, and [`Simulation`] models it rather than papering over
//! it.

use crate::core::chain::{Action, Chain, Origin, Rule};
use crate::core::reconcile::{PortMapping, RuleManagement, Workload, publish_rule};
use uuid::Uuid;

/// A chain mutation event from either writer, or a daemon lifecycle change
#[derive(Debug, Clone)]
pub enum Event {
    /// A container with published ports starts (or is recreated)
    ContainerStart(Workload),
    /// A container stops; its injected rules are torn down
    ContainerStop { name: String },
    /// The management flag is written to the daemon's config file.
    /// No chain mutation happens until the daemon restarts.
    Configure(RuleManagement),
    /// The runtime daemon restarts: it re-reads its config, withdraws its
    /// own rules, and re-injects for running containers if still managing
    RuntimeRestart,
    /// Administrator appends a rule at the tail of the chain
    AdminAppend(Rule),
    /// Administrator removes one of their rules by id
    AdminRemove(Uuid),
    /// Administrator flushes the entire ruleset
    Flush,
}

/// Live host state: the shared chain plus both writers' bookkeeping
#[derive(Debug, Clone)]
pub struct Simulation {
    chain: Chain,
    /// Value currently in the daemon's config file
    configured: RuleManagement,
    /// Value the daemon loaded at its last start
    active: RuleManagement,
    running: Vec<Workload>,
}

impl Simulation {
    pub fn new(default_policy: Action, management: RuleManagement) -> Self {
        Self {
            chain: Chain::new(default_policy),
            configured: management,
            active: management,
            running: Vec::new(),
        }
    }

    pub fn chain(&self) -> &Chain {
        &self.chain
    }

    pub const fn active_management(&self) -> RuleManagement {
        self.active
    }

    pub const fn configured_management(&self) -> RuleManagement {
        self.configured
    }

    pub fn running(&self) -> &[Workload] {
        &self.running
    }

    /// Flattens the running workloads into (workload, mapping) pairs.
    pub fn published(&self) -> Vec<(String, PortMapping)> {
        self.running
            .iter()
            .flat_map(|w| w.published.iter().map(|m| (w.name.clone(), *m)))
            .collect()
    }

    /// Applies one event to the shared chain.
    pub fn apply(&mut self, event: Event) {
        match event {
            Event::ContainerStart(workload) => self.container_start(workload),
            Event::ContainerStop { name } => self.container_stop(&name),
            Event::Configure(management) => self.configure(management),
            Event::RuntimeRestart => self.runtime_restart(),
            Event::AdminAppend(rule) => self.admin_append(rule),
            Event::AdminRemove(id) => {
                if !self.chain.remove(id) {
                    tracing::warn!(%id, "admin remove: no such rule");
                }
            }
            Event::Flush => {
                tracing::info!("ruleset flushed");
                self.chain.flush();
            }
        }
    }

    fn container_start(&mut self, workload: Workload) {
        // Starting an already-running name is a recreate.
        if self.running.iter().any(|w| w.name == workload.name) {
            self.container_stop(&workload.name);
        }

        if self.active == RuleManagement::RuntimeManaged {
            for mapping in &workload.published {
                tracing::info!(
                    workload = %workload.name,
                    %mapping,
                    "runtime injecting publish rule at chain head"
                );
                self.chain.insert_head(publish_rule(&workload.name, mapping));
            }
        } else {
            // No injection, and no reachability implied for published ports.
            tracing::info!(
                workload = %workload.name,
                "admin-managed: container start without chain mutation"
            );
        }

        self.running.push(workload);
    }

    fn container_stop(&mut self, name: &str) {
        let removed = self.chain.remove_owned(name);
        self.running.retain(|w| w.name != name);
        tracing::info!(workload = name, removed, "container stopped");
    }

    fn configure(&mut self, management: RuleManagement) {
        self.configured = management;
        if self.configured == self.active {
            return;
        }
        // Config flag is read once at daemon start; existing rules stay put.
        tracing::warn!(
            configured = %self.configured,
            active = %self.active,
            "management mode changed in config; takes effect on runtime restart"
        );
    }

    fn runtime_restart(&mut self) {
        let withdrawn = self.chain.drop_runtime_rules();
        self.active = self.configured;
        tracing::info!(withdrawn, management = %self.active, "runtime daemon restarted");

        if self.active == RuleManagement::RuntimeManaged {
            for workload in &self.running {
                for mapping in &workload.published {
                    self.chain.insert_head(publish_rule(&workload.name, mapping));
                }
            }
        }
    }

    fn admin_append(&mut self, mut rule: Rule) {
        // The front-end only ever writes admin rules.
        rule.origin = Origin::Admin;
        rule.owner = None;
        self.chain.append(rule);
    }
}
