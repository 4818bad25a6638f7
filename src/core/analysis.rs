//! Static chain analysis
//!
//! The failure modes this crate exists to surface raise no errors anywhere:
//! the chain evaluates "successfully" while violating the administrator's
//! intent. Detection is inspection, not error propagation. This module
//! implements that inspection:
//!
//! - **Shadowing**: a rule positioned earlier in the chain matches some or
//!   all of the traffic a later rule was written for. When the actions
//!   differ this is a silent policy violation (the documented bypass); when
//!   they agree the later rule is merely dead weight.
//! - **Reachability**: in administrator-managed mode the runtime injects
//!   nothing, so a published port is only reachable if an admin rule (or the
//!   default policy) accepts it. Ports that fall through to a deny are
//!   reported as connectivity regressions.

use crate::core::chain::{Action, Chain, Origin, Packet, Protocol, Rule};
use crate::core::reconcile::PortMapping;
use serde::{Deserialize, Serialize};
use std::net::IpAddr;
use uuid::Uuid;

/// Severity of a shadowing relationship
#[derive(
    Debug,
    Clone,
    Copy,
    Serialize,
    Deserialize,
    PartialEq,
    Eq,
    strum::Display,
    strum::EnumString,
    strum::AsRefStr,
)]
#[serde(rename_all = "snake_case")]
pub enum ShadowKind {
    /// Earlier rule fully covers the later rule and takes a different
    /// action: the later rule can never take effect
    #[strum(serialize = "policy-violation")]
    PolicyViolation,
    /// Earlier rule overlaps the later rule with a different action:
    /// some of the later rule's traffic is diverted
    #[strum(serialize = "partial-shadow")]
    PartialShadow,
    /// Earlier rule fully covers the later rule with the same action:
    /// the later rule is unreachable but harmless
    #[strum(serialize = "redundant")]
    Redundant,
}

/// Reference to a rule inside a finding
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct RuleRef {
    pub index: usize,
    pub id: Uuid,
    pub origin: Origin,
    pub label: String,
}

impl RuleRef {
    fn new(index: usize, rule: &Rule) -> Self {
        Self {
            index,
            id: rule.id,
            origin: rule.origin,
            label: rule.label.clone(),
        }
    }
}

/// A shadowing relationship between two rules in the same chain
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ShadowFinding {
    pub kind: ShadowKind,
    /// The earlier rule that wins
    pub shadowing: RuleRef,
    /// The later rule whose intent is defeated
    pub shadowed: RuleRef,
}

impl ShadowFinding {
    /// True when an administrator deny rule is defeated by an earlier
    /// runtime-injected rule: the documented bypass shape.
    pub fn is_runtime_bypass(&self) -> bool {
        self.kind == ShadowKind::PolicyViolation
            && self.shadowing.origin == Origin::Runtime
            && self.shadowed.origin == Origin::Admin
    }
}

/// A published port that no rule accepts under the current chain
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct UnreachablePort {
    pub workload: String,
    pub protocol: Protocol,
    pub port: u16,
}

/// Full analysis report for a chain
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct Report {
    pub shadows: Vec<ShadowFinding>,
    pub unreachable: Vec<UnreachablePort>,
}

impl Report {
    /// True when the report contains at least one silent policy violation.
    pub fn has_violations(&self) -> bool {
        self.shadows
            .iter()
            .any(|s| s.kind == ShadowKind::PolicyViolation)
    }

    pub fn is_clean(&self) -> bool {
        self.shadows.is_empty() && self.unreachable.is_empty()
    }
}

/// Finds every shadowing relationship in the chain.
///
/// For each ordered pair (earlier, later) of enabled rules, reports full
/// coverage with differing actions as [`ShadowKind::PolicyViolation`], full
/// coverage with the same action as [`ShadowKind::Redundant`], and mere
/// predicate overlap with differing actions as [`ShadowKind::PartialShadow`].
/// Overlap with the same action is unremarkable and not reported.
pub fn find_shadows(chain: &Chain) -> Vec<ShadowFinding> {
    let rules = chain.rules();
    let mut findings = Vec::new();

    for (later_idx, later) in rules.iter().enumerate() {
        if !later.enabled {
            continue;
        }
        for (earlier_idx, earlier) in rules[..later_idx].iter().enumerate() {
            if !earlier.enabled {
                continue;
            }

            let kind = if earlier.covers(later) {
                if earlier.action == later.action {
                    ShadowKind::Redundant
                } else {
                    ShadowKind::PolicyViolation
                }
            } else if earlier.overlaps(later) && earlier.action != later.action {
                ShadowKind::PartialShadow
            } else {
                continue;
            };

            findings.push(ShadowFinding {
                kind,
                shadowing: RuleRef::new(earlier_idx, earlier),
                shadowed: RuleRef::new(later_idx, later),
            });

            // A fully covered rule is dead; further pairs add no information.
            if kind != ShadowKind::PartialShadow {
                break;
            }
        }
    }

    findings
}

/// Checks which published ports would be unreachable under `chain`.
///
/// A port counts as reachable when at least one source address is accepted.
/// Probing only from the unspecified source would miss source-scoped accept
/// rules, so each accept rule covering the port contributes a representative
/// address from its own network to the probe set. Used for the mode-switch
/// connectivity regression: after disabling runtime rule management,
/// published ports lose reachability unless separately provisioned.
pub fn find_unreachable(chain: &Chain, published: &[(String, PortMapping)]) -> Vec<UnreachablePort> {
    let mut out = Vec::new();

    for (workload, mapping) in published {
        let reachable = probe_sources(chain, mapping.protocol, mapping.host_port)
            .into_iter()
            .any(|source| {
                let packet = probe_packet(mapping.protocol, mapping.host_port).from_source(source);
                !crate::core::eval::evaluate(chain, &packet).action.is_deny()
            });
        if !reachable {
            out.push(UnreachablePort {
                workload: workload.clone(),
                protocol: mapping.protocol,
                port: mapping.host_port,
            });
        }
    }

    out
}

/// Source addresses worth probing for a port: the unspecified address plus
/// a representative inside each accept rule's source network.
fn probe_sources(chain: &Chain, protocol: Protocol, port: u16) -> Vec<IpAddr> {
    let mut sources = vec![IpAddr::V4(std::net::Ipv4Addr::UNSPECIFIED)];

    for rule in chain.rules() {
        if rule.enabled
            && rule.action == Action::Accept
            && rule.protocol.matches(protocol)
            && rule.ports.is_none_or(|r| r.contains(port))
            && let Some(net) = rule.source
        {
            sources.push(net.ip());
        }
    }

    sources
}

/// Runs the full analysis over a chain and the declared published ports.
pub fn analyze(chain: &Chain, published: &[(String, PortMapping)]) -> Report {
    let shadows = find_shadows(chain);
    let unreachable = find_unreachable(chain, published);

    if !shadows.is_empty() || !unreachable.is_empty() {
        tracing::info!(
            shadows = shadows.len(),
            unreachable = unreachable.len(),
            "chain analysis produced findings"
        );
    }

    Report {
        shadows,
        unreachable,
    }
}

/// Convenience helper: representative packet for a port mapping.
pub fn probe_packet(protocol: Protocol, port: u16) -> Packet {
    Packet {
        protocol,
        port: Some(port),
        source: std::net::IpAddr::V4(std::net::Ipv4Addr::UNSPECIFIED),
    }
}
