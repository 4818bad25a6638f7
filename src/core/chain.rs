//! Chain and rule data structures
//!
//! This module defines the ordered rule-table model that everything else
//! operates on. A [`Chain`] is an ordered sequence of [`Rule`]s evaluated
//! front-to-back with first-match-wins semantics: a packet's disposition is
//! determined solely by the earliest rule whose predicate matches, regardless
//! of which actor authored the rule.
//!
//! # Rule Structure
//!
//! A [`Rule`] represents a single filtering rule with:
//! - Protocol filtering (TCP, UDP, ICMP, or any)
//! - An optional destination port range
//! - An optional source network (CIDR)
//! - An action ([`Action::Accept`], [`Action::Drop`], [`Action::Reject`])
//! - An origin marking which writer created it ([`Origin::Runtime`] for
//!   rules injected on behalf of a container workload, [`Origin::Admin`] for
//!   administrator-defined rules)
//! - Enable/disable state
//!
//! # Limits
//!
//! [`MAX_RULES`] caps how many rules an intent profile may carry. The cap
//! is enforced where rules enter persistence (profile load and rule add),
//! not by [`Chain`] itself.
//!
//! # Example
//!
//! ```
//! use cordon::core::chain::{Action, Chain, Origin, Packet, PortRange, Protocol, Rule};
//!
//! let mut chain = Chain::new(Action::Drop);
//! chain.append(Rule::admin("block api", Protocol::Tcp, Some(PortRange::single(8089)), None, Action::Drop));
//! chain.insert_head(Rule::runtime("web", "publish web tcp/8089", Protocol::Tcp, Some(PortRange::single(8089))));
//!
//! // The runtime rule sits ahead of the admin rule and wins.
//! assert_eq!(chain.rules()[0].origin, Origin::Runtime);
//! ```

use ipnetwork::IpNetwork;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::net::IpAddr;
use uuid::Uuid;

/// Maximum number of rules an intent profile may carry
///
/// Limit prevents memory exhaustion from malformed/malicious intent files.
/// 1000 rules is well beyond typical use cases (most hosts have <50).
pub const MAX_RULES: usize = 1000;

/// Network protocol for rule predicates and packet descriptors
///
/// `Copy` trait allows efficient passing by value for this small enum.
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
    strum::EnumIter,
    strum::AsRefStr,
)]
#[serde(rename_all = "lowercase")]
pub enum Protocol {
    /// Match all protocols (only valid on rules, not packets)
    #[strum(serialize = "any")]
    Any,
    /// Transmission Control Protocol
    #[strum(serialize = "tcp")]
    Tcp,
    /// User Datagram Protocol
    #[strum(serialize = "udp")]
    Udp,
    /// Internet Control Message Protocol
    #[strum(serialize = "icmp")]
    Icmp,
}

impl Protocol {
    /// Returns lowercase protocol name as static string
    pub const fn as_str(self) -> &'static str {
        match self {
            Protocol::Any => "any",
            Protocol::Tcp => "tcp",
            Protocol::Udp => "udp",
            Protocol::Icmp => "icmp",
        }
    }

    /// Returns true when a rule with this protocol applies to a packet
    /// carrying `other`.
    pub const fn matches(self, other: Protocol) -> bool {
        matches!(self, Protocol::Any) || (self as u8) == (other as u8)
    }
}

/// Rule action (Accept, Drop, or Reject)
///
/// Controls the disposition of a packet that matches the rule, or the
/// default disposition of a whole chain when nothing matches.
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
#[serde(rename_all = "lowercase")]
pub enum Action {
    /// Accept the packet (allow it through)
    #[default]
    #[strum(serialize = "accept")]
    Accept,
    /// Drop the packet silently (no response sent)
    #[strum(serialize = "drop")]
    Drop,
    /// Reject the packet and send an unreachable response
    #[strum(serialize = "reject")]
    Reject,
}

impl Action {
    /// Returns lowercase action name
    pub const fn as_str(self) -> &'static str {
        match self {
            Action::Accept => "accept",
            Action::Drop => "drop",
            Action::Reject => "reject",
        }
    }

    /// Returns true for actions that deny traffic
    pub const fn is_deny(self) -> bool {
        matches!(self, Action::Drop | Action::Reject)
    }
}

/// Which writer authored a rule
///
/// The chain is a shared resource with two independent writers. Origin is
/// carried on every rule so analysis and teardown can tell them apart, but
/// it has no influence on evaluation: position alone determines dominance.
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
#[serde(rename_all = "lowercase")]
pub enum Origin {
    /// Injected by the container runtime for a published port
    #[strum(serialize = "runtime")]
    Runtime,
    /// Created by explicit administrator action
    #[default]
    #[strum(serialize = "admin")]
    Admin,
}

/// Inclusive destination port range
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct PortRange {
    pub start: u16,
    pub end: u16,
}

impl PortRange {
    pub const fn single(port: u16) -> Self {
        Self {
            start: port,
            end: port,
        }
    }

    pub const fn contains(&self, port: u16) -> bool {
        port >= self.start && port <= self.end
    }

    /// Returns true when `self` includes every port of `other`.
    pub const fn covers(&self, other: &PortRange) -> bool {
        self.start <= other.start && self.end >= other.end
    }

    /// Returns true when the two ranges share at least one port.
    pub const fn overlaps(&self, other: &PortRange) -> bool {
        self.start <= other.end && other.start <= self.end
    }
}

impl fmt::Display for PortRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.start == self.end {
            write!(f, "{}", self.start)
        } else {
            write!(f, "{}-{}", self.start, self.end)
        }
    }
}

/// Inbound packet descriptor for evaluation
///
/// Only the attributes rule predicates can see: protocol, destination port,
/// source address.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct Packet {
    pub protocol: Protocol,
    /// Destination port; `None` for portless protocols such as ICMP
    pub port: Option<u16>,
    pub source: IpAddr,
}

impl Packet {
    /// Creates a TCP packet to `port` from the unspecified IPv4 source.
    pub const fn tcp(port: u16) -> Self {
        Self {
            protocol: Protocol::Tcp,
            port: Some(port),
            source: IpAddr::V4(std::net::Ipv4Addr::UNSPECIFIED),
        }
    }

    /// Creates a UDP packet to `port` from the unspecified IPv4 source.
    pub const fn udp(port: u16) -> Self {
        Self {
            protocol: Protocol::Udp,
            port: Some(port),
            source: IpAddr::V4(std::net::Ipv4Addr::UNSPECIFIED),
        }
    }

    /// Replaces the source address.
    #[must_use]
    pub const fn from_source(mut self, source: IpAddr) -> Self {
        self.source = source;
        self
    }
}

impl fmt::Display for Packet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.port {
            Some(port) => write!(f, "{}/{} from {}", self.protocol, port, self.source),
            None => write!(f, "{} from {}", self.protocol, self.source),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Rule {
    pub id: Uuid,
    pub label: String,
    /// Which writer authored this rule
    #[serde(default)]
    pub origin: Origin,
    /// Workload the rule was injected for; `None` for admin rules.
    /// Used to tear runtime rules down when the workload stops.
    #[serde(default)]
    pub owner: Option<String>,
    pub protocol: Protocol,
    pub ports: Option<PortRange>,
    pub source: Option<IpNetwork>,
    #[serde(default)]
    pub action: Action,
    #[serde(default = "default_true")]
    pub enabled: bool,
    pub created_at: chrono::DateTime<chrono::Utc>,
}

fn default_true() -> bool {
    true
}

impl Rule {
    /// Creates an administrator rule.
    pub fn admin(
        label: impl Into<String>,
        protocol: Protocol,
        ports: Option<PortRange>,
        source: Option<IpNetwork>,
        action: Action,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            label: label.into(),
            origin: Origin::Admin,
            owner: None,
            protocol,
            ports,
            source,
            action,
            enabled: true,
            created_at: chrono::Utc::now(),
        }
    }

    /// Creates a runtime-injected ACCEPT rule owned by `workload`.
    ///
    /// Runtime rules are always permissive: the runtime's only goal is
    /// published-port reachability.
    pub fn runtime(
        workload: impl Into<String>,
        label: impl Into<String>,
        protocol: Protocol,
        ports: Option<PortRange>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            label: label.into(),
            origin: Origin::Runtime,
            owner: Some(workload.into()),
            protocol,
            ports,
            source: None,
            action: Action::Accept,
            enabled: true,
            created_at: chrono::Utc::now(),
        }
    }

    /// Returns true when this rule's predicate matches the packet.
    ///
    /// Pure predicate check; the enabled flag is the evaluator's concern.
    pub fn matches(&self, packet: &Packet) -> bool {
        if !self.protocol.matches(packet.protocol) {
            return false;
        }

        if let Some(ref range) = self.ports {
            match packet.port {
                Some(port) if range.contains(port) => {}
                _ => return false,
            }
        }

        if let Some(ref net) = self.source
            && !net.contains(packet.source)
        {
            return false;
        }

        true
    }

    /// Returns true when every packet matched by `other` is also matched by
    /// `self` (predicate superset).
    pub fn covers(&self, other: &Rule) -> bool {
        if !(self.protocol == Protocol::Any || self.protocol == other.protocol) {
            return false;
        }

        match (&self.ports, &other.ports) {
            (None, _) => {}
            (Some(_), None) => return false,
            (Some(a), Some(b)) => {
                if !a.covers(b) {
                    return false;
                }
            }
        }

        match (&self.source, &other.source) {
            (None, _) => {}
            (Some(_), None) => return false,
            (Some(a), Some(b)) => {
                // A shorter prefix containing the other's base address is a
                // strict superset for aligned CIDR blocks.
                if !(a.prefix() <= b.prefix() && a.contains(b.ip())) {
                    return false;
                }
            }
        }

        true
    }

    /// Returns true when some packet could match both rules.
    pub fn overlaps(&self, other: &Rule) -> bool {
        if !(self.protocol == Protocol::Any
            || other.protocol == Protocol::Any
            || self.protocol == other.protocol)
        {
            return false;
        }

        if let (Some(a), Some(b)) = (&self.ports, &other.ports)
            && !a.overlaps(b)
        {
            return false;
        }

        if let (Some(a), Some(b)) = (&self.source, &other.source)
            && !(a.contains(b.ip()) || b.contains(a.ip()))
        {
            return false;
        }

        true
    }
}

/// Ordered rule table with a configured default policy
///
/// Rules inserted earlier strictly dominate rules inserted later. The chain
/// itself enforces no write discipline between the two origins; that is the
/// reconciler's job.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Chain {
    rules: Vec<Rule>,
    pub default_policy: Action,
}

impl Default for Chain {
    fn default() -> Self {
        Self::new(Action::Drop)
    }
}

impl Chain {
    pub const fn new(default_policy: Action) -> Self {
        Self {
            rules: Vec::new(),
            default_policy,
        }
    }

    pub fn rules(&self) -> &[Rule] {
        &self.rules
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    /// Inserts a rule at the head of the chain, ahead of everything else.
    ///
    /// This is the runtime injector's insertion point: a head-inserted rule
    /// dominates every rule already present.
    pub fn insert_head(&mut self, rule: Rule) {
        self.rules.insert(0, rule);
    }

    /// Appends a rule at the tail of the chain.
    pub fn append(&mut self, rule: Rule) {
        self.rules.push(rule);
    }

    /// Removes the rule with the given id. Returns true if a rule was removed.
    pub fn remove(&mut self, id: Uuid) -> bool {
        let before = self.rules.len();
        self.rules.retain(|r| r.id != id);
        self.rules.len() != before
    }

    /// Removes all rules owned by `workload`. Returns the number removed.
    pub fn remove_owned(&mut self, workload: &str) -> usize {
        let before = self.rules.len();
        self.rules
            .retain(|r| r.owner.as_deref() != Some(workload));
        before - self.rules.len()
    }

    /// Removes every runtime-injected rule. Returns the number removed.
    pub fn drop_runtime_rules(&mut self) -> usize {
        let before = self.rules.len();
        self.rules.retain(|r| r.origin != Origin::Runtime);
        before - self.rules.len()
    }

    /// Removes every rule, leaving only the default policy.
    pub fn flush(&mut self) {
        self.rules.clear();
    }

    /// Renders the chain as human-readable text for preview and diffing.
    pub fn to_text(&self) -> String {
        use std::fmt::Write;

        let mut out = String::new();
        let _ = writeln!(out, "chain input {{");
        let _ = writeln!(out, "    policy {};", self.default_policy);

        for rule in &self.rules {
            let _ = write!(out, "    [{:7}] ", rule.origin.as_ref());
            if !rule.enabled {
                let _ = write!(out, "(disabled) ");
            }
            match rule.protocol {
                Protocol::Any => {}
                proto => {
                    let _ = write!(out, "{proto} ");
                }
            }
            if let Some(ref ports) = rule.ports {
                let _ = write!(out, "dport {ports} ");
            }
            if let Some(ref src) = rule.source {
                let _ = write!(out, "saddr {src} ");
            }
            let _ = write!(out, "{}", rule.action);
            if !rule.label.is_empty() {
                let _ = write!(out, " comment \"{}\"", rule.label);
            }
            let _ = writeln!(out);
        }

        let _ = writeln!(out, "}}");
        out
    }
}
