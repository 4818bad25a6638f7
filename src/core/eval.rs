//! First-match-wins chain evaluation
//!
//! Evaluation is a pure function of (chain, packet): the disposition is the
//! action of the first enabled rule whose predicate matches, or the chain's
//! default policy when nothing matches. There is no fall-through past a match
//! and no hidden state, so re-evaluating the same inputs always yields the
//! same verdict.
//!
//! A permissive rule inserted ahead of a deny rule for the same traffic wins.
//! That is not a defect in the evaluator; it is an emergent property of
//! insertion order, and the whole reason chain ordering needs auditing.

use crate::core::chain::{Action, Chain, Origin, Packet};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Identity of the rule that decided a verdict
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct MatchedRule {
    /// Position in the chain (0 = head)
    pub index: usize,
    pub id: Uuid,
    pub origin: Origin,
    pub label: String,
}

/// Outcome of evaluating a packet against a chain
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Verdict {
    pub action: Action,
    /// The deciding rule, or `None` when the default policy applied
    pub matched: Option<MatchedRule>,
}

impl Verdict {
    /// Returns true when no rule matched and the default policy decided.
    pub const fn default_applied(&self) -> bool {
        self.matched.is_none()
    }
}

/// Evaluates a packet against a chain, front-to-back, first match wins.
///
/// Disabled rules are skipped. Never errors: an empty chain or a packet
/// matching nothing yields the chain's default policy.
pub fn evaluate(chain: &Chain, packet: &Packet) -> Verdict {
    for (index, rule) in chain.rules().iter().enumerate() {
        if !rule.enabled {
            continue;
        }
        if rule.matches(packet) {
            tracing::debug!(
                index,
                rule = %rule.label,
                origin = %rule.origin,
                action = %rule.action,
                packet = %packet,
                "rule matched"
            );
            return Verdict {
                action: rule.action,
                matched: Some(MatchedRule {
                    index,
                    id: rule.id,
                    origin: rule.origin,
                    label: rule.label.clone(),
                }),
            };
        }
    }

    tracing::debug!(packet = %packet, policy = %chain.default_policy, "default policy applied");
    Verdict {
        action: chain.default_policy,
        matched: None,
    }
}
