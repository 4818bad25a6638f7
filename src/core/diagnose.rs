//! Finding-to-remediation translation
//!
//! Analysis findings are precise but terse; the people reading them are
//! usually mid-incident ("why is this port open?"). This module maps each
//! finding class to a plain-language explanation, concrete remediation
//! steps, and a pointer to further reading.

use crate::core::analysis::{ShadowFinding, ShadowKind, UnreachablePort};

/// A translated finding with helpful context
#[derive(Debug, Clone)]
pub struct Diagnosis {
    pub user_message: String,
    pub suggestions: Vec<String>,
    pub help_url: Option<String>,
}

impl Diagnosis {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            user_message: message.into(),
            suggestions: Vec::new(),
            help_url: None,
        }
    }

    pub fn with_suggestion(mut self, suggestion: impl Into<String>) -> Self {
        self.suggestions.push(suggestion.into());
        self
    }

    pub fn with_help(mut self, url: impl Into<String>) -> Self {
        self.help_url = Some(url.into());
        self
    }
}

/// Translates a shadowing finding into remediation guidance.
pub fn explain_shadow(finding: &ShadowFinding) -> Diagnosis {
    if finding.is_runtime_bypass() {
        return Diagnosis::new(format!(
            "Deny rule \"{}\" is bypassed: the runtime-injected rule \"{}\" sits earlier in the chain and accepts the same traffic first",
            finding.shadowed.label, finding.shadowing.label
        ))
        .with_suggestion(
            "Rule order decides; no error is ever raised for this. The published port is \
             reachable even though a deny rule exists",
        )
        .with_suggestion(
            "To give the firewall front-end full ownership, set the runtime's \
             rule-management flag to false in its daemon configuration (merge the key into \
             the existing file, do not replace the file)",
        )
        .with_suggestion(
            "Then restart the runtime daemon AND recreate the affected containers; the \
             flag is only read at daemon start and existing rules are not re-evaluated",
        )
        .with_help("https://docs.docker.com/network/packet-filtering-firewalls/");
    }

    match finding.kind {
        ShadowKind::PolicyViolation => Diagnosis::new(format!(
            "Rule \"{}\" can never take effect: \"{}\" earlier in the chain matches all of \
             its traffic with a different action",
            finding.shadowed.label, finding.shadowing.label
        ))
        .with_suggestion("Move the more specific rule ahead of the broader one")
        .with_suggestion("Or narrow the earlier rule so the two no longer overlap"),
        ShadowKind::PartialShadow => Diagnosis::new(format!(
            "Rule \"{}\" is partially shadowed by \"{}\": some of its traffic takes the \
             earlier rule's action instead",
            finding.shadowed.label, finding.shadowing.label
        ))
        .with_suggestion("Check whether the overlap is intentional")
        .with_suggestion("Reorder or split the rules if each should win for its own traffic"),
        ShadowKind::Redundant => Diagnosis::new(format!(
            "Rule \"{}\" is redundant: \"{}\" earlier in the chain already takes the same \
             action for all of its traffic",
            finding.shadowed.label, finding.shadowing.label
        ))
        .with_suggestion("Remove the later rule to keep the chain readable"),
    }
}

/// Translates an unreachable published port into remediation guidance.
pub fn explain_unreachable(port: &UnreachablePort) -> Diagnosis {
    Diagnosis::new(format!(
        "Published port {}/{} of workload \"{}\" is not reachable: no rule accepts it and \
         the default policy denies",
        port.protocol, port.port, port.workload
    ))
    .with_suggestion(
        "In admin-managed mode the runtime provisions nothing; published ports need an \
         explicit accept rule",
    )
    .with_suggestion(format!(
        "Add one with: cordon rule add \"accept {}/{}\"",
        port.protocol, port.port
    ))
    .with_suggestion(
        "If the port should be reachable from one subnet only, add a 'from' clause \
         instead of a blanket accept",
    )
    .with_help("https://docs.docker.com/network/packet-filtering-firewalls/")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::analysis::RuleRef;
    use crate::core::chain::{Origin, Protocol};
    use uuid::Uuid;

    fn rule_ref(index: usize, origin: Origin, label: &str) -> RuleRef {
        RuleRef {
            index,
            id: Uuid::nil(),
            origin,
            label: label.to_string(),
        }
    }

    #[test]
    fn test_runtime_bypass_diagnosis() {
        let finding = ShadowFinding {
            kind: ShadowKind::PolicyViolation,
            shadowing: rule_ref(0, Origin::Runtime, "publish api tcp/8089"),
            shadowed: rule_ref(1, Origin::Admin, "block api"),
        };

        let diagnosis = explain_shadow(&finding);
        assert!(diagnosis.user_message.contains("bypassed"));
        assert!(
            diagnosis
                .suggestions
                .iter()
                .any(|s| s.contains("restart the runtime daemon"))
        );
        assert!(
            diagnosis
                .suggestions
                .iter()
                .any(|s| s.contains("merge the key"))
        );
        assert!(diagnosis.help_url.is_some());
    }

    #[test]
    fn test_admin_shadow_diagnosis() {
        let finding = ShadowFinding {
            kind: ShadowKind::PolicyViolation,
            shadowing: rule_ref(0, Origin::Admin, "allow all tcp"),
            shadowed: rule_ref(1, Origin::Admin, "block ssh"),
        };

        let diagnosis = explain_shadow(&finding);
        assert!(diagnosis.user_message.contains("can never take effect"));
        assert!(diagnosis.suggestions.iter().any(|s| s.contains("Move")));
    }

    #[test]
    fn test_redundant_diagnosis() {
        let finding = ShadowFinding {
            kind: ShadowKind::Redundant,
            shadowing: rule_ref(0, Origin::Admin, "allow lan"),
            shadowed: rule_ref(1, Origin::Admin, "allow lan ssh"),
        };

        let diagnosis = explain_shadow(&finding);
        assert!(diagnosis.user_message.contains("redundant"));
    }

    #[test]
    fn test_unreachable_diagnosis() {
        let port = UnreachablePort {
            workload: "api".to_string(),
            protocol: Protocol::Tcp,
            port: 8089,
        };

        let diagnosis = explain_unreachable(&port);
        assert!(diagnosis.user_message.contains("tcp/8089"));
        assert!(
            diagnosis
                .suggestions
                .iter()
                .any(|s| s.contains("cordon rule add"))
        );
    }
}
