//! Cross-module behavior tests
//!
//! These exercise the interactions the unit tests can't: the event
//! simulation against the reconciler, analysis against evaluation, and the
//! full bypass-to-remediation workflow.

use crate::core::analysis::{ShadowKind, analyze, find_shadows};
use crate::core::chain::{Action, Chain, Origin, Packet, PortRange, Protocol, Rule};
use crate::core::eval::evaluate;
use crate::core::reconcile::{Intent, RuleManagement, Workload, render};
use crate::core::runtime::{Event, Simulation};
use crate::core::test_helpers::{
    TestDirs, admin_allow, admin_deny, bypass_chain, conflicted_intent, runtime_publish,
};

/// The full documented failure sequence, end to end: publish, deny, observe
/// the bypass, detect it, remediate, verify.
#[test]
fn test_bypass_lifecycle() {
    let mut sim = Simulation::new(Action::Drop, RuleManagement::RuntimeManaged);

    // 1. Container with a published port starts; runtime injects at head.
    sim.apply(Event::ContainerStart(Workload::new(
        "api",
        vec!["8089:8080/tcp".parse().unwrap()],
    )));

    // 2. Administrator appends a deny for the same port, believing it closed.
    sim.apply(Event::AdminAppend(admin_deny(8089)));

    // 3. The port is still open. No error was raised anywhere.
    let packet = Packet::tcp(8089).from_source("203.0.113.7".parse().unwrap());
    assert_eq!(evaluate(sim.chain(), &packet).action, Action::Accept);

    // 4. Analysis names the exact defect.
    let report = analyze(sim.chain(), &sim.published());
    assert!(report.has_violations());
    assert!(report.shadows[0].is_runtime_bypass());

    // 5. Remediation: flip the flag, restart the daemon, recreate the
    //    container. Each step alone is insufficient.
    sim.apply(Event::Configure(RuleManagement::AdminManaged));
    assert_eq!(evaluate(sim.chain(), &packet).action, Action::Accept);

    sim.apply(Event::RuntimeRestart);
    assert_eq!(evaluate(sim.chain(), &packet).action, Action::Drop);

    sim.apply(Event::ContainerStop {
        name: "api".to_string(),
    });
    sim.apply(Event::ContainerStart(Workload::new(
        "api",
        vec!["8089:8080/tcp".parse().unwrap()],
    )));

    // 6. Deny holds, and the report is free of runtime findings. The
    //    published port is now unreachable, which analysis also surfaces.
    assert_eq!(evaluate(sim.chain(), &packet).action, Action::Drop);
    let report = analyze(sim.chain(), &sim.published());
    assert!(report.shadows.iter().all(|s| !s.is_runtime_bypass()));
    assert_eq!(report.unreachable.len(), 1);
    assert_eq!(report.unreachable[0].port, 8089);
}

/// The simulation's steady state under runtime management matches what the
/// reconciler renders from the equivalent intent.
#[test]
fn test_simulation_agrees_with_render() {
    let intent = conflicted_intent(8089);

    let mut sim = Simulation::new(Action::Drop, RuleManagement::RuntimeManaged);
    for rule in &intent.rules {
        sim.apply(Event::AdminAppend(rule.clone()));
    }
    for workload in &intent.workloads {
        sim.apply(Event::ContainerStart(workload.clone()));
    }

    let rendered = render(&intent, RuleManagement::RuntimeManaged);

    assert_eq!(sim.chain().len(), rendered.len());
    for probe in [Packet::tcp(8089), Packet::tcp(22), Packet::udp(8089)] {
        assert_eq!(
            evaluate(sim.chain(), &probe).action,
            evaluate(&rendered, &probe).action
        );
    }
}

/// Analysis and evaluation agree: a policy-violation finding against a deny
/// rule means the denied traffic actually gets through.
#[test]
fn test_analysis_consistent_with_evaluation() {
    let chain = bypass_chain(8089);

    let findings = find_shadows(&chain);
    let violation = findings
        .iter()
        .find(|f| f.kind == ShadowKind::PolicyViolation)
        .unwrap();

    // The shadowed rule is the deny; probe traffic for its port.
    let shadowed = &chain.rules()[violation.shadowed.index];
    let port = shadowed.ports.unwrap().start;
    let verdict = evaluate(&chain, &Packet::tcp(port));

    assert_eq!(verdict.action, Action::Accept);
    assert_eq!(verdict.matched.unwrap().id, violation.shadowing.id);
}

#[test]
fn test_origin_has_no_evaluation_privilege() {
    // Identical predicates; only origin differs. Position decides both ways.
    let admin_first = {
        let mut chain = Chain::new(Action::Drop);
        chain.append(admin_deny(80));
        chain.append(runtime_publish("web", 80));
        chain
    };
    let runtime_first = bypass_chain(80);

    assert_eq!(evaluate(&admin_first, &Packet::tcp(80)).action, Action::Drop);
    assert_eq!(
        evaluate(&runtime_first, &Packet::tcp(80)).action,
        Action::Accept
    );
    assert_eq!(
        evaluate(&runtime_first, &Packet::tcp(80))
            .matched
            .unwrap()
            .origin,
        Origin::Runtime
    );
}

/// Remediating an unreachable-port finding by provisioning an explicit
/// accept rule restores reachability without reopening the bypass.
#[test]
fn test_admin_provisioning_restores_reachability() {
    let mut intent = conflicted_intent(8089);
    intent.rules.insert(0, admin_allow(8089));

    let chain = render(&intent, RuleManagement::AdminManaged);
    assert_eq!(evaluate(&chain, &Packet::tcp(8089)).action, Action::Accept);

    let report = analyze(&chain, &intent.published());
    assert!(report.unreachable.is_empty());
    assert!(report.shadows.iter().all(|s| !s.is_runtime_bypass()));
}

/// Intent round-trips through the on-disk profile store unchanged.
#[tokio::test]
async fn test_intent_persistence_round_trip() {
    let _dirs = TestDirs::new();

    let intent = conflicted_intent(8089);
    crate::core::intent::save_intent("stack", &intent).await.unwrap();
    let loaded = crate::core::intent::load_intent("stack").await.unwrap();

    assert_eq!(loaded, intent);
    assert_eq!(
        crate::core::intent::list_intents().await.unwrap(),
        vec!["stack"]
    );
}

#[test]
fn test_admin_managed_render_has_no_runtime_rules_ever() {
    let mut intent = conflicted_intent(8089);
    intent.workloads.push(Workload::new(
        "db",
        vec!["5432:5432/tcp".parse().unwrap(), "6432:6432/tcp".parse().unwrap()],
    ));

    let chain = render(&intent, RuleManagement::AdminManaged);
    assert!(chain.rules().iter().all(|r| r.origin == Origin::Admin));
}

mod property_tests {
    use super::*;
    use proptest::prelude::*;

    fn arb_protocol() -> impl Strategy<Value = Protocol> {
        prop_oneof![
            Just(Protocol::Any),
            Just(Protocol::Tcp),
            Just(Protocol::Udp),
            Just(Protocol::Icmp),
        ]
    }

    fn arb_action() -> impl Strategy<Value = Action> {
        prop_oneof![
            Just(Action::Accept),
            Just(Action::Drop),
            Just(Action::Reject),
        ]
    }

    fn arb_rule() -> impl Strategy<Value = Rule> {
        (
            arb_protocol(),
            arb_action(),
            proptest::option::of((1u16..=65535, 0u16..=200)),
            any::<bool>(),
        )
            .prop_map(|(protocol, action, ports, enabled)| {
                let ports = ports.map(|(start, span)| PortRange {
                    start,
                    end: start.saturating_add(span),
                });
                let mut rule = Rule::admin("generated", protocol, ports, None, action);
                rule.enabled = enabled;
                rule
            })
    }

    fn arb_chain() -> impl Strategy<Value = Chain> {
        (proptest::collection::vec(arb_rule(), 0..20), arb_action()).prop_map(
            |(rules, policy)| {
                let mut chain = Chain::new(policy);
                for rule in rules {
                    chain.append(rule);
                }
                chain
            },
        )
    }

    fn arb_packet() -> impl Strategy<Value = Packet> {
        (
            prop_oneof![Just(Protocol::Tcp), Just(Protocol::Udp), Just(Protocol::Icmp)],
            proptest::option::of(any::<u16>()),
            any::<[u8; 4]>(),
        )
            .prop_map(|(protocol, port, octets)| Packet {
                protocol,
                port,
                source: std::net::IpAddr::V4(octets.into()),
            })
    }

    proptest! {
        /// Evaluation is a pure function: same inputs, same verdict.
        #[test]
        fn evaluation_is_deterministic(chain in arb_chain(), packet in arb_packet()) {
            let a = evaluate(&chain, &packet);
            let b = evaluate(&chain, &packet);
            prop_assert_eq!(a, b);
        }

        /// The verdict always comes from the first enabled matching rule,
        /// or the default policy when there is none.
        #[test]
        fn first_match_dominates(chain in arb_chain(), packet in arb_packet()) {
            let verdict = evaluate(&chain, &packet);
            let first = chain
                .rules()
                .iter()
                .enumerate()
                .find(|(_, r)| r.enabled && r.matches(&packet));

            match first {
                Some((index, rule)) => {
                    prop_assert_eq!(verdict.action, rule.action);
                    prop_assert_eq!(verdict.matched.unwrap().index, index);
                }
                None => {
                    prop_assert_eq!(verdict.action, chain.default_policy);
                    prop_assert!(verdict.default_applied());
                }
            }
        }

        /// A rule prepended to the head wins for every packet it matches,
        /// no matter what the chain already contained.
        #[test]
        fn head_insertion_dominates(chain in arb_chain(), packet in arb_packet()) {
            let mut chain = chain;
            let blanket = Rule::admin("blanket", Protocol::Any, None, None, Action::Reject);
            let id = blanket.id;
            chain.insert_head(blanket);

            let verdict = evaluate(&chain, &packet);
            prop_assert_eq!(verdict.action, Action::Reject);
            prop_assert_eq!(verdict.matched.unwrap().id, id);
        }

        /// `covers` is sound with respect to evaluation: if a covers b,
        /// every packet b matches, a matches too.
        #[test]
        fn covers_implies_matches(
            a in arb_rule(),
            b in arb_rule(),
            packet in arb_packet()
        ) {
            if a.covers(&b) && b.matches(&packet) {
                prop_assert!(a.matches(&packet));
            }
        }

        /// Shadow findings only ever point backwards in the chain.
        #[test]
        fn shadows_point_backwards(chain in arb_chain()) {
            for finding in find_shadows(&chain) {
                prop_assert!(finding.shadowing.index < finding.shadowed.index);
            }
        }

        /// Rendering the same intent twice yields disposition-identical
        /// chains under both management modes.
        #[test]
        fn render_is_deterministic(
            rules in proptest::collection::vec(arb_rule(), 0..10),
            packet in arb_packet()
        ) {
            let mut intent = Intent::new();
            intent.rules = rules;
            intent.workloads.push(Workload::new(
                "api",
                vec!["8089:8080/tcp".parse().unwrap()],
            ));

            for mode in [RuleManagement::RuntimeManaged, RuleManagement::AdminManaged] {
                let a = render(&intent, mode);
                let b = render(&intent, mode);
                prop_assert_eq!(a.len(), b.len());
                prop_assert_eq!(
                    evaluate(&a, &packet).action,
                    evaluate(&b, &packet).action
                );
            }
        }
    }
}
