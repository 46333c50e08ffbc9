use std::collections::BTreeMap;

use pretty_assertions::assert_eq;
use rstest::rstest;

use super::{assert_consistent, sandbox};
use crate::doctor::{diagnose, doctor, Finding};
use crate::fixtures::Sandbox;
use crate::object::{HasArcs, HasConfig};

#[rstest]
fn clean_project_has_no_findings(sandbox: Sandbox) {
    sandbox.task("tasks/t1");
    let t2 = sandbox.task("tasks/t2");
    sandbox.algorithm("algs/a");
    t2.add_input(&sandbox.node("tasks/t1"), "gen").unwrap();
    t2.add_algorithm(&sandbox.node("algs/a")).unwrap();

    assert_eq!(Vec::<Finding>::new(), diagnose(&sandbox.node("")).unwrap());
}

#[rstest]
fn one_sided_arcs(sandbox: Sandbox) {
    let t1 = sandbox.task("tasks/t1");
    let t2 = sandbox.task("tasks/t2");
    let t3 = sandbox.task("tasks/t3");
    t2.add_input(&sandbox.node("tasks/t1"), "gen").unwrap();
    t3.add_input(&sandbox.node("tasks/t2"), "sel").unwrap();

    // drop one endpoint of each arc behind the graph's back
    t1.unlink_successor("tasks/t2").unwrap();
    t3.unlink_predecessor("tasks/t2").unwrap();

    let findings = diagnose(&sandbox.node("")).unwrap();
    assert_eq!(
        vec![
            Finding::DanglingPredecessor {
                node: "tasks/t2".into(),
                predecessor: "tasks/t1".into(),
            },
            Finding::DanglingSuccessor {
                node: "tasks/t2".into(),
                successor: "tasks/t3".into(),
            },
        ],
        findings
    );

    let report = doctor(&sandbox.session, &sandbox.node(""), |_| true).unwrap();
    assert!(report.iter().all(|(_, repaired)| *repaired));
    assert!(t2.predecessor_paths().unwrap().is_empty());
    assert_eq!(None, t2.path_of("gen").unwrap());
    assert!(t2.successor_paths().unwrap().is_empty());
    assert_consistent(&sandbox);
}

#[rstest]
fn zombie_endpoint(sandbox: Sandbox) {
    let t1 = sandbox.task("tasks/t1");
    let t2 = sandbox.task("tasks/t2");
    t2.add_input(&sandbox.node("tasks/t1"), "gen").unwrap();
    std::fs::remove_dir_all(t1.path()).unwrap();

    assert_eq!(
        vec![Finding::DanglingPredecessor {
            node: "tasks/t2".into(),
            predecessor: "tasks/t1".into(),
        }],
        diagnose(&sandbox.node("")).unwrap()
    );
    doctor(&sandbox.session, &sandbox.node("tasks"), |_| true).unwrap();
    assert!(t2.predecessor_paths().unwrap().is_empty());
    assert!(t2.alias_order().unwrap().is_empty());
}

#[rstest]
fn unnamed_inputs_get_aliases(sandbox: Sandbox) {
    let t1 = sandbox.task("tasks/gen-2018");
    let t2 = sandbox.task("tasks/t2");
    let other = sandbox.task("more/gen-2018");
    t2.add_arc_from(&t1).unwrap();
    t2.add_arc_from(&other).unwrap();

    let report = doctor(&sandbox.session, &sandbox.node(""), |_| true).unwrap();
    assert_eq!(2, report.len());

    let expected: BTreeMap<String, String> = [
        ("gen_2018".to_string(), "tasks/gen-2018".to_string()),
        ("gen_2018_1".to_string(), "more/gen-2018".to_string()),
    ]
    .into();
    assert_eq!(expected, t2.alias_to_path().unwrap());
    assert_eq!(vec!["gen_2018", "gen_2018_1"], t2.alias_order().unwrap());
    assert_consistent(&sandbox);
}

#[rstest]
fn orphan_alias(sandbox: Sandbox) {
    sandbox.task("tasks/t1");
    let t2 = sandbox.task("tasks/t2");
    t2.add_input(&sandbox.node("tasks/t1"), "gen").unwrap();

    let mut aliases = t2.alias_to_path().unwrap();
    aliases.insert("stale".into(), "tasks/gone".into());
    t2.config_file()
        .write_variable("alias_to_path", &aliases)
        .unwrap();

    let finding = Finding::OrphanAlias {
        node: "tasks/t2".into(),
        alias: "stale".into(),
        path: "tasks/gone".into(),
    };
    assert_eq!(vec![finding.clone()], diagnose(&sandbox.node("")).unwrap());
    assert_eq!(
        "tasks/t2: alias stale points to tasks/gone, which is not an input",
        finding.to_string()
    );

    doctor(&sandbox.session, &sandbox.node(""), |_| true).unwrap();
    assert_eq!(None, t2.path_of("stale").unwrap());
    assert_eq!(Some("tasks/t1".to_string()), t2.path_of("gen").unwrap());
}

#[rstest]
fn declined_findings_stay(sandbox: Sandbox) {
    let t1 = sandbox.task("tasks/t1");
    let t2 = sandbox.task("tasks/t2");
    t2.add_arc_from(&t1).unwrap();

    let report = doctor(&sandbox.session, &sandbox.node(""), |_| false).unwrap();
    assert_eq!(
        vec![(
            Finding::UnnamedInput {
                node: "tasks/t2".into(),
                input: "tasks/t1".into(),
            },
            false
        )],
        report
    );
    assert!(t2.alias_to_path().unwrap().is_empty());
}

#[rstest]
fn repairs_are_idempotent(sandbox: Sandbox) {
    let t1 = sandbox.task("tasks/t1");
    let t2 = sandbox.task("tasks/t2");
    t2.add_arc_from(&t1).unwrap();
    t1.unlink_successor("tasks/t2").unwrap();

    let findings = diagnose(&sandbox.node("")).unwrap();
    for finding in &findings {
        crate::doctor::repair(sandbox.root(), finding).unwrap();
        crate::doctor::repair(sandbox.root(), finding).unwrap();
    }
    assert!(diagnose(&sandbox.node("")).unwrap().is_empty());
}
