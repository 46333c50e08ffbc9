use pretty_assertions::assert_eq;
use rstest::rstest;

use super::{assert_consistent, sandbox};
use crate::fixtures::{Sandbox, SCRIPT_CONTENTS_EDITED, SCRIPT_NAME};
use crate::object::{HasArcs, HasConfig, HasImpression};
use crate::{Error, Node};

fn uuid_of(sandbox: &Sandbox, invariant_path: &str) -> Option<String> {
    sandbox
        .node(invariant_path)
        .as_impressible()
        .expect("must be a task or algorithm")
        .impression()
        .unwrap()
        .map(|i| i.uuid().to_string())
}

#[rstest]
fn move_preserves_impressions(sandbox: Sandbox) {
    let t1 = sandbox.task("tasks/t1");
    sandbox.session.impress(&t1).unwrap();
    let u = uuid_of(&sandbox, "tasks/t1").unwrap();

    let moved = sandbox
        .node("tasks")
        .move_to(&sandbox.session, &sandbox.path("tasksMoved"))
        .unwrap();

    assert_eq!("tasksMoved", moved.invariant_path());
    assert!(!sandbox.path("tasks").exists());
    assert_eq!(Some(u), uuid_of(&sandbox, "tasksMoved/t1"));
    let Node::Task(t1) = sandbox.node("tasksMoved/t1") else {
        panic!("expected a task");
    };
    assert!(sandbox.session.is_impressed(&t1).unwrap());
}

#[rstest]
fn move_rewrites_external_arcs(sandbox: Sandbox) {
    let a = sandbox.algorithm("algs/a");
    sandbox.task("tasks/t1");
    let t2 = sandbox.task("tasks/t2");
    let outside = sandbox.task("ana/plot");
    t2.add_input(&sandbox.node("tasks/t1"), "gen").unwrap();
    t2.add_algorithm(&sandbox.node("algs/a")).unwrap();
    outside.add_input(&sandbox.node("tasks/t2"), "sel").unwrap();
    sandbox.session.impress(&outside).unwrap();
    let before = outside.settings().read().unwrap();
    let u2 = uuid_of(&sandbox, "tasks/t2");

    sandbox
        .node("tasks")
        .move_to(&sandbox.session, &sandbox.path("stages"))
        .unwrap();

    let Node::Task(t2) = sandbox.node("stages/t2") else {
        panic!("expected a task");
    };
    assert_eq!(vec!["stages/t1", "algs/a"], t2.predecessor_paths().unwrap());
    assert_eq!(Some("stages/t1".to_string()), t2.path_of("gen").unwrap());
    assert_eq!(vec!["stages/t2"], a.users().unwrap());
    assert_eq!(vec!["stages/t2"], outside.predecessor_paths().unwrap());
    assert_eq!(Some("stages/t2".to_string()), outside.path_of("sel").unwrap());
    assert_eq!(u2, uuid_of(&sandbox, "stages/t2"));

    // the far endpoint's settings are untouched, so its impression still holds
    assert_eq!(before, outside.settings().read().unwrap());
    sandbox.session.reset();
    assert!(sandbox.session.is_impressed(&outside).unwrap());
    assert_consistent(&sandbox);
}

#[rstest]
fn move_requires_impressions(sandbox: Sandbox) {
    sandbox.task("tasks/t1");
    assert!(matches!(
        sandbox
            .node("tasks")
            .move_to(&sandbox.session, &sandbox.path("elsewhere")),
        Err(Error::NotImpressed(_))
    ));
    assert!(sandbox.path("tasks/t1").is_dir());
    assert!(!sandbox.path("elsewhere").exists());
}

#[rstest]
fn move_into_itself_is_rejected(sandbox: Sandbox) {
    let t1 = sandbox.task("tasks/t1");
    sandbox.session.impress(&t1).unwrap();
    assert!(matches!(
        sandbox
            .node("tasks")
            .move_to(&sandbox.session, &sandbox.path("tasks/inner")),
        Err(Error::ConstraintViolation(_))
    ));
    assert!(matches!(
        sandbox
            .node("tasks/t1")
            .move_to(&sandbox.session, &sandbox.path("tasks/t1/deeper")),
        Err(Error::ConstraintViolation(_))
    ));
}

#[rstest]
fn copy_reimpresses(sandbox: Sandbox) {
    let t1 = sandbox.task("tasks/t1");
    sandbox.session.impress(&t1).unwrap();
    let original = t1.impression().unwrap().unwrap();

    sandbox
        .node("tasks")
        .copy_to(&sandbox.session, &sandbox.path("tasksDup"))
        .unwrap();

    let Node::Task(copy) = sandbox.node("tasksDup/t1") else {
        panic!("expected a task");
    };
    let copied = copy.impression().unwrap().expect("copy must be impressed");
    assert_ne!(original.uuid(), copied.uuid());
    assert_eq!(original.tree().unwrap(), copied.tree().unwrap());
    assert_eq!(
        original.dependencies().unwrap(),
        copied.dependencies().unwrap()
    );
    assert!(sandbox.session.is_impressed(&copy).unwrap());
    // the original is untouched
    assert_eq!(Some(original), t1.impression().unwrap());
}

#[rstest]
fn copy_keeps_internal_arcs_only(sandbox: Sandbox) {
    sandbox.algorithm("algs/a");
    sandbox.task("tasks/t1");
    let t2 = sandbox.task("tasks/t2");
    let outside = sandbox.task("ana/plot");
    t2.add_input(&sandbox.node("tasks/t1"), "gen").unwrap();
    t2.add_algorithm(&sandbox.node("algs/a")).unwrap();
    outside.add_input(&sandbox.node("tasks/t2"), "sel").unwrap();

    sandbox
        .node("tasks")
        .copy_to(&sandbox.session, &sandbox.path("tasksDup"))
        .unwrap();

    let Node::Task(copy) = sandbox.node("tasksDup/t2") else {
        panic!("expected a task");
    };
    assert_eq!(vec!["tasksDup/t1"], copy.predecessor_paths().unwrap());
    assert_eq!(Some("tasksDup/t1".to_string()), copy.path_of("gen").unwrap());
    assert!(copy.successor_paths().unwrap().is_empty());
    assert_eq!(vec!["gen"], copy.alias_order().unwrap());
    assert_eq!(vec!["tasks/t2"], outside.predecessor_paths().unwrap());
    assert_eq!(vec!["tasks/t2"], sandbox_algorithm_users(&sandbox));

    for path in ["tasksDup/t1", "tasksDup/t2"] {
        let node = sandbox.node(path);
        let node = node.as_impressible().unwrap();
        assert!(sandbox.session.is_impressed(node).unwrap(), "{}", path);
    }
    assert_consistent(&sandbox);
}

fn sandbox_algorithm_users(sandbox: &Sandbox) -> Vec<String> {
    match sandbox.node("algs/a") {
        Node::Algorithm(a) => a.users().unwrap(),
        other => panic!("expected an algorithm, got {}", other),
    }
}

#[rstest]
fn copy_of_edited_task_diverges(sandbox: Sandbox) {
    let t1 = sandbox.task("tasks/t1");
    sandbox.session.impress(&t1).unwrap();
    std::fs::write(t1.path().join(SCRIPT_NAME), SCRIPT_CONTENTS_EDITED).unwrap();

    sandbox
        .node("tasks/t1")
        .copy_to(&sandbox.session, &sandbox.path("tasks/t1b"))
        .unwrap();
    let copied = uuid_of(&sandbox, "tasks/t1b").unwrap();
    let Node::Task(copy) = sandbox.node("tasks/t1b") else {
        panic!("expected a task");
    };
    assert_eq!(
        std::fs::read(copy.path().join(SCRIPT_NAME)).unwrap(),
        std::fs::read(
            copy.impression()
                .unwrap()
                .unwrap()
                .contents_path()
                .join(SCRIPT_NAME)
        )
        .unwrap()
    );
    assert_ne!(uuid_of(&sandbox, "tasks/t1"), Some(copied));
}

#[rstest]
fn rm_leaves_no_dangling_arcs(sandbox: Sandbox) {
    let a = sandbox.algorithm("algs/a");
    let t1 = sandbox.task("tasks/t1");
    let t2 = sandbox.task("tasks/t2");
    let t3 = sandbox.task("ana/t3");
    t2.add_input(&sandbox.node("tasks/t1"), "gen").unwrap();
    t2.add_algorithm(&sandbox.node("algs/a")).unwrap();
    t3.add_input(&sandbox.node("tasks/t2"), "sel").unwrap();
    t3.add_input(&sandbox.node("tasks/t1"), "raw").unwrap();
    t3.add_algorithm(&sandbox.node("algs/a")).unwrap();

    sandbox.node("tasks/t2").rm(&sandbox.session).unwrap();

    assert!(!sandbox.path("tasks/t2").exists());
    assert_eq!(vec!["ana/t3"], t1.successor_paths().unwrap());
    assert_eq!(vec!["ana/t3"], a.users().unwrap());
    assert_eq!(vec!["tasks/t1", "algs/a"], t3.predecessor_paths().unwrap());
    assert_eq!(None, t3.path_of("sel").unwrap());
    assert_eq!(vec!["raw"], t3.alias_order().unwrap());
    assert_consistent(&sandbox);

    sandbox.node("tasks").rm(&sandbox.session).unwrap();
    assert_eq!(vec!["algs/a"], t3.predecessor_paths().unwrap());
    assert!(t3.alias_to_path().unwrap().is_empty());
    assert_consistent(&sandbox);
}

#[rstest]
fn rm_project_is_invalid(sandbox: Sandbox) {
    assert!(matches!(
        sandbox.node("").rm(&sandbox.session),
        Err(Error::InvalidTarget(_))
    ));
    assert!(matches!(
        sandbox.node("missing").rm(&sandbox.session),
        Err(Error::InvalidTarget(_))
    ));
}

#[rstest]
fn rm_keeps_impressions(sandbox: Sandbox) {
    let t1 = sandbox.task("tasks/t1");
    sandbox.session.impress(&t1).unwrap();
    let impression = t1.impression().unwrap().unwrap();

    sandbox.node("tasks/t1").rm(&sandbox.session).unwrap();
    assert!(!impression.is_zombie());
}
