use rstest::fixture;

use crate::fixtures::Sandbox;

mod doctor;
mod mutate;

#[fixture]
fn sandbox() -> Sandbox {
    Sandbox::new()
}

/// Asserts arc symmetry and alias integrity over the whole project.
fn assert_consistent(sandbox: &Sandbox) {
    let findings = crate::doctor::diagnose(&sandbox.node("")).expect("must diagnose");
    assert!(findings.is_empty(), "unexpected findings: {:?}", findings);
}
