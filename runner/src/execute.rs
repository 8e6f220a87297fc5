// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::Result;
use mvt_tests::mvt_testcase::{
    filtered_test_cases, Framework, TestCase, TestOutcome,
};
use tracing::{error, info, warn};

use crate::config::RunOptions;
use crate::fixtures::TestFixtures;

/// Statistics returned after executing a set of tests.
pub struct ExecutionStats {
    /// The number of tests that passed.
    pub tests_passed: u32,

    /// The number of tests that failed.
    pub tests_failed: u32,

    /// The number of tests that marked themselves as skipped.
    pub tests_skipped: u32,

    /// The number of tests that the runner decided not to run (e.g. because
    /// of a failure in a fixture or an interrupt).
    pub tests_not_run: u32,

    /// The total time spent running tests and fixtures.
    pub duration: Duration,

    /// A collection of test cases that returned a failed result.
    pub failed_test_cases: Vec<&'static TestCase>,
}

/// Executes the selected tests sequentially against the supplied context.
///
/// Test bodies run under `catch_unwind` so a failed assertion records a
/// test failure instead of tearing the runner down. A fixture failure is
/// fatal to the rest of the run; in particular a failed pre-run health
/// check aborts before the first test.
pub fn run_tests_with_ctx(
    ctx: &Framework,
    mut fixtures: TestFixtures,
    run_opts: &RunOptions,
) -> Result<ExecutionStats> {
    let executions: Vec<&'static TestCase> = filtered_test_cases(
        &run_opts.include_filter,
        &run_opts.exclude_filter,
    )
    .collect();

    let mut stats = ExecutionStats {
        tests_passed: 0,
        tests_failed: 0,
        tests_skipped: 0,
        tests_not_run: executions.len() as u32,
        duration: Duration::default(),
        failed_test_cases: Vec::new(),
    };

    if executions.is_empty() {
        info!("No tests selected for execution");
        return Ok(stats);
    }

    let sigint_rx = set_sigint_handler();
    info!("Running {} test(s)", executions.len());
    let start_time = Instant::now();

    fixtures.execution_setup()?;

    for tc in executions {
        if sigint_rx.load(Ordering::Relaxed) {
            info!("Test run interrupted by SIGINT");
            break;
        }

        info!("Starting test {}", tc.fully_qualified_name());

        // Failure to run a setup fixture is fatal to the rest of the run,
        // but it's still possible to report results, so break gracefully.
        if let Err(e) = fixtures.test_setup() {
            error!("Error running test setup fixture: {}", e);
            break;
        }

        stats.tests_not_run -= 1;

        let test_outcome = catch_unwind(AssertUnwindSafe(|| tc.run(ctx)))
            .unwrap_or_else(|panic| {
                TestOutcome::Failed(Some(panic_message(panic)))
            });

        info!(
            "test {} ... {}{}",
            tc.fully_qualified_name(),
            match test_outcome {
                TestOutcome::Passed => "ok",
                TestOutcome::Failed(_) => "FAILED: ",
                TestOutcome::Skipped(_) => "skipped: ",
            },
            match &test_outcome {
                TestOutcome::Failed(Some(s))
                | TestOutcome::Skipped(Some(s)) => s,
                TestOutcome::Failed(None) | TestOutcome::Skipped(None) =>
                    "[no message]",
                _ => "",
            }
        );

        match test_outcome {
            TestOutcome::Passed => stats.tests_passed += 1,
            TestOutcome::Failed(_) => {
                stats.tests_failed += 1;
                stats.failed_test_cases.push(tc);
            }
            TestOutcome::Skipped(_) => stats.tests_skipped += 1,
        }

        if let Err(e) = fixtures.test_cleanup() {
            error!("Error running cleanup fixture: {}", e);
            break;
        }
    }

    fixtures.execution_cleanup()?;

    stats.duration = start_time.elapsed();
    Ok(stats)
}

fn panic_message(panic: Box<dyn std::any::Any + Send>) -> String {
    let msg = if let Some(s) = panic.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "test panicked".to_string()
    };
    format!("test panicked: {msg}")
}

/// Sets a global handler for SIGINT. Returns a flag the handler raises when
/// SIGINT is received; a second SIGINT exits immediately with the customary
/// interrupt exit code (130 is 128 + SIGINT).
fn set_sigint_handler() -> Arc<AtomicBool> {
    let sigint_rx = Arc::new(AtomicBool::new(false));
    let sigint_tx = sigint_rx.clone();
    ctrlc::set_handler(move || {
        if sigint_tx.load(Ordering::Relaxed) {
            error!("SIGINT received while shutting down, rudely terminating");
            std::process::exit(130);
        }
        warn!("SIGINT received, stopping after the current test");
        sigint_tx.store(true, Ordering::Relaxed);
    })
    .expect("failed to set SIGINT handler");

    sigint_rx
}
