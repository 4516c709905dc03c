/// Integration tests for the judge loop
///
/// These tests run real processes: small `/bin/sh` scripts stand in for the
/// compiled program and follow the `prog <input> <output>` contract.
/// 1. Passing, failing and generate-only cases are classified correctly
/// 2. Timeouts kill the program and never reach the comparator
/// 3. Runtime errors are detected from the exit status
/// 4. Stop-on-fail leaves later cases unrun
/// 5. Post-run cleanup only touches graded outputs
/// 6. Interactive sessions are judged by the interactor
/// 7. Case-level I/O and spawn failures fail that case, not the run
/// 8. Stress sessions stop at the first mismatch, timeout or crash

#[cfg(all(test, unix))]
mod judge_loop_tests {
    use crate::engine::ProcessEngine;
    use crate::executor::Judge;
    use crate::interactive::{run_interactive, InteractiveVerdict};
    use crate::render::RenderConfig;
    use crate::stress::{Role, StressOptions, StressOutcome, StressTester};
    use cpjudge_common::config::{CleanupPolicy, JudgeConfig};
    use cpjudge_common::types::{CaseStatus, ExecutionOutcome, InferenceReason, RunSummary, WhitespacePolicy};
    use lazy_static::lazy_static;
    use std::fs;
    use std::os::unix::fs::PermissionsExt;
    use std::path::{Path, PathBuf};
    use std::time::{Duration, Instant};
    use tempfile::TempDir;

    lazy_static! {
        // Writing a script while another test forks can fail exec with ETXTBSY
        static ref SERIAL: tokio::sync::Mutex<()> = tokio::sync::Mutex::new(());
    }

    struct Fixture {
        dir: TempDir,
    }

    impl Fixture {
        fn new() -> Self {
            let dir = TempDir::new().expect("Failed to create temp dir");
            fs::create_dir(dir.path().join("tests")).expect("Failed to create tests dir");
            Self { dir }
        }

        fn tests(&self) -> PathBuf {
            self.dir.path().join("tests")
        }

        fn case(&self, name: &str, content: &str) -> PathBuf {
            let path = self.tests().join(name);
            fs::write(&path, content).expect("Failed to write case file");
            path
        }

        fn script(&self, name: &str, body: &str) -> PathBuf {
            let path = self.dir.path().join(name);
            fs::write(&path, format!("#!/bin/sh\n{}\n", body)).expect("Failed to write script");
            let mut perms = fs::metadata(&path).unwrap().permissions();
            perms.set_mode(0o755);
            fs::set_permissions(&path, perms).unwrap();
            path
        }

        fn judge(&self, program: &Path, config: JudgeConfig) -> Judge {
            Judge::new(program, &self.tests(), config, RenderConfig::plain(100)).expect("Failed to create judge")
        }
    }

    fn keep_outputs() -> JudgeConfig {
        JudgeConfig {
            cleanup: CleanupPolicy::None,
            ..JudgeConfig::default()
        }
    }

    async fn run(fixture: &Fixture, program: &Path, config: JudgeConfig) -> RunSummary {
        fixture.judge(program, config).run_all().await.expect("Run failed")
    }

    /// Doubles the single integer in the input
    const DOUBLER: &str = r#"read n < "$1"; echo $((n * 2)) > "$2""#;

    #[tokio::test]
    async fn test_all_cases_pass() {
        let _guard = SERIAL.lock().await;
        let fx = Fixture::new();
        let prog = fx.script("prog", DOUBLER);
        fx.case("1.in", "5\n");
        fx.case("1.ans", "10\n");
        fx.case("2.in", "21\n");
        fx.case("2.ans", "42");

        let summary = run(&fx, &prog, keep_outputs()).await;

        assert_eq!(summary.discovered, 2);
        assert_eq!(summary.passed(), 2);
        assert!(summary.is_success());
        assert!(summary.cases.iter().all(|c| c.status == CaseStatus::Passed));
        assert_eq!(fs::read_to_string(fx.tests().join("2.out")).unwrap(), "42\n");
    }

    #[tokio::test]
    async fn test_cases_run_in_numeric_order() {
        let _guard = SERIAL.lock().await;
        let fx = Fixture::new();
        let prog = fx.script("prog", DOUBLER);
        for id in [10, 2, 1] {
            fx.case(&format!("{}.in", id), "1\n");
            fx.case(&format!("{}.ans", id), "2\n");
        }

        let summary = run(&fx, &prog, keep_outputs()).await;
        let ids: Vec<u64> = summary.cases.iter().map(|c| c.id).collect();
        assert_eq!(ids, vec![1, 2, 10]);
    }

    #[tokio::test]
    async fn test_wrong_answer_blames_sub_test() {
        let _guard = SERIAL.lock().await;
        let fx = Fixture::new();
        let prog = fx.script("prog", r#"printf '2\n5\n6\n' > "$2""#);
        fx.case("1.in", "3\n1\n2\n3\n");
        fx.case("1.ans", "2\n4\n6\n");

        let summary = run(&fx, &prog, keep_outputs()).await;
        let report = &summary.cases[0];

        assert_eq!(report.status, CaseStatus::WrongAnswer);
        assert!(!summary.is_success());

        let diff = report.first_diff.as_ref().expect("line diff");
        assert_eq!(diff.line, 2);
        assert_eq!(diff.expected_line, "4");
        assert_eq!(diff.actual_line, "5");

        let token = report.first_token_diff.as_ref().expect("token diff");
        assert_eq!(token.token_index, 2);

        let subtest = report.subtest.expect("inference");
        assert_eq!(subtest.index, Some(2));
        assert_eq!(subtest.reason, InferenceReason::ByLineCount);
        assert_eq!(subtest.declared_count, Some(3));
    }

    #[tokio::test]
    async fn test_inference_ignores_header_block() {
        let _guard = SERIAL.lock().await;
        let fx = Fixture::new();
        let prog = fx.script("prog", r#"printf '1\n9\n' > "$2""#);
        fx.case("1.in", "/* Problem Name: Pairs */\n2\n1 0\n4 5\n");
        fx.case("1.ans", "1\n9\n");
        fx.case("2.in", "/* Problem Name: Pairs */\n2\n0 1\n4 4\n");
        fx.case("2.ans", "1\n8\n");

        let summary = run(&fx, &prog, keep_outputs()).await;

        assert_eq!(summary.cases[0].status, CaseStatus::Passed);
        assert_eq!(summary.cases[0].problem_name.as_deref(), Some("Pairs"));
        let subtest = summary.cases[1].subtest.expect("inference");
        assert_eq!(subtest.index, Some(2));
        assert_eq!(subtest.declared_count, Some(2));
    }

    #[tokio::test]
    async fn test_timeout_with_partial_output_is_not_a_mismatch() {
        let _guard = SERIAL.lock().await;
        let fx = Fixture::new();
        let prog = fx.script("prog", r#"echo 10 > "$2"; sleep 5"#);
        fx.case("1.in", "/** Time Limit: 300 ms */\n5\n");
        fx.case("1.ans", "10\n");

        let started = Instant::now();
        let summary = run(&fx, &prog, keep_outputs()).await;
        let report = &summary.cases[0];

        assert!(started.elapsed() < Duration::from_secs(4), "timeout did not kill the program");
        assert_eq!(report.status, CaseStatus::TimeLimitExceeded);
        assert_eq!(report.outcome, ExecutionOutcome::TimedOut { limit_ms: 300 });
        assert!(report.first_diff.is_none());
        assert!(report.policy.is_none());
        assert!(fx.tests().join("1.out").exists());
    }

    #[tokio::test]
    async fn test_runtime_error_surfaces_stderr() {
        let _guard = SERIAL.lock().await;
        let fx = Fixture::new();
        let prog = fx.script("prog", r#"echo "boom" >&2; exit 3"#);
        fx.case("1.in", "1\n");
        fx.case("1.ans", "2\n");

        let summary = run(&fx, &prog, keep_outputs()).await;
        let report = &summary.cases[0];

        assert_eq!(report.status, CaseStatus::RuntimeError);
        assert!(matches!(report.outcome, ExecutionOutcome::Completed { exit_code: 3, .. }));
        assert!(report.stderr.contains("boom"));
    }

    #[tokio::test]
    async fn test_killed_by_signal_is_runtime_error() {
        let _guard = SERIAL.lock().await;
        let fx = Fixture::new();
        let prog = fx.script("prog", "kill -9 $$");
        fx.case("1.in", "1\n");
        fx.case("1.ans", "2\n");

        let summary = run(&fx, &prog, keep_outputs()).await;
        let report = &summary.cases[0];

        assert_eq!(report.status, CaseStatus::RuntimeError);
        assert!(matches!(report.outcome, ExecutionOutcome::Killed { signal: Some(9), .. }));
    }

    #[tokio::test]
    async fn test_missing_answer_generates_output_only() {
        let _guard = SERIAL.lock().await;
        let fx = Fixture::new();
        let prog = fx.script("prog", DOUBLER);
        fx.case("1.in", "4\n");

        let summary = run(&fx, &prog, JudgeConfig::default()).await;

        assert_eq!(summary.cases[0].status, CaseStatus::GeneratedOnly);
        assert_eq!(summary.graded(), 0);
        assert!(summary.is_success());
        // Generate-only outputs survive the post-run cleanup
        assert_eq!(fs::read_to_string(fx.tests().join("1.out")).unwrap(), "8\n");
    }

    #[tokio::test]
    async fn test_cleanup_after_full_pass() {
        let _guard = SERIAL.lock().await;
        let fx = Fixture::new();
        let prog = fx.script("prog", DOUBLER);
        fx.case("1.in", "1\n");
        fx.case("1.ans", "2\n");
        fx.case("2.in", "3\n");

        let summary = run(&fx, &prog, JudgeConfig::default()).await;

        assert!(summary.is_success());
        assert!(!fx.tests().join("1.out").exists());
        assert!(fx.tests().join("2.out").exists());
        assert!(prog.exists());
    }

    #[tokio::test]
    async fn test_no_cleanup_after_failure() {
        let _guard = SERIAL.lock().await;
        let fx = Fixture::new();
        let prog = fx.script("prog", DOUBLER);
        fx.case("1.in", "1\n");
        fx.case("1.ans", "3\n");

        let config = JudgeConfig {
            cleanup: CleanupPolicy::All,
            ..JudgeConfig::default()
        };
        let summary = run(&fx, &prog, config).await;

        assert!(!summary.is_success());
        assert!(fx.tests().join("1.out").exists());
        assert!(prog.exists());
    }

    #[tokio::test]
    async fn test_stop_on_fail_leaves_cases_unrun() {
        let _guard = SERIAL.lock().await;
        let fx = Fixture::new();
        let prog = fx.script("prog", DOUBLER);
        fx.case("1.in", "1\n");
        fx.case("1.ans", "5\n");
        fx.case("2.in", "2\n");
        fx.case("2.ans", "4\n");

        let config = JudgeConfig {
            stop_on_fail: true,
            ..keep_outputs()
        };
        let summary = run(&fx, &prog, config).await;

        assert_eq!(summary.cases.len(), 1);
        assert_eq!(summary.not_run, 1);
        assert!(!fx.tests().join("2.out").exists());
        assert!(!summary.is_success());
    }

    #[tokio::test]
    async fn test_unreadable_output_fails_only_that_case() {
        let _guard = SERIAL.lock().await;
        let fx = Fixture::new();
        let prog = fx.script(
            "prog",
            r#"read n < "$1"; if [ "$n" = 1 ]; then mkdir "$2"; else echo $((n * 2)) > "$2"; fi"#,
        );
        fx.case("1.in", "1\n");
        fx.case("1.ans", "2\n");
        fx.case("2.in", "3\n");
        fx.case("2.ans", "6\n");

        let summary = run(&fx, &prog, keep_outputs()).await;

        assert_eq!(summary.cases.len(), 2);
        assert_eq!(summary.cases[0].status, CaseStatus::RuntimeError);
        assert!(summary.cases[0].stderr.contains("1.out"));
        assert_eq!(summary.cases[1].status, CaseStatus::Passed);
        assert!(!summary.is_success());
    }

    #[tokio::test]
    async fn test_program_that_cannot_start_fails_each_case() {
        let _guard = SERIAL.lock().await;
        let fx = Fixture::new();
        let prog = fx.dir.path().join("prog");
        fs::write(&prog, "#!/bin/sh\nexit 0\n").unwrap();
        let mut perms = fs::metadata(&prog).unwrap().permissions();
        perms.set_mode(0o644);
        fs::set_permissions(&prog, perms).unwrap();
        fx.case("1.in", "1\n");
        fx.case("1.ans", "2\n");
        fx.case("2.in", "2\n");
        fx.case("2.ans", "4\n");

        let summary = run(&fx, &prog, keep_outputs()).await;

        assert_eq!(summary.cases.len(), 2);
        for report in &summary.cases {
            assert_eq!(report.status, CaseStatus::RuntimeError);
            assert_eq!(report.outcome, ExecutionOutcome::NotStarted);
            assert!(report.stderr.contains("Failed to start"));
        }
    }

    #[tokio::test]
    async fn test_memory_limit_enforced_only_when_requested() {
        let _guard = SERIAL.lock().await;
        let fx = Fixture::new();
        let prog = fx.script("prog", r#"echo ok > "$2""#);
        fx.case("1.in", "/** Memory Limit: 1 MB */\n1\n");
        fx.case("1.ans", "ok\n");

        let capped = JudgeConfig {
            enforce_memory: true,
            ..keep_outputs()
        };
        let summary = run(&fx, &prog, capped).await;
        assert_eq!(summary.cases[0].status, CaseStatus::RuntimeError);

        let summary = run(&fx, &prog, keep_outputs()).await;
        assert_eq!(summary.cases[0].status, CaseStatus::Passed);
    }

    #[tokio::test]
    async fn test_numeric_tolerance_and_whitespace() {
        let _guard = SERIAL.lock().await;
        let fx = Fixture::new();
        let prog = fx.script("prog", r#"printf '1.0005   1.9996\n\n' > "$2""#);
        fx.case("1.in", "0\n");
        fx.case("1.ans", "1.000 2.000\n");

        let config = JudgeConfig {
            numeric_tolerance: Some(0.001),
            ..keep_outputs()
        };
        let summary = run(&fx, &prog, config).await;

        let report = &summary.cases[0];
        assert_eq!(report.status, CaseStatus::Passed);
        assert!(report.used_numeric_tolerance);
    }

    #[tokio::test]
    async fn test_stale_output_is_removed_before_run() {
        let _guard = SERIAL.lock().await;
        let fx = Fixture::new();
        let prog = fx.script("prog", "exit 0");
        fx.case("1.in", "1\n");
        fx.case("1.ans", "2\n");
        fx.case("1.out", "2\n");

        let summary = run(&fx, &prog, keep_outputs()).await;
        assert_eq!(summary.cases[0].status, CaseStatus::WrongAnswer);
    }

    #[tokio::test]
    async fn test_empty_tests_dir_is_clean() {
        let _guard = SERIAL.lock().await;
        let fx = Fixture::new();
        let prog = fx.script("prog", DOUBLER);

        let summary = run(&fx, &prog, keep_outputs()).await;
        assert_eq!(summary.discovered, 0);
        assert!(summary.is_success());
    }

    #[tokio::test]
    async fn test_engine_reports_elapsed_time() {
        let _guard = SERIAL.lock().await;
        let fx = Fixture::new();
        let prog = fx.script("prog", DOUBLER);
        let input = fx.case("1.in", "3\n");
        let output = fx.tests().join("1.out");

        let engine = ProcessEngine::new(&prog, false).unwrap();
        let run = engine
            .execute(&input, &output, Duration::from_secs(5), 0)
            .await
            .unwrap();

        assert!(run.outcome.is_clean());
        assert!(run.outcome.elapsed_ms().is_some());
        assert_eq!(fs::read_to_string(output).unwrap(), "6\n");
    }

    #[tokio::test]
    async fn test_interactive_accepted() {
        let _guard = SERIAL.lock().await;
        let fx = Fixture::new();
        let solution = fx.script("sol", "read x; echo $((x * 2))");
        let interactor = fx.script("int", r#"echo 21; read y; [ "$y" = "42" ]"#);

        let report = run_interactive(&solution, &interactor, Duration::from_secs(5)).await.unwrap();
        assert_eq!(report.verdict, InteractiveVerdict::Accepted);
        assert_eq!(report.interactor_exit, Some(0));
        assert_eq!(report.solution_exit, Some(0));
    }

    #[tokio::test]
    async fn test_interactive_wrong_answer() {
        let _guard = SERIAL.lock().await;
        let fx = Fixture::new();
        let solution = fx.script("sol", "read x; echo $((x + 1))");
        let interactor = fx.script("int", r#"echo 21; read y; [ "$y" = "42" ]"#);

        let report = run_interactive(&solution, &interactor, Duration::from_secs(5)).await.unwrap();
        assert_eq!(report.verdict, InteractiveVerdict::WrongAnswer);
    }

    #[tokio::test]
    async fn test_interactive_runtime_error() {
        let _guard = SERIAL.lock().await;
        let fx = Fixture::new();
        let solution = fx.script("sol", "read x; echo $((x * 2)); exit 4");
        let interactor = fx.script("int", r#"echo 21; read y; [ "$y" = "42" ]"#);

        let report = run_interactive(&solution, &interactor, Duration::from_secs(5)).await.unwrap();
        assert_eq!(report.verdict, InteractiveVerdict::RuntimeError);
        assert_eq!(report.solution_exit, Some(4));
    }

    #[tokio::test]
    async fn test_interactive_timeout_kills_both() {
        let _guard = SERIAL.lock().await;
        let fx = Fixture::new();
        let solution = fx.script("sol", "sleep 5");
        let interactor = fx.script("int", "read y");

        let started = Instant::now();
        let report = run_interactive(&solution, &interactor, Duration::from_millis(300)).await.unwrap();

        assert_eq!(report.verdict, InteractiveVerdict::TimedOut);
        assert!(started.elapsed() < Duration::from_secs(4));
    }

    fn stress_options(fx: &Fixture, iterations: u64) -> StressOptions {
        StressOptions {
            iterations,
            time_limit: Duration::from_secs(2),
            whitespace: WhitespacePolicy::Auto,
            case_insensitive: false,
            numeric_tolerance: None,
            log_path: Some(fx.dir.path().join("stress_log.txt")),
            save_input: fx.dir.path().join("input.txt"),
        }
    }

    /// Prints its iteration number as the generated input
    const GEN: &str = r#"echo "$1""#;

    #[tokio::test]
    async fn test_stress_all_passed() {
        let _guard = SERIAL.lock().await;
        let fx = Fixture::new();
        let gen = fx.script("gen", GEN);
        let sol = fx.script("sol", "read n; echo $((n * 2))");
        let brute = fx.script("brute", "read n; echo $((n + n))");

        let tester = StressTester::new(&gen, &sol, &brute, stress_options(&fx, 5)).unwrap();
        let outcome = tester.run().await.unwrap();

        assert_eq!(outcome, StressOutcome::AllPassed { iterations: 5 });
        let log = fs::read_to_string(fx.dir.path().join("stress_log.txt")).unwrap();
        assert!(log.contains("[PASS] Test #5"));
        assert!(log.contains("ALL TESTS PASSED"));
        assert!(!fx.dir.path().join("input.txt").exists());
    }

    #[tokio::test]
    async fn test_stress_stops_at_first_mismatch() {
        let _guard = SERIAL.lock().await;
        let fx = Fixture::new();
        let gen = fx.script("gen", GEN);
        let sol = fx.script("sol", r#"read n; if [ "$n" = 3 ]; then echo 0; else echo $((n * 2)); fi"#);
        let brute = fx.script("brute", "read n; echo $((n * 2))");

        let tester = StressTester::new(&gen, &sol, &brute, stress_options(&fx, 10)).unwrap();
        let outcome = tester.run().await.unwrap();

        match outcome {
            StressOutcome::Mismatch {
                iteration,
                input,
                brute_output,
                solution_output,
            } => {
                assert_eq!(iteration, 3);
                assert_eq!(input, "3\n");
                assert_eq!(brute_output, "6\n");
                assert_eq!(solution_output, "0\n");
            }
            other => panic!("expected a mismatch, got {:?}", other),
        }
        assert_eq!(fs::read_to_string(fx.dir.path().join("input.txt")).unwrap(), "3\n");
        let log = fs::read_to_string(fx.dir.path().join("stress_log.txt")).unwrap();
        assert!(log.contains("[FAIL] Test #3"));
        assert!(!log.contains("Test #4"));
    }

    #[tokio::test]
    async fn test_stress_brute_timeout_stops() {
        let _guard = SERIAL.lock().await;
        let fx = Fixture::new();
        let gen = fx.script("gen", GEN);
        let sol = fx.script("sol", "read n; echo $n");
        let brute = fx.script("brute", "exec sleep 5");

        let options = StressOptions {
            time_limit: Duration::from_millis(300),
            log_path: None,
            ..stress_options(&fx, 3)
        };
        let started = Instant::now();
        let outcome = StressTester::new(&gen, &sol, &brute, options).unwrap().run().await.unwrap();

        assert_eq!(
            outcome,
            StressOutcome::TimedOut {
                iteration: 1,
                role: Role::Brute,
                input: "1\n".to_string(),
            }
        );
        assert!(started.elapsed() < Duration::from_secs(4));
    }

    #[tokio::test]
    async fn test_stress_generator_crash_stops() {
        let _guard = SERIAL.lock().await;
        let fx = Fixture::new();
        let gen = fx.script("gen", "echo broken >&2; exit 2");
        let sol = fx.script("sol", "cat");
        let brute = fx.script("brute", "cat");

        let outcome = StressTester::new(&gen, &sol, &brute, stress_options(&fx, 3))
            .unwrap()
            .run()
            .await
            .unwrap();

        match outcome {
            StressOutcome::Crashed { iteration, role, outcome, stderr, .. } => {
                assert_eq!(iteration, 1);
                assert_eq!(role, Role::Generator);
                assert!(matches!(outcome, ExecutionOutcome::Completed { exit_code: 2, .. }));
                assert!(stderr.contains("broken"));
            }
            other => panic!("expected a crash, got {:?}", other),
        }
        assert!(!fx.dir.path().join("input.txt").exists());
    }
}
