use async_trait::async_trait;
use sheet_launcher::core::launcher::write_report;
use sheet_launcher::domain::model::{FlowKind, Invocation, LaunchState, RunOutcome};
use sheet_launcher::domain::ports::ProcessRunner;
use sheet_launcher::{
    ConvertArgs, FlowRequest, LauncherConfig, LauncherError, Launcher, MarkArgs, Result,
};
use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use tempfile::TempDir;

/// 依腳本設定回應的假行程執行器，記錄每一次呼叫
#[derive(Default)]
struct ScriptedRunner {
    python: Option<PathBuf>,
    missing: Mutex<HashSet<String>>,
    install_code: i32,
    install_fixes: bool,
    routine_codes: HashMap<String, i32>,
    creates: HashMap<String, PathBuf>,
    /// 匯入這些模組時模擬無法啟動子行程，直到安裝成功
    spawn_failures: HashSet<String>,
    installed: Mutex<bool>,
    calls: Mutex<Vec<Invocation>>,
}

impl ScriptedRunner {
    fn with_python() -> Self {
        Self {
            python: Some(PathBuf::from("/usr/bin/python3")),
            install_fixes: true,
            ..Self::default()
        }
    }

    fn missing(self, names: &[&str]) -> Self {
        *self.missing.lock().unwrap() = names.iter().map(|n| n.to_string()).collect();
        self
    }

    fn calls(&self) -> Vec<Invocation> {
        self.calls.lock().unwrap().clone()
    }

    fn count(&self, first_arg: &str) -> usize {
        self.calls()
            .iter()
            .filter(|call| call.args.first().map(String::as_str) == Some(first_arg))
            .count()
    }

    /// 被執行的腳本檔名，依呼叫順序
    fn routines(&self) -> Vec<(String, Vec<String>)> {
        self.calls()
            .iter()
            .filter(|call| !matches!(call.args[0].as_str(), "--version" | "-c" | "-m"))
            .map(|call| {
                let name = Path::new(&call.args[0])
                    .file_name()
                    .unwrap()
                    .to_string_lossy()
                    .into_owned();
                (name, call.args[1..].to_vec())
            })
            .collect()
    }
}

#[async_trait]
impl ProcessRunner for ScriptedRunner {
    fn locate(&self, _program: &str) -> Option<PathBuf> {
        self.python.clone()
    }

    async fn run(&self, invocation: &Invocation) -> Result<RunOutcome> {
        self.calls.lock().unwrap().push(invocation.clone());

        match invocation.args[0].as_str() {
            "--version" => Ok(RunOutcome {
                code: Some(0),
                stdout: "Python 3.11.4\n".to_string(),
                stderr: String::new(),
            }),
            "-c" => {
                let module = invocation.args[1].trim_start_matches("import ");
                if self.spawn_failures.contains(module) && !*self.installed.lock().unwrap() {
                    let error = std::io::Error::new(std::io::ErrorKind::Other, "spawn failed");
                    return Err(error.into());
                }
                if self.missing.lock().unwrap().contains(module) {
                    Ok(RunOutcome {
                        code: Some(1),
                        stdout: String::new(),
                        stderr: format!("ModuleNotFoundError: No module named '{}'", module),
                    })
                } else {
                    Ok(RunOutcome::exited(0))
                }
            }
            "-m" => {
                if self.install_code == 0 && self.install_fixes {
                    self.missing.lock().unwrap().clear();
                    *self.installed.lock().unwrap() = true;
                }
                Ok(RunOutcome::exited(self.install_code))
            }
            script => {
                let name = Path::new(script)
                    .file_name()
                    .unwrap()
                    .to_string_lossy()
                    .into_owned();
                let code = self.routine_codes.get(&name).copied().unwrap_or(0);
                if code == 0 {
                    if let Some(path) = self.creates.get(&name) {
                        std::fs::write(path, "")?;
                    }
                }
                Ok(RunOutcome::exited(code))
            }
        }
    }
}

/// 建立含腳本與 requirements.txt 的工作目錄
fn workspace() -> (TempDir, LauncherConfig) {
    let dir = TempDir::new().unwrap();
    for script in [
        "test_marker.py",
        "mark_customer_type.py",
        "markdown_to_excel.py",
        "requirements.txt",
    ] {
        std::fs::write(dir.path().join(script), "").unwrap();
    }

    let mut config = LauncherConfig::with_defaults();
    config.paths.working_dir = dir.path().to_path_buf();
    (dir, config)
}

#[tokio::test]
async fn test_missing_interpreter_halts_before_probing() {
    let (_dir, config) = workspace();
    let runner = ScriptedRunner::default();
    let launcher = Launcher::new(runner, config);

    let outcome = launcher
        .launch(&FlowRequest::Convert(ConvertArgs::default()))
        .await;

    assert_eq!(outcome.exit_code(), 1);
    assert_eq!(outcome.report.final_state, LaunchState::Halt);
    assert!(outcome.report.interpreter.is_none());
    assert!(matches!(
        outcome.error,
        Some(LauncherError::InterpreterMissing { .. })
    ));
    assert!(launcher.runner().calls().is_empty());
}

#[tokio::test]
async fn test_failed_install_runs_once_and_skips_conversion() {
    let (_dir, config) = workspace();
    let runner = ScriptedRunner {
        install_code: 1,
        ..ScriptedRunner::with_python()
    }
    .missing(&["yaml"]);
    let launcher = Launcher::new(runner, config);

    let outcome = launcher
        .launch(&FlowRequest::Convert(ConvertArgs::default()))
        .await;

    assert_eq!(outcome.exit_code(), 1);
    assert!(matches!(
        outcome.error,
        Some(LauncherError::InstallFailed { .. })
    ));
    assert_eq!(launcher.runner().count("-m"), 1);
    assert!(launcher.runner().routines().is_empty());
    assert!(outcome.report.steps.is_empty());
}

#[tokio::test]
async fn test_install_then_convert() {
    let (_dir, config) = workspace();
    let runner = ScriptedRunner::with_python().missing(&["pandas", "openpyxl"]);
    let launcher = Launcher::new(runner, config);

    let outcome = launcher
        .launch(&FlowRequest::Convert(ConvertArgs::default()))
        .await;

    assert_eq!(outcome.exit_code(), 0);
    assert!(outcome.report.installed);
    assert_eq!(launcher.runner().count("-m"), 1);
    // 3 次初次探測 + 2 次安裝後重新探測
    assert_eq!(launcher.runner().count("-c"), 5);
    assert_eq!(launcher.runner().routines().len(), 1);
}

#[tokio::test]
async fn test_install_that_does_not_fix_imports_is_dependency_missing() {
    let (_dir, config) = workspace();
    let runner = ScriptedRunner {
        install_fixes: false,
        ..ScriptedRunner::with_python()
    }
    .missing(&["yaml"]);
    let launcher = Launcher::new(runner, config);

    let outcome = launcher
        .launch(&FlowRequest::Convert(ConvertArgs::default()))
        .await;

    assert_eq!(outcome.exit_code(), 1);
    match outcome.error {
        Some(LauncherError::DependencyMissing { names }) => assert_eq!(names, vec!["yaml"]),
        other => panic!("unexpected error: {:?}", other),
    }
    assert!(launcher.runner().routines().is_empty());
}

#[tokio::test]
async fn test_present_dependencies_convert_once_without_install() {
    let (dir, config) = workspace();
    let launcher = Launcher::new(ScriptedRunner::with_python(), config);

    let outcome = launcher
        .launch(&FlowRequest::Convert(ConvertArgs::default()))
        .await;

    assert_eq!(outcome.exit_code(), 0);
    assert_eq!(outcome.report.final_state, LaunchState::Done);
    assert!(!outcome.report.installed);
    assert_eq!(launcher.runner().count("-m"), 0);

    let calls = launcher.runner().calls();
    let conversions: Vec<_> = calls
        .iter()
        .filter(|call| call.args[0].ends_with("markdown_to_excel.py"))
        .collect();
    assert_eq!(conversions.len(), 1);
    assert_eq!(
        conversions[0].args,
        vec![dir.path().join("markdown_to_excel.py").display().to_string()]
    );
    assert!(!conversions[0].capture);
}

#[tokio::test]
async fn test_conversion_exit_code_is_propagated() {
    let (_dir, config) = workspace();
    let runner = ScriptedRunner {
        routine_codes: HashMap::from([("markdown_to_excel.py".to_string(), 2)]),
        ..ScriptedRunner::with_python()
    };
    let launcher = Launcher::new(runner, config);

    let outcome = launcher
        .launch(&FlowRequest::Convert(ConvertArgs::default()))
        .await;

    assert_eq!(outcome.exit_code(), 2);
    assert_eq!(outcome.report.steps.len(), 1);
    assert_eq!(outcome.report.steps[0].exit_code, Some(2));
    assert_eq!(outcome.report.final_state, LaunchState::Halt);
}

#[tokio::test]
async fn test_test_flow_generates_then_marks() {
    let (dir, config) = workspace();
    let runner = ScriptedRunner {
        creates: HashMap::from([
            (
                "test_marker.py".to_string(),
                dir.path().join("测试_租机登记表.xlsx"),
            ),
            (
                "mark_customer_type.py".to_string(),
                dir.path().join("测试结果.xlsx"),
            ),
        ]),
        ..ScriptedRunner::with_python()
    };
    let launcher = Launcher::new(runner, config);

    let outcome = launcher.launch(&FlowRequest::TestFlow).await;

    assert_eq!(outcome.exit_code(), 0);
    // 測試流程不探測任何依賴
    assert_eq!(launcher.runner().count("-c"), 0);

    let routines = launcher.runner().routines();
    assert_eq!(routines.len(), 2);
    assert_eq!(routines[0].0, "test_marker.py");
    assert!(routines[0].1.is_empty());
    assert_eq!(routines[1].0, "mark_customer_type.py");
    assert_eq!(
        routines[1].1,
        vec!["测试_租机登记表.xlsx", "-o", "测试结果.xlsx"]
    );
    assert!(dir.path().join("测试结果.xlsx").exists());
}

#[tokio::test]
async fn test_generator_failure_skips_marker() {
    let (_dir, config) = workspace();
    let runner = ScriptedRunner {
        routine_codes: HashMap::from([("test_marker.py".to_string(), 3)]),
        ..ScriptedRunner::with_python()
    };
    let launcher = Launcher::new(runner, config);

    let outcome = launcher.launch(&FlowRequest::TestFlow).await;

    assert_eq!(outcome.exit_code(), 3);
    assert!(matches!(
        outcome.error,
        Some(LauncherError::DelegatedTaskFailed { code: Some(3), .. })
    ));
    let routines = launcher.runner().routines();
    assert_eq!(routines.len(), 1);
    assert_eq!(routines[0].0, "test_marker.py");
}

#[tokio::test]
async fn test_marker_not_run_when_generator_writes_nothing() {
    let (_dir, config) = workspace();
    let launcher = Launcher::new(ScriptedRunner::with_python(), config);

    let outcome = launcher.launch(&FlowRequest::TestFlow).await;

    assert_eq!(outcome.exit_code(), 1);
    assert!(matches!(
        outcome.error,
        Some(LauncherError::MissingInput { .. })
    ));
    assert_eq!(launcher.runner().routines().len(), 1);
}

#[tokio::test]
async fn test_mark_missing_workbook_is_not_delegated() {
    let (_dir, config) = workspace();
    let launcher = Launcher::new(ScriptedRunner::with_python(), config);

    let outcome = launcher
        .launch(&FlowRequest::Mark(MarkArgs {
            file: "不存在.xlsx".to_string(),
            sheet: None,
            output: None,
        }))
        .await;

    assert_eq!(outcome.exit_code(), 1);
    assert!(matches!(
        outcome.error,
        Some(LauncherError::MissingInput { .. })
    ));
    assert!(launcher.runner().routines().is_empty());
}

#[tokio::test]
async fn test_missing_routine_script_halts() {
    let (dir, config) = workspace();
    std::fs::remove_file(dir.path().join("markdown_to_excel.py")).unwrap();
    let launcher = Launcher::new(ScriptedRunner::with_python(), config);

    let outcome = launcher
        .launch(&FlowRequest::Convert(ConvertArgs::default()))
        .await;

    assert_eq!(outcome.exit_code(), 1);
    assert!(matches!(
        outcome.error,
        Some(LauncherError::RoutineMissing { .. })
    ));
}

#[test]
fn test_dry_run_describe_spawns_nothing() {
    let (_dir, config) = workspace();
    let launcher = Launcher::new(ScriptedRunner::with_python(), config);

    let lines = launcher.describe(&FlowRequest::TestFlow);

    assert_eq!(lines.len(), 3);
    assert_eq!(lines[0], "/usr/bin/python3 --version");
    assert!(lines[1].ends_with("test_marker.py"));
    assert!(lines[2].ends_with("mark_customer_type.py 测试_租机登记表.xlsx -o 测试结果.xlsx"));
    assert!(launcher.runner().calls().is_empty());
}

#[tokio::test]
async fn test_check_environment_reports_each_dependency() {
    let (_dir, config) = workspace();
    let launcher = Launcher::new(ScriptedRunner::with_python().missing(&["yaml"]), config);

    let status = launcher.check_environment(false).await.unwrap();
    assert!(!status.installed);
    assert_eq!(status.missing(), vec!["yaml"]);
    assert_eq!(launcher.runner().count("-m"), 0);

    let status = launcher.check_environment(true).await.unwrap();
    assert!(status.installed);
    assert!(status.ensure_complete().is_ok());
    assert_eq!(launcher.runner().count("-m"), 1);
}

#[tokio::test]
async fn test_halted_report_is_written() {
    let (dir, config) = workspace();
    let launcher = Launcher::new(ScriptedRunner::default(), config);

    let outcome = launcher.launch(&FlowRequest::TestFlow).await;
    let path = dir.path().join("reports").join("run.json");
    write_report(&outcome.report, &path).unwrap();

    let json: serde_json::Value =
        serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
    assert_eq!(json["flow"], "test-flow");
    assert_eq!(json["final_state"], "HALT");
    assert!(json["error"].as_str().unwrap().len() > 1);
    assert_eq!(json["steps"].as_array().unwrap().len(), 0);
}

#[tokio::test]
async fn test_check_produces_check_report() {
    let (dir, config) = workspace();
    let launcher = Launcher::new(ScriptedRunner::with_python().missing(&["yaml"]), config);

    let checked = launcher.check(false).await;

    assert_eq!(checked.outcome.report.flow, FlowKind::Check);
    assert_eq!(checked.outcome.report.final_state, LaunchState::Halt);
    assert_eq!(checked.outcome.exit_code(), 1);
    assert_eq!(checked.status.as_ref().unwrap().missing(), vec!["yaml"]);
    assert!(checked.outcome.report.interpreter.is_some());

    let path = dir.path().join("check.json");
    write_report(&checked.outcome.report, &path).unwrap();
    let json: serde_json::Value =
        serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
    assert_eq!(json["flow"], "check");
    assert_eq!(json["final_state"], "HALT");
}

#[tokio::test]
async fn test_check_without_interpreter_still_reports() {
    let (_dir, config) = workspace();
    let launcher = Launcher::new(ScriptedRunner::default(), config);

    let checked = launcher.check(true).await;

    assert!(checked.status.is_none());
    assert_eq!(checked.outcome.report.flow, FlowKind::Check);
    assert_eq!(checked.outcome.report.final_state, LaunchState::Halt);
    assert!(matches!(
        checked.outcome.error,
        Some(LauncherError::InterpreterMissing { .. })
    ));
}

#[tokio::test]
async fn test_check_with_install_completes() {
    let (_dir, config) = workspace();
    let launcher = Launcher::new(ScriptedRunner::with_python().missing(&["pandas"]), config);

    let checked = launcher.check(true).await;

    assert_eq!(checked.outcome.exit_code(), 0);
    assert_eq!(checked.outcome.report.final_state, LaunchState::Done);
    assert!(checked.outcome.report.installed);
    assert_eq!(launcher.runner().count("-m"), 1);
}

#[tokio::test]
async fn test_import_that_cannot_start_triggers_install() {
    let (_dir, config) = workspace();
    let runner = ScriptedRunner {
        spawn_failures: HashSet::from(["pandas".to_string()]),
        ..ScriptedRunner::with_python()
    };
    let launcher = Launcher::new(runner, config);

    let outcome = launcher
        .launch(&FlowRequest::Convert(ConvertArgs::default()))
        .await;

    assert_eq!(outcome.exit_code(), 0, "error: {:?}", outcome.error);
    assert!(outcome.report.installed);
    assert_eq!(launcher.runner().count("-m"), 1);
}
