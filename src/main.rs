use clap::Parser;
use sheet_launcher::config::cli::MarkCommand;
use sheet_launcher::core::discovery;
use sheet_launcher::core::launcher::{write_report, FlowRequest, MarkArgs};
use sheet_launcher::domain::model::{FlowKind, LaunchReport};
use sheet_launcher::utils::{logger, validation::Validate};
use sheet_launcher::{
    Cli, Command, LaunchOutcome, LauncherConfig, LauncherError, Launcher, Result,
    TokioProcessRunner,
};
use std::io::{BufRead, Write};
use std::path::Path;
use std::process::ExitCode;

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    // 初始化日誌
    if cli.json_logs {
        logger::init_json_logger(cli.verbose);
    } else {
        logger::init_cli_logger(cli.verbose);
    }

    tracing::info!("🚀 Starting sheet-launcher");
    if cli.verbose {
        tracing::debug!("CLI args: {:?}", cli);
    }

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!("❌ {} (exit code {})", e, e.exit_code());
            eprintln!("❌ {}", e.user_friendly_message());
            eprintln!("💡 建議: {}", e.recovery_suggestion());
            ExitCode::from(e.exit_code())
        }
    }
}

async fn run(cli: Cli) -> Result<()> {
    let mut config = LauncherConfig::load(cli.config.as_deref())?;
    config.validate()?;
    config.absolutize_working_dir()?;
    tracing::debug!("Working directory: {}", config.working_dir().display());

    let runner = TokioProcessRunner::new()
        .with_working_dir(config.working_dir())
        .with_envs(config.environment.clone());
    let launcher = Launcher::new(runner, config);

    let request = match &cli.command {
        Command::Check { install } => {
            return run_check(&launcher, *install, &cli).await;
        }
        Command::Mark(command) => match mark_request(&launcher, command, cli.dry_run) {
            Ok(request) => request,
            Err(e) => {
                return conclude(LaunchOutcome::halted(FlowKind::Mark, e), cli.report.as_deref())
            }
        },
        command => command.flow_request().ok_or_else(|| LauncherError::ConfigError {
            message: format!("Unsupported command: {:?}", command),
        })?,
    };

    if cli.dry_run {
        tracing::info!("🔍 DRY RUN MODE - No process will be started");
        display_config_summary(launcher.config());
        println!("🔍 Dry run for {}:", request.kind());
        for line in launcher.describe(&request) {
            println!("  {}", line);
        }
        return Ok(());
    }

    let outcome = launcher.launch(&request).await;
    conclude(outcome, cli.report.as_deref())
}

/// 沒指定檔案時搜尋工作目錄；dry run 只列出候選，不詢問
fn mark_request(
    launcher: &Launcher<TokioProcessRunner>,
    command: &MarkCommand,
    dry_run: bool,
) -> Result<FlowRequest> {
    let file = match &command.file {
        Some(file) => file.clone(),
        None => {
            let dir = launcher.config().working_dir();
            let candidates = discovery::find_excel_files(dir)?;
            if dry_run {
                println!("📄 Workbook candidates in {}:", dir.display());
                for (i, name) in candidates.iter().enumerate() {
                    println!("  {}. {}", i + 1, name);
                }
                if candidates.is_empty() {
                    println!("  (none)");
                }
                discovery::preview_workbook(&candidates)
            } else {
                discovery::select_workbook(dir, candidates, prompt_for_workbook)?
            }
        }
    };

    Ok(FlowRequest::Mark(MarkArgs {
        file,
        sheet: command.sheet.clone(),
        output: command.output.clone(),
    }))
}

/// 寫出報告 (若有指定)、顯示摘要，回傳流程本身的結果
fn conclude(outcome: LaunchOutcome, report_path: Option<&Path>) -> Result<()> {
    if let Some(path) = report_path {
        match write_report(&outcome.report, path) {
            Ok(()) => tracing::info!("📝 Report written to {}", path.display()),
            Err(e) => tracing::warn!("⚠️ Could not write report {}: {}", path.display(), e),
        }
    }

    display_run_summary(&outcome.report);
    outcome.into_result().map(|_| ())
}

async fn run_check(
    launcher: &Launcher<TokioProcessRunner>,
    install: bool,
    cli: &Cli,
) -> Result<()> {
    if cli.dry_run {
        println!("🔍 Dry run for check:");
        println!(
            "  interpreter candidates: {}",
            launcher.config().interpreter.candidates.join(", ")
        );
        println!(
            "  dependencies: {}",
            launcher.config().all_dependencies().join(", ")
        );
        if install {
            println!("  manifest: {}", launcher.config().manifest_path().display());
        }
        return Ok(());
    }

    println!("Checking environment...\n");
    let checked = launcher.check(install).await;

    if let Some(status) = &checked.status {
        println!(
            "Interpreter: {} ({})",
            status.interpreter.path.display(),
            status.interpreter.version
        );
        println!();
        println!("{:<20} {:<10}", "DEPENDENCY", "STATUS");
        println!("{}", "=".repeat(32));
        for dep in &status.dependencies {
            let mark = if dep.available { "✓ present" } else { "✗ missing" };
            println!("{:<20} {:<10}", dep.name, mark);
        }
        println!();

        if status.installed {
            println!("📦 Dependencies were installed during this check");
        }
        if status.missing().is_empty() {
            println!("✅ All dependencies are available");
        }
    }

    conclude(checked.outcome, cli.report.as_deref())
}

fn prompt_for_workbook(candidates: &[String]) -> Result<String> {
    println!("Multiple Excel files found, please choose one:");
    for (i, name) in candidates.iter().enumerate() {
        println!("  {}. {}", i + 1, name);
    }
    print!("\nEnter a number (1-{}): ", candidates.len());
    std::io::stdout().flush()?;

    let mut answer = String::new();
    let read = std::io::stdin().lock().read_line(&mut answer)?;
    if read == 0 {
        return Err(LauncherError::SelectionCancelled);
    }
    Ok(answer)
}

fn display_config_summary(config: &LauncherConfig) {
    println!("📋 Configuration:");
    match &config.interpreter.path {
        Some(path) => println!("  Interpreter: {}", path.display()),
        None => println!(
            "  Interpreter candidates: {}",
            config.interpreter.candidates.join(", ")
        ),
    }
    println!("  Working Dir: {}", config.working_dir().display());
    println!("  Scripts Dir: {}", config.scripts_dir().display());
    println!("  Manifest: {}", config.manifest_path().display());
    for (key, value) in &config.environment {
        println!("  Env: {}={}", key, value);
    }
    println!();
}

fn display_run_summary(report: &LaunchReport) {
    println!();
    println!("📋 Run Summary:");
    println!("  Flow: {}", report.flow);
    if let Some(interpreter) = &report.interpreter {
        println!(
            "  Interpreter: {} ({})",
            interpreter.path.display(),
            interpreter.version
        );
    }
    if report.installed {
        println!("  Dependencies: installed from manifest");
    }
    for step in &report.steps {
        let code = step
            .exit_code
            .map_or_else(|| "signal".to_string(), |code| code.to_string());
        println!(
            "  Step: {} (exit code: {}, duration: {:?})",
            step.name, code, step.duration
        );
    }
    println!("  Total Time: {:?}", report.total_duration());
    let status = if report.succeeded() { "✅" } else { "❌" };
    println!("  Final State: {} {}", status, report.final_state);
}
