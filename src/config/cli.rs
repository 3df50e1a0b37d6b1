use crate::core::launcher::{ConvertArgs, FlowRequest};
use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

#[derive(Debug, Clone, Parser)]
#[command(name = "sheet-launcher")]
#[command(about = "Launcher for the customer-type marking and Markdown-to-Excel tools")]
pub struct Cli {
    /// Path to TOML configuration file (default: ./launcher.toml when present)
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Emit logs as JSON lines
    #[arg(long, global = true)]
    pub json_logs: bool,

    /// Dry run - show the commands without executing them
    #[arg(long, global = true)]
    pub dry_run: bool,

    /// Write the JSON run report to this file
    #[arg(long, global = true)]
    pub report: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Clone, Subcommand)]
pub enum Command {
    /// Generate sample data, then mark it (测试_租机登记表.xlsx -> 测试结果.xlsx)
    TestFlow,

    /// Check dependencies, install them if needed, then run the Markdown-to-Excel converter
    Convert(ConvertCommand),

    /// Mark new/existing customer orders in a workbook
    Mark(MarkCommand),

    /// Check the interpreter and every configured dependency
    Check {
        /// Install missing dependencies from the manifest
        #[arg(long)]
        install: bool,
    },
}

#[derive(Debug, Clone, Args)]
pub struct ConvertCommand {
    /// Markdown flow document; without it the converter runs with its own defaults
    pub input: Option<String>,

    /// Output Excel file
    #[arg(short, long, requires = "input")]
    pub output: Option<String>,

    /// Converter rule file (YAML)
    #[arg(long, requires = "input")]
    pub routine_config: Option<String>,

    /// Skip the summary sheets
    #[arg(long, requires = "input")]
    pub no_summary: bool,
}

#[derive(Debug, Clone, Args)]
pub struct MarkCommand {
    /// Workbook to mark; when omitted, *.xlsx in the working directory are offered
    pub file: Option<String>,

    /// Worksheet name
    #[arg(short, long)]
    pub sheet: Option<String>,

    /// Output file (default: overwrite the input)
    #[arg(short, long)]
    pub output: Option<String>,
}

impl From<ConvertCommand> for ConvertArgs {
    fn from(command: ConvertCommand) -> Self {
        Self {
            input: command.input,
            output: command.output,
            routine_config: command.routine_config,
            no_summary: command.no_summary,
        }
    }
}

impl Command {
    /// mark 的檔案需要先經過搜尋，因此不在這裡轉換
    pub fn flow_request(&self) -> Option<FlowRequest> {
        match self {
            Command::TestFlow => Some(FlowRequest::TestFlow),
            Command::Convert(command) => Some(FlowRequest::Convert(command.clone().into())),
            Command::Mark(_) | Command::Check { .. } => None,
        }
    }
}
