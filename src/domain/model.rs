use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

/// 已解析的直譯器
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Interpreter {
    pub path: PathBuf,
    pub version: String,
}

/// 一次子行程呼叫
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Invocation {
    pub program: PathBuf,
    pub args: Vec<String>,
    /// true: 擷取輸出 (探測用)；false: 繼承終端機 stdio
    pub capture: bool,
}

impl Invocation {
    pub fn captured(program: impl Into<PathBuf>, args: Vec<String>) -> Self {
        Self {
            program: program.into(),
            args,
            capture: true,
        }
    }

    pub fn inherited(program: impl Into<PathBuf>, args: Vec<String>) -> Self {
        Self {
            program: program.into(),
            args,
            capture: false,
        }
    }

    /// 供 dry run 與日誌顯示的命令列
    pub fn command_line(&self) -> String {
        std::iter::once(self.program.display().to_string())
            .chain(self.args.iter().map(|arg| {
                if arg.contains(char::is_whitespace) {
                    format!("\"{}\"", arg)
                } else {
                    arg.clone()
                }
            }))
            .collect::<Vec<_>>()
            .join(" ")
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunOutcome {
    /// None 表示子行程被訊號終止
    pub code: Option<i32>,
    pub stdout: String,
    pub stderr: String,
}

impl RunOutcome {
    pub fn exited(code: i32) -> Self {
        Self {
            code: Some(code),
            ..Self::default()
        }
    }

    pub fn success(&self) -> bool {
        self.code == Some(0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum LaunchState {
    Start,
    CheckEnv,
    Invoke,
    Done,
    Halt,
}

impl fmt::Display for LaunchState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            LaunchState::Start => "START",
            LaunchState::CheckEnv => "CHECK_ENV",
            LaunchState::Invoke => "INVOKE",
            LaunchState::Done => "DONE",
            LaunchState::Halt => "HALT",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum FlowKind {
    TestFlow,
    Convert,
    Mark,
    Check,
}

impl fmt::Display for FlowKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            FlowKind::TestFlow => "test-flow",
            FlowKind::Convert => "convert",
            FlowKind::Mark => "mark",
            FlowKind::Check => "check",
        };
        f.write_str(name)
    }
}

/// 單一委派步驟的執行紀錄
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StepRecord {
    pub name: String,
    pub exit_code: Option<i32>,
    #[serde(with = "duration_ms")]
    pub duration: Duration,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LaunchReport {
    pub flow: FlowKind,
    pub started_at: DateTime<Utc>,
    pub final_state: LaunchState,
    pub interpreter: Option<Interpreter>,
    pub installed: bool,
    pub steps: Vec<StepRecord>,
    pub error: Option<String>,
}

impl LaunchReport {
    pub fn new(flow: FlowKind) -> Self {
        Self {
            flow,
            started_at: Utc::now(),
            final_state: LaunchState::Start,
            interpreter: None,
            installed: false,
            steps: Vec::new(),
            error: None,
        }
    }

    pub fn succeeded(&self) -> bool {
        self.final_state == LaunchState::Done
    }

    pub fn total_duration(&self) -> Duration {
        self.steps.iter().map(|step| step.duration).sum()
    }
}

mod duration_ms {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(duration.as_millis() as u64)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        Ok(Duration::from_millis(u64::deserialize(deserializer)?))
    }
}
