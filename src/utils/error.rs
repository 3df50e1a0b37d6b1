use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum LauncherError {
    #[error("Python interpreter not found (tried: {tried})")]
    InterpreterMissing { tried: String },

    #[error("Missing Python dependencies: {}", .names.join(", "))]
    DependencyMissing { names: Vec<String> },

    #[error("Dependency installation failed: {reason}")]
    InstallFailed { reason: String },

    #[error("Delegated task '{routine}' failed ({})", describe_exit(.code))]
    DelegatedTaskFailed { routine: String, code: Option<i32> },

    #[error("Routine script not found: {}", .path.display())]
    RoutineMissing { path: PathBuf },

    #[error("Input file not found: {}", .path.display())]
    MissingInput { path: PathBuf },

    #[error("No Excel workbook found in {}", .dir.display())]
    NoWorkbookFound { dir: PathBuf },

    #[error("Workbook selection cancelled")]
    SelectionCancelled,

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),

    #[error("Configuration error: {message}")]
    ConfigError { message: String },

    #[error("Invalid value for {field}: '{value}' ({reason})")]
    InvalidConfigValueError {
        field: String,
        value: String,
        reason: String,
    },
}

fn describe_exit(code: &Option<i32>) -> String {
    match code {
        Some(code) => format!("exit code {}", code),
        None => "terminated by signal".to_string(),
    }
}

impl LauncherError {
    /// 行程結束碼，子行程的結束碼原樣傳遞
    pub fn exit_code(&self) -> u8 {
        match self {
            LauncherError::DelegatedTaskFailed { code, .. } => match code {
                Some(code) if (1..=255).contains(code) => *code as u8,
                _ => 1,
            },
            LauncherError::InterpreterMissing { .. }
            | LauncherError::DependencyMissing { .. }
            | LauncherError::InstallFailed { .. }
            | LauncherError::RoutineMissing { .. }
            | LauncherError::MissingInput { .. }
            | LauncherError::NoWorkbookFound { .. }
            | LauncherError::SelectionCancelled => 1,
            LauncherError::ConfigError { .. } | LauncherError::InvalidConfigValueError { .. } => 2,
            LauncherError::IoError(_) | LauncherError::SerializationError(_) => 3,
        }
    }

    pub fn user_friendly_message(&self) -> String {
        match self {
            LauncherError::InterpreterMissing { .. } => {
                "未找到 Python，請先安裝 Python 3 並加入 PATH".to_string()
            }
            LauncherError::DependencyMissing { names } => {
                format!("缺少 Python 依賴套件: {}", names.join(", "))
            }
            LauncherError::InstallFailed { reason } => {
                format!("依賴套件安裝失敗: {}", reason)
            }
            LauncherError::DelegatedTaskFailed { routine, code } => {
                format!("執行 {} 失敗 ({})", routine, describe_exit(code))
            }
            LauncherError::RoutineMissing { path } => {
                format!("找不到腳本: {}", path.display())
            }
            LauncherError::MissingInput { path } => {
                format!("找不到輸入檔案: {}", path.display())
            }
            LauncherError::NoWorkbookFound { dir } => {
                format!("目錄 {} 中未找到 Excel 檔案", dir.display())
            }
            LauncherError::SelectionCancelled => "已取消".to_string(),
            other => other.to_string(),
        }
    }

    pub fn recovery_suggestion(&self) -> &'static str {
        match self {
            LauncherError::InterpreterMissing { .. } => {
                "Install Python 3 or set [interpreter].path in launcher.toml"
            }
            LauncherError::DependencyMissing { .. } | LauncherError::InstallFailed { .. } => {
                "Install the dependencies manually: pip install -r requirements.txt"
            }
            LauncherError::DelegatedTaskFailed { .. } => {
                "Check the routine output above for details"
            }
            LauncherError::RoutineMissing { .. } => {
                "Check [paths].scripts_dir or run from the directory containing the scripts"
            }
            LauncherError::MissingInput { .. } | LauncherError::NoWorkbookFound { .. } => {
                "Pass the workbook path explicitly, e.g. sheet-launcher mark 租机登记表.xlsx"
            }
            LauncherError::SelectionCancelled => "Run again and pick a listed number",
            LauncherError::ConfigError { .. } | LauncherError::InvalidConfigValueError { .. } => {
                "Fix launcher.toml or pass a different file with --config"
            }
            LauncherError::IoError(_) | LauncherError::SerializationError(_) => {
                "Check file permissions and available disk space"
            }
        }
    }
}

pub type Result<T> = std::result::Result<T, LauncherError>;
