use crate::utils::error::{LauncherError, Result};
use crate::utils::validation::{self, Validate};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Component, Path, PathBuf};

pub const DEFAULT_CONFIG_FILE: &str = "launcher.toml";

#[cfg(target_os = "windows")]
const PYTHON_CANDIDATES: &[&str] = &["python"];

#[cfg(not(target_os = "windows"))]
const PYTHON_CANDIDATES: &[&str] = &["python3", "python"];

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct LauncherConfig {
    pub interpreter: InterpreterConfig,
    pub paths: PathsConfig,
    pub environment: BTreeMap<String, String>,
    pub test_flow: TestFlowConfig,
    pub convert: ConvertConfig,
    pub mark: MarkConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct InterpreterConfig {
    /// 明確指定的直譯器路徑，優先於 candidates
    pub path: Option<PathBuf>,
    pub candidates: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PathsConfig {
    pub working_dir: PathBuf,
    pub scripts_dir: PathBuf,
    pub manifest: PathBuf,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TestFlowConfig {
    pub generator: String,
    pub marker: String,
    pub input: String,
    pub output: String,
    pub dependencies: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ConvertConfig {
    pub routine: String,
    pub dependencies: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MarkConfig {
    pub routine: String,
    pub sheet: String,
    pub dependencies: Vec<String>,
}

impl Default for InterpreterConfig {
    fn default() -> Self {
        Self {
            path: None,
            candidates: PYTHON_CANDIDATES.iter().map(|s| s.to_string()).collect(),
        }
    }
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self {
            working_dir: PathBuf::from("."),
            scripts_dir: PathBuf::from("."),
            manifest: PathBuf::from("requirements.txt"),
        }
    }
}

impl Default for TestFlowConfig {
    fn default() -> Self {
        Self {
            generator: "test_marker.py".to_string(),
            marker: "mark_customer_type.py".to_string(),
            input: "测试_租机登记表.xlsx".to_string(),
            output: "测试结果.xlsx".to_string(),
            dependencies: Vec::new(),
        }
    }
}

impl Default for ConvertConfig {
    fn default() -> Self {
        Self {
            routine: "markdown_to_excel.py".to_string(),
            dependencies: vec!["pandas".to_string(), "openpyxl".to_string(), "yaml".to_string()],
        }
    }
}

impl Default for MarkConfig {
    fn default() -> Self {
        Self {
            routine: "mark_customer_type.py".to_string(),
            sheet: "Sheet1".to_string(),
            dependencies: vec!["pandas".to_string(), "openpyxl".to_string()],
        }
    }
}

impl LauncherConfig {
    /// 從 TOML 檔案載入配置
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(&path).map_err(|e| LauncherError::ConfigError {
            message: format!("Cannot read {}: {}", path.as_ref().display(), e),
        })?;
        Self::from_toml_str(&content)
    }

    /// 從 TOML 字串解析配置
    pub fn from_toml_str(content: &str) -> Result<Self> {
        let processed_content = Self::substitute_env_vars(content)?;

        let mut config: Self =
            toml::from_str(&processed_content).map_err(|e| LauncherError::ConfigError {
                message: format!("TOML parsing error: {}", e),
            })?;
        config.apply_environment_defaults();
        Ok(config)
    }

    /// 有指定路徑就必須存在；否則嘗試目前目錄的 launcher.toml，再退回預設值
    pub fn load(explicit: Option<&Path>) -> Result<Self> {
        match explicit {
            Some(path) => Self::from_file(path),
            None if Path::new(DEFAULT_CONFIG_FILE).is_file() => {
                tracing::debug!("Using {} from current directory", DEFAULT_CONFIG_FILE);
                Self::from_file(DEFAULT_CONFIG_FILE)
            }
            None => Ok(Self::with_defaults()),
        }
    }

    pub fn with_defaults() -> Self {
        let mut config = Self::default();
        config.apply_environment_defaults();
        config
    }

    /// 替換環境變數 (例如 ${PYTHON_HOME})，未定義的保持原樣
    fn substitute_env_vars(content: &str) -> Result<String> {
        let re = regex::Regex::new(r"\$\{([^}]+)\}").map_err(|e| LauncherError::ConfigError {
            message: format!("Invalid substitution pattern: {}", e),
        })?;

        let result = re.replace_all(content, |caps: &regex::Captures| {
            let var_name = &caps[1];
            std::env::var(var_name).unwrap_or_else(|_| format!("${{{}}}", var_name))
        });

        Ok(result.to_string())
    }

    // Windows 主控台預設不是 UTF-8，中文檔名與輸出需要這個設定
    fn apply_environment_defaults(&mut self) {
        self.environment
            .entry("PYTHONIOENCODING".to_string())
            .or_insert_with(|| "utf-8".to_string());
    }

    /// 相對的 scripts_dir 以 working_dir 為基準
    pub fn scripts_dir(&self) -> PathBuf {
        self.resolve(&self.paths.scripts_dir)
    }

    pub fn manifest_path(&self) -> PathBuf {
        self.resolve(&self.paths.manifest)
    }

    pub fn working_dir(&self) -> &Path {
        &self.paths.working_dir
    }

    /// 子行程以 working_dir 為目前目錄，傳給它的路徑必須是絕對路徑
    pub fn absolutize_working_dir(&mut self) -> Result<()> {
        let absolute = std::path::absolute(&self.paths.working_dir)?;
        if !absolute.is_dir() {
            return Err(LauncherError::InvalidConfigValueError {
                field: "paths.working_dir".to_string(),
                value: absolute.display().to_string(),
                reason: "Directory does not exist".to_string(),
            });
        }
        self.paths.working_dir = absolute;
        Ok(())
    }

    /// 相對於 working_dir 的路徑，去掉 `.` 片段
    pub fn resolve(&self, path: &Path) -> PathBuf {
        let joined = if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.paths.working_dir.join(path)
        };
        joined
            .components()
            .filter(|component| !matches!(component, Component::CurDir))
            .collect()
    }

    /// 所有流程依賴的聯集，保持首次出現的順序
    pub fn all_dependencies(&self) -> Vec<String> {
        let mut names: Vec<String> = Vec::new();
        for name in self
            .test_flow
            .dependencies
            .iter()
            .chain(&self.convert.dependencies)
            .chain(&self.mark.dependencies)
        {
            if !names.contains(name) {
                names.push(name.clone());
            }
        }
        names
    }

    /// 驗證配置的合理性
    pub fn validate_config(&self) -> Result<()> {
        if let Some(path) = &self.interpreter.path {
            validation::validate_path("interpreter.path", &path.to_string_lossy())?;
        } else if self.interpreter.candidates.is_empty() {
            return Err(LauncherError::InvalidConfigValueError {
                field: "interpreter.candidates".to_string(),
                value: "[]".to_string(),
                reason: "At least one candidate is required when no path is set".to_string(),
            });
        }
        for candidate in &self.interpreter.candidates {
            validation::validate_non_empty_string("interpreter.candidates", candidate)?;
        }

        validation::validate_path("paths.working_dir", &self.paths.working_dir.to_string_lossy())?;
        validation::validate_path("paths.scripts_dir", &self.paths.scripts_dir.to_string_lossy())?;
        validation::validate_path("paths.manifest", &self.paths.manifest.to_string_lossy())?;

        let routines = [
            ("test_flow.generator", &self.test_flow.generator),
            ("test_flow.marker", &self.test_flow.marker),
            ("convert.routine", &self.convert.routine),
            ("mark.routine", &self.mark.routine),
        ];
        for (field, routine) in routines {
            validation::validate_file_extensions(field, std::slice::from_ref(routine), &["py"])?;
        }

        validation::validate_file_extensions(
            "test_flow.input",
            std::slice::from_ref(&self.test_flow.input),
            &["xlsx"],
        )?;
        validation::validate_file_extensions(
            "test_flow.output",
            std::slice::from_ref(&self.test_flow.output),
            &["xlsx"],
        )?;
        validation::validate_non_empty_string("mark.sheet", &self.mark.sheet)?;

        validation::validate_module_names("test_flow.dependencies", &self.test_flow.dependencies)?;
        validation::validate_module_names("convert.dependencies", &self.convert.dependencies)?;
        validation::validate_module_names("mark.dependencies", &self.mark.dependencies)?;

        Ok(())
    }
}

impl Validate for LauncherConfig {
    fn validate(&self) -> Result<()> {
        self.validate_config()
    }
}
