use crate::domain::model::{Invocation, RunOutcome};
use crate::utils::error::Result;
use async_trait::async_trait;
use std::path::PathBuf;

/// 子行程邊界；流程只透過這個介面接觸作業系統
#[async_trait]
pub trait ProcessRunner: Send + Sync {
    /// 在 PATH 中尋找可執行檔
    fn locate(&self, program: &str) -> Option<PathBuf>;

    /// 執行並等待子行程結束。無法啟動時回傳 `Err`
    async fn run(&self, invocation: &Invocation) -> Result<RunOutcome>;
}
