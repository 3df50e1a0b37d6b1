use crate::utils::error::{LauncherError, Result};
use std::path::Path;

/// 產生的測試資料以此開頭，不列入候選
const TEST_DATA_PREFIX: &str = "测试";
/// Office 開檔時的鎖定檔
const LOCK_FILE_PREFIX: char = '~';
/// dry run 時代表尚未選定的活頁簿
pub const SELECTED_WORKBOOK_PLACEHOLDER: &str = "<selected workbook>";

/// 列出目錄中可標記的 Excel 檔案名稱，依名稱排序
pub fn find_excel_files(dir: &Path) -> Result<Vec<String>> {
    let mut files = Vec::new();

    for entry in std::fs::read_dir(dir)? {
        let entry = entry?;
        if !entry.file_type()?.is_file() {
            continue;
        }

        let name = entry.file_name().to_string_lossy().into_owned();
        let is_xlsx = Path::new(&name)
            .extension()
            .and_then(|ext| ext.to_str())
            .is_some_and(|ext| ext.eq_ignore_ascii_case("xlsx"));

        if is_xlsx && !name.starts_with(LOCK_FILE_PREFIX) && !name.starts_with(TEST_DATA_PREFIX) {
            files.push(name);
        }
    }

    files.sort();
    Ok(files)
}

/// 解析使用者輸入的序號 (1 起算)，回傳 0 起算的索引
pub fn parse_selection(input: &str, count: usize) -> Result<usize> {
    match input.trim().parse::<usize>() {
        Ok(choice) if (1..=count).contains(&choice) => Ok(choice - 1),
        _ => Err(LauncherError::SelectionCancelled),
    }
}

/// 單一候選直接選取；多個候選時交由 `prompt` 取得輸入
pub fn select_workbook<F>(dir: &Path, candidates: Vec<String>, prompt: F) -> Result<String>
where
    F: FnOnce(&[String]) -> Result<String>,
{
    match candidates.len() {
        0 => Err(LauncherError::NoWorkbookFound {
            dir: dir.to_path_buf(),
        }),
        1 => {
            let mut candidates = candidates;
            let chosen = candidates.remove(0);
            tracing::info!("📄 Auto-selected workbook: {}", chosen);
            Ok(chosen)
        }
        count => {
            let answer = prompt(&candidates)?;
            let index = parse_selection(&answer, count)?;
            let mut candidates = candidates;
            Ok(candidates.swap_remove(index))
        }
    }
}

/// dry run 用，不詢問使用者：單一候選直接使用，否則回傳佔位名稱
pub fn preview_workbook(candidates: &[String]) -> String {
    match candidates {
        [only] => only.clone(),
        _ => SELECTED_WORKBOOK_PLACEHOLDER.to_string(),
    }
}
