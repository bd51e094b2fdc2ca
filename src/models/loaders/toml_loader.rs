use crate::models::curriculum::{CurriculumFile, CurriculumRecord};
use anyhow::{Context, Result};
use std::path::Path;
use tokio::fs;

/// 从 TOML 文件加载课程标准记录
pub async fn load_curriculum_toml(toml_file_path: &Path) -> Result<Vec<CurriculumRecord>> {
    let content = fs::read_to_string(toml_file_path)
        .await
        .with_context(|| format!("无法读取TOML文件: {}", toml_file_path.display()))?;

    let file = parse_curriculum(&content)
        .with_context(|| format!("无法解析TOML文件: {}", toml_file_path.display()))?;

    tracing::info!(
        "成功加载 {} 条课程标准: {}",
        file.curriculum.len(),
        toml_file_path.display()
    );

    Ok(file.curriculum)
}

fn parse_curriculum(content: &str) -> Result<CurriculumFile> {
    Ok(toml::from_str(content)?)
}
