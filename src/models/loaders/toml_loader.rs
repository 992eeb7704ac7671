use crate::models::catalog::Catalog;
use anyhow::{Context, Result};
use std::collections::HashSet;
use std::path::Path;
use tokio::fs;

/// 从 TOML 文件加载税种目录
///
/// 文件格式：
/// ```toml
/// [[entries]]
/// code = "IMP_217"
/// name = "217 - SICORE-IMPTO.A LAS GANANCIAS"
/// category = "Impositivas"
/// mode = "ambas"
/// ```
pub async fn load_catalog_from_toml(toml_file_path: &Path) -> Result<Catalog> {
    let content = fs::read_to_string(toml_file_path)
        .await
        .with_context(|| format!("无法读取目录文件: {}", toml_file_path.display()))?;

    let catalog: Catalog = toml::from_str(&content)
        .with_context(|| format!("无法解析目录文件: {}", toml_file_path.display()))?;

    if catalog.is_empty() {
        anyhow::bail!("目录文件中没有任何条目: {}", toml_file_path.display());
    }

    let mut seen = HashSet::new();
    for entry in catalog.entries() {
        if !seen.insert(entry.code.as_str()) {
            anyhow::bail!(
                "目录文件中存在重复编码 {}: {}",
                entry.code,
                toml_file_path.display()
            );
        }
    }

    tracing::info!(
        "成功加载目录 {} ({} 个条目)",
        toml_file_path.display(),
        catalog.len()
    );

    Ok(catalog)
}

/// 配置了目录文件则加载它，否则使用内置目录
pub async fn load_catalog(catalog_file: Option<&Path>) -> Result<Catalog> {
    match catalog_file {
        Some(path) => load_catalog_from_toml(path).await,
        None => Ok(Catalog::builtin()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::work_item::OperationMode;
    use std::io::Write;

    #[tokio::test]
    async fn test_load_catalog_from_toml() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            r#"
[[entries]]
code = "IMP_217"
name = "217 - SICORE-IMPTO.A LAS GANANCIAS"
category = "Impositivas"
mode = "ambas"

[[entries]]
code = "ADU_767"
name = "767 - SICORE - RETENCIONES Y PERCEPC"
category = "Aduaneras"
mode = "fecha_solo"
"#
        )
        .unwrap();

        let catalog = load_catalog_from_toml(file.path()).await.unwrap();
        assert_eq!(catalog.len(), 2);
        assert_eq!(catalog.entries()[1].mode, OperationMode::FechaSolo);
    }

    #[tokio::test]
    async fn test_duplicate_codes_rejected() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            r#"
[[entries]]
code = "IMP_217"
name = "a"
category = "Impositivas"
mode = "ambas"

[[entries]]
code = "IMP_217"
name = "b"
category = "Impositivas"
mode = "retencion"
"#
        )
        .unwrap();

        assert!(load_catalog_from_toml(file.path()).await.is_err());
    }

    #[tokio::test]
    async fn test_falls_back_to_builtin() {
        let catalog = load_catalog(None).await.unwrap();
        assert_eq!(catalog, Catalog::builtin());
    }
}
