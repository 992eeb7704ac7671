use anyhow::Result;
/// 日志工具模块
///
/// 提供日志格式化和输出的辅助函数
use std::fs;
use std::io::Write;
use tracing::info;

/// 初始化日志文件
///
/// # 参数
/// - `log_file_path`: 日志文件路径
pub fn init_log_file(log_file_path: &str) -> Result<()> {
    let log_header = format!(
        "{}\n批量导出日志 - {}\n{}\n\n",
        "=".repeat(60),
        chrono::Local::now().format("%Y-%m-%d %H:%M:%S"),
        "=".repeat(60)
    );
    fs::write(log_file_path, log_header)?;
    Ok(())
}

/// 向日志文件追加一行
pub fn append_log_line(log_file_path: &str, line: &str) -> Result<()> {
    let mut file = fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(log_file_path)?;
    writeln!(file, "{}", line)?;
    Ok(())
}

/// 记录程序启动信息
///
/// # 参数
/// - `login_identity`: 登录 CUIT
/// - `target_identity`: 代理的 CUIT
/// - `date_range`: 日期范围文本
pub fn log_startup(login_identity: &str, target_identity: &str, date_range: &str) {
    info!("{}", "=".repeat(60));
    info!("🚀 程序启动 - 批量导出模式");
    info!("👤 登录 CUIT: {}", login_identity);
    info!("🏢 目标 CUIT: {}", target_identity);
    info!("📅 日期范围: {}", date_range);
    info!("{}", "=".repeat(60));
}

/// 记录计划加载信息
///
/// # 参数
/// - `total`: 事项总数
/// - `already_done`: 恢复时已完成的事项数
pub fn log_plan_loaded(total: usize, already_done: usize) {
    info!("✓ 计划包含 {} 个事项", total);
    if already_done > 0 {
        info!("⏭️  其中 {} 个已在之前的运行中完成，将跳过", already_done);
    }
}

/// 记录事项开始信息
///
/// # 参数
/// - `index`: 事项序号（从 1 开始）
/// - `total`: 事项总数
/// - `name`: 事项名称
pub fn log_item_start(index: usize, total: usize, name: &str) {
    info!("\n{}", "=".repeat(60));
    info!("📦 开始处理事项 {}/{}: {}", index, total, name);
    info!("{}", "=".repeat(60));
}

/// 记录事项完成信息
pub fn log_item_complete(index: usize, succeeded: usize, total_variants: usize) {
    info!("\n{}", "─".repeat(60));
    info!(
        "✓ 事项 {} 完成: 成功 {}/{} 个查询",
        index, succeeded, total_variants
    );
    info!("{}", "─".repeat(60));
}

/// 打印最终统计信息
///
/// # 参数
/// - `downloaded`: 下载的文件数
/// - `failed`: 失败的查询数
/// - `status`: 会话最终状态
/// - `log_file_path`: 日志文件路径
pub fn print_final_stats(downloaded: usize, failed: usize, status: &str, log_file_path: &str) {
    info!("\n{}", "=".repeat(60));
    info!("📊 全部处理完成统计");
    info!(
        "完成时间: {}",
        chrono::Local::now().format("%Y-%m-%d %H:%M:%S")
    );
    info!("{}", "=".repeat(60));
    info!("✅ 下载文件: {}", downloaded);
    info!("❌ 失败查询: {}", failed);
    info!("📌 会话状态: {}", status);
    info!("{}", "=".repeat(60));
    info!("\n日志已保存至: {}", log_file_path);
}

/// 截断长文本用于日志显示
///
/// # 参数
/// - `text`: 原始文本
/// - `max_len`: 最大长度
///
/// # 返回
/// 返回截断后的文本
pub fn truncate_text(text: &str, max_len: usize) -> String {
    if text.chars().count() > max_len {
        text.chars().take(max_len).collect::<String>() + "..."
    } else {
        text.to_string()
    }
}

/// 把文本中出现的密码替换为 `****`
pub fn sanitize_secret(text: &str, secret: &str) -> String {
    if secret.is_empty() {
        return text.to_string();
    }
    text.replace(secret, "****")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_truncate_text_counts_chars() {
        assert_eq!(truncate_text("Percepción", 4), "Perc...");
        assert_eq!(truncate_text("IVA", 10), "IVA");
    }

    #[test]
    fn test_sanitize_secret() {
        assert_eq!(
            sanitize_secret("clave hunter2 rechazada", "hunter2"),
            "clave **** rechazada"
        );
        assert_eq!(sanitize_secret("sin clave", ""), "sin clave");
    }

    #[test]
    fn test_log_file_header_and_append() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("output.txt");
        let path = path.to_str().unwrap();

        init_log_file(path).unwrap();
        append_log_line(path, "IMP_217 ok").unwrap();

        let content = std::fs::read_to_string(path).unwrap();
        assert!(content.starts_with(&"=".repeat(60)));
        assert!(content.ends_with("IMP_217 ok\n"));
    }
}
