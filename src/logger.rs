use tracing_subscriber::{fmt, EnvFilter};

/// 初始化全局日志
///
/// 默认级别为 info；`verbose` 为 true 时打开本 crate 的 debug 日志。
/// 设置了 `RUST_LOG` 时以环境变量为准。
pub fn init(verbose: bool) {
    let default_directive = if verbose {
        "info,retenciones_export=debug"
    } else {
        "info"
    };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_directive));

    let _ = fmt()
        .with_env_filter(filter)
        .with_target(false)
        .try_init();
}
