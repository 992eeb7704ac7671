use anyhow::Result;
use retenciones_export::{logger, App, Config, RunRequest};

#[tokio::main]
async fn main() -> Result<()> {
    // 加载配置
    let config = Config::load()?;

    // 初始化日志
    logger::init(config.verbose_logging);

    // 读取运行参数
    let request = RunRequest::from_env()?;

    // 初始化并运行应用
    let _result = App::initialize(config).await?.run(request).await?;

    Ok(())
}
