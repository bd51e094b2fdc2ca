use anyhow::Result;
use lumi_quiz::utils::logging;
use lumi_quiz::{App, Config};

const DEFAULT_REQUEST: &str = "I need 2 hard Algebra 1 questions about polynomials for a 9th grader.";

#[tokio::main]
async fn main() -> Result<()> {
    // 加载 .env（不存在时忽略）
    let _ = dotenvy::dotenv();

    // 初始化日志
    logging::init();

    // 加载配置
    let config = Config::from_env()?;

    let args: Vec<String> = std::env::args().skip(1).collect();
    let app = App::initialize(config).await?;

    if args.first().map(String::as_str) == Some("check") {
        return app.check_connections().await;
    }

    // 每个参数是一条出题请求，没有参数时使用示例请求
    let requests = if args.is_empty() {
        vec![DEFAULT_REQUEST.to_string()]
    } else {
        args
    };

    app.run(requests).await?;

    Ok(())
}
