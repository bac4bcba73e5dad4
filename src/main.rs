//! Service Lifecycle 主程序入口
//!
//! 安装、删除或以服务方式运行当前可执行文件

use service_lifecycle::cli::Args;
use service_lifecycle::config::{resolve_config, LoggingConfig};
use service_lifecycle::error::exit_code;
use service_lifecycle::logging::{setup_logging, LogConfig};
use service_lifecycle::registrar::{PlatformServiceManager, Registrar, StopPoller};
use service_lifecycle::runtime::PlatformRuntime;
use service_lifecycle::sink::{LogSink, TracingSink};
use service_lifecycle::Dispatcher;
use std::sync::Arc;
use tracing::{debug, error, info};

fn main() {
    let args = Args::parse_args();

    // 配置加载失败时仍按默认日志配置初始化日志，保证错误被记录下来
    let loaded = resolve_config(args.config.as_deref());
    let default_logging = LoggingConfig::default();
    let logging = match &loaded {
        Ok((config, _)) => &config.logging,
        Err(_) => &default_logging,
    };

    let mut log_config = LogConfig::from(logging);
    if let Some(level) = args.log_level {
        log_config.level = level.into();
    }
    // 服务模式下没有控制台
    if args.is_service_mode() {
        log_config = log_config.with_default_file();
    }

    if let Err(e) = setup_logging(&log_config) {
        eprintln!("初始化日志系统失败: {e:#}");
        std::process::exit(exit_code::CONFIG_INVALID);
    }

    info!("Service Lifecycle v{} 启动", service_lifecycle::VERSION);

    let (config, config_path) = match loaded {
        Ok(loaded) => loaded,
        Err(e) => {
            error!("加载配置文件失败: {}", e);
            eprintln!("加载配置文件失败: {e}");
            std::process::exit(exit_code::CONFIG_INVALID);
        }
    };

    match &config_path {
        Some(path) => info!("成功加载配置文件: {}", path.display()),
        None => info!("未找到配置文件，使用默认配置"),
    }
    debug!("配置内容: {:?}", config);

    // 安装时写入服务启动参数，需要绝对路径
    let config_path = config_path.map(|path| std::path::absolute(&path).unwrap_or(path));

    let sink: Arc<dyn LogSink> = Arc::new(TracingSink);
    let registrar = Registrar::new(
        PlatformServiceManager::default(),
        StopPoller::from(&config.stop_poll),
        Arc::clone(&sink),
    );
    let mut dispatcher = Dispatcher::new(
        config,
        config_path,
        registrar,
        PlatformRuntime::default(),
        sink,
    );
    if let Some(program) = std::env::args().next() {
        dispatcher = dispatcher.with_program(program);
    }

    let result = dispatcher.dispatch(&args.command);
    match (&result.diagnostic_message, result.is_success()) {
        (Some(message), true) => println!("{message}"),
        (Some(message), false) => {
            error!("命令执行失败: {}", message);
            eprintln!("{message}");
        }
        (None, _) => {}
    }

    std::process::exit(result.exit_code);
}
