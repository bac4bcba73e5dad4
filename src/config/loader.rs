//! 配置加载器实现
//!
//! 提供TOML配置文件解析、环境变量替换和错误处理功能

use crate::config::types::{validate_config, Config};
use crate::error::{ConfigError, Result};
use regex::Regex;
use std::path::{Path, PathBuf};

/// 配置加载器trait，定义配置加载接口
pub trait ConfigLoader: Send + Sync {
    /// 从文件加载配置
    ///
    /// # 参数
    /// * `path` - 配置文件路径
    ///
    /// # 返回
    /// * `Result<Config>` - 加载的配置或错误
    fn load_from_file(&self, path: &Path) -> Result<Config>;

    /// 从字符串加载配置
    fn load_from_string(&self, content: &str) -> Result<Config>;

    /// 验证配置
    fn validate(&self, config: &Config) -> Result<()>;
}

/// TOML配置加载器实现
#[derive(Debug, Clone)]
pub struct TomlConfigLoader {
    /// 是否启用环境变量替换
    enable_env_substitution: bool,
}

impl TomlConfigLoader {
    /// 创建新的TOML配置加载器
    ///
    /// # 参数
    /// * `enable_env_substitution` - 是否启用环境变量替换
    pub fn new(enable_env_substitution: bool) -> Self {
        Self {
            enable_env_substitution,
        }
    }

    /// 替换字符串中的 `${VAR_NAME}` 环境变量
    fn substitute_env_vars(&self, content: &str) -> Result<String> {
        if !self.enable_env_substitution {
            return Ok(content.to_string());
        }

        let env_var_regex = Regex::new(r"\$\{([A-Za-z_][A-Za-z0-9_]*)\}")
            .map_err(|e| ConfigError::ParseError(format!("正则表达式错误: {e}")))?;

        let mut missing = None;
        let result = env_var_regex.replace_all(content, |captures: &regex::Captures<'_>| {
            let var_name = &captures[1];
            match std::env::var(var_name) {
                Ok(value) => value,
                Err(_) => {
                    missing.get_or_insert_with(|| var_name.to_string());
                    String::new()
                }
            }
        });

        match missing {
            Some(var) => Err(ConfigError::EnvVarError { var }.into()),
            None => Ok(result.into_owned()),
        }
    }

    /// 解析TOML内容
    fn parse_toml(&self, content: &str) -> Result<Config> {
        let processed_content = self.substitute_env_vars(content)?;

        let config: Config = toml::from_str(&processed_content)
            .map_err(|e| ConfigError::ParseError(format!("TOML解析失败: {e}")))?;

        Ok(config)
    }
}

impl Default for TomlConfigLoader {
    fn default() -> Self {
        Self::new(true)
    }
}

impl ConfigLoader for TomlConfigLoader {
    fn load_from_file(&self, path: &Path) -> Result<Config> {
        if !path.exists() {
            return Err(ConfigError::FileNotFound {
                path: path.to_string_lossy().to_string(),
            }
            .into());
        }

        let content = std::fs::read_to_string(path)
            .map_err(|e| ConfigError::ParseError(format!("读取文件失败: {e}")))?;

        let config = self.parse_toml(&content)?;
        self.validate(&config)?;
        Ok(config)
    }

    fn load_from_string(&self, content: &str) -> Result<Config> {
        let config = self.parse_toml(content)?;
        self.validate(&config)?;
        Ok(config)
    }

    fn validate(&self, config: &Config) -> Result<()> {
        validate_config(config).map_err(|e| ConfigError::ValidationError(e).into())
    }
}

/// 获取默认配置文件路径
///
/// Windows: `%APPDATA%\service-lifecycle\config.toml`；
/// Linux/macOS: `~/.config/service-lifecycle/config.toml`。
pub fn get_default_config_path() -> PathBuf {
    dirs::config_dir()
        .map(|config_dir| config_dir.join(crate::APP_NAME).join("config.toml"))
        .unwrap_or_else(|| PathBuf::from("config.toml"))
}

/// 确定本次运行使用的配置
///
/// 显式指定的文件必须存在；未指定时使用默认路径上的文件，
/// 默认文件也不存在时使用内置默认配置。返回实际加载的文件路径。
///
/// 这一步发生在日志系统初始化之前，由调用方记录加载结果。
pub fn resolve_config(explicit: Option<&Path>) -> Result<(Config, Option<PathBuf>)> {
    let loader = TomlConfigLoader::default();

    if let Some(path) = explicit {
        let config = loader.load_from_file(path)?;
        return Ok((config, Some(path.to_path_buf())));
    }

    let default_path = get_default_config_path();
    if default_path.exists() {
        let config = loader.load_from_file(&default_path)?;
        return Ok((config, Some(default_path)));
    }

    Ok((Config::default(), None))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registrar::StartType;
    use serial_test::serial;
    use std::env;
    use std::io::Write;
    use tempfile::NamedTempFile;

    const TEST_CONFIG_TOML: &str = r#"
[service]
name = "relay"
display_name = "TURN Relay"
start_type = "demand_start"
dependencies = ["Tcpip", "Dnscache"]
account = "NT AUTHORITY\\NetworkService"

[lifecycle]
run_interval_ms = 250

[stop_poll]
interval_ms = 500
max_attempts = 10

[logging]
level = "debug"
json = true
"#;

    #[test]
    fn test_toml_parsing() {
        let loader = TomlConfigLoader::new(false);
        let config = loader.load_from_string(TEST_CONFIG_TOML).unwrap();

        assert_eq!(config.service.name, "relay");
        assert_eq!(config.service.display_name, "TURN Relay");
        assert_eq!(config.service.start_type, StartType::DemandStart);
        assert_eq!(config.service.dependencies, vec!["Tcpip", "Dnscache"]);
        assert_eq!(config.service.account, r"NT AUTHORITY\NetworkService");
        assert_eq!(config.lifecycle.run_interval_ms, 250);
        assert_eq!(config.stop_poll.max_attempts, 10);
        assert!(config.logging.json);
    }

    #[test]
    fn test_partial_config_keeps_defaults() {
        let loader = TomlConfigLoader::new(false);
        let config = loader
            .load_from_string("[service]\nname = \"relay\"\n")
            .unwrap();

        assert_eq!(config.service.name, "relay");
        assert_eq!(config.service.display_name, "coturn");
        assert_eq!(config.stop_poll.interval_ms, 1000);
    }

    #[test]
    fn test_invalid_config_is_rejected() {
        let loader = TomlConfigLoader::new(false);
        let result = loader.load_from_string("[lifecycle]\nrun_interval_ms = 0\n");
        assert!(result.is_err());
    }

    #[test]
    fn test_unknown_start_type_is_parse_error() {
        let loader = TomlConfigLoader::new(false);
        let error = loader
            .load_from_string("[service]\nstart_type = \"sometimes\"\n")
            .unwrap_err();
        assert!(error.to_string().contains("TOML解析失败"));
    }

    #[test]
    #[serial]
    fn test_env_var_substitution() {
        env::set_var("SERVICE_LIFECYCLE_TEST_PASSWORD", "s3cret");

        let loader = TomlConfigLoader::new(true);
        let config = loader
            .load_from_string("[service]\npassword = \"${SERVICE_LIFECYCLE_TEST_PASSWORD}\"\n")
            .unwrap();
        assert_eq!(config.service.password.as_deref(), Some("s3cret"));

        env::remove_var("SERVICE_LIFECYCLE_TEST_PASSWORD");
    }

    #[test]
    #[serial]
    fn test_env_var_substitution_missing_var() {
        let loader = TomlConfigLoader::new(true);
        let result =
            loader.load_from_string("[service]\npassword = \"${SERVICE_LIFECYCLE_MISSING_VAR}\"\n");

        let error = result.unwrap_err();
        assert!(error.to_string().contains("SERVICE_LIFECYCLE_MISSING_VAR"));
    }

    #[test]
    fn test_substitute_env_vars_disabled() {
        let loader = TomlConfigLoader::new(false);
        let content = "test ${VAR} content";
        let result = loader.substitute_env_vars(content).unwrap();
        assert_eq!(result, content);
    }

    #[test]
    fn test_load_from_file() {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(TEST_CONFIG_TOML.as_bytes()).unwrap();

        let (config, path) = resolve_config(Some(file.path())).unwrap();
        assert_eq!(config.service.name, "relay");
        assert_eq!(path.as_deref(), Some(file.path()));
    }

    #[test]
    #[serial]
    fn test_substituted_password_not_in_debug_output() {
        env::set_var("SERVICE_LIFECYCLE_TEST_SECRET", "hunter2");
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(b"[service]\npassword = \"${SERVICE_LIFECYCLE_TEST_SECRET}\"\n")
            .unwrap();

        let (config, _) = resolve_config(Some(file.path())).unwrap();
        env::remove_var("SERVICE_LIFECYCLE_TEST_SECRET");

        assert_eq!(config.service.password.as_deref(), Some("hunter2"));
        assert!(!format!("{config:?}").contains("hunter2"));
    }

    #[test]
    fn test_explicit_missing_file_is_error() {
        let result = resolve_config(Some(Path::new("/nonexistent/service-lifecycle.toml")));
        assert!(result.is_err());
    }

    #[test]
    fn test_get_default_config_path() {
        let path = get_default_config_path();
        assert!(path.to_string_lossy().contains("config.toml"));
        assert!(path.to_string_lossy().contains("service-lifecycle"));
    }
}
