use std::str::FromStr;
use std::time::Duration;

use chrono_tz::Tz;
use shared::models::Role;

/// 引擎配置 - 工作流引擎的所有配置项
///
/// # 环境变量
///
/// 所有配置项都可以通过环境变量覆盖：
///
/// | 环境变量 | 默认值 | 说明 |
/// |----------|--------|------|
/// | LOG_LEVEL | info | 日志级别 |
/// | LOG_DIR | (无) | 日志目录，设置后按天滚动写文件 |
/// | LOG_JSON | false | JSON 格式日志 |
/// | LOG_RETENTION_DAYS | 14 | 启动时清理超过该天数的日志文件 |
/// | STORE_WRITE_TIMEOUT_MS | 10000 | 存储调用超时(毫秒) |
/// | AUTO_APPROVE_ROLES | HR,Manager | 提交即自动批准的角色 |
/// | AUTO_APPROVE_TYPES | (空) | 自动批准的申请类型 |
/// | AUTO_APPROVE_REASONS | (空) | 自动批准的申请原因(忽略大小写) |
/// | MARK_RETRY_ATTEMPTS | 3 | 删除审批标记的重试次数 |
/// | MARK_RETRY_BACKOFF_MS | 200 | 重试间隔(毫秒) |
/// | DEMO_MODE | false | 启动时登录演示身份 |
/// | DEMO_UID | hr_user | 演示身份 uid |
/// | TIMEZONE | UTC | 考勤迟到计算使用的时区 |
///
/// 列表值用逗号分隔。
///
/// # 示例
///
/// ```ignore
/// AUTO_APPROVE_REASONS="Auto approve test" DEMO_MODE=true cargo run
/// ```
#[derive(Debug, Clone)]
pub struct Config {
    /// 日志级别
    pub log_level: String,
    /// 日志目录
    pub log_dir: Option<String>,
    /// JSON 格式日志
    pub log_json: bool,
    /// 日志保留天数
    pub log_retention_days: u64,
    /// 存储调用超时时间 (毫秒)
    pub store_timeout_ms: u64,

    // === 自动审批 ===
    pub auto_approve_roles: Vec<Role>,
    pub auto_approve_types: Vec<String>,
    pub auto_approve_reasons: Vec<String>,

    // === 删除审批 ===
    /// 删除目标后标记 Approved 的最大尝试次数
    pub mark_retry_attempts: u32,
    pub mark_retry_backoff_ms: u64,

    // === 身份 ===
    pub demo_mode: bool,
    pub demo_uid: String,

    /// 考勤时区
    pub timezone: Tz,
}

impl Config {
    /// 从环境变量加载配置
    ///
    /// 如果环境变量未设置或无法解析，使用默认值
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            log_level: std::env::var("LOG_LEVEL").unwrap_or(defaults.log_level),
            log_dir: std::env::var("LOG_DIR").ok().filter(|d| !d.is_empty()),
            log_json: env_parse("LOG_JSON").unwrap_or(defaults.log_json),
            log_retention_days: env_parse("LOG_RETENTION_DAYS")
                .unwrap_or(defaults.log_retention_days),
            store_timeout_ms: env_parse("STORE_WRITE_TIMEOUT_MS")
                .unwrap_or(defaults.store_timeout_ms),
            auto_approve_roles: std::env::var("AUTO_APPROVE_ROLES")
                .ok()
                .map(|v| parse_roles(&v))
                .unwrap_or(defaults.auto_approve_roles),
            auto_approve_types: std::env::var("AUTO_APPROVE_TYPES")
                .ok()
                .map(|v| split_list(&v))
                .unwrap_or(defaults.auto_approve_types),
            auto_approve_reasons: std::env::var("AUTO_APPROVE_REASONS")
                .ok()
                .map(|v| split_list(&v))
                .unwrap_or(defaults.auto_approve_reasons),
            mark_retry_attempts: env_parse("MARK_RETRY_ATTEMPTS")
                .unwrap_or(defaults.mark_retry_attempts),
            mark_retry_backoff_ms: env_parse("MARK_RETRY_BACKOFF_MS")
                .unwrap_or(defaults.mark_retry_backoff_ms),
            demo_mode: env_parse("DEMO_MODE").unwrap_or(defaults.demo_mode),
            demo_uid: std::env::var("DEMO_UID").unwrap_or(defaults.demo_uid),
            timezone: std::env::var("TIMEZONE")
                .ok()
                .and_then(|tz| tz.parse().ok())
                .unwrap_or(defaults.timezone),
        }
    }

    /// 存储调用超时
    pub fn store_timeout(&self) -> Duration {
        Duration::from_millis(self.store_timeout_ms)
    }

    /// 重试间隔
    pub fn mark_retry_backoff(&self) -> Duration {
        Duration::from_millis(self.mark_retry_backoff_ms)
    }
}

/// 内置默认值，不读取环境变量（测试使用）
impl Default for Config {
    fn default() -> Self {
        Self {
            log_level: "info".into(),
            log_dir: None,
            log_json: false,
            log_retention_days: 14,
            store_timeout_ms: 10_000,
            auto_approve_roles: vec![Role::Hr, Role::Manager],
            auto_approve_types: Vec::new(),
            auto_approve_reasons: Vec::new(),
            mark_retry_attempts: 3,
            mark_retry_backoff_ms: 200,
            demo_mode: false,
            demo_uid: "hr_user".into(),
            timezone: Tz::UTC,
        }
    }
}

fn env_parse<T: FromStr>(key: &str) -> Option<T> {
    std::env::var(key).ok().and_then(|v| v.trim().parse().ok())
}

fn split_list(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(String::from)
        .collect()
}

/// 未知角色名被忽略并记录警告
fn parse_roles(value: &str) -> Vec<Role> {
    split_list(value)
        .into_iter()
        .filter_map(|name| match name.parse::<Role>() {
            Ok(role) => Some(role),
            Err(e) => {
                tracing::warn!(error = %e, "Ignoring entry in AUTO_APPROVE_ROLES");
                None
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert_eq!(config.auto_approve_roles, vec![Role::Hr, Role::Manager]);
        assert!(config.auto_approve_reasons.is_empty());
        assert_eq!(config.store_timeout(), Duration::from_secs(10));
        assert_eq!(config.timezone, Tz::UTC);
    }

    #[test]
    fn test_split_list_trims_and_skips_empty() {
        assert_eq!(
            split_list(" Auto approve test , ,Sick "),
            vec!["Auto approve test".to_string(), "Sick".to_string()]
        );
        assert!(split_list("").is_empty());
    }

    #[test]
    fn test_parse_roles_ignores_unknown() {
        assert_eq!(parse_roles("hr, admin,Employee"), vec![Role::Hr, Role::Employee]);
    }
}
