use std::time::Duration;

/// 服务器运行配置，全部来自环境变量
#[derive(Debug, Clone)]
pub struct Config {
    /// 监听端口 (SKULL_PORT)
    pub port: u16,
    /// 房间内所有人掉线后到回收为止的宽限期 (SKULL_GRACE_SECS)
    pub grace: Duration,
    /// 广播快照时是否隐藏他人面朝下的牌 (SKULL_REDACT_SNAPSHOTS)。
    /// 参考行为是不隐藏，默认关闭。
    pub redact_snapshots: bool,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            port: 8000,
            grace: Duration::from_secs(60),
            redact_snapshots: false,
        }
    }
}

impl Config {
    pub fn from_env() -> Config {
        let default = Config::default();
        Config {
            port: env_parse("SKULL_PORT").unwrap_or(default.port),
            grace: env_parse("SKULL_GRACE_SECS")
                .map(Duration::from_secs)
                .unwrap_or(default.grace),
            redact_snapshots: std::env::var("SKULL_REDACT_SNAPSHOTS")
                .map(|v| v == "1" || v.eq_ignore_ascii_case("true"))
                .unwrap_or(default.redact_snapshots),
        }
    }
}

fn env_parse<T: std::str::FromStr>(key: &str) -> Option<T> {
    std::env::var(key).ok().and_then(|v| v.parse().ok())
}
