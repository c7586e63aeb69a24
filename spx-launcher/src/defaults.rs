use std::time::Duration;

pub const DEFAULT_CONTROL_PORT: u16 = 5660;

pub const READINESS_MAX_ATTEMPTS: u32 = 10;
pub const READINESS_RETRY_DELAY: Duration = Duration::from_secs(1);
pub const PROBE_TIMEOUT: Duration = Duration::from_secs(2);
pub const STATUS_PATH: &str = "/api/v1/version";

pub const UPTIME_TICK: Duration = Duration::from_secs(1);

pub const SERVER_LOG_CHANNEL: &str = "server-log";
pub const LOG_BUS_BUFFER: usize = 1024;
pub const DEFAULT_LOG_CAPACITY: usize = 10_000;

pub const SERVER_BINARY_NAME: &str = "spx-server";
pub const LOGS_DIR_NAME: &str = "LOG";
pub const CONTROL_SOCKET_NAME: &str = "spx-launcher.sock";

pub const DEFAULT_HELP_URL: &str = "https://www.spx.graphics/knowledge-base";
pub const DEFAULT_SUPPORT_URL: &str = "https://github.com/TuomoKu/SPX-GC/issues";
