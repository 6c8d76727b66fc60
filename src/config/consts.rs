use std::time::Duration;

/// Connect attempts per connect sequence when nothing overrides it.
pub const DEFAULT_CONNECT_RETRY_COUNT: u32 = 3;
/// Environment variable overriding the connect retry count.
pub const CONNECT_RETRY_COUNT_ENV: &str = "CONNECT_RETRY_COUNT";
/// Pause between failed connect attempts.
pub const CONNECT_RETRY_DELAY: Duration = Duration::from_millis(100);

/// Remote call timeout used when a descriptor does not set one.
pub const DEFAULT_CALL_TIMEOUT: Duration = Duration::from_millis(30_000);

/// After sending `Shutdown`, how long to wait before checking whether the service went away.
pub const SHUTDOWN_GRACE: Duration = Duration::from_millis(500);
/// Polls for the remote side closing the channel after shutdown.
pub const SHUTDOWN_POLL_ATTEMPTS: u32 = 10;
pub const SHUTDOWN_POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Directory service environment fallbacks.
pub const DIRECTORY_HOST_ENV: &str = "VNS_HOST";
pub const DIRECTORY_PORT_ENV: &str = "VNS_PORT";
pub const DEFAULT_DIRECTORY_PORT: u16 = 9005;

/// Environment switches for proxy behaviour.
pub const TEST_BEFORE_SEND_ENV: &str = "TEST_BEFORE_SEND";
pub const FILTER_BATCH_ENV: &str = "FILTER_BATCH";

/// First port handed to child-process services, and how many ports follow it.
pub const DEFAULT_SERVICE_PORT: u16 = 10_000;
pub const DEFAULT_PORT_RANGE: u16 = 3_000;

/// Path-list variables merged with the inherited value instead of replaced.
pub const MERGED_ENV_VARS: &[&str] = &["PATH", "CLASSPATH", "LD_LIBRARY_PATH"];

/// Placeholders substituted in child-process arguments.
pub const DESCRIPTOR_PLACEHOLDER: &str = "${descriptor}";
pub const PORT_PLACEHOLDER: &str = "${port}";

pub const DEFAULT_MAX_RESTARTS: u32 = 3;
pub const DEFAULT_WORK_OBJECT_CAPACITY: usize = 1;
pub const DEFAULT_PROCESSING_THREADS: usize = 1;
/// Wire protocol name of the frame RPC.
pub const RPC_PROTOCOL: &str = "rpc";
/// Older descriptors name the same protocol after its transport.
pub const RPC_PROTOCOL_ALIAS: &str = "vinci";
