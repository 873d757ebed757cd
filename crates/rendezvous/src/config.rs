use clap::Parser;
use std::net::SocketAddr;
use std::path::PathBuf;

/// CLI arguments for the signaling relay.
#[derive(Parser, Debug, Clone)]
#[command(name = "rendezvous")]
#[command(about = "Rendezvous signaling relay")]
#[command(version)]
pub struct Args {
    /// Socket address for signaling connections and bootstrap content.
    #[arg(long, default_value = "127.0.0.1:5000", env = "RENDEZVOUS_LISTEN")]
    pub listen: SocketAddr,
    /// Socket address for metrics and health checks.
    #[arg(long, default_value = "127.0.0.1:9090", env = "RENDEZVOUS_METRICS_ADDR")]
    pub metrics_addr: SocketAddr,
    /// Directory to serve bootstrap content from.
    #[arg(short = 'd', long, default_value = "./static/", env = "RENDEZVOUS_STATIC_DIR")]
    pub directory: PathBuf,
    /// File that RTT collector samples are appended to.
    #[arg(long, default_value = "rtt.dat", env = "RENDEZVOUS_RTT_FILE")]
    pub rtt_file: PathBuf,
    /// Maximum total concurrent connections.
    #[arg(long, default_value = "10000", env = "RENDEZVOUS_MAX_CONNS")]
    pub max_conns: usize,
    /// Maximum WebSocket message size in bytes.
    #[arg(long, default_value = "65536", env = "RENDEZVOUS_MAX_MESSAGE")]
    pub max_message_size: usize,
    /// Interval between WebSocket pings in seconds.
    #[arg(long, default_value = "30", env = "RENDEZVOUS_PING_INTERVAL")]
    pub ping_interval: u64,
    /// Connection idle timeout in seconds.
    #[arg(long, default_value = "120", env = "RENDEZVOUS_IDLE_TIMEOUT")]
    pub idle_timeout: u64,
    /// Drop envelopes whose `from` differs from the sender's registered id.
    #[arg(long, env = "RENDEZVOUS_STRICT_SENDER")]
    pub strict_sender: bool,
    /// Increase log verbosity (repeat for more detail).
    #[arg(short = 'v', long, action = clap::ArgAction::Count)]
    pub verbose: u8,
    /// Write logs to a file instead of stderr.
    #[arg(long)]
    pub log_file: Option<PathBuf>,
}

/// Runtime configuration derived from [`Args`].
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Socket address for signaling connections and bootstrap content.
    pub listen: SocketAddr,
    /// Socket address for metrics and health checks.
    pub metrics_addr: SocketAddr,
    /// Directory to serve bootstrap content from.
    pub static_dir: PathBuf,
    /// File that RTT collector samples are appended to.
    pub rtt_file: PathBuf,
    /// Maximum total concurrent connections.
    pub max_conns: usize,
    /// Maximum WebSocket message size in bytes.
    pub max_message_size: usize,
    /// Interval between WebSocket pings in seconds.
    pub ping_interval: u64,
    /// Connection idle timeout in seconds.
    pub idle_timeout: u64,
    /// Drop envelopes whose `from` differs from the sender's registered id.
    pub strict_sender: bool,
}

impl ServerConfig {
    /// Validates the configuration values are within acceptable bounds.
    /// Returns Ok(()) if valid, Err with description otherwise.
    pub fn validate(&self) -> Result<(), String> {
        if self.listen == self.metrics_addr && self.listen.port() != 0 {
            return Err("listen and metrics_addr must differ".to_string());
        }

        if self.max_conns == 0 {
            return Err("max_conns must be greater than 0".to_string());
        }
        if self.max_conns > 1_000_000 {
            return Err("max_conns exceeds reasonable limit (1,000,000)".to_string());
        }

        const MAX_ALLOWED_MESSAGE: usize = 16 * 1024 * 1024;
        if self.max_message_size == 0 {
            return Err("max_message_size must be greater than 0".to_string());
        }
        if self.max_message_size > MAX_ALLOWED_MESSAGE {
            return Err(format!(
                "max_message_size exceeds maximum allowed ({} bytes)",
                MAX_ALLOWED_MESSAGE
            ));
        }

        if self.ping_interval == 0 {
            return Err("ping_interval must be greater than 0".to_string());
        }
        if self.ping_interval > 3600 {
            return Err("ping_interval exceeds reasonable limit (3600 seconds)".to_string());
        }

        if self.idle_timeout == 0 {
            return Err("idle_timeout must be greater than 0".to_string());
        }
        if self.idle_timeout > 86_400 {
            return Err(
                "idle_timeout exceeds reasonable limit (86400 seconds / 1 day)".to_string(),
            );
        }
        if self.idle_timeout < self.ping_interval {
            return Err("idle_timeout must not be shorter than ping_interval".to_string());
        }

        if self.rtt_file.as_os_str().is_empty() {
            return Err("rtt_file must not be empty".to_string());
        }
        Ok(())
    }
}

impl From<Args> for ServerConfig {
    fn from(args: Args) -> Self {
        Self {
            listen: args.listen,
            metrics_addr: args.metrics_addr,
            static_dir: args.directory,
            rtt_file: args.rtt_file,
            max_conns: args.max_conns,
            max_message_size: args.max_message_size,
            ping_interval: args.ping_interval,
            idle_timeout: args.idle_timeout,
            strict_sender: args.strict_sender,
        }
    }
}
