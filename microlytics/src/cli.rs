//! Command line interface.

use clap::Parser;
use microlytics_config::{Auth, General};

/// Fast sharded analytics database with an HTTP API.
#[derive(Parser, Debug, Default)]
#[command(name = "microlytics", version)]
pub struct Cli {
    /// Port to listen on.
    #[arg(short, long, env = "MA_PORT")]
    pub port: Option<u16>,

    /// Directory holding the tenant databases.
    #[arg(short, long, env = "MA_ROOT")]
    pub root: Option<String>,

    /// Max number of open shard stores.
    #[arg(short, long, env = "MA_POOL_SIZE")]
    pub connections: Option<usize>,

    /// Seconds before an idle shard store is closed.
    #[arg(long, env = "MA_POOL_TIMEOUT")]
    pub idle_timeout: Option<u64>,

    /// Query cache directory.
    #[arg(long, env = "MA_CACHE_DIR")]
    pub cache_directory: Option<String>,

    /// Basic auth user name. Authentication is disabled when unset
    /// or empty.
    #[arg(long, env = "MA_USER")]
    pub user: Option<String>,

    /// Basic auth password.
    #[arg(long, env = "MA_PASSWORD")]
    pub password: Option<String>,
}

impl Cli {
    /// Overlay the provided flags onto the configuration defaults.
    pub fn into_config(self) -> General {
        let mut config = General::default();

        if let Some(port) = self.port {
            config.port = port;
        }
        if let Some(root) = self.root {
            config.root = root;
        }
        if let Some(connections) = self.connections {
            config.pooling.max_open = connections;
        }
        if let Some(idle_timeout) = self.idle_timeout {
            config.pooling.idle_timeout = idle_timeout;
        }
        if let Some(cache_directory) = self.cache_directory {
            config.cache_directory = cache_directory;
        }

        if let Some(user) = self.user {
            if !user.is_empty() {
                config.auth = Some(Auth {
                    user,
                    password: self.password.unwrap_or_default(),
                });
            }
        }

        config
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = Cli::default().into_config();

        assert_eq!(config.port, 7070);
        assert_eq!(config.root, "./dbs/");
        assert_eq!(config.pooling.max_open, 1000);
        assert_eq!(config.pooling.idle_timeout, 60);
        assert_eq!(config.cache_directory, ".diskache");
        assert!(config.auth.is_none());
    }

    #[test]
    fn test_flags_override_defaults() {
        let cli = Cli::parse_from([
            "microlytics",
            "--port",
            "8080",
            "--root",
            "/data/dbs",
            "--connections",
            "50",
            "--idle-timeout",
            "5",
            "--cache-directory",
            "/tmp/cache",
            "--user",
            "admin",
            "--password",
            "secret",
        ]);
        let config = cli.into_config();

        assert_eq!(config.port, 8080);
        assert_eq!(config.root, "/data/dbs");
        assert_eq!(config.pooling.max_open, 50);
        assert_eq!(config.pooling.idle_timeout, 5);
        assert_eq!(config.cache_directory, "/tmp/cache");

        let auth = config.auth.unwrap();
        assert_eq!(auth.user, "admin");
        assert_eq!(auth.password, "secret");
    }

    #[test]
    fn test_empty_user_disables_auth() {
        let cli = Cli::parse_from(["microlytics", "--user", "", "--password", "secret"]);
        assert!(cli.into_config().auth.is_none());
    }
}
