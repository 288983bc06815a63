use serde::{Deserialize, Serialize};

use crate::auth::Auth;
use crate::pooling::Pooling;

/// Service-wide settings: network, storage locations, pool sizing
/// and the optional basic-auth credential.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct General {
    /// The IP address the server binds to.
    ///
    /// _Default:_ `0.0.0.0`
    #[serde(default = "General::host")]
    pub host: String,

    /// The TCP port the server listens on.
    ///
    /// _Default:_ `7070`
    #[serde(default = "General::port")]
    pub port: u16,

    /// Directory holding one subdirectory per tenant database.
    ///
    /// _Default:_ `./dbs/`
    #[serde(default = "General::root")]
    pub root: String,

    /// Directory holding cached per-shard query results.
    ///
    /// _Default:_ `.diskache`
    #[serde(default = "General::cache_directory")]
    pub cache_directory: String,

    /// Shard store pool settings.
    #[serde(default)]
    pub pooling: Pooling,

    /// Basic-auth credential. Authentication is disabled when absent
    /// or when the user name is empty.
    #[serde(default)]
    pub auth: Option<Auth>,
}

impl General {
    fn host() -> String {
        "0.0.0.0".into()
    }

    fn port() -> u16 {
        7070
    }

    fn root() -> String {
        "./dbs/".into()
    }

    fn cache_directory() -> String {
        ".diskache".into()
    }

    /// Address for the TCP listener.
    pub fn listen_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

impl Default for General {
    fn default() -> Self {
        Self {
            host: Self::host(),
            port: Self::port(),
            root: Self::root(),
            cache_directory: Self::cache_directory(),
            pooling: Pooling::default(),
            auth: None,
        }
    }
}
