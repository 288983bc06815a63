use serde::{Deserialize, Serialize};

/// Basic-auth credential the service accepts.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct Auth {
    pub user: String,
    #[serde(default)]
    pub password: String,
}

impl Auth {
    /// Credentials are only enforced for a non-empty user name.
    pub fn enabled(&self) -> bool {
        !self.user.is_empty()
    }
}
