// Submodules
pub mod auth;
pub mod general;
pub mod pooling;

pub use auth::Auth;
pub use general::General;
pub use pooling::Pooling;

#[cfg(test)]
mod test {
    use crate::General;

    #[test]
    fn test_default_config_serializable() {
        let config = General::default();
        let encoded = serde_json::to_string(&config).unwrap();
        let decoded: General = serde_json::from_str(&encoded).unwrap();
        assert_eq!(config, decoded);
    }

    #[test]
    fn test_defaults() {
        let config = General::default();
        assert_eq!(config.port, 7070);
        assert_eq!(config.root, "./dbs/");
        assert_eq!(config.cache_directory, ".diskache");
        assert_eq!(config.pooling.max_open, 1000);
        assert_eq!(config.pooling.idle_timeout, 60);
        assert!(config.auth.is_none());
    }
}
