//! Configuration for Agora
//!
//! CLI arguments and environment variable handling using clap.

use clap::Parser;
use std::net::SocketAddr;
use uuid::Uuid;

/// Agora - REST backend for the farm marketplace
#[derive(Parser, Debug, Clone)]
#[command(name = "agora")]
#[command(about = "REST backend for the Agora farm marketplace")]
pub struct Args {
    /// Unique node identifier for this instance
    #[arg(long, env = "NODE_ID", default_value_t = Uuid::new_v4())]
    pub node_id: Uuid,

    /// Address to listen on
    #[arg(long, env = "LISTEN", default_value = "0.0.0.0:8080")]
    pub listen: SocketAddr,

    /// Enable development mode (in-memory store fallback, fixed JWT secret)
    #[arg(long, env = "DEV_MODE", default_value = "false")]
    pub dev_mode: bool,

    /// MongoDB connection URI
    #[arg(long, env = "MONGODB_URI", default_value = "mongodb://localhost:27017")]
    pub mongodb_uri: String,

    /// MongoDB database name
    #[arg(long, env = "MONGODB_DB", default_value = "agora")]
    pub mongodb_db: String,

    /// JWT secret for token signing (required in production)
    #[arg(long, env = "JWT_SECRET")]
    pub jwt_secret: Option<String>,

    /// JWT token expiry in seconds
    #[arg(long, env = "JWT_EXPIRY_SECONDS", default_value = "3600")]
    pub jwt_expiry_seconds: u64,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, env = "LOG_LEVEL", default_value = "info")]
    pub log_level: String,
}

impl Args {
    /// Validate configuration
    pub fn validate(&self) -> Result<(), String> {
        if !self.dev_mode && self.jwt_secret.is_none() {
            return Err("JWT_SECRET is required in production mode".to_string());
        }

        if let Some(ref secret) = self.jwt_secret {
            if secret.len() < 32 {
                return Err("JWT_SECRET must be at least 32 characters".to_string());
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base_args() -> Args {
        Args::parse_from(["agora"])
    }

    #[test]
    fn test_defaults() {
        let args = base_args();
        assert_eq!(args.mongodb_db, "agora");
        assert_eq!(args.jwt_expiry_seconds, 3600);
        assert!(!args.dev_mode);
    }

    #[test]
    fn test_production_requires_jwt_secret() {
        let args = base_args();
        assert!(args.validate().is_err());

        let mut dev = base_args();
        dev.dev_mode = true;
        assert!(dev.validate().is_ok());
    }

    #[test]
    fn test_short_secret_rejected() {
        let mut args = base_args();
        args.jwt_secret = Some("short".into());
        assert!(args.validate().is_err());

        args.jwt_secret = Some("a-secret-that-is-long-enough-to-pass-validation".into());
        assert!(args.validate().is_ok());
    }
}
