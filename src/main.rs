//! Agora - REST backend for the farm marketplace

use clap::Parser;
use std::sync::Arc;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use agora::{
    auth::JwtValidator,
    config::Args,
    db::MongoClient,
    server::{self, AppState},
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables from .env file if present
    let _ = dotenvy::dotenv();

    // Parse command line arguments
    let args = Args::parse();

    // Initialize tracing/logging
    let log_level = args.log_level.clone();
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| format!("agora={},info", log_level).into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Validate configuration
    if let Err(e) = args.validate() {
        error!("Configuration error: {}", e);
        std::process::exit(1);
    }

    // Print startup banner
    info!("======================================");
    info!("  Agora - Farm Marketplace Backend");
    info!("======================================");
    info!("Node ID: {}", args.node_id);
    info!("Listen: {}", args.listen);
    info!(
        "Mode: {}",
        if args.dev_mode { "DEVELOPMENT" } else { "PRODUCTION" }
    );
    info!("MongoDB: {}", args.mongodb_uri);
    info!("JWT expiry: {}s", args.jwt_expiry_seconds);
    info!("======================================");

    let jwt = match args.jwt_secret.clone() {
        Some(secret) => JwtValidator::new(secret, args.jwt_expiry_seconds)?,
        None => {
            warn!("No JWT_SECRET set - using dev validator (dev mode only)");
            JwtValidator::new_dev()
        }
    };

    // Connect to MongoDB (optional in dev mode)
    let state = match MongoClient::new(&args.mongodb_uri, &args.mongodb_db).await {
        Ok(mongo) => {
            info!("MongoDB connected successfully");
            AppState::with_mongo(args, jwt, mongo)
        }
        Err(e) => {
            if args.dev_mode {
                warn!(
                    "MongoDB connection failed (dev mode, using in-memory store): {}",
                    e
                );
                AppState::in_memory(args, jwt)
            } else {
                error!("MongoDB connection failed: {}", e);
                std::process::exit(1);
            }
        }
    };

    server::run(Arc::new(state)).await?;

    Ok(())
}
