use anyhow::{Ok, Result};
use url::Url;

use super::config_model::{Catalog, Database, DotEnvyConfig, Gateway, Retry, Server};

pub fn load() -> Result<DotEnvyConfig> {
    dotenvy::dotenv().ok();

    let server = Server {
        port: std::env::var("SERVER_PORT")
            .expect("SERVER_PORT is invalid")
            .parse()?,
        body_limit: std::env::var("SERVER_BODY_LIMIT")
            .expect("SERVER_BODY_LIMIT is invalid")
            .parse()?,
        timeout: std::env::var("SERVER_TIMEOUT")
            .expect("SERVER_TIMEOUT is invalid")
            .parse()?,
    };

    let database = Database {
        url: std::env::var("DATABASE_URL").expect("DATABASE_URL is invalid"),
    };

    let gateway = Gateway {
        webhook_secret: std::env::var("GATEWAY_WEBHOOK_SECRET")
            .expect("GATEWAY_WEBHOOK_SECRET is invalid"),
        checkout_base_url: Url::parse(
            &std::env::var("GATEWAY_CHECKOUT_BASE_URL")
                .expect("GATEWAY_CHECKOUT_BASE_URL is invalid"),
        )?,
        success_url: std::env::var("CHECKOUT_SUCCESS_URL")
            .expect("CHECKOUT_SUCCESS_URL is invalid"),
        cancel_url: std::env::var("CHECKOUT_CANCEL_URL")
            .expect("CHECKOUT_CANCEL_URL is invalid"),
        notification_url: std::env::var("GATEWAY_NOTIFICATION_URL")
            .expect("GATEWAY_NOTIFICATION_URL is invalid"),
    };

    let retry = Retry {
        max_attempts: std::env::var("WRITE_MAX_ATTEMPTS")
            .unwrap_or_else(|_| "3".to_string())
            .parse()?,
        backoff_ms: std::env::var("WRITE_BACKOFF_MS")
            .unwrap_or_else(|_| "500".to_string())
            .parse()?,
    };

    let catalog = Catalog {
        ttl_seconds: std::env::var("PLAN_CACHE_TTL_SECONDS")
            .unwrap_or_else(|_| "60".to_string())
            .parse()?,
    };

    Ok(DotEnvyConfig {
        server,
        database,
        gateway,
        retry,
        catalog,
    })
}
