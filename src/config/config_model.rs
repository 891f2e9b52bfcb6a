use url::Url;

#[derive(Debug, Clone)]
pub struct DotEnvyConfig {
    pub server: Server,
    pub database: Database,
    pub gateway: Gateway,
    pub retry: Retry,
    pub catalog: Catalog,
}

#[derive(Debug, Clone)]
pub struct Server {
    pub port: u16,
    pub body_limit: u64,
    pub timeout: u64,
}

#[derive(Debug, Clone)]
pub struct Database {
    pub url: String,
}

#[derive(Debug, Clone)]
pub struct Gateway {
    pub webhook_secret: String,
    pub checkout_base_url: Url,
    pub success_url: String,
    pub cancel_url: String,
    pub notification_url: String,
}

#[derive(Debug, Clone)]
pub struct Retry {
    pub max_attempts: u32,
    pub backoff_ms: u64,
}

#[derive(Debug, Clone)]
pub struct Catalog {
    pub ttl_seconds: u64,
}
