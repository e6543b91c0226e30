use std::{env, time::Duration};

use log::*;
use mpg_common::Secret;
use settlement_engine::{
    workers::{RetryPolicy, RetryPolicyError, WorkerConfig},
    TopicConfig,
};

const DEFAULT_DATABASE_URL: &str = "sqlite://data/mpg_store.db";
const DEFAULT_MAX_DB_CONNECTIONS: u32 = 16;
const DEFAULT_PARTITIONS: u32 = 8;
const DEFAULT_WORKERS: u32 = 4;
const DEFAULT_POLL_INTERVAL_MS: u64 = 500;
const DEFAULT_MAX_RETRIES: u32 = 5;
const DEFAULT_RETRY_INTERVALS_MS: &str = "1000,5000,15000,30000,60000";
const DEFAULT_REQUEST_TIMEOUT_MS: u64 = 10_000;
const DEFAULT_HEALTH_CHECK_INTERVAL_SECS: u64 = 300;

/// Server configuration, read from `MPG_*` environment variables with logged fallbacks to defaults.
#[derive(Clone, Debug)]
pub struct ServerConfig {
    pub database_url: Secret<String>,
    pub max_db_connections: u32,
    /// Number of partitions per topic. Changing this on a live system remaps keys to new partitions, so pick
    /// it once; existing events keep the partition they were appended with.
    pub partitions: u32,
    pub dispatcher_workers: u32,
    pub sender_workers: u32,
    pub poll_interval: Duration,
    pub max_retries: u32,
    pub retry_intervals: Vec<Duration>,
    /// Bound on each webhook POST, end to end.
    pub request_timeout: Duration,
    pub health_check_interval: Duration,
    pub topics: TopicConfig,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            database_url: Secret::new(DEFAULT_DATABASE_URL.to_string()),
            max_db_connections: DEFAULT_MAX_DB_CONNECTIONS,
            partitions: DEFAULT_PARTITIONS,
            dispatcher_workers: DEFAULT_WORKERS,
            sender_workers: DEFAULT_WORKERS,
            poll_interval: Duration::from_millis(DEFAULT_POLL_INTERVAL_MS),
            max_retries: DEFAULT_MAX_RETRIES,
            retry_intervals: parse_intervals(DEFAULT_RETRY_INTERVALS_MS).unwrap_or_default(),
            request_timeout: Duration::from_millis(DEFAULT_REQUEST_TIMEOUT_MS),
            health_check_interval: Duration::from_secs(DEFAULT_HEALTH_CHECK_INTERVAL_SECS),
            topics: TopicConfig::default(),
        }
    }
}

impl ServerConfig {
    pub fn from_env_or_default() -> Self {
        let database_url = Secret::new(env::var("MPG_DATABASE_URL").unwrap_or_else(|_| {
            warn!("🪛️ MPG_DATABASE_URL is not set. Using the default, {DEFAULT_DATABASE_URL}.");
            DEFAULT_DATABASE_URL.to_string()
        }));
        let retry_intervals = env::var("MPG_RETRY_INTERVALS_MS")
            .ok()
            .and_then(|s| {
                parse_intervals(&s)
                    .map_err(|e| {
                        error!("🪛️ MPG_RETRY_INTERVALS_MS is invalid ({e}). Using the default schedule.");
                    })
                    .ok()
            })
            .or_else(|| parse_intervals(DEFAULT_RETRY_INTERVALS_MS).ok())
            .unwrap_or_default();
        let mut topics = TopicConfig::default();
        if let Ok(topic) = env::var("MPG_STATUS_TOPIC") {
            topics.status_topic = topic;
        }
        if let Ok(topic) = env::var("MPG_WEBHOOK_TOPIC") {
            topics.webhook_topic = topic;
        }
        if let Ok(group) = env::var("MPG_CONSUMER_GROUP") {
            topics.consumer_group = group;
        }
        Self {
            database_url,
            max_db_connections: env_u32("MPG_MAX_DB_CONNECTIONS", DEFAULT_MAX_DB_CONNECTIONS),
            partitions: env_u32("MPG_PARTITIONS", DEFAULT_PARTITIONS).max(1),
            dispatcher_workers: env_u32("MPG_DISPATCHER_WORKERS", DEFAULT_WORKERS).max(1),
            sender_workers: env_u32("MPG_SENDER_WORKERS", DEFAULT_WORKERS).max(1),
            poll_interval: Duration::from_millis(env_u64("MPG_POLL_INTERVAL_MS", DEFAULT_POLL_INTERVAL_MS)),
            max_retries: env_u32("MPG_MAX_RETRIES", DEFAULT_MAX_RETRIES),
            retry_intervals,
            request_timeout: Duration::from_millis(env_u64("MPG_REQUEST_TIMEOUT_MS", DEFAULT_REQUEST_TIMEOUT_MS)),
            health_check_interval: Duration::from_secs(env_u64(
                "MPG_HEALTH_CHECK_INTERVAL_SECS",
                DEFAULT_HEALTH_CHECK_INTERVAL_SECS,
            )),
            topics,
        }
    }

    /// The validated retry schedule shared by both worker pools.
    pub fn retry_policy(&self) -> Result<RetryPolicy, RetryPolicyError> {
        RetryPolicy::new(self.max_retries, self.retry_intervals.clone())
    }

    pub fn dispatcher_config(&self, retry: RetryPolicy) -> WorkerConfig {
        WorkerConfig { workers: self.dispatcher_workers, poll_interval: self.poll_interval, retry }
    }

    pub fn sender_config(&self, retry: RetryPolicy) -> WorkerConfig {
        WorkerConfig { workers: self.sender_workers, poll_interval: self.poll_interval, retry }
    }
}

fn env_u32(name: &str, default: u32) -> u32 {
    match env::var(name) {
        Ok(s) => s.parse::<u32>().unwrap_or_else(|e| {
            error!("🪛️ {s} is not a valid value for {name}. {e} Using the default, {default}, instead.");
            default
        }),
        Err(_) => default,
    }
}

fn env_u64(name: &str, default: u64) -> u64 {
    match env::var(name) {
        Ok(s) => s.parse::<u64>().unwrap_or_else(|e| {
            error!("🪛️ {s} is not a valid value for {name}. {e} Using the default, {default}, instead.");
            default
        }),
        Err(_) => default,
    }
}

fn parse_intervals(s: &str) -> Result<Vec<Duration>, String> {
    s.split(',')
        .map(|part| {
            part.trim().parse::<u64>().map(Duration::from_millis).map_err(|e| format!("'{part}' is not a duration: {e}"))
        })
        .collect()
}
