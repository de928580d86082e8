//! Redis quota backend.
//!
//! Records live as hashes under a configurable key prefix. Redis has a native
//! atomic increment, so `add` is implemented as a Lua script that performs
//! the period check, the reset, and the `HINCRBY` in one atomic step —
//! concurrent accruals on the same key cannot lose updates here.

use std::collections::HashMap;

use async_trait::async_trait;
use redis::AsyncCommands;

use crate::record::UsageRecord;
use crate::store::{QuotaBackend, StoreUnavailable};

#[derive(Clone, Debug)]
pub struct RedisQuotaBackend {
    client: redis::Client,
    prefix: String,
}

impl RedisQuotaBackend {
    pub fn new(url: impl AsRef<str>) -> Result<Self, StoreUnavailable> {
        Ok(Self {
            client: redis::Client::open(url.as_ref()).map_err(into_unavailable)?,
            prefix: "tollgate".to_string(),
        })
    }

    pub fn with_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.prefix = prefix.into();
        self
    }

    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    async fn connection(&self) -> Result<redis::aio::MultiplexedConnection, StoreUnavailable> {
        self.client
            .get_multiplexed_async_connection()
            .await
            .map_err(into_unavailable)
    }

    pub async fn ping(&self) -> Result<(), StoreUnavailable> {
        let mut conn = self.connection().await?;
        let _: Option<String> = conn
            .get(format!("{}:__ping__", self.prefix))
            .await
            .map_err(into_unavailable)?;
        Ok(())
    }

    fn record_key(&self, key: &str) -> String {
        format!("{}:{key}", self.prefix)
    }
}

#[async_trait]
impl QuotaBackend for RedisQuotaBackend {
    async fn load(&self, key: &str) -> Result<Option<UsageRecord>, StoreUnavailable> {
        let mut conn = self.connection().await?;
        let raw: HashMap<String, String> = conn
            .hgetall(self.record_key(key))
            .await
            .map_err(into_unavailable)?;
        if raw.is_empty() {
            return Ok(None);
        }
        Ok(Some(UsageRecord {
            spent_usd_micros: parse_field(&raw, "spent_usd_micros"),
            period_tag: raw.get("period_tag").cloned().unwrap_or_default(),
            request_count: parse_field(&raw, "request_count"),
            updated_at_ms: parse_field(&raw, "updated_at_ms"),
        }))
    }

    async fn save(&self, key: &str, record: &UsageRecord) -> Result<(), StoreUnavailable> {
        let mut conn = self.connection().await?;
        let record_key = self.record_key(key);
        let _: () = redis::pipe()
            .atomic()
            .del(&record_key)
            .hset(&record_key, "spent_usd_micros", record.spent_usd_micros)
            .hset(&record_key, "period_tag", &record.period_tag)
            .hset(&record_key, "request_count", record.request_count)
            .hset(&record_key, "updated_at_ms", record.updated_at_ms)
            .query_async(&mut conn)
            .await
            .map_err(into_unavailable)?;
        Ok(())
    }

    async fn add(
        &self,
        key: &str,
        period_tag: &str,
        usd_micros: u64,
        now_ms: u64,
    ) -> Result<Option<UsageRecord>, StoreUnavailable> {
        let mut conn = self.connection().await?;

        let script = redis::Script::new(
            r#"
local key = KEYS[1]
local period = ARGV[1]
local amount = tonumber(ARGV[2]) or 0
local now_ms = ARGV[3]

if redis.call("HGET", key, "period_tag") ~= period then
  redis.call("DEL", key)
  redis.call("HSET", key, "period_tag", period)
end
local spent = redis.call("HINCRBY", key, "spent_usd_micros", amount)
local count = redis.call("HINCRBY", key, "request_count", 1)
redis.call("HSET", key, "updated_at_ms", now_ms)
return { tostring(spent), tostring(count) }
"#,
        );

        let result: Vec<String> = script
            .key(self.record_key(key))
            .arg(period_tag)
            .arg(micros_to_i64(usd_micros))
            .arg(now_ms)
            .invoke_async(&mut conn)
            .await
            .map_err(into_unavailable)?;

        let (Some(spent), Some(count)) = (
            result.first().and_then(|raw| raw.parse::<u64>().ok()),
            result.get(1).and_then(|raw| raw.parse::<u64>().ok()),
        ) else {
            return Err(StoreUnavailable::new("unexpected redis script response"));
        };

        Ok(Some(UsageRecord {
            spent_usd_micros: spent,
            period_tag: period_tag.to_string(),
            request_count: count,
            updated_at_ms: now_ms,
        }))
    }
}

fn into_unavailable(err: redis::RedisError) -> StoreUnavailable {
    StoreUnavailable::new(format!("redis error: {err}"))
}

fn parse_field(raw: &HashMap<String, String>, field: &str) -> u64 {
    raw.get(field)
        .and_then(|value| value.parse::<u64>().ok())
        .unwrap_or(0)
}

fn micros_to_i64(usd_micros: u64) -> i64 {
    if usd_micros > i64::MAX as u64 {
        i64::MAX
    } else {
        usd_micros as i64
    }
}
