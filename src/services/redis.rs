//! Redis-backed OTP challenge store
//!
//! One key per email (`otp:<email>`) holding the challenge as JSON. The key
//! expires a minute after the challenge itself so an expired challenge is
//! still visible to `verify`, which reports it as expired and deletes it.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use redis::{aio::MultiplexedConnection, AsyncCommands, Client, Script};

use crate::{
    error::{AppError, AppResult},
    models::OtpChallenge,
    repository::ChallengeStore,
};

const KEY_PREFIX: &str = "otp:";
const EXPIRY_GRACE_MS: i64 = 60_000;

/// Swap the stored challenge only if its id and revision still match.
/// ARGV: id, revision, replacement JSON (empty string deletes).
const COMPARE_AND_SWAP: &str = r#"
local current = redis.call('GET', KEYS[1])
if not current then
    return 0
end
local stored = cjson.decode(current)
if stored['id'] ~= ARGV[1] or tonumber(stored['revision']) ~= tonumber(ARGV[2]) then
    return 0
end
if ARGV[3] == '' then
    redis.call('DEL', KEYS[1])
else
    redis.call('SET', KEYS[1], ARGV[3], 'KEEPTTL')
end
return 1
"#;

fn key_for(email: &str) -> String {
    format!("{}{}", KEY_PREFIX, email)
}

fn encode(challenge: &OtpChallenge) -> AppResult<String> {
    serde_json::to_string(challenge).map_err(|e| AppError::Store(format!("Failed to encode OTP challenge: {}", e)))
}

fn decode(raw: &str) -> AppResult<OtpChallenge> {
    serde_json::from_str(raw).map_err(|e| AppError::Store(format!("Corrupt OTP challenge in Redis: {}", e)))
}

#[derive(Clone)]
pub struct RedisChallengeStore {
    conn: MultiplexedConnection,
    cas: Script,
}

impl RedisChallengeStore {
    /// Connect to Redis and check the connection
    pub async fn new(url: &str) -> AppResult<Self> {
        let client =
            Client::open(url).map_err(|e| AppError::Store(format!("Failed to create Redis client: {}", e)))?;

        let mut conn = client
            .get_multiplexed_async_connection()
            .await
            .map_err(|e| AppError::Store(format!("Failed to connect to Redis: {}", e)))?;

        redis::cmd("PING")
            .query_async::<_, String>(&mut conn)
            .await
            .map_err(|e| AppError::Store(format!("Redis connection test failed: {}", e)))?;

        Ok(Self {
            conn,
            cas: Script::new(COMPARE_AND_SWAP),
        })
    }
}

#[async_trait]
impl ChallengeStore for RedisChallengeStore {
    async fn load(&self, email: &str) -> AppResult<Option<OtpChallenge>> {
        let mut conn = self.conn.clone();
        let raw: Option<String> = conn.get(key_for(email)).await?;
        raw.as_deref().map(decode).transpose()
    }

    async fn replace(&self, challenge: &OtpChallenge) -> AppResult<()> {
        let mut conn = self.conn.clone();
        let ttl_ms = (challenge.expires_at - challenge.created_at).num_milliseconds().max(0) + EXPIRY_GRACE_MS;
        redis::cmd("SET")
            .arg(key_for(&challenge.email))
            .arg(encode(challenge)?)
            .arg("PX")
            .arg(ttl_ms)
            .query_async::<_, ()>(&mut conn)
            .await?;
        Ok(())
    }

    async fn compare_and_swap(&self, current: &OtpChallenge, next: Option<&OtpChallenge>) -> AppResult<bool> {
        let mut conn = self.conn.clone();
        let replacement = match next {
            Some(next) => encode(next)?,
            None => String::new(),
        };
        let swapped = self
            .cas
            .key(key_for(&current.email))
            .arg(current.id.to_string())
            .arg(current.revision)
            .arg(replacement)
            .invoke_async::<_, i32>(&mut conn)
            .await?;
        Ok(swapped == 1)
    }

    async fn purge_expired(&self, now: DateTime<Utc>) -> AppResult<u64> {
        let mut conn = self.conn.clone();
        let mut keys: Vec<String> = Vec::new();
        {
            let mut iter = conn.scan_match::<_, String>(format!("{}*", KEY_PREFIX)).await?;
            while let Some(key) = iter.next_item().await {
                keys.push(key);
            }
        }

        let mut purged = 0;
        for key in keys {
            let raw: Option<String> = conn.get(&key).await?;
            let Some(raw) = raw else { continue };
            let challenge = match decode(&raw) {
                Ok(challenge) => challenge,
                Err(e) => {
                    tracing::warn!(key = %key, error = %e, "Dropping unreadable OTP challenge");
                    conn.del::<_, ()>(&key).await?;
                    purged += 1;
                    continue;
                }
            };
            if challenge.is_expired(now) && self.compare_and_swap(&challenge, None).await? {
                purged += 1;
            }
        }
        Ok(purged)
    }
}
