use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use jiff::Timestamp;
use redis::aio::ConnectionManager;

use crate::types::{ClaimOutcome, EntitlementRecord, EventMarker, MarkerState, Mutation};
use crate::{DocumentStore, StoreError};

/// Delete the marker only while it still holds the caller's claim
const RELEASE_CLAIM: &str = r"
if redis.call('GET', KEYS[1]) == ARGV[1] then
    return redis.call('DEL', KEYS[1])
end
return 0
";

/// Valkey-backed store
///
/// Entitlement records are hashes at `{prefix}:entitlement:{app_user_id}`,
/// mutated inside `MULTI`/`EXEC` so balance and status change together.
/// Markers are JSON strings at `{prefix}:event:{event_id}`; a claim is a
/// `SET NX PX` and completion replaces it with the retention expiry. A claim
/// is released with a compare-and-delete script so a delivery whose lease
/// lapsed cannot drop a marker it no longer owns.
#[derive(Clone)]
pub struct ValkeyStore {
    conn: ConnectionManager,
    key_prefix: String,
    retention: Option<Duration>,
}

impl ValkeyStore {
    /// Connect to Valkey
    ///
    /// # Errors
    ///
    /// Returns an error if the URL is invalid or the initial connection fails
    pub async fn connect(url: &str, key_prefix: &str, retention: Option<Duration>) -> Result<Self, StoreError> {
        let client = redis::Client::open(url).map_err(|e| StoreError::Backend(format!("invalid URL: {e}")))?;

        let conn = ConnectionManager::new(client)
            .await
            .map_err(|e| StoreError::Backend(format!("connection failed: {e}")))?;

        Ok(Self {
            conn,
            key_prefix: key_prefix.to_owned(),
            retention,
        })
    }

    fn entitlement_key(&self, app_user_id: &str) -> String {
        format!("{}:entitlement:{app_user_id}", self.key_prefix)
    }

    fn marker_key(&self, event_id: &str) -> String {
        format!("{}:event:{event_id}", self.key_prefix)
    }
}

#[async_trait]
impl DocumentStore for ValkeyStore {
    async fn entitlement(&self, app_user_id: &str) -> Result<Option<EntitlementRecord>, StoreError> {
        use redis::AsyncCommands;

        let mut conn = self.conn.clone();
        let fields: HashMap<String, String> = conn
            .hgetall(self.entitlement_key(app_user_id))
            .await
            .map_err(|e| StoreError::Backend(format!("HGETALL failed: {e}")))?;

        if fields.is_empty() {
            return Ok(None);
        }

        record_from_fields(&fields).map(Some)
    }

    async fn apply(&self, app_user_id: &str, mutation: &Mutation) -> Result<(), StoreError> {
        let key = self.entitlement_key(app_user_id);
        let mut conn = self.conn.clone();
        let mut pipe = redis::pipe();
        pipe.atomic();

        match mutation {
            Mutation::Grant {
                tokens,
                product_id,
                event_type,
                at,
            } => {
                let delta = i64::try_from(*tokens)
                    .map_err(|_| StoreError::Serialization(format!("token grant out of range: {tokens}")))?;

                let mut fields = vec![
                    ("subscription_active", "1".to_owned()),
                    ("last_event_type", event_type.clone()),
                    ("last_grant_at", at.to_string()),
                ];
                if let Some(product_id) = product_id {
                    fields.push(("subscription_product_id", product_id.clone()));
                }

                pipe.hincr(&key, "token_balance", delta)
                    .ignore()
                    .hset_multiple(&key, &fields)
                    .ignore();
            }
            Mutation::Revoke { event_type, at } => {
                let fields = [
                    ("token_balance", "0".to_owned()),
                    ("subscription_active", "0".to_owned()),
                    ("last_event_type", event_type.clone()),
                    ("last_revoke_at", at.to_string()),
                ];
                pipe.hset_multiple(&key, &fields).ignore();
            }
        }

        pipe.query_async::<()>(&mut conn)
            .await
            .map_err(|e| StoreError::Backend(format!("MULTI/EXEC failed: {e}")))
    }

    async fn marker(&self, event_id: &str) -> Result<Option<EventMarker>, StoreError> {
        use redis::AsyncCommands;

        let mut conn = self.conn.clone();
        let data: Option<String> = conn
            .get(self.marker_key(event_id))
            .await
            .map_err(|e| StoreError::Backend(format!("GET failed: {e}")))?;

        data.map(|data| {
            serde_json::from_str(&data).map_err(|e| StoreError::Serialization(format!("deserialize marker: {e}")))
        })
        .transpose()
    }

    async fn claim_marker(&self, marker: &EventMarker, lease: Duration) -> Result<ClaimOutcome, StoreError> {
        let mut conn = self.conn.clone();
        let data =
            serde_json::to_string(marker).map_err(|e| StoreError::Serialization(format!("serialize marker: {e}")))?;
        let lease_ms = u64::try_from(lease.as_millis()).unwrap_or(u64::MAX).max(1);

        let created: Option<String> = redis::cmd("SET")
            .arg(self.marker_key(&marker.event_id))
            .arg(&data)
            .arg("NX")
            .arg("PX")
            .arg(lease_ms)
            .query_async(&mut conn)
            .await
            .map_err(|e| StoreError::Backend(format!("SET NX failed: {e}")))?;

        if created.is_some() {
            return Ok(ClaimOutcome::Claimed);
        }

        // Lost the race; report whatever holds the key now
        let held = self.marker(&marker.event_id).await?;
        Ok(ClaimOutcome::Held(held.map_or(MarkerState::Claimed, |m| m.state)))
    }

    async fn complete_marker(&self, marker: &EventMarker) -> Result<(), StoreError> {
        use redis::AsyncCommands;

        let mut conn = self.conn.clone();
        let key = self.marker_key(&marker.event_id);
        let data =
            serde_json::to_string(marker).map_err(|e| StoreError::Serialization(format!("serialize marker: {e}")))?;

        let result: redis::RedisResult<()> = match self.retention {
            Some(retention) => conn.set_ex(&key, &data, retention.as_secs().max(1)).await,
            None => conn.set(&key, &data).await,
        };

        result.map_err(|e| StoreError::Backend(format!("SET failed: {e}")))
    }

    async fn release_marker(&self, claim: &EventMarker) -> Result<bool, StoreError> {
        let mut conn = self.conn.clone();
        let data =
            serde_json::to_string(claim).map_err(|e| StoreError::Serialization(format!("serialize marker: {e}")))?;

        // The stored claim is the exact document written by `claim_marker`
        let deleted: i64 = redis::Script::new(RELEASE_CLAIM)
            .key(self.marker_key(&claim.event_id))
            .arg(data)
            .invoke_async(&mut conn)
            .await
            .map_err(|e| StoreError::Backend(format!("claim release failed: {e}")))?;

        Ok(deleted > 0)
    }
}

/// Decode an entitlement hash
fn record_from_fields(fields: &HashMap<String, String>) -> Result<EntitlementRecord, StoreError> {
    let timestamp = |name: &str| -> Result<Option<Timestamp>, StoreError> {
        fields
            .get(name)
            .map(|value| {
                value
                    .parse::<Timestamp>()
                    .map_err(|e| StoreError::Serialization(format!("{name}: {e}")))
            })
            .transpose()
    };

    let token_balance = fields
        .get("token_balance")
        .map(|value| {
            value
                .parse::<u64>()
                .map_err(|e| StoreError::Serialization(format!("token_balance: {e}")))
        })
        .transpose()?
        .unwrap_or_default();

    Ok(EntitlementRecord {
        token_balance,
        subscription_active: fields.get("subscription_active").is_some_and(|v| v == "1"),
        subscription_product_id: fields.get("subscription_product_id").cloned(),
        last_event_type: fields.get("last_event_type").cloned(),
        last_grant_at: timestamp("last_grant_at")?,
        last_revoke_at: timestamp("last_revoke_at")?,
    })
}
