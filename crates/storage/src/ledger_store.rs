//! Ledger storage implementation using DynamoDB
//!
//! The ledger holds two kinds of items, both under a composite (PK, SK) key:
//! idempotency locks (`IDEMPOTENCY#{basename}` / `HASH#{fingerprint}`) and
//! admission job records (`DOC#{basename}` / `JOB#{job_id}`). The only write
//! primitive the intake path relies on is the conditional create: an insert
//! that fails when the key is already occupied.

use crate::{LedgerError, LedgerResult};
use aws_sdk_dynamodb::{
    config::{Credentials, Region},
    types::AttributeValue,
    Client,
};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use tokio::sync::Mutex;

/// DynamoDB configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LedgerConfig {
    /// Table name
    pub table_name: String,

    /// AWS region
    pub region: String,

    /// DynamoDB endpoint (custom for DynamoDB Local, empty for AWS)
    pub endpoint: Option<String>,

    /// AWS access key ID
    pub access_key_id: String,

    /// AWS secret access key
    pub secret_access_key: String,
}

impl Default for LedgerConfig {
    fn default() -> Self {
        Self {
            table_name: std::env::var("LEDGER_TABLE_NAME")
                .unwrap_or_else(|_| "IntakeTracker".to_string()),
            region: std::env::var("AWS_REGION").unwrap_or_else(|_| "us-west-2".to_string()),
            endpoint: std::env::var("DYNAMODB_ENDPOINT").ok(),
            access_key_id: std::env::var("AWS_ACCESS_KEY_ID").unwrap_or_default(),
            secret_access_key: std::env::var("AWS_SECRET_ACCESS_KEY").unwrap_or_default(),
        }
    }
}

/// Composite primary key of a ledger item
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct LedgerKey {
    pub pk: String,
    pub sk: String,
}

impl LedgerKey {
    #[must_use]
    pub fn new(pk: impl Into<String>, sk: impl Into<String>) -> Self {
        Self {
            pk: pk.into(),
            sk: sk.into(),
        }
    }
}

/// A ledger item is a flat attribute map of JSON values
pub type LedgerItem = serde_json::Map<String, Value>;

/// Ledger storage trait
#[async_trait::async_trait]
pub trait LedgerStore: Send + Sync {
    /// Create an item only if the key is vacant
    ///
    /// Returns `LedgerError::AlreadyExists` when the key is occupied. The
    /// check and the insert are a single atomic operation.
    async fn put_if_absent(&self, key: &LedgerKey, item: LedgerItem) -> LedgerResult<()>;

    /// Fetch a single item
    async fn get(&self, key: &LedgerKey) -> LedgerResult<Option<LedgerItem>>;

    /// Items under a partition key whose sort key starts with the prefix,
    /// in sort key order
    async fn query(&self, pk: &str, sk_prefix: &str) -> LedgerResult<Vec<LedgerItem>>;

    /// Delete an item; absent keys are not an error
    async fn delete(&self, key: &LedgerKey) -> LedgerResult<()>;

    /// Update the `state` and `updated_at` attributes of an existing item
    async fn set_state(&self, key: &LedgerKey, state: &str, updated_at: &str) -> LedgerResult<()>;
}

/// DynamoDB ledger storage implementation
pub struct DynamoLedgerStore {
    client: Client,
    table_name: String,
}

impl DynamoLedgerStore {
    /// Create a new DynamoDB ledger client
    pub async fn new(config: LedgerConfig) -> LedgerResult<Self> {
        let credentials = Credentials::new(
            &config.access_key_id,
            &config.secret_access_key,
            None,
            None,
            "doc-pipeline-ledger",
        );

        let region = Region::new(config.region.clone());

        let mut ddb_config_builder = aws_sdk_dynamodb::Config::builder()
            .credentials_provider(credentials)
            .region(region)
            .behavior_version_latest();

        if let Some(endpoint) = config.endpoint {
            ddb_config_builder = ddb_config_builder.endpoint_url(endpoint);
        }

        let client = Client::from_conf(ddb_config_builder.build());

        Ok(Self {
            client,
            table_name: config.table_name,
        })
    }
}

#[async_trait::async_trait]
impl LedgerStore for DynamoLedgerStore {
    async fn put_if_absent(&self, key: &LedgerKey, item: LedgerItem) -> LedgerResult<()> {
        let mut attrs = to_attribute_map(&item)?;
        attrs.insert("PK".to_string(), AttributeValue::S(key.pk.clone()));
        attrs.insert("SK".to_string(), AttributeValue::S(key.sk.clone()));

        self.client
            .put_item()
            .table_name(&self.table_name)
            .set_item(Some(attrs))
            .condition_expression("attribute_not_exists(PK) AND attribute_not_exists(SK)")
            .send()
            .await
            .map_err(|e| {
                if e.as_service_error()
                    .is_some_and(|se| se.is_conditional_check_failed_exception())
                {
                    tracing::debug!("Conditional write lost for {}/{}", key.pk, key.sk);
                    LedgerError::AlreadyExists
                } else {
                    LedgerError::DynamoError(e.to_string())
                }
            })?;

        Ok(())
    }

    async fn get(&self, key: &LedgerKey) -> LedgerResult<Option<LedgerItem>> {
        let response = self
            .client
            .get_item()
            .table_name(&self.table_name)
            .key("PK", AttributeValue::S(key.pk.clone()))
            .key("SK", AttributeValue::S(key.sk.clone()))
            .send()
            .await
            .map_err(|e| LedgerError::DynamoError(e.to_string()))?;

        match response.item {
            Some(attrs) => Ok(Some(from_attribute_map(attrs)?)),
            None => Ok(None),
        }
    }

    async fn query(&self, pk: &str, sk_prefix: &str) -> LedgerResult<Vec<LedgerItem>> {
        let response = self
            .client
            .query()
            .table_name(&self.table_name)
            .key_condition_expression("PK = :pk AND begins_with(SK, :sk)")
            .expression_attribute_values(":pk", AttributeValue::S(pk.to_string()))
            .expression_attribute_values(":sk", AttributeValue::S(sk_prefix.to_string()))
            .send()
            .await
            .map_err(|e| LedgerError::DynamoError(e.to_string()))?;

        response
            .items
            .unwrap_or_default()
            .into_iter()
            .map(from_attribute_map)
            .collect()
    }

    async fn delete(&self, key: &LedgerKey) -> LedgerResult<()> {
        self.client
            .delete_item()
            .table_name(&self.table_name)
            .key("PK", AttributeValue::S(key.pk.clone()))
            .key("SK", AttributeValue::S(key.sk.clone()))
            .send()
            .await
            .map_err(|e| LedgerError::DynamoError(e.to_string()))?;

        Ok(())
    }

    async fn set_state(&self, key: &LedgerKey, state: &str, updated_at: &str) -> LedgerResult<()> {
        // `state` is a DynamoDB reserved word, hence the name alias. The
        // existence condition keeps the update from creating a sparse item.
        self.client
            .update_item()
            .table_name(&self.table_name)
            .key("PK", AttributeValue::S(key.pk.clone()))
            .key("SK", AttributeValue::S(key.sk.clone()))
            .update_expression("SET #s = :state, updated_at = :updated_at")
            .condition_expression("attribute_exists(PK) AND attribute_exists(SK)")
            .expression_attribute_names("#s", "state")
            .expression_attribute_values(":state", AttributeValue::S(state.to_string()))
            .expression_attribute_values(":updated_at", AttributeValue::S(updated_at.to_string()))
            .send()
            .await
            .map_err(|e| {
                if e.as_service_error()
                    .is_some_and(|se| se.is_conditional_check_failed_exception())
                {
                    LedgerError::NotFound(format!("{}/{}", key.pk, key.sk))
                } else {
                    LedgerError::DynamoError(e.to_string())
                }
            })?;

        Ok(())
    }
}

fn to_attribute_value(value: &Value) -> LedgerResult<AttributeValue> {
    match value {
        Value::String(s) => Ok(AttributeValue::S(s.clone())),
        Value::Number(n) => Ok(AttributeValue::N(n.to_string())),
        Value::Bool(b) => Ok(AttributeValue::Bool(*b)),
        Value::Null => Ok(AttributeValue::Null(true)),
        Value::Array(items) => {
            let list = items
                .iter()
                .map(to_attribute_value)
                .collect::<LedgerResult<Vec<_>>>()?;
            Ok(AttributeValue::L(list))
        }
        Value::Object(map) => {
            let entries = map
                .iter()
                .map(|(k, v)| Ok((k.clone(), to_attribute_value(v)?)))
                .collect::<LedgerResult<HashMap<_, _>>>()?;
            Ok(AttributeValue::M(entries))
        }
    }
}

fn to_attribute_map(item: &LedgerItem) -> LedgerResult<HashMap<String, AttributeValue>> {
    item.iter()
        .map(|(k, v)| Ok((k.clone(), to_attribute_value(v)?)))
        .collect()
}

fn from_attribute_value(value: &AttributeValue) -> LedgerResult<Value> {
    match value {
        AttributeValue::S(s) => Ok(Value::String(s.clone())),
        AttributeValue::N(n) => {
            if let Ok(i) = n.parse::<i64>() {
                Ok(Value::from(i))
            } else {
                n.parse::<f64>().map(Value::from).map_err(|e| {
                    LedgerError::SerializationError(format!("Invalid number {}: {}", n, e))
                })
            }
        }
        AttributeValue::Bool(b) => Ok(Value::Bool(*b)),
        AttributeValue::Null(_) => Ok(Value::Null),
        AttributeValue::L(items) => {
            let list = items
                .iter()
                .map(from_attribute_value)
                .collect::<LedgerResult<Vec<_>>>()?;
            Ok(Value::Array(list))
        }
        AttributeValue::M(map) => {
            let mut object = serde_json::Map::new();
            for (k, v) in map {
                object.insert(k.clone(), from_attribute_value(v)?);
            }
            Ok(Value::Object(object))
        }
        other => Err(LedgerError::SerializationError(format!(
            "Unsupported attribute type: {:?}",
            other
        ))),
    }
}

fn from_attribute_map(attrs: HashMap<String, AttributeValue>) -> LedgerResult<LedgerItem> {
    let mut item = LedgerItem::new();
    for (k, v) in &attrs {
        item.insert(k.clone(), from_attribute_value(v)?);
    }
    Ok(item)
}

#[derive(Default)]
struct LedgerInner {
    items: HashMap<LedgerKey, LedgerItem>,
    clock_offset: i64,
    failing_pk_prefix: Option<String>,
}

/// In-memory ledger store for tests
///
/// A single mutex over the item map makes the conditional put genuinely
/// atomic. Items whose `ttl` attribute lies in the past are evicted before
/// any read or vacancy check, matching store-side expiry; the application
/// never inspects `ttl` itself.
#[derive(Default)]
pub struct MemoryLedgerStore {
    inner: Mutex<LedgerInner>,
}

impl MemoryLedgerStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Shift the store clock forward, as if `seconds` had elapsed
    pub async fn advance(&self, seconds: i64) {
        let mut inner = self.inner.lock().await;
        inner.clock_offset += seconds;
    }

    /// Arm a one-shot failure for the next conditional put whose partition
    /// key starts with the prefix
    pub async fn fail_next_put_with_pk_prefix(&self, prefix: &str) {
        let mut inner = self.inner.lock().await;
        inner.failing_pk_prefix = Some(prefix.to_string());
    }

    pub async fn item_count(&self) -> usize {
        let mut inner = self.inner.lock().await;
        Self::evict_expired(&mut inner);
        inner.items.len()
    }

    fn now(inner: &LedgerInner) -> i64 {
        chrono::Utc::now().timestamp() + inner.clock_offset
    }

    fn evict_expired(inner: &mut LedgerInner) {
        let now = Self::now(inner);
        inner
            .items
            .retain(|_, item| item.get("ttl").and_then(Value::as_i64).map_or(true, |ttl| ttl > now));
    }
}

#[async_trait::async_trait]
impl LedgerStore for MemoryLedgerStore {
    async fn put_if_absent(&self, key: &LedgerKey, item: LedgerItem) -> LedgerResult<()> {
        let mut inner = self.inner.lock().await;

        if inner
            .failing_pk_prefix
            .as_deref()
            .is_some_and(|prefix| key.pk.starts_with(prefix))
        {
            inner.failing_pk_prefix = None;
            return Err(LedgerError::Other(format!(
                "injected put failure for {}",
                key.pk
            )));
        }

        Self::evict_expired(&mut inner);

        if inner.items.contains_key(key) {
            return Err(LedgerError::AlreadyExists);
        }

        let mut stored = item;
        stored.insert("PK".to_string(), Value::String(key.pk.clone()));
        stored.insert("SK".to_string(), Value::String(key.sk.clone()));
        inner.items.insert(key.clone(), stored);

        Ok(())
    }

    async fn get(&self, key: &LedgerKey) -> LedgerResult<Option<LedgerItem>> {
        let mut inner = self.inner.lock().await;
        Self::evict_expired(&mut inner);
        Ok(inner.items.get(key).cloned())
    }

    async fn query(&self, pk: &str, sk_prefix: &str) -> LedgerResult<Vec<LedgerItem>> {
        let mut inner = self.inner.lock().await;
        Self::evict_expired(&mut inner);

        let mut matches: Vec<(&LedgerKey, &LedgerItem)> = inner
            .items
            .iter()
            .filter(|(key, _)| key.pk == pk && key.sk.starts_with(sk_prefix))
            .collect();
        matches.sort_by(|(a, _), (b, _)| a.sk.cmp(&b.sk));

        Ok(matches.into_iter().map(|(_, item)| item.clone()).collect())
    }

    async fn delete(&self, key: &LedgerKey) -> LedgerResult<()> {
        let mut inner = self.inner.lock().await;
        inner.items.remove(key);
        Ok(())
    }

    async fn set_state(&self, key: &LedgerKey, state: &str, updated_at: &str) -> LedgerResult<()> {
        let mut inner = self.inner.lock().await;
        Self::evict_expired(&mut inner);

        let item = inner
            .items
            .get_mut(key)
            .ok_or_else(|| LedgerError::NotFound(format!("{}/{}", key.pk, key.sk)))?;

        item.insert("state".to_string(), Value::String(state.to_string()));
        item.insert(
            "updated_at".to_string(),
            Value::String(updated_at.to_string()),
        );

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn item(fields: Value) -> LedgerItem {
        match fields {
            Value::Object(map) => map,
            _ => panic!("expected object"),
        }
    }

    #[test]
    fn test_ledger_config_default() {
        let config = LedgerConfig::default();
        assert_eq!(config.table_name, "IntakeTracker");
    }

    #[test]
    fn test_attribute_value_round_trip() {
        let original = json!({
            "doc_basename": "provisioning",
            "content_length": 50000,
            "elapsed": 1.25,
            "labels": ["draft", "print"],
            "nested": {"purpose": "manual"},
            "missing": null,
            "flag": true
        });

        let converted = to_attribute_value(&original).unwrap();
        let back = from_attribute_value(&converted).unwrap();
        assert_eq!(back, original);
    }

    #[tokio::test]
    async fn test_memory_conditional_put() {
        let store = MemoryLedgerStore::new();
        let key = LedgerKey::new("IDEMPOTENCY#provisioning", "HASH#abc");

        store
            .put_if_absent(&key, item(json!({"locked_at": "now"})))
            .await
            .unwrap();

        let err = store
            .put_if_absent(&key, item(json!({"locked_at": "later"})))
            .await
            .unwrap_err();
        assert!(matches!(err, LedgerError::AlreadyExists));
    }

    #[tokio::test]
    async fn test_memory_ttl_eviction() {
        let store = MemoryLedgerStore::new();
        let key = LedgerKey::new("IDEMPOTENCY#provisioning", "HASH#abc");
        let ttl = chrono::Utc::now().timestamp() + 600;

        store
            .put_if_absent(&key, item(json!({"ttl": ttl})))
            .await
            .unwrap();
        assert!(store.get(&key).await.unwrap().is_some());

        store.advance(601).await;
        assert!(store.get(&key).await.unwrap().is_none());

        // The slot is vacant again after expiry
        store
            .put_if_absent(&key, item(json!({"ttl": ttl + 700})))
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_memory_query_prefix_and_order() {
        let store = MemoryLedgerStore::new();
        store
            .put_if_absent(
                &LedgerKey::new("DOC#provisioning", "JOB#b"),
                item(json!({"job_id": "b"})),
            )
            .await
            .unwrap();
        store
            .put_if_absent(
                &LedgerKey::new("DOC#provisioning", "JOB#a"),
                item(json!({"job_id": "a"})),
            )
            .await
            .unwrap();
        store
            .put_if_absent(
                &LedgerKey::new("DOC#provisioning", "META#x"),
                item(json!({})),
            )
            .await
            .unwrap();

        let jobs = store.query("DOC#provisioning", "JOB#").await.unwrap();
        assert_eq!(jobs.len(), 2);
        assert_eq!(jobs[0].get("job_id"), Some(&json!("a")));
        assert_eq!(jobs[1].get("job_id"), Some(&json!("b")));
    }

    #[tokio::test]
    async fn test_memory_set_state() {
        let store = MemoryLedgerStore::new();
        let key = LedgerKey::new("DOC#provisioning", "JOB#j1");

        store
            .put_if_absent(&key, item(json!({"state": "STAGED"})))
            .await
            .unwrap();
        store
            .set_state(&key, "FAILED", "2026-01-01T00:00:00Z")
            .await
            .unwrap();

        let stored = store.get(&key).await.unwrap().unwrap();
        assert_eq!(stored.get("state"), Some(&json!("FAILED")));
        assert_eq!(stored.get("updated_at"), Some(&json!("2026-01-01T00:00:00Z")));

        let missing = LedgerKey::new("DOC#provisioning", "JOB#other");
        let err = store
            .set_state(&missing, "FAILED", "2026-01-01T00:00:00Z")
            .await
            .unwrap_err();
        assert!(matches!(err, LedgerError::NotFound(_)));
    }

    #[tokio::test]
    async fn test_memory_injected_put_failure_is_scoped_and_one_shot() {
        let store = MemoryLedgerStore::new();
        store.fail_next_put_with_pk_prefix("DOC#").await;

        // Lock writes are unaffected
        store
            .put_if_absent(
                &LedgerKey::new("IDEMPOTENCY#provisioning", "HASH#abc"),
                item(json!({})),
            )
            .await
            .unwrap();

        let err = store
            .put_if_absent(&LedgerKey::new("DOC#provisioning", "JOB#j1"), item(json!({})))
            .await
            .unwrap_err();
        assert!(matches!(err, LedgerError::Other(_)));

        // One-shot: the same write succeeds on retry
        store
            .put_if_absent(&LedgerKey::new("DOC#provisioning", "JOB#j1"), item(json!({})))
            .await
            .unwrap();
    }
}
