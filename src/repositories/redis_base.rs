//! Base Redis repository functionality shared across all Redis implementations.
//!
//! Entities are stored as JSON strings under `{prefix}:{entity}:{id}` keys.

use crate::models::RepositoryError;
use redis::RedisError;
use serde::{Deserialize, Serialize};
use tracing::{error, warn};

/// Base trait for Redis repositories providing common functionality
pub trait RedisRepository {
    fn key_prefix(&self) -> &str;

    /// Builds `{prefix}:{entity}:{id}`.
    fn entity_key(&self, entity: &str, id: &str) -> String {
        format!("{}:{}:{}", self.key_prefix(), entity, id)
    }

    fn serialize_entity<T, F>(
        &self,
        entity: &T,
        id_extractor: F,
        entity_type: &str,
    ) -> Result<String, RepositoryError>
    where
        T: Serialize,
        F: Fn(&T) -> String,
    {
        serde_json::to_string(entity).map_err(|e| {
            let id = id_extractor(entity);
            error!(entity_type = %entity_type, id = %id, error = %e, "serialization failed");
            RepositoryError::InvalidData(format!("Failed to serialize {entity_type} {id}: {e}"))
        })
    }

    /// Deserialize entity with detailed error context
    fn deserialize_entity<T>(
        &self,
        json: &str,
        entity_id: &str,
        entity_type: &str,
    ) -> Result<T, RepositoryError>
    where
        T: for<'de> Deserialize<'de>,
    {
        serde_json::from_str(json).map_err(|e| {
            error!(entity_type = %entity_type, entity_id = %entity_id, error = %e, "deserialization failed");
            RepositoryError::InvalidData(format!(
                "Failed to deserialize {} {}: {} (JSON length: {})",
                entity_type,
                entity_id,
                e,
                json.len()
            ))
        })
    }

    /// Convert Redis errors to appropriate RepositoryError types
    fn map_redis_error(&self, error: RedisError, context: &str) -> RepositoryError {
        warn!(context = %context, error = %error, "redis operation failed");

        if error.is_io_error() || error.is_connection_dropped() || error.is_timeout() {
            return RepositoryError::ConnectionError(format!(
                "Redis connection failed in operation '{context}': {error}"
            ));
        }

        match error.kind() {
            redis::ErrorKind::TypeError => RepositoryError::InvalidData(format!(
                "Redis data type error in operation '{context}': {error}"
            )),
            redis::ErrorKind::AuthenticationFailed => {
                RepositoryError::InvalidData("Redis authentication failed".to_string())
            }
            redis::ErrorKind::NoScriptError => RepositoryError::InvalidData(format!(
                "Redis script error in operation '{context}': {error}"
            )),
            redis::ErrorKind::ReadOnly => RepositoryError::InvalidData(format!(
                "Redis is read-only in operation '{context}': {error}"
            )),
            redis::ErrorKind::ExecAbortError => RepositoryError::TransactionFailure(format!(
                "Redis transaction aborted in operation '{context}': {error}"
            )),
            // Default to Other for busy servers and other issues
            _ => RepositoryError::Other(format!("Redis operation '{context}' failed: {error}")),
        }
    }
}
