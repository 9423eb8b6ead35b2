//! # Device Command Channel
//!
//! Outbound request/reply to playout gateways over a persisted command
//! record. The record is observed until the gateway sets `has_reply` or a
//! fixed timeout elapses; either way the record is deleted afterwards.

use serde_json::Value;
use std::time::Duration;

use crate::error::{Result, RundownError};
use crate::models::{DeviceCommand, DeviceId};
use crate::store::{DocChangeKind, DocumentStore};

/// Send a function call to a device gateway and wait for its reply.
///
/// Inserts a `DeviceCommand` record, watches the collection's change feed
/// for the reply, and removes the record before returning. On timeout the
/// pending record is discarded and the caller receives a timeout error.
pub async fn execute_device_function(
    store: &DocumentStore,
    device_id: &DeviceId,
    function_name: &str,
    args: Vec<Value>,
    timeout_ms: u64,
) -> Result<Value> {
    let command = DeviceCommand::new(device_id.clone(), function_name, args);
    let command_id = command.id.clone();

    // Subscribe before inserting so the reply cannot race past us
    let mut changes = store.device_commands.subscribe();
    store.device_commands.insert(command).await?;

    let wait = async {
        loop {
            match changes.recv().await {
                Ok(change) => {
                    if change.id != command_id || change.kind == DocChangeKind::Removed {
                        continue;
                    }
                    if let Some(doc) = change.doc {
                        if doc.has_reply {
                            return Ok::<DeviceCommand, RundownError>(doc);
                        }
                    }
                }
                Err(_) => {
                    // Lagged or closed; re-read the record directly
                    if let Some(doc) = store.device_commands.find_one(&command_id).await? {
                        if doc.has_reply {
                            return Ok(doc);
                        }
                    }
                }
            }
        }
    };

    let outcome = tokio::time::timeout(Duration::from_millis(timeout_ms), wait).await;
    store.device_commands.remove(&command_id).await?;

    match outcome {
        Ok(Ok(command)) => {
            if let Some(error) = command.reply_error {
                Err(RundownError::Store(format!(
                    "device {device_id} rejected {function_name}: {error}"
                )))
            } else {
                Ok(command.reply.unwrap_or(Value::Null))
            }
        }
        Ok(Err(e)) => Err(e),
        Err(_) => {
            tracing::warn!(
                device_id = %device_id,
                function_name = %function_name,
                timeout_ms = timeout_ms,
                "❌ device command timed out"
            );
            Err(RundownError::DeviceTimeout(format!(
                "{function_name} on {device_id} after {timeout_ms}ms"
            )))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn test_reply_is_returned_and_record_deleted() {
        let store = DocumentStore::new();
        let device_id = DeviceId::new("gw0");

        // Behave like a gateway: watch for the command, answer it. The
        // subscription is taken before the command is sent.
        let mut changes = store.device_commands.subscribe();
        let answering_store = store.clone();
        tokio::spawn(async move {
            while let Ok(change) = changes.recv().await {
                if change.kind == DocChangeKind::Inserted {
                    answering_store
                        .device_commands
                        .update(&change.id, |cmd| {
                            cmd.has_reply = true;
                            cmd.reply = Some(json!({"ok": true}));
                        })
                        .await
                        .unwrap();
                    break;
                }
            }
        });

        let reply = execute_device_function(&store, &device_id, "restart", vec![], 2000)
            .await
            .unwrap();
        assert_eq!(reply, json!({"ok": true}));
        assert_eq!(store.device_commands.count().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_timeout_discards_record() {
        let store = DocumentStore::new();
        let device_id = DeviceId::new("gw0");

        let err = execute_device_function(&store, &device_id, "restart", vec![], 50)
            .await
            .unwrap_err();
        assert!(matches!(err, RundownError::DeviceTimeout(_)));
        assert_eq!(store.device_commands.count().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_reply_error_surfaces() {
        let store = DocumentStore::new();
        let device_id = DeviceId::new("gw0");

        let mut changes = store.device_commands.subscribe();
        let answering_store = store.clone();
        tokio::spawn(async move {
            while let Ok(change) = changes.recv().await {
                if change.kind == DocChangeKind::Inserted {
                    answering_store
                        .device_commands
                        .update(&change.id, |cmd| {
                            cmd.has_reply = true;
                            cmd.reply_error = Some("unsupported".into());
                        })
                        .await
                        .unwrap();
                    break;
                }
            }
        });

        let err = execute_device_function(&store, &device_id, "bogus", vec![], 2000)
            .await
            .unwrap_err();
        assert!(err.to_string().contains("unsupported"));
    }
}
