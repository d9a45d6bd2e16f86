use crate::{domain::DocumentStore, errors::RepoError};
use anyhow::Context;
use async_trait::async_trait;
use aws_sdk_dynamodb::{
    error::SdkError,
    types::{AttributeValue, ReturnValue},
    Client as DynamoDbClient,
};
use serde_json::{Map, Number, Value};
use std::collections::HashMap;
use tracing::{self, info};

/// Name of the hash key attribute of every table.
pub const KEY_ATTRIBUTE: &str = "id";

#[derive(Debug, Clone)]
pub struct DynamoDbDocumentStore {
    client: DynamoDbClient,
    table_prefix: String,
}

impl DynamoDbDocumentStore {
    /// Creates a store whose tables are named `{table_prefix}{collection}`.
    pub fn new(client: DynamoDbClient, table_prefix: String) -> Self {
        info!(%table_prefix, "Initializing DynamoDbDocumentStore");
        Self { client, table_prefix }
    }

    pub fn table_name(&self, collection: &str) -> String {
        format!("{}{}", self.table_prefix, collection)
    }
}

#[async_trait]
impl DocumentStore for DynamoDbDocumentStore {
    async fn get(&self, collection: &str, id: &str) -> Result<Option<serde_json::Value>, RepoError> {
        let table_name = self.table_name(collection);
        let resp = self
            .client
            .get_item()
            .table_name(&table_name)
            .key(KEY_ATTRIBUTE, AttributeValue::S(id.to_string()))
            .consistent_read(true)
            .send()
            .await
            .context(format!("DynamoDB (table: {}): Failed to get item (id: {})", table_name, id))
            .map_err(RepoError::BackendError)?;

        match resp.item {
            Some(item) => item_to_document(collection, item).map(Some),
            None => Ok(None), // Item not found is not an error
        }
    }

    async fn put(&self, collection: &str, id: &str, doc: serde_json::Value) -> Result<(), RepoError> {
        let table_name = self.table_name(collection);
        self.client
            .put_item()
            .table_name(&table_name)
            .set_item(Some(document_to_item(collection, id, doc)?))
            .send()
            .await
            .context(format!("DynamoDB (table: {}): Failed to put item (id: {})", table_name, id))
            .map_err(RepoError::BackendError)?;
        Ok(())
    }

    async fn insert(&self, collection: &str, id: &str, doc: serde_json::Value) -> Result<(), RepoError> {
        let table_name = self.table_name(collection);
        let result = self
            .client
            .put_item()
            .table_name(&table_name)
            .set_item(Some(document_to_item(collection, id, doc)?))
            .condition_expression("attribute_not_exists(#id)")
            .expression_attribute_names("#id", KEY_ATTRIBUTE)
            .send()
            .await;

        match result {
            Ok(_) => Ok(()),
            Err(SdkError::ServiceError(service_err)) if service_err.err().is_conditional_check_failed_exception() => {
                tracing::debug!(table_name = %table_name, id = %id, "DynamoDB: Conditional insert rejected, item exists");
                Err(RepoError::Conflict {
                    collection: collection.to_string(),
                    id: id.to_string(),
                })
            }
            Err(e) => Err(RepoError::BackendError(anyhow::Error::new(e).context(format!(
                "DynamoDB (table: {}): Failed to insert item (id: {})",
                table_name, id
            )))),
        }
    }

    async fn delete(&self, collection: &str, id: &str) -> Result<bool, RepoError> {
        let table_name = self.table_name(collection);
        tracing::debug!(id = %id, table_name = %table_name, "DynamoDB: Deleting item");

        let resp = self
            .client
            .delete_item()
            .table_name(&table_name)
            .key(KEY_ATTRIBUTE, AttributeValue::S(id.to_string()))
            .return_values(ReturnValue::AllOld)
            .send()
            .await
            .context(format!("DynamoDB (table: {}): Failed to delete item (id: {})", table_name, id))
            .map_err(RepoError::BackendError)?;

        Ok(resp.attributes.is_some())
    }

    /// Lists all items using DynamoDB Scan. Handles pagination.
    async fn scan(&self, collection: &str) -> Result<Vec<serde_json::Value>, RepoError> {
        let table_name = self.table_name(collection);
        tracing::debug!("DynamoDB: Scanning table '{}'", table_name);
        let mut docs = Vec::new();
        let mut last_evaluated_key: Option<HashMap<String, AttributeValue>> = None;

        loop {
            let mut request_builder = self.client.scan().table_name(&table_name);

            // Apply ExclusiveStartKey if paginating from previous response
            if let Some(lek) = last_evaluated_key {
                request_builder = request_builder.set_exclusive_start_key(Some(lek));
            }

            let resp = request_builder
                .send()
                .await
                .context(format!("DynamoDB: Failed to scan table '{}'", table_name))
                .map_err(RepoError::BackendError)?;

            if let Some(items) = resp.items {
                tracing::debug!("DynamoDB Scan (table: {}): Returned {} items", table_name, items.len());
                for item in items {
                    docs.push(item_to_document(collection, item)?);
                }
            }

            last_evaluated_key = resp.last_evaluated_key;
            if last_evaluated_key.is_none() {
                break;
            }
        }

        tracing::debug!("DynamoDB (table: {}): Scanned {} items", table_name, docs.len());
        Ok(docs)
    }
}

// The document is stored as a flat item; the key attribute is added next to its fields.
fn document_to_item(
    collection: &str,
    id: &str,
    doc: Value,
) -> Result<HashMap<String, AttributeValue>, RepoError> {
    let Value::Object(fields) = doc else {
        return Err(RepoError::DataCorruption {
            collection: collection.to_string(),
            reason: "documents must be JSON objects".to_string(),
        });
    };
    let mut item: HashMap<String, AttributeValue> = fields
        .into_iter()
        .map(|(name, value)| (name, json_to_attribute(value)))
        .collect();
    item.insert(KEY_ATTRIBUTE.to_string(), AttributeValue::S(id.to_string()));
    Ok(item)
}

fn item_to_document(
    collection: &str,
    mut item: HashMap<String, AttributeValue>,
) -> Result<Value, RepoError> {
    item.remove(KEY_ATTRIBUTE);
    let mut fields = Map::with_capacity(item.len());
    for (name, attribute) in item {
        let value = attribute_to_json(attribute).map_err(|reason| {
            tracing::error!(collection = %collection, attribute = %name, "DynamoDB: Failed to parse item attribute");
            RepoError::DataCorruption {
                collection: collection.to_string(),
                reason: format!("attribute '{}': {}", name, reason),
            }
        })?;
        fields.insert(name, value);
    }
    Ok(Value::Object(fields))
}

pub fn json_to_attribute(value: Value) -> AttributeValue {
    match value {
        Value::Null => AttributeValue::Null(true),
        Value::Bool(b) => AttributeValue::Bool(b),
        Value::Number(n) => AttributeValue::N(n.to_string()),
        Value::String(s) => AttributeValue::S(s),
        Value::Array(values) => AttributeValue::L(values.into_iter().map(json_to_attribute).collect()),
        Value::Object(fields) => AttributeValue::M(
            fields
                .into_iter()
                .map(|(name, value)| (name, json_to_attribute(value)))
                .collect(),
        ),
    }
}

pub fn attribute_to_json(attribute: AttributeValue) -> Result<Value, String> {
    Ok(match attribute {
        AttributeValue::Null(_) => Value::Null,
        AttributeValue::Bool(b) => Value::Bool(b),
        AttributeValue::N(n) => Value::Number(parse_number(&n)?),
        AttributeValue::S(s) => Value::String(s),
        AttributeValue::L(values) => Value::Array(
            values
                .into_iter()
                .map(attribute_to_json)
                .collect::<Result<_, _>>()?,
        ),
        AttributeValue::M(fields) => {
            let mut map = Map::with_capacity(fields.len());
            for (name, value) in fields {
                map.insert(name, attribute_to_json(value)?);
            }
            Value::Object(map)
        }
        AttributeValue::Ss(values) => Value::Array(values.into_iter().map(Value::String).collect()),
        AttributeValue::Ns(values) => Value::Array(
            values
                .iter()
                .map(|n| parse_number(n).map(Value::Number))
                .collect::<Result<_, _>>()?,
        ),
        other => return Err(format!("unsupported attribute type {:?}", other)),
    })
}

fn parse_number(raw: &str) -> Result<Number, String> {
    raw.parse::<Number>()
        .map_err(|e| format!("invalid number '{}': {}", raw, e))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn nested_documents_survive_item_conversion() {
        let doc = json!({
            "title": "distracted boyfriend",
            "tags": ["classic", "stock"],
            "price_cents": 250,
            "is_public": true,
            "template_id": null,
            "settings": { "commission_bps": 1000 }
        });
        let item = document_to_item("memes", "m1", doc.clone()).unwrap();
        assert_eq!(item.get(KEY_ATTRIBUTE), Some(&AttributeValue::S("m1".into())));

        let back = item_to_document("memes", item).unwrap();
        assert_eq!(back, doc);
    }

    #[test]
    fn non_object_documents_are_rejected() {
        let err = document_to_item("memes", "m1", json!([1, 2])).unwrap_err();
        assert!(matches!(err, RepoError::DataCorruption { .. }));
    }

    #[test]
    fn string_sets_read_back_as_arrays() {
        let value = attribute_to_json(AttributeValue::Ss(vec!["a".into(), "b".into()])).unwrap();
        assert_eq!(value, json!(["a", "b"]));
    }

    #[test]
    fn malformed_numbers_are_reported() {
        assert!(attribute_to_json(AttributeValue::N("twelve".into())).is_err());
    }
}
