use crate::common::{key::DocumentKey, precondition::UpdateTime, value::Fields};
use crate::config::DynamoStoreConfig;
use crate::error::{Error, Result};
use crate::read::snapshot::DocumentSnapshot;

use aws_sdk_dynamodb::types;
use std::collections;

pub(crate) type Item = collections::HashMap<String, types::AttributeValue>;

pub(crate) fn key_attributes(key: &DocumentKey, config: &DynamoStoreConfig) -> Item {
    Item::from([(
        config.key_attribute.clone(),
        types::AttributeValue::S(key.key.clone()),
    )])
}

pub(crate) fn update_time_value(update_time: UpdateTime) -> types::AttributeValue {
    types::AttributeValue::N(update_time.as_nanos().to_string())
}

/// Reject document fields that collide with the attributes the store manages itself.
pub(crate) fn check_field_name(name: &str, config: &DynamoStoreConfig) -> Result<()> {
    if name == config.key_attribute || name == config.update_time_attribute {
        return Err(Error::InvalidArgument(format!(
            "field `{name}` is reserved by the store"
        )));
    }
    Ok(())
}

/// The full item stored for a document.
pub(crate) fn to_item(
    key: &DocumentKey,
    fields: &Fields,
    update_time: UpdateTime,
    config: &DynamoStoreConfig,
) -> Result<Item> {
    for name in fields.keys() {
        check_field_name(name, config)?;
    }
    let mut item: Item = serde_dynamo::to_item(fields)?;
    item.extend(key_attributes(key, config));
    item.insert(
        config.update_time_attribute.clone(),
        update_time_value(update_time),
    );
    Ok(item)
}

/// The update time recorded on an item, `None` when there is no item.
pub(crate) fn update_time_of(
    item: Option<&Item>,
    config: &DynamoStoreConfig,
) -> Result<Option<UpdateTime>> {
    let Some(item) = item else {
        return Ok(None);
    };
    match item.get(&config.update_time_attribute) {
        Some(types::AttributeValue::N(nanos)) => nanos
            .parse()
            .map(|nanos| Some(UpdateTime::from_nanos(nanos)))
            .map_err(|_| {
                Error::Internal(format!(
                    "`{}` holds a malformed update time: {nanos}",
                    config.update_time_attribute
                ))
            }),
        _ => Err(Error::Internal(format!(
            "item has no numeric `{}` attribute",
            config.update_time_attribute
        ))),
    }
}

/// Rebuild a snapshot from a stored item.
pub(crate) fn from_item(
    collection: &str,
    mut item: Item,
    config: &DynamoStoreConfig,
) -> Result<DocumentSnapshot> {
    let update_time = update_time_of(Some(&item), config)?
        .ok_or_else(|| Error::Internal("item without update time".to_string()))?;
    let key = match item.remove(&config.key_attribute) {
        Some(types::AttributeValue::S(key)) => DocumentKey::new(collection, key),
        _ => {
            return Err(Error::Internal(format!(
                "item has no string `{}` attribute",
                config.key_attribute
            )));
        }
    };
    item.remove(&config.update_time_attribute);
    let fields: Fields = serde_dynamo::from_item(item)?;
    Ok(DocumentSnapshot {
        key,
        fields,
        update_time,
    })
}
