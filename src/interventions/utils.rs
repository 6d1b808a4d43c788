use crate::error::TyphoidError;
use crate::schema::{Schema, SchemaObject};
use serde_json::{Map, Value};
use std::sync::Arc;

/// Builds the node set for an event: every node when `node_ids` is `None`, otherwise exactly the
/// listed nodes.
///
/// # Errors
/// Returns an error if the schema lacks the node set classes.
pub fn do_nodes(
    schema: &Arc<Schema>,
    node_ids: Option<&[u32]>,
) -> Result<SchemaObject, TyphoidError> {
    match node_ids {
        None => Ok(schema.class_with_defaults("NodeSetAll")?),
        Some(ids) => {
            let mut node_set = schema.class_with_defaults("NodeSetNodeList")?;
            node_set.set("Node_List", ids.to_vec())?;
            Ok(node_set)
        }
    }
}

fn split_restriction(restriction: &str) -> Result<(&str, &str), TyphoidError> {
    match restriction.split_once(':') {
        Some((key, value)) if !key.trim().is_empty() && !value.trim().is_empty() => {
            Ok((key.trim(), value.trim()))
        }
        _ => Err(TyphoidError::TyphoidError(format!(
            "property restriction {restriction:?} is not of the form Key:Value"
        ))),
    }
}

/// Checks that each restriction has the `Key:Value` form and normalizes surrounding whitespace.
///
/// # Errors
/// Returns an error naming the first malformed restriction.
pub fn property_restrictions(restrictions: &[String]) -> Result<Vec<String>, TyphoidError> {
    restrictions
        .iter()
        .map(|r| split_restriction(r).map(|(key, value)| format!("{key}:{value}")))
        .collect()
}

/// Converts `Key:Value` restrictions into the list-of-maps form used by
/// `Property_Restrictions_Within_Node`. Each restriction becomes its own map, so individuals
/// matching any of them qualify.
///
/// # Errors
/// Returns an error naming the first malformed restriction.
pub fn property_restrictions_within_node(
    restrictions: &[String],
) -> Result<Vec<Value>, TyphoidError> {
    restrictions
        .iter()
        .map(|r| {
            let (key, value) = split_restriction(r)?;
            let mut entry = Map::new();
            entry.insert(key.to_string(), Value::String(value.to_string()));
            Ok(Value::Object(entry))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::test_support::test_schema;
    use serde_json::json;

    #[test]
    fn no_node_ids_means_all_nodes() {
        let node_set = do_nodes(&test_schema(), None).unwrap();
        assert_eq!(node_set.to_json(), json!({"class": "NodeSetAll"}));
    }

    #[test]
    fn node_ids_become_a_node_list() {
        let node_set = do_nodes(&test_schema(), Some(&[1, 4])).unwrap();
        assert_eq!(
            node_set.to_json(),
            json!({"class": "NodeSetNodeList", "Node_List": [1, 4]})
        );
    }

    #[test]
    fn restrictions_are_parsed() {
        let parsed = property_restrictions_within_node(&[
            "Risk:High".to_string(),
            " Place : Urban ".to_string(),
        ])
        .unwrap();
        assert_eq!(parsed, vec![json!({"Risk": "High"}), json!({"Place": "Urban"})]);
        assert_eq!(
            property_restrictions(&[" Place : Urban ".to_string()]).unwrap(),
            vec!["Place:Urban".to_string()]
        );
    }

    #[test]
    fn malformed_restrictions_are_rejected() {
        assert!(property_restrictions_within_node(&["RiskHigh".to_string()]).is_err());
        assert!(property_restrictions(&[":High".to_string()]).is_err());
    }
}
