use crate::common::{self, expression};
use crate::error::{Error, Result};

use aws_sdk_dynamodb::types;

const VERSION_STEM: &str = "version";
const OLD_VERSION_STEM: &str = "oldVersion";
const NEW_VERSION_STEM: &str = "newVersion";

/// Compare-and-swap on a numeric version attribute.
///
/// The write applies only when the stored version is absent or equals `version`, and it
/// stores `version + 1`. A failed comparison surfaces as
/// [`Error::ConditionalCheckFailed`](crate::Error::ConditionalCheckFailed): re-read the item
/// and retry with the version just read.
///
/// ```rust
/// use dynamodb_kit::common::lock;
///
/// let lock = lock::OptimisticLock::new("version", 3);
/// assert_eq!(lock.next_version().unwrap(), 4);
/// assert_eq!(
///     lock.condition().expression,
///     "attribute_not_exists(#version) OR #version = :oldVersion"
/// );
/// ```
#[derive(Clone, Debug, Eq, Hash, PartialEq)]
pub struct OptimisticLock {
    /// The version attribute name.
    pub field: String,
    /// The version the caller last read; `0` for a record without a version yet.
    pub version: u64,
}

impl OptimisticLock {
    /// Create a lock expecting `version` on attribute `field`.
    pub fn new(field: impl Into<String>, version: u64) -> Self {
        Self {
            field: field.into(),
            version,
        }
    }

    /// The version written on success.
    pub fn next_version(&self) -> Result<u64> {
        self.version.checked_add(1).ok_or(Error::VersionOverflow)
    }

    /// The precondition: version absent, or equal to the expected one.
    pub fn condition(&self) -> common::Expression {
        let name = format!("#{VERSION_STEM}");
        let old = format!(":{OLD_VERSION_STEM}");
        common::Expression::new(condition_text(&name, &old))
            .name(&name, &self.field)
            .value(&old, version_value(self.version))
    }

    /// Bind the version placeholders and add the precondition, returning the name placeholder.
    fn bind_condition(&self, builder: &mut expression::ExpressionBuilder) -> String {
        let name = builder.allocate_name(VERSION_STEM, &self.field);
        let old = builder.allocate_value(OLD_VERSION_STEM, version_value(self.version));
        builder.push_condition(condition_text(&name, &old));
        name
    }

    /// Add the precondition and the `SET #version = :newVersion` action to an update.
    ///
    /// Placeholders already taken by other attributes get a numeric suffix.
    pub fn apply_to_update(&self, builder: &mut expression::ExpressionBuilder) -> Result<()> {
        let next = self.next_version()?;
        let name = self.bind_condition(builder);
        let new = builder.allocate_value(NEW_VERSION_STEM, version_value(next));
        builder.push_action(expression::ClauseKind::Set, format!("{name} = {new}"));
        Ok(())
    }

    /// Stamp the next version into a whole item and add the precondition.
    pub fn apply_to_put(
        &self,
        item: &mut common::Item,
        builder: &mut expression::ExpressionBuilder,
    ) -> Result<()> {
        let next = self.next_version()?;
        self.bind_condition(builder);
        item.insert(self.field.clone(), version_value(next));
        Ok(())
    }

    /// Add the precondition alone, for deletes.
    pub fn apply_to_delete(&self, builder: &mut expression::ExpressionBuilder) -> Result<()> {
        self.bind_condition(builder);
        Ok(())
    }
}

fn condition_text(name: &str, old: &str) -> String {
    format!("attribute_not_exists({name}) OR {name} = {old}")
}

fn version_value(version: u64) -> types::AttributeValue {
    types::AttributeValue::N(version.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::key;

    use indexmap::IndexMap;
    use rstest::rstest;
    use std::collections;

    #[test]
    fn test_apply_to_update_merges_set() {
        let mut builder = expression::ExpressionBuilder::new();
        builder
            .set_fields(
                IndexMap::from([
                    ("balance".to_string(), common::number_value(100)),
                    ("name".to_string(), common::string_value("A")),
                ]),
                &key::KeySchema::new("pk", "sk"),
            )
            .unwrap();
        OptimisticLock::new("version", 0)
            .apply_to_update(&mut builder)
            .unwrap();
        let rendered = builder.build();
        let update = rendered.update_expression.unwrap();
        assert_eq!(
            update,
            "SET #balance = :balance, #name = :name, #version = :newVersion"
        );
        assert_eq!(update.matches("SET").count(), 1);
        assert_eq!(
            rendered.condition_expression.as_deref(),
            Some("attribute_not_exists(#version) OR #version = :oldVersion")
        );
        let values = rendered.expression_attribute_values.unwrap();
        assert_eq!(values[":oldVersion"], common::number_value(0));
        assert_eq!(values[":newVersion"], common::number_value(1));
        assert_eq!(
            rendered.expression_attribute_names.unwrap()["#version"],
            "version"
        );
    }

    #[test]
    fn test_apply_to_update_with_custom_add() {
        let mut builder = expression::ExpressionBuilder::new();
        builder
            .update_expression(
                &common::Expression::new("ADD #balance :val")
                    .name("#balance", "balance")
                    .value(":val", common::number_value(100)),
            )
            .unwrap();
        OptimisticLock::new("version", 7)
            .apply_to_update(&mut builder)
            .unwrap();
        assert_eq!(
            builder.build().update_expression.as_deref(),
            Some("SET #version = :newVersion ADD #balance :val")
        );
    }

    #[test]
    fn test_apply_to_put() {
        let mut item = common::Item::from([("version".to_string(), common::number_value(2))]);
        let mut builder = expression::ExpressionBuilder::new();
        OptimisticLock::new("revision", 2)
            .apply_to_put(&mut item, &mut builder)
            .unwrap();
        assert_eq!(item["revision"], common::number_value(3));
        let rendered = builder.build();
        assert_eq!(rendered.update_expression, None);
        assert_eq!(
            rendered.expression_attribute_names,
            Some(collections::HashMap::from([(
                "#version".to_string(),
                "revision".to_string()
            )]))
        );
    }

    #[test]
    fn test_caller_condition_is_kept() {
        let mut builder = expression::ExpressionBuilder::new();
        builder
            .condition(
                &common::Expression::new("#status = :status")
                    .name("#status", "status")
                    .value(":status", common::string_value("active")),
            )
            .unwrap();
        OptimisticLock::new("version", 1)
            .apply_to_delete(&mut builder)
            .unwrap();
        assert_eq!(
            builder.build().condition_expression.as_deref(),
            Some("(#status = :status) AND (attribute_not_exists(#version) OR #version = :oldVersion)")
        );
    }

    #[rstest]
    #[case::version_field(
        "revision",
        ("version", common::number_value(7)),
        "SET #version = :version, #version_1 = :newVersion",
        "attribute_not_exists(#version_1) OR #version_1 = :oldVersion"
    )]
    #[case::new_version_field(
        "version",
        ("newVersion", common::number_value(7)),
        "SET #newVersion = :newVersion, #version = :newVersion_1",
        "attribute_not_exists(#version) OR #version = :oldVersion"
    )]
    #[case::old_version_field(
        "version",
        ("oldVersion", common::string_value("x")),
        "SET #oldVersion = :oldVersion, #version = :newVersion",
        "attribute_not_exists(#version) OR #version = :oldVersion_1"
    )]
    fn test_apply_to_update_avoids_field_placeholders(
        #[case] field: &str,
        #[case] record_field: (&str, types::AttributeValue),
        #[case] update: &str,
        #[case] condition: &str,
    ) {
        let mut builder = expression::ExpressionBuilder::new();
        builder
            .set_fields(
                IndexMap::from([(record_field.0.to_string(), record_field.1)]),
                &key::KeySchema::new("pk", "sk"),
            )
            .unwrap();
        OptimisticLock::new(field, 2)
            .apply_to_update(&mut builder)
            .unwrap();
        let rendered = builder.build();
        assert_eq!(rendered.update_expression.as_deref(), Some(update));
        assert_eq!(rendered.condition_expression.as_deref(), Some(condition));
        let names = rendered.expression_attribute_names.unwrap();
        assert_eq!(names.values().filter(|name| *name == field).count(), 1);
        let values = rendered.expression_attribute_values.unwrap();
        assert_eq!(
            values.values().filter(|value| **value == common::number_value(3)).count(),
            1
        );
    }

    #[test]
    fn test_overflow() {
        let lock = OptimisticLock::new("version", u64::MAX);
        assert!(matches!(lock.next_version(), Err(Error::VersionOverflow)));
        let mut builder = expression::ExpressionBuilder::new();
        assert!(matches!(
            lock.apply_to_update(&mut builder),
            Err(Error::VersionOverflow)
        ));
    }
}
