use crate::common::{self, expression, lock};
use crate::error::Result;

/// Options common to put, update and delete.
///
/// ```rust
/// use dynamodb_kit::{common, write};
///
/// let options = write::common::WriteOptions::default()
///     .condition(
///         common::Expression::new("#status = :status")
///             .name("#status", "status")
///             .value(":status", common::string_value("active")),
///     )
///     .lock(common::lock::OptimisticLock::new("version", 2));
/// ```
#[derive(Clone, Debug, Default, PartialEq)]
pub struct WriteOptions {
    /// Condition that must hold for the write to apply.
    ///
    /// Combined with the lock condition, if any, by `AND`.
    pub condition: Option<common::Expression>,
    /// Optimistic lock on a version attribute.
    pub lock: Option<lock::OptimisticLock>,
}

impl WriteOptions {
    /// Set the condition expression.
    pub fn condition(mut self, condition: common::Expression) -> Self {
        self.condition = Some(condition);
        self
    }

    /// Set the optimistic lock.
    pub fn lock(mut self, lock: lock::OptimisticLock) -> Self {
        self.lock = Some(lock);
        self
    }

    fn apply_condition(&self, builder: &mut expression::ExpressionBuilder) -> Result<()> {
        match &self.condition {
            Some(condition) => builder.condition(condition),
            None => Ok(()),
        }
    }

    pub(crate) fn apply_to_put(
        &self,
        item: &mut common::Item,
        builder: &mut expression::ExpressionBuilder,
    ) -> Result<()> {
        self.apply_condition(builder)?;
        match &self.lock {
            Some(lock) => lock.apply_to_put(item, builder),
            None => Ok(()),
        }
    }

    pub(crate) fn apply_to_update(&self, builder: &mut expression::ExpressionBuilder) -> Result<()> {
        self.apply_condition(builder)?;
        match &self.lock {
            Some(lock) => lock.apply_to_update(builder),
            None => Ok(()),
        }
    }

    pub(crate) fn apply_to_delete(&self, builder: &mut expression::ExpressionBuilder) -> Result<()> {
        self.apply_condition(builder)?;
        match &self.lock {
            Some(lock) => lock.apply_to_delete(builder),
            None => Ok(()),
        }
    }
}

/// apply a rendered condition and its placeholders to a request builder
#[macro_export]
macro_rules! apply_write_expression {
    ($builder:expr, $rendered:expr) => {
        $builder
            .set_condition_expression($rendered.condition_expression)
            .set_expression_attribute_names($rendered.expression_attribute_names)
            .set_expression_attribute_values($rendered.expression_attribute_values)
    };
}
