use crate::common::{expression, selection};
use crate::error::Result;

use std::collections;

#[derive(Clone, Debug, Default, PartialEq)]
pub(crate) struct ReadInput {
    pub(crate) consistent_read: Option<bool>,
    pub(crate) expression_attribute_names: Option<collections::HashMap<String, String>>,
    pub(crate) projection_expression: Option<String>,
}

/// Options for reads by primary key (GetItem, BatchGetItem).
///
/// ```rust
/// use dynamodb_kit::{common, read};
///
/// let options = read::common::ReadOptions {
///     consistent_read: true,
///     selection: Some(common::selection::Selection::new(["name", "email"])),
/// };
/// ```
#[derive(Clone, Debug, Default, Eq, Hash, PartialEq)]
pub struct ReadOptions {
    /// Whether to use a strongly consistent read.
    ///
    /// Strongly consistent reads consume twice the capacity of eventually consistent ones.
    pub consistent_read: bool,
    /// Which attributes to retrieve; every attribute when `None`.
    pub selection: Option<selection::Selection>,
}

impl TryFrom<&ReadOptions> for ReadInput {
    type Error = crate::Error;

    fn try_from(read_options: &ReadOptions) -> Result<Self> {
        let mut bindings = expression::Bindings::default();
        let projection_expression = match &read_options.selection {
            Some(selection) => selection.render(&mut bindings),
            None => None,
        };
        let (expression_attribute_names, _) = bindings.into_parts();
        Ok(Self {
            consistent_read: read_options.consistent_read.then_some(true),
            expression_attribute_names,
            projection_expression,
        })
    }
}

/// apply consistency and projection settings to a builder
#[macro_export]
macro_rules! apply_read_options {
    ($builder:expr, $read_input:expr) => {
        $builder
            .set_consistent_read($read_input.consistent_read)
            .set_expression_attribute_names($read_input.expression_attribute_names)
            .set_projection_expression($read_input.projection_expression)
    };
}

#[cfg(test)]
mod tests {
    use super::*;

    use rstest::rstest;

    #[rstest]
    #[case::empty(
        ReadOptions::default(),
        ReadInput::default()
    )]
    #[case::full(
        ReadOptions {
            consistent_read: true,
            selection: Some(
                selection::Selection::new(
                    ["a", "b"]
                )
            ),
        },
        ReadInput {
            consistent_read: Some(true),
            expression_attribute_names: Some(
                collections::HashMap::from(
                    [
                        ("#a".to_string(), "a".to_string()),
                        ("#b".to_string(), "b".to_string()),
                    ]
                )
            ),
            projection_expression: Some(
                "#a, #b".to_string()
            ),
        }
    )]
    fn test_read_input(#[case] args: ReadOptions, #[case] expected: ReadInput) {
        let actual: ReadInput = (&args).try_into().unwrap();
        assert_eq!(actual, expected);
    }
}
