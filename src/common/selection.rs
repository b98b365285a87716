use crate::common::expression;

/// Attributes to return from a read, rendered as a projection expression.
///
/// ```rust
/// use dynamodb_kit::common::selection;
///
/// let selection = selection::Selection::new(["id", "name"]);
/// assert_eq!(selection.fields.len(), 2);
/// ```
#[derive(Clone, Debug, Default, Eq, Hash, PartialEq)]
pub struct Selection {
    /// The attribute names to return, in order.
    pub fields: Vec<String>,
}

impl Selection {
    /// Select the given attributes.
    pub fn new<I, S>(fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            fields: fields.into_iter().map(Into::into).collect(),
        }
    }

    /// Render to `#a, #b`, binding the name placeholders.
    ///
    /// Returns `None` for an empty selection, which reads every attribute.
    pub(crate) fn render(&self, bindings: &mut expression::Bindings) -> Option<String> {
        if self.fields.is_empty() {
            return None;
        }
        let placeholders: Vec<String> = self
            .fields
            .iter()
            .map(|field| bindings.allocate_name(field, field))
            .collect();
        Some(placeholders.join(", "))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use rstest::rstest;
    use std::collections;

    #[rstest]
    #[case::empty(
        Selection::default(),
        None,
        collections::HashMap::new()
    )]
    #[case::single(
        Selection::new(
            ["a"]
        ),
        Some("#a"),
        collections::HashMap::from(
            [
                ("#a".to_string(), "a".to_string()),
            ]
        )
    )]
    #[case::multiple(
        Selection::new(
            ["a", "b-c"]
        ),
        Some("#a, #b_c"),
        collections::HashMap::from(
            [
                ("#a".to_string(), "a".to_string()),
                ("#b_c".to_string(), "b-c".to_string()),
            ]
        )
    )]
    fn test_render(
        #[case] selection: Selection,
        #[case] expected: Option<&str>,
        #[case] names: collections::HashMap<String, String>,
    ) {
        let mut bindings = expression::Bindings::default();
        let actual = selection.render(&mut bindings);
        assert_eq!(actual.as_deref(), expected);
        assert_eq!(bindings.names(), &names);
    }

    #[test]
    fn test_render_names_sharing_a_token() {
        let mut bindings = expression::Bindings::default();
        bindings.bind_name("#b", "other").unwrap();
        let selection = Selection::new(["a-b", "a_b", "b"]);
        assert_eq!(
            selection.render(&mut bindings).as_deref(),
            Some("#a_b, #a_b_1, #b_1")
        );
        assert_eq!(bindings.names()["#a_b_1"], "a_b");
        assert_eq!(bindings.names()["#b_1"], "b");
    }
}
