use crate::common::{self, key};
use crate::error::{Error, Result};

use aws_sdk_dynamodb::types;
use indexmap::IndexMap;
use serde::Serialize;
use serde_dynamo::to_item;
use std::collections;

/// Kind of an update expression clause, in rendering order.
#[derive(Clone, Copy, Debug, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub enum ClauseKind {
    /// `SET` assignments.
    Set,
    /// `REMOVE` attribute paths.
    Remove,
    /// `ADD` numeric increments and set unions.
    Add,
    /// `DELETE` set subtractions.
    Delete,
}

impl ClauseKind {
    /// The keyword opening the clause.
    pub fn keyword(self) -> &'static str {
        match self {
            Self::Set => "SET",
            Self::Remove => "REMOVE",
            Self::Add => "ADD",
            Self::Delete => "DELETE",
        }
    }

    fn from_keyword(word: &str) -> Option<Self> {
        match word.to_ascii_uppercase().as_str() {
            "SET" => Some(Self::Set),
            "REMOVE" => Some(Self::Remove),
            "ADD" => Some(Self::Add),
            "DELETE" => Some(Self::Delete),
            _ => None,
        }
    }
}

/// Placeholder bindings shared by every expression of one request.
///
/// A placeholder may be bound more than once only to the same name or value.
///
/// ```rust
/// use dynamodb_kit::common::{self, expression};
///
/// let mut bindings = expression::Bindings::default();
/// bindings.bind_name("#a", "a").unwrap();
/// bindings.bind_name("#a", "a").unwrap();
/// assert!(bindings.bind_name("#a", "b").is_err());
/// assert!(bindings.bind_value(":a", common::number_value(1)).is_ok());
/// ```
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Bindings {
    names: collections::HashMap<String, String>,
    values: common::Item,
}

impl Bindings {
    /// Bind an attribute name placeholder.
    pub fn bind_name(&mut self, placeholder: &str, name: &str) -> Result<()> {
        match self.names.get(placeholder) {
            Some(existing) if existing != name => Err(Error::PlaceholderCollision {
                placeholder: placeholder.to_string(),
                existing: format!("`{existing}`"),
                incoming: format!("`{name}`"),
            }),
            Some(_) => Ok(()),
            None => {
                self.names.insert(placeholder.to_string(), name.to_string());
                Ok(())
            }
        }
    }

    /// Bind an attribute value placeholder.
    pub fn bind_value(&mut self, placeholder: &str, value: types::AttributeValue) -> Result<()> {
        match self.values.get(placeholder) {
            Some(existing) if *existing != value => Err(Error::PlaceholderCollision {
                placeholder: placeholder.to_string(),
                existing: format!("{existing:?}"),
                incoming: format!("{value:?}"),
            }),
            Some(_) => Ok(()),
            None => {
                self.values.insert(placeholder.to_string(), value);
                Ok(())
            }
        }
    }

    /// Bind `name` under a placeholder derived from `stem`, e.g. `#user_name` for
    /// `user-name`, and return the placeholder.
    ///
    /// When the derived placeholder already stands for another name, a numeric suffix is
    /// added (`#user_name_1`), so distinct names never share a placeholder.
    pub fn allocate_name(&mut self, stem: &str, name: &str) -> String {
        allocate(&mut self.names, '#', stem, name.to_string())
    }

    /// Bind `value` under a placeholder derived from `stem` and return the placeholder.
    ///
    /// A placeholder already bound to an equal value is reused.
    pub fn allocate_value(&mut self, stem: &str, value: types::AttributeValue) -> String {
        allocate(&mut self.values, ':', stem, value)
    }

    /// Bind every placeholder of a raw expression.
    pub fn extend(&mut self, expression: &common::Expression) -> Result<()> {
        for (placeholder, name) in &expression.names {
            self.bind_name(placeholder, name)?;
        }
        for (placeholder, value) in &expression.values {
            self.bind_value(placeholder, value.clone())?;
        }
        Ok(())
    }

    /// The name placeholders bound so far.
    pub fn names(&self) -> &collections::HashMap<String, String> {
        &self.names
    }

    /// The value placeholders bound so far.
    pub fn values(&self) -> &common::Item {
        &self.values
    }

    /// Split into the two wire maps, `None` when empty.
    pub(crate) fn into_parts(
        self,
    ) -> (
        Option<collections::HashMap<String, String>>,
        Option<common::Item>,
    ) {
        let names = (!self.names.is_empty()).then_some(self.names);
        let values = (!self.values.is_empty()).then_some(self.values);
        (names, values)
    }
}

fn allocate<V: PartialEq>(
    bindings: &mut collections::HashMap<String, V>,
    prefix: char,
    stem: &str,
    bound: V,
) -> String {
    let base = format!("{prefix}{}", common::placeholder_token(stem));
    let mut placeholder = base.clone();
    let mut suffix = 0;
    loop {
        match bindings.get(&placeholder) {
            Some(existing) if *existing == bound => return placeholder,
            Some(_) => {
                suffix += 1;
                placeholder = format!("{base}_{suffix}");
            }
            None => {
                bindings.insert(placeholder.clone(), bound);
                return placeholder;
            }
        }
    }
}

/// Update expression kept as clauses until rendered.
///
/// Actions of the same kind always end up under a single keyword, whatever their source.
///
/// ```rust
/// use dynamodb_kit::common::expression::{ClauseKind, UpdateExpression};
///
/// let mut update = UpdateExpression::parse("ADD #balance :val").unwrap();
/// update.push(ClauseKind::Set, "#name = :name");
/// update.merge(UpdateExpression::parse("SET #version = :newVersion").unwrap());
/// assert_eq!(
///     update.render().unwrap(),
///     "SET #name = :name, #version = :newVersion ADD #balance :val"
/// );
/// ```
#[derive(Clone, Debug, Default, PartialEq)]
pub struct UpdateExpression {
    clauses: collections::BTreeMap<ClauseKind, Vec<String>>,
}

impl UpdateExpression {
    /// Create an empty update expression.
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse a raw update expression into its clauses.
    ///
    /// Keywords are recognized case-insensitively outside parentheses and never inside
    /// `#name` or `:value` placeholders. Actions are split on top-level commas.
    pub fn parse(raw: &str) -> Result<Self> {
        let mut expression = Self::new();
        let mut current = None;
        let mut action = String::new();
        let mut depth = 0usize;
        let chars: Vec<char> = raw.chars().collect();
        let mut index = 0;
        while index < chars.len() {
            let c = chars[index];
            if is_word_char(c) {
                let start = index;
                while index < chars.len() && is_word_char(chars[index]) {
                    index += 1;
                }
                let word: String = chars[start..index].iter().collect();
                let prefixed = start > 0 && matches!(chars[start - 1], ':' | '#' | '.');
                match ClauseKind::from_keyword(&word) {
                    Some(kind) if depth == 0 && !prefixed => {
                        expression.flush(current, &mut action)?;
                        current = Some(kind);
                    }
                    _ => action.push_str(&word),
                }
                continue;
            }
            match c {
                '(' => {
                    depth += 1;
                    action.push(c);
                }
                ')' => {
                    depth = depth.checked_sub(1).ok_or_else(|| {
                        Error::MalformedExpression(format!("unbalanced parenthesis in `{raw}`"))
                    })?;
                    action.push(c);
                }
                ',' if depth == 0 => expression.flush(current, &mut action)?,
                _ => action.push(c),
            }
            index += 1;
        }
        if depth != 0 {
            return Err(Error::MalformedExpression(format!(
                "unbalanced parenthesis in `{raw}`"
            )));
        }
        expression.flush(current, &mut action)?;
        if expression.is_empty() {
            return Err(Error::MalformedExpression(format!(
                "no update clause in `{raw}`"
            )));
        }
        Ok(expression)
    }

    fn flush(&mut self, current: Option<ClauseKind>, action: &mut String) -> Result<()> {
        let text = action.trim();
        if text.is_empty() {
            action.clear();
            return Ok(());
        }
        match current {
            Some(kind) => self.push(kind, text),
            None => {
                return Err(Error::MalformedExpression(format!(
                    "`{text}` is outside of a SET, REMOVE, ADD or DELETE clause"
                )));
            }
        }
        action.clear();
        Ok(())
    }

    /// Append one action to the clause of the given kind.
    pub fn push(&mut self, kind: ClauseKind, action: impl Into<String>) {
        self.clauses.entry(kind).or_default().push(action.into());
    }

    /// Append every action of `other`, clause by clause.
    pub fn merge(&mut self, other: Self) {
        for (kind, actions) in other.clauses {
            self.clauses.entry(kind).or_default().extend(actions);
        }
    }

    /// The actions of one clause.
    pub fn actions(&self, kind: ClauseKind) -> &[String] {
        self.clauses.get(&kind).map(Vec::as_slice).unwrap_or_default()
    }

    /// Whether no action was added.
    pub fn is_empty(&self) -> bool {
        self.clauses.values().all(Vec::is_empty)
    }

    /// Render to wire text, one keyword per clause kind.
    pub fn render(&self) -> Option<String> {
        let clauses: Vec<String> = self
            .clauses
            .iter()
            .filter(|(_, actions)| !actions.is_empty())
            .map(|(kind, actions)| format!("{} {}", kind.keyword(), actions.join(", ")))
            .collect();
        (!clauses.is_empty()).then(|| clauses.join(" "))
    }
}

fn is_word_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '_'
}

/// Conjunction of condition terms.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ConditionExpression {
    terms: Vec<String>,
}

impl ConditionExpression {
    /// Add a term that must hold as well.
    pub fn push(&mut self, term: impl Into<String>) {
        self.terms.push(term.into());
    }

    /// Render to wire text; several terms are parenthesized and joined with `AND`.
    pub fn render(&self) -> Option<String> {
        match self.terms.as_slice() {
            [] => None,
            [term] => Some(term.clone()),
            terms => Some(
                terms
                    .iter()
                    .map(|term| format!("({term})"))
                    .collect::<Vec<_>>()
                    .join(" AND "),
            ),
        }
    }
}

/// Wire-ready expression parts of one request.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct RenderedExpression {
    /// The update expression, if any.
    pub update_expression: Option<String>,
    /// The condition expression, if any.
    pub condition_expression: Option<String>,
    /// Attribute name placeholders.
    pub expression_attribute_names: Option<collections::HashMap<String, String>>,
    /// Attribute value placeholders.
    pub expression_attribute_values: Option<common::Item>,
}

/// Builder combining field updates, raw clauses and conditions into one request.
///
/// ```rust
/// use dynamodb_kit::common::{self, expression, key};
/// use indexmap::IndexMap;
///
/// let keys = key::KeySchema::new("pk", "sk");
/// let mut builder = expression::ExpressionBuilder::new();
/// builder
///     .set_fields(
///         IndexMap::from([
///             ("pk".to_string(), common::string_value("users#1")),
///             ("name".to_string(), common::string_value("B")),
///         ]),
///         &keys,
///     )
///     .unwrap();
/// let rendered = builder.build();
/// assert_eq!(rendered.update_expression.as_deref(), Some("SET #name = :name"));
/// ```
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ExpressionBuilder {
    update: UpdateExpression,
    condition: ConditionExpression,
    bindings: Bindings,
}

impl ExpressionBuilder {
    /// Create an empty builder.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add one `SET #field = :field` action per non-key field.
    ///
    /// Fails when `fields` is empty, or when every field is a primary key attribute.
    pub fn set_fields(
        &mut self,
        fields: IndexMap<String, types::AttributeValue>,
        keys: &key::KeySchema,
    ) -> Result<()> {
        if fields.is_empty() {
            return Err(Error::FieldsRequired);
        }
        let mut assigned = 0;
        for (name, value) in fields {
            if keys.is_key(&name) {
                continue;
            }
            self.assign(&name, value);
            assigned += 1;
        }
        if assigned == 0 {
            return Err(Error::NoUpdateFields);
        }
        Ok(())
    }

    /// Add a `SET #field = :field` action for one attribute.
    pub fn assign(&mut self, name: &str, value: types::AttributeValue) {
        let name_placeholder = self.bindings.allocate_name(name, name);
        let value_placeholder = self.bindings.allocate_value(name, value);
        self.update.push(
            ClauseKind::Set,
            format!("{name_placeholder} = {value_placeholder}"),
        );
    }

    /// Bind a name placeholder for a generated clause; see [`Bindings::allocate_name`].
    pub fn allocate_name(&mut self, stem: &str, name: &str) -> String {
        self.bindings.allocate_name(stem, name)
    }

    /// Bind a value placeholder for a generated clause; see [`Bindings::allocate_value`].
    pub fn allocate_value(&mut self, stem: &str, value: types::AttributeValue) -> String {
        self.bindings.allocate_value(stem, value)
    }

    /// Append an action whose placeholders are already bound.
    pub fn push_action(&mut self, kind: ClauseKind, action: impl Into<String>) {
        self.update.push(kind, action);
    }

    /// Append a condition term whose placeholders are already bound.
    pub fn push_condition(&mut self, term: impl Into<String>) {
        self.condition.push(term);
    }

    /// Merge a raw update expression, clause by clause.
    pub fn update_expression(&mut self, expression: &common::Expression) -> Result<()> {
        let parsed = UpdateExpression::parse(&expression.expression)?;
        self.bindings.extend(expression)?;
        self.update.merge(parsed);
        Ok(())
    }

    /// Add a raw condition that must hold for the write to apply.
    pub fn condition(&mut self, expression: &common::Expression) -> Result<()> {
        let text = expression.expression.trim();
        if text.is_empty() {
            return Err(Error::MalformedExpression(
                "empty condition expression".to_string(),
            ));
        }
        self.bindings.extend(expression)?;
        self.condition.push(text);
        Ok(())
    }

    /// Whether no update action was added.
    pub fn is_update_empty(&self) -> bool {
        self.update.is_empty()
    }

    /// Render every part.
    pub fn build(self) -> RenderedExpression {
        let update_expression = self.update.render();
        let condition_expression = self.condition.render();
        let (expression_attribute_names, expression_attribute_values) =
            self.bindings.into_parts();
        RenderedExpression {
            update_expression,
            condition_expression,
            expression_attribute_names,
            expression_attribute_values,
        }
    }
}

/// Flatten a record into its attributes, sorted by name.
pub fn flatten<T: Serialize>(value: &T) -> Result<IndexMap<String, types::AttributeValue>> {
    let item: common::Item = to_item(value)?;
    let mut fields: IndexMap<_, _> = item.into_iter().collect();
    fields.sort_keys();
    Ok(fields)
}
