//! Condition, update and projection expressions evaluated against stored items.

use crate::common::{self, key};
use crate::testing::ServiceError;

use aws_sdk_dynamodb::{primitives::Blob, types::AttributeValue};
use std::{cmp::Ordering, collections, iter, str};

type Result<T, E = ServiceError> = std::result::Result<T, E>;

/// A number attribute, exact for integers.
#[derive(Clone, Copy, Debug)]
pub(crate) enum Number {
    Int(i128),
    Float(f64),
}

impl Number {
    pub(crate) fn parse(raw: &str) -> Result<Self> {
        let raw = raw.trim();
        let invalid = || ServiceError::validation(format!("invalid number `{raw}`"));
        if raw.contains(['.', 'e', 'E']) {
            let value: f64 = raw.parse().map_err(|_| invalid())?;
            if !value.is_finite() {
                return Err(invalid());
            }
            Ok(Self::Float(value))
        } else {
            raw.parse().map(Self::Int).map_err(|_| invalid())
        }
    }

    fn as_f64(self) -> f64 {
        match self {
            Self::Int(value) => value as f64,
            Self::Float(value) => value,
        }
    }

    fn add(self, other: Self) -> Self {
        match (self, other) {
            (Self::Int(a), Self::Int(b)) => a
                .checked_add(b)
                .map_or_else(|| Self::Float(a as f64 + b as f64), Self::Int),
            _ => Self::Float(self.as_f64() + other.as_f64()),
        }
    }

    fn sub(self, other: Self) -> Self {
        match other {
            Self::Int(value) => match value.checked_neg() {
                Some(negated) => self.add(Self::Int(negated)),
                None => Self::Float(self.as_f64() - other.as_f64()),
            },
            Self::Float(value) => self.add(Self::Float(-value)),
        }
    }

    fn render(self) -> String {
        match self {
            Self::Int(value) => value.to_string(),
            Self::Float(value) => value.to_string(),
        }
    }
}

impl Ord for Number {
    fn cmp(&self, other: &Self) -> Ordering {
        match (self, other) {
            (Self::Int(a), Self::Int(b)) => a.cmp(b),
            _ => self.as_f64().total_cmp(&other.as_f64()),
        }
    }
}

impl PartialOrd for Number {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl PartialEq for Number {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for Number {}

/// One component of a primary key, ordered the way the store orders sort keys.
#[derive(Clone, Debug, Eq, Ord, PartialEq, PartialOrd)]
pub(crate) enum KeyPart {
    B(Vec<u8>),
    N(Number),
    S(String),
}

impl KeyPart {
    pub(crate) fn from_value(value: &AttributeValue) -> Result<Self> {
        match value {
            AttributeValue::S(value) if !value.is_empty() => Ok(Self::S(value.clone())),
            AttributeValue::N(value) => Number::parse(value).map(Self::N),
            AttributeValue::B(value) if !bytes(value).is_empty() => {
                Ok(Self::B(bytes(value).to_vec()))
            }
            _ => Err(ServiceError::validation(
                "key attributes must be non-empty strings, numbers or binaries",
            )),
        }
    }
}

/// Extract the ordered key of an item under `keys`.
pub(crate) fn item_key(keys: &key::KeySchema, item: &common::Item) -> Result<(KeyPart, KeyPart)> {
    let part = |name: &String| {
        item.get(name)
            .ok_or_else(|| ServiceError::validation(format!("missing key attribute `{name}`")))
            .and_then(KeyPart::from_value)
    };
    Ok((part(&keys.partition_key)?, part(&keys.sort_key)?))
}

fn bytes(blob: &Blob) -> &[u8] {
    AsRef::<[u8]>::as_ref(blob)
}

#[derive(Clone, Debug, PartialEq)]
enum Token {
    Name(String),
    Value(String),
    Ident(String),
    Index(usize),
    LParen,
    RParen,
    LBracket,
    RBracket,
    Comma,
    Dot,
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
    Plus,
    Minus,
}

fn read_word(chars: &mut iter::Peekable<str::Chars<'_>>) -> String {
    let mut word = String::new();
    while let Some(&ch) = chars.peek() {
        if !(ch.is_ascii_alphanumeric() || ch == '_') {
            break;
        }
        word.push(ch);
        chars.next();
    }
    word
}

fn tokenize(expression: &str) -> Result<Vec<Token>> {
    let mut tokens = Vec::new();
    let mut chars = expression.chars().peekable();
    while let Some(&ch) = chars.peek() {
        let token = match ch {
            ch if ch.is_whitespace() => {
                chars.next();
                continue;
            }
            '#' | ':' => {
                chars.next();
                let name = read_word(&mut chars);
                if name.is_empty() {
                    return Err(ServiceError::validation(format!(
                        "empty placeholder in `{expression}`"
                    )));
                }
                if ch == '#' {
                    Token::Name(format!("#{name}"))
                } else {
                    Token::Value(format!(":{name}"))
                }
            }
            ch if ch.is_ascii_digit() => {
                let digits = read_word(&mut chars);
                let index = digits.parse().map_err(|_| {
                    ServiceError::validation(format!("invalid list index `{digits}`"))
                })?;
                Token::Index(index)
            }
            ch if ch.is_ascii_alphabetic() || ch == '_' => Token::Ident(read_word(&mut chars)),
            _ => {
                chars.next();
                match ch {
                    '(' => Token::LParen,
                    ')' => Token::RParen,
                    '[' => Token::LBracket,
                    ']' => Token::RBracket,
                    ',' => Token::Comma,
                    '.' => Token::Dot,
                    '=' => Token::Eq,
                    '+' => Token::Plus,
                    '-' => Token::Minus,
                    '<' => match chars.peek() {
                        Some('>') => {
                            chars.next();
                            Token::Ne
                        }
                        Some('=') => {
                            chars.next();
                            Token::Le
                        }
                        _ => Token::Lt,
                    },
                    '>' => match chars.peek() {
                        Some('=') => {
                            chars.next();
                            Token::Ge
                        }
                        _ => Token::Gt,
                    },
                    _ => {
                        return Err(ServiceError::validation(format!(
                            "unexpected character `{ch}` in `{expression}`"
                        )));
                    }
                }
            }
        };
        tokens.push(token);
    }
    Ok(tokens)
}

#[derive(Clone, Debug, PartialEq)]
enum Segment {
    Attr(String),
    Index(usize),
}

type Path = Vec<Segment>;

#[derive(Clone, Debug)]
enum Operand {
    Path(Path),
    Value(AttributeValue),
    Size(Path),
}

#[derive(Clone, Copy, Debug)]
enum Comparator {
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
}

#[derive(Clone, Debug)]
enum Condition {
    Or(Box<Condition>, Box<Condition>),
    And(Box<Condition>, Box<Condition>),
    Not(Box<Condition>),
    Compare(Operand, Comparator, Operand),
    Between(Operand, Operand, Operand),
    In(Operand, Vec<Operand>),
    Exists(Path),
    NotExists(Path),
    BeginsWith(Operand, Operand),
    Contains(Operand, Operand),
    AttributeType(Path, Operand),
}

#[derive(Clone, Debug)]
enum SetOperand {
    Path(Path),
    Value(AttributeValue),
    IfNotExists(Path, Box<SetOperand>),
    ListAppend(Box<SetOperand>, Box<SetOperand>),
}

#[derive(Clone, Debug)]
enum SetValue {
    Operand(SetOperand),
    Plus(SetOperand, SetOperand),
    Minus(SetOperand, SetOperand),
}

#[derive(Clone, Debug)]
enum Action {
    Set(Path, SetValue),
    Remove(Path),
    Add(Path, AttributeValue),
    Delete(Path, AttributeValue),
}

struct Parser<'a> {
    tokens: Vec<Token>,
    position: usize,
    names: &'a collections::HashMap<String, String>,
    values: &'a common::Item,
}

impl<'a> Parser<'a> {
    fn new(
        expression: &str,
        names: &'a collections::HashMap<String, String>,
        values: &'a common::Item,
    ) -> Result<Self> {
        Ok(Self {
            tokens: tokenize(expression)?,
            position: 0,
            names,
            values,
        })
    }

    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.position)
    }

    fn peek_at(&self, offset: usize) -> Option<&Token> {
        self.tokens.get(self.position + offset)
    }

    fn next(&mut self) -> Option<Token> {
        let token = self.tokens.get(self.position).cloned();
        self.position += 1;
        token
    }

    fn is_done(&self) -> bool {
        self.position >= self.tokens.len()
    }

    fn eat(&mut self, token: &Token) -> bool {
        if self.peek() == Some(token) {
            self.position += 1;
            true
        } else {
            false
        }
    }

    fn expect(&mut self, token: &Token) -> Result<()> {
        if self.eat(token) {
            Ok(())
        } else {
            Err(self.unexpected())
        }
    }

    fn unexpected(&self) -> ServiceError {
        match self.peek() {
            Some(token) => ServiceError::validation(format!("syntax error near {token:?}")),
            None => ServiceError::validation("unexpected end of expression"),
        }
    }

    fn is_keyword(&self, keyword: &str) -> bool {
        matches!(self.peek(), Some(Token::Ident(ident)) if ident.eq_ignore_ascii_case(keyword))
    }

    fn eat_keyword(&mut self, keyword: &str) -> bool {
        let found = self.is_keyword(keyword);
        if found {
            self.position += 1;
        }
        found
    }

    fn is_call(&self, function: &str) -> bool {
        matches!(self.peek(), Some(Token::Ident(ident)) if ident == function)
            && self.peek_at(1) == Some(&Token::LParen)
    }

    fn name(&self, placeholder: &str) -> Result<String> {
        self.names.get(placeholder).cloned().ok_or_else(|| {
            ServiceError::validation(format!("unbound attribute name placeholder `{placeholder}`"))
        })
    }

    fn value(&self, placeholder: &str) -> Result<AttributeValue> {
        self.values.get(placeholder).cloned().ok_or_else(|| {
            ServiceError::validation(format!("unbound attribute value placeholder `{placeholder}`"))
        })
    }

    fn parse_path(&mut self) -> Result<Path> {
        let mut path = vec![Segment::Attr(self.parse_attribute()?)];
        loop {
            if self.eat(&Token::Dot) {
                path.push(Segment::Attr(self.parse_attribute()?));
            } else if self.eat(&Token::LBracket) {
                match self.next() {
                    Some(Token::Index(index)) => path.push(Segment::Index(index)),
                    _ => return Err(ServiceError::validation("invalid list index")),
                }
                self.expect(&Token::RBracket)?;
            } else {
                return Ok(path);
            }
        }
    }

    fn parse_attribute(&mut self) -> Result<String> {
        match self.next() {
            Some(Token::Name(placeholder)) => self.name(&placeholder),
            Some(Token::Ident(name)) => Ok(name),
            _ => {
                self.position -= 1;
                Err(self.unexpected())
            }
        }
    }

    fn parse_value(&mut self) -> Result<AttributeValue> {
        match self.next() {
            Some(Token::Value(placeholder)) => self.value(&placeholder),
            _ => {
                self.position -= 1;
                Err(self.unexpected())
            }
        }
    }

    fn parse_operand(&mut self) -> Result<Operand> {
        if self.is_call("size") {
            self.position += 2;
            let path = self.parse_path()?;
            self.expect(&Token::RParen)?;
            return Ok(Operand::Size(path));
        }
        if let Some(Token::Value(_)) = self.peek() {
            return self.parse_value().map(Operand::Value);
        }
        self.parse_path().map(Operand::Path)
    }

    fn parse_condition(&mut self) -> Result<Condition> {
        let mut left = self.parse_and()?;
        while self.eat_keyword("OR") {
            let right = self.parse_and()?;
            left = Condition::Or(Box::new(left), Box::new(right));
        }
        Ok(left)
    }

    fn parse_and(&mut self) -> Result<Condition> {
        let mut left = self.parse_not()?;
        while self.eat_keyword("AND") {
            let right = self.parse_not()?;
            left = Condition::And(Box::new(left), Box::new(right));
        }
        Ok(left)
    }

    fn parse_not(&mut self) -> Result<Condition> {
        if self.eat_keyword("NOT") {
            return Ok(Condition::Not(Box::new(self.parse_not()?)));
        }
        self.parse_primary()
    }

    fn parse_primary(&mut self) -> Result<Condition> {
        if self.eat(&Token::LParen) {
            let condition = self.parse_condition()?;
            self.expect(&Token::RParen)?;
            return Ok(condition);
        }
        for function in [
            "attribute_exists",
            "attribute_not_exists",
            "attribute_type",
            "begins_with",
            "contains",
        ] {
            if self.is_call(function) {
                self.position += 2;
                let condition = match function {
                    "attribute_exists" => Condition::Exists(self.parse_path()?),
                    "attribute_not_exists" => Condition::NotExists(self.parse_path()?),
                    "attribute_type" => {
                        let path = self.parse_path()?;
                        self.expect(&Token::Comma)?;
                        Condition::AttributeType(path, self.parse_operand()?)
                    }
                    "begins_with" => {
                        let operand = self.parse_operand()?;
                        self.expect(&Token::Comma)?;
                        Condition::BeginsWith(operand, self.parse_operand()?)
                    }
                    _ => {
                        let operand = self.parse_operand()?;
                        self.expect(&Token::Comma)?;
                        Condition::Contains(operand, self.parse_operand()?)
                    }
                };
                self.expect(&Token::RParen)?;
                return Ok(condition);
            }
        }
        let left = self.parse_operand()?;
        if self.eat_keyword("BETWEEN") {
            let low = self.parse_operand()?;
            if !self.eat_keyword("AND") {
                return Err(self.unexpected());
            }
            let high = self.parse_operand()?;
            return Ok(Condition::Between(left, low, high));
        }
        if self.eat_keyword("IN") {
            self.expect(&Token::LParen)?;
            let mut candidates = vec![self.parse_operand()?];
            while self.eat(&Token::Comma) {
                candidates.push(self.parse_operand()?);
            }
            self.expect(&Token::RParen)?;
            return Ok(Condition::In(left, candidates));
        }
        let comparator = match self.next() {
            Some(Token::Eq) => Comparator::Eq,
            Some(Token::Ne) => Comparator::Ne,
            Some(Token::Lt) => Comparator::Lt,
            Some(Token::Le) => Comparator::Le,
            Some(Token::Gt) => Comparator::Gt,
            Some(Token::Ge) => Comparator::Ge,
            _ => {
                self.position -= 1;
                return Err(self.unexpected());
            }
        };
        Ok(Condition::Compare(left, comparator, self.parse_operand()?))
    }

    fn parse_set_operand(&mut self) -> Result<SetOperand> {
        if self.is_call("if_not_exists") {
            self.position += 2;
            let path = self.parse_path()?;
            self.expect(&Token::Comma)?;
            let fallback = self.parse_set_operand()?;
            self.expect(&Token::RParen)?;
            return Ok(SetOperand::IfNotExists(path, Box::new(fallback)));
        }
        if self.is_call("list_append") {
            self.position += 2;
            let head = self.parse_set_operand()?;
            self.expect(&Token::Comma)?;
            let tail = self.parse_set_operand()?;
            self.expect(&Token::RParen)?;
            return Ok(SetOperand::ListAppend(Box::new(head), Box::new(tail)));
        }
        if let Some(Token::Value(_)) = self.peek() {
            return self.parse_value().map(SetOperand::Value);
        }
        self.parse_path().map(SetOperand::Path)
    }

    fn parse_set_value(&mut self) -> Result<SetValue> {
        let left = self.parse_set_operand()?;
        if self.eat(&Token::Plus) {
            return Ok(SetValue::Plus(left, self.parse_set_operand()?));
        }
        if self.eat(&Token::Minus) {
            return Ok(SetValue::Minus(left, self.parse_set_operand()?));
        }
        Ok(SetValue::Operand(left))
    }

    fn parse_update(&mut self) -> Result<Vec<Action>> {
        let mut actions = Vec::new();
        let mut clauses = collections::HashSet::new();
        while !self.is_done() {
            let clause = match self.next() {
                Some(Token::Ident(clause)) => clause.to_ascii_uppercase(),
                _ => {
                    self.position -= 1;
                    return Err(self.unexpected());
                }
            };
            if !clauses.insert(clause.clone()) {
                return Err(ServiceError::validation(format!(
                    "the {clause} clause appears more than once"
                )));
            }
            loop {
                let action = match clause.as_str() {
                    "SET" => {
                        let path = self.parse_path()?;
                        self.expect(&Token::Eq)?;
                        Action::Set(path, self.parse_set_value()?)
                    }
                    "REMOVE" => Action::Remove(self.parse_path()?),
                    "ADD" => {
                        let path = self.parse_path()?;
                        Action::Add(path, self.parse_value()?)
                    }
                    "DELETE" => {
                        let path = self.parse_path()?;
                        Action::Delete(path, self.parse_value()?)
                    }
                    _ => {
                        return Err(ServiceError::validation(format!(
                            "unknown update clause `{clause}`"
                        )));
                    }
                };
                actions.push(action);
                if !self.eat(&Token::Comma) {
                    break;
                }
            }
        }
        if actions.is_empty() {
            return Err(ServiceError::validation("empty update expression"));
        }
        Ok(actions)
    }

    fn parse_projection(&mut self) -> Result<Vec<Path>> {
        let mut paths = vec![self.parse_path()?];
        while self.eat(&Token::Comma) {
            paths.push(self.parse_path()?);
        }
        if !self.is_done() {
            return Err(self.unexpected());
        }
        Ok(paths)
    }
}

fn get_path<'i>(item: &'i common::Item, path: &[Segment]) -> Option<&'i AttributeValue> {
    let (Segment::Attr(name), tail) = path.split_first()? else {
        return None;
    };
    tail.iter()
        .try_fold(item.get(name)?, |value, segment| match (segment, value) {
            (Segment::Attr(name), AttributeValue::M(map)) => map.get(name),
            (Segment::Index(index), AttributeValue::L(list)) => list.get(*index),
            _ => None,
        })
}

fn invalid_path() -> ServiceError {
    ServiceError::validation("the document path provided in the update expression is invalid")
}

fn set_in(target: &mut AttributeValue, path: &[Segment], value: AttributeValue) -> Result<()> {
    match (path, target) {
        ([Segment::Attr(name)], AttributeValue::M(map)) => {
            map.insert(name.clone(), value);
            Ok(())
        }
        ([Segment::Index(index)], AttributeValue::L(list)) => {
            match list.get_mut(*index) {
                Some(slot) => *slot = value,
                None => list.push(value),
            }
            Ok(())
        }
        ([Segment::Attr(name), tail @ ..], AttributeValue::M(map)) => {
            set_in(map.get_mut(name).ok_or_else(invalid_path)?, tail, value)
        }
        ([Segment::Index(index), tail @ ..], AttributeValue::L(list)) => {
            set_in(list.get_mut(*index).ok_or_else(invalid_path)?, tail, value)
        }
        _ => Err(invalid_path()),
    }
}

fn set_path(item: &mut common::Item, path: &[Segment], value: AttributeValue) -> Result<()> {
    match path.split_first() {
        Some((Segment::Attr(name), [])) => {
            item.insert(name.clone(), value);
            Ok(())
        }
        Some((Segment::Attr(name), tail)) => {
            set_in(item.get_mut(name).ok_or_else(invalid_path)?, tail, value)
        }
        _ => Err(invalid_path()),
    }
}

fn remove_in(target: &mut AttributeValue, path: &[Segment]) {
    match (path, target) {
        ([Segment::Attr(name)], AttributeValue::M(map)) => {
            map.remove(name);
        }
        ([Segment::Index(index)], AttributeValue::L(list)) => {
            if *index < list.len() {
                list.remove(*index);
            }
        }
        ([Segment::Attr(name), tail @ ..], AttributeValue::M(map)) => {
            if let Some(value) = map.get_mut(name) {
                remove_in(value, tail);
            }
        }
        ([Segment::Index(index), tail @ ..], AttributeValue::L(list)) => {
            if let Some(value) = list.get_mut(*index) {
                remove_in(value, tail);
            }
        }
        _ => {}
    }
}

fn remove_path(item: &mut common::Item, path: &[Segment]) {
    match path.split_first() {
        Some((Segment::Attr(name), [])) => {
            item.remove(name);
        }
        Some((Segment::Attr(name), tail)) => {
            if let Some(value) = item.get_mut(name) {
                remove_in(value, tail);
            }
        }
        _ => {}
    }
}

fn compare(left: &AttributeValue, right: &AttributeValue) -> Option<Ordering> {
    match (left, right) {
        (AttributeValue::N(left), AttributeValue::N(right)) => {
            Some(Number::parse(left).ok()?.cmp(&Number::parse(right).ok()?))
        }
        (AttributeValue::S(left), AttributeValue::S(right)) => Some(left.cmp(right)),
        (AttributeValue::B(left), AttributeValue::B(right)) => Some(bytes(left).cmp(bytes(right))),
        _ => None,
    }
}

fn equals(left: &AttributeValue, right: &AttributeValue) -> bool {
    match compare(left, right) {
        Some(ordering) => ordering == Ordering::Equal,
        None => left == right,
    }
}

fn size(value: &AttributeValue) -> Option<usize> {
    match value {
        AttributeValue::S(value) => Some(value.chars().count()),
        AttributeValue::B(value) => Some(bytes(value).len()),
        AttributeValue::Ss(values) | AttributeValue::Ns(values) => Some(values.len()),
        AttributeValue::Bs(values) => Some(values.len()),
        AttributeValue::L(values) => Some(values.len()),
        AttributeValue::M(values) => Some(values.len()),
        _ => None,
    }
}

fn type_name(value: &AttributeValue) -> &'static str {
    match value {
        AttributeValue::S(_) => "S",
        AttributeValue::N(_) => "N",
        AttributeValue::B(_) => "B",
        AttributeValue::Ss(_) => "SS",
        AttributeValue::Ns(_) => "NS",
        AttributeValue::Bs(_) => "BS",
        AttributeValue::L(_) => "L",
        AttributeValue::M(_) => "M",
        AttributeValue::Bool(_) => "BOOL",
        AttributeValue::Null(_) => "NULL",
        _ => "UNKNOWN",
    }
}

impl Operand {
    fn resolve(&self, item: &common::Item) -> Option<AttributeValue> {
        match self {
            Self::Path(path) => get_path(item, path).cloned(),
            Self::Value(value) => Some(value.clone()),
            Self::Size(path) => get_path(item, path)
                .and_then(size)
                .map(|size| AttributeValue::N(size.to_string())),
        }
    }
}

impl Condition {
    fn evaluate(&self, item: &common::Item) -> bool {
        match self {
            Self::Or(left, right) => left.evaluate(item) || right.evaluate(item),
            Self::And(left, right) => left.evaluate(item) && right.evaluate(item),
            Self::Not(condition) => !condition.evaluate(item),
            Self::Compare(left, comparator, right) => {
                let (Some(left), Some(right)) = (left.resolve(item), right.resolve(item)) else {
                    return matches!(comparator, Comparator::Ne);
                };
                match comparator {
                    Comparator::Eq => equals(&left, &right),
                    Comparator::Ne => !equals(&left, &right),
                    Comparator::Lt => compare(&left, &right) == Some(Ordering::Less),
                    Comparator::Le => matches!(
                        compare(&left, &right),
                        Some(Ordering::Less | Ordering::Equal)
                    ),
                    Comparator::Gt => compare(&left, &right) == Some(Ordering::Greater),
                    Comparator::Ge => matches!(
                        compare(&left, &right),
                        Some(Ordering::Greater | Ordering::Equal)
                    ),
                }
            }
            Self::Between(operand, low, high) => {
                match (operand.resolve(item), low.resolve(item), high.resolve(item)) {
                    (Some(value), Some(low), Some(high)) => {
                        matches!(
                            compare(&value, &low),
                            Some(Ordering::Greater | Ordering::Equal)
                        ) && matches!(
                            compare(&value, &high),
                            Some(Ordering::Less | Ordering::Equal)
                        )
                    }
                    _ => false,
                }
            }
            Self::In(operand, candidates) => operand.resolve(item).is_some_and(|value| {
                candidates
                    .iter()
                    .filter_map(|candidate| candidate.resolve(item))
                    .any(|candidate| equals(&value, &candidate))
            }),
            Self::Exists(path) => get_path(item, path).is_some(),
            Self::NotExists(path) => get_path(item, path).is_none(),
            Self::BeginsWith(operand, prefix) => match (operand.resolve(item), prefix.resolve(item)) {
                (Some(AttributeValue::S(value)), Some(AttributeValue::S(prefix))) => {
                    value.starts_with(&prefix)
                }
                (Some(AttributeValue::B(value)), Some(AttributeValue::B(prefix))) => {
                    bytes(&value).starts_with(bytes(&prefix))
                }
                _ => false,
            },
            Self::Contains(operand, needle) => match (operand.resolve(item), needle.resolve(item)) {
                (Some(AttributeValue::S(value)), Some(AttributeValue::S(needle))) => {
                    value.contains(&needle)
                }
                (Some(AttributeValue::Ss(values)), Some(AttributeValue::S(needle))) => {
                    values.contains(&needle)
                }
                (Some(AttributeValue::Ns(values)), Some(needle @ AttributeValue::N(_))) => values
                    .iter()
                    .any(|value| equals(&AttributeValue::N(value.clone()), &needle)),
                (Some(AttributeValue::Bs(values)), Some(AttributeValue::B(needle))) => {
                    values.contains(&needle)
                }
                (Some(AttributeValue::L(values)), Some(needle)) => {
                    values.iter().any(|value| equals(value, &needle))
                }
                _ => false,
            },
            Self::AttributeType(path, expected) => {
                match (get_path(item, path), expected.resolve(item)) {
                    (Some(value), Some(AttributeValue::S(expected))) => {
                        type_name(value) == expected
                    }
                    _ => false,
                }
            }
        }
    }
}

fn type_mismatch(operation: &str) -> ServiceError {
    ServiceError::validation(format!("incorrect operand type for {operation}"))
}

impl SetOperand {
    fn resolve(&self, item: &common::Item) -> Result<AttributeValue> {
        match self {
            Self::Path(path) => get_path(item, path).cloned().ok_or_else(|| {
                ServiceError::validation(
                    "the provided expression refers to an attribute that does not exist in the item",
                )
            }),
            Self::Value(value) => Ok(value.clone()),
            Self::IfNotExists(path, fallback) => match get_path(item, path) {
                Some(value) => Ok(value.clone()),
                None => fallback.resolve(item),
            },
            Self::ListAppend(head, tail) => match (head.resolve(item)?, tail.resolve(item)?) {
                (AttributeValue::L(mut head), AttributeValue::L(tail)) => {
                    head.extend(tail);
                    Ok(AttributeValue::L(head))
                }
                _ => Err(type_mismatch("list_append")),
            },
        }
    }
}

fn arithmetic(
    left: AttributeValue,
    right: AttributeValue,
    operation: fn(Number, Number) -> Number,
) -> Result<AttributeValue> {
    match (left, right) {
        (AttributeValue::N(left), AttributeValue::N(right)) => {
            let value = operation(Number::parse(&left)?, Number::parse(&right)?);
            Ok(AttributeValue::N(value.render()))
        }
        _ => Err(type_mismatch("operator")),
    }
}

impl SetValue {
    fn resolve(&self, item: &common::Item) -> Result<AttributeValue> {
        match self {
            Self::Operand(operand) => operand.resolve(item),
            Self::Plus(left, right) => {
                arithmetic(left.resolve(item)?, right.resolve(item)?, Number::add)
            }
            Self::Minus(left, right) => {
                arithmetic(left.resolve(item)?, right.resolve(item)?, Number::sub)
            }
        }
    }
}

fn union<T: Clone>(current: &mut Vec<T>, added: Vec<T>, same: impl Fn(&T, &T) -> bool) {
    for value in added {
        if !current.iter().any(|existing| same(existing, &value)) {
            current.push(value);
        }
    }
}

fn same_number(left: &String, right: &String) -> bool {
    equals(
        &AttributeValue::N(left.clone()),
        &AttributeValue::N(right.clone()),
    )
}

fn add(current: Option<AttributeValue>, added: AttributeValue) -> Result<AttributeValue> {
    match (current, added) {
        (None, added @ (AttributeValue::N(_)
        | AttributeValue::Ss(_)
        | AttributeValue::Ns(_)
        | AttributeValue::Bs(_))) => Ok(added),
        (Some(current @ AttributeValue::N(_)), added @ AttributeValue::N(_)) => {
            arithmetic(current, added, Number::add)
        }
        (Some(AttributeValue::Ss(mut current)), AttributeValue::Ss(added)) => {
            union(&mut current, added, |a, b| a == b);
            Ok(AttributeValue::Ss(current))
        }
        (Some(AttributeValue::Ns(mut current)), AttributeValue::Ns(added)) => {
            union(&mut current, added, same_number);
            Ok(AttributeValue::Ns(current))
        }
        (Some(AttributeValue::Bs(mut current)), AttributeValue::Bs(added)) => {
            union(&mut current, added, |a, b| a == b);
            Ok(AttributeValue::Bs(current))
        }
        _ => Err(type_mismatch("ADD")),
    }
}

fn delete(current: AttributeValue, removed: AttributeValue) -> Result<Option<AttributeValue>> {
    let remaining = match (current, removed) {
        (AttributeValue::Ss(mut current), AttributeValue::Ss(removed)) => {
            current.retain(|value| !removed.contains(value));
            (!current.is_empty()).then_some(AttributeValue::Ss(current))
        }
        (AttributeValue::Ns(mut current), AttributeValue::Ns(removed)) => {
            current.retain(|value| !removed.iter().any(|other| same_number(value, other)));
            (!current.is_empty()).then_some(AttributeValue::Ns(current))
        }
        (AttributeValue::Bs(mut current), AttributeValue::Bs(removed)) => {
            current.retain(|value| !removed.contains(value));
            (!current.is_empty()).then_some(AttributeValue::Bs(current))
        }
        _ => return Err(type_mismatch("DELETE")),
    };
    Ok(remaining)
}

/// Evaluate a condition expression; a missing item behaves like an empty one.
pub(crate) fn condition(
    expression: &str,
    names: &collections::HashMap<String, String>,
    values: &common::Item,
    item: Option<&common::Item>,
) -> Result<bool> {
    let mut parser = Parser::new(expression, names, values)?;
    let condition = parser.parse_condition()?;
    if !parser.is_done() {
        return Err(parser.unexpected());
    }
    let empty = common::Item::new();
    Ok(condition.evaluate(item.unwrap_or(&empty)))
}

/// Apply an update expression to `item`.
///
/// Every operand is read from the item as it was before the update.
pub(crate) fn update(
    expression: &str,
    names: &collections::HashMap<String, String>,
    values: &common::Item,
    keys: &key::KeySchema,
    item: &mut common::Item,
) -> Result<()> {
    let actions = Parser::new(expression, names, values)?.parse_update()?;
    let before = item.clone();
    for action in actions {
        let path = match &action {
            Action::Set(path, _)
            | Action::Remove(path)
            | Action::Add(path, _)
            | Action::Delete(path, _) => path,
        };
        if let Some(Segment::Attr(name)) = path.first() {
            if keys.is_key(name) {
                return Err(ServiceError::validation(format!(
                    "cannot update attribute {name}, it is part of the key"
                )));
            }
        }
        match action {
            Action::Set(path, value) => set_path(item, &path, value.resolve(&before)?)?,
            Action::Remove(path) => remove_path(item, &path),
            Action::Add(path, value) => {
                let current = get_path(&before, &path).cloned();
                set_path(item, &path, add(current, value)?)?;
            }
            Action::Delete(path, value) => {
                if let Some(current) = get_path(&before, &path).cloned() {
                    match delete(current, value)? {
                        Some(remaining) => set_path(item, &path, remaining)?,
                        None => remove_path(item, &path),
                    }
                }
            }
        }
    }
    Ok(())
}

/// Keep the top-level attributes named by a projection expression.
pub(crate) fn project(
    expression: &str,
    names: &collections::HashMap<String, String>,
    item: common::Item,
) -> Result<common::Item> {
    let values = common::Item::new();
    let paths = Parser::new(expression, names, &values)?.parse_projection()?;
    let mut item = item;
    Ok(paths
        .iter()
        .filter_map(|path| match path.first() {
            Some(Segment::Attr(name)) => item.remove_entry(name),
            _ => None,
        })
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    use rstest::rstest;

    fn item() -> common::Item {
        common::Item::from([
            ("pk".to_string(), common::string_value("a")),
            ("sk".to_string(), common::string_value("b")),
            ("name".to_string(), common::string_value("Alice")),
            ("count".to_string(), common::number_value(3)),
            ("version".to_string(), common::number_value(2)),
            (
                "tags".to_string(),
                AttributeValue::Ss(vec!["x".to_string(), "y".to_string()]),
            ),
            (
                "profile".to_string(),
                AttributeValue::M(collections::HashMap::from([(
                    "city".to_string(),
                    common::string_value("Rome"),
                )])),
            ),
            (
                "history".to_string(),
                AttributeValue::L(vec![common::number_value(1)]),
            ),
        ])
    }

    fn names() -> collections::HashMap<String, String> {
        collections::HashMap::from([
            ("#name".to_string(), "name".to_string()),
            ("#count".to_string(), "count".to_string()),
            ("#version".to_string(), "version".to_string()),
            ("#missing".to_string(), "missing".to_string()),
            ("#tags".to_string(), "tags".to_string()),
            ("#profile".to_string(), "profile".to_string()),
            ("#history".to_string(), "history".to_string()),
            ("#pk".to_string(), "pk".to_string()),
        ])
    }

    fn values() -> common::Item {
        common::Item::from([
            (":alice".to_string(), common::string_value("Alice")),
            (":al".to_string(), common::string_value("Al")),
            (":one".to_string(), common::number_value(1)),
            (":two".to_string(), common::number_value(2)),
            (":three".to_string(), AttributeValue::N("3.0".to_string())),
            (":ten".to_string(), common::number_value(10)),
            (":x".to_string(), common::string_value("x")),
            (":rome".to_string(), common::string_value("Rome")),
            (":type".to_string(), common::string_value("SS")),
            (
                ":more".to_string(),
                AttributeValue::Ss(vec!["y".to_string(), "z".to_string()]),
            ),
            (":list".to_string(), AttributeValue::L(vec![common::number_value(2)])),
        ])
    }

    #[rstest]
    #[case::equal("#name = :alice", true)]
    #[case::numeric_equal("#count = :three", true)]
    #[case::not_equal("#name <> :alice", false)]
    #[case::missing_not_equal("#missing <> :alice", true)]
    #[case::missing_compare("#missing = :alice", false)]
    #[case::less("#count < :ten", true)]
    #[case::greater_equal("#count >= :ten", false)]
    #[case::between("#count BETWEEN :one AND :ten", true)]
    #[case::in_list("#version IN (:one, :two)", true)]
    #[case::exists("attribute_exists(#name)", true)]
    #[case::not_exists("attribute_not_exists(#missing)", true)]
    #[case::lock_fresh("attribute_not_exists(#missing) OR #missing = :one", true)]
    #[case::lock_match("attribute_not_exists(#version) OR #version = :two", true)]
    #[case::lock_stale("attribute_not_exists(#version) OR #version = :one", false)]
    #[case::begins_with("begins_with(#name, :al)", true)]
    #[case::contains_set("contains(#tags, :x)", true)]
    #[case::nested("#profile.city = :rome", true)]
    #[case::size("size(#tags) = :two", true)]
    #[case::attribute_type("attribute_type(#tags, :type)", true)]
    #[case::grouping("(#count = :one OR #count = :three) AND NOT #name = :al", true)]
    #[case::lowercase_keywords("#count > :one and not #count > :ten", true)]
    fn test_condition(#[case] expression: &str, #[case] expected: bool) {
        let actual = condition(expression, &names(), &values(), Some(&item())).unwrap();
        assert_eq!(actual, expected);
    }

    #[rstest]
    #[case::unbound_name("#nope = :one")]
    #[case::unbound_value("#name = :nope")]
    #[case::dangling("#name = :alice AND")]
    #[case::garbage("#name ! :alice")]
    fn test_condition_invalid(#[case] expression: &str) {
        let actual = condition(expression, &names(), &values(), Some(&item()));
        assert_eq!(actual.unwrap_err().code, "ValidationException");
    }

    #[test]
    fn test_condition_missing_item() {
        let actual = condition(
            "attribute_not_exists(#version) OR #version = :one",
            &names(),
            &values(),
            None,
        );
        assert!(actual.unwrap());
    }

    #[rstest]
    #[case::set("SET #name = :x", "name", Some(common::string_value("x")))]
    #[case::increment("SET #count = #count + :one", "count", Some(common::number_value(4)))]
    #[case::decrement("SET #count = #count - :ten", "count", Some(common::number_value(-7)))]
    #[case::float("SET #count = #count + :three", "count", Some(AttributeValue::N("6".to_string())))]
    #[case::if_not_exists(
        "SET #missing = if_not_exists(#missing, :one)",
        "missing",
        Some(common::number_value(1))
    )]
    #[case::list_append(
        "SET #history = list_append(#history, :list)",
        "history",
        Some(AttributeValue::L(vec![common::number_value(1), common::number_value(2)]))
    )]
    #[case::remove("REMOVE #name", "name", None)]
    #[case::add_number("ADD #count :ten", "count", Some(common::number_value(13)))]
    #[case::add_missing("ADD #missing :one", "missing", Some(common::number_value(1)))]
    #[case::add_set(
        "ADD #tags :more",
        "tags",
        Some(AttributeValue::Ss(vec!["x".to_string(), "y".to_string(), "z".to_string()]))
    )]
    #[case::delete_set(
        "DELETE #tags :more",
        "tags",
        Some(AttributeValue::Ss(vec!["x".to_string()]))
    )]
    #[case::nested(
        "SET #profile.zip = :one",
        "profile",
        Some(AttributeValue::M(collections::HashMap::from([
            ("city".to_string(), common::string_value("Rome")),
            ("zip".to_string(), common::number_value(1)),
        ])))
    )]
    fn test_update(
        #[case] expression: &str,
        #[case] attribute: &str,
        #[case] expected: Option<AttributeValue>,
    ) {
        let mut item = item();
        update(
            expression,
            &names(),
            &values(),
            &key::KeySchema::new("pk", "sk"),
            &mut item,
        )
        .unwrap();
        assert_eq!(item.get(attribute).cloned(), expected);
    }

    #[test]
    fn test_update_reads_item_before_actions() {
        let mut item = item();
        update(
            "SET #count = :ten, #version = #count + :one",
            &names(),
            &values(),
            &key::KeySchema::new("pk", "sk"),
            &mut item,
        )
        .unwrap();
        assert_eq!(item["count"], common::number_value(10));
        assert_eq!(item["version"], common::number_value(4));
    }

    #[rstest]
    #[case::key_attribute("SET #pk = :x")]
    #[case::missing_operand("SET #name = #missing")]
    #[case::wrong_type("SET #name = #name + :one")]
    #[case::repeated_clause("SET #name = :x SET #count = :one")]
    #[case::empty("")]
    fn test_update_invalid(#[case] expression: &str) {
        let mut item = item();
        let actual = update(
            expression,
            &names(),
            &values(),
            &key::KeySchema::new("pk", "sk"),
            &mut item,
        );
        assert_eq!(actual.unwrap_err().code, "ValidationException");
    }

    #[test]
    fn test_project() {
        let actual = project("#name, #profile.city, sk", &names(), item()).unwrap();
        assert_eq!(
            actual.keys().map(String::as_str).collect::<collections::BTreeSet<_>>(),
            collections::BTreeSet::from(["name", "profile", "sk"])
        );
    }

    #[rstest]
    #[case::integers("2", "10", Ordering::Less)]
    #[case::mixed("10", "9.5", Ordering::Greater)]
    #[case::equal("1", "1.0", Ordering::Equal)]
    #[case::negative("-3", "2", Ordering::Less)]
    fn test_number_order(#[case] left: &str, #[case] right: &str, #[case] expected: Ordering) {
        let left = Number::parse(left).unwrap();
        let right = Number::parse(right).unwrap();
        assert_eq!(left.cmp(&right), expected);
    }

    #[test]
    fn test_number_overflow_falls_back_to_float() {
        let value = Number::Int(i128::MAX).add(Number::Int(1));
        assert!(matches!(value, Number::Float(_)));
    }
}
