//! Query model: predicates, selects, assignments and joins.
//!
//! Everything compiles to SQL text plus positional parameters. Identifiers are
//! validated and quoted; values are always bound. `Expr`, `Predicate::Raw` and
//! join `ON` clauses are trusted SQL and must never carry user input.

use super::value::to_sql;
use crate::error::{DataError, DataResult};
use lazy_static::lazy_static;
use regex::Regex;
use rusqlite::types::Value as SqlValue;
use serde_json::Value;

lazy_static! {
    /// Plain or table-qualified identifier.
    static ref IDENTIFIER: Regex =
        Regex::new(r"^[A-Za-z_][A-Za-z0-9_]*(\.[A-Za-z_][A-Za-z0-9_]*)?$").unwrap();
    /// `column <op> ?` condition keys.
    static ref CONDITION_KEY: Regex =
        Regex::new(r"^\s*([A-Za-z_][A-Za-z0-9_.]*)\s*(<>|!=|<=|>=|=|<|>|(?i:like))\s*\?\s*$").unwrap();
}

/// Quote an identifier, rejecting anything that is not a plain SQL name.
pub fn quote_identifier(ident: &str) -> DataResult<String> {
    if !IDENTIFIER.is_match(ident) {
        return Err(DataError::config(format!("invalid identifier: {:?}", ident)));
    }
    Ok(ident
        .split('.')
        .map(|part| format!("\"{}\"", part))
        .collect::<Vec<_>>()
        .join("."))
}

// Bare column names get the table prefix; qualified ones are kept.
fn qualify(column: &str, qualifier: Option<&str>) -> DataResult<String> {
    match qualifier {
        Some(table) if !column.contains('.') => quote_identifier(&format!("{}.{}", table, column)),
        _ => quote_identifier(column),
    }
}

/// Render a value as a SQL literal.
pub fn quote_value(value: &Value) -> String {
    match value {
        Value::Null => "NULL".to_string(),
        Value::Bool(b) => i64::from(*b).to_string(),
        Value::Number(n) => n.to_string(),
        Value::String(s) => quote_text(s),
        Value::Array(_) | Value::Object(_) => quote_text(&value.to_string()),
    }
}

fn quote_text(s: &str) -> String {
    format!("'{}'", s.replace('\'', "''"))
}

/// Trusted SQL expression.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Expr(String);

impl Expr {
    pub fn new(sql: impl Into<String>) -> Self {
        Self(sql.into())
    }

    pub fn count_all() -> Self {
        Self::new("COUNT(*)")
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Op {
    Eq,
    NotEq,
    Lt,
    Lte,
    Gt,
    Gte,
    Like,
}

impl Op {
    fn as_sql(self) -> &'static str {
        match self {
            Op::Eq => "=",
            Op::NotEq => "<>",
            Op::Lt => "<",
            Op::Lte => "<=",
            Op::Gt => ">",
            Op::Gte => ">=",
            Op::Like => "LIKE",
        }
    }

    fn parse(s: &str) -> Option<Self> {
        match s {
            "=" => Some(Op::Eq),
            "<>" | "!=" => Some(Op::NotEq),
            "<" => Some(Op::Lt),
            "<=" => Some(Op::Lte),
            ">" => Some(Op::Gt),
            ">=" => Some(Op::Gte),
            _ if s.eq_ignore_ascii_case("like") => Some(Op::Like),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Combinator {
    #[default]
    And,
    Or,
}

impl Combinator {
    fn as_sql(self) -> &'static str {
        match self {
            Combinator::And => " AND ",
            Combinator::Or => " OR ",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Predicate {
    Compare {
        column: String,
        op: Op,
        value: Value,
    },
    In {
        column: String,
        values: Vec<Value>,
        negate: bool,
    },
    IsNull {
        column: String,
        negate: bool,
    },
    Group(Where),
    Raw {
        sql: String,
        params: Vec<Value>,
    },
}

impl Predicate {
    fn compile(
        &self,
        params: &mut Vec<SqlValue>,
        qualifier: Option<&str>,
    ) -> DataResult<Option<String>> {
        let sql = match self {
            Predicate::Compare { column, op, value } => {
                let col = qualify(column, qualifier)?;
                match (op, value) {
                    (Op::Eq, Value::Null) => format!("{} IS NULL", col),
                    (Op::NotEq, Value::Null) => format!("{} IS NOT NULL", col),
                    _ => {
                        params.push(to_sql(value));
                        format!("{} {} ?", col, op.as_sql())
                    }
                }
            }
            Predicate::In {
                column,
                values,
                negate,
            } => {
                let col = qualify(column, qualifier)?;
                if values.is_empty() {
                    // IN () matches nothing, NOT IN () matches everything
                    return Ok(Some(if *negate { "1 = 1" } else { "0 = 1" }.to_string()));
                }
                params.extend(values.iter().map(to_sql));
                let marks = vec!["?"; values.len()].join(", ");
                let keyword = if *negate { "NOT IN" } else { "IN" };
                format!("{} {} ({})", col, keyword, marks)
            }
            Predicate::IsNull { column, negate } => {
                let col = qualify(column, qualifier)?;
                if *negate {
                    format!("{} IS NOT NULL", col)
                } else {
                    format!("{} IS NULL", col)
                }
            }
            Predicate::Group(inner) => match inner.compile_qualified(params, qualifier)? {
                Some(sql) => format!("({})", sql),
                None => return Ok(None),
            },
            Predicate::Raw { sql, params: raw } => {
                params.extend(raw.iter().map(to_sql));
                format!("({})", sql)
            }
        };
        Ok(Some(sql))
    }
}

/// Filter predicate tree.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Where {
    combinator: Combinator,
    predicates: Vec<Predicate>,
}

impl Where {
    /// Conjunction of predicates.
    pub fn new() -> Self {
        Self::default()
    }

    /// Disjunction of predicates.
    pub fn any() -> Self {
        Self {
            combinator: Combinator::Or,
            predicates: Vec::new(),
        }
    }

    /// Build from `(key, value)` pairs, see [`Where::condition`].
    pub fn from_pairs<I, K, V>(pairs: I) -> DataResult<Self>
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: Into<Value>,
    {
        pairs
            .into_iter()
            .try_fold(Self::new(), |w, (k, v)| w.condition(k.as_ref(), v))
    }

    /// Add a condition from a key and value.
    ///
    /// A key of the form `"column <op> ?"` compares with `<op>`. A bare column
    /// name means equality, `IN` for an array value, `IS NULL` for null.
    pub fn condition(self, key: &str, value: impl Into<Value>) -> DataResult<Self> {
        let value = value.into();
        if let Some(caps) = CONDITION_KEY.captures(key) {
            let op = Op::parse(&caps[2])
                .ok_or_else(|| DataError::config(format!("unsupported operator in {:?}", key)))?;
            return Ok(self.compare(&caps[1], op, value));
        }
        let column = key.trim();
        quote_identifier(column)?;
        Ok(match value {
            Value::Array(values) => self.is_in(column, values),
            other => self.eq(column, other),
        })
    }

    pub fn compare(mut self, column: &str, op: Op, value: impl Into<Value>) -> Self {
        self.predicates.push(Predicate::Compare {
            column: column.to_string(),
            op,
            value: value.into(),
        });
        self
    }

    pub fn eq(self, column: &str, value: impl Into<Value>) -> Self {
        self.compare(column, Op::Eq, value)
    }

    pub fn not_eq(self, column: &str, value: impl Into<Value>) -> Self {
        self.compare(column, Op::NotEq, value)
    }

    pub fn lt(self, column: &str, value: impl Into<Value>) -> Self {
        self.compare(column, Op::Lt, value)
    }

    pub fn lte(self, column: &str, value: impl Into<Value>) -> Self {
        self.compare(column, Op::Lte, value)
    }

    pub fn gt(self, column: &str, value: impl Into<Value>) -> Self {
        self.compare(column, Op::Gt, value)
    }

    pub fn gte(self, column: &str, value: impl Into<Value>) -> Self {
        self.compare(column, Op::Gte, value)
    }

    pub fn like(self, column: &str, pattern: impl Into<String>) -> Self {
        self.compare(column, Op::Like, Value::String(pattern.into()))
    }

    pub fn is_in<V: Into<Value>>(mut self, column: &str, values: impl IntoIterator<Item = V>) -> Self {
        self.predicates.push(Predicate::In {
            column: column.to_string(),
            values: values.into_iter().map(Into::into).collect(),
            negate: false,
        });
        self
    }

    pub fn not_in<V: Into<Value>>(mut self, column: &str, values: impl IntoIterator<Item = V>) -> Self {
        self.predicates.push(Predicate::In {
            column: column.to_string(),
            values: values.into_iter().map(Into::into).collect(),
            negate: true,
        });
        self
    }

    pub fn is_null(mut self, column: &str) -> Self {
        self.predicates.push(Predicate::IsNull {
            column: column.to_string(),
            negate: false,
        });
        self
    }

    pub fn is_not_null(mut self, column: &str) -> Self {
        self.predicates.push(Predicate::IsNull {
            column: column.to_string(),
            negate: true,
        });
        self
    }

    /// Trusted SQL fragment with `?` placeholders.
    pub fn raw(mut self, sql: impl Into<String>, params: Vec<Value>) -> Self {
        self.predicates.push(Predicate::Raw {
            sql: sql.into(),
            params,
        });
        self
    }

    /// Nest another predicate group, e.g. an OR group inside an AND filter.
    pub fn nest(mut self, group: Where) -> Self {
        self.predicates.push(Predicate::Group(group));
        self
    }

    pub fn is_empty(&self) -> bool {
        self.predicates.is_empty()
    }

    pub fn predicates(&self) -> &[Predicate] {
        &self.predicates
    }

    /// SQL for this filter, or `None` when it has no predicates.
    pub(crate) fn compile(&self, params: &mut Vec<SqlValue>) -> DataResult<Option<String>> {
        self.compile_qualified(params, None)
    }

    /// Like `compile`, with bare column names qualified by `qualifier`.
    pub(crate) fn compile_qualified(
        &self,
        params: &mut Vec<SqlValue>,
        qualifier: Option<&str>,
    ) -> DataResult<Option<String>> {
        let mut parts = Vec::with_capacity(self.predicates.len());
        for predicate in &self.predicates {
            if let Some(sql) = predicate.compile(params, qualifier)? {
                parts.push(sql);
            }
        }
        if parts.is_empty() {
            return Ok(None);
        }
        Ok(Some(parts.join(self.combinator.as_sql())))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Order {
    #[default]
    Asc,
    Desc,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Column {
    Name(String),
    Expr { expr: Expr, alias: String },
}

/// SELECT statement for a single table.
#[derive(Debug, Clone, Default)]
pub struct Select {
    columns: Vec<Column>,
    filter: Where,
    order: Vec<(String, Order)>,
    group: Vec<String>,
    having: Where,
    limit: Option<u64>,
    offset: Option<u64>,
}

impl Select {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn columns<S: Into<String>>(mut self, columns: impl IntoIterator<Item = S>) -> Self {
        self.columns
            .extend(columns.into_iter().map(|c| Column::Name(c.into())));
        self
    }

    pub fn column_expr(mut self, expr: Expr, alias: impl Into<String>) -> Self {
        self.columns.push(Column::Expr {
            expr,
            alias: alias.into(),
        });
        self
    }

    pub fn filter(mut self, filter: Where) -> Self {
        self.filter = filter;
        self
    }

    pub fn order_by(mut self, column: impl Into<String>, order: Order) -> Self {
        self.order.push((column.into(), order));
        self
    }

    pub fn group_by(mut self, column: impl Into<String>) -> Self {
        self.group.push(column.into());
        self
    }

    pub fn having(mut self, having: Where) -> Self {
        self.having = having;
        self
    }

    pub fn limit(mut self, limit: u64) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn offset(mut self, offset: u64) -> Self {
        self.offset = Some(offset);
        self
    }

    pub fn filter_ref(&self) -> &Where {
        &self.filter
    }

    pub(crate) fn to_sql(&self, table: &str, params: &mut Vec<SqlValue>) -> DataResult<String> {
        let columns = if self.columns.is_empty() {
            "*".to_string()
        } else {
            self.columns
                .iter()
                .map(|c| match c {
                    Column::Name(name) => quote_identifier(name),
                    Column::Expr { expr, alias } => {
                        Ok(format!("{} AS {}", expr.as_str(), quote_identifier(alias)?))
                    }
                })
                .collect::<DataResult<Vec<_>>>()?
                .join(", ")
        };
        let mut sql = format!("SELECT {} FROM {}", columns, quote_identifier(table)?);
        if let Some(filter) = self.filter.compile(params)? {
            sql.push_str(" WHERE ");
            sql.push_str(&filter);
        }
        if !self.group.is_empty() {
            let group = self
                .group
                .iter()
                .map(|g| quote_identifier(g))
                .collect::<DataResult<Vec<_>>>()?;
            sql.push_str(" GROUP BY ");
            sql.push_str(&group.join(", "));
        }
        if let Some(having) = self.having.compile(params)? {
            sql.push_str(" HAVING ");
            sql.push_str(&having);
        }
        if !self.order.is_empty() {
            let order = self
                .order
                .iter()
                .map(|(col, dir)| {
                    let dir = match dir {
                        Order::Asc => "ASC",
                        Order::Desc => "DESC",
                    };
                    Ok(format!("{} {}", quote_identifier(col)?, dir))
                })
                .collect::<DataResult<Vec<_>>>()?;
            sql.push_str(" ORDER BY ");
            sql.push_str(&order.join(", "));
        }
        match (self.limit, self.offset) {
            (Some(limit), Some(offset)) => sql.push_str(&format!(" LIMIT {} OFFSET {}", limit, offset)),
            (Some(limit), None) => sql.push_str(&format!(" LIMIT {}", limit)),
            (None, Some(offset)) => sql.push_str(&format!(" LIMIT -1 OFFSET {}", offset)),
            (None, None) => {}
        }
        Ok(sql)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Assignment {
    Value(Value),
    Expr(Expr),
}

/// Column assignments for UPDATE.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Set {
    entries: Vec<(String, Assignment)>,
}

impl Set {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_map<K: Into<String>>(values: impl IntoIterator<Item = (K, Value)>) -> Self {
        values
            .into_iter()
            .fold(Self::new(), |set, (k, v)| set.value(k, v))
    }

    pub fn value(mut self, column: impl Into<String>, value: impl Into<Value>) -> Self {
        self.entries
            .push((column.into(), Assignment::Value(value.into())));
        self
    }

    pub fn expr(mut self, column: impl Into<String>, expr: Expr) -> Self {
        self.entries.push((column.into(), Assignment::Expr(expr)));
        self
    }

    pub fn get(&self, column: &str) -> Option<&Assignment> {
        self.entries
            .iter()
            .find(|(c, _)| c == column)
            .map(|(_, a)| a)
    }

    pub fn columns(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|(c, _)| c.as_str())
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Copy with every plain value passed through `f`; expressions are kept.
    pub(crate) fn map_values(&self, f: impl Fn(&str, &Value) -> Value) -> Set {
        Set {
            entries: self
                .entries
                .iter()
                .map(|(column, assignment)| {
                    let assignment = match assignment {
                        Assignment::Value(v) => Assignment::Value(f(column, v)),
                        Assignment::Expr(e) => Assignment::Expr(e.clone()),
                    };
                    (column.clone(), assignment)
                })
                .collect(),
        }
    }

    pub(crate) fn compile(&self, params: &mut Vec<SqlValue>) -> DataResult<String> {
        if self.entries.is_empty() {
            return Err(DataError::config("update without assignments"));
        }
        let parts = self
            .entries
            .iter()
            .map(|(column, assignment)| {
                let col = quote_identifier(column)?;
                Ok(match assignment {
                    Assignment::Value(v) => {
                        params.push(to_sql(v));
                        format!("{} = ?", col)
                    }
                    Assignment::Expr(e) => format!("{} = {}", col, e.as_str()),
                })
            })
            .collect::<DataResult<Vec<_>>>()?;
        Ok(parts.join(", "))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum JoinKind {
    #[default]
    Inner,
    Left,
}

/// Join used to narrow an UPDATE. `on` is trusted SQL.
#[derive(Debug, Clone, PartialEq)]
pub struct Join {
    pub table: String,
    pub on: String,
    pub kind: JoinKind,
}

impl Join {
    pub fn inner(table: impl Into<String>, on: impl Into<String>) -> Self {
        Self {
            table: table.into(),
            on: on.into(),
            kind: JoinKind::Inner,
        }
    }

    pub fn left(table: impl Into<String>, on: impl Into<String>) -> Self {
        Self {
            table: table.into(),
            on: on.into(),
            kind: JoinKind::Left,
        }
    }

    pub(crate) fn to_sql(&self) -> DataResult<String> {
        let keyword = match self.kind {
            JoinKind::Inner => "INNER JOIN",
            JoinKind::Left => "LEFT JOIN",
        };
        Ok(format!("{} {} ON {}", keyword, quote_identifier(&self.table)?, self.on))
    }
}
