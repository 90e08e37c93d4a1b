use std::fmt;

use serde::Serialize;

use crate::models::row::{MessageFlags, MessageRow};

/// Columns a timeline filter can reference.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum Column {
    Subscribed,
    Mentioned,
    Favorited,
    Directed,
    Reblogged,
    AuthorId,
    SenderId,
    LinkedUserId,
    SentDate,
}

impl Column {
    /// Qualified column name in the relational schema.
    pub fn sql_name(&self) -> &'static str {
        match self {
            Column::Subscribed => "msgofuser.subscribed",
            Column::Mentioned => "msgofuser.mentioned",
            Column::Favorited => "msgofuser.favorited",
            Column::Directed => "msgofuser.directed",
            Column::Reblogged => "msgofuser.reblogged",
            Column::AuthorId => "msg.author_id",
            Column::SenderId => "msg.sender_id",
            Column::LinkedUserId => "user.linked_user_id",
            Column::SentDate => "msg.msg_sent_date",
        }
    }

    fn value_of(&self, row: &MessageRow) -> i64 {
        let flag = |flag: MessageFlags| i64::from(row.flags.contains(flag));
        match self {
            Column::Subscribed => flag(MessageFlags::SUBSCRIBED),
            Column::Mentioned => flag(MessageFlags::MENTIONED),
            Column::Favorited => flag(MessageFlags::FAVORITED),
            Column::Directed => flag(MessageFlags::DIRECTED),
            Column::Reblogged => flag(MessageFlags::REBLOGGED),
            Column::AuthorId => id_value(row.author_id),
            Column::SenderId => id_value(row.sender_id),
            Column::LinkedUserId => id_value(row.linked_user_id),
            Column::SentDate => row.sent_date,
        }
    }
}

pub(crate) fn id_value(id: u64) -> i64 {
    i64::try_from(id).unwrap_or(i64::MAX)
}

/// A filter over the message store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum Predicate {
    Eq(Column, i64),
    /// Inclusive lower bound.
    Ge(Column, i64),
    /// Inclusive upper bound.
    Le(Column, i64),
    /// Case-insensitive substring of the message body.
    BodyContains(String),
    /// An empty conjunction matches every row.
    And(Vec<Predicate>),
    Or(Vec<Predicate>),
}

impl Predicate {
    pub fn always() -> Self {
        Predicate::And(Vec::new())
    }

    pub fn is_flag_set(column: Column) -> Self {
        Predicate::Eq(column, 1)
    }

    pub fn is_always(&self) -> bool {
        matches!(self, Predicate::And(terms) if terms.is_empty())
    }

    /// Conjunction that flattens nested `And`s and drops always-true terms.
    pub fn and(self, other: Predicate) -> Self {
        let mut terms = match self {
            Predicate::And(terms) => terms,
            single => vec![single],
        };
        match other {
            Predicate::And(more) => terms.extend(more),
            single => terms.push(single),
        }
        if terms.len() == 1 {
            terms.remove(0)
        } else {
            Predicate::And(terms)
        }
    }

    pub fn matches(&self, row: &MessageRow) -> bool {
        match self {
            Predicate::Eq(column, value) => column.value_of(row) == *value,
            Predicate::Ge(column, value) => column.value_of(row) >= *value,
            Predicate::Le(column, value) => column.value_of(row) <= *value,
            Predicate::BodyContains(text) => row.body.to_lowercase().contains(&text.to_lowercase()),
            Predicate::And(terms) => terms.iter().all(|term| term.matches(row)),
            Predicate::Or(terms) => terms.iter().any(|term| term.matches(row)),
        }
    }

    /// Renders a parameterized `WHERE` body for a relational store.
    pub fn to_selection(&self) -> Selection {
        let mut selection = Selection::default();
        self.write_sql(&mut selection, false);
        selection
    }

    fn write_sql(&self, out: &mut Selection, nested: bool) {
        let comparison = |out: &mut Selection, column: &Column, op: &str, value: &i64| {
            out.sql.push_str(column.sql_name());
            out.sql.push_str(op);
            out.sql.push('?');
            out.args.push(value.to_string());
        };
        match self {
            Predicate::Eq(column, value) => comparison(out, column, " = ", value),
            Predicate::Ge(column, value) => comparison(out, column, " >= ", value),
            Predicate::Le(column, value) => comparison(out, column, " <= ", value),
            Predicate::BodyContains(text) => {
                out.sql.push_str(BODY_COLUMN);
                out.sql.push_str(" LIKE ? ESCAPE '\\'");
                out.args.push(format!("%{}%", escape_like(text)));
            }
            Predicate::And(terms) if terms.is_empty() => out.sql.push_str("1"),
            Predicate::Or(terms) if terms.is_empty() => out.sql.push_str("0"),
            Predicate::And(terms) | Predicate::Or(terms) => {
                let joiner = if matches!(self, Predicate::And(_)) {
                    " AND "
                } else {
                    " OR "
                };
                let parenthesize = nested && terms.len() > 1;
                if parenthesize {
                    out.sql.push('(');
                }
                for (index, term) in terms.iter().enumerate() {
                    if index > 0 {
                        out.sql.push_str(joiner);
                    }
                    term.write_sql(out, true);
                }
                if parenthesize {
                    out.sql.push(')');
                }
            }
        }
    }
}

const BODY_COLUMN: &str = "msg.body";

fn escape_like(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len());
    for c in text.chars() {
        if matches!(c, '%' | '_' | '\\') {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped
}

/// SQL selection with positional `?` arguments.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Selection {
    pub sql: String,
    pub args: Vec<String>,
}

impl fmt::Display for Selection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {:?}", self.sql, self.args)
    }
}
