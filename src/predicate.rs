//! Parameterized WHERE/ON clauses.
//!
//! Column names are compile-time constants and every value goes through
//! `push_bind`, so no caller-supplied text ever lands in the SQL string.

use chrono::NaiveDate;
use sqlx::{QueryBuilder, Sqlite};

#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Int(i64),
    Date(NaiveDate),
    Text(String),
}

impl From<i64> for Value {
    fn from(value: i64) -> Self {
        Self::Int(value)
    }
}

impl From<NaiveDate> for Value {
    fn from(value: NaiveDate) -> Self {
        Self::Date(value)
    }
}

impl From<&str> for Value {
    fn from(value: &str) -> Self {
        Self::Text(value.to_string())
    }
}

impl From<String> for Value {
    fn from(value: String) -> Self {
        Self::Text(value)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Op {
    Eq,
    Gte,
    Lte,
}

impl Op {
    fn as_sql(self) -> &'static str {
        match self {
            Self::Eq => " = ",
            Self::Gte => " >= ",
            Self::Lte => " <= ",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Condition {
    pub column: &'static str,
    pub op: Op,
    pub value: Value,
}

/// Conjunction of conditions. An empty predicate renders as `1 = 1`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Predicate {
    conditions: Vec<Condition>,
}

impl Predicate {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn eq(self, column: &'static str, value: impl Into<Value>) -> Self {
        self.with(column, Op::Eq, value.into())
    }

    pub fn gte(self, column: &'static str, value: impl Into<Value>) -> Self {
        self.with(column, Op::Gte, value.into())
    }

    pub fn lte(self, column: &'static str, value: impl Into<Value>) -> Self {
        self.with(column, Op::Lte, value.into())
    }

    /// Adds an equality only when a value is present.
    pub fn eq_opt(self, column: &'static str, value: Option<&str>) -> Self {
        match value {
            Some(value) => self.eq(column, value),
            None => self,
        }
    }

    fn with(mut self, column: &'static str, op: Op, value: Value) -> Self {
        self.conditions.push(Condition { column, op, value });
        self
    }

    pub fn push_to(&self, builder: &mut QueryBuilder<'_, Sqlite>) {
        if self.conditions.is_empty() {
            builder.push("1 = 1");
            return;
        }

        for (index, condition) in self.conditions.iter().enumerate() {
            if index > 0 {
                builder.push(" AND ");
            }
            builder.push(condition.column);
            builder.push(condition.op.as_sql());
            match &condition.value {
                Value::Int(value) => builder.push_bind(*value),
                Value::Date(value) => builder.push_bind(*value),
                Value::Text(value) => builder.push_bind(value.clone()),
            };
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn render(predicate: &Predicate) -> String {
        let mut builder = QueryBuilder::<Sqlite>::new("SELECT 1 FROM attendance a WHERE ");
        predicate.push_to(&mut builder);
        builder.sql().to_string()
    }

    #[test]
    fn absent_filters_are_left_out() {
        let predicate = Predicate::new()
            .eq("a.class_id", 4_i64)
            .eq_opt("c.section", None)
            .eq_opt("c.subject", Some("Calculus"));

        assert_eq!(predicate.conditions.len(), 2);
        assert_eq!(predicate.conditions[1].value, Value::Text("Calculus".to_string()));
        assert_eq!(
            render(&predicate),
            "SELECT 1 FROM attendance a WHERE a.class_id = ? AND c.subject = ?"
        );
    }

    #[test]
    fn hostile_values_stay_out_of_the_sql() {
        let predicate = Predicate::new().eq("c.section", "A' OR '1'='1");
        let sql = render(&predicate);
        assert!(!sql.contains("OR '1'"));
        assert!(sql.ends_with("c.section = ?"));
    }

    #[test]
    fn empty_predicate_matches_everything() {
        assert_eq!(
            render(&Predicate::new()),
            "SELECT 1 FROM attendance a WHERE 1 = 1"
        );
    }

    #[test]
    fn ranges_use_inclusive_bounds() {
        let from = NaiveDate::from_ymd_opt(2024, 9, 1).unwrap();
        let to = NaiveDate::from_ymd_opt(2024, 9, 30).unwrap();
        let predicate = Predicate::new().gte("a.date", from).lte("a.date", to);
        assert_eq!(
            render(&predicate),
            "SELECT 1 FROM attendance a WHERE a.date >= ? AND a.date <= ?"
        );
    }
}
