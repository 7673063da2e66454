use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;

use super::value::Value;

/// The symbolic operator of a start condition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Comparison {
    #[serde(rename = ">")]
    Greater,
    #[serde(rename = "<")]
    Less,
    #[serde(rename = ">=")]
    GreaterOrEqual,
    #[serde(rename = "<=")]
    LessOrEqual,
    #[serde(rename = "==")]
    Equal,
    #[serde(rename = "!=")]
    NotEqual,
}

impl Comparison {
    pub fn symbol(&self) -> &'static str {
        match self {
            Self::Greater => ">",
            Self::Less => "<",
            Self::GreaterOrEqual => ">=",
            Self::LessOrEqual => "<=",
            Self::Equal => "==",
            Self::NotEqual => "!=",
        }
    }

    /// True for `==` and `!=`.
    pub fn is_equality(&self) -> bool {
        matches!(self, Self::Equal | Self::NotEqual)
    }

    /// Whether `lhs <op> rhs` holds given `lhs.cmp(rhs)`.
    pub fn holds(&self, ordering: Ordering) -> bool {
        match self {
            Self::Greater => ordering == Ordering::Greater,
            Self::Less => ordering == Ordering::Less,
            Self::GreaterOrEqual => ordering != Ordering::Less,
            Self::LessOrEqual => ordering != Ordering::Greater,
            Self::Equal => ordering == Ordering::Equal,
            Self::NotEqual => ordering != Ordering::Equal,
        }
    }
}

impl fmt::Display for Comparison {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.symbol())
    }
}

/// One operand of a condition: either a literal or a variable store lookup.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConditionVariable {
    #[serde(default)]
    pub from_repo: bool,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub value: Option<String>,
    #[serde(default, rename = "type")]
    pub kind: Option<String>,
    /// Literal value cast once, after the owning conversation is loaded.
    #[serde(skip)]
    pub literal: Option<Value>,
}

impl ConditionVariable {
    /// Operand reading `name` from the variable store.
    pub fn from_store(name: &str) -> Self {
        Self {
            from_repo: true,
            name: Some(name.to_string()),
            ..Self::default()
        }
    }

    /// Literal operand of the given declared type.
    pub fn literal(value: &str, kind: &str) -> Self {
        Self {
            value: Some(value.to_string()),
            kind: Some(kind.to_string()),
            ..Self::default()
        }
    }

    pub(crate) fn name(&self) -> Option<&str> {
        self.name.as_deref().filter(|s| !s.trim().is_empty())
    }

    pub(crate) fn raw_value(&self) -> Option<&str> {
        self.value.as_deref().filter(|s| !s.is_empty())
    }

    pub(crate) fn kind_name(&self) -> Option<&str> {
        self.kind.as_deref().filter(|s| !s.trim().is_empty())
    }
}

/// A start condition: two operands compared with a symbolic operator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Condition {
    #[serde(default)]
    pub variables: Vec<ConditionVariable>,
    pub comparison: Comparison,
}

impl Condition {
    pub fn new(lhs: ConditionVariable, comparison: Comparison, rhs: ConditionVariable) -> Self {
        Self {
            variables: vec![lhs, rhs],
            comparison,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn comparison_symbols_deserialize() {
        let c: Comparison = serde_json::from_str("\">=\"").unwrap();
        assert_eq!(c, Comparison::GreaterOrEqual);
        assert!(serde_json::from_str::<Comparison>("\"=>\"").is_err());
    }

    #[test]
    fn comparison_holds() {
        assert!(Comparison::GreaterOrEqual.holds(Ordering::Equal));
        assert!(!Comparison::Greater.holds(Ordering::Equal));
        assert!(Comparison::NotEqual.holds(Ordering::Less));
        assert!(Comparison::LessOrEqual.holds(Ordering::Less));
    }

    #[test]
    fn condition_from_json() {
        let json = r#"{
            "variables": [
                { "fromRepo": true, "name": "coins" },
                { "value": "10", "type": "int" }
            ],
            "comparison": ">="
        }"#;
        let condition: Condition = serde_json::from_str(json).unwrap();
        assert_eq!(condition.variables.len(), 2);
        assert!(condition.variables[0].from_repo);
        assert_eq!(condition.variables[1].kind_name(), Some("int"));
        assert!(condition.variables[1].literal.is_none());
    }
}
