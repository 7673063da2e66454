/// Start-condition validation and evaluation against the variable store.

use std::borrow::Cow;
use thiserror::Error;
use tracing::warn;

use crate::core::variables::VariableStore;
use crate::schema::condition::{Comparison, Condition, ConditionVariable};
use crate::schema::value::{Value, ValueError, VariableKind};

#[derive(Debug, Error, PartialEq)]
pub enum ConditionError {
    #[error("condition has {0} variables, expected exactly 2")]
    OperandCount(usize),
    #[error("condition variable reads from the store but has no name")]
    MissingName,
    #[error("literal condition variable has no value")]
    MissingValue,
    #[error("literal condition variable has no type")]
    MissingType,
    #[error("condition variable: {0}")]
    Value(#[from] ValueError),
    #[error("{kind} operands only support == and !=, found {comparison}")]
    OrderedEqualityKind {
        kind: VariableKind,
        comparison: Comparison,
    },
    #[error("cannot compare {left} with {right}")]
    IncompatibleKinds {
        left: VariableKind,
        right: VariableKind,
    },
}

/// Check one operand. Returns the declared kind for literals, `None` for store lookups.
fn validate_operand(operand: &ConditionVariable) -> Result<Option<VariableKind>, ConditionError> {
    if operand.from_repo {
        if operand.name().is_none() {
            return Err(ConditionError::MissingName);
        }
        if operand.raw_value().is_some() || operand.kind_name().is_some() {
            warn!(
                variable = operand.name().unwrap_or_default(),
                "condition variable reads from the store; its value and type are ignored"
            );
        }
        return Ok(None);
    }

    if operand.name().is_some() {
        warn!("literal condition variable has a name, which is ignored");
    }
    let raw = operand.raw_value().ok_or(ConditionError::MissingValue)?;
    let kind_name = operand.kind_name().ok_or(ConditionError::MissingType)?;
    let kind = VariableKind::from_name(kind_name)?;
    kind.parse(raw)?;
    Ok(Some(kind))
}

/// Static checks run when the owning conversation is loaded.
pub fn validate(condition: &Condition) -> Result<(), ConditionError> {
    if condition.variables.len() != 2 {
        return Err(ConditionError::OperandCount(condition.variables.len()));
    }
    let left = validate_operand(&condition.variables[0])?;
    let right = validate_operand(&condition.variables[1])?;

    for kind in [left, right].into_iter().flatten() {
        if kind.is_equality_only() && !condition.comparison.is_equality() {
            return Err(ConditionError::OrderedEqualityKind {
                kind,
                comparison: condition.comparison,
            });
        }
    }

    if let (Some(l), Some(r)) = (left, right) {
        if (l.is_equality_only() || r.is_equality_only()) && l != r {
            return Err(ConditionError::IncompatibleKinds { left: l, right: r });
        }
    }
    Ok(())
}

/// Cast literal operands once so evaluation does not reparse them.
pub fn prepare(condition: &mut Condition) {
    for operand in condition.variables.iter_mut().filter(|v| !v.from_repo) {
        operand.literal = match (operand.raw_value(), operand.kind_name()) {
            (Some(raw), Some(kind)) => VariableKind::from_name(kind)
                .and_then(|k| k.parse(raw))
                .ok(),
            _ => None,
        };
    }
}

fn resolve<'a>(operand: &'a ConditionVariable, variables: &'a VariableStore) -> Option<Cow<'a, Value>> {
    if operand.from_repo {
        return variables.retrieve_value(operand.name()?).map(Cow::Borrowed);
    }
    if let Some(value) = &operand.literal {
        return Some(Cow::Borrowed(value));
    }
    let kind = VariableKind::from_name(operand.kind_name()?).ok()?;
    kind.parse(operand.raw_value()?).ok().map(Cow::Owned)
}

/// Evaluate against the current store contents.
///
/// Anything that prevents a comparison (an unbound store variable, or
/// runtime kinds that cannot be compared) logs a warning and yields `false`.
pub fn evaluate(condition: &Condition, variables: &VariableStore) -> bool {
    let [lhs, rhs] = match condition.variables.as_slice() {
        [l, r] => [l, r],
        other => {
            warn!("condition has {} variables, treating it as false", other.len());
            return false;
        }
    };
    let (Some(left), Some(right)) = (resolve(lhs, variables), resolve(rhs, variables)) else {
        warn!("condition operand could not be resolved, treating it as false");
        return false;
    };

    let equality_only = left.kind().is_equality_only() || right.kind().is_equality_only();
    if equality_only && !condition.comparison.is_equality() {
        warn!(
            "cannot apply {} to {} and {}, treating it as false",
            condition.comparison,
            left.kind(),
            right.kind()
        );
        return false;
    }

    match left.compare(&right) {
        Some(ordering) => condition.comparison.holds(ordering),
        None => {
            warn!(
                "cannot compare {} with {}, treating condition as false",
                left.kind(),
                right.kind()
            );
            false
        }
    }
}

/// All conditions hold. An empty list is vacuously true.
pub fn all_hold(conditions: &[Condition], variables: &VariableStore) -> bool {
    conditions.iter().all(|c| evaluate(c, variables))
}
