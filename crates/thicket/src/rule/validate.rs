use super::builder::{Definition, RuleExpr};
use crate::error::RuleSetError;
use compact_str::CompactString;
use hashbrown::HashSet;

/// Checks a set of definitions before compilation: duplicate names, dangling
/// references, skip rules that are not terminals, and list multiplicities.
///
/// # Errors
///
/// Returns the first problem found, in declaration order.
pub(crate) fn validate_definitions(
    set_name: &str,
    definitions: &[Definition],
) -> Result<(), RuleSetError> {
    if definitions.is_empty() {
        return Err(RuleSetError::EmptyRuleSet {
            name: set_name.into(),
        });
    }

    let mut defined: HashSet<&str, ahash::RandomState> = HashSet::default();
    for definition in definitions {
        if !defined.insert(definition.name.as_str()) {
            return Err(RuleSetError::DuplicateRule {
                name: definition.name.clone(),
            });
        }
    }

    for definition in definitions {
        if definition.is_skip
            && !matches!(definition.expr, RuleExpr::Literal(_) | RuleExpr::Pattern(_))
        {
            return Err(RuleSetError::SkipNotTerminal {
                rule: definition.name.clone(),
            });
        }
        check_expr(&definition.name, &definition.expr, &defined)?;
    }
    Ok(())
}

fn check_expr(
    owner: &CompactString,
    expr: &RuleExpr,
    defined: &HashSet<&str, ahash::RandomState>,
) -> Result<(), RuleSetError> {
    let mut pending = vec![expr];
    while let Some(expr) = pending.pop() {
        match expr {
            RuleExpr::Ref(name) => {
                if !defined.contains(name.as_str()) {
                    return Err(RuleSetError::UnresolvedReference {
                        rule: owner.clone(),
                        reference: name.clone(),
                    });
                }
            }
            RuleExpr::Concatenation(items) => pending.extend(items.iter().rev()),
            RuleExpr::Choice { options, .. } => {
                if options.is_empty() {
                    return Err(RuleSetError::EmptyChoice {
                        rule: owner.clone(),
                    });
                }
                pending.extend(options.iter().rev());
            }
            RuleExpr::Optional(item) => pending.push(item.as_ref()),
            RuleExpr::List { item, min, max } => {
                check_multiplicity(owner, *min, *max)?;
                pending.push(item.as_ref());
            }
            RuleExpr::SeparatedList {
                item,
                separator,
                min,
                max,
            } => {
                check_multiplicity(owner, *min, *max)?;
                pending.push(separator.as_ref());
                pending.push(item.as_ref());
            }
            RuleExpr::Embedded { rule_set, goal } => {
                if rule_set.find_rule(goal).is_none() {
                    return Err(RuleSetError::UnknownEmbeddedGoal {
                        rule: owner.clone(),
                        rule_set: rule_set.name().into(),
                        goal: goal.clone(),
                    });
                }
            }
            RuleExpr::Empty | RuleExpr::Literal(_) | RuleExpr::Pattern(_) => {}
        }
    }
    Ok(())
}

pub(crate) fn check_multiplicity(
    rule: &CompactString,
    min: usize,
    max: Option<usize>,
) -> Result<(), RuleSetError> {
    match max {
        Some(max) if max == 0 || max < min => Err(RuleSetError::IllegalMultiplicity {
            rule: rule.clone(),
            min,
            max: Some(max),
        }),
        _ => Ok(()),
    }
}
