use super::analysis::FirstSets;
use super::pattern::{PatternEngine, RegexPatternEngine};
use super::validate::validate_definitions;
use super::{ChoiceKind, Pattern, Rhs, Rule, RuleId, RuleKind, RuleSet, TerminalKind};
use crate::automaton::AutomatonCache;
use crate::error::RuleSetError;
use compact_str::{CompactString, format_compact};
use hashbrown::HashMap;
use lasso::Rodeo;
use std::sync::Arc;

/// Grammar expression, the input to [`RuleSetBuilder`].
#[derive(Debug, Clone)]
pub enum RuleExpr {
    Empty,
    Literal(CompactString),
    Pattern(CompactString),
    /// Reference to a named rule
    Ref(CompactString),
    Concatenation(Vec<RuleExpr>),
    Choice {
        kind: ChoiceKind,
        options: Vec<RuleExpr>,
    },
    Optional(Box<RuleExpr>),
    List {
        item: Box<RuleExpr>,
        min: usize,
        max: Option<usize>,
    },
    SeparatedList {
        item: Box<RuleExpr>,
        separator: Box<RuleExpr>,
        min: usize,
        max: Option<usize>,
    },
    /// The named rule `goal` of another rule set, matched as one terminal
    Embedded {
        rule_set: Arc<RuleSet>,
        goal: CompactString,
    },
}

impl RuleExpr {
    #[must_use]
    pub fn literal(text: impl Into<CompactString>) -> Self {
        Self::Literal(text.into())
    }

    #[must_use]
    pub fn pattern(source: impl Into<CompactString>) -> Self {
        Self::Pattern(source.into())
    }

    #[must_use]
    pub fn rule(name: impl Into<CompactString>) -> Self {
        Self::Ref(name.into())
    }

    #[must_use]
    pub fn seq(items: impl IntoIterator<Item = Self>) -> Self {
        Self::Concatenation(items.into_iter().collect())
    }

    #[must_use]
    pub fn choice(kind: ChoiceKind, options: impl IntoIterator<Item = Self>) -> Self {
        Self::Choice {
            kind,
            options: options.into_iter().collect(),
        }
    }

    #[must_use]
    pub fn longest(options: impl IntoIterator<Item = Self>) -> Self {
        Self::choice(ChoiceKind::LongestMatch, options)
    }

    #[must_use]
    pub fn priority(options: impl IntoIterator<Item = Self>) -> Self {
        Self::choice(ChoiceKind::Priority, options)
    }

    #[must_use]
    pub fn ambiguous(options: impl IntoIterator<Item = Self>) -> Self {
        Self::choice(ChoiceKind::Ambiguous, options)
    }

    #[must_use]
    pub fn optional(item: Self) -> Self {
        Self::Optional(Box::new(item))
    }

    /// Zero or more.
    #[must_use]
    pub fn many(item: Self) -> Self {
        Self::list(item, 0, None)
    }

    /// One or more.
    #[must_use]
    pub fn many1(item: Self) -> Self {
        Self::list(item, 1, None)
    }

    #[must_use]
    pub fn list(item: Self, min: usize, max: Option<usize>) -> Self {
        Self::List {
            item: Box::new(item),
            min,
            max,
        }
    }

    #[must_use]
    pub fn separated(item: Self, separator: Self, min: usize, max: Option<usize>) -> Self {
        Self::SeparatedList {
            item: Box::new(item),
            separator: Box::new(separator),
            min,
            max,
        }
    }

    #[must_use]
    pub fn embedded(rule_set: Arc<RuleSet>, goal: impl Into<CompactString>) -> Self {
        Self::Embedded {
            rule_set,
            goal: goal.into(),
        }
    }

    fn group_kind(&self) -> &'static str {
        match self {
            Self::Concatenation(_) => "seq",
            Self::Choice { .. } => "choice",
            Self::Optional(_) => "opt",
            Self::List { .. } => "list",
            Self::SeparatedList { .. } => "slist",
            _ => "item",
        }
    }
}

#[derive(Debug, Clone)]
pub(crate) struct Definition {
    pub(crate) name: CompactString,
    pub(crate) expr: RuleExpr,
    pub(crate) is_skip: bool,
}

/// Fluent builder for [`RuleSet`]s.
///
/// Rules may reference each other in any order. The first rule declared that
/// is not a skip rule is the default goal.
pub struct RuleSetBuilder {
    name: CompactString,
    definitions: Vec<Definition>,
    pattern_engine: Arc<dyn PatternEngine>,
}

impl RuleSetBuilder {
    #[must_use]
    pub fn new(name: impl Into<CompactString>) -> Self {
        Self {
            name: name.into(),
            definitions: Vec::new(),
            pattern_engine: Arc::new(RegexPatternEngine),
        }
    }

    #[must_use]
    pub fn rule(mut self, name: impl Into<CompactString>, expr: RuleExpr) -> Self {
        self.definitions.push(Definition {
            name: name.into(),
            expr,
            is_skip: false,
        });
        self
    }

    /// Declares a skip terminal, matched between any two terminals and kept
    /// out of the tree's children.
    #[must_use]
    pub fn skip(mut self, name: impl Into<CompactString>, expr: RuleExpr) -> Self {
        self.definitions.push(Definition {
            name: name.into(),
            expr,
            is_skip: true,
        });
        self
    }

    /// Replaces the engine used to compile pattern terminals.
    #[must_use]
    pub fn pattern_engine(mut self, engine: Arc<dyn PatternEngine>) -> Self {
        self.pattern_engine = engine;
        self
    }

    /// Compiles the definitions.
    ///
    /// # Errors
    ///
    /// Returns a [`RuleSetError`] for duplicate or dangling rule names,
    /// illegal list multiplicities, skip rules that are not terminals, and
    /// patterns the engine rejects.
    pub fn build(self) -> Result<Arc<RuleSet>, RuleSetError> {
        validate_definitions(&self.name, &self.definitions)?;

        let mut compiler = Compiler {
            engine: self.pattern_engine.as_ref(),
            drafts: Vec::new(),
            names: HashMap::default(),
            literals: HashMap::default(),
            patterns: HashMap::default(),
            groups: 0,
        };

        let declared: Vec<RuleId> = self
            .definitions
            .iter()
            .map(|definition| {
                let id = compiler.allocate(definition.name.clone(), false, definition.is_skip);
                compiler.names.insert(definition.name.clone(), id);
                id
            })
            .collect();

        for (definition, id) in self.definitions.iter().zip(&declared) {
            let kind = compiler.named(definition)?;
            compiler.drafts[id.index()].kind = kind;
        }

        let mut goals = HashMap::default();
        for (definition, id) in self.definitions.iter().zip(&declared) {
            if definition.is_skip {
                continue;
            }
            let goal = compiler.allocate(format_compact!("§goal§{}", definition.name), true, false);
            compiler.drafts[goal.index()].kind = RuleKind::NonTerminal(Rhs::Goal { item: *id });
            goals.insert(*id, goal);
        }
        let end_of_text = compiler.allocate("<EOT>".into(), true, false);
        compiler.drafts[end_of_text.index()].kind = RuleKind::Terminal(TerminalKind::EndOfText);

        let rules: Vec<Rule> = compiler
            .drafts
            .into_iter()
            .enumerate()
            .map(|(index, draft)| Rule {
                id: RuleId::new(u32::try_from(index).unwrap_or(u32::MAX)),
                tag: draft.tag,
                kind: draft.kind,
                is_skip: draft.is_skip,
                is_pseudo: draft.is_pseudo,
            })
            .collect();

        let mut interner = Rodeo::new();
        let mut by_name = HashMap::default();
        for id in &declared {
            let spur = interner.get_or_intern(rules[id.index()].tag());
            by_name.insert(spur, *id);
        }

        let skip_terminals = rules
            .iter()
            .filter(|rule| rule.is_skip())
            .map(Rule::id)
            .collect();
        let non_skip_terminals = rules
            .iter()
            .filter(|rule| {
                !rule.is_skip()
                    && matches!(
                        rule.terminal(),
                        Some(TerminalKind::Literal(_) | TerminalKind::Pattern(_) | TerminalKind::Embedded { .. })
                    )
            })
            .map(Rule::id)
            .collect();
        let has_embedded = rules.iter().any(Rule::is_embedded);
        let first = FirstSets::compute(&rules);

        log::debug!(
            "compiled rule set '{}': {} rules ({} declared)",
            self.name,
            rules.len(),
            declared.len()
        );

        Ok(Arc::new(RuleSet {
            name: self.name,
            rules,
            interner: interner.into_reader(),
            by_name,
            declared,
            goals,
            skip_terminals,
            non_skip_terminals,
            end_of_text,
            first,
            has_embedded,
            automata: AutomatonCache::new(),
        }))
    }
}

struct Draft {
    tag: CompactString,
    kind: RuleKind,
    is_skip: bool,
    is_pseudo: bool,
}

struct Compiler<'a> {
    engine: &'a dyn PatternEngine,
    drafts: Vec<Draft>,
    names: HashMap<CompactString, RuleId, ahash::RandomState>,
    literals: HashMap<CompactString, RuleId, ahash::RandomState>,
    patterns: HashMap<CompactString, RuleId, ahash::RandomState>,
    groups: usize,
}

impl Compiler<'_> {
    fn allocate(&mut self, tag: CompactString, is_pseudo: bool, is_skip: bool) -> RuleId {
        let id = RuleId::new(u32::try_from(self.drafts.len()).unwrap_or(u32::MAX));
        self.drafts.push(Draft {
            tag,
            // replaced once the rule's body is compiled
            kind: RuleKind::Terminal(TerminalKind::Empty),
            is_skip,
            is_pseudo,
        });
        id
    }

    fn named(&mut self, definition: &Definition) -> Result<RuleKind, RuleSetError> {
        let owner = &definition.name;
        Ok(match &definition.expr {
            RuleExpr::Empty => RuleKind::Terminal(TerminalKind::Empty),
            RuleExpr::Literal(text) if text.is_empty() => RuleKind::Terminal(TerminalKind::Empty),
            RuleExpr::Literal(text) => RuleKind::Terminal(TerminalKind::Literal(text.clone())),
            RuleExpr::Pattern(source) => {
                RuleKind::Terminal(TerminalKind::Pattern(self.compile_pattern(owner, source)?))
            }
            RuleExpr::Embedded { rule_set, goal } => {
                RuleKind::Terminal(self.embedded(owner, rule_set, goal)?)
            }
            expr => RuleKind::NonTerminal(self.rhs(owner, expr)?),
        })
    }

    fn rhs(&mut self, owner: &CompactString, expr: &RuleExpr) -> Result<Rhs, RuleSetError> {
        Ok(match expr {
            RuleExpr::Concatenation(_) => Rhs::Concatenation(self.sequence(owner, expr)?),
            RuleExpr::Choice { kind, options } => {
                let options = options
                    .iter()
                    .map(|option| self.sequence(owner, option))
                    .collect::<Result<Vec<_>, _>>()?;
                Rhs::Choice {
                    kind: *kind,
                    options,
                }
            }
            RuleExpr::Optional(item) => Rhs::Optional {
                item: self.item(owner, item)?,
                empty: self.empty(),
            },
            RuleExpr::List { item, min, max } => {
                let item = self.item(owner, item)?;
                let empty = (*min == 0).then(|| self.empty());
                Rhs::List {
                    item,
                    min: *min,
                    max: *max,
                    empty,
                }
            }
            RuleExpr::SeparatedList {
                item,
                separator,
                min,
                max,
            } => {
                let item = self.item(owner, item)?;
                let separator = self.item(owner, separator)?;
                let empty = (*min == 0).then(|| self.empty());
                Rhs::SeparatedList {
                    item,
                    separator,
                    min: *min,
                    max: *max,
                    empty,
                }
            }
            expr => Rhs::Concatenation(vec![self.item(owner, expr)?]),
        })
    }

    /// Items of a concatenation or of one choice option.
    fn sequence(&mut self, owner: &CompactString, expr: &RuleExpr) -> Result<Vec<RuleId>, RuleSetError> {
        match expr {
            RuleExpr::Concatenation(items) if !items.is_empty() => items
                .iter()
                .map(|item| self.item(owner, item))
                .collect(),
            RuleExpr::Concatenation(_) | RuleExpr::Empty => Ok(vec![self.empty()]),
            expr => Ok(vec![self.item(owner, expr)?]),
        }
    }

    fn item(&mut self, owner: &CompactString, expr: &RuleExpr) -> Result<RuleId, RuleSetError> {
        match expr {
            RuleExpr::Empty => Ok(self.empty()),
            RuleExpr::Literal(text) if text.is_empty() => Ok(self.empty()),
            RuleExpr::Literal(text) => Ok(self.literal(text)),
            RuleExpr::Pattern(source) => self.pattern(owner, source),
            RuleExpr::Ref(name) => {
                self.names
                    .get(name)
                    .copied()
                    .ok_or_else(|| RuleSetError::UnresolvedReference {
                        rule: owner.clone(),
                        reference: name.clone(),
                    })
            }
            RuleExpr::Embedded { rule_set, goal } => {
                let kind = self.embedded(owner, rule_set, goal)?;
                let id = self.allocate(format_compact!("{}::{}", rule_set.name(), goal), true, false);
                self.drafts[id.index()].kind = RuleKind::Terminal(kind);
                Ok(id)
            }
            group => {
                self.groups += 1;
                let tag = format_compact!("§{}§{}{}", owner, group.group_kind(), self.groups);
                let id = self.allocate(tag, true, false);
                let rhs = self.rhs(owner, group)?;
                self.drafts[id.index()].kind = RuleKind::NonTerminal(rhs);
                Ok(id)
            }
        }
    }

    fn empty(&mut self) -> RuleId {
        let id = self.allocate("<EMPTY>".into(), true, false);
        self.drafts[id.index()].kind = RuleKind::Terminal(TerminalKind::Empty);
        id
    }

    fn literal(&mut self, text: &CompactString) -> RuleId {
        if let Some(id) = self.literals.get(text) {
            return *id;
        }
        let id = self.allocate(format_compact!("'{}'", text), true, false);
        self.drafts[id.index()].kind = RuleKind::Terminal(TerminalKind::Literal(text.clone()));
        self.literals.insert(text.clone(), id);
        id
    }

    fn pattern(&mut self, owner: &CompactString, source: &CompactString) -> Result<RuleId, RuleSetError> {
        if let Some(id) = self.patterns.get(source) {
            return Ok(*id);
        }
        let pattern = self.compile_pattern(owner, source)?;
        let id = self.allocate(format_compact!("\"{}\"", source), true, false);
        self.drafts[id.index()].kind = RuleKind::Terminal(TerminalKind::Pattern(pattern));
        self.patterns.insert(source.clone(), id);
        Ok(id)
    }

    fn compile_pattern(&self, owner: &CompactString, source: &CompactString) -> Result<Pattern, RuleSetError> {
        let matcher = self
            .engine
            .compile(source)
            .map_err(|err| RuleSetError::InvalidPattern {
                rule: owner.clone(),
                pattern: source.clone(),
                message: err.0,
            })?;
        Ok(Pattern {
            source: source.clone(),
            matcher,
        })
    }

    fn embedded(
        &self,
        owner: &CompactString,
        rule_set: &Arc<RuleSet>,
        goal: &CompactString,
    ) -> Result<TerminalKind, RuleSetError> {
        let goal_id = rule_set
            .find_rule(goal)
            .ok_or_else(|| RuleSetError::UnknownEmbeddedGoal {
                rule: owner.clone(),
                rule_set: rule_set.name().into(),
                goal: goal.clone(),
            })?;
        Ok(TerminalKind::Embedded {
            rule_set: Arc::clone(rule_set),
            goal: goal_id,
        })
    }
}
