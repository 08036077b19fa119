// ordertail - core/filter.rs
//
// Symbol Filter: a stateless admission predicate evaluated against an
// atomically-swappable rule set. Core layer: pure logic, no I/O.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

/// Per-symbol admission rule. `price_deviation` is not consulted by the
/// core's own predicate; it is carried through for external callers per
/// the data model (§3).
#[derive(Debug, Clone, PartialEq)]
pub struct SymbolRule {
    pub symbol: String,
    pub minimum_liquidity: f64,
    pub price_deviation: f64,
}

/// An immutable rule set, replaced wholesale by `SymbolFilter::replace`.
#[derive(Debug, Clone, Default)]
pub struct RuleSet {
    rules: HashMap<String, SymbolRule>,
}

impl RuleSet {
    pub fn new(rules: impl IntoIterator<Item = SymbolRule>) -> Self {
        Self {
            rules: rules.into_iter().map(|r| (r.symbol.clone(), r)).collect(),
        }
    }

    pub fn get(&self, symbol: &str) -> Option<&SymbolRule> {
        self.rules.get(symbol)
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }
}

/// Stateless predicate over an atomically-replaceable rule set. Readers
/// obtain a consistent snapshot with a single lock-guarded `Arc` clone, so
/// an in-flight evaluation never observes a partially-replaced rule set
/// even while a writer installs a new one concurrently.
pub struct SymbolFilter {
    current: RwLock<Arc<RuleSet>>,
}

impl SymbolFilter {
    pub fn new(rules: RuleSet) -> Self {
        Self {
            current: RwLock::new(Arc::new(rules)),
        }
    }

    /// Atomically install a new rule set. Evaluations already holding a
    /// snapshot continue to see the rules they started with; only
    /// evaluations starting after this call observe the new set.
    pub fn replace(&self, rules: RuleSet) {
        let mut guard = self.current.write().expect("rule set lock poisoned");
        *guard = Arc::new(rules);
    }

    /// Take a consistent snapshot of the current rule set for one
    /// evaluation or a batch of evaluations.
    pub fn snapshot(&self) -> Arc<RuleSet> {
        Arc::clone(&self.current.read().expect("rule set lock poisoned"))
    }

    /// Admission predicate: the symbol must have a rule, and
    /// `price * size >= minimumLiquidity`.
    pub fn admits(&self, symbol: &str, price: f64, size: f64) -> bool {
        let snapshot = self.snapshot();
        match snapshot.get(symbol) {
            Some(rule) => price * size >= rule.minimum_liquidity,
            None => false,
        }
    }
}
