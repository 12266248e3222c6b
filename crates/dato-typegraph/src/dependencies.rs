//! Transitive type-dependency extraction with bounded depth.
//!
//! Seeds come from a signature's referenced symbols. The walk is
//! depth-first, tracks the minimum depth each symbol was processed at (a
//! type first seen deep and later reached shallower is re-processed), and
//! reports the frontier it refused to expand so callers can offer targeted
//! drill-down instead of dumping the whole graph into an LLM context.
//!
//! Symbols are compared by identity, never by name: two `Foo`s from
//! different files emit two different declarations.

use crate::program::{Resolution, SymbolId, TypeProgram};
use crate::signature::ReferencedType;
use std::collections::{HashMap, HashSet};

/// Sentinel accepted in `expand_types` meaning "no depth limit".
pub const EXPAND_ALL: &str = "*";

/// Options for [`extract_type_dependencies`].
#[derive(Debug, Clone)]
pub struct ExpandOptions {
    /// Maximum expansion depth; seeds sit at depth 1.
    pub max_depth: usize,
    /// Names to expand instead of the seeds ("show me only these"); the
    /// sentinel [`EXPAND_ALL`] lifts the depth limit instead.
    pub expand_types: Option<Vec<String>>,
}

impl Default for ExpandOptions {
    fn default() -> Self {
        Self {
            max_depth: 2,
            expand_types: None,
        }
    }
}

/// Result of a dependency walk.
#[derive(Debug, Clone)]
pub struct TypeExpansion {
    /// Emitted declarations, concatenated in first-visit order.
    pub expanded_types: String,
    /// Names that were referenced but not expanded because the depth cap
    /// fired; candidates for a follow-up `expand_types` request.
    pub not_expanded_types: Vec<String>,
}

/// Expands the declarations reachable from `seeds`.
#[must_use]
pub fn extract_type_dependencies(
    program: &TypeProgram,
    seeds: &[ReferencedType],
    options: &ExpandOptions,
) -> TypeExpansion {
    let unlimited = options
        .expand_types
        .as_ref()
        .is_some_and(|names| names.iter().any(|n| n == EXPAND_ALL));

    let roots: Vec<ReferencedType> = match &options.expand_types {
        Some(names) if !unlimited => names
            .iter()
            .filter_map(|name| resolve_seed_name(program, seeds, name))
            .collect(),
        _ => seeds.to_vec(),
    };

    let mut walker = Walker {
        program,
        max_depth: if unlimited { None } else { Some(options.max_depth) },
        min_depth: HashMap::new(),
        emitted: HashSet::new(),
        output: Vec::new(),
        deferred: Vec::new(),
    };

    for root in &roots {
        walker.process(&root.symbol, &root.name, 1);
    }

    let mut seen_names = HashSet::new();
    let not_expanded_types: Vec<String> = walker
        .deferred
        .iter()
        .filter(|(_, symbol)| !walker.emitted.contains(symbol))
        .filter(|(name, _)| seen_names.insert(name.clone()))
        .map(|(name, _)| name.clone())
        .collect();

    TypeExpansion {
        expanded_types: walker.output.join("\n\n"),
        not_expanded_types,
    }
}

/// Resolves an `expand_types` entry: first against the seed map (full
/// written name, then last segment), then program-wide by declaration name.
fn resolve_seed_name(
    program: &TypeProgram,
    seeds: &[ReferencedType],
    name: &str,
) -> Option<ReferencedType> {
    if let Some(seed) = seeds.iter().find(|s| s.name == name) {
        return Some(seed.clone());
    }
    if let Some(seed) = seeds
        .iter()
        .find(|s| s.name.rsplit('.').next() == Some(name))
    {
        return Some(seed.clone());
    }
    program
        .find_symbol_by_name(name)
        .map(|symbol| ReferencedType {
            name: name.to_string(),
            symbol,
        })
}

struct Walker<'a> {
    program: &'a TypeProgram,
    max_depth: Option<usize>,
    min_depth: HashMap<SymbolId, usize>,
    emitted: HashSet<SymbolId>,
    output: Vec<String>,
    deferred: Vec<(String, SymbolId)>,
}

impl Walker<'_> {
    fn process(&mut self, symbol: &SymbolId, display: &str, depth: usize) {
        if let Some(&previous) = self.min_depth.get(symbol) {
            if depth >= previous {
                return;
            }
        }
        self.min_depth.insert(symbol.clone(), depth);

        if self.max_depth.is_some_and(|cap| depth > cap) {
            self.deferred.push((display.to_string(), symbol.clone()));
            return;
        }

        let decls = self.program.decls_of(symbol);
        if decls.is_empty() {
            return;
        }

        if self.emitted.insert(symbol.clone()) {
            let text = decls
                .iter()
                .map(|d| d.text.as_str())
                .collect::<Vec<_>>()
                .join("\n");
            self.output.push(text);
        }

        // Children: every named reference of every declaration, resolved in
        // the declaring module. Unresolved references live in the TS lib or
        // an unrelated dependency and are skipped silently.
        let mut children = Vec::new();
        for decl in &decls {
            for reference in &decl.refs {
                if let Some(Resolution::Symbol(child)) =
                    self.program.resolve_ref(symbol.module, reference)
                {
                    children.push((child, reference.written()));
                }
            }
        }
        for (child, written) in children {
            self.process(&child, &written, depth + 1);
        }
    }
}
