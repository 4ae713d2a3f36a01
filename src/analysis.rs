//! Dependency analysis over the message/term reference graph.
//!
//! The graph is data, not pointer topology: each entry maps to the set of
//! namespace-prefixed keys (`msg:foo`, `term:bar`) it references. Three
//! analyses run over it:
//!
//! - cycle detection, via iterative DFS (an explicit stack; adversarial
//!   chains must not overflow the call stack),
//! - longest-chain measurement over the non-cyclic part of the graph,
//! - shadow detection for ids that would be dropped by first-writer-wins
//!   registration.
//!
//! Cycles are canonicalized by rotating to the lexicographically smallest
//! node (direction preserved) and deduplicated on that form.

use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};

use crate::ast::{Entry, InlineExpression, Resource};
use crate::error::{DiagnosticCode, Severity, ValidationIssue};
use crate::visitor::{walk_inline_expression, VisitDepth, VisitResult, Visitor};

/// Chains longer than this warn; paths longer than [`CHAIN_DISPLAY_LIMIT`]
/// nodes are elided in the warning text.
pub const DEFAULT_MAX_CHAIN_DEPTH: usize = 10;
const CHAIN_DISPLAY_LIMIT: usize = 10;

pub type DependencyGraph = BTreeMap<String, BTreeSet<String>>;

/// Namespace-prefixed dependency key for a message.
pub fn msg_key(id: &str) -> String {
    format!("msg:{id}")
}

/// Namespace-prefixed dependency key for a term.
pub fn term_key(id: &str) -> String {
    format!("term:{id}")
}

/// Collect the namespace-prefixed references of one entry.
pub fn entry_dependencies(entry: &Entry) -> BTreeSet<String> {
    struct RefCollector {
        depth: VisitDepth,
        refs: BTreeSet<String>,
    }
    impl Visitor for RefCollector {
        fn depth(&mut self) -> &mut VisitDepth {
            &mut self.depth
        }
        fn visit_inline_expression(&mut self, expr: &InlineExpression) -> VisitResult {
            match expr {
                InlineExpression::MessageReference { id, .. } => {
                    self.refs.insert(msg_key(&id.name));
                }
                InlineExpression::TermReference { id, .. } => {
                    self.refs.insert(term_key(&id.name));
                }
                _ => {}
            }
            walk_inline_expression(self, expr)
        }
    }

    let mut collector = RefCollector {
        depth: VisitDepth::default(),
        refs: BTreeSet::new(),
    };
    // A depth failure leaves a partial set; the parser's nesting cap makes
    // that unreachable for parsed input.
    let _ = collector.visit_entry(entry);
    collector.refs
}

/// Build the full dependency graph of a resource.
pub fn dependency_graph(resource: &Resource) -> DependencyGraph {
    let mut graph = DependencyGraph::new();
    for entry in &resource.entries {
        let key = match entry {
            Entry::Message(m) => msg_key(&m.id.name),
            Entry::Term(t) => term_key(&t.id.name),
            _ => continue,
        };
        graph.entry(key).or_default().extend(entry_dependencies(entry));
    }
    graph
}

/// Rotate a closed cycle (`[A, B, C, A]`) to start at its smallest node,
/// preserving direction. Idempotent.
pub fn canonicalize_cycle(cycle: &[String]) -> Vec<String> {
    if cycle.len() <= 1 {
        return cycle.to_vec();
    }
    let nodes = &cycle[..cycle.len() - 1];
    let min_idx = nodes
        .iter()
        .enumerate()
        .min_by(|(_, a), (_, b)| a.cmp(b))
        .map(|(i, _)| i)
        .unwrap_or(0);
    let mut rotated: Vec<String> = Vec::with_capacity(cycle.len());
    rotated.extend_from_slice(&nodes[min_idx..]);
    rotated.extend_from_slice(&nodes[..min_idx]);
    rotated.push(rotated[0].clone());
    rotated
}

/// Display form of a cycle: `A -> B -> A`.
pub fn make_cycle_key(cycle: &[String]) -> String {
    canonicalize_cycle(cycle).join(" -> ")
}

const ENTERING: bool = true;
const EXITING: bool = false;

/// Find all cycles via iterative DFS.
///
/// Each reported cycle is a closed path (last element repeats the first)
/// whose every edge exists in the graph. Deduplication happens on the
/// canonical rotation. Neighbors are walked in sorted order so output is
/// deterministic.
pub fn detect_cycles(graph: &DependencyGraph) -> Vec<Vec<String>> {
    let mut visited: HashSet<String> = HashSet::new();
    let mut cycles: Vec<Vec<String>> = Vec::new();
    let mut seen_canonical: HashSet<Vec<String>> = HashSet::new();

    for start in graph.keys() {
        if visited.contains(start) {
            continue;
        }

        let mut path: Vec<String> = Vec::new();
        let mut rec_stack: HashSet<String> = HashSet::new();
        let mut stack: Vec<(String, bool)> = vec![(start.clone(), ENTERING)];

        while let Some((node, entering)) = stack.pop() {
            if entering {
                if visited.contains(&node) {
                    continue;
                }
                visited.insert(node.clone());
                rec_stack.insert(node.clone());
                path.push(node.clone());
                stack.push((node.clone(), EXITING));

                if let Some(neighbors) = graph.get(&node) {
                    for neighbor in neighbors {
                        if !visited.contains(neighbor) {
                            stack.push((neighbor.clone(), ENTERING));
                        } else if rec_stack.contains(neighbor) {
                            if let Some(cycle_start) = path.iter().position(|n| n == neighbor) {
                                let mut cycle: Vec<String> = path[cycle_start..].to_vec();
                                cycle.push(neighbor.clone());
                                let canonical = canonicalize_cycle(&cycle);
                                if seen_canonical.insert(canonical) {
                                    cycles.push(cycle);
                                }
                            }
                        }
                    }
                }
            } else {
                path.pop();
                rec_stack.remove(&node);
            }
        }
    }

    cycles
}

/// Longest reference chain starting from each node, over edges that do not
/// participate in any cycle. Returns the longest path found.
pub fn longest_chain(graph: &DependencyGraph) -> Vec<String> {
    let cyclic: HashSet<String> = detect_cycles(graph)
        .into_iter()
        .flatten()
        .collect();

    // chain[n] = longest path starting at n (inclusive). Memoized DFS with
    // an explicit stack; the graph without cyclic nodes is a DAG. The
    // `expanded` set keeps shared subtrees (diamonds) from re-expanding.
    let mut memo: HashMap<String, Vec<String>> = HashMap::new();
    let mut expanded: HashSet<String> = HashSet::new();

    for start in graph.keys() {
        if cyclic.contains(start) || memo.contains_key(start) {
            continue;
        }
        let mut stack: Vec<(String, bool)> = vec![(start.clone(), ENTERING)];
        while let Some((node, entering)) = stack.pop() {
            if entering {
                if expanded.contains(&node) || cyclic.contains(&node) {
                    continue;
                }
                expanded.insert(node.clone());
                stack.push((node.clone(), EXITING));
                if let Some(neighbors) = graph.get(&node) {
                    for n in neighbors {
                        if !expanded.contains(n) && !cyclic.contains(n) {
                            stack.push((n.clone(), ENTERING));
                        }
                    }
                }
            } else {
                let best_child: Vec<String> = graph
                    .get(&node)
                    .map(|neighbors| {
                        neighbors
                            .iter()
                            .filter(|n| !cyclic.contains(*n))
                            .filter_map(|n| memo.get(n))
                            .max_by_key(|chain| chain.len())
                            .cloned()
                            .unwrap_or_default()
                    })
                    .unwrap_or_default();
                let mut chain = Vec::with_capacity(best_child.len() + 1);
                chain.push(node.clone());
                chain.extend(best_child);
                memo.insert(node, chain);
            }
        }
    }

    memo.into_values().max_by_key(|c| c.len()).unwrap_or_default()
}

/// Display a chain, eliding the middle when it is too long.
fn format_chain(chain: &[String]) -> String {
    if chain.len() <= CHAIN_DISPLAY_LIMIT {
        return chain.join(" -> ");
    }
    let head = &chain[..CHAIN_DISPLAY_LIMIT / 2];
    let tail = &chain[chain.len() - CHAIN_DISPLAY_LIMIT / 2..];
    format!("{} -> ... -> {}", head.join(" -> "), tail.join(" -> "))
}

/// Run all three analyses and report advisory warnings.
pub fn analyze(resource: &Resource, max_chain_depth: usize) -> Vec<ValidationIssue> {
    let graph = dependency_graph(resource);
    let mut warnings: Vec<ValidationIssue> = Vec::new();

    for cycle in detect_cycles(&graph) {
        // Self-references report as length-2 closed paths; anything shorter
        // cannot close a cycle.
        if cycle.len() < 2 {
            continue;
        }
        warnings.push(ValidationIssue {
            severity: Severity::Warning,
            code: DiagnosticCode::CircularReference,
            message: format!("reference cycle: {}", make_cycle_key(&cycle)),
            entry_id: cycle[0].clone(),
            span: None,
        });
    }

    let chain = longest_chain(&graph);
    if chain.len() > max_chain_depth {
        warnings.push(ValidationIssue {
            severity: Severity::Warning,
            code: DiagnosticCode::LongReferenceChain,
            message: format!(
                "reference chain of depth {}: {}",
                chain.len(),
                format_chain(&chain)
            ),
            entry_id: chain[0].clone(),
            span: None,
        });
    }

    warnings.extend(shadow_warnings(resource));
    warnings
}

/// Entries whose id already appeared earlier in the resource: under
/// first-writer-wins registration the later one is silently dropped.
pub fn shadow_warnings(resource: &Resource) -> Vec<ValidationIssue> {
    let mut seen: HashSet<String> = HashSet::new();
    let mut warnings = Vec::new();
    for entry in &resource.entries {
        let key = match entry {
            Entry::Message(m) => msg_key(&m.id.name),
            Entry::Term(t) => term_key(&t.id.name),
            _ => continue,
        };
        if !seen.insert(key.clone()) {
            warnings.push(ValidationIssue {
                severity: Severity::Warning,
                code: DiagnosticCode::PatternInvalid,
                message: format!("{key} is already defined; the later definition is ignored"),
                entry_id: key,
                span: None,
            });
        }
    }
    warnings
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::parse;

    fn graph(edges: &[(&str, &[&str])]) -> DependencyGraph {
        edges
            .iter()
            .map(|(from, tos)| {
                (
                    from.to_string(),
                    tos.iter().map(|t| t.to_string()).collect(),
                )
            })
            .collect()
    }

    #[test]
    fn detects_two_node_cycle() {
        let g = graph(&[("a", &["b"]), ("b", &["a"])]);
        let cycles = detect_cycles(&g);
        assert_eq!(cycles.len(), 1);
        let c = canonicalize_cycle(&cycles[0]);
        assert_eq!(c, vec!["a", "b", "a"]);
    }

    #[test]
    fn detects_self_cycle() {
        let g = graph(&[("a", &["a"])]);
        let cycles = detect_cycles(&g);
        assert_eq!(cycles.len(), 1);
        assert_eq!(cycles[0], vec!["a", "a"]);
    }

    #[test]
    fn acyclic_graph_has_no_cycles() {
        let g = graph(&[("a", &["b", "c"]), ("b", &["c"]), ("c", &[])]);
        assert!(detect_cycles(&g).is_empty());
    }

    #[test]
    fn cycles_deduplicate_by_rotation() {
        // The same 3-cycle is reachable from each of its nodes.
        let g = graph(&[("a", &["b"]), ("b", &["c"]), ("c", &["a"])]);
        let cycles = detect_cycles(&g);
        assert_eq!(cycles.len(), 1);
    }

    #[test]
    fn canonicalization_is_idempotent() {
        let cycle: Vec<String> = ["c", "a", "b", "c"].iter().map(|s| s.to_string()).collect();
        let once = canonicalize_cycle(&cycle);
        let twice = canonicalize_cycle(&once);
        assert_eq!(once, twice);
        assert_eq!(once[0], "a");
        assert_eq!(once.last().unwrap(), "a");
    }

    #[test]
    fn canonicalization_preserves_direction() {
        let forward: Vec<String> = ["a", "b", "c", "a"].iter().map(|s| s.to_string()).collect();
        let backward: Vec<String> = ["a", "c", "b", "a"].iter().map(|s| s.to_string()).collect();
        assert_ne!(canonicalize_cycle(&forward), canonicalize_cycle(&backward));
    }

    #[test]
    fn reported_cycles_are_closed_and_use_real_edges() {
        let g = graph(&[
            ("a", &["b"]),
            ("b", &["c", "d"]),
            ("c", &["a"]),
            ("d", &[]),
        ]);
        for cycle in detect_cycles(&g) {
            assert_eq!(cycle.first(), cycle.last());
            for pair in cycle.windows(2) {
                assert!(
                    g[&pair[0]].contains(&pair[1]),
                    "edge {} -> {} not in graph",
                    pair[0],
                    pair[1]
                );
            }
        }
    }

    #[test]
    fn longest_chain_measures_depth() {
        let g = graph(&[("a", &["b"]), ("b", &["c"]), ("c", &["d"]), ("d", &[])]);
        let chain = longest_chain(&g);
        assert_eq!(chain, vec!["a", "b", "c", "d"]);
    }

    #[test]
    fn longest_chain_skips_cyclic_nodes() {
        let g = graph(&[("a", &["b"]), ("b", &["a"]), ("x", &["y"]), ("y", &[])]);
        let chain = longest_chain(&g);
        assert_eq!(chain, vec!["x", "y"]);
    }

    #[test]
    fn dependencies_from_parsed_source() {
        let resource = parse("a = { b } and { -brand }\nb = plain\n-brand = Firefox\n");
        let graph = dependency_graph(&resource);
        let deps = &graph[&msg_key("a")];
        assert!(deps.contains(&msg_key("b")));
        assert!(deps.contains(&term_key("brand")));
    }

    #[test]
    fn analyze_reports_cycle_warning() {
        let resource = parse("a = { b }\nb = { a }\n");
        let warnings = analyze(&resource, DEFAULT_MAX_CHAIN_DEPTH);
        assert!(warnings
            .iter()
            .any(|w| w.code == DiagnosticCode::CircularReference));
    }

    #[test]
    fn analyze_reports_long_chain() {
        let mut src = String::new();
        for i in 0..12 {
            src.push_str(&format!("m{i} = {{ m{} }}\n", i + 1));
        }
        src.push_str("m12 = end\n");
        let warnings = analyze(&parse(&src), 5);
        let chain = warnings
            .iter()
            .find(|w| w.code == DiagnosticCode::LongReferenceChain)
            .expect("chain warning");
        assert!(chain.message.contains("..."), "long chains are elided: {}", chain.message);
    }

    #[test]
    fn analyze_reports_shadows() {
        let resource = parse("a = one\na = two\n");
        let warnings = analyze(&resource, DEFAULT_MAX_CHAIN_DEPTH);
        assert!(warnings.iter().any(|w| w.message.contains("already defined")));
    }

    #[test]
    fn chain_display_elides_middle() {
        let chain: Vec<String> = (0..20).map(|i| format!("n{i}")).collect();
        let formatted = format_chain(&chain);
        assert!(formatted.contains("..."));
        assert!(formatted.starts_with("n0"));
        assert!(formatted.ends_with("n19"));
    }
}
