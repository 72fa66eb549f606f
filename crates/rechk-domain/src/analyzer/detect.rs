//! Backtracking hazard detection over the parsed syntax tree.

use super::ast::{CharSet, Node, NodeKind, Span};
use super::Flags;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Complexity {
    Polynomial,
    Exponential,
}

/// A construct that makes matching super-linear.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct Finding {
    pub complexity: Complexity,
    /// Region of the source responsible for the blow-up.
    pub span: Span,
    /// String that each extra repetition of the attack adds.
    pub pump: String,
}

/// Returns the findings of the worst complexity class, in source order.
pub(crate) fn detect(root: &Node, flags: &Flags) -> Vec<Finding> {
    let mut findings = Vec::new();
    walk(root, &mut findings);
    if !flags.sticky {
        leading_repeat(root, &mut findings);
    }

    let worst = if findings
        .iter()
        .any(|f| f.complexity == Complexity::Exponential)
    {
        Complexity::Exponential
    } else {
        Complexity::Polynomial
    };
    findings.retain(|f| f.complexity == worst);
    findings.sort_by_key(|f| (f.span.start, f.span.end));
    findings.dedup_by_key(|f| f.span);
    findings
}

fn walk(node: &Node, findings: &mut Vec<Finding>) {
    match &node.kind {
        NodeKind::Repeat { node: body, max, .. } => {
            if max.is_none() {
                unbounded_repeat(node, body, findings);
            }
            walk(body, findings);
        }
        NodeKind::Group(_, inner) => walk(inner, findings),
        NodeKind::Concat(items) => {
            adjacent_repeats(&node.sequence(), findings);
            for item in items {
                walk(item, findings);
            }
        }
        NodeKind::Alternation(alts) => {
            for alt in alts {
                walk(alt, findings);
            }
        }
        NodeKind::Empty | NodeKind::Char(_) | NodeKind::Assertion(_) | NodeKind::Backreference => {}
    }
}

/// Exponential shapes rooted at an unbounded repeat over `body`.
fn unbounded_repeat(repeat: &Node, body: &Node, findings: &mut Vec<Finding>) {
    let inner = body.unwrap_groups();

    if matches!(inner.kind, NodeKind::Backreference) {
        findings.push(Finding {
            complexity: Complexity::Exponential,
            span: repeat.span,
            pump: "a".to_string(),
        });
        return;
    }

    if let NodeKind::Alternation(alts) = &inner.kind {
        if let Some(finding) = ambiguous_alternatives(inner.span, alts) {
            findings.push(finding);
        }
        for alt in alts {
            if let Some(finding) = nested_repeat(&alt.sequence()) {
                findings.push(finding);
            }
        }
        return;
    }

    if let Some(finding) = nested_repeat(&body.sequence()) {
        findings.push(finding);
    }
}

/// An unbounded repeat inside the body of another whose neighbours either
/// vanish or can eat the same characters: `(a+)+`, `(\w+\s?)*`.
fn nested_repeat(seq: &[&Node]) -> Option<Finding> {
    for (idx, item) in seq.iter().enumerate() {
        let Some(repeated) = item.as_unbounded_repeat() else {
            continue;
        };
        let chars = item.all_chars();
        if chars.is_empty() {
            continue;
        }

        let mut rest = seq
            .iter()
            .enumerate()
            .filter(|&(i, _)| i != idx)
            .map(|(_, node)| *node);
        let rest_nullable = rest.clone().all(Node::nullable);
        let shared = rest.find_map(|node| chars.common_sample(&node.all_chars()));

        let pump = match shared {
            Some(c) => c.to_string(),
            None if rest_nullable => sample_string(repeated),
            None => continue,
        };
        return Some(Finding {
            complexity: Complexity::Exponential,
            span: item.span,
            pump,
        });
    }
    None
}

/// Two alternatives that can match the same text: `(a|a)*`, `(\d|\w)+`.
fn ambiguous_alternatives(span: Span, alts: &[Node]) -> Option<Finding> {
    for (i, left) in alts.iter().enumerate() {
        for right in &alts[i + 1..] {
            let first = left.first_chars().common_sample(&right.first_chars());
            let Some(first) = first else {
                continue;
            };
            if !left.last_chars().overlaps(&right.last_chars()) {
                continue;
            }

            let mut pump = sample_string(left);
            if !pump.is_empty() {
                pump.replace_range(..pump.chars().next().map_or(0, char::len_utf8), "");
            }
            pump.insert(0, first);
            return Some(Finding {
                complexity: Complexity::Exponential,
                span,
                pump,
            });
        }
    }
    None
}

/// Unbounded repeats that follow each other, possibly with optional items in
/// between, and share characters: `\d+\d+`, `.*,?.*`.
fn adjacent_repeats(seq: &[&Node], findings: &mut Vec<Finding>) {
    for (i, left) in seq.iter().enumerate() {
        if left.as_unbounded_repeat().is_none() {
            continue;
        }
        let chars = left.all_chars();
        for right in &seq[i + 1..] {
            if right.as_unbounded_repeat().is_some() {
                if let Some(c) = chars.common_sample(&right.all_chars()) {
                    findings.push(Finding {
                        complexity: Complexity::Polynomial,
                        span: left.span.to(right.span),
                        pump: c.to_string(),
                    });
                    break;
                }
            }
            if !right.nullable() {
                break;
            }
        }
    }
}

/// An unanchored pattern that begins with an unbounded repeat followed by
/// something that can fail is retried from every start position: `\s+$`.
fn leading_repeat(root: &Node, findings: &mut Vec<Finding>) {
    let alternatives: Vec<&Node> = match &root.unwrap_groups().kind {
        NodeKind::Alternation(alts) => alts.iter().collect(),
        _ => vec![root],
    };
    for alt in alternatives {
        let seq = alt.sequence();
        let Some((first, rest)) = seq.split_first() else {
            continue;
        };
        if first.as_unbounded_repeat().is_none() || rest.iter().all(|n| n.always_matches()) {
            continue;
        }
        if let Some(c) = first.all_chars().sample() {
            findings.push(Finding {
                complexity: Complexity::Polynomial,
                span: first.span,
                pump: c.to_string(),
            });
        }
    }
}

/// A short string matched by the node, ignoring lookarounds and assertions.
pub(crate) fn sample_string(node: &Node) -> String {
    let mut out = String::new();
    push_sample(node, &mut out);
    out
}

fn push_sample(node: &Node, out: &mut String) {
    match &node.kind {
        NodeKind::Char(set) => {
            if let Some(c) = set.sample() {
                out.push(c);
            }
        }
        NodeKind::Group(super::ast::GroupKind::Lookaround, _) => {}
        NodeKind::Group(_, inner) => push_sample(inner, out),
        NodeKind::Concat(items) => {
            for item in items {
                push_sample(item, out);
            }
        }
        NodeKind::Alternation(alts) => {
            if let Some(alt) = alts.first() {
                push_sample(alt, out);
            }
        }
        NodeKind::Repeat { node, min, .. } => {
            for _ in 0..(*min).max(1).min(8) {
                push_sample(node, out);
            }
        }
        NodeKind::Empty | NodeKind::Assertion(_) | NodeKind::Backreference => {}
    }
}

/// Characters used by the pump, so the suffix can avoid them.
pub(crate) fn pump_chars(pump: &str) -> CharSet {
    pump.chars()
        .fold(CharSet::empty(), |acc, c| acc.union(&CharSet::single(c)))
}
