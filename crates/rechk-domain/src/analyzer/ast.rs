//! Syntax tree and character sets used by the static analyzer.

/// Half-open span of char offsets in the pattern source.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct Span {
    pub start: usize,
    pub end: usize,
}

impl Span {
    pub fn new(start: usize, end: usize) -> Self {
        Self { start, end }
    }

    /// Smallest span covering both.
    pub fn to(self, other: Span) -> Span {
        Span::new(self.start.min(other.start), self.end.max(other.end))
    }
}

/// Over-approximation of the characters a single-char matcher accepts.
///
/// A positive set lists its ranges; a negated set lists the ranges it
/// excludes. Operations err on the side of reporting overlap.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct CharSet {
    negated: bool,
    ranges: Vec<(char, char)>,
}

const SPACE_RANGES: &[(char, char)] = &[
    ('\t', '\r'),
    (' ', ' '),
    ('\u{a0}', '\u{a0}'),
    ('\u{1680}', '\u{1680}'),
    ('\u{2000}', '\u{200a}'),
    ('\u{2028}', '\u{2029}'),
    ('\u{202f}', '\u{202f}'),
    ('\u{205f}', '\u{205f}'),
    ('\u{3000}', '\u{3000}'),
    ('\u{feff}', '\u{feff}'),
];

const WORD_RANGES: &[(char, char)] = &[('0', '9'), ('A', 'Z'), ('_', '_'), ('a', 'z')];

const DIGIT_RANGES: &[(char, char)] = &[('0', '9')];

/// Characters tried, in order, when a concrete member of a set is needed.
const SAMPLE_CHARS: &[char] = &['a', '0', ' ', 'x', '_', '!', '-', '\n', '\u{0}'];

impl CharSet {
    /// The empty set.
    pub fn empty() -> Self {
        Self {
            negated: false,
            ranges: Vec::new(),
        }
    }

    /// Every character.
    pub fn any() -> Self {
        Self {
            negated: true,
            ranges: Vec::new(),
        }
    }

    pub fn single(c: char) -> Self {
        Self::from_ranges(&[(c, c)])
    }

    pub fn from_ranges(ranges: &[(char, char)]) -> Self {
        Self {
            negated: false,
            ranges: ranges.to_vec(),
        }
    }

    pub fn digit() -> Self {
        Self::from_ranges(DIGIT_RANGES)
    }

    pub fn word() -> Self {
        Self::from_ranges(WORD_RANGES)
    }

    pub fn space() -> Self {
        Self::from_ranges(SPACE_RANGES)
    }

    /// Complement of this set.
    pub fn negate(mut self) -> Self {
        self.negated = !self.negated;
        self
    }

    pub fn is_negated(&self) -> bool {
        self.negated
    }

    pub fn is_empty(&self) -> bool {
        !self.negated && self.ranges.is_empty()
    }

    pub fn contains(&self, c: char) -> bool {
        let listed = self.ranges.iter().any(|&(lo, hi)| lo <= c && c <= hi);
        listed != self.negated
    }

    /// Union with another set.
    ///
    /// Exact for two positive sets; anything involving a complement widens
    /// to [`CharSet::any`].
    pub fn union(&self, other: &CharSet) -> CharSet {
        if self.is_empty() {
            return other.clone();
        }
        if other.is_empty() {
            return self.clone();
        }
        if self.negated || other.negated {
            return CharSet::any();
        }
        let mut ranges = self.ranges.clone();
        ranges.extend_from_slice(&other.ranges);
        CharSet {
            negated: false,
            ranges,
        }
    }

    /// Returns true if some character belongs to both sets.
    pub fn overlaps(&self, other: &CharSet) -> bool {
        if self.is_empty() || other.is_empty() {
            return false;
        }
        match (self.negated, other.negated) {
            (false, false) => self.ranges.iter().any(|&(a_lo, a_hi)| {
                other
                    .ranges
                    .iter()
                    .any(|&(b_lo, b_hi)| a_lo <= b_hi && b_lo <= a_hi)
            }),
            (false, true) => !covered(&self.ranges, &other.ranges),
            (true, false) => !covered(&other.ranges, &self.ranges),
            (true, true) => true,
        }
    }

    /// Adds the other ASCII case of every listed letter.
    pub fn fold_ascii_case(&self) -> CharSet {
        let mut ranges = self.ranges.clone();
        for &(lo, hi) in &self.ranges {
            for (from, to) in [('a', 'z'), ('A', 'Z')] {
                let lo_c = lo.max(from);
                let hi_c = hi.min(to);
                if lo_c <= hi_c {
                    ranges.push((swap_case(lo_c), swap_case(hi_c)));
                }
            }
        }
        CharSet {
            negated: self.negated,
            ranges,
        }
    }

    /// A concrete member of the set, if one is easy to find.
    pub fn sample(&self) -> Option<char> {
        if !self.negated {
            if let Some(c) = SAMPLE_CHARS.iter().copied().find(|&c| self.contains(c)) {
                return Some(c);
            }
            return self.ranges.first().map(|&(lo, _)| lo);
        }
        SAMPLE_CHARS.iter().copied().find(|&c| self.contains(c))
    }

    /// A character belonging to both sets, if one is easy to find.
    pub fn common_sample(&self, other: &CharSet) -> Option<char> {
        SAMPLE_CHARS
            .iter()
            .copied()
            .chain(self.ranges.iter().map(|&(lo, _)| lo))
            .chain(other.ranges.iter().map(|&(lo, _)| lo))
            .find(|&c| self.contains(c) && other.contains(c))
    }

    /// A character outside the set, if one is easy to find.
    pub fn sample_outside(&self) -> Option<char> {
        ['!', '\u{0}', '~', '\n', '=', 'a', '0']
            .into_iter()
            .find(|&c| !self.contains(c))
    }
}

fn swap_case(c: char) -> char {
    if c.is_ascii_lowercase() {
        c.to_ascii_uppercase()
    } else {
        c.to_ascii_lowercase()
    }
}

/// Returns true if every range in `inner` lies within the union of `outer`.
fn covered(inner: &[(char, char)], outer: &[(char, char)]) -> bool {
    let mut merged: Vec<(u32, u32)> = outer.iter().map(|&(l, h)| (l as u32, h as u32)).collect();
    merged.sort_unstable();
    let mut compact: Vec<(u32, u32)> = Vec::with_capacity(merged.len());
    for (lo, hi) in merged {
        match compact.last_mut() {
            Some(last) if lo <= last.1.saturating_add(1) => last.1 = last.1.max(hi),
            _ => compact.push((lo, hi)),
        }
    }
    inner.iter().all(|&(lo, hi)| {
        let (lo, hi) = (lo as u32, hi as u32);
        compact.iter().any(|&(o_lo, o_hi)| o_lo <= lo && hi <= o_hi)
    })
}

/// Zero-width assertions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Assertion {
    Start,
    End,
    WordBoundary,
    NotWordBoundary,
}

/// Group flavours that matter to the analysis.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum GroupKind {
    Capturing,
    NonCapturing,
    Lookaround,
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) enum NodeKind {
    Empty,
    /// Consumes exactly one character from the set.
    Char(CharSet),
    Assertion(Assertion),
    Backreference,
    Group(GroupKind, Box<Node>),
    Concat(Vec<Node>),
    Alternation(Vec<Node>),
    Repeat {
        node: Box<Node>,
        min: u32,
        max: Option<u32>,
        lazy: bool,
    },
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) struct Node {
    pub kind: NodeKind,
    pub span: Span,
}

impl Node {
    pub fn new(kind: NodeKind, span: Span) -> Self {
        Self { kind, span }
    }

    /// Strips non-lookaround groups.
    pub fn unwrap_groups(&self) -> &Node {
        match &self.kind {
            NodeKind::Group(GroupKind::Capturing | GroupKind::NonCapturing, inner) => {
                inner.unwrap_groups()
            }
            _ => self,
        }
    }

    /// Returns the repeated node if this is an unbounded repeat.
    pub fn as_unbounded_repeat(&self) -> Option<&Node> {
        match &self.unwrap_groups().kind {
            NodeKind::Repeat {
                node, max: None, ..
            } => Some(node),
            _ => None,
        }
    }

    /// Flattens concatenations, looking through plain groups.
    pub fn sequence(&self) -> Vec<&Node> {
        let mut out = Vec::new();
        self.push_sequence(&mut out);
        out
    }

    fn push_sequence<'a>(&'a self, out: &mut Vec<&'a Node>) {
        let node = self.unwrap_groups();
        match &node.kind {
            NodeKind::Concat(items) => {
                for item in items {
                    item.push_sequence(out);
                }
            }
            NodeKind::Empty => {}
            _ => out.push(node),
        }
    }

    /// Can this node match the empty string?
    pub fn nullable(&self) -> bool {
        match &self.kind {
            NodeKind::Empty
            | NodeKind::Assertion(_)
            | NodeKind::Backreference
            | NodeKind::Group(GroupKind::Lookaround, _) => true,
            NodeKind::Char(_) => false,
            NodeKind::Group(_, inner) => inner.nullable(),
            NodeKind::Concat(items) => items.iter().all(Node::nullable),
            NodeKind::Alternation(alts) => alts.iter().any(Node::nullable),
            NodeKind::Repeat { node, min, .. } => *min == 0 || node.nullable(),
        }
    }

    /// Does this node succeed on every input without consuming anything?
    pub fn always_matches(&self) -> bool {
        match &self.kind {
            NodeKind::Empty => true,
            NodeKind::Char(_)
            | NodeKind::Assertion(_)
            | NodeKind::Backreference
            | NodeKind::Group(GroupKind::Lookaround, _) => false,
            NodeKind::Group(_, inner) => inner.always_matches(),
            NodeKind::Concat(items) => items.iter().all(Node::always_matches),
            NodeKind::Alternation(alts) => alts.iter().any(Node::always_matches),
            NodeKind::Repeat { node, min, .. } => *min == 0 || node.always_matches(),
        }
    }

    /// Characters that can begin a non-empty match.
    pub fn first_chars(&self) -> CharSet {
        match &self.kind {
            NodeKind::Empty | NodeKind::Assertion(_) | NodeKind::Group(GroupKind::Lookaround, _) => {
                CharSet::empty()
            }
            NodeKind::Char(set) => set.clone(),
            NodeKind::Backreference => CharSet::any(),
            NodeKind::Group(_, inner) => inner.first_chars(),
            NodeKind::Concat(items) => {
                let mut set = CharSet::empty();
                for item in items {
                    set = set.union(&item.first_chars());
                    if !item.nullable() {
                        break;
                    }
                }
                set
            }
            NodeKind::Alternation(alts) => alts
                .iter()
                .fold(CharSet::empty(), |acc, alt| acc.union(&alt.first_chars())),
            NodeKind::Repeat { node, .. } => node.first_chars(),
        }
    }

    /// Characters that can end a non-empty match.
    pub fn last_chars(&self) -> CharSet {
        match &self.kind {
            NodeKind::Concat(items) => {
                let mut set = CharSet::empty();
                for item in items.iter().rev() {
                    set = set.union(&item.last_chars());
                    if !item.nullable() {
                        break;
                    }
                }
                set
            }
            NodeKind::Alternation(alts) => alts
                .iter()
                .fold(CharSet::empty(), |acc, alt| acc.union(&alt.last_chars())),
            NodeKind::Group(GroupKind::Capturing | GroupKind::NonCapturing, inner) => {
                inner.last_chars()
            }
            NodeKind::Repeat { node, .. } => node.last_chars(),
            _ => self.first_chars(),
        }
    }

    /// Every character this node can consume anywhere in a match.
    pub fn all_chars(&self) -> CharSet {
        match &self.kind {
            NodeKind::Empty | NodeKind::Assertion(_) | NodeKind::Group(GroupKind::Lookaround, _) => {
                CharSet::empty()
            }
            NodeKind::Char(set) => set.clone(),
            NodeKind::Backreference => CharSet::any(),
            NodeKind::Group(_, inner) => inner.all_chars(),
            NodeKind::Concat(items) | NodeKind::Alternation(items) => items
                .iter()
                .fold(CharSet::empty(), |acc, item| acc.union(&item.all_chars())),
            NodeKind::Repeat { node, .. } => node.all_chars(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_positive_sets_overlap_on_shared_ranges() {
        assert!(CharSet::word().overlaps(&CharSet::digit()));
        assert!(!CharSet::digit().overlaps(&CharSet::single('a')));
        assert!(CharSet::space().overlaps(&CharSet::single('\n')));
    }

    #[test]
    fn test_negated_set_overlap() {
        let not_digit = CharSet::digit().negate();
        assert!(!not_digit.overlaps(&CharSet::single('5')));
        assert!(not_digit.overlaps(&CharSet::single('a')));
        assert!(CharSet::any().overlaps(&not_digit));
    }

    #[test]
    fn test_empty_set_never_overlaps() {
        assert!(!CharSet::empty().overlaps(&CharSet::any()));
    }

    #[test]
    fn test_covered_merges_adjacent_ranges() {
        assert!(covered(&[('b', 'y')], &[('a', 'm'), ('n', 'z')]));
        assert!(!covered(&[('a', 'z')], &[('a', 'm'), ('o', 'z')]));
    }

    #[test]
    fn test_case_folding() {
        let folded = CharSet::single('a').fold_ascii_case();
        assert!(folded.contains('A'));
        assert!(folded.overlaps(&CharSet::single('A')));
        assert!(!CharSet::single('a').overlaps(&CharSet::single('A')));
    }

    #[test]
    fn test_common_sample() {
        assert_eq!(CharSet::word().common_sample(&CharSet::digit()), Some('0'));
        assert_eq!(
            CharSet::single('q').common_sample(&CharSet::from_ranges(&[('p', 'r')])),
            Some('q')
        );
        assert_eq!(CharSet::digit().common_sample(&CharSet::single('a')), None);
    }

    #[test]
    fn test_samples() {
        assert_eq!(CharSet::digit().sample(), Some('0'));
        assert_eq!(CharSet::single('q').sample(), Some('q'));
        assert_eq!(CharSet::any().sample(), Some('a'));
        assert_eq!(CharSet::single('!').sample_outside(), Some('\u{0}'));
        assert_eq!(CharSet::word().sample_outside(), Some('!'));
    }
}
