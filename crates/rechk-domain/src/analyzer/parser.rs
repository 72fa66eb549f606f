//! Recursive-descent parser for ECMAScript regular expression syntax.
//!
//! Only the structure needed by the analysis is kept: character matchers
//! become [`CharSet`]s, named groups and group indices are dropped, and
//! every node records its char span in the source.

use super::ast::{Assertion, CharSet, GroupKind, Node, NodeKind, Span};
use super::Flags;

/// Maximum group nesting accepted before giving up.
pub(crate) const MAX_NESTING_DEPTH: usize = 128;

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum ParseError {
    /// The pattern is not valid syntax.
    Syntax { message: String, offset: usize },
    /// The pattern is valid but too deeply nested to analyse.
    TooDeep,
}

impl ParseError {
    fn syntax(message: impl Into<String>, offset: usize) -> Self {
        Self::Syntax {
            message: message.into(),
            offset,
        }
    }
}

impl std::fmt::Display for ParseError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Syntax { message, offset } => write!(f, "{message} (at offset {offset})"),
            Self::TooDeep => write!(f, "nesting deeper than {MAX_NESTING_DEPTH} groups"),
        }
    }
}

type ParseResult<T> = Result<T, ParseError>;

pub(crate) fn parse(source: &str, flags: &Flags) -> ParseResult<Node> {
    let mut parser = Parser {
        chars: source.chars().collect(),
        pos: 0,
        flags,
    };
    let node = parser.parse_alternation(0)?;
    if let Some(c) = parser.peek() {
        // parse_alternation only stops early on ')'.
        return Err(ParseError::syntax(format!("unmatched '{c}'"), parser.pos));
    }
    Ok(node)
}

struct Parser<'a> {
    chars: Vec<char>,
    pos: usize,
    flags: &'a Flags,
}

impl Parser<'_> {
    fn peek(&self) -> Option<char> {
        self.chars.get(self.pos).copied()
    }

    fn peek_at(&self, offset: usize) -> Option<char> {
        self.chars.get(self.pos + offset).copied()
    }

    fn bump(&mut self) -> Option<char> {
        let c = self.peek()?;
        self.pos += 1;
        Some(c)
    }

    fn eat(&mut self, expected: char) -> bool {
        if self.peek() == Some(expected) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn eat_str(&mut self, expected: &str) -> bool {
        let matches = expected
            .chars()
            .enumerate()
            .all(|(i, c)| self.peek_at(i) == Some(c));
        if matches {
            self.pos += expected.chars().count();
        }
        matches
    }

    fn parse_alternation(&mut self, depth: usize) -> ParseResult<Node> {
        let start = self.pos;
        let mut alternatives = vec![self.parse_concat(depth)?];
        while self.eat('|') {
            alternatives.push(self.parse_concat(depth)?);
        }
        if alternatives.len() == 1 {
            return Ok(alternatives.remove(0));
        }
        Ok(Node::new(
            NodeKind::Alternation(alternatives),
            Span::new(start, self.pos),
        ))
    }

    fn parse_concat(&mut self, depth: usize) -> ParseResult<Node> {
        let start = self.pos;
        let mut items = Vec::new();
        while let Some(c) = self.peek() {
            if c == '|' || c == ')' {
                break;
            }
            items.push(self.parse_term(depth)?);
        }
        let span = Span::new(start, self.pos);
        Ok(match items.len() {
            0 => Node::new(NodeKind::Empty, span),
            1 => items.remove(0),
            _ => Node::new(NodeKind::Concat(items), span),
        })
    }

    fn parse_term(&mut self, depth: usize) -> ParseResult<Node> {
        let atom = self.parse_atom(depth)?;
        let Some((min, max, lazy)) = self.parse_quantifier()? else {
            return Ok(atom);
        };

        if matches!(atom.kind, NodeKind::Assertion(_)) {
            return Err(ParseError::syntax("nothing to repeat", atom.span.start));
        }
        if matches!(atom.kind, NodeKind::Group(GroupKind::Lookaround, _)) && self.flags.unicode {
            return Err(ParseError::syntax("invalid quantifier", atom.span.start));
        }

        let span = Span::new(atom.span.start, self.pos);
        Ok(Node::new(
            NodeKind::Repeat {
                node: Box::new(atom),
                min,
                max,
                lazy,
            },
            span,
        ))
    }

    /// Parses `*`, `+`, `?` or `{n,m}` with an optional lazy marker.
    fn parse_quantifier(&mut self) -> ParseResult<Option<(u32, Option<u32>, bool)>> {
        let start = self.pos;
        let (min, max) = match self.peek() {
            Some('*') => {
                self.pos += 1;
                (0, None)
            }
            Some('+') => {
                self.pos += 1;
                (1, None)
            }
            Some('?') => {
                self.pos += 1;
                (0, Some(1))
            }
            Some('{') => match self.try_braces()? {
                Some(bounds) => bounds,
                None => return Ok(None),
            },
            _ => return Ok(None),
        };
        let lazy = self.eat('?');

        if matches!(self.peek(), Some('*' | '+' | '?')) || self.brace_quantifier_ahead() {
            return Err(ParseError::syntax("nothing to repeat", self.pos));
        }
        if let Some(max) = max {
            if min > max {
                return Err(ParseError::syntax(
                    "numbers out of order in {} quantifier",
                    start,
                ));
            }
        }
        Ok(Some((min, max, lazy)))
    }

    /// Consumes `{n}`, `{n,}` or `{n,m}` if present.
    fn try_braces(&mut self) -> ParseResult<Option<(u32, Option<u32>)>> {
        let Some((min, max, len)) = self.scan_braces() else {
            if self.flags.unicode {
                return Err(ParseError::syntax("incomplete quantifier", self.pos));
            }
            return Ok(None);
        };
        self.pos += len;
        Ok(Some((min, max)))
    }

    fn brace_quantifier_ahead(&self) -> bool {
        self.peek() == Some('{') && self.scan_braces().is_some()
    }

    /// Looks for a brace quantifier at the cursor without consuming it.
    fn scan_braces(&self) -> Option<(u32, Option<u32>, usize)> {
        let mut i = self.pos;
        if self.chars.get(i) != Some(&'{') {
            return None;
        }
        i += 1;
        let (min, used) = self.scan_number(i)?;
        i += used;
        let max = match self.chars.get(i) {
            Some('}') => Some(min),
            Some(',') => {
                i += 1;
                if self.chars.get(i) == Some(&'}') {
                    None
                } else {
                    let (max, used) = self.scan_number(i)?;
                    i += used;
                    if self.chars.get(i) != Some(&'}') {
                        return None;
                    }
                    Some(max)
                }
            }
            _ => return None,
        };
        Some((min, max, i + 1 - self.pos))
    }

    fn scan_number(&self, from: usize) -> Option<(u32, usize)> {
        let digits: String = self.chars[from.min(self.chars.len())..]
            .iter()
            .take_while(|c| c.is_ascii_digit())
            .collect();
        if digits.is_empty() {
            return None;
        }
        // Huge counts behave like "very many"; saturate instead of failing.
        let value = digits.parse::<u32>().unwrap_or(u32::MAX);
        Some((value, digits.len()))
    }

    fn parse_atom(&mut self, depth: usize) -> ParseResult<Node> {
        let start = self.pos;
        let Some(c) = self.bump() else {
            return Err(ParseError::syntax("unexpected end of pattern", start));
        };
        let kind = match c {
            '^' => NodeKind::Assertion(Assertion::Start),
            '$' => NodeKind::Assertion(Assertion::End),
            '.' => NodeKind::Char(CharSet::any()),
            '(' => return self.parse_group(start, depth),
            '[' => NodeKind::Char(self.parse_class(start)?),
            '\\' => self.parse_atom_escape(start)?,
            '*' | '+' | '?' => return Err(ParseError::syntax("nothing to repeat", start)),
            '{' => {
                self.pos = start;
                if self.brace_quantifier_ahead() {
                    return Err(ParseError::syntax("nothing to repeat", start));
                }
                self.pos = start + 1;
                if self.flags.unicode {
                    return Err(ParseError::syntax("lone quantifier brackets", start));
                }
                NodeKind::Char(self.literal('{'))
            }
            '}' | ']' if self.flags.unicode => {
                return Err(ParseError::syntax("lone quantifier brackets", start));
            }
            other => NodeKind::Char(self.literal(other)),
        };
        Ok(Node::new(kind, Span::new(start, self.pos)))
    }

    fn parse_group(&mut self, start: usize, depth: usize) -> ParseResult<Node> {
        if depth + 1 > MAX_NESTING_DEPTH {
            return Err(ParseError::TooDeep);
        }

        let kind = if self.eat('?') {
            if self.eat(':') {
                GroupKind::NonCapturing
            } else if self.eat('=') || self.eat('!') || self.eat_str("<=") || self.eat_str("<!") {
                GroupKind::Lookaround
            } else if self.eat('<') {
                self.parse_group_name()?;
                GroupKind::Capturing
            } else {
                return Err(ParseError::syntax("invalid group", start));
            }
        } else {
            GroupKind::Capturing
        };

        let inner = self.parse_alternation(depth + 1)?;
        if !self.eat(')') {
            return Err(ParseError::syntax("unterminated group", start));
        }
        Ok(Node::new(
            NodeKind::Group(kind, Box::new(inner)),
            Span::new(start, self.pos),
        ))
    }

    /// Consumes `name>` after `(?<` or `\k<`.
    fn parse_group_name(&mut self) -> ParseResult<()> {
        let start = self.pos;
        let mut len = 0;
        while let Some(c) = self.bump() {
            if c == '>' {
                if len == 0 {
                    break;
                }
                return Ok(());
            }
            let valid = if len == 0 {
                c == '$' || c == '_' || c.is_alphabetic()
            } else {
                c == '$' || c == '_' || c.is_alphanumeric()
            };
            if !valid {
                break;
            }
            len += 1;
        }
        Err(ParseError::syntax("invalid capture group name", start))
    }

    fn parse_atom_escape(&mut self, start: usize) -> ParseResult<NodeKind> {
        let Some(c) = self.peek() else {
            return Err(ParseError::syntax("\\ at end of pattern", start));
        };
        match c {
            'b' => {
                self.pos += 1;
                Ok(NodeKind::Assertion(Assertion::WordBoundary))
            }
            'B' => {
                self.pos += 1;
                Ok(NodeKind::Assertion(Assertion::NotWordBoundary))
            }
            '1'..='9' => {
                while matches!(self.peek(), Some('0'..='9')) {
                    self.pos += 1;
                }
                Ok(NodeKind::Backreference)
            }
            'k' if self.peek_at(1) == Some('<') => {
                self.pos += 2;
                self.parse_group_name()?;
                Ok(NodeKind::Backreference)
            }
            _ => Ok(NodeKind::Char(self.parse_char_escape(start)?)),
        }
    }

    /// Parses an escape that stands for a set of characters. The cursor is
    /// just past the backslash.
    fn parse_char_escape(&mut self, start: usize) -> ParseResult<CharSet> {
        let Some(c) = self.bump() else {
            return Err(ParseError::syntax("\\ at end of pattern", start));
        };
        let set = match c {
            'd' => CharSet::digit(),
            'D' => CharSet::digit().negate(),
            'w' => CharSet::word(),
            'W' => CharSet::word().negate(),
            's' => CharSet::space(),
            'S' => CharSet::space().negate(),
            't' => CharSet::single('\t'),
            'n' => CharSet::single('\n'),
            'r' => CharSet::single('\r'),
            'v' => CharSet::single('\u{0b}'),
            'f' => CharSet::single('\u{0c}'),
            '0' if !matches!(self.peek(), Some('0'..='9')) => CharSet::single('\0'),
            'c' => match self.peek() {
                Some(letter) if letter.is_ascii_alphabetic() => {
                    self.pos += 1;
                    CharSet::single(char::from(letter as u8 % 32))
                }
                _ => self.literal('\\'),
            },
            'x' => match self.scan_hex(2) {
                Some(value) => self.code_point(value, start)?,
                None => self.identity('x', start)?,
            },
            'u' => self.parse_unicode_escape(start)?,
            'p' | 'P' if self.flags.unicode => {
                if !self.eat('{') {
                    return Err(ParseError::syntax("invalid property name", start));
                }
                while let Some(ch) = self.bump() {
                    if ch == '}' {
                        return Ok(CharSet::any());
                    }
                }
                return Err(ParseError::syntax("invalid property name", start));
            }
            other => self.identity(other, start)?,
        };
        Ok(self.fold(set))
    }

    fn parse_unicode_escape(&mut self, start: usize) -> ParseResult<CharSet> {
        if self.flags.unicode && self.peek() == Some('{') {
            let open = self.pos;
            self.pos += 1;
            let mut value: u32 = 0;
            let mut digits = 0;
            while let Some(d) = self.peek().and_then(|c| c.to_digit(16)) {
                value = value.saturating_mul(16).saturating_add(d);
                digits += 1;
                self.pos += 1;
            }
            if digits == 0 || !self.eat('}') || value > 0x10ffff {
                return Err(ParseError::syntax("invalid unicode escape", open));
            }
            return self.code_point(value, start);
        }
        match self.scan_hex(4) {
            Some(value) => self.code_point(value, start),
            None => self.identity('u', start),
        }
    }

    fn scan_hex(&mut self, len: usize) -> Option<u32> {
        let mut value = 0;
        for i in 0..len {
            value = value * 16 + self.peek_at(i)?.to_digit(16)?;
        }
        self.pos += len;
        Some(value)
    }

    fn code_point(&self, value: u32, start: usize) -> ParseResult<CharSet> {
        // Lone surrogates cannot be represented; any char stands in for them.
        Ok(match char::from_u32(value) {
            Some(c) => CharSet::single(c),
            None if (0xd800..=0xdfff).contains(&value) => CharSet::any(),
            None => return Err(ParseError::syntax("invalid escape", start)),
        })
    }

    /// `\` followed by a character that only stands for itself.
    fn identity(&self, c: char, start: usize) -> ParseResult<CharSet> {
        if self.flags.unicode && !is_syntax_char(c) && c != '/' && c != '-' {
            return Err(ParseError::syntax("invalid escape", start));
        }
        Ok(CharSet::single(c))
    }

    fn parse_class(&mut self, start: usize) -> ParseResult<CharSet> {
        let negated = self.eat('^');
        let mut set = CharSet::empty();
        loop {
            let Some(c) = self.peek() else {
                return Err(ParseError::syntax("missing /", start));
            };
            if c == ']' {
                self.pos += 1;
                break;
            }
            if c == '[' && self.flags.unicode_sets {
                // Nested classes and set operations: approximate as any char.
                self.skip_nested_class(start)?;
                set = CharSet::any();
                continue;
            }

            let item_start = self.pos;
            let low = self.parse_class_atom(start)?;
            if self.peek() == Some('-') && !matches!(self.peek_at(1), Some(']') | None) {
                self.pos += 1;
                let high_start = self.pos;
                let high = self.parse_class_atom(start)?;
                match (single_char(&low), single_char(&high)) {
                    (Some(lo), Some(hi)) if lo > hi => {
                        return Err(ParseError::syntax(
                            "range out of order in character class",
                            item_start,
                        ));
                    }
                    (Some(lo), Some(hi)) => {
                        set = set.union(&CharSet::from_ranges(&[(lo, hi)]));
                    }
                    _ => {
                        if self.flags.unicode {
                            return Err(ParseError::syntax(
                                "invalid character class",
                                high_start,
                            ));
                        }
                        set = set.union(&low).union(&CharSet::single('-')).union(&high);
                    }
                }
                continue;
            }
            set = set.union(&low);
        }

        let set = self.fold(set);
        Ok(if negated { set.negate() } else { set })
    }

    fn parse_class_atom(&mut self, start: usize) -> ParseResult<CharSet> {
        match self.bump() {
            None => Err(ParseError::syntax("missing /", start)),
            Some('\\') => match self.peek() {
                Some('b') => {
                    self.pos += 1;
                    Ok(CharSet::single('\u{08}'))
                }
                Some('-') => {
                    self.pos += 1;
                    Ok(CharSet::single('-'))
                }
                Some('0'..='9') if !self.flags.unicode => {
                    // Octal-ish escapes in classes; the value does not matter here.
                    while matches!(self.peek(), Some('0'..='9')) {
                        self.pos += 1;
                    }
                    Ok(CharSet::any())
                }
                _ => self.parse_char_escape(self.pos - 1),
            },
            Some(c) => Ok(CharSet::single(c)),
        }
    }

    fn skip_nested_class(&mut self, start: usize) -> ParseResult<()> {
        let mut level = 0usize;
        while let Some(c) = self.bump() {
            match c {
                '\\' => {
                    self.bump();
                }
                '[' => level += 1,
                ']' => {
                    level -= 1;
                    if level == 0 {
                        return Ok(());
                    }
                }
                _ => {}
            }
        }
        Err(ParseError::syntax("missing /", start))
    }

    fn literal(&self, c: char) -> CharSet {
        self.fold(CharSet::single(c))
    }

    fn fold(&self, set: CharSet) -> CharSet {
        if self.flags.ignore_case {
            set.fold_ascii_case()
        } else {
            set
        }
    }
}

fn single_char(set: &CharSet) -> Option<char> {
    if set.is_negated() {
        return None;
    }
    let c = set.sample()?;
    let only = CharSet::single(c);
    // Folded single letters carry two ranges; use the first as written.
    if set == &only || set == &only.fold_ascii_case() {
        Some(c)
    } else {
        None
    }
}

fn is_syntax_char(c: char) -> bool {
    matches!(
        c,
        '^' | '$' | '\\' | '.' | '*' | '+' | '?' | '(' | ')' | '[' | ']' | '{' | '}' | '|'
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    fn flags(modifier: &str) -> Flags {
        Flags::parse(modifier).unwrap()
    }

    fn parse_ok(source: &str) -> Node {
        parse(source, &flags("")).unwrap()
    }

    fn syntax_error(source: &str, modifier: &str) -> String {
        match parse(source, &flags(modifier)) {
            Err(ParseError::Syntax { message, .. }) => message,
            other => panic!("expected syntax error for {source:?}, got {other:?}"),
        }
    }

    #[test]
    fn test_parses_nested_repeat() {
        let node = parse_ok("(a+)+$");
        let NodeKind::Concat(items) = &node.kind else {
            panic!("expected concat, got {node:?}");
        };
        assert_eq!(items.len(), 2);
        assert!(items[0].as_unbounded_repeat().is_some());
        assert_eq!(items[0].span, Span::new(0, 5));
        assert_eq!(items[1].kind, NodeKind::Assertion(Assertion::End));
    }

    #[test]
    fn test_parses_brace_quantifiers() {
        let node = parse_ok("a{2,}");
        assert!(node.as_unbounded_repeat().is_some());

        let node = parse_ok("a{2,5}?");
        match node.kind {
            NodeKind::Repeat { min, max, lazy, .. } => {
                assert_eq!((min, max, lazy), (2, Some(5), true));
            }
            other => panic!("expected repeat, got {other:?}"),
        }
    }

    #[test]
    fn test_lone_brace_is_literal_without_unicode_flag() {
        let node = parse_ok("a{");
        assert!(matches!(node.kind, NodeKind::Concat(_)));
        assert_eq!(syntax_error("a{", "u"), "incomplete quantifier");
    }

    #[test]
    fn test_syntax_errors() {
        assert_eq!(syntax_error("(", ""), "unterminated group");
        assert_eq!(syntax_error("a)", ""), "unmatched ')'");
        assert_eq!(syntax_error("*a", ""), "nothing to repeat");
        assert_eq!(syntax_error("a**", ""), "nothing to repeat");
        assert_eq!(syntax_error("^*", ""), "nothing to repeat");
        assert_eq!(syntax_error("[a", ""), "missing /");
        assert_eq!(syntax_error("[z-a]", ""), "range out of order in character class");
        assert_eq!(syntax_error("a{3,1}", ""), "numbers out of order in {} quantifier");
        assert_eq!(syntax_error("(?<1a>x)", ""), "invalid capture group name");
        assert_eq!(syntax_error("\\", ""), "\\ at end of pattern");
        assert_eq!(syntax_error("\\q", "u"), "invalid escape");
    }

    #[test]
    fn test_lazy_quantifier_is_not_a_double_quantifier() {
        assert!(parse("a+?", &flags("")).is_ok());
        assert!(parse("a*?b", &flags("")).is_ok());
    }

    #[test]
    fn test_groups_and_lookarounds() {
        assert!(parse("(?:a)(?=b)(?!c)(?<=d)(?<!e)(?<name>f)\\k<name>", &flags("")).is_ok());
    }

    #[test]
    fn test_character_classes() {
        let node = parse_ok("[a-c\\d_]");
        let NodeKind::Char(set) = node.kind else {
            panic!("expected char");
        };
        assert!(set.contains('b'));
        assert!(set.contains('7'));
        assert!(set.contains('_'));
        assert!(!set.contains('d'));

        let node = parse_ok("[^\"]");
        let NodeKind::Char(set) = node.kind else {
            panic!("expected char");
        };
        assert!(!set.contains('"'));
        assert!(set.contains('a'));
    }

    #[test]
    fn test_ignore_case_folds_literals() {
        let node = parse("A", &flags("i")).unwrap();
        let NodeKind::Char(set) = node.kind else {
            panic!("expected char");
        };
        assert!(set.contains('a'));
        assert!(set.contains('A'));
    }

    #[test]
    fn test_nesting_limit() {
        let ok = format!("{}a{}", "(".repeat(MAX_NESTING_DEPTH), ")".repeat(MAX_NESTING_DEPTH));
        assert!(parse(&ok, &flags("")).is_ok());

        let deep = format!(
            "{}a{}",
            "(".repeat(MAX_NESTING_DEPTH + 1),
            ")".repeat(MAX_NESTING_DEPTH + 1)
        );
        assert_eq!(parse(&deep, &flags("")), Err(ParseError::TooDeep));
    }

    #[test]
    fn test_spans_count_chars_not_bytes() {
        let node = parse_ok("é(b+)+");
        let NodeKind::Concat(items) = &node.kind else {
            panic!("expected concat");
        };
        assert_eq!(items[1].span, Span::new(1, 6));
    }
}
