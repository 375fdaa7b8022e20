// Copyright 2014-2015 The Rust Project Developers. See the COPYRIGHT
// file at the top-level directory of this distribution and at
// http://rust-lang.org/COPYRIGHT.
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// http://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your
// option. This file may not be copied, modified, or distributed
// except according to those terms.

//! Recursive-descent parser for the dialect described in the crate's
//! top-level documentation: named groups in three syntaxes, subroutine
//! calls, atomic groups, look-around, counted repetition, branch-reset,
//! inline mode modifiers, literal quoting spans, POSIX bracket classes,
//! and multi-base numeric escapes.

use crate::ast::{GroupTable, Greedy, Node};
use crate::error::{Diagnostics, ErrorKind};
use crate::options::Options;

/// Internal parse result: `Err(())` means a diagnostic has already been
/// latched and the caller should unwind without adding its own message.
type PResult<T> = Result<T, ()>;

pub struct Parser<'p> {
    pattern: &'p [u8],
    pos: usize,
    options: Options,
    quoting: bool,
    groups: GroupTable,
    diagnostics: Diagnostics,
}

/// The result of a successful parse: the AST root and the group table
/// the compiler will lay bytecode addresses into.
pub struct Parsed {
    pub root: Node,
    pub groups: GroupTable,
}

impl<'p> Parser<'p> {
    pub fn new(pattern: &'p [u8], options: Options) -> Parser<'p> {
        Parser {
            pattern,
            pos: 0,
            options,
            quoting: false,
            groups: GroupTable::new(),
            diagnostics: Diagnostics::new(),
        }
    }

    pub fn parse(mut self) -> Result<Parsed, crate::error::Error> {
        let root = self.parse_regex();
        match root {
            Ok(root) if !self.diagnostics.has_error() => {
                if !self.eof() {
                    self.err(ErrorKind::Syntax, "unexpected trailing characters");
                } else {
                    #[cfg(feature = "trace")]
                    log::trace!("parser: produced AST with {} groups", self.groups.len());
                    return Ok(Parsed { root, groups: self.groups });
                }
                Err(self.diagnostics.into_error().unwrap())
            }
            _ => Err(self
                .diagnostics
                .into_error()
                .unwrap_or_else(|| crate::error::Error::new(ErrorKind::Syntax, self.pos, "parse failed"))),
        }
    }

    // ---- cursor helpers ----------------------------------------------

    fn eof(&self) -> bool {
        self.pos >= self.pattern.len()
    }

    fn peek(&self) -> Option<u8> {
        self.pattern.get(self.pos).copied()
    }

    fn peek_at(&self, offset: usize) -> Option<u8> {
        self.pattern.get(self.pos + offset).copied()
    }

    fn bump(&mut self) -> Option<u8> {
        let c = self.peek();
        if c.is_some() {
            self.pos += 1;
        }
        c
    }

    fn expect(&mut self, c: u8) -> PResult<()> {
        if self.peek() == Some(c) {
            self.pos += 1;
            Ok(())
        } else {
            self.err(ErrorKind::Syntax, format!("expected '{}'", c as char));
            Err(())
        }
    }

    fn err(&mut self, kind: ErrorKind, message: impl Into<String>) {
        self.diagnostics.record(kind, self.pos, message);
    }

    fn fold(&self, b: u8) -> u8 {
        if self.options.contains(Options::INSENSITIVE) {
            b.to_ascii_lowercase()
        } else {
            b
        }
    }

    /// Skips insignificant whitespace and `#`-comments when `EXTENDED`
    /// is active. A no-op outside character classes only; callers never
    /// invoke this while scanning `[...]`.
    fn skip_extended(&mut self) {
        if !self.options.contains(Options::EXTENDED) {
            return;
        }
        loop {
            match self.peek() {
                Some(b) if b == b' ' || b == b'\t' || b == b'\n' || b == b'\r' => {
                    self.pos += 1;
                }
                Some(b'#') => {
                    while !self.eof() && self.peek() != Some(b'\n') {
                        self.pos += 1;
                    }
                }
                _ => break,
            }
        }
    }

    // ---- grammar -------------------------------------------------------

    fn parse_regex(&mut self) -> PResult<Node> {
        let left = self.parse_term()?;
        if self.peek() == Some(b'|') {
            self.pos += 1;
            let right = self.parse_regex()?;
            Ok(Node::Or(Box::new(left), Box::new(right)))
        } else {
            Ok(left)
        }
    }

    fn parse_term(&mut self) -> PResult<Node> {
        let mut left: Option<Node> = None;
        loop {
            self.skip_extended();
            match self.peek() {
                None | Some(b'|') | Some(b')') => break,
                _ => {}
            }
            let factor = self.parse_factor()?;
            if matches!(factor, Node::None) {
                continue;
            }
            left = Some(match left.take() {
                None => factor,
                Some(prev) => self.fuse(prev, factor),
            });
        }
        Ok(left.unwrap_or(Node::None))
    }

    fn fuse(&self, prev: Node, next: Node) -> Node {
        match (prev, next) {
            (Node::Char(a), Node::Char(b)) => Node::Str(vec![a, b]),
            (Node::Str(mut s), Node::Char(b)) => {
                s.push(b);
                Node::Str(s)
            }
            (prev, next) => Node::Sequence(Box::new(prev), Box::new(next)),
        }
    }

    fn parse_factor(&mut self) -> PResult<Node> {
        let prim = self.parse_primary()?;
        if matches!(prim, Node::None) {
            return Ok(prim);
        }
        self.skip_extended();
        match self.peek() {
            Some(b'*') => {
                self.pos += 1;
                let g = self.lazy_marker();
                Ok(Node::Asterisk(Box::new(prim), g))
            }
            Some(b'+') => {
                self.pos += 1;
                let g = self.lazy_marker();
                Ok(Node::Plus(Box::new(prim), g))
            }
            Some(b'?') => {
                self.pos += 1;
                let g = self.lazy_marker();
                Ok(Node::Question(Box::new(prim), g))
            }
            Some(b'{') => {
                let save = self.pos;
                match self.try_parse_rep(prim) {
                    Ok(node) => Ok(node),
                    Err(restored) => {
                        self.pos = save;
                        Ok(restored)
                    }
                }
            }
            _ => Ok(prim),
        }
    }

    fn lazy_marker(&mut self) -> Greedy {
        if self.peek() == Some(b'?') {
            self.pos += 1;
            Greedy::Lazy
        } else {
            Greedy::Greedy
        }
    }

    /// On success, consumes `{m,n}` and returns the `Rep` node wrapping
    /// `prim`. On failure (not a valid counted-repetition body), returns
    /// `prim` unchanged via `Err` so the caller can rewind the cursor and
    /// treat `{` as the start of the next factor instead.
    fn try_parse_rep(&mut self, prim: Node) -> Result<Node, Node> {
        let start = self.pos;
        self.pos += 1; // '{'
        let m = match self.read_decimal() {
            Some(n) => n,
            None => {
                self.pos = start;
                return Err(prim);
            }
        };
        let max = if self.peek() == Some(b'}') {
            self.pos += 1;
            Some(m)
        } else if self.peek() == Some(b',') {
            self.pos += 1;
            if self.peek() == Some(b'}') {
                self.pos += 1;
                None
            } else {
                match self.read_decimal() {
                    Some(n) if self.peek() == Some(b'}') => {
                        self.pos += 1;
                        Some(n)
                    }
                    _ => {
                        self.pos = start;
                        return Err(prim);
                    }
                }
            }
        } else {
            self.pos = start;
            return Err(prim);
        };
        Ok(Node::Rep { body: Box::new(prim), min: m, max })
    }

    fn read_decimal(&mut self) -> Option<u32> {
        let start = self.pos;
        while matches!(self.peek(), Some(b) if b.is_ascii_digit()) {
            self.pos += 1;
        }
        if self.pos == start {
            return None;
        }
        std::str::from_utf8(&self.pattern[start..self.pos]).ok()?.parse().ok()
    }

    fn parse_primary(&mut self) -> PResult<Node> {
        if self.eof() {
            self.err(ErrorKind::Syntax, "unexpected end of pattern");
            return Err(());
        }
        if self.quoting {
            if self.peek() == Some(b'\\') && self.peek_at(1) == Some(b'E') {
                self.pos += 2;
                self.quoting = false;
                return Ok(Node::None);
            }
            let c = self.bump().unwrap();
            return Ok(Node::Char(self.fold(c)));
        }
        match self.peek().unwrap() {
            b'(' => {
                self.pos += 1;
                self.parse_group()
            }
            b'[' => self.parse_class(),
            b'\\' => {
                self.pos += 1;
                self.parse_escape()
            }
            b'.' => {
                self.pos += 1;
                Ok(Node::Any)
            }
            b'^' => {
                self.pos += 1;
                Ok(Node::Bol)
            }
            b'$' => {
                self.pos += 1;
                Ok(Node::Eol)
            }
            c => {
                self.pos += 1;
                Ok(Node::Char(self.fold(c)))
            }
        }
    }

    // ---- groups ---------------------------------------------------------

    fn parse_group(&mut self) -> PResult<Node> {
        if self.peek() != Some(b'?') {
            let index = self.groups.add();
            let body = self.parse_regex()?;
            self.expect(b')')?;
            return Ok(Node::Group { index, body: Box::new(body) });
        }
        self.pos += 1; // '?'
        match self.peek() {
            Some(b':') => {
                self.pos += 1;
                let body = self.parse_regex()?;
                self.expect(b')')?;
                Ok(body)
            }
            Some(b'|') => {
                self.pos += 1;
                self.parse_branch_reset()
            }
            Some(b'>') => {
                self.pos += 1;
                let body = self.parse_regex()?;
                self.expect(b')')?;
                Ok(Node::Atom(Box::new(body)))
            }
            Some(b'=') => {
                self.pos += 1;
                let body = self.parse_regex()?;
                self.expect(b')')?;
                Ok(Node::Pla(Box::new(body)))
            }
            Some(b'!') => {
                self.pos += 1;
                let body = self.parse_regex()?;
                self.expect(b')')?;
                Ok(Node::Nla(Box::new(body)))
            }
            Some(b'<') => {
                self.pos += 1;
                match self.peek() {
                    Some(b'=') => {
                        self.pos += 1;
                        let body = self.parse_regex()?;
                        self.expect(b')')?;
                        Ok(Node::Plb(Box::new(body)))
                    }
                    Some(b'!') => {
                        self.pos += 1;
                        let body = self.parse_regex()?;
                        self.expect(b')')?;
                        Ok(Node::Nlb(Box::new(body)))
                    }
                    _ => {
                        let name = self.read_name(b'>')?;
                        self.named_group(name)
                    }
                }
            }
            Some(b'\'') => {
                self.pos += 1;
                let name = self.read_name(b'\'')?;
                self.named_group(name)
            }
            Some(b'P') => {
                self.pos += 1;
                match self.peek() {
                    Some(b'<') => {
                        self.pos += 1;
                        let name = self.read_name(b'>')?;
                        self.named_group(name)
                    }
                    Some(b'=') => {
                        self.pos += 1;
                        let start = self.pos;
                        while matches!(self.peek(), Some(b) if b != b')') {
                            self.pos += 1;
                        }
                        let name = String::from_utf8_lossy(&self.pattern[start..self.pos]).into_owned();
                        self.expect(b')')?;
                        match self.groups.find_by_name(&name) {
                            Some(idx) => Ok(Node::Backref(idx)),
                            None => {
                                self.err(ErrorKind::Syntax, format!("unknown group name '{}'", name));
                                Err(())
                            }
                        }
                    }
                    _ => {
                        self.err(ErrorKind::Syntax, "malformed (?P...) construct");
                        Err(())
                    }
                }
            }
            Some(b'R') => {
                self.pos += 1;
                self.expect(b')')?;
                Ok(Node::Recurse)
            }
            Some(b'#') => {
                self.pos += 1;
                while matches!(self.peek(), Some(b) if b != b')') {
                    self.pos += 1;
                }
                self.expect(b')')?;
                Ok(Node::None)
            }
            Some(b) if b.is_ascii_digit() => {
                let n = self.read_decimal().unwrap() as usize;
                self.expect(b')')?;
                Ok(Node::Call(n))
            }
            _ => self.parse_mode_modifiers(),
        }
    }

    fn named_group(&mut self, name: String) -> PResult<Node> {
        let index = self.groups.add();
        self.groups.set_name(index, name);
        let body = self.parse_regex()?;
        self.expect(b')')?;
        Ok(Node::Group { index, body: Box::new(body) })
    }

    fn read_name(&mut self, closing: u8) -> PResult<String> {
        let start = self.pos;
        while matches!(self.peek(), Some(b) if b != closing) {
            self.pos += 1;
        }
        if self.eof() {
            self.err(ErrorKind::Syntax, "unterminated group name");
            return Err(());
        }
        let name = String::from_utf8_lossy(&self.pattern[start..self.pos]).into_owned();
        self.pos += 1; // closing delimiter
        Ok(name)
    }

    /// `(?|A|B|...)`: every alternative re-uses the same group numbers.
    fn parse_branch_reset(&mut self) -> PResult<Node> {
        let base = self.groups.len();
        let mut high_water = base;
        let mut alt = self.parse_term()?;
        high_water = high_water.max(self.groups.len());
        while self.peek() == Some(b'|') {
            self.pos += 1;
            self.groups.truncate_to(base);
            let next = self.parse_term()?;
            high_water = high_water.max(self.groups.len());
            alt = Node::Or(Box::new(alt), Box::new(next));
        }
        while self.groups.len() < high_water {
            self.groups.add();
        }
        self.expect(b')')?;
        Ok(alt)
    }

    // ---- escapes ---------------------------------------------------------

    fn parse_escape(&mut self) -> PResult<Node> {
        if self.eof() {
            self.err(ErrorKind::Syntax, "dangling escape");
            return Err(());
        }
        let c = self.bump().unwrap();
        match c {
            b'x' => self.parse_hex_escape(),
            b'o' => self.parse_octal_braced(),
            b'0' => {
                let mut v: u32 = 0;
                for _ in 0..2 {
                    match self.peek() {
                        Some(d) if (b'0'..=b'7').contains(&d) => {
                            v = v * 8 + (d - b'0') as u32;
                            self.pos += 1;
                        }
                        _ => break,
                    }
                }
                Ok(Node::Char(self.fold(v as u8)))
            }
            b'1'..=b'9' => {
                self.pos -= 1;
                let n = self.read_decimal().unwrap() as usize;
                Ok(Node::Backref(n))
            }
            b'a' => Ok(Node::Char(0x07)),
            b'b' => Ok(Node::WordBoundary),
            b'B' => Ok(Node::NotWordBoundary),
            b'e' => Ok(Node::Char(0x1b)),
            b'f' => Ok(Node::Char(0x0c)),
            b'n' => Ok(Node::Char(b'\n')),
            b'r' => Ok(Node::Char(b'\r')),
            b't' => Ok(Node::Char(b'\t')),
            b'd' => Ok(Node::Digit),
            b'D' => Ok(Node::Not(digit_bytes())),
            b'w' => Ok(Node::Word),
            b'W' => Ok(Node::Not(word_bytes())),
            b's' => Ok(Node::Space),
            b'S' => Ok(Node::Not(space_bytes())),
            b'h' => Ok(Node::Class(vec![b' ', b'\t'])),
            b'H' => Ok(Node::Not(vec![b' ', b'\t'])),
            b'N' => Ok(Node::Not(vec![b'\n'])),
            b'K' => Ok(Node::SetStart),
            b'A' => Ok(Node::Bos),
            b'Z' => Ok(Node::Eos),
            b'Q' => {
                self.quoting = true;
                Ok(Node::None)
            }
            b'E' => Ok(Node::None),
            b'g' => self.parse_g_backref(),
            b'k' => self.parse_k_backref(),
            other => Ok(Node::Char(self.fold(other))),
        }
    }

    fn parse_hex_escape(&mut self) -> PResult<Node> {
        if self.peek() == Some(b'{') {
            self.pos += 1;
            let start = self.pos;
            while matches!(self.peek(), Some(b) if b.is_ascii_hexdigit()) {
                self.pos += 1;
            }
            let text = std::str::from_utf8(&self.pattern[start..self.pos]).unwrap_or("");
            let v = u32::from_str_radix(text, 16).unwrap_or(0);
            self.expect(b'}')?;
            Ok(Node::Char(self.fold(v as u8)))
        } else {
            let start = self.pos;
            let mut n = 0;
            while n < 2 && matches!(self.peek(), Some(b) if b.is_ascii_hexdigit()) {
                self.pos += 1;
                n += 1;
            }
            let text = std::str::from_utf8(&self.pattern[start..self.pos]).unwrap_or("");
            let v = u32::from_str_radix(text, 16).unwrap_or(0);
            Ok(Node::Char(self.fold(v as u8)))
        }
    }

    fn parse_octal_braced(&mut self) -> PResult<Node> {
        self.expect(b'{')?;
        let start = self.pos;
        while matches!(self.peek(), Some(b) if (b'0'..=b'7').contains(&b)) {
            self.pos += 1;
        }
        let text = std::str::from_utf8(&self.pattern[start..self.pos]).unwrap_or("");
        let v = u32::from_str_radix(text, 8).unwrap_or(0);
        self.expect(b'}')?;
        Ok(Node::Char(self.fold(v as u8)))
    }

    fn parse_g_backref(&mut self) -> PResult<Node> {
        let relative_base = self.groups.len().saturating_sub(1) as i64;
        let (sign, digits_start_braced) = if self.peek() == Some(b'{') {
            self.pos += 1;
            let sign = match self.peek() {
                Some(b'+') => {
                    self.pos += 1;
                    1
                }
                Some(b'-') => {
                    self.pos += 1;
                    -1
                }
                _ => 0,
            };
            (sign, true)
        } else {
            (0, false)
        };
        let n = match self.read_decimal() {
            Some(n) => n as i64,
            None => {
                self.err(ErrorKind::Syntax, "malformed \\g backreference");
                return Err(());
            }
        };
        if digits_start_braced {
            self.expect(b'}')?;
        }
        let target = match sign {
            1 => relative_base + n,
            -1 => relative_base - n,
            _ => n,
        };
        if target < 0 {
            self.err(ErrorKind::Syntax, "backreference resolves to a negative group index");
            return Err(());
        }
        Ok(Node::Backref(target as usize))
    }

    fn parse_k_backref(&mut self) -> PResult<Node> {
        let closing = match self.bump() {
            Some(b'<') => b'>',
            Some(b'\'') => b'\'',
            _ => {
                self.err(ErrorKind::Syntax, "malformed \\k backreference");
                return Err(());
            }
        };
        let name = self.read_name(closing)?;
        match self.groups.find_by_name(&name) {
            Some(idx) => Ok(Node::Backref(idx)),
            None => {
                self.err(ErrorKind::Syntax, format!("unknown group name '{}'", name));
                Err(())
            }
        }
    }

    fn parse_mode_modifiers(&mut self) -> PResult<Node> {
        let mut add = Options::NONE;
        let mut remove = Options::NONE;
        let mut adding = true;
        loop {
            match self.peek() {
                Some(b'-') => {
                    adding = false;
                    self.pos += 1;
                }
                Some(b'i') => {
                    if adding {
                        add.insert(Options::INSENSITIVE)
                    } else {
                        remove.insert(Options::INSENSITIVE)
                    }
                    self.pos += 1;
                }
                Some(b'x') => {
                    if adding {
                        add.insert(Options::EXTENDED)
                    } else {
                        remove.insert(Options::EXTENDED)
                    }
                    self.pos += 1;
                }
                Some(b'm') => {
                    if adding {
                        add.insert(Options::MULTILINE)
                    } else {
                        remove.insert(Options::MULTILINE)
                    }
                    self.pos += 1;
                }
                Some(b'c') => {
                    remove.insert(Options::INSENSITIVE);
                    self.pos += 1;
                }
                Some(b't') => {
                    remove.insert(Options::EXTENDED);
                    self.pos += 1;
                }
                Some(b':') | Some(b')') => break,
                _ => {
                    self.err(ErrorKind::Syntax, "unrecognized inline mode modifier");
                    return Err(());
                }
            }
        }
        let new_opts = Options::from_bits((self.options.bits() | add.bits()) & !remove.bits());
        if self.peek() == Some(b':') {
            self.pos += 1;
            let saved = self.options;
            self.options = new_opts;
            let body = self.parse_regex()?;
            self.options = saved;
            self.expect(b')')?;
            Ok(Node::Sequence(
                Box::new(Node::SetOpt(new_opts)),
                Box::new(Node::Sequence(Box::new(body), Box::new(Node::SetOpt(saved)))),
            ))
        } else {
            self.expect(b')')?;
            self.options = new_opts;
            Ok(Node::SetOpt(new_opts))
        }
    }

    // ---- character classes -----------------------------------------------

    fn parse_class(&mut self) -> PResult<Node> {
        self.pos += 1; // '['
        let negate = if self.peek() == Some(b'^') {
            self.pos += 1;
            true
        } else {
            false
        };
        let mut bytes: Vec<u8> = Vec::new();
        let mut first = true;
        loop {
            if self.eof() {
                self.err(ErrorKind::Syntax, "unterminated character class");
                return Err(());
            }
            if self.peek() == Some(b']') && !first {
                self.pos += 1;
                break;
            }
            first = false;
            if self.peek() == Some(b'[') && self.peek_at(1) == Some(b':') {
                if let Some(more) = self.try_parse_posix_class()? {
                    bytes.extend(more);
                    continue;
                }
            }
            let atom = self.parse_class_atom()?;
            match atom {
                ClassAtom::Byte(b) => {
                    if self.peek() == Some(b'-') && self.peek_at(1) != Some(b']') && self.peek_at(1).is_some() {
                        self.pos += 1;
                        let atom2 = self.parse_class_atom()?;
                        match atom2 {
                            ClassAtom::Byte(b2) => {
                                let (lo, hi) = if b <= b2 { (b, b2) } else { (b2, b) };
                                bytes.extend(lo..=hi);
                            }
                            ClassAtom::Bytes(v) => {
                                bytes.push(b);
                                bytes.push(b'-');
                                bytes.extend(v);
                            }
                        }
                    } else {
                        bytes.push(b);
                    }
                }
                ClassAtom::Bytes(v) => bytes.extend(v),
            }
        }
        if bytes.is_empty() {
            self.err(ErrorKind::Syntax, "empty character class");
            return Err(());
        }
        bytes.sort_unstable();
        bytes.dedup();
        Ok(if negate { Node::Not(bytes) } else { Node::Class(bytes) })
    }

    fn try_parse_posix_class(&mut self) -> PResult<Option<Vec<u8>>> {
        let start = self.pos;
        self.pos += 2; // "[:"
        let name_start = self.pos;
        while matches!(self.peek(), Some(b) if b != b':') {
            self.pos += 1;
        }
        let name = std::str::from_utf8(&self.pattern[name_start..self.pos]).unwrap_or("");
        if self.peek() == Some(b':') && self.peek_at(1) == Some(b']') {
            let bytes = posix_class_bytes(name);
            if bytes.is_some() {
                self.pos += 2;
                return Ok(bytes);
            }
        }
        self.pos = start;
        Ok(None)
    }

    fn parse_class_atom(&mut self) -> PResult<ClassAtom> {
        if self.peek() == Some(b'\\') {
            self.pos += 1;
            let c = match self.bump() {
                Some(c) => c,
                None => {
                    self.err(ErrorKind::Syntax, "dangling escape in character class");
                    return Err(());
                }
            };
            return Ok(match c {
                b'd' => ClassAtom::Bytes(digit_bytes()),
                b'w' => ClassAtom::Bytes(word_bytes()),
                b's' => ClassAtom::Bytes(space_bytes()),
                b'h' => ClassAtom::Bytes(vec![b' ', b'\t']),
                b'n' => ClassAtom::Byte(b'\n'),
                b'r' => ClassAtom::Byte(b'\r'),
                b't' => ClassAtom::Byte(b'\t'),
                b'a' => ClassAtom::Byte(0x07),
                b'b' => ClassAtom::Byte(0x08),
                b'e' => ClassAtom::Byte(0x1b),
                b'f' => ClassAtom::Byte(0x0c),
                b'x' => {
                    if let Node::Char(v) = self.parse_hex_escape()? {
                        ClassAtom::Byte(v)
                    } else {
                        unreachable!()
                    }
                }
                other => ClassAtom::Byte(other),
            });
        }
        let c = self.bump().unwrap();
        Ok(ClassAtom::Byte(c))
    }
}

enum ClassAtom {
    Byte(u8),
    Bytes(Vec<u8>),
}

fn digit_bytes() -> Vec<u8> {
    (b'0'..=b'9').collect()
}

fn word_bytes() -> Vec<u8> {
    let mut v: Vec<u8> = (b'0'..=b'9').chain(b'a'..=b'z').chain(b'A'..=b'Z').collect();
    v.push(b'_');
    v
}

fn space_bytes() -> Vec<u8> {
    vec![b' ', b'\t', b'\r', b'\n', 0x0b, 0x0c]
}

fn posix_class_bytes(name: &str) -> Option<Vec<u8>> {
    Some(match name {
        "upper" => (b'A'..=b'Z').collect(),
        "lower" => (b'a'..=b'z').collect(),
        "alpha" => (b'A'..=b'Z').chain(b'a'..=b'z').collect(),
        "digit" => digit_bytes(),
        "xdigit" => (b'0'..=b'9').chain(b'a'..=b'f').chain(b'A'..=b'F').collect(),
        "alnum" => (b'A'..=b'Z').chain(b'a'..=b'z').chain(b'0'..=b'9').collect(),
        "punct" => (0x21u8..=0x2f).chain(0x3a..=0x40).chain(0x5b..=0x60).chain(0x7b..=0x7e).collect(),
        "blank" => vec![b' ', b'\t'],
        "space" => space_bytes(),
        "cntrl" => (0x00u8..=0x1f).chain(std::iter::once(0x7f)).collect(),
        "graph" => (0x21u8..=0x7e).collect(),
        "print" => (0x20u8..=0x7e).collect(),
        _ => return None,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(pattern: &str) -> Parsed {
        Parser::new(pattern.as_bytes(), Options::NONE).parse().expect("parse failed")
    }

    #[test]
    fn literal_fusion_builds_str() {
        let p = parse("abc");
        match p.root {
            Node::Str(s) => assert_eq!(s, b"abc"),
            other => panic!("expected Str, got {:?}", other),
        }
    }

    #[test]
    fn named_group_registers_name() {
        let p = parse("(?<year>\\d{4})");
        assert_eq!(p.groups.get(1).unwrap().name.as_deref(), Some("year"));
    }

    #[test]
    fn branch_reset_reuses_group_numbers() {
        let p = parse("(?|(a)(b)|(c)(d))");
        // both branches open groups 1 and 2; final table has exactly 3 entries
        assert_eq!(p.groups.len(), 3);
    }

    #[test]
    fn unterminated_class_is_a_syntax_error() {
        let err = Parser::new(b"[abc", Options::NONE).parse().unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Syntax);
    }

    #[test]
    fn empty_class_is_a_syntax_error() {
        let err = Parser::new(b"[]", Options::NONE).parse().unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Syntax);
    }

    #[test]
    fn posix_class_expands() {
        let p = parse("[[:digit:]]");
        match p.root {
            Node::Class(bytes) => assert_eq!(bytes, digit_bytes()),
            other => panic!("expected Class, got {:?}", other),
        }
    }

    #[test]
    fn quoting_span_treats_metacharacters_literally() {
        let p = parse("\\Qa.b\\E");
        match p.root {
            Node::Str(s) => assert_eq!(s, b"a.b"),
            other => panic!("expected Str, got {:?}", other),
        }
    }

    #[test]
    fn backref_digit_form() {
        let p = parse("(\\w+) \\1");
        // Sequence(Group, Sequence(Char(' '), Backref(1)))
        fn contains_backref(n: &Node) -> bool {
            match n {
                Node::Backref(1) => true,
                Node::Sequence(a, b) => contains_backref(a) || contains_backref(b),
                Node::Group { body, .. } => contains_backref(body),
                _ => false,
            }
        }
        assert!(contains_backref(&p.root));
    }
}
