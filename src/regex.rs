// Copyright 2014-2015 The Rust Project Developers. See the COPYRIGHT
// file at the top-level directory of this distribution and at
// http://rust-lang.org/COPYRIGHT.
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// http://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your
// option. This file may not be copied, modified, or distributed
// except according to those terms.

//! The public `Regex` handle: compiles a pattern once, then drives
//! `exec`/`captures`/`filter`/`split` against it any number of times.
//!
//! The compiled `Program` is shared behind an `Rc` so `Regex::clone` is
//! cheap (the original C context's `copy`/`free` dance collapses into
//! ordinary `Rc` sharing and `Drop`; see `DESIGN.md`). Each clone owns its
//! own `CONTINUE` cursor, since that scratch state is specific to one
//! handle's call sequence, not to the shared bytecode.

use std::cell::Cell;
use std::rc::Rc;

use memchr::memmem;

use crate::compiler;
use crate::error::{Error, ErrorKind, Result};
use crate::inst::Program;
use crate::options::Options;
use crate::parser::Parser;
use crate::template;
use crate::vm::{group_span, Captures as RawCaptures, Vm};

/// One match's capture-group position vector, plus enough context to
/// resolve a name to a group index.
#[derive(Clone, Debug)]
pub struct Captures {
    raw: RawCaptures,
    names: Rc<Vec<Option<String>>>,
}

impl Captures {
    /// The `(start, length)` span of the whole match (group 0).
    pub fn span(&self) -> (usize, usize) {
        group_span(&self.raw, 0).expect("group 0 is always set on a successful match")
    }

    /// The `(start, length)` span of group `index`, if it participated.
    pub fn group(&self, index: usize) -> Option<(usize, usize)> {
        group_span(&self.raw, index)
    }

    /// The span of the first group with the given name, if any matched.
    pub fn name(&self, name: &str) -> Option<(usize, usize)> {
        let index = self.names.iter().position(|n| n.as_deref() == Some(name))?;
        self.group(index)
    }

    pub fn len(&self) -> usize {
        self.raw.len() / 2
    }

    pub fn is_empty(&self) -> bool {
        self.raw.is_empty()
    }
}

/// A compiled pattern, ready to match against any number of subjects.
#[derive(Clone)]
pub struct Regex {
    prog: Rc<Program>,
    names: Rc<Vec<Option<String>>>,
    options: Options,
    /// Resume offset for the `CONTINUE` option; advances after every
    /// successful `captures` call made with that bit set.
    continuation: Rc<Cell<usize>>,
}

impl Regex {
    /// Compiles `pattern` with default options.
    pub fn new(pattern: &str) -> Result<Regex> {
        Regex::with_options(pattern, Options::NONE)
    }

    /// Compiles `pattern` under an explicit option bitmap.
    pub fn with_options(pattern: &str, options: Options) -> Result<Regex> {
        let options = options.normalize().map_err(|_| {
            Error::new(ErrorKind::InvalidOptions, 0, "GLOBAL and CONTINUE cannot both be set")
        })?;
        let parsed = Parser::new(pattern.as_bytes(), options).parse()?;
        let names: Vec<Option<String>> = parsed.groups.iter().map(|g| g.name.clone()).collect();
        let prog = compiler::compile(parsed, options)?;
        #[cfg(feature = "trace")]
        log::trace!("regex: compiled {:?} with options {:?}", pattern, options);
        Ok(Regex { prog: Rc::new(prog), names: Rc::new(names), options, continuation: Rc::new(Cell::new(0)) })
    }

    pub fn options(&self) -> Options {
        self.options
    }

    pub fn num_groups(&self) -> usize {
        self.prog.num_groups
    }

    /// Reports whether `subject` matches anywhere (honors `UNANCHORED`).
    pub fn is_match(&self, subject: &[u8]) -> Result<bool> {
        Ok(self.captures(subject)?.is_some())
    }

    /// Finds one match, starting from byte 0 — or from the cursor left by
    /// a prior `CONTINUE`-mode call, if that option is set.
    pub fn captures(&self, subject: &[u8]) -> Result<Option<Captures>> {
        let start = if self.options.contains(Options::CONTINUE) { self.continuation.get() } else { 0 };
        if start > subject.len() {
            return Ok(None);
        }
        let raw = self.find_at(subject, start)?;
        if let Some(raw) = &raw {
            if self.options.contains(Options::CONTINUE) {
                let (s, len) = group_span(raw, 0).unwrap();
                self.continuation.set(if len == 0 { s + 1 } else { s + len });
            }
        }
        Ok(raw.map(|raw| Captures { raw, names: Rc::clone(&self.names) }))
    }

    /// Iterates every non-overlapping match left to right, always
    /// advancing past a zero-width match by one byte so the sweep
    /// terminates (testable property: results stay strictly disjoint).
    pub fn captures_iter<'r, 't>(&'r self, subject: &'t [u8]) -> CapturesIter<'r, 't> {
        CapturesIter { regex: self, subject, pos: 0, done: false }
    }

    /// Runs the compiled program starting the scan no earlier than
    /// `start`, using the required-literal-prefix fast path when one was
    /// extracted at compile time.
    fn find_at(&self, subject: &[u8], start: usize) -> Result<Option<RawCaptures>> {
        let mut vm = Vm::new(&self.prog, subject);
        if self.prog.anchored {
            return vm.run_anchored(0, start, self.options);
        }
        match self.prog.prefix.as_ref() {
            // The extracted prefix is already lowercased by the parser
            // under `INSENSITIVE` (see `parser.rs`'s `fold`), but `memmem`
            // does a byte-exact search — it would miss any differently
            // cased occurrence. Fall through to the unaccelerated scan,
            // which folds case per byte inside the VM.
            Some(prefix) if !prefix.is_empty() && !self.options.contains(Options::INSENSITIVE) => {
                let body_start = 3;
                let finder = memmem::Finder::new(&prefix[..]);
                let mut pos = start;
                loop {
                    if pos > subject.len() {
                        return Ok(None);
                    }
                    let Some(off) = finder.find(&subject[pos..]) else {
                        return Ok(None);
                    };
                    let candidate = pos + off;
                    if let Some(caps) = vm.run_anchored(body_start, candidate, self.options)? {
                        return Ok(Some(caps));
                    }
                    pos = candidate + 1;
                }
            }
            _ => vm.run_unaccelerated(start, self.options),
        }
    }

    /// One-shot substitution: replaces the first match (or every match,
    /// when `GLOBAL` is set) with a rendered `template`, copying the rest
    /// of `subject` through untouched.
    pub fn filter(&self, subject: &[u8], template: &str, indicator: &str) -> Result<Vec<u8>> {
        let indicator = indicator.as_bytes();
        let template = template.as_bytes();
        let mut out = Vec::with_capacity(subject.len());
        let mut last_end = 0usize;
        let mut any = false;

        for caps in self.captures_iter(subject) {
            let caps = caps?;
            let (start, len) = caps.span();
            out.extend_from_slice(&subject[last_end..start]);
            template::render(&mut out, template, indicator, subject, &caps.raw, self.prog.num_groups);
            last_end = start + len;
            any = true;
            if !self.options.contains(Options::GLOBAL) {
                break;
            }
        }
        if !any {
            return Ok(subject.to_vec());
        }
        out.extend_from_slice(&subject[last_end..]);
        Ok(out)
    }

    /// Splits `subject` at each non-empty match, dropping a match that
    /// starts at offset 0 or ends at the subject's end (it would only
    /// ever produce an empty leading or trailing piece).
    pub fn split(&self, subject: &[u8]) -> Result<Vec<Vec<u8>>> {
        let mut pieces = Vec::new();
        let mut j = 0usize;
        for caps in self.captures_iter(subject) {
            let caps = caps?;
            let (start, len) = caps.span();
            if start == 0 || start == subject.len() {
                continue;
            }
            pieces.push(subject[j..start].to_vec());
            j = start + len;
        }
        if subject.len() >= j {
            pieces.push(subject[j..].to_vec());
        }
        Ok(pieces)
    }
}

/// Iterator over every non-overlapping match in a subject, yielded by
/// [`Regex::captures_iter`].
pub struct CapturesIter<'r, 't> {
    regex: &'r Regex,
    subject: &'t [u8],
    pos: usize,
    done: bool,
}

impl<'r, 't> Iterator for CapturesIter<'r, 't> {
    type Item = Result<Captures>;

    fn next(&mut self) -> Option<Result<Captures>> {
        if self.done || self.pos > self.subject.len() {
            return None;
        }
        match self.regex.find_at(self.subject, self.pos) {
            Ok(Some(raw)) => {
                let (start, len) = group_span(&raw, 0).expect("group 0 is always set");
                self.pos = if len == 0 { start + 1 } else { start + len };
                Some(Ok(Captures { raw, names: Rc::clone(&self.regex.names) }))
            }
            Ok(None) => {
                self.done = true;
                None
            }
            Err(e) => {
                self.done = true;
                Some(Err(e))
            }
        }
    }
}

/// One-shot match: compiles `pattern` and reports whether it matches
/// `subject` anywhere.
pub fn is_match(pattern: &str, subject: &[u8], options: Options) -> Result<bool> {
    Regex::with_options(pattern, options)?.is_match(subject)
}

/// One-shot match returning the first set of captures, if any.
pub fn find(pattern: &str, subject: &[u8], options: Options) -> Result<Option<Captures>> {
    Regex::with_options(pattern, options)?.captures(subject)
}

/// One-shot template substitution equivalent to compiling `pattern` and
/// calling [`Regex::filter`] once.
pub fn replace(pattern: &str, subject: &[u8], template: &str, indicator: &str, options: Options) -> Result<Vec<u8>> {
    Regex::with_options(pattern, options)?.filter(subject, template, indicator)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn basic_match_and_group() {
        let re = Regex::new(r"(\w+)@(\w+)").unwrap();
        let caps = re.captures(b"user@host").unwrap().unwrap();
        assert_eq!(caps.span(), (0, 9));
        assert_eq!(caps.group(1), Some((0, 4)));
        assert_eq!(caps.group(2), Some((5, 4)));
    }

    #[test]
    fn named_group_lookup() {
        let re = Regex::new(r"(?<year>\d{4})-(?<m>\d{2})").unwrap();
        let caps = re.captures(b"2024-11").unwrap().unwrap();
        assert_eq!(caps.name("year"), Some((0, 4)));
        assert_eq!(caps.name("m"), Some((5, 2)));
    }

    #[test]
    fn global_iteration_is_disjoint_and_left_to_right() {
        let re = Regex::with_options("a+", Options::GLOBAL).unwrap();
        let matches: Vec<_> = re.captures_iter(b"aa baaa b a").map(|c| c.unwrap().span()).collect();
        assert_eq!(matches, vec![(0, 2), (4, 3), (10, 1)]);
    }

    #[test]
    fn filter_replaces_every_global_match() {
        let re = Regex::with_options(r"\d+", Options::GLOBAL).unwrap();
        let out = re.filter(b"a1 b22 c333", "[$0]", "$").unwrap();
        assert_eq!(out, b"a[1] b[22] c[333]");
    }

    #[test]
    fn filter_is_identity_on_no_match() {
        let re = Regex::new("zzz").unwrap();
        let out = re.filter(b"abc", "-", "$").unwrap();
        assert_eq!(out, b"abc");
    }

    #[test]
    fn split_drops_leading_and_trailing_boundary_matches() {
        let re = Regex::with_options(r"\s+", Options::GLOBAL).unwrap();
        let pieces = re.split(b"one two  three").unwrap();
        assert_eq!(pieces, vec![b"one".to_vec(), b"two".to_vec(), b"three".to_vec()]);
    }

    #[test]
    fn literal_prefix_accelerates_unanchored_search() {
        let re = Regex::with_options("needle", Options::UNANCHORED).unwrap();
        let haystack = vec![b'x'; 10_000];
        let mut subject = haystack.clone();
        subject.extend_from_slice(b"needle");
        let caps = re.captures(&subject).unwrap().unwrap();
        assert_eq!(caps.span(), (10_000, 6));
    }

    #[test]
    fn case_insensitive_prefix_search_still_folds_case() {
        // The extracted prefix is lowercased at parse time; the fast path
        // must not hand it to a case-sensitive `memmem` search.
        let re = Regex::with_options("foo", Options::INSENSITIVE | Options::GLOBAL).unwrap();
        let matches: Vec<_> = re.captures_iter(b"FOO foo").map(|c| c.unwrap().span()).collect();
        assert_eq!(matches, vec![(0, 3), (4, 3)]);
    }

    #[test]
    fn continue_option_resumes_after_prior_match() {
        let re = Regex::with_options("a", Options::CONTINUE | Options::UNANCHORED).unwrap();
        let first = re.captures(b"a.a.a").unwrap().unwrap();
        assert_eq!(first.span(), (0, 1));
        let second = re.captures(b"a.a.a").unwrap().unwrap();
        assert_eq!(second.span(), (2, 1));
    }

    #[test]
    fn global_and_continue_together_is_invalid_options() {
        let err = Regex::with_options("a", Options::GLOBAL | Options::CONTINUE).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidOptions);
    }
}
