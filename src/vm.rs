// Copyright 2014-2015 The Rust Project Developers. See the COPYRIGHT
// file at the top-level directory of this distribution and at
// http://rust-lang.org/COPYRIGHT.
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// http://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your
// option. This file may not be copied, modified, or distributed
// except according to those terms.

//! The backtracking virtual machine that interprets compiled bytecode.
//!
//! A "thread" is an explicit state snapshot — instruction pointer,
//! subject pointer, options, captures, progress slots, call stack and
//! atomic-group stack — rather than an OS thread. `Branch` clones the
//! current thread to produce a deferred alternative and pushes it onto a
//! LIFO stack; the interpreter always continues the most recently
//! deferred alternative first, which is what makes `*`/`+` greedy and
//! `*?`/`+?` lazy purely a matter of operand order at compile time.
//!
//! Look-around is not implemented as a raw instruction-pointer patch
//! trick (see `DESIGN.md`): entering `Pla`/`Nla`/`Plb`/`Nlb` spawns an
//! isolated sub-search over the assertion's body and keeps or discards
//! the enclosing thread based on whether that sub-search finds a match,
//! never letting the checker's own backtracking leak onto the outer
//! stack.

use crate::error::{Error, ErrorKind};
use crate::inst::{Inst, InstIdx, Program};
use crate::limits;
use crate::options::Options;

/// `(start, length)` pairs, one per capture group; `None` when the group
/// never participated in the match. Flattened as `2 * group_index` /
/// `2 * group_index + 1` to mirror the bytecode's `Save` addressing.
pub type Captures = Vec<Option<usize>>;

/// Returns the `(start, length)` pair for group `g`, if it was set.
pub fn group_span(caps: &Captures, g: usize) -> Option<(usize, usize)> {
    let start = *caps.get(2 * g)?;
    let len = *caps.get(2 * g + 1)?;
    match (start, len) {
        (Some(s), Some(l)) => Some((s, l)),
        _ => None,
    }
}

#[derive(Clone, Debug)]
struct Thread {
    ip: InstIdx,
    sp: usize,
    options: Options,
    caps: Captures,
    progress: Vec<Option<usize>>,
    calls: Vec<InstIdx>,
    atomics: Vec<usize>,
    rev: bool,
}

impl Thread {
    fn new(ip: InstIdx, sp: usize, options: Options, num_groups: usize, num_progress: usize, rev: bool) -> Thread {
        Thread {
            ip,
            sp,
            options,
            caps: vec![None; num_groups * 2],
            progress: vec![None; num_progress],
            calls: Vec::new(),
            atomics: Vec::new(),
            rev,
        }
    }

    /// A rough accounting unit for the memory-budget cap: every scalar
    /// slot a spawned thread owns costs one unit.
    fn memory_cost(&self) -> usize {
        (self.caps.len() + self.progress.len() + self.calls.len() + self.atomics.len() + 4)
            * std::mem::size_of::<usize>()
    }
}

enum StepResult {
    Fork(Thread),
    Die,
    Match,
}

fn byte_eq(subject_byte: u8, pattern_byte: u8, insensitive: bool) -> bool {
    if insensitive {
        subject_byte.to_ascii_lowercase() == pattern_byte.to_ascii_lowercase()
    } else {
        subject_byte == pattern_byte
    }
}

fn class_matches(set: &[u8], b: u8, insensitive: bool) -> bool {
    if set.contains(&b) {
        return true;
    }
    if insensitive {
        let alt = if b.is_ascii_lowercase() { b.to_ascii_uppercase() } else { b.to_ascii_lowercase() };
        set.contains(&alt)
    } else {
        false
    }
}

fn is_word_byte(b: u8) -> bool {
    b.is_ascii_alphanumeric() || b == b'_'
}

/// A single interpreter over one compiled `Program` and one subject.
///
/// Resource accounting (spawned-thread count, memory budget) is tracked
/// across nested look-around sub-searches so that a pathological pattern
/// can't dodge the caps by hiding its blow-up inside an assertion.
pub struct Vm<'r, 't> {
    prog: &'r Program,
    subject: &'t [u8],
    stack: Vec<Thread>,
    memory_used: usize,
}

impl<'r, 't> Vm<'r, 't> {
    pub fn new(prog: &'r Program, subject: &'t [u8]) -> Vm<'r, 't> {
        Vm { prog, subject, stack: Vec::new(), memory_used: 0 }
    }

    /// Finds the first match starting at exactly `start_sp`, with the
    /// compiled program's unanchored preamble (if any) already baked
    /// into `start_ip`.
    pub fn run_anchored(&mut self, start_ip: InstIdx, start_sp: usize, options: Options) -> Result<Option<Captures>, Error> {
        self.run_from(start_ip, start_sp, options, false, None, None)
    }

    /// Runs the full program (including its unanchored preamble, if
    /// compiled in) starting the scan at subject offset `start`. Used
    /// when no required literal prefix is available to accelerate the
    /// scan, or to resume a `CONTINUE`-mode search past a prior match.
    pub fn run_unaccelerated(&mut self, start: usize, options: Options) -> Result<Option<Captures>, Error> {
        self.run_from(0, start, options, false, None, None)
    }

    fn account_spawn(&mut self, th: &Thread) -> Result<(), Error> {
        self.memory_used += th.memory_cost();
        if self.memory_used > limits::MAX_MEMORY_BYTES {
            return Err(Error::new(ErrorKind::OutOfMemory, th.sp, "exceeded the VM memory budget"));
        }
        Ok(())
    }

    fn run_from(
        &mut self,
        start_ip: InstIdx,
        start_sp: usize,
        options: Options,
        rev: bool,
        seed: Option<&Captures>,
        stop_ip: Option<InstIdx>,
    ) -> Result<Option<Captures>, Error> {
        let mut th = Thread::new(start_ip, start_sp, options, self.prog.num_groups, self.prog.num_progress_slots, rev);
        if let Some(caps) = seed {
            th.caps = caps.clone();
        }
        self.account_spawn(&th)?;
        loop {
            if let Some(target) = stop_ip {
                if th.ip == target {
                    return Ok(Some(th.caps));
                }
            }
            match self.step(&mut th)? {
                StepResult::Fork(alt) => {
                    if self.stack.len() + 1 > limits::MAX_THREADS {
                        return Err(Error::new(ErrorKind::StackOverflow, th.sp, "thread stack overflow"));
                    }
                    self.account_spawn(&alt)?;
                    self.stack.push(alt);
                }
                StepResult::Die => match self.stack.pop() {
                    Some(next) => th = next,
                    None => return Ok(None),
                },
                StepResult::Match => return Ok(Some(th.caps)),
            }
        }
    }

    /// Evaluates a look-around body in isolation: a fresh backtracking
    /// search over `[open_ip + 1, close_ip)`, seeded with a copy of the
    /// enclosing thread's captures (so groups opened inside a successful
    /// assertion are retained) but never sharing its alternative stack.
    fn eval_lookaround(&mut self, caps: &Captures, open_ip: InstIdx, sp: usize, rev_body: bool, options: Options) -> Result<Option<Captures>, Error> {
        let close_ip = *self.prog.pairs.get(&open_ip).expect("compiler always pairs look-around instructions");
        let saved_stack = std::mem::take(&mut self.stack);
        let result = self.run_from(open_ip + 1, sp, options, rev_body, Some(caps), Some(close_ip));
        self.stack = saved_stack;
        result
    }

    fn consume_literal(&self, th: &mut Thread, bytes: &[u8]) -> bool {
        let insensitive = th.options.contains(Options::INSENSITIVE);
        if th.rev {
            for &expected in bytes.iter().rev() {
                match th.sp.checked_sub(1).and_then(|p| self.subject.get(p)).copied() {
                    Some(b) if byte_eq(b, expected, insensitive) => th.sp -= 1,
                    _ => return false,
                }
            }
        } else {
            for &expected in bytes.iter() {
                match self.subject.get(th.sp).copied() {
                    Some(b) if byte_eq(b, expected, insensitive) => th.sp += 1,
                    _ => return false,
                }
            }
        }
        true
    }

    fn read_byte(&self, th: &Thread) -> Option<u8> {
        let pos = if th.rev { th.sp.checked_sub(1)? } else { th.sp };
        self.subject.get(pos).copied()
    }

    fn advance(&self, th: &mut Thread) {
        if th.rev {
            th.sp -= 1;
        } else {
            th.sp += 1;
        }
    }

    /// Runs `th` forward until it forks, dies, or reaches `Match` (or, in
    /// a look-around sub-search, the caller's `stop_ip`). Non-forking
    /// instructions are interpreted in a tight inner loop rather than
    /// round-tripping through the outer stack, matching the teacher's
    /// "avoid pushing only to pop next" convention.
    fn step(&mut self, th: &mut Thread) -> Result<StepResult, Error> {
        loop {
            let insensitive = th.options.contains(Options::INSENSITIVE);
            match &self.prog.insts[th.ip] {
                Inst::Char(c) => {
                    let c = *c;
                    match self.read_byte(th) {
                        Some(b) if byte_eq(b, c, insensitive) => {
                            self.advance(th);
                            th.ip += 1;
                        }
                        _ => return Ok(StepResult::Die),
                    }
                }
                Inst::Any => match self.read_byte(th) {
                    Some(b'\n') if !th.options.contains(Options::MULTILINE) => return Ok(StepResult::Die),
                    Some(_) => {
                        self.advance(th);
                        th.ip += 1;
                    }
                    None => return Ok(StepResult::Die),
                },
                Inst::Many => match self.read_byte(th) {
                    Some(_) => {
                        self.advance(th);
                        th.ip += 1;
                    }
                    None => return Ok(StepResult::Die),
                },
                Inst::Class(set) => match self.read_byte(th) {
                    Some(b) if class_matches(set, b, insensitive) => {
                        self.advance(th);
                        th.ip += 1;
                    }
                    _ => return Ok(StepResult::Die),
                },
                Inst::Not(set) => match self.read_byte(th) {
                    Some(b) if !class_matches(set, b, insensitive) => {
                        self.advance(th);
                        th.ip += 1;
                    }
                    _ => return Ok(StepResult::Die),
                },
                Inst::Digit => match self.read_byte(th) {
                    Some(b) if b.is_ascii_digit() => {
                        self.advance(th);
                        th.ip += 1;
                    }
                    _ => return Ok(StepResult::Die),
                },
                Inst::Word => match self.read_byte(th) {
                    Some(b) if is_word_byte(b) => {
                        self.advance(th);
                        th.ip += 1;
                    }
                    _ => return Ok(StepResult::Die),
                },
                Inst::Space => match self.read_byte(th) {
                    Some(b' ') | Some(b'\t') | Some(b'\r') | Some(b'\n') | Some(0x0b) | Some(0x0c) => {
                        self.advance(th);
                        th.ip += 1;
                    }
                    _ => return Ok(StepResult::Die),
                },
                Inst::Str(s) | Inst::TStr(s) => {
                    let s = s.clone();
                    if self.consume_literal(th, &s) {
                        th.ip += 1;
                    } else {
                        return Ok(StepResult::Die);
                    }
                }
                Inst::Backref(g) => {
                    let g = *g;
                    match group_span(&th.caps, g) {
                        Some((start, len)) => {
                            if start + len > self.subject.len() {
                                return Ok(StepResult::Die);
                            }
                            let slice = self.subject[start..start + len].to_vec();
                            if self.consume_literal(th, &slice) {
                                th.ip += 1;
                            } else {
                                return Ok(StepResult::Die);
                            }
                        }
                        None => return Ok(StepResult::Die),
                    }
                }
                Inst::Bol => {
                    let at_start = th.sp == 0;
                    let after_newline = th.sp > 0 && self.subject.get(th.sp - 1) == Some(&b'\n');
                    if at_start || after_newline {
                        th.ip += 1;
                    } else {
                        return Ok(StepResult::Die);
                    }
                }
                Inst::Eol => {
                    let at_end = th.sp == self.subject.len();
                    let before_newline = self.subject.get(th.sp) == Some(&b'\n');
                    if at_end || before_newline {
                        th.ip += 1;
                    } else {
                        return Ok(StepResult::Die);
                    }
                }
                Inst::Bos => {
                    if th.sp == 0 {
                        th.ip += 1;
                    } else {
                        return Ok(StepResult::Die);
                    }
                }
                Inst::Eos => {
                    if th.sp == self.subject.len() {
                        th.ip += 1;
                    } else {
                        return Ok(StepResult::Die);
                    }
                }
                Inst::Wb | Inst::Nwb => {
                    let prev = th.sp > 0 && self.subject.get(th.sp - 1).map(|&b| is_word_byte(b)).unwrap_or(false);
                    let next = self.subject.get(th.sp).map(|&b| is_word_byte(b)).unwrap_or(false);
                    let boundary = prev != next;
                    let wants_boundary = matches!(self.prog.insts[th.ip], Inst::Wb);
                    if boundary == wants_boundary {
                        th.ip += 1;
                    } else {
                        return Ok(StepResult::Die);
                    }
                }
                Inst::SetStart => {
                    th.caps[0] = Some(th.sp);
                    th.ip += 1;
                }
                Inst::SetOpt(v) => {
                    th.options = *v;
                    th.ip += 1;
                }
                Inst::Save(k) => {
                    let k = *k;
                    if k % 2 == 0 {
                        if k < th.caps.len() {
                            th.caps[k] = Some(th.sp);
                        }
                        th.ip += 1;
                    } else {
                        if let Some(anchor) = th.caps.get(k - 1).copied().flatten() {
                            if th.rev {
                                let true_start = th.sp;
                                let len = anchor.saturating_sub(th.sp);
                                th.caps[k - 1] = Some(true_start);
                                th.caps[k] = Some(len);
                            } else {
                                th.caps[k] = Some(th.sp.saturating_sub(anchor));
                            }
                        }
                        th.ip += 1;
                    }
                }
                Inst::Jmp(target) => {
                    th.ip = *target;
                }
                Inst::Branch(a, b) => {
                    let (a, b) = (*a, *b);
                    let mut deferred = th.clone();
                    deferred.ip = b;
                    th.ip = a;
                    return Ok(StepResult::Fork(deferred));
                }
                Inst::Call(addr) => {
                    let addr = *addr;
                    if th.calls.len() + 1 > limits::MAX_CALL_DEPTH {
                        return Err(Error::new(ErrorKind::CallOverflow, th.sp, "call stack overflow"));
                    }
                    th.calls.push(th.ip + 1);
                    th.ip = addr;
                }
                Inst::Ret => match th.calls.pop() {
                    Some(ret_ip) => th.ip = ret_ip,
                    None => return Ok(StepResult::Die),
                },
                Inst::Prog(k) => {
                    let k = *k;
                    if th.progress.get(k).copied().flatten() == Some(th.sp) {
                        return Ok(StepResult::Die);
                    }
                    if let Some(slot) = th.progress.get_mut(k) {
                        *slot = Some(th.sp);
                    }
                    th.ip += 1;
                }
                Inst::Try => {
                    th.atomics.push(self.stack.len());
                    th.ip += 1;
                }
                Inst::Catch => {
                    if let Some(saved) = th.atomics.pop() {
                        self.stack.truncate(saved);
                    }
                    th.ip += 1;
                }
                Inst::Pla => {
                    let open_ip = th.ip;
                    let options = th.options;
                    match self.eval_lookaround(&th.caps, open_ip, th.sp, false, options)? {
                        Some(caps) => {
                            th.caps = caps;
                            th.ip = self.prog.pairs[&open_ip] + 1;
                        }
                        None => return Ok(StepResult::Die),
                    }
                }
                Inst::Nla => {
                    let open_ip = th.ip;
                    let options = th.options;
                    match self.eval_lookaround(&th.caps, open_ip, th.sp, false, options)? {
                        Some(_) => return Ok(StepResult::Die),
                        None => th.ip = self.prog.pairs[&open_ip] + 1,
                    }
                }
                Inst::Plb => {
                    let open_ip = th.ip;
                    let options = th.options;
                    match self.eval_lookaround(&th.caps, open_ip, th.sp, true, options)? {
                        Some(caps) => {
                            th.caps = caps;
                            th.ip = self.prog.pairs[&open_ip] + 1;
                        }
                        None => return Ok(StepResult::Die),
                    }
                }
                Inst::Nlb => {
                    let open_ip = th.ip;
                    let options = th.options;
                    match self.eval_lookaround(&th.caps, open_ip, th.sp, true, options)? {
                        Some(_) => return Ok(StepResult::Die),
                        None => th.ip = self.prog.pairs[&open_ip] + 1,
                    }
                }
                // These are markers consumed by `eval_lookaround`'s `stop_ip`
                // check; the outer loop never steps onto one directly.
                Inst::PlaWin | Inst::NlaFail | Inst::PlbWin | Inst::NlbFail => {
                    th.ip += 1;
                }
                Inst::Match => return Ok(StepResult::Match),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compiler::compile;
    use crate::parser::Parser;

    fn run(pattern: &str, subject: &[u8], options: Options) -> Option<Captures> {
        let opts = options.normalize().expect("valid options");
        let parsed = Parser::new(pattern.as_bytes(), opts).parse().expect("parse failed");
        let prog = compile(parsed, opts).expect("compile failed");
        let mut vm = Vm::new(&prog, subject);
        if prog.anchored {
            vm.run_anchored(0, 0, opts).expect("exec failed")
        } else {
            vm.run_unaccelerated(0, opts).expect("exec failed")
        }
    }

    #[test]
    fn greedy_plus_captures_last_iteration() {
        let caps = run("(a|b)+", b"aaabbba", Options::NONE).unwrap();
        assert_eq!(group_span(&caps, 0), Some((0, 7)));
        assert_eq!(group_span(&caps, 1), Some((6, 1)));
    }

    #[test]
    fn lazy_quantifier_stops_at_first_candidate() {
        let caps = run("a.*?b", b"axxbxxb", Options::NONE).unwrap();
        assert_eq!(group_span(&caps, 0), Some((0, 4)));
    }

    #[test]
    fn atomic_group_forbids_backtracking_into_it() {
        assert!(run("(?>a+)a", b"aaaa", Options::NONE).is_none());
    }

    #[test]
    fn counted_repetition_stops_at_upper_bound() {
        let caps = run("a{2,4}", b"aaaaa", Options::NONE).unwrap();
        assert_eq!(group_span(&caps, 0), Some((0, 4)));
    }

    #[test]
    fn positive_lookahead_does_not_consume() {
        let caps = run("a(?=b)", b"ab", Options::UNANCHORED).unwrap();
        assert_eq!(group_span(&caps, 0), Some((0, 1)));
    }

    #[test]
    fn positive_lookbehind_matches_after_its_anchor() {
        let caps = run("(?<=foo)bar", b"foobar", Options::UNANCHORED).unwrap();
        assert_eq!(group_span(&caps, 0), Some((3, 3)));
    }

    #[test]
    fn backreference_matches_repeated_word() {
        let caps = run(r"(\w+) \1", b"the the end", Options::UNANCHORED).unwrap();
        assert_eq!(group_span(&caps, 0), Some((0, 7)));
    }

    #[test]
    fn case_insensitive_literal() {
        let caps = run("ABC", b"abc", Options::INSENSITIVE).unwrap();
        assert_eq!(group_span(&caps, 0), Some((0, 3)));
    }

    #[test]
    fn named_groups_resolve_by_position() {
        let caps = run(r"(?<year>\d{4})-(?<m>\d{2})", b"2024-11", Options::NONE).unwrap();
        assert_eq!(group_span(&caps, 1), Some((0, 4)));
        assert_eq!(group_span(&caps, 2), Some((5, 2)));
    }

    #[test]
    fn branch_reset_reuses_group_slots() {
        let caps = run("(?|(a)(b)|(c)(d))", b"cd", Options::NONE).unwrap();
        assert_eq!(group_span(&caps, 1), Some((0, 1)));
        assert_eq!(group_span(&caps, 2), Some((1, 1)));
    }

    #[test]
    fn subroutine_call_reenters_group_body() {
        let caps = run(r"(a|b)(?1)", b"ab", Options::NONE).unwrap();
        assert_eq!(group_span(&caps, 0), Some((0, 2)));
    }

    #[test]
    fn negative_lookahead_rejects_match() {
        assert!(run("a(?!b)", b"ab", Options::NONE).is_none());
        let caps = run("a(?!b)", b"ac", Options::UNANCHORED).unwrap();
        assert_eq!(group_span(&caps, 0), Some((0, 1)));
    }
}
