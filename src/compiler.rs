// Copyright 2014-2015 The Rust Project Developers. See the COPYRIGHT
// file at the top-level directory of this distribution and at
// http://rust-lang.org/COPYRIGHT.
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// http://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your
// option. This file may not be copied, modified, or distributed
// except according to those terms.

//! Lowers a parsed AST into the linear bytecode `vm.rs` interprets.
//!
//! Forward references between a subroutine call (`(?N)`/`(?R)`) and the
//! group it targets are resolved through a side-table of pending patch
//! sites rather than by mirroring the two-phase "compile on first
//! textual occurrence" scheme: every `Call`/`Recurse` node either patches
//! immediately (its target group is already compiled) or queues its
//! instruction index, and the queue drains as soon as the target group's
//! address becomes known.

use std::collections::HashMap;
use std::collections::HashSet;
use std::rc::Rc;

use crate::ast::{GroupTable, Greedy, Node};
use crate::error::{Diagnostics, Error, ErrorKind};
use crate::inst::{Inst, InstIdx, Program};
use crate::options::Options;
use crate::parser::Parsed;

pub struct Compiler {
    insts: Vec<Inst>,
    groups: GroupTable,
    diagnostics: Diagnostics,
    progress_slots: usize,
    called: HashSet<usize>,
    pending_calls: HashMap<usize, Vec<InstIdx>>,
    pairs: HashMap<InstIdx, InstIdx>,
}

pub fn compile(parsed: Parsed, options: Options) -> Result<Program, Error> {
    let mut c = Compiler {
        insts: Vec::new(),
        groups: parsed.groups,
        diagnostics: Diagnostics::new(),
        progress_slots: 0,
        called: HashSet::new(),
        pending_calls: HashMap::new(),
        pairs: HashMap::new(),
    };
    c.collect_called(&parsed.root);
    c.compile_root(&parsed.root, options);
    c.finish(options)
}

impl Compiler {
    fn emit(&mut self, inst: Inst) -> InstIdx {
        self.insts.push(inst);
        self.insts.len() - 1
    }

    fn here(&self) -> InstIdx {
        self.insts.len()
    }

    fn err(&mut self, kind: ErrorKind, message: impl Into<String>) {
        self.diagnostics.record(kind, 0, message);
    }

    fn new_progress_slot(&mut self) -> usize {
        let k = self.progress_slots;
        self.progress_slots += 1;
        k
    }

    /// Finds every capture group ever targeted by a `Call`/`Recurse` node
    /// so the compiler knows, before emitting a single instruction,
    /// which group bodies must also be reachable as subroutines.
    fn collect_called(&mut self, node: &Node) {
        match node {
            Node::Call(n) => {
                self.called.insert(*n);
            }
            Node::Recurse => {
                self.called.insert(0);
            }
            Node::Sequence(a, b) | Node::Or(a, b) => {
                self.collect_called(a);
                self.collect_called(b);
            }
            Node::Group { body, .. }
            | Node::Atom(body)
            | Node::Asterisk(body, _)
            | Node::Plus(body, _)
            | Node::Question(body, _)
            | Node::Pla(body)
            | Node::Nla(body)
            | Node::Plb(body)
            | Node::Nlb(body) => self.collect_called(body),
            Node::Rep { body, .. } => self.collect_called(body),
            _ => {}
        }
    }

    fn compile_root(&mut self, root: &Node, options: Options) {
        let anchored = !options.contains(Options::UNANCHORED);
        if !anchored {
            // Fixed three-instruction preamble: try the body at the
            // current offset, else consume a byte and loop.
            self.emit(Inst::Branch(3, 1));
            self.emit(Inst::Many);
            self.emit(Inst::Branch(3, 1));
        }
        self.compile_group_body(0, root, false);
        self.emit(Inst::Match);
    }

    /// Shared by the implicit whole-match group (index 0) and every
    /// explicit `(...)` the parser opened.
    fn compile_group_body(&mut self, index: usize, body: &Node, rev: bool) {
        let already_compiled = self.groups.get(index).map(|g| g.is_compiled).unwrap_or(false);
        let is_called = self.called.contains(&index);

        if is_called && !already_compiled {
            let call_pos = self.emit(Inst::Call(0));
            self.emit(Inst::Save(2 * index + 1));
            let jmp_pos = self.emit(Inst::Jmp(0));
            let addr = self.here();
            self.emit(Inst::Save(2 * index));
            self.compile_node(body, rev);
            self.emit(Inst::Ret);
            let end = self.here();
            self.patch_jmp(jmp_pos, end);
            self.patch_call(call_pos, addr);
            self.set_group_address(index, addr);
            self.resolve_pending(index, addr + 1);
        } else if already_compiled {
            self.emit(Inst::Save(2 * index));
            self.compile_node(body, rev);
            self.emit(Inst::Save(2 * index + 1));
        } else {
            let addr = self.here();
            self.emit(Inst::Save(2 * index));
            self.compile_node(body, rev);
            self.emit(Inst::Save(2 * index + 1));
            self.set_group_address(index, addr);
        }
    }

    fn set_group_address(&mut self, index: usize, addr: InstIdx) {
        if let Some(g) = self.groups.get_mut(index) {
            g.address = Some(addr);
            g.is_compiled = true;
        }
    }

    fn resolve_pending(&mut self, index: usize, target: InstIdx) {
        if let Some(sites) = self.pending_calls.remove(&index) {
            for site in sites {
                self.patch_call(site, target);
            }
        }
    }

    fn patch_jmp(&mut self, pos: InstIdx, target: InstIdx) {
        self.insts[pos] = Inst::Jmp(target);
    }

    fn patch_call(&mut self, pos: InstIdx, target: InstIdx) {
        self.insts[pos] = Inst::Call(target);
    }

    fn patch_branch(&mut self, pos: InstIdx, a: InstIdx, b: InstIdx) {
        self.insts[pos] = Inst::Branch(a, b);
    }

    fn branch_operands(greedy: Greedy, body: InstIdx, end: InstIdx) -> (InstIdx, InstIdx) {
        match greedy {
            Greedy::Greedy => (body, end),
            Greedy::Lazy => (end, body),
        }
    }

    fn compile_node(&mut self, node: &Node, rev: bool) {
        match node {
            Node::None => {}
            Node::Char(c) => {
                self.emit(Inst::Char(*c));
            }
            Node::Sequence(a, b) => {
                if rev {
                    self.compile_node(b, rev);
                    self.compile_node(a, rev);
                } else {
                    self.compile_node(a, rev);
                    self.compile_node(b, rev);
                }
            }
            Node::Or(a, b) => {
                let branch_pos = self.emit(Inst::Branch(0, 0));
                let left = self.here();
                self.compile_node(a, rev);
                let jmp_pos = self.emit(Inst::Jmp(0));
                let right = self.here();
                self.compile_node(b, rev);
                let end = self.here();
                self.patch_branch(branch_pos, left, right);
                self.patch_jmp(jmp_pos, end);
            }
            Node::Group { index, body } => {
                self.compile_group_body(*index, body, rev);
            }
            Node::Atom(body) => {
                let open = self.emit(Inst::Try);
                self.compile_node(body, rev);
                let close = self.emit(Inst::Catch);
                self.pairs.insert(open, close);
            }
            Node::Class(bytes) => {
                self.emit(Inst::Class(Rc::from(bytes.as_slice())));
            }
            Node::Not(bytes) => {
                self.emit(Inst::Not(Rc::from(bytes.as_slice())));
            }
            Node::Str(bytes) => {
                // `Vm::consume_literal` already walks `bytes` back to front
                // when `th.rev` is set (see `src/vm.rs`), the same way it
                // does for `Backref`'s un-reversed slice. Reversing here too
                // would compare the literal against the subject in the
                // wrong order inside a look-behind.
                self.emit(Inst::Str(Rc::from(bytes.as_slice())));
            }
            Node::Asterisk(body, greedy) => self.compile_star(body, *greedy, rev),
            Node::Plus(body, greedy) => self.compile_plus(body, *greedy, rev),
            Node::Question(body, greedy) => self.compile_question(body, *greedy, rev),
            Node::Rep { body, min, max } => self.compile_rep(body, *min, *max, rev),
            Node::Any => {
                self.emit(Inst::Any);
            }
            Node::Many => {
                self.emit(Inst::Many);
            }
            Node::Bol => {
                self.emit(Inst::Bol);
            }
            Node::Eol => {
                self.emit(Inst::Eol);
            }
            Node::Bos => {
                self.emit(Inst::Bos);
            }
            Node::Eos => {
                self.emit(Inst::Eos);
            }
            Node::WordBoundary => {
                self.emit(Inst::Wb);
            }
            Node::NotWordBoundary => {
                self.emit(Inst::Nwb);
            }
            Node::Digit => {
                self.emit(Inst::Digit);
            }
            Node::Word => {
                self.emit(Inst::Word);
            }
            Node::Space => {
                self.emit(Inst::Space);
            }
            Node::SetStart => {
                self.emit(Inst::SetStart);
            }
            Node::SetOpt(opts) => {
                self.emit(Inst::SetOpt(*opts));
            }
            Node::Backref(g) => {
                let ok = self.groups.get(*g).map(|info| info.is_compiled).unwrap_or(false);
                if !ok {
                    self.err(ErrorKind::Syntax, format!("backreference to undefined or not-yet-closed group {}", g));
                }
                self.emit(Inst::Backref(*g));
            }
            Node::Call(g) => self.compile_call(*g),
            Node::Recurse => self.compile_call(0),
            Node::Pla(body) => {
                let open = self.emit(Inst::Pla);
                self.compile_node(body, false);
                let close = self.emit(Inst::PlaWin);
                self.pairs.insert(open, close);
            }
            Node::Nla(body) => {
                let open = self.emit(Inst::Nla);
                self.compile_node(body, false);
                let close = self.emit(Inst::NlaFail);
                self.pairs.insert(open, close);
            }
            Node::Plb(body) => {
                let open = self.emit(Inst::Plb);
                self.compile_node(body, true);
                let close = self.emit(Inst::PlbWin);
                self.pairs.insert(open, close);
            }
            Node::Nlb(body) => {
                let open = self.emit(Inst::Nlb);
                self.compile_node(body, true);
                let close = self.emit(Inst::NlbFail);
                self.pairs.insert(open, close);
            }
        }
    }

    fn compile_call(&mut self, g: usize) {
        if let Some(addr) = self.groups.get(g).and_then(|info| info.address) {
            self.emit(Inst::Call(addr + 1));
        } else {
            let pos = self.emit(Inst::Call(0));
            self.pending_calls.entry(g).or_default().push(pos);
        }
    }

    fn compile_star(&mut self, body: &Node, greedy: Greedy, rev: bool) {
        let branch_pos = self.emit(Inst::Branch(0, 0));
        let slot = self.new_progress_slot();
        let prog_pos = self.emit(Inst::Prog(slot));
        self.compile_node(body, rev);
        let loop_branch = self.emit(Inst::Branch(0, 0));
        let end = self.here();
        let (a, b) = Self::branch_operands(greedy, prog_pos, end);
        self.patch_branch(branch_pos, a, b);
        self.patch_branch(loop_branch, a, b);
    }

    fn compile_plus(&mut self, body: &Node, greedy: Greedy, rev: bool) {
        if matches!(body, Node::Asterisk(..) | Node::Plus(..) | Node::Question(..) | Node::Rep { .. }) {
            let open = self.emit(Inst::Try);
            self.compile_node(body, rev);
            let close = self.emit(Inst::Catch);
            self.pairs.insert(open, close);
            return;
        }
        let slot = self.new_progress_slot();
        let body_pos = self.emit(Inst::Prog(slot));
        self.compile_node(body, rev);
        let branch_pos = self.emit(Inst::Branch(0, 0));
        let end = self.here();
        let (a, b) = Self::branch_operands(greedy, body_pos, end);
        self.patch_branch(branch_pos, a, b);
    }

    fn compile_question(&mut self, body: &Node, greedy: Greedy, rev: bool) {
        let branch_pos = self.emit(Inst::Branch(0, 0));
        let body_pos = self.here();
        self.compile_node(body, rev);
        let end = self.here();
        let (a, b) = Self::branch_operands(greedy, body_pos, end);
        self.patch_branch(branch_pos, a, b);
    }

    fn compile_rep(&mut self, body: &Node, min: u32, max: Option<u32>, rev: bool) {
        if let (Some(n), Node::Char(c)) = (max, body) {
            if n == min {
                let run = vec![*c; min as usize];
                self.emit(Inst::TStr(Rc::from(run.as_slice())));
                return;
            }
        }
        for _ in 0..min {
            self.compile_node(body, rev);
        }
        match max {
            Some(n) if n == min => {}
            Some(n) => {
                let mut branch_sites = Vec::new();
                for _ in 0..(n - min) {
                    let branch_pos = self.emit(Inst::Branch(0, 0));
                    let body_pos = self.here();
                    branch_sites.push((branch_pos, body_pos));
                    self.compile_node(body, rev);
                }
                let end = self.here();
                for (branch_pos, body_pos) in branch_sites {
                    self.patch_branch(branch_pos, body_pos, end);
                }
            }
            None => self.compile_star(body, Greedy::Greedy, rev),
        }
    }

    fn extract_prefix(&self, anchored: bool) -> Option<Rc<[u8]>> {
        let start = if anchored { 0 } else { 3 };
        // Skip the implicit whole-match Save(0).
        let start = start + 1;
        let mut bytes = Vec::new();
        for inst in self.insts.iter().skip(start) {
            match inst {
                Inst::Char(c) => bytes.push(*c),
                Inst::Str(s) => bytes.extend_from_slice(s),
                _ => break,
            }
        }
        if bytes.is_empty() {
            None
        } else {
            Some(Rc::from(bytes.as_slice()))
        }
    }

    fn finish(mut self, options: Options) -> Result<Program, Error> {
        if !self.pending_calls.is_empty() {
            let mut names: Vec<_> = self.pending_calls.keys().copied().collect();
            names.sort_unstable();
            self.err(ErrorKind::Syntax, format!("reference to undefined group(s) {:?}", names));
        }
        if self.groups.len() > crate::limits::MAX_GROUPS {
            self.err(ErrorKind::TooManyGroups, "too many capture groups");
        }
        if let Some(error) = self.diagnostics.take() {
            return Err(error);
        }
        let anchored = !options.contains(Options::UNANCHORED);
        let prefix = self.extract_prefix(anchored);
        #[cfg(feature = "trace")]
        log::trace!("compiler: emitted {} instructions, anchored={}", self.insts.len(), anchored);
        Ok(Program {
            insts: self.insts,
            num_groups: self.groups.len(),
            num_progress_slots: self.progress_slots,
            anchored,
            prefix,
            pairs: self.pairs,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::Parser;

    fn compile_pattern(pattern: &str, options: Options) -> Program {
        let parsed = Parser::new(pattern.as_bytes(), options).parse().expect("parse failed");
        compile(parsed, options).expect("compile failed")
    }

    #[test]
    fn unanchored_emits_preamble() {
        let prog = compile_pattern("a", Options::UNANCHORED);
        assert!(matches!(prog.insts[0], Inst::Branch(3, 1)));
        assert!(matches!(prog.insts[1], Inst::Many));
        assert!(matches!(prog.insts[2], Inst::Branch(3, 1)));
    }

    #[test]
    fn anchored_has_no_preamble() {
        let prog = compile_pattern("a", Options::NONE);
        assert!(matches!(prog.insts[0], Inst::Save(0)));
    }

    #[test]
    fn always_ends_in_match() {
        let prog = compile_pattern("a", Options::NONE);
        assert!(matches!(prog.insts.last(), Some(Inst::Match)));
    }

    #[test]
    fn backref_to_undefined_group_is_an_error() {
        let parsed = Parser::new(b"\\k<nope>", Options::NONE).parse();
        assert!(parsed.is_err());
    }

    #[test]
    fn literal_prefix_is_extracted() {
        let prog = compile_pattern("abc.*", Options::NONE);
        assert_eq!(prog.prefix.as_deref(), Some(&b"abc"[..]));
    }
}
