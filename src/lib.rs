// Copyright 2014-2015 The Rust Project Developers. See the COPYRIGHT
// file at the top-level directory of this distribution and at
// http://rust-lang.org/COPYRIGHT.
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// http://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your
// option. This file may not be copied, modified, or distributed
// except according to those terms.

//! A byte-oriented, Perl-flavored backtracking regular expression engine.
//!
//! Patterns are parsed into an AST (`parser`), lowered into a linear
//! bytecode (`compiler`), and interpreted by an explicit backtracking
//! virtual machine (`vm`) that supports named groups, atomic groups,
//! look-around, subroutine calls, and backreferences. Matching is
//! byte-oriented throughout: there is no Unicode-aware case folding or
//! character-class semantics, only ASCII A-Z/a-z folding under
//! `Options::INSENSITIVE`.
//!
//! ```
//! use retrace::{Options, Regex};
//!
//! let re = Regex::new(r"(?<year>\d{4})-(?<month>\d{2})").unwrap();
//! let caps = re.captures(b"2024-11").unwrap().unwrap();
//! assert_eq!(caps.name("year"), Some((0, 4)));
//! assert_eq!(caps.name("month"), Some((5, 2)));
//! ```
//!
//! Enable the `trace` feature to narrate parser/compiler/VM decisions
//! through the `log` crate; it never changes matching behavior, only
//! what gets logged.

mod ast;
mod compiler;
mod error;
mod inst;
mod limits;
mod options;
mod parser;
mod regex;
mod template;
mod vm;

pub use crate::error::{Error, ErrorKind, Result};
pub use crate::options::Options;
pub use crate::regex::{find, is_match, replace, Captures, CapturesIter, Regex};

/// The ten concrete pattern/subject scenarios pinned down at the top of
/// the crate, plus a handful of randomized checks on the disjointness
/// and case-insensitivity invariants they're drawn from.
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scenario_1_greedy_plus_captures_last_alternative() {
        let re = Regex::new(r"(a|b)+").unwrap();
        let caps = re.captures(b"aaabbba").unwrap().unwrap();
        assert_eq!(caps.span(), (0, 7));
        assert_eq!(caps.group(1), Some((6, 1)));
    }

    #[test]
    fn scenario_2_named_groups() {
        let re = Regex::new(r"(?<year>\d{4})-(?<m>\d{2})").unwrap();
        let caps = re.captures(b"2024-11").unwrap().unwrap();
        assert_eq!(caps.name("year"), Some((0, 4)));
        assert_eq!(caps.name("m"), Some((5, 2)));
    }

    #[test]
    fn scenario_3_lookahead_does_not_consume() {
        let re = Regex::with_options("a(?=b)", Options::UNANCHORED).unwrap();
        let caps = re.captures(b"ab ac").unwrap().unwrap();
        assert_eq!(caps.span(), (0, 1));
    }

    #[test]
    fn scenario_4_lookbehind_matches_after_anchor() {
        let re = Regex::with_options(r"(?<=foo)bar", Options::UNANCHORED).unwrap();
        let caps = re.captures(b"foobar xbar").unwrap().unwrap();
        assert_eq!(caps.span(), (3, 3));
    }

    #[test]
    fn scenario_5_lazy_quantifier_prefers_shortest() {
        let re = Regex::new("a.*?b").unwrap();
        let caps = re.captures(b"axxbxxb").unwrap().unwrap();
        assert_eq!(caps.span(), (0, 4));
    }

    #[test]
    fn scenario_6_atomic_group_blocks_backtracking() {
        let re = Regex::new("(?>a+)a").unwrap();
        assert!(re.captures(b"aaaa").unwrap().is_none());
    }

    #[test]
    fn scenario_7_backreference_matches_repeated_word() {
        let re = Regex::with_options(r"(\w+) \1", Options::UNANCHORED).unwrap();
        let caps = re.captures(b"the the end").unwrap().unwrap();
        assert_eq!(caps.span(), (0, 7));
    }

    #[test]
    fn scenario_8_counted_repetition_caps_at_upper_bound() {
        let re = Regex::new("a{2,4}").unwrap();
        let caps = re.captures(b"aaaaa").unwrap().unwrap();
        assert_eq!(caps.span(), (0, 4));
    }

    #[test]
    fn scenario_9_branch_reset_reuses_group_numbers() {
        let re = Regex::new(r"(?|(a)(b)|(c)(d))").unwrap();
        let caps = re.captures(b"cd").unwrap().unwrap();
        assert_eq!(caps.group(1), Some((0, 1)));
        assert_eq!(caps.group(2), Some((1, 1)));
    }

    #[test]
    fn scenario_10_multiline_only_matches_where_the_literal_follows() {
        // MULTILINE governs `.`, not `^`/`$` (those are always newline-adjacent
        // in this dialect) — there's only one "foo" in the subject, so GLOBAL
        // must not manufacture a second match at the line starting "bar".
        let re = Regex::with_options("^foo", Options::MULTILINE | Options::GLOBAL).unwrap();
        let matches: Vec<_> = re.captures_iter(b"foo\nbar").map(|c| c.unwrap().span()).collect();
        assert_eq!(matches, vec![(0, 3)]);
    }

    #[test]
    fn bol_is_newline_adjacent_regardless_of_multiline() {
        let re = Regex::with_options("^bar", Options::GLOBAL).unwrap();
        let matches: Vec<_> = re.captures_iter(b"foo\nbar").map(|c| c.unwrap().span()).collect();
        assert_eq!(matches, vec![(4, 3)]);
    }

    #[test]
    fn property_case_insensitive_matches_lowercased_equivalent() {
        use rand::seq::SliceRandom;
        let words = ["Hello", "WORLD", "MiXeD", "abcXYZ"];
        let mut rng = rand::thread_rng();
        for _ in 0..20 {
            let pattern = *words.choose(&mut rng).unwrap();
            let subject = *words.choose(&mut rng).unwrap();
            let insensitive = Regex::with_options(pattern, Options::INSENSITIVE).unwrap();
            let lowered_pattern = pattern.to_ascii_lowercase();
            let lowered_subject = subject.to_ascii_lowercase();
            let plain = Regex::new(&lowered_pattern).unwrap();
            assert_eq!(
                insensitive.is_match(subject.as_bytes()).unwrap(),
                plain.is_match(lowered_subject.as_bytes()).unwrap()
            );
        }
    }

    #[test]
    fn property_global_matches_stay_disjoint_and_ordered() {
        use rand::Rng;
        let re = Regex::with_options("a+", Options::GLOBAL).unwrap();
        let mut rng = rand::thread_rng();
        for _ in 0..20 {
            let len = rng.gen_range(0..20);
            let subject: String = (0..len).map(|_| if rng.gen_bool(0.5) { 'a' } else { 'b' }).collect();
            let spans: Vec<_> = re.captures_iter(subject.as_bytes()).map(|c| c.unwrap().span()).collect();
            for pair in spans.windows(2) {
                let (start, plen) = pair[0];
                assert!(start + plen.max(1) <= pair[1].0);
            }
        }
    }

    #[test]
    fn replace_is_identity_when_pattern_never_matches() {
        let re = Regex::new("zzz").unwrap();
        let subject = b"nothing to see here";
        assert_eq!(re.filter(subject, "-", "$").unwrap(), subject.to_vec());
    }

    #[test]
    fn split_reconstructs_subject_with_matched_separators() {
        let re = Regex::with_options(r"\s+", Options::GLOBAL).unwrap();
        let subject = "one  two three";
        let pieces = re.split(subject.as_bytes()).unwrap();
        let mut rebuilt = String::new();
        let mut rest = subject;
        for (i, piece) in pieces.iter().enumerate() {
            let piece = std::str::from_utf8(piece).unwrap();
            let at = rest.find(piece).unwrap();
            rebuilt.push_str(&rest[..at]);
            rebuilt.push_str(piece);
            rest = &rest[at + piece.len()..];
            let _ = i;
        }
        rebuilt.push_str(rest);
        assert_eq!(rebuilt, subject);
    }
}
