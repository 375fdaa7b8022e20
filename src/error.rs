// Copyright 2014-2015 The Rust Project Developers. See the COPYRIGHT
// file at the top-level directory of this distribution and at
// http://rust-lang.org/COPYRIGHT.
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// http://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your
// option. This file may not be copied, modified, or distributed
// except according to those terms.

use std::error;
use std::fmt;

/// The class of failure recorded by a `Regex` operation.
///
/// `NO_ERROR` from the dialect's error table has no variant here: the
/// absence of an error is simply `Result::Ok`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ErrorKind {
    /// The VM's thread stack grew past its hard cap.
    StackOverflow,
    /// The VM's call-frame stack grew past its hard cap.
    CallOverflow,
    /// The pattern could not be parsed.
    Syntax,
    /// A resource limit on total allocation was exceeded.
    OutOfMemory,
    /// The pattern opened more capture groups than the hard cap allows.
    TooManyGroups,
    /// An invalid combination of options was requested (`GLOBAL` with
    /// `CONTINUE`).
    InvalidOptions,
}

impl ErrorKind {
    fn description(self) -> &'static str {
        match self {
            ErrorKind::StackOverflow => "thread stack overflow",
            ErrorKind::CallOverflow => "call stack overflow",
            ErrorKind::Syntax => "syntax error",
            ErrorKind::OutOfMemory => "out of memory",
            ErrorKind::TooManyGroups => "too many groups",
            ErrorKind::InvalidOptions => "invalid options",
        }
    }
}

/// An error produced while parsing, compiling, or executing a pattern.
///
/// Errors latch: once one has been recorded against a `Regex`, later
/// operations on that same value become inert and return the same error.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Error {
    kind: ErrorKind,
    /// Byte offset into the pattern (parse/compile errors) or subject
    /// (runtime errors) at which the failure was detected.
    offset: usize,
    message: String,
}

impl Error {
    pub fn new(kind: ErrorKind, offset: usize, message: impl Into<String>) -> Error {
        Error { kind, offset, message: message.into() }
    }

    pub fn kind(&self) -> ErrorKind {
        self.kind
    }

    pub fn offset(&self) -> usize {
        self.offset
    }

    pub fn message(&self) -> &str {
        &self.message
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} at offset {}: {}", self.kind.description(), self.offset, self.message)
    }
}

impl error::Error for Error {}

pub type Result<T> = std::result::Result<T, Error>;

/// First-error-wins latch shared by the parser, compiler, and VM.
///
/// Every stage records through the same `Diagnostics`; whichever one gets
/// there first decides the error the whole context reports, and everything
/// after that point is inert.
#[derive(Clone, Debug, Default)]
pub struct Diagnostics {
    error: Option<Error>,
}

impl Diagnostics {
    pub fn new() -> Diagnostics {
        Diagnostics::default()
    }

    /// Records `error` unless one has already been latched.
    pub fn record(&mut self, kind: ErrorKind, offset: usize, message: impl Into<String>) {
        if self.error.is_none() {
            self.error = Some(Error::new(kind, offset, message));
            #[cfg(feature = "trace")]
            log::trace!("diagnostics: latched {:?}", self.error);
        }
    }

    pub fn has_error(&self) -> bool {
        self.error.is_some()
    }

    pub fn error(&self) -> Option<&Error> {
        self.error.as_ref()
    }

    pub fn into_error(self) -> Option<Error> {
        self.error
    }

    pub fn take(&mut self) -> Option<Error> {
        self.error.take()
    }
}
