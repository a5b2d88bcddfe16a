//! Diagnostics: classify, count, and report lex/parse errors, and decide
//! when a translation must abort.
//!
//! `Diagnostics` is owned by the `TranslationContext` and threaded
//! through the scanner and parser by `&mut` reference, rather than read
//! from a global counter.

use cx_core::ErrorCode;

/// Above this many accumulated lex/parse errors, translation aborts with
/// `too_many_syntax_errors`.
pub const DEFAULT_ERROR_THRESHOLD: usize = 25;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ErrorEntry {
    pub code: ErrorCode,
    pub line: u32,
}

/// Accumulates lex/parse errors for a single translation.
#[derive(Debug, Clone)]
pub struct Diagnostics {
    errors: Vec<ErrorEntry>,
    threshold: usize,
}

impl Diagnostics {
    pub fn new(threshold: usize) -> Self {
        Diagnostics { errors: Vec::new(), threshold }
    }

    /// Record an error at `line`. Reporting never panics and never stops
    /// the caller; the caller decides whether to keep parsing by checking
    /// [`Diagnostics::over_threshold`] afterward.
    pub fn report(&mut self, code: ErrorCode, line: u32) {
        self.errors.push(ErrorEntry { code, line });
    }

    pub fn count(&self) -> usize {
        self.errors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.errors.is_empty()
    }

    pub fn entries(&self) -> &[ErrorEntry] {
        &self.errors
    }

    /// `true` once the accumulated error count exceeds the threshold;
    /// the parser aborts translation with `too_many_syntax_errors` the
    /// first time this flips.
    pub fn over_threshold(&self) -> bool {
        self.errors.len() > self.threshold
    }
}

impl Default for Diagnostics {
    fn default() -> Self {
        Diagnostics::new(DEFAULT_ERROR_THRESHOLD)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn threshold_flips_after_reporting_past_it() {
        let mut d = Diagnostics::new(2);
        assert!(!d.over_threshold());
        d.report(ErrorCode::InvalidNumber, 1);
        d.report(ErrorCode::InvalidNumber, 2);
        assert!(!d.over_threshold());
        d.report(ErrorCode::InvalidNumber, 3);
        assert!(d.over_threshold());
        assert_eq!(d.count(), 3);
    }
}
