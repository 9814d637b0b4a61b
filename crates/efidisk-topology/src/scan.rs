//! Cursor over kernel-generated text.
//!
//! Every primitive either matches and advances, or fails and leaves the cursor where it was. That
//! makes "did not match" cheap to tell apart from "matched, then broke": callers wrap a grammar in
//! [`Scanner::attempt`] to try it, and only turn a failure into an error once a prefix has
//! committed them to that grammar.

use std::str::FromStr;

#[derive(Debug, Clone, Copy)]
pub(crate) struct Scanner<'a> {
    input: &'a str,
    pos: usize,
}

impl<'a> Scanner<'a> {
    pub(crate) fn new(input: &'a str) -> Self {
        Self { input, pos: 0 }
    }

    pub(crate) fn rest(&self) -> &'a str {
        &self.input[self.pos..]
    }

    pub(crate) fn consumed(&self) -> usize {
        self.pos
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.pos == self.input.len()
    }

    /// Runs `f`, rewinding the cursor if it returns `None`.
    pub(crate) fn attempt<T>(&mut self, f: impl FnOnce(&mut Self) -> Option<T>) -> Option<T> {
        let saved = self.pos;
        let out = f(self);
        if out.is_none() {
            self.pos = saved;
        }
        out
    }

    pub(crate) fn starts_with(&self, lit: &str) -> bool {
        self.rest().starts_with(lit)
    }

    pub(crate) fn literal(&mut self, lit: &str) -> Option<()> {
        if self.starts_with(lit) {
            self.pos += lit.len();
            Some(())
        } else {
            None
        }
    }

    fn take_while(&mut self, max: usize, pred: impl Fn(u8) -> bool) -> &'a str {
        let len = self
            .rest()
            .bytes()
            .take(max)
            .take_while(|b| pred(*b))
            .count();
        let out = &self.rest()[..len];
        self.pos += len;
        out
    }

    /// Unsigned decimal number of at least one digit that fits in `T`.
    pub(crate) fn dec<T: FromStr>(&mut self) -> Option<T> {
        self.attempt(|s| {
            let digits = s.take_while(usize::MAX, |b| b.is_ascii_digit());
            if digits.is_empty() {
                return None;
            }
            digits.parse().ok()
        })
    }

    /// Hexadecimal number of one to `max_digits` digits that fits in `T`.
    pub(crate) fn hex<T: TryFrom<u64>>(&mut self, max_digits: usize) -> Option<T> {
        self.attempt(|s| {
            let digits = s.take_while(max_digits, |b| b.is_ascii_hexdigit());
            if digits.is_empty() {
                return None;
            }
            let value = u64::from_str_radix(digits, 16).ok()?;
            T::try_from(value).ok()
        })
    }

    /// Hexadecimal number of exactly `digits` digits.
    pub(crate) fn hex_exact<T: TryFrom<u64>>(&mut self, digits: usize) -> Option<T> {
        self.attempt(|s| {
            let start = s.pos;
            let value = s.hex(digits)?;
            (s.pos - start == digits).then_some(value)
        })
    }

    /// Non-empty run of characters up to the next `/` or the end of input.
    pub(crate) fn segment(&mut self) -> Option<&'a str> {
        let seg = self.take_while(usize::MAX, |b| b != b'/');
        if seg.is_empty() {
            None
        } else {
            Some(seg)
        }
    }
}
