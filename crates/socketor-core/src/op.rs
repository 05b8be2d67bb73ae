//! Arithmetic evaluator
//!
//! The server applies one operation, fixed at startup, to every request.
//! Operand parsing is deliberately permissive: whatever C `atoi` would make
//! of the text is what the operand is worth.

use core::fmt;

/// The four supported operations
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OpKind {
    Add,
    Sub,
    Mul,
    Div,
}

impl OpKind {
    /// Classify a symbol by its first byte; anything unrecognized adds
    pub fn from_symbol(symbol: &str) -> Self {
        match symbol.as_bytes().first() {
            Some(b'-') => OpKind::Sub,
            Some(b'*') => OpKind::Mul,
            Some(b'/') => OpKind::Div,
            _ => OpKind::Add,
        }
    }

    /// Apply to two operands
    ///
    /// Returns `None` where the machine operation has no result: division
    /// by zero and `i32::MIN / -1`. Other overflow wraps.
    #[inline]
    pub fn apply(self, a: i32, b: i32) -> Option<i32> {
        match self {
            OpKind::Add => Some(a.wrapping_add(b)),
            OpKind::Sub => Some(a.wrapping_sub(b)),
            OpKind::Mul => Some(a.wrapping_mul(b)),
            OpKind::Div => a.checked_div(b),
        }
    }
}

/// The server's operation: the symbol as configured plus what it means
///
/// The symbol is echoed verbatim in responses, so `"x"` reads back as
/// `"1 x 2 = 3"` even though it falls back to addition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Operation {
    symbol: String,
    kind: OpKind,
}

impl Operation {
    pub fn new(symbol: impl Into<String>) -> Self {
        let symbol = symbol.into();
        let kind = OpKind::from_symbol(&symbol);
        Self { symbol, kind }
    }

    #[inline]
    pub fn symbol(&self) -> &str {
        &self.symbol
    }

    #[inline]
    pub fn kind(&self) -> OpKind {
        self.kind
    }

    /// Parse both operands and apply the operation
    pub fn evaluate(&self, a: &[u8], b: &[u8]) -> Option<i32> {
        self.kind.apply(parse_operand(a), parse_operand(b))
    }
}

impl Default for Operation {
    fn default() -> Self {
        Operation::new("+")
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.symbol)
    }
}

/// Evaluate with an optional operation; no operation means addition
pub fn calculate(op: Option<&Operation>, a: &[u8], b: &[u8]) -> Option<i32> {
    match op {
        Some(op) => op.evaluate(a, b),
        None => OpKind::Add.apply(parse_operand(a), parse_operand(b)),
    }
}

/// `atoi`-style integer parse
///
/// Skips leading ASCII whitespace, accepts one sign, then reads decimal
/// digits up to the first non-digit. No digits means 0. Out-of-range
/// values saturate at the `i32` bounds.
pub fn parse_operand(text: &[u8]) -> i32 {
    let mut i = 0;
    while i < text.len() && text[i].is_ascii_whitespace() {
        i += 1;
    }

    let mut negative = false;
    if i < text.len() && (text[i] == b'+' || text[i] == b'-') {
        negative = text[i] == b'-';
        i += 1;
    }

    let mut value: i64 = 0;
    while i < text.len() && text[i].is_ascii_digit() {
        value = value * 10 + i64::from(text[i] - b'0');
        if value > i64::from(i32::MAX) + 1 {
            break;
        }
        i += 1;
    }

    let value = if negative { -value } else { value };
    value.clamp(i64::from(i32::MIN), i64::from(i32::MAX)) as i32
}
