//! Output validation against a baseline.
//!
//! Binary baselines must match byte for byte. Textual baselines are walked
//! line by line in lock step; a line that differs textually may still pass
//! when a tolerance is configured and the leading numbers on both sides are
//! close enough. The whole output is always scanned so one failing
//! iteration reports every mismatch, with detail kept for the first
//! [`MISMATCH_CAP`] of them.

use std::borrow::Cow;
use std::fmt;
use std::iter;

use crate::lines::{Line, Lines, lines};
use crate::types::{Baseline, DiffMode};

/// Mismatches (and leftover lines) shown in full before only counting.
pub const MISMATCH_CAP: usize = 3;

/// Pass/fail plus what went wrong.
#[derive(Debug, Clone, PartialEq)]
pub struct ValidationOutcome {
    passed: bool,
    diagnostics: Diagnostics,
}

impl ValidationOutcome {
    fn pass() -> Self {
        Self {
            passed: true,
            diagnostics: Diagnostics::None,
        }
    }

    pub fn passed(&self) -> bool {
        self.passed
    }

    pub fn diagnostics(&self) -> &Diagnostics {
        &self.diagnostics
    }
}

/// Renders the diagnostic report; empty for a pass.
impl fmt::Display for ValidationOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.diagnostics, f)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Diagnostics {
    None,
    BinaryLength { expected: usize, actual: usize },
    BinaryContent { offset: usize },
    Text(TextReport),
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct TextReport {
    /// The first few mismatching line pairs.
    pub mismatches: Vec<Mismatch>,
    /// Mismatches beyond the cap, counted only.
    pub additional_mismatches: usize,
    /// Captured lines past the end of the baseline.
    pub surplus: Option<Leftover>,
    /// Baseline lines the captured output never reached.
    pub missing: Option<Leftover>,
}

impl TextReport {
    fn is_clean(&self) -> bool {
        self.mismatches.is_empty() && self.surplus.is_none() && self.missing.is_none()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Mismatch {
    /// 1-based.
    pub line: usize,
    pub expected: Vec<u8>,
    pub actual: Vec<u8>,
    /// Absolute difference of the leading numbers, when both parsed.
    pub error: Option<f64>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Leftover {
    pub shown: Vec<Vec<u8>>,
    pub omitted: usize,
}

impl Leftover {
    fn collect<'a>(rest: impl Iterator<Item = Line<'a>>) -> Self {
        let mut shown = Vec::new();
        let mut omitted = 0;
        for line in rest {
            if shown.len() < MISMATCH_CAP {
                shown.push(line.text.to_vec());
            } else {
                omitted += 1;
            }
        }
        Self { shown, omitted }
    }
}

/// Compare `captured` against `baseline`. No baseline means nothing to
/// check, so the outcome is a pass.
pub fn check(captured: &[u8], baseline: Option<&Baseline>) -> ValidationOutcome {
    let Some(baseline) = baseline else {
        return ValidationOutcome::pass();
    };
    match baseline.mode() {
        DiffMode::Binary => binary_diff(captured, baseline.as_bytes()),
        DiffMode::Textual { tolerance } => textual_diff(captured, baseline.as_bytes(), tolerance),
    }
}

fn binary_diff(captured: &[u8], expected: &[u8]) -> ValidationOutcome {
    let diagnostics = if captured.len() != expected.len() {
        Diagnostics::BinaryLength {
            expected: expected.len(),
            actual: captured.len(),
        }
    } else if let Some(offset) = captured.iter().zip(expected).position(|(a, b)| a != b) {
        Diagnostics::BinaryContent { offset }
    } else {
        return ValidationOutcome::pass();
    };
    ValidationOutcome {
        passed: false,
        diagnostics,
    }
}

/// Accumulates the state of one textual comparison.
struct TextDiff {
    tolerance: f64,
    report: TextReport,
}

impl TextDiff {
    fn compare(&mut self, line: usize, want: Line<'_>, got: Line<'_>) {
        if want.text == got.text {
            return;
        }

        let mut error = None;
        if self.tolerance != 0.0
            && let (Some(e), Some(a)) = (leading_number(want.text), leading_number(got.text))
        {
            let diff = (a - e).abs();
            if diff <= self.tolerance {
                return;
            }
            error = Some(diff);
        }

        if self.report.mismatches.len() < MISMATCH_CAP {
            self.report.mismatches.push(Mismatch {
                line,
                expected: want.text.to_vec(),
                actual: got.text.to_vec(),
                error,
            });
        } else {
            self.report.additional_mismatches += 1;
        }
    }

    fn finish(self) -> ValidationOutcome {
        if self.report.is_clean() {
            return ValidationOutcome::pass();
        }
        ValidationOutcome {
            passed: false,
            diagnostics: Diagnostics::Text(self.report),
        }
    }
}

fn textual_diff(captured: &[u8], expected: &[u8], tolerance: f64) -> ValidationOutcome {
    let mut want_lines: Lines<'_> = lines(expected);
    let mut got_lines: Lines<'_> = lines(captured);
    let mut diff = TextDiff {
        tolerance,
        report: TextReport::default(),
    };

    let mut line = 0;
    loop {
        match (want_lines.next(), got_lines.next()) {
            (Some(want), Some(got)) => {
                line += 1;
                diff.compare(line, want, got);
            }
            (None, Some(got)) => {
                diff.report.surplus = Some(Leftover::collect(iter::once(got).chain(got_lines)));
                break;
            }
            (Some(want), None) => {
                diff.report.missing = Some(Leftover::collect(iter::once(want).chain(want_lines)));
                break;
            }
            (None, None) => break,
        }
    }

    diff.finish()
}

/// Parse the first number on a line, after leading whitespace: the longest
/// prefix forming a decimal float, `inf`/`infinity` or `nan`. Hexadecimal
/// floats are not recognised, so `0x10` reads as `0`.
pub fn leading_number(text: &[u8]) -> Option<f64> {
    let start = text.iter().position(|b| !b.is_ascii_whitespace())?;
    let s = &text[start..];

    let mut i = 0;
    let negative = match s.first() {
        Some(b'-') => {
            i = 1;
            true
        }
        Some(b'+') => {
            i = 1;
            false
        }
        _ => false,
    };

    let word = &s[i..];
    let starts_with = |w: &str| word.len() >= w.len() && word[..w.len()].eq_ignore_ascii_case(w.as_bytes());
    if starts_with("inf") {
        return Some(if negative { f64::NEG_INFINITY } else { f64::INFINITY });
    }
    if starts_with("nan") {
        return Some(f64::NAN);
    }

    let count_digits = |from: usize| s[from..].iter().take_while(|b| b.is_ascii_digit()).count();

    let int_digits = count_digits(i);
    i += int_digits;
    let mut frac_digits = 0;
    if s.get(i) == Some(&b'.') {
        frac_digits = count_digits(i + 1);
        if int_digits > 0 || frac_digits > 0 {
            i += 1 + frac_digits;
        }
    }
    if int_digits == 0 && frac_digits == 0 {
        return None;
    }

    if matches!(s.get(i), Some(b'e' | b'E')) {
        let mut j = i + 1;
        if matches!(s.get(j), Some(b'+' | b'-')) {
            j += 1;
        }
        let exp_digits = count_digits(j);
        if exp_digits > 0 {
            i = j + exp_digits;
        }
    }

    std::str::from_utf8(&s[..i]).ok()?.parse().ok()
}

/// Render like C's `%g`: six significant digits, trailing zeros dropped,
/// scientific notation for very large or small magnitudes.
pub fn format_general(x: f64) -> String {
    if x.is_nan() {
        return "nan".to_string();
    }
    if x.is_infinite() {
        return if x < 0.0 { "-inf" } else { "inf" }.to_string();
    }
    if x == 0.0 {
        return "0".to_string();
    }

    // Round to six significant digits first; the exponent can shift (9.999999 -> 1e1).
    let sci = format!("{:.5e}", x);
    let (mantissa, exp) = match sci.split_once('e') {
        Some((m, e)) => (m, e.parse::<i32>().unwrap_or(0)),
        None => (sci.as_str(), 0),
    };

    if !(-4..6).contains(&exp) {
        let mantissa = trim_fraction(mantissa);
        let sign = if exp < 0 { '-' } else { '+' };
        format!("{}e{}{:02}", mantissa, sign, exp.abs())
    } else {
        let decimals = (5 - exp) as usize;
        trim_fraction(&format!("{:.*}", decimals, x)).to_string()
    }
}

fn trim_fraction(s: &str) -> &str {
    if s.contains('.') {
        s.trim_end_matches('0').trim_end_matches('.')
    } else {
        s
    }
}

fn show(text: &[u8]) -> Cow<'_, str> {
    let s = String::from_utf8_lossy(text);
    if s.ends_with('\n') {
        s
    } else {
        Cow::Owned(format!("{}\n", s))
    }
}

impl fmt::Display for Diagnostics {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Diagnostics::None => Ok(()),
            Diagnostics::BinaryLength { expected, actual } => writeln!(
                f,
                "Error: Binary data lengths differ. (Expected {}, got {})",
                expected, actual
            ),
            Diagnostics::BinaryContent { offset } => {
                writeln!(f, "Error: Binary data mismatch at byte offset {}.", offset)
            }
            Diagnostics::Text(report) => fmt::Display::fmt(report, f),
        }
    }
}

impl fmt::Display for TextReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if !self.mismatches.is_empty() {
            writeln!(f, "Error: Diff failed.")?;
            for m in &self.mismatches {
                write!(f, "  Expected: {}", show(&m.expected))?;
                write!(f, "  Actual:   {}", show(&m.actual))?;
                if let Some(err) = m.error {
                    writeln!(f, "  Error:    {}", format_general(err))?;
                }
            }
            if self.additional_mismatches > 0 {
                writeln!(f, "... {} additional mismatches.", self.additional_mismatches)?;
            }
        }

        if let Some(surplus) = &self.surplus {
            writeln!(f, "Error: Expected result ended before end of actual result.")?;
            write_leftover(f, surplus)?;
        }

        if let Some(missing) = &self.missing {
            writeln!(f, "Error: Actual result ended before end of expected result.")?;
            write_leftover(f, missing)?;
        }

        Ok(())
    }
}

fn write_leftover(f: &mut fmt::Formatter<'_>, leftover: &Leftover) -> fmt::Result {
    writeln!(f, "Remaining:")?;
    for line in &leftover.shown {
        write!(f, "{}", show(line))?;
    }
    if leftover.omitted > 0 {
        writeln!(f, "... {} more lines.", leftover.omitted)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn text(baseline: &str, tolerance: f64) -> Baseline {
        Baseline::new(baseline.as_bytes().to_vec(), DiffMode::Textual { tolerance })
    }

    fn binary(baseline: &[u8]) -> Baseline {
        Baseline::new(baseline.to_vec(), DiffMode::Binary)
    }

    fn report(outcome: &ValidationOutcome) -> &TextReport {
        match outcome.diagnostics() {
            Diagnostics::Text(r) => r,
            other => panic!("expected text diagnostics, got {:?}", other),
        }
    }

    // --- no baseline ---

    #[test]
    fn no_baseline_always_passes() {
        for captured in [&b""[..], b"anything\n", b"\x00\xff"] {
            let outcome = check(captured, None);
            assert!(outcome.passed());
            assert_eq!(outcome.to_string(), "");
        }
    }

    // --- binary ---

    #[test]
    fn binary_identical_passes() {
        let base = binary(b"\x00\x01\x02\n\xff");
        assert!(check(b"\x00\x01\x02\n\xff", Some(&base)).passed());
    }

    #[test]
    fn binary_length_difference_fails() {
        let base = binary(b"abcd");
        let outcome = check(b"abc", Some(&base));
        assert!(!outcome.passed());
        assert_eq!(
            outcome.diagnostics(),
            &Diagnostics::BinaryLength {
                expected: 4,
                actual: 3
            }
        );
        assert!(outcome.to_string().contains("(Expected 4, got 3)"));
    }

    #[test]
    fn binary_single_byte_difference_fails() {
        let base = binary(b"abcd");
        let outcome = check(b"abXd", Some(&base));
        assert!(!outcome.passed());
        assert_eq!(outcome.diagnostics(), &Diagnostics::BinaryContent { offset: 2 });
    }

    #[test]
    fn binary_ignores_tolerance_semantics() {
        let base = binary(b"3.14\n");
        assert!(!check(b"3.1400001\n", Some(&base)).passed());
    }

    // --- textual, exact ---

    #[test]
    fn exact_lines_pass() {
        let base = text("a\nb\n", 0.0);
        let outcome = check(b"a\nb\n", Some(&base));
        assert!(outcome.passed());
        assert_eq!(outcome.diagnostics(), &Diagnostics::None);
    }

    #[test]
    fn empty_against_empty_passes() {
        assert!(check(b"", Some(&text("", 0.0))).passed());
    }

    #[test]
    fn zero_tolerance_rejects_close_numbers() {
        let base = text("3.14\n", 0.0);
        let outcome = check(b"3.1401\n", Some(&base));
        assert!(!outcome.passed());
        let r = report(&outcome);
        assert_eq!(r.mismatches.len(), 1);
        assert_eq!(r.mismatches[0].error, None);
    }

    #[test]
    fn terminator_is_significant() {
        let base = text("a\n", 0.0);
        let outcome = check(b"a", Some(&base));
        assert!(!outcome.passed());
        assert_eq!(report(&outcome).mismatches.len(), 1);
    }

    #[test]
    fn truncated_line_is_detected() {
        let base = text("hello world\n", 0.0);
        assert!(!check(b"hello\n", Some(&base)).passed());
    }

    // --- textual, tolerance ---

    #[test]
    fn tolerance_accepts_close_number() {
        let base = text("3.14\n2\n", 0.01);
        assert!(check(b"3.1401\n2\n", Some(&base)).passed());
    }

    #[test]
    fn tolerance_rejects_far_number_with_error() {
        let base = text("3.14\n2\n", 0.01);
        let outcome = check(b"3.20\n2\n", Some(&base));
        assert!(!outcome.passed());

        let r = report(&outcome);
        assert_eq!(r.mismatches.len(), 1);
        let m = &r.mismatches[0];
        assert_eq!(m.line, 1);
        assert_eq!(m.expected, b"3.14\n");
        assert_eq!(m.actual, b"3.20\n");
        assert!((m.error.unwrap() - 0.06).abs() < 1e-9);

        assert_eq!(
            outcome.to_string(),
            "Error: Diff failed.\n  Expected: 3.14\n  Actual:   3.20\n  Error:    0.06\n"
        );
    }

    #[test]
    fn tolerance_needs_numbers_on_both_sides() {
        let base = text("3.14\n", 0.5);
        let outcome = check(b"pi\n", Some(&base));
        assert!(!outcome.passed());
        assert_eq!(report(&outcome).mismatches[0].error, None);

        let base = text("abc\n", 0.5);
        assert!(!check(b"1.0\n", Some(&base)).passed());
    }

    #[test]
    fn tolerance_boundary_is_inclusive() {
        let base = text("1.5\n", 0.5);
        assert!(check(b"2\n", Some(&base)).passed());
        assert!(!check(b"2.0001\n", Some(&base)).passed());
    }

    #[test]
    fn tolerance_compares_leading_numbers_only() {
        let base = text("  10 items\n", 1.0);
        assert!(check(b"10.5 things\n", Some(&base)).passed());
    }

    // --- caps and leftovers ---

    #[test]
    fn mismatches_beyond_cap_are_counted() {
        let base = text("1\n2\n3\n4\n5\n6\n", 0.0);
        let outcome = check(b"x\nx\nx\nx\nx\n6\n", Some(&base));
        assert!(!outcome.passed());

        let r = report(&outcome);
        assert_eq!(r.mismatches.len(), MISMATCH_CAP);
        assert_eq!(r.additional_mismatches, 2);
        assert_eq!(r.mismatches[2].line, 3);
        assert!(outcome.to_string().contains("... 2 additional mismatches.\n"));
    }

    #[test]
    fn scanning_continues_after_first_mismatch() {
        let base = text("a\nb\nc\n", 0.0);
        let outcome = check(b"x\nb\ny\n", Some(&base));
        let lines: Vec<_> = report(&outcome).mismatches.iter().map(|m| m.line).collect();
        assert_eq!(lines, vec![1, 3]);
    }

    #[test]
    fn surplus_captured_lines_fail() {
        let base = text("a\nb\n", 0.0);
        let outcome = check(b"a\nb\nc\n", Some(&base));
        assert!(!outcome.passed());

        let r = report(&outcome);
        assert!(r.mismatches.is_empty());
        let surplus = r.surplus.as_ref().unwrap();
        assert_eq!(surplus.shown, vec![b"c\n".to_vec()]);
        assert_eq!(surplus.omitted, 0);

        let rendered = outcome.to_string();
        assert_eq!(
            rendered,
            "Error: Expected result ended before end of actual result.\nRemaining:\nc\n"
        );
    }

    #[test]
    fn surplus_is_capped() {
        let base = text("a\n", 0.0);
        let outcome = check(b"a\n1\n2\n3\n4\n5\n", Some(&base));
        let surplus = report(&outcome).surplus.clone().unwrap();
        assert_eq!(surplus.shown.len(), MISMATCH_CAP);
        assert_eq!(surplus.omitted, 2);
        assert!(outcome.to_string().ends_with("... 2 more lines.\n"));
    }

    #[test]
    fn missing_baseline_lines_fail() {
        let base = text("a\nb\nc\n", 0.0);
        let outcome = check(b"a\n", Some(&base));
        assert!(!outcome.passed());

        let missing = report(&outcome).missing.clone().unwrap();
        assert_eq!(missing.shown, vec![b"b\n".to_vec(), b"c\n".to_vec()]);
        assert!(
            outcome
                .to_string()
                .starts_with("Error: Actual result ended before end of expected result.\n")
        );
    }

    #[test]
    fn missing_is_capped() {
        let base = text("a\n1\n2\n3\n4\n5\n", 0.0);
        let outcome = check(b"a\n", Some(&base));
        assert!(!outcome.passed());

        let missing = report(&outcome).missing.clone().unwrap();
        assert_eq!(missing.shown.len(), MISMATCH_CAP);
        assert_eq!(missing.omitted, 2);
        assert_eq!(
            outcome.to_string(),
            "Error: Actual result ended before end of expected result.\nRemaining:\n1\n2\n3\n... 2 more lines.\n"
        );
    }

    #[test]
    fn empty_output_against_nonempty_baseline_fails() {
        let base = text("a\n", 0.0);
        let outcome = check(b"", Some(&base));
        assert!(!outcome.passed());
        assert!(report(&outcome).missing.is_some());
    }

    #[test]
    fn unterminated_lines_render_on_their_own_line() {
        let base = text("a", 0.0);
        let outcome = check(b"b", Some(&base));
        assert!(outcome.to_string().contains("  Expected: a\n  Actual:   b\n"));
    }

    #[test]
    fn non_utf8_lines_render_lossily() {
        let base = text("ok\n", 0.0);
        let outcome = check(b"\xff\xfe\n", Some(&base));
        assert!(!outcome.passed());
        assert!(outcome.to_string().contains("Actual:"));
    }

    #[test]
    fn validation_is_idempotent() {
        let base = text("1\n2\n3\n4\n5\n", 0.1);
        let captured = b"1.5\nx\n3\n9\n5\n6\n";
        let first = check(captured, Some(&base));
        let second = check(captured, Some(&base));
        assert_eq!(first, second);
        assert_eq!(first.to_string(), second.to_string());
    }

    // --- number parsing and formatting ---

    #[test]
    fn leading_number_forms() {
        assert_eq!(leading_number(b"3.14\n"), Some(3.14));
        assert_eq!(leading_number(b"  -2.5e3 rest"), Some(-2500.0));
        assert_eq!(leading_number(b"+.5\n"), Some(0.5));
        assert_eq!(leading_number(b"7.\n"), Some(7.0));
        assert_eq!(leading_number(b"12abc"), Some(12.0));
        assert_eq!(leading_number(b"1e\n"), Some(1.0));
        assert_eq!(leading_number(b"Infinity"), Some(f64::INFINITY));
        assert!(leading_number(b"nan\n").unwrap().is_nan());
    }

    #[test]
    fn leading_number_absent() {
        assert_eq!(leading_number(b""), None);
        assert_eq!(leading_number(b"\n"), None);
        assert_eq!(leading_number(b"abc 12"), None);
        assert_eq!(leading_number(b"-.\n"), None);
        assert_eq!(leading_number(b".e5"), None);
    }

    #[test]
    fn leading_number_is_decimal_only() {
        assert_eq!(leading_number(b"0x10\n"), Some(0.0));
        assert_eq!(leading_number(b"0x1p3"), Some(0.0));
    }

    #[test]
    fn general_format() {
        assert_eq!(format_general(0.06000000000000005), "0.06");
        assert_eq!(format_general(0.0), "0");
        assert_eq!(format_general(1.5), "1.5");
        assert_eq!(format_general(123456.0), "123456");
        assert_eq!(format_general(1234567.0), "1.23457e+06");
        assert_eq!(format_general(0.0001), "0.0001");
        assert_eq!(format_general(0.00001234), "1.234e-05");
        assert_eq!(format_general(9.9999999), "10");
        assert_eq!(format_general(f64::INFINITY), "inf");
    }
}
