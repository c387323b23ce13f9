//! Contrasts between design coefficients

use serde::{Deserialize, Serialize};

use super::design::DesignMatrix;
use crate::error::{ArrayError, Result};

/// A named linear combination of design coefficients
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContrastSpec {
    pub name: String,
    /// One weight per design column
    pub weights: Vec<f64>,
}

impl ContrastSpec {
    /// `numerator - denominator` between two group levels
    pub fn difference(design: &DesignMatrix, numerator: &str, denominator: &str) -> Result<Self> {
        if numerator == denominator {
            return Err(ArrayError::config(format!(
                "contrast compares level '{}' with itself",
                numerator
            )));
        }
        let num = level_column(design, numerator)?;
        let den = level_column(design, denominator)?;
        let mut weights = vec![0.0; design.n_coefs()];
        weights[num] = 1.0;
        weights[den] = -1.0;
        Ok(Self {
            name: format!("{}-{}", numerator, denominator),
            weights,
        })
    }

    /// Parse an expression over design column names.
    ///
    /// Terms are joined by `+` or `-`; each is `name`, `coef*name` or
    /// `name/divisor`, e.g. `AD-Control` or `0.5*A+0.5*B-C`. Column names are
    /// matched longest first, so levels such as `non-AD` can be used as is.
    pub fn parse(design: &DesignMatrix, expression: &str) -> Result<Self> {
        let compact: String = expression.chars().filter(|c| !c.is_whitespace()).collect();
        if compact.is_empty() {
            return Err(ArrayError::config("empty contrast expression"));
        }

        let mut columns: Vec<(usize, &str)> = design
            .column_names()
            .iter()
            .enumerate()
            .map(|(i, name)| (i, name.as_str()))
            .collect();
        columns.sort_by_key(|(_, name)| std::cmp::Reverse(name.len()));

        let invalid = |at: &str| ArrayError::config(format!("cannot parse contrast '{}' at '{}'", compact, at));
        let mut weights = vec![0.0; design.n_coefs()];
        let mut rest = compact.as_str();
        while !rest.is_empty() {
            let (sign, after_sign) = take_sign(rest);
            let (coef, term) = take_coefficient(after_sign);
            let (column, name) = columns
                .iter()
                .find(|(_, name)| term.starts_with(name) && is_term_end(&term[name.len()..]))
                .ok_or_else(|| {
                    let unknown = term.split(['+', '-', '/']).next().unwrap_or(term);
                    ArrayError::config(format!(
                        "contrast '{}' refers to unknown coefficient '{}' (available: {})",
                        compact,
                        unknown,
                        design.column_names().join(", ")
                    ))
                })?;

            let mut tail = &term[name.len()..];
            let mut divisor = 1.0;
            if let Some(after_slash) = tail.strip_prefix('/') {
                let len = number_len(after_slash);
                divisor = after_slash[..len].parse::<f64>().map_err(|_| invalid(tail))?;
                if divisor == 0.0 {
                    return Err(invalid(tail));
                }
                tail = &after_slash[len..];
            }
            if !(tail.is_empty() || tail.starts_with(['+', '-'])) {
                return Err(invalid(tail));
            }
            weights[*column] += sign * coef / divisor;
            rest = tail;
        }

        if weights.iter().all(|&w| w == 0.0) {
            return Err(ArrayError::config(format!("contrast '{}' has all-zero weights", compact)));
        }
        Ok(Self { name: compact, weights })
    }

    /// Check that the weights fit the design
    pub fn check_design(&self, design: &DesignMatrix) -> Result<()> {
        if self.weights.len() != design.n_coefs() {
            return Err(ArrayError::DimensionMismatch {
                expected: format!("{} contrast weights", design.n_coefs()),
                got: format!("{} contrast weights", self.weights.len()),
            });
        }
        Ok(())
    }
}

fn level_column(design: &DesignMatrix, level: &str) -> Result<usize> {
    if !design.levels().iter().any(|l| l == level) {
        return Err(ArrayError::config(format!(
            "level '{}' is not a level of '{}' (levels: {})",
            level,
            design.group(),
            design.levels().join(", ")
        )));
    }
    design
        .column_index(level)
        .ok_or_else(|| ArrayError::config(format!("no design column for level '{}'", level)))
}

/// Leading run of `+` / `-` as a sign
fn take_sign(s: &str) -> (f64, &str) {
    let mut sign = 1.0;
    let mut rest = s;
    while let Some(c) = rest.chars().next().filter(|c| *c == '+' || *c == '-') {
        if c == '-' {
            sign = -sign;
        }
        rest = &rest[1..];
    }
    (sign, rest)
}

/// `coef*` prefix of a term, 1 when absent
fn take_coefficient(s: &str) -> (f64, &str) {
    let len = number_len(s);
    if len > 0 && s[len..].starts_with('*') {
        if let Ok(coef) = s[..len].parse::<f64>() {
            return (coef, &s[len + 1..]);
        }
    }
    (1.0, s)
}

/// Length of the decimal number (with optional exponent) at the start of `s`
fn number_len(s: &str) -> usize {
    let bytes = s.as_bytes();
    let mut i = 0;
    while i < bytes.len() && (bytes[i].is_ascii_digit() || bytes[i] == b'.') {
        i += 1;
    }
    if i > 0 && i < bytes.len() && (bytes[i] == b'e' || bytes[i] == b'E') {
        let mut j = i + 1;
        if j < bytes.len() && (bytes[j] == b'+' || bytes[j] == b'-') {
            j += 1;
        }
        let digits = j;
        while j < bytes.len() && bytes[j].is_ascii_digit() {
            j += 1;
        }
        if j > digits {
            i = j;
        }
    }
    i
}

fn is_term_end(s: &str) -> bool {
    s.is_empty() || s.starts_with(['+', '-', '/'])
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::SampleAnnotation;
    use crate::model::DesignBuilder;

    fn design() -> DesignMatrix {
        let mut ann = SampleAnnotation::new((0..6).map(|i| format!("s{}", i)).collect()).unwrap();
        ann.add_levels("group", ["A", "B", "C", "A", "B", "C"].iter().map(|s| s.to_string()).collect())
            .unwrap();
        DesignBuilder::new(&ann).group("group").build().unwrap()
    }

    #[test]
    fn test_difference() {
        let design = design();
        let c = ContrastSpec::difference(&design, "C", "A").unwrap();
        assert_eq!(c.name, "C-A");
        assert_eq!(c.weights, vec![-1.0, 0.0, 1.0]);
        assert!(ContrastSpec::difference(&design, "A", "D").is_err());
        assert!(ContrastSpec::difference(&design, "A", "A").is_err());
    }

    #[test]
    fn test_parse_weighted_expression() {
        let design = design();
        let c = ContrastSpec::parse(&design, "0.5*A + 0.5*B - C").unwrap();
        assert_eq!(c.weights, vec![0.5, 0.5, -1.0]);

        let c = ContrastSpec::parse(&design, "B/2 + C/2 - A").unwrap();
        assert_eq!(c.weights, vec![-1.0, 0.5, 0.5]);

        let c = ContrastSpec::parse(&design, "-A+B").unwrap();
        assert_eq!(c.weights, vec![-1.0, 1.0, 0.0]);
    }

    #[test]
    fn test_parse_errors() {
        let design = design();
        assert!(ContrastSpec::parse(&design, "A-Z").is_err());
        assert!(ContrastSpec::parse(&design, "A-A").is_err());
        assert!(ContrastSpec::parse(&design, "x*A").is_err());
        assert!(ContrastSpec::parse(&design, "").is_err());
        assert!(ContrastSpec::parse(&design, "A/0-B").is_err());
        assert!(ContrastSpec::parse(&design, "A*2-B").is_err());
    }

    #[test]
    fn test_parse_hyphenated_levels_and_exponents() {
        let mut ann = SampleAnnotation::new((0..4).map(|i| format!("s{}", i)).collect()).unwrap();
        ann.add_levels("status", ["AD", "non-AD", "AD", "non-AD"].iter().map(|s| s.to_string()).collect())
            .unwrap();
        let design = DesignBuilder::new(&ann).group("status").build().unwrap();

        let c = ContrastSpec::parse(&design, "AD-non-AD").unwrap();
        assert_eq!(c.weights, vec![1.0, -1.0]);
        let c = ContrastSpec::parse(&design, "non-AD - AD").unwrap();
        assert_eq!(c.weights, vec![-1.0, 1.0]);
        let c = ContrastSpec::parse(&design, "1e-3*AD - 2.5E+1*non-AD").unwrap();
        assert!((c.weights[0] - 1e-3).abs() < 1e-15);
        assert!((c.weights[1] + 25.0).abs() < 1e-12);
    }
}
