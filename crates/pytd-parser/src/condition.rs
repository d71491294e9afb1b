//! Evaluation of `if` conditions against the target environment.
//!
//! Conditions compare `sys.version_info` (optionally indexed or sliced,
//! with full Python slice semantics) against integer tuples, or
//! `sys.platform` against strings. `or`-chains short-circuit left to right.
//!
//! Version comparisons zero-pad the shorter tuple to the longer one, so
//! `(3, 0, 0) == (3,)` holds while `(3, 0, 1) == (3,)` does not.

use pytd_common::{ParseError, TargetEnv};

use crate::grammar::{CmpOp, Comparison, CondExpr, CondIndex, CondValue};

/// Evaluate a condition. Errors are attributed to the line of the `if` or
/// `elif` the condition belongs to.
pub fn evaluate(cond: &CondExpr, env: &TargetEnv) -> Result<bool, ParseError> {
    match cond {
        CondExpr::Or(terms) => {
            for term in terms {
                if evaluate(term, env)? {
                    return Ok(true);
                }
            }
            Ok(false)
        }
        CondExpr::Cmp(cmp) => evaluate_comparison(cmp, env),
    }
}

fn evaluate_comparison(cmp: &Comparison, env: &TargetEnv) -> Result<bool, ParseError> {
    match cmp.target.as_str() {
        "sys.version_info" => evaluate_version(cmp, env),
        "sys.platform" => evaluate_platform(cmp, env),
        other => Err(ParseError::at_line(
            format!("Unsupported condition: '{other}'"),
            cmp.line,
        )),
    }
}

fn evaluate_version(cmp: &Comparison, env: &TargetEnv) -> Result<bool, ParseError> {
    let actual: Vec<i64> = env.python_version.iter().map(|&v| v as i64).collect();
    match &cmp.index {
        Some(CondIndex::Index(i)) => {
            let expected = match cmp.value {
                CondValue::Int(v) => v,
                _ => {
                    return Err(ParseError::at_line(
                        "an element of sys.version_info must be compared to an integer",
                        cmp.line,
                    ))
                }
            };
            let element = index_element(&actual, *i).ok_or_else(|| {
                ParseError::at_line("tuple index out of range", cmp.line)
            })?;
            Ok(compare_scalars(element, expected, cmp.op))
        }
        Some(CondIndex::Slice { start, stop, step }) => {
            let expected = tuple_of_ints(&cmp.value).ok_or_else(|| version_tuple_error(cmp.line))?;
            let sliced = apply_slice(&actual, *start, *stop, *step, cmp.line)?;
            Ok(compare_versions(&sliced, &expected, cmp.op))
        }
        None => {
            let expected = tuple_of_ints(&cmp.value).ok_or_else(|| version_tuple_error(cmp.line))?;
            Ok(compare_versions(&actual, &expected, cmp.op))
        }
    }
}

fn version_tuple_error(line: u32) -> ParseError {
    ParseError::at_line(
        "sys.version_info must be compared to a tuple of integers",
        line,
    )
}

fn evaluate_platform(cmp: &Comparison, env: &TargetEnv) -> Result<bool, ParseError> {
    let expected = match &cmp.value {
        CondValue::Str(s) => s,
        _ => {
            return Err(ParseError::at_line(
                "sys.platform must be compared to a string",
                cmp.line,
            ))
        }
    };
    match cmp.op {
        CmpOp::Eq => Ok(&env.platform == expected),
        CmpOp::Ne => Ok(&env.platform != expected),
        _ => Err(ParseError::at_line(
            "sys.platform must be compared using == or !=",
            cmp.line,
        )),
    }
}

/// Extract a tuple of plain integers; any other shape is rejected.
fn tuple_of_ints(value: &CondValue) -> Option<Vec<i64>> {
    match value {
        CondValue::Tuple(elements) => elements
            .iter()
            .map(|e| match e {
                CondValue::Int(i) => Some(*i),
                _ => None,
            })
            .collect(),
        _ => None,
    }
}

fn index_element(values: &[i64], index: i64) -> Option<i64> {
    let len = values.len() as i64;
    let index = if index < 0 { index + len } else { index };
    if (0..len).contains(&index) {
        Some(values[index as usize])
    } else {
        None
    }
}

/// Python slice semantics, including negative steps.
fn apply_slice(
    values: &[i64],
    start: Option<i64>,
    stop: Option<i64>,
    step: Option<i64>,
    line: u32,
) -> Result<Vec<i64>, ParseError> {
    let len = values.len() as i64;
    let step = step.unwrap_or(1);
    if step == 0 {
        return Err(ParseError::at_line("slice step cannot be zero", line));
    }
    let mut out = Vec::new();
    if step > 0 {
        let mut i = normalize(start.unwrap_or(0), len).clamp(0, len);
        let stop = normalize(stop.unwrap_or(len), len).clamp(0, len);
        while i < stop {
            out.push(values[i as usize]);
            i += step;
        }
    } else {
        let mut i = start.map(|s| normalize(s, len)).unwrap_or(len - 1).min(len - 1);
        let stop = stop.map(|s| normalize(s, len)).unwrap_or(-1).max(-1);
        while i > stop {
            if i >= 0 {
                out.push(values[i as usize]);
            }
            i += step;
        }
    }
    Ok(out)
}

fn normalize(index: i64, len: i64) -> i64 {
    if index < 0 {
        index + len
    } else {
        index
    }
}

/// Compare version tuples after zero-padding the shorter to the longer.
fn compare_versions(actual: &[i64], expected: &[i64], op: CmpOp) -> bool {
    let n = actual.len().max(expected.len());
    let pad = |v: &[i64]| -> Vec<i64> {
        let mut padded = v.to_vec();
        padded.resize(n, 0);
        padded
    };
    let a = pad(actual);
    let b = pad(expected);
    apply_op(a.cmp(&b), op)
}

fn compare_scalars(a: i64, b: i64, op: CmpOp) -> bool {
    apply_op(a.cmp(&b), op)
}

fn apply_op(ordering: std::cmp::Ordering, op: CmpOp) -> bool {
    match op {
        CmpOp::Eq => ordering.is_eq(),
        CmpOp::Ne => ordering.is_ne(),
        CmpOp::Lt => ordering.is_lt(),
        CmpOp::Le => ordering.is_le(),
        CmpOp::Gt => ordering.is_gt(),
        CmpOp::Ge => ordering.is_ge(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cmp(
        target: &str,
        index: Option<CondIndex>,
        op: CmpOp,
        value: CondValue,
    ) -> CondExpr {
        CondExpr::Cmp(Comparison {
            target: target.to_string(),
            index,
            op,
            value,
            line: 1,
        })
    }

    fn ints(values: &[i64]) -> CondValue {
        CondValue::Tuple(values.iter().map(|&v| CondValue::Int(v)).collect())
    }

    fn env(version: &[u32], platform: &str) -> TargetEnv {
        TargetEnv {
            python_version: version.to_vec(),
            platform: platform.to_string(),
        }
    }

    fn check(cond: &CondExpr, env: &TargetEnv, expected: bool) {
        assert_eq!(evaluate(cond, env).unwrap(), expected);
    }

    #[test]
    fn version_comparisons() {
        let env = env(&[2, 7, 6], "linux");
        check(&cmp("sys.version_info", None, CmpOp::Eq, ints(&[2, 7, 6])), &env, true);
        check(&cmp("sys.version_info", None, CmpOp::Eq, ints(&[2, 7, 5])), &env, false);
        check(&cmp("sys.version_info", None, CmpOp::Lt, ints(&[2, 7, 7])), &env, true);
        check(&cmp("sys.version_info", None, CmpOp::Ge, ints(&[2, 7, 6])), &env, true);
        check(&cmp("sys.version_info", None, CmpOp::Gt, ints(&[2, 7, 6])), &env, false);
    }

    #[test]
    fn shorter_tuples_zero_pad() {
        check(
            &cmp("sys.version_info", None, CmpOp::Eq, ints(&[3])),
            &env(&[3, 0, 0], "linux"),
            true,
        );
        check(
            &cmp("sys.version_info", None, CmpOp::Eq, ints(&[3])),
            &env(&[3, 0, 1], "linux"),
            false,
        );
        check(
            &cmp("sys.version_info", None, CmpOp::Gt, ints(&[3])),
            &env(&[3, 0, 1], "linux"),
            true,
        );
        check(
            &cmp("sys.version_info", None, CmpOp::Eq, ints(&[3, 0, 0])),
            &env(&[3], "linux"),
            true,
        );
    }

    #[test]
    fn version_indexing() {
        let e = env(&[2, 7, 6], "linux");
        check(
            &cmp(
                "sys.version_info",
                Some(CondIndex::Index(0)),
                CmpOp::Eq,
                CondValue::Int(2),
            ),
            &e,
            true,
        );
        let err = evaluate(
            &cmp(
                "sys.version_info",
                Some(CondIndex::Index(42)),
                CmpOp::Eq,
                CondValue::Int(42),
            ),
            &e,
        )
        .unwrap_err();
        assert_eq!(err.message, "tuple index out of range");
    }

    #[test]
    fn version_slices() {
        let e = env(&[2, 7, 6], "linux");
        let slice = |start, stop, step| Some(CondIndex::Slice { start, stop, step });
        let cases = [
            (slice(None, None, None), vec![2, 7, 6]),
            (slice(None, Some(2), None), vec![2, 7]),
            (slice(Some(2), None, None), vec![6]),
            (slice(Some(0), Some(1), None), vec![2]),
            (slice(Some(1), None, None), vec![7, 6]),
            (slice(None, None, Some(-2)), vec![6, 2]),
            (slice(Some(1), None, Some(2)), vec![7]),
            (slice(None, Some(2), Some(2)), vec![2]),
            (slice(Some(3), Some(1), Some(-1)), vec![6]),
        ];
        for (index, expected) in cases {
            check(
                &cmp("sys.version_info", index.clone(), CmpOp::Eq, ints(&expected)),
                &e,
                true,
            );
        }
    }

    #[test]
    fn version_error_messages() {
        let e = env(&[2, 7, 6], "linux");
        let err = evaluate(
            &cmp("sys.version_info", None, CmpOp::Eq, CondValue::Str("foo".into())),
            &e,
        )
        .unwrap_err();
        assert_eq!(
            err.message,
            "sys.version_info must be compared to a tuple of integers"
        );

        let err = evaluate(
            &cmp(
                "sys.version_info",
                None,
                CmpOp::Eq,
                CondValue::Tuple(vec![CondValue::Float, CondValue::Int(3)]),
            ),
            &e,
        )
        .unwrap_err();
        assert_eq!(
            err.message,
            "sys.version_info must be compared to a tuple of integers"
        );

        let err = evaluate(
            &cmp(
                "sys.version_info",
                Some(CondIndex::Index(0)),
                CmpOp::Eq,
                ints(&[2]),
            ),
            &e,
        )
        .unwrap_err();
        assert_eq!(
            err.message,
            "an element of sys.version_info must be compared to an integer"
        );
    }

    #[test]
    fn platform_comparisons() {
        let e = env(&[2, 7, 6], "linux");
        check(
            &cmp("sys.platform", None, CmpOp::Eq, CondValue::Str("linux".into())),
            &e,
            true,
        );
        check(
            &cmp("sys.platform", None, CmpOp::Ne, CondValue::Str("win32".into())),
            &e,
            true,
        );
        let err = evaluate(
            &cmp("sys.platform", None, CmpOp::Lt, CondValue::Str("linux".into())),
            &e,
        )
        .unwrap_err();
        assert_eq!(err.message, "sys.platform must be compared using == or !=");
        let err = evaluate(
            &cmp("sys.platform", None, CmpOp::Eq, ints(&[1, 2, 3])),
            &e,
        )
        .unwrap_err();
        assert_eq!(err.message, "sys.platform must be compared to a string");
    }

    #[test]
    fn unsupported_target() {
        let err = evaluate(
            &cmp("foo.bar", None, CmpOp::Eq, ints(&[1, 2, 3])),
            &env(&[2, 7, 6], "linux"),
        )
        .unwrap_err();
        assert_eq!(err.message, "Unsupported condition: 'foo.bar'");
        assert_eq!(err.line, Some(1));
    }

    #[test]
    fn or_short_circuits() {
        let e = env(&[2, 7, 6], "linux");
        let cond = CondExpr::Or(vec![
            cmp("sys.platform", None, CmpOp::Eq, CondValue::Str("linux".into())),
            cmp("foo.bar", None, CmpOp::Eq, CondValue::Int(1)),
        ]);
        assert!(evaluate(&cond, &e).unwrap());
    }
}
