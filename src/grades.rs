/// Grade points for a letter grade. Unrecognized grades score zero.
pub fn points_for(grade: Option<&str>) -> f64 {
    match grade {
        Some("A+") | Some("A") => 4.0,
        Some("B+") => 3.0,
        Some("B") => 2.0,
        Some("C") => 1.0,
        _ => 0.0,
    }
}

pub fn earns_credit(grade: Option<&str>) -> bool {
    !matches!(grade, None | Some("") | Some("N/A") | Some("F"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn table_grades_score_expected_points() {
        assert_eq!(points_for(Some("A+")), 4.0);
        assert_eq!(points_for(Some("A")), 4.0);
        assert_eq!(points_for(Some("B+")), 3.0);
        assert_eq!(points_for(Some("B")), 2.0);
        assert_eq!(points_for(Some("C")), 1.0);
    }

    #[test]
    fn everything_else_scores_zero() {
        for grade in [None, Some(""), Some("F"), Some("D"), Some("a"), Some("A-"), Some(" A")] {
            assert_eq!(points_for(grade), 0.0, "grade {grade:?}");
        }
    }

    #[test]
    fn failing_and_missing_grades_earn_nothing() {
        assert!(!earns_credit(None));
        assert!(!earns_credit(Some("")));
        assert!(!earns_credit(Some("N/A")));
        assert!(!earns_credit(Some("F")));
        assert!(earns_credit(Some("D")));
        assert!(earns_credit(Some("B+")));
    }
}
