//! Grade data helpers
//!
//! Aggregation of letter-grade counts into the summary tags stored alongside
//! courses, instructors and departments, and term code naming.

use crate::interface::GradeSummary;
use std::collections::BTreeMap;

/// Letter grade -> student count, as stored in the `grades` JSON columns
pub type GradeCounts = BTreeMap<String, i64>;

/// GPA weight of letter grades. Others (S, U, V, I, W) do not affect GPA.
fn grade_points(grade: &str) -> Option<f64> {
    match grade {
        "A" => Some(4.0),
        "B" => Some(3.0),
        "C" => Some(2.0),
        "D" => Some(1.0),
        "F" => Some(0.0),
        _ => None,
    }
}

fn round_to(value: f64, places: i32) -> f64 {
    let factor = 10f64.powi(places);
    (value * factor).round() / factor
}

/// Combine several distributions into one summary.
///
/// Returns `None` when no students are recorded. Average GPA is rounded to two
/// places, the most common grade's share to one.
pub fn aggregate_grades<'a, I>(distributions: I) -> Option<GradeSummary>
where
    I: IntoIterator<Item = &'a GradeCounts>,
{
    let mut combined = GradeCounts::new();
    let mut total_students = 0i64;
    for distribution in distributions {
        for (grade, &count) in distribution {
            if count > 0 {
                *combined.entry(grade.clone()).or_insert(0) += count;
                total_students += count;
            }
        }
    }

    if total_students == 0 {
        return None;
    }

    let (weighted, impacting) = combined
        .iter()
        .filter_map(|(grade, &count)| grade_points(grade).map(|points| (points * count as f64, count)))
        .fold((0.0, 0i64), |(sum, n), (w, c)| (sum + w, n + c));
    let average_gpa = if impacting > 0 {
        round_to(weighted / impacting as f64, 2)
    } else {
        0.0
    };

    // First grade with the highest count wins ties
    let mut most: Option<(&String, i64)> = None;
    for (grade, &count) in &combined {
        if most.map_or(true, |(_, best)| count > best) {
            most = Some((grade, count));
        }
    }
    let (most_grade, most_count) = most?;

    Some(GradeSummary {
        average_gpa,
        most_grade: most_grade.clone(),
        most_percent: round_to(100.0 * most_count as f64 / total_students as f64, 1),
    })
}

/// Term code to display name: `202502` -> `Spring 2025`.
///
/// Codes are the four-digit year followed by `02` (spring), `05` (summer) or `08` (fall).
pub fn term_to_name(term: u32) -> Option<String> {
    let digits = term.to_string();
    if digits.len() != 6 {
        return None;
    }
    let (year, season) = digits.split_at(4);
    let season = match season {
        "02" => "Spring",
        "05" => "Summer",
        "08" => "Fall",
        _ => return None,
    };
    Some(format!("{} {}", season, year))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn counts(pairs: &[(&str, i64)]) -> GradeCounts {
        pairs.iter().map(|(g, c)| (g.to_string(), *c)).collect()
    }

    #[test]
    fn test_aggregate_grades() {
        let fall = counts(&[("A", 30), ("B", 10), ("W", 5)]);
        let spring = counts(&[("A", 10), ("C", 10)]);

        let summary = aggregate_grades([&fall, &spring]).unwrap();
        // (40*4 + 10*3 + 10*2) / 60 = 3.5
        assert_eq!(summary.average_gpa, 3.5);
        assert_eq!(summary.most_grade, "A");
        // 40 of 65
        assert_eq!(summary.most_percent, 61.5);
    }

    #[test]
    fn test_aggregate_ignores_non_positive_and_empty() {
        assert!(aggregate_grades([&GradeCounts::new()]).is_none());
        assert!(aggregate_grades([&counts(&[("A", 0), ("B", -3)])]).is_none());

        let pass_fail = aggregate_grades([&counts(&[("S", 12), ("U", 4)])]).unwrap();
        assert_eq!(pass_fail.average_gpa, 0.0);
        assert_eq!(pass_fail.most_grade, "S");
        assert_eq!(pass_fail.most_percent, 75.0);
    }

    #[test]
    fn test_most_grade_tie_prefers_first() {
        let summary = aggregate_grades([&counts(&[("B", 5), ("A", 5)])]).unwrap();
        assert_eq!(summary.most_grade, "A");
        assert_eq!(summary.most_percent, 50.0);
    }

    #[test]
    fn test_term_to_name() {
        assert_eq!(term_to_name(202502).as_deref(), Some("Spring 2025"));
        assert_eq!(term_to_name(202505).as_deref(), Some("Summer 2025"));
        assert_eq!(term_to_name(202408).as_deref(), Some("Fall 2024"));
        assert_eq!(term_to_name(202503), None);
        assert_eq!(term_to_name(2025), None);
    }
}
