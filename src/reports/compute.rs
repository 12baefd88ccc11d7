//! Aggregate statistics for the report page: headline counts, the mean
//! grade, a ten-bucket score histogram, and per-staff averages.

use std::collections::{HashMap, HashSet};

use diesel::{connection::LoadConnection, prelude::*, sqlite::Sqlite};
use indexmap::IndexMap;

use crate::{
    schema::{staff, survey_results},
    staff::Staff,
    surveys::results::SurveyResult,
};

pub const HISTOGRAM_BUCKETS: usize = 10;

/// Bucket for a grade: 0-10 lands in bucket 0, 11-20 in bucket 1, and so on.
/// A grade of exactly 100 would index bucket 10, which does not exist, so it
/// is clamped into the last bucket.
pub fn bucket_index(grade: f64) -> usize {
    let idx = (grade / 10.0).floor() as i64;
    idx.clamp(0, HISTOGRAM_BUCKETS as i64 - 1) as usize
}

/// `None` means the "all surveys" / "all departments" sentinel.
#[derive(Debug, Clone, Default)]
pub struct ReportFilter {
    pub survey_id: Option<String>,
    pub department: Option<String>,
}

#[derive(Debug, Clone)]
pub struct ReportSummary {
    pub total_staff: usize,
    pub graded_staff: usize,
    pub average_score: f64,
    pub histogram: [usize; HISTOGRAM_BUCKETS],
    /// Largest bucket count with 10% headroom, for chart scaling.
    pub y_axis_max: f64,
    /// Average grade per staff id, in first-seen order of the results.
    pub per_staff: IndexMap<String, f64>,
}

/// Computes the summary over already-loaded rows. Recomputed from scratch on
/// every filter change; there is no incremental update to get wrong.
pub fn summarize(
    staff_rows: &[Staff],
    results: &[SurveyResult],
    filter: &ReportFilter,
) -> ReportSummary {
    let department_of: HashMap<&str, &str> = staff_rows
        .iter()
        .map(|s| (s.id.as_str(), s.department.as_str()))
        .collect();

    let filtered_results: Vec<&SurveyResult> = results
        .iter()
        .filter(|r| match &filter.survey_id {
            Some(survey_id) => r.survey_id == *survey_id,
            None => true,
        })
        .filter(|r| match &filter.department {
            Some(department) => department_of
                .get(r.staff_id.as_str())
                .is_some_and(|d| d.eq_ignore_ascii_case(department)),
            None => true,
        })
        .collect();

    let surveyed_staff: HashSet<&str> = match &filter.survey_id {
        Some(survey_id) => results
            .iter()
            .filter(|r| r.survey_id == *survey_id)
            .map(|r| r.staff_id.as_str())
            .collect(),
        None => staff_rows.iter().map(|s| s.id.as_str()).collect(),
    };

    let filtered_staff: Vec<&Staff> = staff_rows
        .iter()
        .filter(|s| match &filter.department {
            Some(department) => s.department.eq_ignore_ascii_case(department),
            None => true,
        })
        .filter(|s| surveyed_staff.contains(s.id.as_str()))
        .collect();

    let graded_staff = filtered_results
        .iter()
        .map(|r| r.staff_id.as_str())
        .collect::<HashSet<_>>()
        .len();

    let average_score = if filtered_results.is_empty() {
        0.0
    } else {
        filtered_results.iter().map(|r| r.final_grade).sum::<f64>()
            / filtered_results.len() as f64
    };

    let mut histogram = [0usize; HISTOGRAM_BUCKETS];
    for result in &filtered_results {
        histogram[bucket_index(result.final_grade)] += 1;
    }

    let y_axis_max =
        histogram.iter().copied().max().unwrap_or(0) as f64 * 1.1;

    let mut grades_of_staff: IndexMap<String, Vec<f64>> = IndexMap::new();
    for result in &filtered_results {
        grades_of_staff
            .entry(result.staff_id.clone())
            .or_default()
            .push(result.final_grade);
    }
    let per_staff = grades_of_staff
        .into_iter()
        .map(|(staff_id, grades)| {
            let mean = grades.iter().sum::<f64>() / grades.len() as f64;
            (staff_id, mean)
        })
        .collect();

    ReportSummary {
        total_staff: filtered_staff.len(),
        graded_staff,
        average_score,
        histogram,
        y_axis_max,
        per_staff,
    }
}

impl ReportSummary {
    pub fn fetch(
        filter: &ReportFilter,
        conn: &mut impl LoadConnection<Backend = Sqlite>,
    ) -> Self {
        let staff_rows = staff::table.load::<Staff>(conn).unwrap();
        let results =
            survey_results::table.load::<SurveyResult>(conn).unwrap();

        summarize(&staff_rows, &results, filter)
    }
}

#[cfg(test)]
mod tests {
    use chrono::Utc;

    use super::*;

    fn member(id: &str, department: &str) -> Staff {
        Staff {
            id: id.to_string(),
            name: format!("Member {id}"),
            department: department.to_string(),
            active: true,
            created_at: Utc::now().naive_utc(),
        }
    }

    fn result(survey: &str, staff: &str, grade: f64) -> SurveyResult {
        SurveyResult {
            id: format!("{survey}-{staff}"),
            survey_id: survey.to_string(),
            staff_id: staff.to_string(),
            final_grade: grade,
            note: String::new(),
            graded_at: Utc::now().naive_utc(),
        }
    }

    #[test]
    fn bucket_boundaries() {
        assert_eq!(bucket_index(0.0), 0);
        assert_eq!(bucket_index(9.9), 0);
        assert_eq!(bucket_index(10.0), 1);
        assert_eq!(bucket_index(95.0), 9);
        assert_eq!(bucket_index(99.9), 9);
        // 100 would be bucket 10; clamped into the last bucket
        assert_eq!(bucket_index(100.0), 9);
    }

    #[test]
    fn average_of_empty_result_set_is_zero() {
        let summary = summarize(
            &[member("s1", "Engineering")],
            &[],
            &ReportFilter::default(),
        );
        assert_eq!(summary.average_score, 0.0);
        assert_eq!(summary.graded_staff, 0);
        assert_eq!(summary.y_axis_max, 0.0);
    }

    #[test]
    fn average_of_sixty_and_eighty_is_seventy() {
        let staff = vec![member("s1", "Engineering"), member("s2", "Sales")];
        let results =
            vec![result("sv", "s1", 60.0), result("sv", "s2", 80.0)];

        let summary = summarize(&staff, &results, &ReportFilter::default());
        assert_eq!(summary.average_score, 70.0);
        assert_eq!(summary.graded_staff, 2);
        assert_eq!(summary.histogram[6], 1);
        assert_eq!(summary.histogram[8], 1);
    }

    #[test]
    fn all_departments_is_the_union_and_idempotent() {
        let staff = vec![
            member("s1", "Engineering"),
            member("s2", "Sales"),
            member("s3", "Engineering"),
        ];
        let results = vec![
            result("sv", "s1", 50.0),
            result("sv", "s2", 70.0),
            result("sv", "s3", 90.0),
        ];

        let all = summarize(&staff, &results, &ReportFilter::default());
        assert_eq!(all.total_staff, 3);
        assert_eq!(all.graded_staff, 3);

        let again = summarize(&staff, &results, &ReportFilter::default());
        assert_eq!(again.total_staff, all.total_staff);
        assert_eq!(again.per_staff, all.per_staff);

        let eng = summarize(
            &staff,
            &results,
            &ReportFilter {
                survey_id: None,
                department: Some("Engineering".to_string()),
            },
        );
        let sales = summarize(
            &staff,
            &results,
            &ReportFilter {
                survey_id: None,
                department: Some("Sales".to_string()),
            },
        );
        assert_eq!(
            eng.total_staff + sales.total_staff,
            all.total_staff
        );
    }

    #[test]
    fn department_filter_is_case_insensitive() {
        let staff = vec![member("s1", "Engineering")];
        let results = vec![result("sv", "s1", 50.0)];

        let lower = summarize(
            &staff,
            &results,
            &ReportFilter {
                survey_id: None,
                department: Some("engineering".to_string()),
            },
        );
        assert_eq!(lower.graded_staff, 1);
    }

    #[test]
    fn survey_filter_restricts_staff_to_those_with_a_result() {
        let staff = vec![member("s1", "Engineering"), member("s2", "Sales")];
        let results = vec![result("sv1", "s1", 40.0)];

        let summary = summarize(
            &staff,
            &results,
            &ReportFilter {
                survey_id: Some("sv1".to_string()),
                department: None,
            },
        );
        assert_eq!(summary.total_staff, 1);
        assert_eq!(summary.graded_staff, 1);

        let other = summarize(
            &staff,
            &results,
            &ReportFilter {
                survey_id: Some("sv2".to_string()),
                department: None,
            },
        );
        assert_eq!(other.total_staff, 0);
        assert_eq!(other.graded_staff, 0);
        assert_eq!(other.average_score, 0.0);
    }

    #[test]
    fn per_staff_map_averages_grades_per_member() {
        let staff = vec![member("s1", "Engineering")];
        let results = vec![
            result("sv1", "s1", 60.0),
            result("sv2", "s1", 80.0),
        ];

        let summary = summarize(&staff, &results, &ReportFilter::default());
        assert_eq!(summary.per_staff.get("s1"), Some(&70.0));
    }

    #[test]
    fn y_axis_headroom_is_ten_percent() {
        let staff = vec![member("s1", "Engineering")];
        let results = vec![
            result("sv1", "s1", 55.0),
            result("sv2", "s1", 55.0),
        ];

        let summary = summarize(&staff, &results, &ReportFilter::default());
        assert_eq!(summary.histogram[5], 2);
        assert!((summary.y_axis_max - 2.2).abs() < f64::EPSILON);
    }
}
