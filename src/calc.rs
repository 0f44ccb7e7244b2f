use crate::config::ActivityCategory;
use crate::records::{ActivityEntry, GradeEntry};
use serde::Serialize;
use std::cmp::Ordering;
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub enum LetterBand {
    A,
    B,
    C,
    D,
    F,
}

impl LetterBand {
    pub const ALL: [LetterBand; 5] = [
        LetterBand::A,
        LetterBand::B,
        LetterBand::C,
        LetterBand::D,
        LetterBand::F,
    ];

    /// A[90,100], B[80,90), C[70,80), D[60,70), F[0,60)
    pub fn for_score(score: u8) -> LetterBand {
        match score {
            90.. => LetterBand::A,
            80..=89 => LetterBand::B,
            70..=79 => LetterBand::C,
            60..=69 => LetterBand::D,
            _ => LetterBand::F,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            LetterBand::A => "A (90-100)",
            LetterBand::B => "B (80-89)",
            LetterBand::C => "C (70-79)",
            LetterBand::D => "D (60-69)",
            LetterBand::F => "F (<60)",
        }
    }
}

impl fmt::Display for LetterBand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            LetterBand::A => "A",
            LetterBand::B => "B",
            LetterBand::C => "C",
            LetterBand::D => "D",
            LetterBand::F => "F",
        };
        f.write_str(s)
    }
}

fn average_by(grades: &[GradeEntry], key: impl Fn(&GradeEntry) -> &str) -> BTreeMap<String, f64> {
    let mut sums: BTreeMap<String, (u64, u64)> = BTreeMap::new();
    for g in grades {
        let e = sums.entry(key(g).to_string()).or_insert((0, 0));
        e.0 += u64::from(g.score);
        e.1 += 1;
    }
    sums.into_iter()
        .map(|(k, (sum, n))| (k, sum as f64 / n as f64))
        .collect()
}

pub fn student_averages(grades: &[GradeEntry]) -> BTreeMap<String, f64> {
    average_by(grades, |g| g.username.as_str())
}

pub fn subject_averages(grades: &[GradeEntry]) -> BTreeMap<String, f64> {
    average_by(grades, |g| g.subject.as_str())
}

/// Every band is present, including empty ones.
pub fn grade_distribution(grades: &[GradeEntry]) -> BTreeMap<LetterBand, usize> {
    let mut out: BTreeMap<LetterBand, usize> = LetterBand::ALL.iter().map(|b| (*b, 0)).collect();
    for g in grades {
        *out.entry(LetterBand::for_score(g.score)).or_insert(0) += 1;
    }
    out
}

pub fn activity_counts(activities: &[ActivityEntry]) -> BTreeMap<String, usize> {
    let mut out: BTreeMap<String, usize> = BTreeMap::new();
    for a in activities {
        *out.entry(a.activity.clone()).or_insert(0) += 1;
    }
    out
}

pub fn activities_by_student(activities: &[ActivityEntry]) -> BTreeMap<String, Vec<String>> {
    let mut sets: BTreeMap<String, BTreeSet<String>> = BTreeMap::new();
    for a in activities {
        sets.entry(a.username.clone())
            .or_default()
            .insert(a.activity.clone());
    }
    sets.into_iter()
        .map(|(k, v)| (k, v.into_iter().collect()))
        .collect()
}

pub const UNCATEGORISED: &str = "Other";

/// Counts activity entries per configured category. Names are matched
/// case-insensitively; anything unmatched lands in "Other".
pub fn activity_category_counts(
    activities: &[ActivityEntry],
    categories: &[ActivityCategory],
) -> BTreeMap<String, usize> {
    let mut out: BTreeMap<String, usize> = categories.iter().map(|c| (c.name.clone(), 0)).collect();
    for a in activities {
        let category = categories
            .iter()
            .find(|c| {
                c.activities
                    .iter()
                    .any(|name| name.eq_ignore_ascii_case(&a.activity))
            })
            .map(|c| c.name.as_str())
            .unwrap_or(UNCATEGORISED);
        *out.entry(category.to_string()).or_insert(0) += 1;
    }
    out
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ScoreSummary {
    pub count: usize,
    pub min: f64,
    pub q1: f64,
    pub median: f64,
    pub q3: f64,
    pub max: f64,
    pub mean: f64,
}

/// Linear interpolation between closest ranks; `sorted` must be non-empty.
fn percentile(sorted: &[f64], p: f64) -> f64 {
    let pos = p * (sorted.len() - 1) as f64;
    let lo = pos.floor() as usize;
    let hi = pos.ceil() as usize;
    if lo == hi {
        return sorted[lo];
    }
    sorted[lo] + (sorted[hi] - sorted[lo]) * (pos - lo as f64)
}

pub fn score_summary(values: &[f64]) -> Option<ScoreSummary> {
    if values.is_empty() {
        return None;
    }
    let mut sorted = values.to_vec();
    sorted.sort_by(|a, b| a.partial_cmp(b).unwrap_or(Ordering::Equal));
    let n = sorted.len();
    Some(ScoreSummary {
        count: n,
        min: sorted[0],
        q1: percentile(&sorted, 0.25),
        median: percentile(&sorted, 0.5),
        q3: percentile(&sorted, 0.75),
        max: sorted[n - 1],
        mean: sorted.iter().sum::<f64>() / n as f64,
    })
}

pub fn subject_score_summary(grades: &[GradeEntry]) -> BTreeMap<String, ScoreSummary> {
    let mut by_subject: BTreeMap<String, Vec<f64>> = BTreeMap::new();
    for g in grades {
        by_subject
            .entry(g.subject.clone())
            .or_default()
            .push(f64::from(g.score));
    }
    by_subject
        .into_iter()
        .filter_map(|(k, v)| score_summary(&v).map(|s| (k, s)))
        .collect()
}
