use crate::calc::{self, LetterBand};
use crate::ipc::helpers::{require_session, require_store, respond, HandlerErr};
use crate::ipc::types::{AppState, Request, Session};
use crate::records::{ActivityEntry, GradeEntry};
use crate::store::RecordStore;
use serde_json::json;
use std::collections::BTreeMap;

// Admins chart the whole class; students only see their own records.

fn visible_grades(store: &RecordStore, session: &Session) -> Result<Vec<GradeEntry>, HandlerErr> {
    Ok(store.grades_for(&session.username, session.is_admin)?)
}

fn visible_activities(
    store: &RecordStore,
    session: &Session,
) -> Result<Vec<ActivityEntry>, HandlerErr> {
    Ok(store.activities_for(&session.username, session.is_admin)?)
}

fn bands_json(dist: &BTreeMap<LetterBand, usize>) -> serde_json::Value {
    let bands: Vec<serde_json::Value> = LetterBand::ALL
        .iter()
        .map(|b| {
            json!({
                "band": b.to_string(),
                "label": b.label(),
                "count": dist.get(b).copied().unwrap_or(0),
            })
        })
        .collect();
    json!({ "bands": bands })
}

fn stats_request(state: &AppState, method: &str) -> Result<serde_json::Value, HandlerErr> {
    let session = require_session(state)?;
    let store = require_store(state)?;
    let all = session.is_admin;

    let value = match method {
        "stats.studentAverages" => {
            let averages = if all {
                store.aggregate_student_averages()?
            } else {
                calc::student_averages(&visible_grades(store, session)?)
            };
            json!({ "averages": averages })
        }
        "stats.subjectAverages" => {
            let averages = if all {
                store.aggregate_subject_averages()?
            } else {
                calc::subject_averages(&visible_grades(store, session)?)
            };
            json!({ "averages": averages })
        }
        "stats.gradeDistribution" => {
            let dist = if all {
                store.aggregate_grade_distribution()?
            } else {
                calc::grade_distribution(&visible_grades(store, session)?)
            };
            bands_json(&dist)
        }
        "stats.activityCounts" => {
            let counts = if all {
                store.aggregate_activity_counts()?
            } else {
                calc::activity_counts(&visible_activities(store, session)?)
            };
            json!({ "counts": counts })
        }
        "stats.subjectSummary" => {
            let grades = visible_grades(store, session)?;
            json!({ "subjects": calc::subject_score_summary(&grades) })
        }
        "stats.activitiesByStudent" => {
            let activities = visible_activities(store, session)?;
            json!({ "students": calc::activities_by_student(&activities) })
        }
        "stats.activityCategories" => {
            let activities = visible_activities(store, session)?;
            let counts =
                calc::activity_category_counts(&activities, &store.config().activity_categories);
            json!({ "categories": counts })
        }
        other => {
            return Err(HandlerErr::new(
                "not_implemented",
                format!("unknown method: {}", other),
            ))
        }
    };
    Ok(value)
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "stats.studentAverages"
        | "stats.subjectAverages"
        | "stats.gradeDistribution"
        | "stats.activityCounts"
        | "stats.subjectSummary"
        | "stats.activitiesByStudent"
        | "stats.activityCategories" => {
            Some(respond(&req.id, stats_request(state, &req.method)))
        }
        _ => None,
    }
}
