use anyhow::{Result, bail};
use moodle_dump_core::Course;
use tracing::warn;

/// Keeps only `selected` course ids, in enrolment order.
///
/// An empty selection keeps every course. Ids that match no enrolled
/// course are logged; a selection matching nothing is an error.
pub(crate) fn select_courses(courses: Vec<Course>, selected: &[i64]) -> Result<Vec<Course>> {
    if selected.is_empty() {
        return Ok(courses);
    }

    for id in selected {
        if !courses.iter().any(|course| course.id == *id) {
            warn!(course_id = id, "requested course is not among enrolled courses");
        }
    }

    let chosen: Vec<Course> = courses
        .into_iter()
        .filter(|course| selected.contains(&course.id))
        .collect();
    if chosen.is_empty() {
        bail!("None of the requested courses ({selected:?}) are enrolled");
    }
    Ok(chosen)
}
