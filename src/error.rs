use std::fmt;

/// Failures surfaced to callers of the core.
///
/// Construction-time conflicts (no free slot, teacher or room) never show up here;
/// they only shrink the trial that hit them.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScheduleError {
    /// A mandatory base collection was empty; generation never started.
    PreconditionFailed(&'static str),
    /// Every trial of every iteration placed nothing.
    InfeasibleSchedule { iterations: usize, ants: usize },
    NotFound { kind: &'static str, id: String },
    /// An offer points at reference data that no longer resolves.
    Inconsistency(String),
    MissingField(&'static str),
}

impl ScheduleError {
    pub fn not_found(kind: &'static str, id: impl Into<String>) -> Self {
        ScheduleError::NotFound {
            kind,
            id: id.into(),
        }
    }
}

impl fmt::Display for ScheduleError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ScheduleError::PreconditionFailed(collection) => {
                write!(f, "Not enough base data: no {collection} supplied")
            }
            ScheduleError::InfeasibleSchedule { iterations, ants } => write!(
                f,
                "No feasible timetable found after {iterations} iterations of {ants} ants"
            ),
            ScheduleError::NotFound { kind, id } => write!(f, "{kind} '{id}' not found"),
            ScheduleError::Inconsistency(what) => write!(f, "Reference data inconsistency: {what}"),
            ScheduleError::MissingField(field) => write!(f, "Missing required field '{field}'"),
        }
    }
}

impl std::error::Error for ScheduleError {}
