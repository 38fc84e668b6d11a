use crate::config::SolverConfig;
use crate::data::{
    CohortKey, CourseId, CourseType, Day, GenerationInput, StudentId, TeacherId, Timetable,
    TimetableEntry,
};
use crate::disruption::{
    CancellationAction, CancellationRequest, CancellationSubmission, DisruptionManager, OfferId,
    RequestId, ResolveOutcome, SubstitutionOffer,
};
use crate::error::ScheduleError;
use crate::solver;
use itertools::Itertools;
use log::info;
use serde::Serialize;

/// One meeting as a student sees it.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StudentMeeting {
    pub day: Day,
    pub period: u32,
    pub course_name: String,
    pub teacher_id: TeacherId,
    pub room: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TeacherMeeting {
    pub day: Day,
    pub period: u32,
    pub course_name: String,
    pub cohort: CohortKey,
    pub students: Vec<StudentId>,
    pub room: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TeacherSchedule {
    pub meetings: Vec<TeacherMeeting>,
    /// Working hours left after the assigned meetings.
    pub workload_left: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ElectiveOption {
    pub course_id: CourseId,
    pub course_name: String,
    pub credits: Option<u32>,
    pub course_type: CourseType,
    pub is_selected: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionStatus {
    pub teachers: usize,
    pub students: usize,
    pub courses: usize,
    pub classrooms: usize,
    pub feedback: usize,
    pub elective_selections: usize,
    pub timetable_generated: bool,
    pub entries: usize,
    pub best_score: Option<u64>,
    pub pending_requests: usize,
    pub substitution_offers: usize,
}

/// The single owner of the live schedule and everything derived from it.
///
/// Callers serialise access (the server keeps it behind one mutex).
#[derive(Debug, Default)]
pub struct Session {
    default_config: SolverConfig,
    reference: Option<GenerationInput>,
    timetable: Option<Timetable>,
    disruption: DisruptionManager,
}

impl Session {
    pub fn new(default_config: SolverConfig) -> Self {
        Self {
            default_config,
            ..Self::default()
        }
    }

    /// Drop the timetable, its reference data, pending requests and offers.
    pub fn reset(&mut self) {
        self.reference = None;
        self.timetable = None;
        self.disruption.clear();
    }

    /// Start from scratch and build a new timetable. A failed run leaves the session empty.
    pub fn generate(&mut self, mut input: GenerationInput) -> Result<Timetable, ScheduleError> {
        self.reset();
        let config = input
            .config
            .take()
            .unwrap_or_else(|| self.default_config.clone());
        let timetable = solver::solve(&input, config)?;
        info!("Installed timetable with {} entries", timetable.entries.len());
        self.reference = Some(input);
        self.timetable = Some(timetable.clone());
        Ok(timetable)
    }

    pub fn timetable(&self) -> Result<&Timetable, ScheduleError> {
        self.timetable
            .as_ref()
            .ok_or_else(|| ScheduleError::not_found("timetable", "current"))
    }

    fn reference(&self) -> Result<&GenerationInput, ScheduleError> {
        self.reference
            .as_ref()
            .ok_or_else(|| ScheduleError::not_found("timetable", "current"))
    }

    fn room_label(&self, entry: &TimetableEntry) -> String {
        self.reference
            .iter()
            .flat_map(|r| r.classrooms.iter())
            .find(|room| room.id == entry.room_id)
            .map(|room| room.location.clone())
            .unwrap_or_default()
    }

    pub fn student_view(&self, student_id: &str) -> Result<Vec<StudentMeeting>, ScheduleError> {
        let timetable = self.timetable()?;
        Ok(timetable
            .entries
            .iter()
            .filter(|e| e.students.iter().any(|s| s == student_id))
            .sorted_by_key(|e| e.slot)
            .map(|e| StudentMeeting {
                day: e.slot.day,
                period: e.slot.period,
                course_name: e.course_name.clone(),
                teacher_id: e.teacher_id.clone(),
                room: self.room_label(e),
            })
            .collect())
    }

    pub fn teacher_view(&self, teacher_id: &str) -> Result<TeacherSchedule, ScheduleError> {
        let timetable = self.timetable()?;
        let teacher = self
            .reference()?
            .teachers
            .iter()
            .find(|t| t.id == teacher_id)
            .ok_or_else(|| ScheduleError::not_found("teacher", teacher_id))?;

        let meetings: Vec<TeacherMeeting> = timetable
            .entries
            .iter()
            .filter(|e| e.teacher_id == teacher_id)
            .sorted_by_key(|e| e.slot)
            .map(|e| TeacherMeeting {
                day: e.slot.day,
                period: e.slot.period,
                course_name: e.course_name.clone(),
                cohort: e.cohort.clone(),
                students: e.students.clone(),
                room: self.room_label(e),
            })
            .collect();
        let workload_left = teacher.working_hours.saturating_sub(meetings.len() as u32);
        Ok(TeacherSchedule {
            meetings,
            workload_left,
        })
    }

    pub fn cohort_view(&self, cohort: &CohortKey) -> Result<Vec<&TimetableEntry>, ScheduleError> {
        Ok(self
            .timetable()?
            .entries
            .iter()
            .filter(|e| &e.cohort == cohort)
            .sorted_by_key(|e| e.slot)
            .collect())
    }

    /// Non-Major courses of the student's program, flagged with the student's current picks.
    pub fn available_electives(
        &self,
        student_id: &str,
    ) -> Result<Vec<ElectiveOption>, ScheduleError> {
        let reference = self.reference()?;
        let student = reference
            .students
            .iter()
            .find(|s| s.id == student_id)
            .ok_or_else(|| ScheduleError::not_found("student", student_id))?;
        Ok(reference
            .courses
            .iter()
            .filter(|c| c.program == student.program && !c.course_type.is_major())
            .map(|c| ElectiveOption {
                course_id: c.id,
                course_name: c.name.clone(),
                credits: c.credits,
                course_type: c.course_type.clone(),
                is_selected: reference
                    .elective_selections
                    .iter()
                    .any(|s| s.student_id == student_id && s.course_id == c.id),
            })
            .collect())
    }

    pub fn status(&self) -> SessionStatus {
        let mut status = SessionStatus {
            timetable_generated: self.timetable.as_ref().is_some_and(|t| !t.entries.is_empty()),
            entries: self.timetable.as_ref().map_or(0, |t| t.entries.len()),
            best_score: self.timetable.as_ref().map(|t| t.score),
            pending_requests: self.disruption.pending().len(),
            substitution_offers: self.disruption.offers().len(),
            ..SessionStatus::default()
        };
        if let Some(reference) = &self.reference {
            status.teachers = reference.teachers.len();
            status.students = reference.students.len();
            status.courses = reference.courses.len();
            status.classrooms = reference.classrooms.len();
            status.feedback = reference.feedback.len();
            status.elective_selections = reference.elective_selections.len();
        }
        status
    }

    pub fn submit_cancellation(
        &mut self,
        submission: CancellationSubmission,
    ) -> Result<RequestId, ScheduleError> {
        self.disruption.submit(submission)
    }

    pub fn pending_cancellations(&self) -> &[CancellationRequest] {
        self.disruption.pending()
    }

    pub fn resolve_cancellation(
        &mut self,
        request_id: &str,
        action: CancellationAction,
    ) -> Result<ResolveOutcome, ScheduleError> {
        let teachers = self
            .reference
            .as_ref()
            .map_or(&[][..], |r| r.teachers.as_slice());
        self.disruption
            .resolve(request_id, action, self.timetable.as_mut(), teachers)
    }

    pub fn offers_for(&self, teacher_id: &str) -> Vec<&SubstitutionOffer> {
        self.disruption.offers_for(teacher_id)
    }

    pub fn accept_substitution(
        &mut self,
        offer_id: &OfferId,
        accepting_teacher_id: &str,
    ) -> Result<TimetableEntry, ScheduleError> {
        let (Some(timetable), Some(reference)) =
            (self.timetable.as_mut(), self.reference.as_ref())
        else {
            return Err(ScheduleError::not_found("substitution offer", offer_id.as_str()));
        };
        self.disruption
            .accept(offer_id, accepting_teacher_id, timetable, reference)
    }
}
