//! Cancellation requests and substitution offers against the live timetable.
//!
//! Every operation validates before it mutates, so a failed call leaves the
//! timetable, the pending requests and the offers untouched.

use crate::data::{
    CohortKey, CourseId, GenerationInput, RoomId, StudentId, Teacher, TeacherId, TimeSlot,
    Timetable, TimetableEntry,
};
use crate::error::ScheduleError;
use log::{info, warn};
use serde::{Deserialize, Serialize};

pub type RequestId = String;
pub type OfferId = String;

/// Raw cancellation as submitted by a teacher.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CancellationSubmission {
    pub teacher_id: Option<TeacherId>,
    pub slot: Option<TimeSlot>,
    pub course_name: Option<String>,
    pub cohort: Option<CohortKey>,
    #[serde(default)]
    pub student_ids: Vec<StudentId>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CancellationRequest {
    pub id: RequestId,
    pub teacher_id: TeacherId,
    pub slot: TimeSlot,
    pub course_name: String,
    pub cohort: CohortKey,
    pub student_ids: Vec<StudentId>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum CancellationAction {
    Approve,
    Reject,
}

/// What a substitute would take over. Offers for one cancellation share these.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OfferDetails {
    pub course_id: CourseId,
    pub course_name: String,
    pub cohort: CohortKey,
    pub students: Vec<StudentId>,
    pub room_id: RoomId,
    pub slot: TimeSlot,
}

impl From<&TimetableEntry> for OfferDetails {
    fn from(entry: &TimetableEntry) -> Self {
        Self {
            course_id: entry.course_id,
            course_name: entry.course_name.clone(),
            cohort: entry.cohort.clone(),
            students: entry.students.clone(),
            room_id: entry.room_id,
            slot: entry.slot,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SubstitutionOffer {
    pub id: OfferId,
    pub details: OfferDetails,
    pub offered_to: TeacherId,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ResolveOutcome {
    pub action: CancellationAction,
    pub removed: Option<TimetableEntry>,
    pub offers: Vec<OfferId>,
}

/// Teachers other than `original` who prefer the course and are free at `slot`.
pub fn eligible_substitutes<'t>(
    teachers: &'t [Teacher],
    entries: &[TimetableEntry],
    course_name: &str,
    slot: TimeSlot,
    original: &str,
) -> Vec<&'t Teacher> {
    teachers
        .iter()
        .filter(|t| t.id != original && t.prefers(course_name))
        .filter(|t| !entries.iter().any(|e| e.slot == slot && e.teacher_id == t.id))
        .collect()
}

fn required<T>(value: Option<T>, field: &'static str) -> Result<T, ScheduleError> {
    value.ok_or(ScheduleError::MissingField(field))
}

fn required_text(value: Option<String>, field: &'static str) -> Result<String, ScheduleError> {
    required(value, field).and_then(|text| {
        if text.trim().is_empty() {
            Err(ScheduleError::MissingField(field))
        } else {
            Ok(text)
        }
    })
}

#[derive(Debug, Default)]
pub struct DisruptionManager {
    pending: Vec<CancellationRequest>,
    offers: Vec<SubstitutionOffer>,
    next_id: u64,
}

impl DisruptionManager {
    /// Forget every request and offer. Ids keep counting so none is ever reused.
    pub fn clear(&mut self) {
        self.pending.clear();
        self.offers.clear();
    }

    pub fn pending(&self) -> &[CancellationRequest] {
        &self.pending
    }

    pub fn offers(&self) -> &[SubstitutionOffer] {
        &self.offers
    }

    pub fn offers_for(&self, teacher_id: &str) -> Vec<&SubstitutionOffer> {
        self.offers
            .iter()
            .filter(|o| o.offered_to == teacher_id)
            .collect()
    }

    fn next_id(&mut self, prefix: &str) -> String {
        self.next_id += 1;
        format!("{prefix}-{}", self.next_id)
    }

    pub fn submit(
        &mut self,
        submission: CancellationSubmission,
    ) -> Result<RequestId, ScheduleError> {
        let teacher_id = required_text(submission.teacher_id, "teacherId")?;
        let slot = required(submission.slot, "slot")?;
        let course_name = required_text(submission.course_name, "courseName")?;
        let cohort = required(submission.cohort, "cohort")?;

        let id = self.next_id("req");
        info!("Cancellation {id}: {teacher_id} asks to cancel {course_name} at {slot}");
        self.pending.push(CancellationRequest {
            id: id.clone(),
            teacher_id,
            slot,
            course_name,
            cohort,
            student_ids: submission.student_ids,
        });
        Ok(id)
    }

    /// Consume a pending request. Approval removes the teacher's entry at that slot
    /// and offers it to every eligible substitute.
    pub fn resolve(
        &mut self,
        request_id: &str,
        action: CancellationAction,
        timetable: Option<&mut Timetable>,
        teachers: &[Teacher],
    ) -> Result<ResolveOutcome, ScheduleError> {
        let position = self
            .pending
            .iter()
            .position(|r| r.id == request_id)
            .ok_or_else(|| ScheduleError::not_found("cancellation request", request_id))?;
        let request = self.pending.remove(position);

        let mut outcome = ResolveOutcome {
            action,
            removed: None,
            offers: Vec::new(),
        };
        let (CancellationAction::Approve, Some(timetable)) = (action, timetable) else {
            info!("Cancellation {request_id} {action:?} without schedule change");
            return Ok(outcome);
        };

        let Some(index) = timetable
            .entries
            .iter()
            .position(|e| e.teacher_id == request.teacher_id && e.slot == request.slot)
        else {
            warn!(
                "Cancellation {request_id}: {} has nothing at {}",
                request.teacher_id, request.slot
            );
            return Ok(outcome);
        };
        let cancelled = timetable.entries.remove(index);

        let details = OfferDetails::from(&cancelled);
        let substitutes = eligible_substitutes(
            teachers,
            &timetable.entries,
            &cancelled.course_name,
            cancelled.slot,
            &request.teacher_id,
        );
        for teacher in substitutes {
            let id = self.next_id("offer");
            outcome.offers.push(id.clone());
            self.offers.push(SubstitutionOffer {
                id,
                details: details.clone(),
                offered_to: teacher.id.clone(),
            });
        }
        info!(
            "Cancellation {request_id} approved: {} at {} removed, {} offers created",
            cancelled.course_name,
            cancelled.slot,
            outcome.offers.len()
        );
        outcome.removed = Some(cancelled);
        Ok(outcome)
    }

    /// Bind the accepting teacher to the cancelled meeting and withdraw all offers for it,
    /// along with the teacher's other offers in the same slot.
    ///
    /// Fails without side effects when the teacher already teaches at that slot.
    pub fn accept(
        &mut self,
        offer_id: &str,
        accepting_teacher_id: &str,
        timetable: &mut Timetable,
        reference: &GenerationInput,
    ) -> Result<TimetableEntry, ScheduleError> {
        let offer = self
            .offers
            .iter()
            .find(|o| o.id == offer_id)
            .ok_or_else(|| ScheduleError::not_found("substitution offer", offer_id))?;
        let details = offer.details.clone();

        let teacher = reference
            .teachers
            .iter()
            .find(|t| t.id == accepting_teacher_id)
            .ok_or_else(|| {
                ScheduleError::Inconsistency(format!("unknown teacher {accepting_teacher_id}"))
            })?;
        let course = reference
            .courses
            .iter()
            .find(|c| c.id == details.course_id)
            .ok_or_else(|| {
                ScheduleError::Inconsistency(format!("unknown course {}", details.course_id))
            })?;
        let room = reference
            .classrooms
            .iter()
            .find(|r| r.id == details.room_id)
            .ok_or_else(|| {
                ScheduleError::Inconsistency(format!("unknown classroom {}", details.room_id))
            })?;
        if timetable
            .entries
            .iter()
            .any(|e| e.teacher_id == teacher.id && e.slot == details.slot)
        {
            return Err(ScheduleError::Inconsistency(format!(
                "teacher {} is already teaching at {}",
                teacher.id, details.slot
            )));
        }

        let entry = TimetableEntry {
            course_id: course.id,
            course_name: course.name.clone(),
            teacher_id: teacher.id.clone(),
            cohort: details.cohort.clone(),
            students: details.students.clone(),
            room_id: room.id,
            slot: details.slot,
        };
        timetable.entries.push(entry.clone());
        // the slot is now taken for this teacher, so their other offers there are stale
        self.offers.retain(|o| {
            let same_teacher_slot =
                o.offered_to == entry.teacher_id && o.details.slot == entry.slot;
            o.details != details && !same_teacher_slot
        });
        info!(
            "Offer {offer_id} accepted: {} takes {} at {}",
            entry.teacher_id, entry.course_name, entry.slot
        );
        Ok(entry)
    }
}
