use serde::{Deserialize, Serialize};
use std::fmt;

use crate::config::SolverConfig;

// Type aliases for clarity
pub type TeacherId = String;
pub type StudentId = String;
pub type CourseId = u32;
pub type RoomId = u32;

/// A teacher and the two courses they are willing to teach.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Teacher {
    pub id: TeacherId,
    pub working_hours: u32,
    #[serde(default)]
    pub first_preference: Option<String>,
    #[serde(default)]
    pub second_preference: Option<String>,
}

impl Teacher {
    /// Eligibility is an exact name match against either preference.
    pub fn prefers(&self, course_name: &str) -> bool {
        self.first_preference.as_deref() == Some(course_name)
            || self.second_preference.as_deref() == Some(course_name)
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Student {
    pub id: StudentId,
    #[serde(default)]
    pub name: String,
    pub program: String,
    pub semester: u32,
    pub section: String,
}

impl Student {
    pub fn cohort(&self) -> CohortKey {
        CohortKey {
            program: self.program.clone(),
            semester: self.semester,
            section: self.section.clone(),
        }
    }
}

/// Course category. Only `Major` courses are enrolled automatically.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Deserialize, Serialize)]
pub enum CourseType {
    Major,
    Minor,
    #[serde(rename = "Skill-Based")]
    SkillBased,
    #[serde(rename = "Ability Enhancement")]
    AbilityEnhancement,
    #[serde(rename = "Value-Added")]
    ValueAdded,
    #[serde(other)]
    Other,
}

impl CourseType {
    pub fn is_major(&self) -> bool {
        matches!(self, CourseType::Major)
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Course {
    pub id: CourseId,
    pub program: String,
    pub semester: u32,
    pub name: String,
    #[serde(default)]
    pub credits: Option<u32>,
    pub course_type: CourseType,
    #[serde(default)]
    pub is_lab: bool,
}

impl Course {
    /// Whether this course belongs to the given cohort's curriculum (section is ignored).
    pub fn matches_cohort(&self, cohort: &CohortKey) -> bool {
        self.program == cohort.program && self.semester == cohort.semester
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Classroom {
    pub id: RoomId,
    pub location: String,
    pub capacity: u32,
}

/// Stored alongside the other records; not consumed by construction.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FeedbackRecord {
    pub student_id: StudentId,
    pub teacher_id: TeacherId,
    pub course_id: CourseId,
    pub teacher_rating: f64,
    pub course_rating: f64,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ElectiveSelection {
    pub student_id: StudentId,
    pub course_id: CourseId,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Constraints {
    pub working_days: u32,
    pub periods_per_day: u32,
    pub minimum_total_credits: u32,
}

impl Default for Constraints {
    fn default() -> Self {
        Self {
            working_days: 5,
            periods_per_day: 8,
            minimum_total_credits: 120,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Deserialize, Serialize)]
pub enum Day {
    Mon,
    Tue,
    Wed,
    Thu,
    Fri,
}

impl Day {
    pub const ALL: [Day; 5] = [Day::Mon, Day::Tue, Day::Wed, Day::Thu, Day::Fri];
}

impl fmt::Display for Day {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Day::Mon => "Mon",
            Day::Tue => "Tue",
            Day::Wed => "Wed",
            Day::Thu => "Thu",
            Day::Fri => "Fri",
        };
        f.write_str(name)
    }
}

/// A (day, period) cell of the weekly grid. Periods start at 1.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Deserialize, Serialize)]
pub struct TimeSlot {
    pub day: Day,
    pub period: u32,
}

impl TimeSlot {
    pub fn new(day: Day, period: u32) -> Self {
        Self { day, period }
    }
}

impl fmt::Display for TimeSlot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}_{}", self.day, self.period)
    }
}

/// Students sharing (program, semester, section).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CohortKey {
    pub program: String,
    pub semester: u32,
    pub section: String,
}

impl fmt::Display for CohortKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}_{}_{}", self.program, self.semester, self.section)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BlockKind {
    /// Bound to one course of the cohort's curriculum.
    Core(CourseId),
    /// Resolved against the cohort's elective pool at construction time.
    Elective,
}

/// One required meeting-instance for one cohort.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SchedulingBlock {
    pub kind: BlockKind,
    pub cohort: CohortKey,
}

/// A single placed meeting.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TimetableEntry {
    pub course_id: CourseId,
    pub course_name: String,
    pub teacher_id: TeacherId,
    pub cohort: CohortKey,
    pub students: Vec<StudentId>,
    pub room_id: RoomId,
    pub slot: TimeSlot,
}

/// An accepted schedule and the score it was selected with.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Timetable {
    pub entries: Vec<TimetableEntry>,
    pub score: u64,
}

/// Everything a generation run consumes.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerationInput {
    #[serde(default)]
    pub teachers: Vec<Teacher>,
    #[serde(default)]
    pub students: Vec<Student>,
    #[serde(default)]
    pub courses: Vec<Course>,
    #[serde(default)]
    pub classrooms: Vec<Classroom>,
    #[serde(default)]
    pub feedback: Vec<FeedbackRecord>,
    #[serde(default)]
    pub elective_selections: Vec<ElectiveSelection>,
    #[serde(default)]
    pub constraints: Constraints,
    #[serde(default)]
    pub config: Option<SolverConfig>,
}
