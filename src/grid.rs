//! Derivations that turn raw records into the solver's working model:
//! the slot grid, per-course workload, cohorts, enrollment and scheduling blocks.
//!
//! Everything here is a pure function of its inputs.

use crate::data::{
    BlockKind, CohortKey, Constraints, Course, CourseId, Day, ElectiveSelection, SchedulingBlock,
    Student, StudentId, TimeSlot,
};
use itertools::Itertools;
use log::info;
use rand::Rng;
use rand::seq::SliceRandom;
use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};

const FALLBACK_MINIMUM_CREDITS: u32 = 120;

pub type Cohorts = BTreeMap<CohortKey, Vec<StudentId>>;
pub type Enrollment = HashMap<CourseId, BTreeSet<StudentId>>;

/// Day-major enumeration of the week. Working days are capped at Mon..Fri.
pub fn generate_time_slots(constraints: &Constraints) -> Vec<TimeSlot> {
    Day::ALL
        .iter()
        .take(constraints.working_days as usize)
        .flat_map(|&day| {
            (1..=constraints.periods_per_day).map(move |period| TimeSlot::new(day, period))
        })
        .collect()
}

/// Weekly meetings for a course: `ceil(credits / minimum_total_credits * total_slots)`.
///
/// Missing or zero credits yield zero meetings. A zero minimum falls back to 120.
pub fn required_meetings(
    credits: Option<u32>,
    constraints: &Constraints,
    total_slots: usize,
) -> usize {
    let credits = u64::from(credits.unwrap_or(0));
    let minimum = match constraints.minimum_total_credits {
        0 => FALLBACK_MINIMUM_CREDITS,
        m => m,
    };
    (credits * total_slots as u64).div_ceil(u64::from(minimum)) as usize
}

pub fn workload_map(
    courses: &[Course],
    constraints: &Constraints,
    total_slots: usize,
) -> HashMap<CourseId, usize> {
    courses
        .iter()
        .map(|c| (c.id, required_meetings(c.credits, constraints, total_slots)))
        .collect()
}

/// Partition students by (program, semester, section), preserving input order inside each cohort.
pub fn group_cohorts(students: &[Student]) -> Cohorts {
    students
        .iter()
        .map(|s| (s.cohort(), s.id.clone()))
        .into_group_map()
        .into_iter()
        .collect()
}

/// Enrolled students per course.
///
/// Major courses take every cohort with the same program and semester, whatever the
/// section. Every other course takes exactly the students who selected it.
pub fn resolve_enrollment(
    courses: &[Course],
    cohorts: &Cohorts,
    selections: &[ElectiveSelection],
) -> Enrollment {
    let mut enrollment: Enrollment = HashMap::new();

    let elective_ids: HashSet<CourseId> = courses
        .iter()
        .filter(|c| !c.course_type.is_major())
        .map(|c| c.id)
        .collect();
    for choice in selections.iter().filter(|s| elective_ids.contains(&s.course_id)) {
        enrollment
            .entry(choice.course_id)
            .or_default()
            .insert(choice.student_id.clone());
    }

    for course in courses.iter().filter(|c| c.course_type.is_major()) {
        let students = enrollment.entry(course.id).or_default();
        for (cohort, members) in cohorts {
            if course.matches_cohort(cohort) {
                students.extend(members.iter().cloned());
            }
        }
    }

    enrollment
}

/// Expand required meetings into blocks, cohort by cohort, in deterministic order.
///
/// Each cohort gets one Core block per required meeting of every Major course in its
/// curriculum, plus as many Elective blocks as its most heavily enrolled student needs.
pub fn decompose_blocks(
    courses: &[Course],
    cohorts: &Cohorts,
    enrollment: &Enrollment,
    workload: &HashMap<CourseId, usize>,
) -> Vec<SchedulingBlock> {
    let meetings = |id: CourseId| workload.get(&id).copied().unwrap_or(0);
    let (core, electives): (Vec<&Course>, Vec<&Course>) =
        courses.iter().partition(|c| c.course_type.is_major());

    let mut blocks = Vec::new();
    for (cohort, members) in cohorts {
        for course in core.iter().filter(|c| c.matches_cohort(cohort)) {
            blocks.extend((0..meetings(course.id)).map(|_| SchedulingBlock {
                kind: BlockKind::Core(course.id),
                cohort: cohort.clone(),
            }));
        }

        let elective_periods = members
            .iter()
            .map(|student| {
                electives
                    .iter()
                    .filter(|c| enrollment.get(&c.id).is_some_and(|e| e.contains(student)))
                    .map(|c| meetings(c.id))
                    .sum::<usize>()
            })
            .max()
            .unwrap_or(0);
        blocks.extend((0..elective_periods).map(|_| SchedulingBlock {
            kind: BlockKind::Elective,
            cohort: cohort.clone(),
        }));
    }
    blocks
}

/// A uniformly shuffled view of the blocks; each trial draws its own order.
pub fn shuffled_order<'a, R: Rng + ?Sized>(
    blocks: &'a [SchedulingBlock],
    rng: &mut R,
) -> Vec<&'a SchedulingBlock> {
    let mut order: Vec<&SchedulingBlock> = blocks.iter().collect();
    order.shuffle(rng);
    order
}

/// The read-only model shared by every trial of a run.
#[derive(Debug, Clone)]
pub struct DerivedModel {
    pub slots: Vec<TimeSlot>,
    pub workload: HashMap<CourseId, usize>,
    pub cohorts: Cohorts,
    pub enrollment: Enrollment,
    pub blocks: Vec<SchedulingBlock>,
}

impl DerivedModel {
    pub fn build(
        courses: &[Course],
        students: &[Student],
        selections: &[ElectiveSelection],
        constraints: &Constraints,
    ) -> Self {
        let slots = generate_time_slots(constraints);
        let workload = workload_map(courses, constraints, slots.len());
        let cohorts = group_cohorts(students);
        let enrollment = resolve_enrollment(courses, &cohorts, selections);
        let blocks = decompose_blocks(courses, &cohorts, &enrollment, &workload);
        info!(
            "Derived model: {} slots, {} cohorts, {} scheduling blocks",
            slots.len(),
            cohorts.len(),
            blocks.len()
        );
        Self {
            slots,
            workload,
            cohorts,
            enrollment,
            blocks,
        }
    }

    pub fn meetings(&self, course: CourseId) -> usize {
        self.workload.get(&course).copied().unwrap_or(0)
    }

    pub fn is_enrolled(&self, course: CourseId, student: &str) -> bool {
        self.enrollment
            .get(&course)
            .is_some_and(|students| students.contains(student))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::CourseType;
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    fn student(id: &str, program: &str, semester: u32, section: &str) -> Student {
        Student {
            id: id.into(),
            name: String::new(),
            program: program.into(),
            semester,
            section: section.into(),
        }
    }

    fn course(id: CourseId, name: &str, credits: u32, course_type: CourseType) -> Course {
        Course {
            id,
            program: "CS".into(),
            semester: 1,
            name: name.into(),
            credits: Some(credits),
            course_type,
            is_lab: false,
        }
    }

    #[test]
    fn slot_grid_is_days_times_periods() {
        let slots = generate_time_slots(&Constraints::default());
        assert_eq!(slots.len(), 40);
        assert_eq!(slots[0], TimeSlot::new(Day::Mon, 1));
        assert_eq!(slots[39], TimeSlot::new(Day::Fri, 8));

        let short = Constraints {
            working_days: 9,
            periods_per_day: 2,
            minimum_total_credits: 120,
        };
        assert_eq!(generate_time_slots(&short).len(), 10);
    }

    #[test]
    fn workload_scales_with_credit_share() {
        let constraints = Constraints::default();
        assert_eq!(required_meetings(Some(24), &constraints, 40), 8);
        assert_eq!(required_meetings(Some(120), &constraints, 40), 40);
        assert_eq!(required_meetings(Some(0), &constraints, 40), 0);
        assert_eq!(required_meetings(None, &constraints, 40), 0);
        // ceil(4/120 * 40) = ceil(1.33)
        assert_eq!(required_meetings(Some(4), &constraints, 40), 2);
    }

    #[test]
    fn zero_minimum_credits_falls_back() {
        let constraints = Constraints {
            minimum_total_credits: 0,
            ..Constraints::default()
        };
        assert_eq!(required_meetings(Some(24), &constraints, 40), 8);
    }

    #[test]
    fn cohorts_split_on_section() {
        let students = vec![
            student("s1", "CS", 1, "A"),
            student("s2", "CS", 1, "B"),
            student("s3", "CS", 1, "A"),
            student("s4", "CS", 3, "A"),
        ];
        let cohorts = group_cohorts(&students);
        assert_eq!(cohorts.len(), 3);
        let a = students[0].cohort();
        assert_eq!(cohorts[&a], vec!["s1".to_string(), "s3".to_string()]);
    }

    #[test]
    fn major_enrollment_spans_sections_and_electives_are_opt_in() {
        let students = vec![
            student("s1", "CS", 1, "A"),
            student("s2", "CS", 1, "B"),
            student("s3", "CS", 2, "A"),
        ];
        let courses = vec![
            course(1, "Algorithms", 24, CourseType::Major),
            course(2, "Pottery", 4, CourseType::Minor),
        ];
        let selections = vec![
            ElectiveSelection {
                student_id: "s3".into(),
                course_id: 2,
            },
            ElectiveSelection {
                student_id: "s1".into(),
                course_id: 1,
            },
        ];
        let cohorts = group_cohorts(&students);
        let enrollment = resolve_enrollment(&courses, &cohorts, &selections);

        let major: Vec<&str> = enrollment[&1].iter().map(String::as_str).collect();
        assert_eq!(major, vec!["s1", "s2"]);
        let elective: Vec<&str> = enrollment[&2].iter().map(String::as_str).collect();
        assert_eq!(elective, vec!["s3"]);

        let again = resolve_enrollment(&courses, &cohorts, &selections);
        assert_eq!(enrollment, again);
    }

    #[test]
    fn elective_blocks_follow_the_busiest_student() {
        let students = vec![student("s1", "CS", 1, "A"), student("s2", "CS", 1, "A")];
        let courses = vec![
            course(1, "Algorithms", 24, CourseType::Major),
            course(2, "Pottery", 3, CourseType::Minor),
            course(3, "Chess", 6, CourseType::SkillBased),
        ];
        let selections = vec![
            ElectiveSelection {
                student_id: "s1".into(),
                course_id: 2,
            },
            ElectiveSelection {
                student_id: "s1".into(),
                course_id: 3,
            },
            ElectiveSelection {
                student_id: "s2".into(),
                course_id: 3,
            },
        ];
        let model = DerivedModel::build(&courses, &students, &selections, &Constraints::default());

        assert_eq!(model.meetings(1), 8);
        assert_eq!(model.meetings(2), 1);
        assert_eq!(model.meetings(3), 2);

        let core = model
            .blocks
            .iter()
            .filter(|b| b.kind == BlockKind::Core(1))
            .count();
        let elective = model
            .blocks
            .iter()
            .filter(|b| b.kind == BlockKind::Elective)
            .count();
        assert_eq!(core, 8);
        // s1 needs 1 + 2, s2 needs 2: max, not sum
        assert_eq!(elective, 3);
        assert!(model.is_enrolled(3, "s2"));
        assert!(!model.is_enrolled(2, "s2"));
    }

    #[test]
    fn shuffled_order_is_a_permutation() {
        let students = vec![student("s1", "CS", 1, "A")];
        let courses = vec![course(1, "Algorithms", 24, CourseType::Major)];
        let model = DerivedModel::build(&courses, &students, &[], &Constraints::default());
        let mut rng = StdRng::seed_from_u64(42);
        let order = shuffled_order(&model.blocks, &mut rng);
        assert_eq!(order.len(), model.blocks.len());
        assert!(order.iter().all(|b| b.kind == BlockKind::Core(1)));
    }
}
