use crate::config::SolverConfig;
use crate::data::{
    BlockKind, Classroom, CohortKey, Course, CourseId, GenerationInput, RoomId, SchedulingBlock,
    StudentId, Teacher, TimeSlot, Timetable, TimetableEntry,
};
use crate::error::ScheduleError;
use crate::grid::{self, DerivedModel};
use log::{debug, info, trace, warn};
use rand::SeedableRng;
use rand::rngs::StdRng;
use rand::seq::IndexedRandom;
use rayon::prelude::*;
use std::collections::{HashMap, HashSet};
use std::time::Instant;

const TRAIL_INITIAL_WEIGHT: f64 = 1.0;
const DEPOSIT_EPSILON: f64 = 1e-5;

/// Decaying desirability per (course, slot).
///
/// Written after every iteration but never consulted during construction.
#[derive(Debug, Clone, Default)]
pub struct PheromoneTrail {
    weights: HashMap<(CourseId, TimeSlot), f64>,
}

impl PheromoneTrail {
    #[cfg(test)]
    pub fn weight(&self, course: CourseId, slot: TimeSlot) -> f64 {
        self.weights
            .get(&(course, slot))
            .copied()
            .unwrap_or(TRAIL_INITIAL_WEIGHT)
    }

    #[cfg(test)]
    pub fn len(&self) -> usize {
        self.weights.len()
    }

    pub fn evaporate(&mut self, rate: f64) {
        for weight in self.weights.values_mut() {
            *weight *= 1.0 - rate;
        }
    }

    pub fn deposit(&mut self, entries: &[TimetableEntry], amount: f64) {
        for entry in entries {
            *self
                .weights
                .entry((entry.course_id, entry.slot))
                .or_insert(TRAIL_INITIAL_WEIGHT) += amount;
        }
    }
}

/// Busy resources of one trial, per dimension and slot.
#[derive(Debug, Default)]
struct Occupancy<'a> {
    cohorts: HashSet<(&'a CohortKey, TimeSlot)>,
    teachers: HashSet<(&'a str, TimeSlot)>,
    rooms: HashSet<(RoomId, TimeSlot)>,
}

impl<'a> Occupancy<'a> {
    fn cohort_free(&self, cohort: &'a CohortKey, slot: TimeSlot) -> bool {
        !self.cohorts.contains(&(cohort, slot))
    }

    fn teacher_free(&self, teacher: &'a str, slot: TimeSlot) -> bool {
        !self.teachers.contains(&(teacher, slot))
    }

    fn room_free(&self, room: RoomId, slot: TimeSlot) -> bool {
        !self.rooms.contains(&(room, slot))
    }
}

/// Number of (teacher, slot), (room, slot) and (student, slot) double bookings.
pub fn count_collisions(entries: &[TimetableEntry]) -> usize {
    let mut teacher_slots = HashSet::new();
    let mut room_slots = HashSet::new();
    let mut student_slots = HashSet::new();
    let mut violations = 0;
    for entry in entries {
        if !teacher_slots.insert((entry.teacher_id.as_str(), entry.slot)) {
            violations += 1;
        }
        if !room_slots.insert((entry.room_id, entry.slot)) {
            violations += 1;
        }
        for student in &entry.students {
            if !student_slots.insert((student.as_str(), entry.slot)) {
                violations += 1;
            }
        }
    }
    violations
}

/// Fitness of a trial; lower is better. An empty trial is unusable and scores `None`.
pub fn score_trial(entries: &[TimetableEntry], hard_penalty: u64) -> Option<u64> {
    if entries.is_empty() {
        return None;
    }
    Some(count_collisions(entries) as u64 * hard_penalty)
}

#[inline]
fn trial_rng(base_seed: u64, iteration: usize, ant: usize) -> StdRng {
    let s = base_seed
        ^ (ant as u64).wrapping_mul(0x9E37_79B1_85EB_CA87)
        ^ (iteration as u64).wrapping_mul(0xD134_2543_DE82_E285).rotate_left(17);
    StdRng::seed_from_u64(s)
}

fn ensure_present<T>(items: &[T], collection: &'static str) -> Result<(), ScheduleError> {
    if items.is_empty() {
        warn!("Refusing to generate: no {collection}");
        return Err(ScheduleError::PreconditionFailed(collection));
    }
    Ok(())
}

/// Ant-colony style timetable search over a fixed slot grid.
pub struct ColonySolver<'a> {
    teachers: &'a [Teacher],
    classrooms: &'a [Classroom],
    courses: HashMap<CourseId, &'a Course>,
    electives: Vec<&'a Course>,
    model: DerivedModel,
    config: SolverConfig,
    trail: PheromoneTrail,
    best: Option<(Vec<TimetableEntry>, u64)>,
}

impl<'a> ColonySolver<'a> {
    pub fn new(input: &'a GenerationInput, config: SolverConfig) -> Result<Self, ScheduleError> {
        ensure_present(&input.teachers, "teachers")?;
        ensure_present(&input.students, "students")?;
        ensure_present(&input.courses, "courses")?;
        ensure_present(&input.classrooms, "classrooms")?;

        let model = DerivedModel::build(
            &input.courses,
            &input.students,
            &input.elective_selections,
            &input.constraints,
        );
        Ok(Self {
            teachers: &input.teachers,
            classrooms: &input.classrooms,
            courses: input.courses.iter().map(|c| (c.id, c)).collect(),
            electives: input
                .courses
                .iter()
                .filter(|c| !c.course_type.is_major())
                .collect(),
            model,
            config,
            trail: PheromoneTrail::default(),
            best: None,
        })
    }

    #[cfg(test)]
    pub fn model(&self) -> &DerivedModel {
        &self.model
    }

    #[cfg(test)]
    pub fn trail(&self) -> &PheromoneTrail {
        &self.trail
    }

    pub fn best_score(&self) -> Option<u64> {
        self.best.as_ref().map(|(_, score)| *score)
    }

    /// Run every iteration and return the global best.
    pub fn run(&mut self) -> Result<Timetable, ScheduleError> {
        let pool = self.config.worker_threads.and_then(|n| {
            rayon::ThreadPoolBuilder::new()
                .num_threads(n)
                .build()
                .map_err(|e| warn!("Falling back to the global thread pool: {e}"))
                .ok()
        });
        let base_seed = self.config.seed.unwrap_or_else(rand::random);
        info!(
            "Starting colony search: {} iterations x {} ants (seed {base_seed})",
            self.config.iterations, self.config.ants
        );

        for iteration in 0..self.config.iterations {
            let trials = match &pool {
                Some(pool) => pool.install(|| self.run_iteration(iteration, base_seed)),
                None => self.run_iteration(iteration, base_seed),
            };
            self.absorb(iteration, trials);
        }

        match self.best.take() {
            Some((entries, score)) => Ok(Timetable { entries, score }),
            None => Err(ScheduleError::InfeasibleSchedule {
                iterations: self.config.iterations,
                ants: self.config.ants,
            }),
        }
    }

    /// Fork: every ant builds independently with its own RNG and occupancy.
    fn run_iteration(&self, iteration: usize, base_seed: u64) -> Vec<Vec<TimetableEntry>> {
        (0..self.config.ants)
            .into_par_iter()
            .map(|ant| {
                let mut rng = trial_rng(base_seed, iteration, ant);
                let entries = self.construct_trial(&mut rng);
                trace!("Iteration {iteration} ant {ant}: {} entries", entries.len());
                entries
            })
            .collect()
    }

    /// Join: single-writer reduction of one iteration's trials.
    fn absorb(&mut self, iteration: usize, trials: Vec<Vec<TimetableEntry>>) {
        if trials.iter().all(Vec::is_empty) {
            debug!("Iteration {}: every ant came back empty", iteration + 1);
            return;
        }

        for entries in trials {
            let Some(score) = score_trial(&entries, self.config.hard_penalty) else {
                continue;
            };
            if self.best_score().is_none_or(|best| score < best) {
                self.best = Some((entries, score));
            }
        }

        if let Some((entries, score)) = &self.best {
            self.trail.evaporate(self.config.evaporation_rate);
            let deposit = self.config.deposit_strength / (*score as f64 + DEPOSIT_EPSILON);
            self.trail.deposit(entries, deposit);
            debug!(
                "Iteration {}/{} | Best Score: {score}",
                iteration + 1,
                self.config.iterations
            );
        }
    }

    /// One ant: claim cohort slots for shuffled blocks, then resolve teachers and rooms.
    pub fn construct_trial(&self, rng: &mut StdRng) -> Vec<TimetableEntry> {
        let mut occupancy = Occupancy::default();
        let mut pools = self.elective_pools();

        let mut placements: Vec<(TimeSlot, &SchedulingBlock)> = Vec::new();
        for block in grid::shuffled_order(&self.model.blocks, rng) {
            let free: Vec<TimeSlot> = self
                .model
                .slots
                .iter()
                .copied()
                .filter(|&slot| occupancy.cohort_free(&block.cohort, slot))
                .collect();
            let Some(&slot) = free.choose(rng) else {
                trace!("No free slot left for cohort {}", block.cohort);
                continue;
            };
            occupancy.cohorts.insert((&block.cohort, slot));
            placements.push((slot, block));
        }

        let mut timetable = Vec::new();
        for (slot, block) in placements {
            let Some(members) = self.model.cohorts.get(&block.cohort) else {
                continue;
            };
            match block.kind {
                BlockKind::Core(course_id) => {
                    let Some(course) = self.courses.get(&course_id) else {
                        continue;
                    };
                    let students = members.clone();
                    match self.resolve(course, slot, &block.cohort, students, &mut occupancy) {
                        Some(entry) => timetable.push(entry),
                        None => trace!("Dropped {} for {} at {slot}", course.name, block.cohort),
                    }
                }
                BlockKind::Elective => {
                    let Some(pool) = pools.get_mut(&block.cohort) else {
                        continue;
                    };
                    for i in 0..pool.len() {
                        let course = pool[i];
                        let enrolled: Vec<StudentId> = members
                            .iter()
                            .filter(|s| self.model.is_enrolled(course.id, s))
                            .cloned()
                            .collect();
                        if enrolled.is_empty() {
                            continue;
                        }
                        let placed =
                            self.resolve(course, slot, &block.cohort, enrolled, &mut occupancy);
                        if let Some(entry) = placed {
                            timetable.push(entry);
                            pool.remove(i);
                            break;
                        }
                    }
                }
            }
        }
        timetable
    }

    /// Per-cohort queue of elective meetings still to place, one item per required meeting.
    fn elective_pools(&self) -> HashMap<&CohortKey, Vec<&'a Course>> {
        self.model
            .cohorts
            .iter()
            .map(|(cohort, members)| {
                let pool = self
                    .electives
                    .iter()
                    .filter(|c| members.iter().any(|s| self.model.is_enrolled(c.id, s)))
                    .flat_map(|&c| std::iter::repeat_n(c, self.model.meetings(c.id)))
                    .collect();
                (cohort, pool)
            })
            .collect()
    }

    /// First free eligible teacher and first free room that seats everyone.
    fn resolve<'t>(
        &'t self,
        course: &Course,
        slot: TimeSlot,
        cohort: &CohortKey,
        students: Vec<StudentId>,
        occupancy: &mut Occupancy<'t>,
    ) -> Option<TimetableEntry> {
        let teacher = self
            .teachers
            .iter()
            .find(|t| t.prefers(&course.name) && occupancy.teacher_free(&t.id, slot))?;
        let room = self
            .classrooms
            .iter()
            .find(|r| r.capacity as usize >= students.len() && occupancy.room_free(r.id, slot))?;

        occupancy.teachers.insert((teacher.id.as_str(), slot));
        occupancy.rooms.insert((room.id, slot));
        Some(TimetableEntry {
            course_id: course.id,
            course_name: course.name.clone(),
            teacher_id: teacher.id.clone(),
            cohort: cohort.clone(),
            students,
            room_id: room.id,
            slot,
        })
    }
}

/// solves the timetabling problem with the colony search.
pub fn solve(input: &GenerationInput, config: SolverConfig) -> Result<Timetable, ScheduleError> {
    let start_time = Instant::now();
    let mut solver = ColonySolver::new(input, config)?;
    let result = solver.run();
    let duration = start_time.elapsed();
    match &result {
        Ok(timetable) => info!(
            "Timetable with {} entries (score {}) found in {:.2?}",
            timetable.entries.len(),
            timetable.score,
            duration
        ),
        Err(e) => warn!("{e} ({duration:.2?})"),
    }
    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::{Constraints, CourseType, Day, ElectiveSelection, Student};

    fn teacher(id: &str, first: &str, second: Option<&str>) -> Teacher {
        Teacher {
            id: id.into(),
            working_hours: 20,
            first_preference: Some(first.into()),
            second_preference: second.map(String::from),
        }
    }

    fn student(id: &str, section: &str) -> Student {
        Student {
            id: id.into(),
            name: String::new(),
            program: "CS".into(),
            semester: 1,
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

    fn room(id: RoomId, capacity: u32) -> Classroom {
        Classroom {
            id,
            location: format!("R{id}"),
            capacity,
        }
    }

    fn small_config() -> SolverConfig {
        SolverConfig {
            ants: 4,
            iterations: 3,
            seed: Some(42),
            ..SolverConfig::default()
        }
    }

    fn single_cohort_input() -> GenerationInput {
        GenerationInput {
            teachers: vec![teacher("T1", "Algorithms", None)],
            students: vec![student("s1", "A"), student("s2", "A"), student("s3", "A")],
            courses: vec![course(1, "Algorithms", 24, CourseType::Major)],
            classrooms: vec![room(1, 30)],
            ..GenerationInput::default()
        }
    }

    fn entry(teacher: &str, room: RoomId, students: &[&str], slot: TimeSlot) -> TimetableEntry {
        TimetableEntry {
            course_id: 1,
            course_name: "Algorithms".into(),
            teacher_id: teacher.into(),
            cohort: student("x", "A").cohort(),
            students: students.iter().map(|s| s.to_string()).collect(),
            room_id: room,
            slot,
        }
    }

    fn assert_no_double_booking(entries: &[TimetableEntry]) {
        let mut teachers = HashSet::new();
        let mut rooms = HashSet::new();
        let mut students = HashSet::new();
        for e in entries {
            assert!(teachers.insert((e.teacher_id.clone(), e.slot)), "teacher clash at {}", e.slot);
            assert!(rooms.insert((e.room_id, e.slot)), "room clash at {}", e.slot);
            for s in &e.students {
                assert!(students.insert((s.clone(), e.slot)), "student clash at {}", e.slot);
            }
        }
    }

    #[test]
    fn single_major_course_fills_its_workload() {
        let input = single_cohort_input();
        let timetable = solve(&input, small_config()).unwrap();

        assert_eq!(timetable.entries.len(), 8);
        assert_eq!(timetable.score, 0);
        let slots: HashSet<TimeSlot> = timetable.entries.iter().map(|e| e.slot).collect();
        assert_eq!(slots.len(), 8);
        assert!(timetable.entries.iter().all(|e| e.students.len() == 3));
    }

    #[test]
    fn missing_classrooms_fail_before_any_trial() {
        let mut input = single_cohort_input();
        input.classrooms.clear();
        let err = solve(&input, small_config()).unwrap_err();
        assert_eq!(err, ScheduleError::PreconditionFailed("classrooms"));
    }

    #[test]
    fn no_eligible_teacher_is_infeasible() {
        let mut input = single_cohort_input();
        input.teachers = vec![teacher("T1", "Databases", Some("Networks"))];
        let err = solve(&input, small_config()).unwrap_err();
        assert_eq!(
            err,
            ScheduleError::InfeasibleSchedule {
                iterations: 3,
                ants: 4
            }
        );
    }

    #[test]
    fn undersized_rooms_drop_every_block() {
        let mut input = single_cohort_input();
        input.classrooms = vec![room(1, 2)];
        assert!(matches!(
            solve(&input, small_config()),
            Err(ScheduleError::InfeasibleSchedule { .. })
        ));
    }

    #[test]
    fn shared_resources_are_never_double_booked() {
        let input = GenerationInput {
            teachers: vec![
                teacher("T1", "Algorithms", Some("Pottery")),
                teacher("T2", "Compilers", Some("Chess")),
            ],
            students: vec![
                student("a1", "A"),
                student("a2", "A"),
                student("b1", "B"),
                student("b2", "B"),
            ],
            courses: vec![
                course(1, "Algorithms", 24, CourseType::Major),
                course(2, "Compilers", 18, CourseType::Major),
                course(3, "Pottery", 6, CourseType::Minor),
                course(4, "Chess", 9, CourseType::SkillBased),
            ],
            classrooms: vec![room(1, 2), room(2, 4)],
            elective_selections: vec![
                ElectiveSelection {
                    student_id: "a1".into(),
                    course_id: 3,
                },
                ElectiveSelection {
                    student_id: "a1".into(),
                    course_id: 4,
                },
                ElectiveSelection {
                    student_id: "b2".into(),
                    course_id: 4,
                },
            ],
            ..GenerationInput::default()
        };
        let timetable = solve(&input, small_config()).unwrap();

        assert!(!timetable.entries.is_empty());
        assert_eq!(count_collisions(&timetable.entries), 0);
        assert_no_double_booking(&timetable.entries);

        let mut cohort_slots = HashSet::new();
        for e in &timetable.entries {
            assert!(cohort_slots.insert((e.cohort.clone(), e.slot)));
        }
        for e in timetable.entries.iter().filter(|e| e.course_id == 3) {
            assert_eq!(e.students, vec!["a1".to_string()]);
        }
    }

    #[test]
    fn seeded_runs_are_reproducible() {
        let input = single_cohort_input();
        let first = solve(&input, small_config()).unwrap();
        let second = solve(&input, small_config()).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn bounded_pool_gives_the_same_result() {
        let input = single_cohort_input();
        let global = solve(&input, small_config()).unwrap();
        let bounded = solve(
            &input,
            SolverConfig {
                worker_threads: Some(2),
                ..small_config()
            },
        )
        .unwrap();
        assert_eq!(global, bounded);
    }

    #[test]
    fn collisions_are_counted_per_dimension() {
        let slot = TimeSlot::new(Day::Mon, 1);
        let entries = vec![
            entry("T1", 1, &["s1", "s2"], slot),
            entry("T1", 1, &["s2"], slot),
            entry("T2", 2, &["s1"], TimeSlot::new(Day::Mon, 2)),
        ];
        // teacher + room + student s2
        assert_eq!(count_collisions(&entries), 3);
        assert_eq!(score_trial(&entries, 1000), Some(3000));
        assert_eq!(score_trial(&[], 1000), None);
    }

    #[test]
    fn trail_evaporates_then_rewards_best_entries() {
        let slot = TimeSlot::new(Day::Tue, 4);
        let mut trail = PheromoneTrail::default();
        assert_eq!(trail.weight(1, slot), 1.0);

        trail.deposit(&[entry("T1", 1, &["s1"], slot)], 0.5);
        assert_eq!(trail.weight(1, slot), 1.5);
        trail.evaporate(0.1);
        assert!((trail.weight(1, slot) - 1.35).abs() < 1e-9);
        assert_eq!(trail.weight(2, slot), 1.0);
    }

    #[test]
    fn run_leaves_trail_on_the_best_course_slots() {
        let input = single_cohort_input();
        let mut solver = ColonySolver::new(&input, small_config()).unwrap();
        let timetable = solver.run().unwrap();

        assert!(solver.trail().len() >= timetable.entries.len());
        for e in &timetable.entries {
            assert!(solver.trail().weight(e.course_id, e.slot) > 1.0);
        }
    }

    #[test]
    fn trial_placements_stay_within_cohort_capacity() {
        // 160 credits against 120 asks for more meetings than slots exist
        let mut input = single_cohort_input();
        input.courses = vec![course(1, "Algorithms", 160, CourseType::Major)];
        input.constraints = Constraints {
            working_days: 1,
            periods_per_day: 4,
            minimum_total_credits: 120,
        };
        let solver = ColonySolver::new(&input, small_config()).unwrap();
        assert_eq!(solver.model().blocks.len(), 6);

        let mut rng = StdRng::seed_from_u64(3);
        let entries = solver.construct_trial(&mut rng);
        assert_eq!(entries.len(), 4);
    }
}
