use chrono::{DateTime, Datelike, TimeZone, Utc};
use taskshift::calendar::WORK_WEEK;
use taskshift::{
    availability, Calendar, Leave, MultiResourcePolicy, Resource, ResourceMode, ScheduleError,
    ScheduleOptions, ScheduleState, Scheduler, SchedulerConfig, SearchDirection, Task, TimeRange,
    WarningCode,
};

const EPSILON: f64 = 1e-4;

// 2025-01-06 is a Monday
fn t(day: u32, hour: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2025, 1, day, hour, 0, 0).unwrap()
}

fn base_state() -> ScheduleState {
    let mut state = ScheduleState::new();
    state
        .insert_calendar(Calendar::new("mornings").with_hours(&WORK_WEEK, 8.0, 12.0))
        .unwrap();
    state
        .insert_calendar(Calendar::new("afternoons").with_hours(&WORK_WEEK, 13.0, 17.0))
        .unwrap();
    state.insert_calendar(Calendar::new("any")).unwrap();
    state.insert_resource(Resource::new("early", "mornings")).unwrap();
    state.insert_resource(Resource::new("late", "afternoons")).unwrap();
    state
        .insert_resource(
            Resource::new("flex", "any").with_mode(ResourceMode::FullyFlexible { weekly_cap: 40.0 }),
        )
        .unwrap();
    state
}

fn assert_within_calendar(scheduler: &Scheduler, task_id: &str) {
    let placement = scheduler.state().placement(task_id).unwrap();
    for slice in &placement.slices {
        let (resource, calendar) = scheduler
            .state()
            .resource_with_calendar(&slice.resource_id)
            .unwrap();
        let inside = availability(resource, calendar, slice.range, SearchDirection::Forward)
            .map(|i| i.range.hours())
            .sum::<f64>();
        assert!(
            (inside - slice.hours()).abs() < EPSILON,
            "{task_id} works outside {} hours: {:?}",
            slice.resource_id,
            slice.range
        );
    }
}

fn assert_no_overlap(scheduler: &Scheduler, resource_id: &str) {
    let spans: Vec<_> = scheduler
        .state()
        .tasks_by_resource(resource_id)
        .into_iter()
        .filter_map(|task| Some((&task.id, task.span()?)))
        .collect();
    for (i, (a, span_a)) in spans.iter().enumerate() {
        for (b, span_b) in &spans[i + 1..] {
            assert!(
                !span_a.overlaps(span_b),
                "{a} {span_a:?} and {b} {span_b:?} overlap on {resource_id}"
            );
        }
    }
}

#[test]
fn scenario_a_backward_push_into_latest_morning() {
    let mut state = base_state();
    state
        .insert_task(
            Task::new("task1", 4.0)
                .with_resources(["early"])
                .with_dates(t(6, 8), t(6, 12)),
        )
        .unwrap();
    state
        .insert_task(
            Task::new("task3", 4.0)
                .with_resources(["early"])
                .with_dependencies(["task1"])
                .with_dates(t(7, 8), t(7, 12)),
        )
        .unwrap();
    let mut scheduler = Scheduler::recording(state, SchedulerConfig::default());

    let outcome = scheduler.reschedule("task3", t(6, 10), t(7, 10)).unwrap();
    assert!(outcome.warnings.is_empty(), "{:?}", outcome.warnings);

    let task1 = scheduler.state().task("task1").unwrap();
    // Mon 08-10 plus the Friday before, 10-12
    assert_eq!(task1.deadline, Some(t(6, 10)));
    assert_eq!(task1.planned_begin, Some(t(3, 10)));
    assert_within_calendar(&scheduler, "task1");
    assert_no_overlap(&scheduler, "early");

    let again = scheduler.reschedule("task3", t(6, 10), t(7, 10)).unwrap();
    assert!(again.is_noop(), "{again:?}");
}

#[test]
fn scenario_b_split_across_disjoint_calendars() {
    let mut state = base_state();
    state
        .insert_task(Task::new("pair", 10.0).with_resources(["early", "late"]))
        .unwrap();
    let mut scheduler = Scheduler::recording(state, SchedulerConfig::default());

    let outcome = scheduler
        .schedule_tasks(&["pair"], TimeRange::new(t(6, 0), t(13, 0)), &ScheduleOptions::new())
        .unwrap();
    let placement = outcome.placement("pair").unwrap();
    assert!((placement.total_hours() - 10.0).abs() < EPSILON);
    assert!((placement.hours_for("early") - 6.0).abs() < EPSILON);
    assert!((placement.hours_for("late") - 4.0).abs() < EPSILON);
    assert_eq!(placement.begin, t(6, 8));
    assert_eq!(placement.deadline, t(7, 10));
    assert_within_calendar(&scheduler, "pair");
}

#[test]
fn scenario_b_together_policy_finds_nothing() {
    let mut state = base_state();
    state
        .insert_task(Task::new("pair", 10.0).with_resources(["early", "late"]))
        .unwrap();
    let config = SchedulerConfig::default().with_multi_resource(MultiResourcePolicy::Together);
    let mut scheduler = Scheduler::recording(state, config);

    let outcome = scheduler
        .schedule_tasks(&["pair"], TimeRange::new(t(6, 0), t(13, 0)), &ScheduleOptions::new())
        .unwrap();
    assert_eq!(outcome.warnings_for("pair")[0].code, WarningCode::NoIntervals);
    assert!(!scheduler.state().task("pair").unwrap().is_scheduled());
}

#[test]
fn scenario_c_weekly_cap_spills_into_next_week() {
    let mut state = base_state();
    // 36h of the 40h week used, Mon 00:00 to Tue 12:00
    state
        .insert_task(
            Task::new("busy", 36.0)
                .with_resources(["flex"])
                .with_dates(t(6, 0), t(7, 12)),
        )
        .unwrap();
    state
        .insert_task(
            Task::new("new", 8.0)
                .with_resources(["flex"])
                .with_earliest_start(t(8, 0)),
        )
        .unwrap();
    let mut scheduler = Scheduler::recording(state, SchedulerConfig::default());

    let outcome = scheduler
        .schedule_tasks(&["new"], TimeRange::new(t(6, 0), t(27, 0)), &ScheduleOptions::new())
        .unwrap();
    let placement = outcome.placement("new").unwrap();
    let this_week = t(8, 0).iso_week();
    let by_week = |week: chrono::IsoWeek| -> f64 {
        placement
            .slices
            .iter()
            .filter(|s| s.range.start.iso_week() == week)
            .map(|s| s.hours())
            .sum()
    };
    assert!((by_week(this_week) - 4.0).abs() < EPSILON);
    assert!((by_week(t(13, 0).iso_week()) - 4.0).abs() < EPSILON);
    assert_eq!(placement.begin, t(8, 0));
    assert_eq!(placement.deadline, t(13, 4));

    let report = scheduler
        .valid_intervals(&["flex"], TimeRange::new(t(6, 0), t(20, 0)))
        .unwrap();
    assert!(report.weekly_remaining["flex"][&this_week].abs() < EPSILON);
}

#[test]
fn scenario_d_cycle_is_rejected_without_changes() {
    let mut state = base_state();
    state
        .insert_task(
            Task::new("a", 2.0)
                .with_resources(["early"])
                .with_dependencies(["c"])
                .with_dates(t(6, 8), t(6, 10)),
        )
        .unwrap();
    state
        .insert_task(
            Task::new("b", 2.0)
                .with_resources(["early"])
                .with_dependencies(["a"])
                .with_dates(t(6, 10), t(6, 12)),
        )
        .unwrap();
    state
        .insert_task(
            Task::new("c", 2.0)
                .with_resources(["early"])
                .with_dependencies(["b"])
                .with_dates(t(7, 8), t(7, 10)),
        )
        .unwrap();
    let mut scheduler = Scheduler::recording(state, SchedulerConfig::default());

    let err = scheduler.reschedule("a", t(8, 8), t(8, 10)).unwrap_err();
    match err {
        ScheduleError::CyclicDependency { cycle } => {
            assert_eq!(cycle.first(), cycle.last());
            assert_eq!(cycle.len(), 4);
        }
        other => panic!("unexpected error {other:?}"),
    }
    assert_eq!(scheduler.state().task("a").unwrap().planned_begin, Some(t(6, 8)));
    assert_eq!(scheduler.state().task("c").unwrap().planned_begin, Some(t(7, 8)));
    assert!(scheduler.sink().placements.is_empty());
}

#[test]
fn moving_later_never_pulls_dependents_earlier() {
    let mut state = base_state();
    state
        .insert_task(Task::new("root", 4.0).with_resources(["early"]).with_dates(t(6, 8), t(6, 12)))
        .unwrap();
    state
        .insert_task(
            Task::new("mid", 4.0)
                .with_resources(["late"])
                .with_dependencies(["root"])
                .with_dates(t(6, 13), t(6, 17)),
        )
        .unwrap();
    state
        .insert_task(
            Task::new("leaf", 2.0)
                .with_resources(["early"])
                .with_dependencies(["mid"])
                .with_dates(t(9, 8), t(9, 10)),
        )
        .unwrap();
    let mut scheduler = Scheduler::recording(state, SchedulerConfig::default());
    let before: Vec<_> = ["mid", "leaf"]
        .iter()
        .map(|id| scheduler.state().task(id).unwrap().planned_begin)
        .collect();

    let outcome = scheduler.reschedule("root", t(7, 8), t(7, 12)).unwrap();
    assert!(outcome.warnings.is_empty());

    for (id, old) in ["mid", "leaf"].iter().zip(before) {
        let now = scheduler.state().task(id).unwrap().planned_begin;
        assert!(now >= old, "{id} moved earlier");
    }
    // mid follows root into Tuesday afternoon; leaf already starts after it
    assert_eq!(scheduler.state().task("mid").unwrap().planned_begin, Some(t(7, 13)));
    assert_eq!(scheduler.state().task("leaf").unwrap().planned_begin, Some(t(9, 8)));
    assert!(outcome.unchanged.contains(&"leaf".to_string()));

    for p in &outcome.placements {
        let task = scheduler.state().task(&p.task_id).unwrap();
        assert!((p.total_hours() - task.allocated_hours).abs() < EPSILON);
        assert_within_calendar(&scheduler, &p.task_id);
    }
    assert_no_overlap(&scheduler, "early");
    assert_no_overlap(&scheduler, "late");
}

#[test]
fn overlapping_task_is_pushed_out_of_the_way() {
    let mut state = base_state();
    state
        .insert_task(Task::new("mover", 4.0).with_resources(["early"]).with_dates(t(6, 8), t(6, 12)))
        .unwrap();
    state
        .insert_task(Task::new("bystander", 4.0).with_resources(["early"]).with_dates(t(7, 8), t(7, 12)))
        .unwrap();
    let mut scheduler = Scheduler::recording(state, SchedulerConfig::default());

    scheduler.reschedule("mover", t(7, 8), t(7, 12)).unwrap();
    assert_eq!(
        scheduler.state().task("bystander").unwrap().planned_begin,
        Some(t(8, 8))
    );
    assert_no_overlap(&scheduler, "early");
}

#[test]
fn leave_is_skipped_when_planning() {
    let mut state = base_state();
    state
        .add_leave(
            "mornings",
            Leave::for_resource(TimeRange::new(t(6, 0), t(8, 0)), "early"),
        )
        .unwrap();
    state
        .insert_task(Task::new("job", 6.0).with_resources(["early"]))
        .unwrap();
    let mut scheduler = Scheduler::recording(state, SchedulerConfig::default());

    let outcome = scheduler
        .schedule_tasks(&["job"], TimeRange::new(t(6, 0), t(13, 0)), &ScheduleOptions::new())
        .unwrap();
    let placement = outcome.placement("job").unwrap();
    assert_eq!(placement.begin, t(8, 8));
    assert_eq!(placement.deadline, t(9, 10));
    assert_within_calendar(&scheduler, "job");
    assert_eq!(scheduler.sink().placements.len(), 1);
}

#[test]
fn idle_stretch_of_a_long_task_is_still_occupied() {
    let mut state = base_state();
    // two hours of work anywhere between Monday and Wednesday noon
    state
        .insert_task(Task::new("wide", 2.0).with_resources(["early"]).with_dates(t(6, 8), t(8, 12)))
        .unwrap();
    state
        .insert_task(Task::new("mover", 2.0).with_resources(["early"]).with_dates(t(9, 8), t(9, 10)))
        .unwrap();
    let mut scheduler = Scheduler::recording(state, SchedulerConfig::default());

    let outcome = scheduler.reschedule("mover", t(7, 8), t(7, 10)).unwrap();
    assert!(outcome.warnings.is_empty(), "{:?}", outcome.warnings);
    assert_eq!(scheduler.state().task("mover").unwrap().planned_begin, Some(t(7, 8)));
    assert!(outcome.placement("wide").is_some());
    assert_no_overlap(&scheduler, "early");
}
