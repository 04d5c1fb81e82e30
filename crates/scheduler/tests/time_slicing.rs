use scheduler::{
    Callback, Clock, ManualClock, PriorityLevel, Schedule, Scheduler, millis,
    run_next_macrotask, run_with_priority,
};
use std::rc::Rc;

struct Ctx {
    scheduler: Scheduler<Self>,
    clock: ManualClock,
    log: Vec<String>,
}

impl Schedule for Ctx {
    fn scheduler(&mut self) -> &mut Scheduler<Self> {
        &mut self.scheduler
    }
}

fn new_ctx() -> Ctx {
    let _ = env_logger::builder().is_test(true).try_init();
    let clock = ManualClock::new();
    Ctx {
        scheduler: Scheduler::new(Rc::new(clock.clone())),
        clock,
        log: Vec::new(),
    }
}

/// Drive host turns until nothing is runnable, sleeping through timers.
fn run_to_idle(ctx: &mut Ctx) -> usize {
    let mut turns = 0;
    loop {
        if run_next_macrotask(ctx).unwrap() {
            turns += 1;
            continue;
        }
        match ctx.scheduler.next_timer_deadline() {
            Some(deadline) => ctx.clock.set(deadline),
            None => return turns,
        }
    }
}

/// A job of `steps` units that costs `cost_ms` each and yields between slices.
fn chunked(label: &'static str, remaining: u32, cost_ms: i64) -> Callback<Ctx> {
    Callback::new(move |ctx: &mut Ctx, _did_timeout| {
        let mut left = remaining;
        while left > 0 {
            ctx.clock.advance_ms(cost_ms);
            ctx.log.push(format!("{label}{left}"));
            left -= 1;
            if left > 0 && ctx.scheduler.should_yield() {
                return Ok(Some(chunked(label, left, cost_ms)));
            }
        }
        Ok(None)
    })
}

#[test]
fn continuation_splits_long_job_into_slices() {
    let mut ctx = new_ctx();
    ctx.scheduler
        .schedule_callback(PriorityLevel::Normal, chunked("job", 6, 2));

    let turns = run_to_idle(&mut ctx);
    assert_eq!(ctx.log, ["job6", "job5", "job4", "job3", "job2", "job1"]);
    // 2ms per step against a 5ms budget: three steps per slice.
    assert_eq!(turns, 2);
    assert_eq!(ctx.scheduler.pending_task_count(), 0);
}

#[test]
fn urgent_task_runs_between_slices() {
    let mut ctx = new_ctx();
    ctx.scheduler
        .schedule_callback(PriorityLevel::Low, chunked("low", 6, 2));

    assert!(run_next_macrotask(&mut ctx).unwrap());
    assert_eq!(ctx.log, ["low6", "low5", "low4"]);

    ctx.scheduler.schedule_callback(
        PriorityLevel::UserBlocking,
        Callback::new(|ctx: &mut Ctx, _| {
            ctx.log.push("click".to_owned());
            Ok(None)
        }),
    );
    run_to_idle(&mut ctx);
    assert_eq!(
        ctx.log,
        ["low6", "low5", "low4", "click", "low3", "low2", "low1"]
    );
}

#[test]
fn expired_task_ignores_the_budget() {
    let mut ctx = new_ctx();
    ctx.scheduler.schedule_callback(
        PriorityLevel::Immediate,
        Callback::new(|ctx: &mut Ctx, did_timeout| {
            assert!(did_timeout);
            ctx.clock.advance_ms(50);
            ctx.log.push("first".to_owned());
            Ok(None)
        }),
    );
    ctx.scheduler.schedule_callback(
        PriorityLevel::Immediate,
        Callback::new(|ctx: &mut Ctx, _| {
            ctx.log.push("second".to_owned());
            Ok(None)
        }),
    );

    // Both run in one slice even though the first blew the budget.
    assert!(run_next_macrotask(&mut ctx).unwrap());
    assert_eq!(ctx.log, ["first", "second"]);
    assert!(!ctx.scheduler.is_message_loop_running());
}

#[test]
fn delayed_tasks_wait_for_their_start_time() {
    let mut ctx = new_ctx();
    let push = |label: &'static str| {
        Callback::new(move |ctx: &mut Ctx, _| {
            ctx.log.push(format!("{label}@{}", ctx.clock.now() / 1_000));
            Ok(None)
        })
    };
    ctx.scheduler
        .schedule_delayed_callback(PriorityLevel::Normal, push("late"), millis(30));
    ctx.scheduler
        .schedule_delayed_callback(PriorityLevel::Normal, push("soon"), millis(10));
    ctx.scheduler
        .schedule_callback(PriorityLevel::Normal, push("now"));

    run_to_idle(&mut ctx);
    assert_eq!(ctx.log, ["now@0", "soon@10", "late@30"]);
}

#[test]
fn cancelling_a_running_task_drops_its_continuation() {
    let mut ctx = new_ctx();
    let handle = ctx.scheduler.schedule_callback(
        PriorityLevel::Normal,
        Callback::new(|ctx: &mut Ctx, _| {
            ctx.log.push("ran".to_owned());
            let own = ctx.scheduler.current_task().unwrap();
            ctx.scheduler.cancel_callback(own);
            Ok(Some(Callback::new(|ctx: &mut Ctx, _| {
                ctx.log.push("continued".to_owned());
                Ok(None)
            })))
        }),
    );

    run_to_idle(&mut ctx);
    assert_eq!(ctx.log, ["ran"]);
    assert!(!ctx.scheduler.is_live(handle));
}

#[test]
fn failing_task_propagates_and_leaves_the_rest_runnable() {
    let mut ctx = new_ctx();
    ctx.scheduler.schedule_callback(
        PriorityLevel::UserBlocking,
        Callback::new(|_: &mut Ctx, _| Err(anyhow::anyhow!("boom"))),
    );
    ctx.scheduler.schedule_callback(
        PriorityLevel::Normal,
        Callback::new(|ctx: &mut Ctx, _| {
            ctx.log.push("after".to_owned());
            Ok(None)
        }),
    );

    let err = run_next_macrotask(&mut ctx).unwrap_err();
    assert_eq!(err.to_string(), "boom");
    assert_eq!(ctx.scheduler.current_priority_level(), PriorityLevel::Normal);
    assert!(ctx.scheduler.is_message_loop_running());

    run_to_idle(&mut ctx);
    assert_eq!(ctx.log, ["after"]);
}

#[test]
fn run_with_priority_scopes_the_current_level() {
    let mut ctx = new_ctx();
    let inner = run_with_priority(&mut ctx, PriorityLevel::Idle, |ctx| {
        ctx.scheduler.current_priority_level()
    });
    assert_eq!(inner, PriorityLevel::Idle);
    assert_eq!(ctx.scheduler.current_priority_level(), PriorityLevel::Normal);
}
