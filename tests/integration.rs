use std::cell::RefCell;
use std::rc::Rc;

use sharedstack::{Scheduler, SchedulerBuilder, Status};

#[test]
fn create_resume_return() {
    let sched = Scheduler::open();
    let ran = Rc::new(RefCell::new(false));
    let ran2 = ran.clone();
    let id = sched.new(move |_| {
        *ran2.borrow_mut() = true;
    });

    assert_eq!(sched.status(id), Status::Ready);
    sched.resume(id);

    assert!(*ran.borrow());
    assert_eq!(sched.status(id), Status::Dead);
    assert_eq!(sched.len(), 0);
}

#[test]
fn single_yield_round_trip() {
    let sched = Scheduler::open();
    let seen = Rc::new(RefCell::new(Vec::new()));
    let seen2 = seen.clone();

    let id = sched.new(move |s| {
        seen2.borrow_mut().push("before");
        s.yield_now();
        seen2.borrow_mut().push("after");
    });

    sched.resume(id);
    assert_eq!(sched.status(id), Status::Suspend);
    assert_eq!(*seen.borrow(), vec!["before"]);

    sched.resume(id);
    assert_eq!(sched.status(id), Status::Dead);
    assert_eq!(*seen.borrow(), vec!["before", "after"]);
}

#[test]
fn two_coroutines_interleave_in_order() {
    let sched = Scheduler::open();
    let order = Rc::new(RefCell::new(Vec::new()));

    let o1 = order.clone();
    let a = sched.new(move |s| {
        o1.borrow_mut().push(1);
        s.yield_now();
        o1.borrow_mut().push(2);
        s.yield_now();
    });

    let o2 = order.clone();
    let b = sched.new(move |s| {
        o2.borrow_mut().push(10);
        s.yield_now();
        o2.borrow_mut().push(20);
    });

    sched.resume(a); // prints 1, yields
    sched.resume(b); // prints 10, yields
    sched.resume(a); // prints 2, yields
    sched.resume(b); // prints 20, returns
    sched.resume(a); // returns, nothing new printed

    assert_eq!(*order.borrow(), vec![1, 10, 2, 20]);
    assert_eq!(sched.status(a), Status::Dead);
    assert_eq!(sched.status(b), Status::Dead);
    assert_eq!(sched.len(), 0);
}

#[test]
fn table_capacity_doubles_to_32_after_seventeen_creates() {
    let sched = SchedulerBuilder::new().initial_capacity(16).open();
    let mut ids = Vec::new();
    for _ in 0..17 {
        ids.push(sched.new(|_| {}));
    }
    // All seventeen ids must be distinct and the seventeenth must land past
    // the original 16-slot capacity, proving the table doubled rather than
    // silently overwriting or refusing the creation.
    let mut sorted = ids.clone();
    sorted.sort_unstable();
    sorted.dedup();
    assert_eq!(sorted.len(), 17);
    assert!(ids.iter().any(|&id| id >= 16));
}

#[test]
fn dead_slot_is_reused_by_the_next_create() {
    let sched = SchedulerBuilder::new().initial_capacity(4).open();
    let first = sched.new(|_| {});
    sched.resume(first);
    assert_eq!(sched.status(first), Status::Dead);

    let before = sched.len();
    let second = sched.new(|_| {});
    assert_eq!(sched.len(), before + 1);
    // The freed slot is a candidate again; the table must not have grown to
    // accommodate `second` when a dead slot was available.
    assert!(second < 4);
}

#[test]
fn large_stack_usage_survives_a_yield_round_trip() {
    let sched = Scheduler::open();
    let checksum = Rc::new(RefCell::new(0u64));
    let checksum2 = checksum.clone();

    let id = sched.new(move |s| {
        let mut buf = [0u8; 64 * 1024];
        for (i, b) in buf.iter_mut().enumerate() {
            *b = (i % 251) as u8;
        }
        s.yield_now();
        let sum: u64 = buf.iter().map(|&b| b as u64).sum();
        *checksum2.borrow_mut() = sum;
    });

    sched.resume(id);
    sched.resume(id);

    let expected: u64 = (0..64 * 1024usize).map(|i| (i % 251) as u64).sum();
    assert_eq!(*checksum.borrow(), expected);
    assert_eq!(sched.status(id), Status::Dead);
}

#[test]
fn panicking_coroutine_dies_cleanly_and_scheduler_stays_usable() {
    let sched = Scheduler::open();

    let bad = sched.new(|_| panic!("deliberate failure"));
    sched.resume(bad);
    assert_eq!(sched.status(bad), Status::Dead);
    assert_eq!(sched.running(), None);

    // The scheduler must still be able to run unrelated coroutines.
    let ran = Rc::new(RefCell::new(false));
    let ran2 = ran.clone();
    let good = sched.new(move |_| *ran2.borrow_mut() = true);
    sched.resume(good);
    assert!(*ran.borrow());
    assert_eq!(sched.status(good), Status::Dead);
}

#[test]
fn resuming_a_dead_id_is_a_silent_noop() {
    let sched = Scheduler::open();
    let id = sched.new(|_| {});
    sched.resume(id);
    assert_eq!(sched.status(id), Status::Dead);

    // Must not panic and must not disturb scheduler state.
    sched.resume(id);
    assert_eq!(sched.status(id), Status::Dead);
    assert_eq!(sched.running(), None);
}

#[test]
fn a_running_coroutine_can_register_new_coroutines() {
    // `new` has no "not while running" restriction (only `resume` does, since
    // the shared working stack can only ever host one execution at a time);
    // a coroutine is free to register siblings for its caller to resume later.
    let sched = Scheduler::open();
    let log = Rc::new(RefCell::new(Vec::new()));
    let log2 = log.clone();
    let spawned = Rc::new(RefCell::new(None));
    let spawned2 = spawned.clone();

    let outer = sched.new(move |s| {
        log2.borrow_mut().push("outer start");
        let inner_log = log2.clone();
        let inner = s.new(move |_| {
            inner_log.borrow_mut().push("inner ran");
        });
        *spawned2.borrow_mut() = Some(inner);
        log2.borrow_mut().push("outer end");
    });

    sched.resume(outer);
    let inner = spawned.borrow().expect("outer should have registered a child");
    sched.resume(inner);

    assert_eq!(*log.borrow(), vec!["outer start", "outer end", "inner ran"]);
}

#[test]
#[should_panic]
fn resuming_from_within_the_running_coroutine_panics() {
    // The shared working stack can only host one execution at a time, so a
    // coroutine calling `resume` on anything (even itself) while it is
    // already running is a contract violation, not nested scheduling.
    let sched = Scheduler::open();
    let id = sched.new(|s| {
        s.resume(0);
    });
    sched.resume(id);
}
