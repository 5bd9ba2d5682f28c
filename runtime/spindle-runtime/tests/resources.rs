///
/// # Resource Release Tests for spindle-runtime
///
/// Every thread stack is a separate mapping, so a TCB that is never freed
/// shows up as a leftover entry in `/proc/self/maps`. These runs cover each
/// way a thread can end: returning, calling `exit`, panicking, and being
/// stranded in the blocked queue. Kept in its own test binary so no other
/// test maps or unmaps memory while the counts are taken.
///

use std::fs;

use spindle_runtime::{
    Scheduler, SchedulerConfig, SchedulerError, block, exit, run, spawn, yield_now,
};

fn mapping_count() -> usize {
    fs::read_to_string("/proc/self/maps").unwrap().lines().count()
}

fn exiting_threads(threads: usize) {
    run(false, move || {
        for id in 0..threads {
            spawn(move || {
                yield_now();
                if id % 2 == 0 {
                    exit();
                }
            })
            .unwrap();
        }
        yield_now();
    })
    .unwrap();
}

fn every_ending() {
    exiting_threads(50);

    run(false, || {
        spawn(|| panic!("boom")).unwrap();
        spawn(|| {}).unwrap();
    })
    .unwrap();

    let stranded = run(false, || {
        spawn(block).unwrap();
        block();
    });
    assert!(matches!(stranded, Err(SchedulerError::Stranded { count: 2 })));

    let oversized = Scheduler::new(SchedulerConfig::default().with_stack_size(1 << 60));
    assert!(matches!(
        oversized.run(false, || {}),
        Err(SchedulerError::Context(_))
    ));
}

#[test]
fn test_no_stack_outlives_its_thread() {
    // One pass first, so lazily created allocator and panic state is not
    // counted as a leak.
    every_ending();
    let before = mapping_count();

    for _ in 0..5 {
        every_ending();
    }

    assert_eq!(mapping_count(), before);
}
