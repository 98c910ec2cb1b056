// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use chrono::Duration;

#[test]
fn fake_clock_advances_by_requested_amount() {
    let start = Local::now();
    let clock = FakeClock::new(start);
    clock.advance_ms(90_000);
    let after = clock.now();
    assert_eq!((after - start).num_seconds(), 90);
}

#[test]
fn fake_clock_set_overrides_time() {
    let clock = FakeClock::default();
    let target = Local::now() + Duration::days(1);
    clock.set(target);
    assert_eq!(clock.now().timestamp_millis(), target.timestamp_millis());
}

#[test]
fn system_clock_epoch_ms_is_monotonic_enough() {
    let clock = SystemClock;
    let a = clock.epoch_ms();
    std::thread::sleep(std::time::Duration::from_millis(5));
    let b = clock.epoch_ms();
    assert!(b >= a);
}
