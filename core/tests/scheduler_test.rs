use ember_core::core::{EventQueue, Ticks};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Kind {
    A,
    B,
    C,
}

#[test]
fn test_events_fire_in_tick_order() {
    let mut q = EventQueue::new();
    q.schedule(Ticks(30), Kind::C);
    q.schedule(Ticks(10), Kind::A);
    q.schedule(Ticks(20), Kind::B);

    let mut fired = Vec::new();
    while let Some((at, kind)) = q.pop_due(Ticks(100)) {
        fired.push((at.get(), kind));
    }
    assert_eq!(fired, vec![(10, Kind::A), (20, Kind::B), (30, Kind::C)]);
}

#[test]
fn test_ties_fire_first_scheduled_first() {
    let mut q = EventQueue::new();
    q.schedule(Ticks(5), Kind::B);
    q.schedule(Ticks(5), Kind::A);
    q.schedule(Ticks(5), Kind::C);

    let mut fired = Vec::new();
    while let Some((_, kind)) = q.pop_due(Ticks(5)) {
        fired.push(kind);
    }
    assert_eq!(fired, vec![Kind::B, Kind::A, Kind::C]);
}

#[test]
fn test_pop_due_respects_now() {
    let mut q = EventQueue::new();
    q.schedule(Ticks(10), Kind::A);
    q.schedule(Ticks(11), Kind::B);

    assert_eq!(q.pop_due(Ticks(9)), None);
    assert_eq!(q.pop_due(Ticks(10)), Some((Ticks(10), Kind::A)));
    assert_eq!(q.pop_due(Ticks(10)), None, "B is still in the future");
    assert_eq!(q.len(), 1);
}

#[test]
fn test_schedule_into_past_fires_immediately() {
    let mut q = EventQueue::new();
    q.schedule(Ticks(3), Kind::A);
    assert_eq!(q.pop_due(Ticks(50)), Some((Ticks(3), Kind::A)));
}

#[test]
fn test_cancel() {
    let mut q = EventQueue::new();
    let a = q.schedule(Ticks(10), Kind::A);
    let b = q.schedule(Ticks(20), Kind::B);

    q.cancel(a);
    assert_eq!(q.next_at(), Some(Ticks(20)));

    // Cancelling after the event fired is a no-op.
    assert_eq!(q.pop_due(Ticks(20)), Some((Ticks(20), Kind::B)));
    q.cancel(b);
    q.cancel(a);
    assert!(q.is_empty());
}

#[test]
fn test_next_at() {
    let mut q: EventQueue<Kind> = EventQueue::new();
    assert_eq!(q.next_at(), None);
    q.schedule(Ticks(42), Kind::A);
    q.schedule(Ticks(7), Kind::B);
    assert_eq!(q.next_at(), Some(Ticks(7)));
}

#[test]
fn test_handler_may_reschedule_itself() {
    let mut q = EventQueue::new();
    q.schedule(Ticks(10), Kind::A);

    // Drain at t=10; the handler immediately re-parks itself at t=10.
    let (_, kind) = q.pop_due(Ticks(10)).unwrap();
    assert_eq!(kind, Kind::A);
    q.schedule(Ticks(10), Kind::A);
    assert_eq!(q.pop_due(Ticks(10)), Some((Ticks(10), Kind::A)));
}

#[test]
fn test_clear() {
    let mut q = EventQueue::new();
    q.schedule(Ticks(10), Kind::A);
    q.schedule(Ticks(20), Kind::B);
    q.clear();
    assert!(q.is_empty());
    assert_eq!(q.len(), 0);
    assert_eq!(q.next_at(), None);
}

#[test]
fn test_snapshot_round_trip_preserves_order() {
    let mut q = EventQueue::new();
    q.schedule(Ticks(105), Kind::B);
    q.schedule(Ticks(105), Kind::A);
    q.schedule(Ticks(200), Kind::C);
    q.schedule(Ticks(90), Kind::C); // already due: delta clamps to zero

    let deltas = q.pending_deltas(Ticks(100));
    assert_eq!(deltas, vec![(0, Kind::C), (5, Kind::B), (5, Kind::A), (100, Kind::C)]);

    // Restore into a fresh queue at a different epoch.
    let mut restored = EventQueue::new();
    restored.restore_deltas(Ticks(1000), &deltas);
    let mut fired = Vec::new();
    while let Some((at, kind)) = restored.pop_due(Ticks(2000)) {
        fired.push((at.get(), kind));
    }
    assert_eq!(
        fired,
        vec![(1000, Kind::C), (1005, Kind::B), (1005, Kind::A), (1100, Kind::C)]
    );
}

#[test]
fn test_restore_replaces_pending_events() {
    let mut q = EventQueue::new();
    q.schedule(Ticks(10), Kind::A);
    q.restore_deltas(Ticks(0), &[(5, Kind::B)]);
    assert_eq!(q.len(), 1);
    assert_eq!(q.pop_due(Ticks(5)), Some((Ticks(5), Kind::B)));
}

#[test]
fn test_ticks_arithmetic() {
    let mut t = Ticks::new(10);
    t += Ticks(5);
    assert_eq!(t, Ticks(15));
    assert_eq!(t + Ticks(1), Ticks(16));
    assert_eq!(t - Ticks(15), Ticks::ZERO);
    assert_eq!(t.get(), 15);
}
