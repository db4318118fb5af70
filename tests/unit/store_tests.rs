//! Unit tests for the session store: record lifecycle, identity binding and
//! change notifications.

use std::time::Duration;

use agent_pulse::models::session::{
    PlaceholderPids, Pid, ProcessMetrics, SessionPatch, SessionStatus,
};
use agent_pulse::store::{Change, SessionStore};
use chrono::Utc;
use tokio::sync::broadcast::error::TryRecvError;

fn running() -> SessionPatch {
    SessionPatch {
        status: Some(SessionStatus::Running),
        ..SessionPatch::default()
    }
}

#[test]
fn upsert_creates_idle_uncorrelated_record() {
    let mut store = SessionStore::new();

    let created = store.upsert(Pid::real(100), &SessionPatch::default());

    assert!(created);
    let record = store.get_by_pid(Pid::real(100)).expect("record");
    assert_eq!(record.session_id, "synthetic-100");
    assert_eq!(record.status, SessionStatus::Idle);
    assert!(!record.correlated);
    assert_eq!(record.display_name, "pid 100");
    assert!(record.cpu_usage.abs() < f64::EPSILON);
}

#[test]
fn upsert_existing_merges_without_duplicating() {
    let mut store = SessionStore::new();
    store.upsert(Pid::real(100), &SessionPatch::default());

    let created = store.upsert(Pid::real(100), &running());

    assert!(!created);
    assert_eq!(store.len(), 1);
    assert_eq!(
        store.get_by_pid(Pid::real(100)).expect("record").status,
        SessionStatus::Running
    );
}

#[test]
fn upsert_is_idempotent_apart_from_activity_time() {
    let mut store = SessionStore::new();
    store.upsert(Pid::real(100), &running());
    let first = store.get_by_pid(Pid::real(100)).cloned().expect("record");

    store.upsert(Pid::real(100), &running());
    let second = store.get_by_pid(Pid::real(100)).cloned().expect("record");

    assert_eq!(first.session_id, second.session_id);
    assert_eq!(first.status, second.status);
    assert_eq!(first.first_seen_at, second.first_seen_at);
    assert!(second.last_active_time >= first.last_active_time);
}

#[test]
fn update_status_by_unknown_session_is_noop() {
    let mut store = SessionStore::new();
    store.upsert(Pid::real(100), &SessionPatch::default());
    let mut rx = store.subscribe();

    let result = store.update_status_by_session_id("nope", SessionStatus::Running);

    assert!(result.is_none());
    assert!(matches!(rx.try_recv(), Err(TryRecvError::Empty)));
}

#[test]
fn update_status_by_session_id_targets_bound_record() {
    let mut store = SessionStore::new();
    store.upsert(Pid::real(100), &SessionPatch::default());
    store.associate_session(Pid::real(100), "abc-123");

    let pid = store.update_status_by_session_id("abc-123", SessionStatus::Running);

    assert_eq!(pid, Some(Pid::real(100)));
    assert_eq!(
        store.get_by_pid(Pid::real(100)).expect("record").status,
        SessionStatus::Running
    );
}

#[test]
fn associate_session_marks_record_correlated() {
    let mut store = SessionStore::new();
    store.upsert(Pid::real(100), &SessionPatch::default());

    assert!(store.associate_session(Pid::real(100), "0123456789abcdef"));

    let record = store.get_by_pid(Pid::real(100)).expect("record");
    assert!(record.correlated);
    assert_eq!(record.session_id, "0123456789abcdef");
    assert_eq!(record.display_name, "01234567");
}

#[test]
fn associate_session_unknown_pid_returns_false() {
    let mut store = SessionStore::new();
    assert!(!store.associate_session(Pid::real(7), "abc"));
    assert!(store.is_empty());
}

#[test]
fn associate_session_folds_placeholder_duplicate() {
    let mut store = SessionStore::new();
    let placeholders = PlaceholderPids::new();
    let placeholder = placeholders.allocate();
    store.upsert(placeholder, &SessionPatch::default());
    store.associate_session(placeholder, "abc");
    store.update_status_by_session_id("abc", SessionStatus::Running);
    store.upsert(Pid::real(200), &SessionPatch::default());

    store.associate_session(Pid::real(200), "abc");

    assert_eq!(store.len(), 1);
    assert!(store.get_by_pid(placeholder).is_none());
    let record = store.get_by_session_id("abc").expect("record");
    assert_eq!(record.pid, Pid::real(200));
    assert_eq!(record.status, SessionStatus::Running);
}

#[test]
fn associate_session_reverts_real_duplicate() {
    let mut store = SessionStore::new();
    store.upsert(Pid::real(100), &running());
    store.upsert(Pid::real(200), &SessionPatch::default());
    store.associate_session(Pid::real(100), "abc");

    store.associate_session(Pid::real(200), "abc");

    let old = store.get_by_pid(Pid::real(100)).expect("old record");
    assert_eq!(old.session_id, "synthetic-100");
    assert!(!old.correlated);
    assert_eq!(old.status, SessionStatus::Idle);
    let bound: Vec<_> = store
        .all()
        .into_iter()
        .filter(|record| record.session_id == "abc")
        .collect();
    assert_eq!(bound.len(), 1);
    assert_eq!(bound[0].pid, Pid::real(200));
}

#[test]
fn rebind_pid_moves_placeholder_onto_real_pid() {
    let mut store = SessionStore::new();
    let placeholder = PlaceholderPids::new().allocate();
    store.upsert(placeholder, &running());
    store.associate_session(placeholder, "abc");

    assert!(store.rebind_pid(placeholder, Pid::real(300)));

    assert!(store.get_by_pid(placeholder).is_none());
    let record = store.get_by_pid(Pid::real(300)).expect("record");
    assert_eq!(record.session_id, "abc");
    assert!(record.correlated);
    assert_eq!(record.status, SessionStatus::Running);
}

#[test]
fn rebind_pid_refuses_tracked_target() {
    let mut store = SessionStore::new();
    let placeholder = PlaceholderPids::new().allocate();
    store.upsert(placeholder, &SessionPatch::default());
    store.upsert(Pid::real(300), &SessionPatch::default());

    assert!(!store.rebind_pid(placeholder, Pid::real(300)));
    assert_eq!(store.len(), 2);
}

#[test]
fn rebind_uncorrelated_record_follows_new_pid() {
    let mut store = SessionStore::new();
    let placeholder = PlaceholderPids::new().allocate();
    store.upsert(placeholder, &SessionPatch::default());

    store.rebind_pid(placeholder, Pid::real(42));

    assert_eq!(
        store.get_by_pid(Pid::real(42)).expect("record").session_id,
        "synthetic-42"
    );
}

#[test]
fn update_metrics_refreshes_usage() {
    let mut store = SessionStore::new();
    store.upsert(Pid::real(100), &SessionPatch::default());
    let started = Utc::now() - chrono::Duration::minutes(5);

    let updated = store.update_metrics(
        Pid::real(100),
        ProcessMetrics {
            cpu_usage: 12.5,
            memory_usage: 3.0,
        },
        started,
    );

    assert!(updated);
    let record = store.get_by_pid(Pid::real(100)).expect("record");
    assert!((record.cpu_usage - 12.5).abs() < f64::EPSILON);
    assert!((record.memory_usage - 3.0).abs() < f64::EPSILON);
    assert_eq!(record.start_time, started);
    assert!(record.running_time.starts_with("5m"));
    assert!(!store.update_metrics(Pid::real(9), ProcessMetrics::default(), started));
}

#[test]
fn remove_returns_record_and_notifies() {
    let mut store = SessionStore::new();
    store.upsert(Pid::real(100), &SessionPatch::default());
    let mut rx = store.subscribe();

    let removed = store.remove(Pid::real(100)).expect("removed");

    assert_eq!(removed.pid, Pid::real(100));
    let event = rx.try_recv().expect("event");
    assert!(matches!(event.change, Change::Removed { ref record } if record.pid == Pid::real(100)));
    assert!(event.sessions.is_empty());
}

#[test]
fn remove_unknown_pid_publishes_nothing() {
    let mut store = SessionStore::new();
    let mut rx = store.subscribe();

    assert!(store.remove(Pid::real(5)).is_none());
    assert!(matches!(rx.try_recv(), Err(TryRecvError::Empty)));
}

#[test]
fn every_mutation_publishes_one_full_snapshot() {
    let mut store = SessionStore::new();
    let mut rx = store.subscribe();

    store.upsert(Pid::real(1), &SessionPatch::default());
    store.upsert(Pid::real(2), &SessionPatch::default());
    store.associate_session(Pid::real(2), "abc");

    let first = rx.try_recv().expect("first");
    let second = rx.try_recv().expect("second");
    let third = rx.try_recv().expect("third");
    assert_eq!(first.sessions.len(), 1);
    assert_eq!(second.sessions.len(), 2);
    assert_eq!(third.sessions.len(), 2);
    assert_eq!(
        third.change,
        Change::Associated {
            pid: Pid::real(2),
            session_id: "abc".into()
        }
    );
    assert!(matches!(rx.try_recv(), Err(TryRecvError::Empty)));
}

#[test]
fn all_returns_insertion_order() {
    let mut store = SessionStore::new();
    for pid in [30, 10, 20] {
        store.upsert(Pid::real(pid), &SessionPatch::default());
    }

    let pids: Vec<i64> = store.all().iter().map(|record| record.pid.get()).collect();

    assert_eq!(pids, vec![30, 10, 20]);
}

#[test]
fn stats_counts_status_and_identity() {
    let mut store = SessionStore::new();
    let placeholder = PlaceholderPids::new().allocate();
    store.upsert(Pid::real(1), &running());
    store.upsert(Pid::real(2), &SessionPatch::default());
    store.upsert(placeholder, &SessionPatch::default());
    store.associate_session(placeholder, "abc");

    let stats = store.stats();

    assert_eq!(stats.total, 3);
    assert_eq!(stats.running, 1);
    assert_eq!(stats.idle, 2);
    assert_eq!(stats.placeholders, 1);
    assert_eq!(stats.uncorrelated, 2);
}

#[test]
fn first_uncorrelated_prefers_earliest_record() {
    let mut store = SessionStore::new();
    store.upsert(Pid::real(50), &SessionPatch::default());
    store.upsert(Pid::real(10), &SessionPatch::default());
    store.associate_session(Pid::real(50), "abc");

    assert_eq!(store.first_uncorrelated(), Some(Pid::real(10)));
}

#[test]
fn oldest_placeholder_ignores_real_pids() {
    let mut store = SessionStore::new();
    let placeholders = PlaceholderPids::new();
    let first = placeholders.allocate();
    let second = placeholders.allocate();
    store.upsert(Pid::real(1), &SessionPatch::default());
    store.upsert(first, &SessionPatch::default());
    store.upsert(second, &SessionPatch::default());

    assert_eq!(store.oldest_placeholder(), Some(first));
}

#[test]
fn stale_placeholders_respects_ttl() {
    let mut store = SessionStore::new();
    let placeholder = PlaceholderPids::new().allocate();
    store.upsert(placeholder, &SessionPatch::default());
    store.upsert(Pid::real(1), &SessionPatch::default());

    let ttl = Duration::from_secs(60);
    let now = Utc::now();

    assert!(store.stale_placeholders(ttl, now).is_empty());
    let later = now + chrono::Duration::seconds(120);
    assert_eq!(store.stale_placeholders(ttl, later), vec![placeholder]);
}

#[test]
fn real_pids_excludes_placeholders() {
    let mut store = SessionStore::new();
    store.upsert(PlaceholderPids::new().allocate(), &SessionPatch::default());
    store.upsert(Pid::real(77), &SessionPatch::default());

    assert_eq!(store.real_pids(), vec![77]);
}
