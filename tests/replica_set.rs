use std::path::PathBuf;
use std::time::Duration;

use duostore::{
    Error, ReadQuery, ReplicaSet, ReplicationMode, Row, SnapshotReplicator, StoreHandle, Value,
    WriteOperation,
};
use rand::Rng;
use tempfile::TempDir;

fn create_table() -> WriteOperation {
    WriteOperation::new(
        "CREATE TABLE products (id INTEGER PRIMARY KEY, name TEXT, price REAL)",
        vec![],
    )
}

fn insert(id: i64, name: &str, price: f64) -> WriteOperation {
    WriteOperation::new(
        "INSERT INTO products (id, name, price) VALUES (?1, ?2, ?3)",
        vec![Value::Integer(id), Value::from(name), Value::Real(price)],
    )
}

fn select_all() -> ReadQuery {
    ReadQuery::new("SELECT id, name, price FROM products ORDER BY id", vec![])
}

fn read_direct(location: &PathBuf) -> Vec<Row> {
    let handle = StoreHandle::open(location).expect("store should be reachable");
    let rows = handle.query(&select_all()).unwrap();
    handle.close().unwrap();
    rows
}

struct Fixture {
    _dir: TempDir,
    primary: PathBuf,
    mirror: PathBuf,
    replica: ReplicaSet,
}

fn fixture(mode: ReplicationMode) -> Fixture {
    let dir = TempDir::new().expect("unable to create temporary working directory");
    let primary = dir.path().join("primary.db");
    let mirror = dir.path().join("mirror.db");
    let replica = ReplicaSet::open(&primary, &mirror, mode).unwrap();
    Fixture {
        _dir: dir,
        primary,
        mirror,
        replica,
    }
}

#[test]
fn dual_write_lands_on_both_stores() {
    let f = fixture(ReplicationMode::SyncDualWrite);
    f.replica.write(&create_table()).unwrap();
    f.replica.write(&insert(1, "keyboard", 59.99)).unwrap();
    f.replica.write(&insert(2, "mouse", 19.99)).unwrap();

    let primary_rows = read_direct(&f.primary);
    let mirror_rows = read_direct(&f.mirror);
    assert_eq!(primary_rows.len(), 2);
    assert_eq!(primary_rows, mirror_rows);
    assert_eq!(
        primary_rows[0].get("name"),
        Some(&Value::Text("keyboard".to_string()))
    );
}

#[test]
fn primary_failure_leaves_mirror_untouched() {
    let f = fixture(ReplicationMode::SyncDualWrite);
    f.replica.write(&create_table()).unwrap();
    f.replica.write(&insert(1, "keyboard", 59.99)).unwrap();

    std::fs::remove_file(&f.primary).unwrap();

    let err = f.replica.write(&insert(2, "mouse", 19.99)).unwrap_err();
    assert!(matches!(err, Error::PrimaryWriteFailed(_)));

    // The mirror still holds exactly the pre-failure state.
    let mirror_rows = read_direct(&f.mirror);
    assert_eq!(mirror_rows.len(), 1);
    assert_eq!(mirror_rows[0].get("id"), Some(&Value::Integer(1)));
}

#[test]
fn mirror_failure_is_surfaced_but_primary_commits() {
    let f = fixture(ReplicationMode::SyncDualWrite);
    f.replica.write(&create_table()).unwrap();
    f.replica.write(&insert(1, "keyboard", 59.99)).unwrap();

    std::fs::remove_file(&f.mirror).unwrap();

    let err = f.replica.write(&insert(2, "mouse", 19.99)).unwrap_err();
    assert!(matches!(err, Error::MirrorWriteFailed(_)));

    // The caller saw a failure, yet the primary durably holds the write.
    // This is the documented inconsistency window of dual-write without a
    // cross-store transaction.
    let primary_rows = read_direct(&f.primary);
    assert_eq!(primary_rows.len(), 2);
    assert_eq!(primary_rows[1].get("id"), Some(&Value::Integer(2)));
}

#[test]
fn read_fails_over_to_mirror() {
    let f = fixture(ReplicationMode::SyncDualWrite);
    f.replica.write(&create_table()).unwrap();
    f.replica.write(&insert(1, "keyboard", 59.99)).unwrap();

    std::fs::remove_file(&f.primary).unwrap();

    let rows = f.replica.read(&select_all()).unwrap();
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].get("id"), Some(&Value::Integer(1)));
}

#[test]
fn read_unavailable_when_both_stores_unreachable() {
    let f = fixture(ReplicationMode::SyncDualWrite);
    f.replica.write(&create_table()).unwrap();

    std::fs::remove_file(&f.primary).unwrap();
    std::fs::remove_file(&f.mirror).unwrap();

    let err = f.replica.read(&select_all()).unwrap_err();
    assert!(matches!(err, Error::ReadUnavailable));
}

#[test]
fn query_errors_do_not_fail_over() {
    let f = fixture(ReplicationMode::SyncDualWrite);
    f.replica.write(&create_table()).unwrap();

    // The primary is reachable, so a malformed query is the caller's
    // problem and must not be retried against the mirror.
    let err = f
        .replica
        .read(&ReadQuery::new("SELECT nope FROM nowhere", vec![]))
        .unwrap_err();
    assert!(matches!(err, Error::QueryFailed(_)));
}

#[test]
fn async_mode_writes_skip_the_mirror() {
    let f = fixture(ReplicationMode::AsyncSnapshot);
    f.replica.write(&create_table()).unwrap();
    f.replica.write(&insert(1, "keyboard", 59.99)).unwrap();

    assert_eq!(read_direct(&f.primary).len(), 1);

    // The mirror was provisioned empty and no snapshot has run, so the
    // table does not exist there yet.
    let handle = StoreHandle::open(&f.mirror).unwrap();
    assert!(handle.query(&select_all()).is_err());
    handle.close().unwrap();
}

#[test]
fn snapshot_cycles_converge_the_mirror() {
    let f = fixture(ReplicationMode::AsyncSnapshot);
    f.replica.write(&create_table()).unwrap();
    f.replica.write(&insert(1, "keyboard", 59.99)).unwrap();

    let replicator =
        SnapshotReplicator::new(&f.primary, &f.mirror, Duration::from_millis(100));
    replicator.sync_once().unwrap();
    assert_eq!(read_direct(&f.primary), read_direct(&f.mirror));

    // A second cycle with no intervening writes changes nothing.
    replicator.sync_once().unwrap();
    assert_eq!(read_direct(&f.primary), read_direct(&f.mirror));
    assert_eq!(replicator.status().cycles, 2);
    assert!(replicator.status().last_success.is_some());

    f.replica.write(&insert(2, "mouse", 19.99)).unwrap();
    replicator.sync_once().unwrap();
    assert_eq!(read_direct(&f.primary), read_direct(&f.mirror));
}

#[test]
fn failed_snapshot_cycle_reports_error() {
    let dir = TempDir::new().unwrap();
    let replicator = SnapshotReplicator::new(
        dir.path().join("missing.db"),
        dir.path().join("mirror.db"),
        Duration::from_millis(100),
    );
    assert!(replicator.sync_once().is_err());
    assert_eq!(replicator.status().cycles, 0);
    assert_eq!(replicator.status().last_success, None);
}

#[tokio::test]
async fn replicator_runs_on_schedule() {
    let f = fixture(ReplicationMode::AsyncSnapshot);
    f.replica.write(&create_table()).unwrap();
    f.replica.write(&insert(1, "keyboard", 59.99)).unwrap();

    let replicator = SnapshotReplicator::new(&f.primary, &f.mirror, Duration::from_millis(50));
    let task = tokio::spawn(replicator.clone().run());

    // The first tick fires immediately; allow a few more for good measure.
    tokio::time::sleep(Duration::from_millis(400)).await;
    task.abort();

    assert!(replicator.status().cycles >= 1);
    assert_eq!(read_direct(&f.primary), read_direct(&f.mirror));
}

#[test]
fn reconcile_repairs_a_diverged_mirror() {
    let f = fixture(ReplicationMode::SyncDualWrite);
    f.replica.write(&create_table()).unwrap();

    // Force a divergence: the mirror disappears, the primary commits.
    std::fs::remove_file(&f.mirror).unwrap();
    let err = f.replica.write(&insert(1, "keyboard", 59.99)).unwrap_err();
    assert!(matches!(err, Error::MirrorWriteFailed(_)));

    f.replica.reconcile().unwrap();
    assert_eq!(read_direct(&f.primary), read_direct(&f.mirror));
}

// Random workloads should never drive the two stores apart while every
// write is acknowledged.
#[test]
fn randomised_dual_write_consistency() {
    let f = fixture(ReplicationMode::SyncDualWrite);
    f.replica.write(&create_table()).unwrap();

    let mut rng = rand::thread_rng();
    for i in 0..200 {
        let id = rng.gen_range(1, 20);
        match rng.gen_range(0, 3) {
            0 => {
                f.replica
                    .write(&WriteOperation::new(
                        "INSERT OR REPLACE INTO products (id, name, price) VALUES (?1, ?2, ?3)",
                        vec![
                            Value::Integer(id),
                            Value::Text(format!("product{i}")),
                            Value::Real(f64::from(i)),
                        ],
                    ))
                    .unwrap();
            }
            1 => {
                f.replica
                    .write(&WriteOperation::new(
                        "UPDATE products SET price = ?1 WHERE id = ?2",
                        vec![Value::Real(f64::from(i) / 2.0), Value::Integer(id)],
                    ))
                    .unwrap();
            }
            _ => {
                f.replica
                    .write(&WriteOperation::new(
                        "DELETE FROM products WHERE id = ?1",
                        vec![Value::Integer(id)],
                    ))
                    .unwrap();
            }
        }
    }

    assert_eq!(read_direct(&f.primary), read_direct(&f.mirror));
}
