use chrono::{DateTime, TimeZone, Utc};
use std::collections::BTreeSet;
use std::sync::{Arc, Barrier};
use std::thread;
use taskradar_core::NewTask;
use taskradar_store::WorkspaceFile;

const WRITERS: usize = 8;
const ROUNDS: usize = 10;

fn now() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 3, 2, 8, 0, 0).unwrap()
}

/// Independent handles on one directory, each doing load, create, save.
/// Every task must land and ids must stay unique.
#[test]
fn test_concurrent_writers_lose_nothing() {
    let dir = tempfile::tempdir().unwrap();
    let barrier = Arc::new(Barrier::new(WRITERS));

    let handles: Vec<_> = (0..WRITERS)
        .map(|w| {
            let path = dir.path().to_path_buf();
            let barrier = Arc::clone(&barrier);
            thread::spawn(move || {
                let file = WorkspaceFile::open(&path).unwrap().with_backups_to_keep(2);
                barrier.wait();
                for r in 0..ROUNDS {
                    file.update(now(), |ws| {
                        ws.graph
                            .create_task(NewTask::new(format!("writer {w} round {r}")), now())
                            .map(|_| ())
                    })
                    .unwrap();
                }
            })
        })
        .collect();
    for h in handles {
        h.join().unwrap();
    }

    let file = WorkspaceFile::open(dir.path()).unwrap();
    assert!(file.validate().unwrap().is_valid());
    let ws = file.load().unwrap();
    assert_eq!(ws.graph.len(), WRITERS * ROUNDS);

    let titles: BTreeSet<&str> = ws.graph.tasks().map(|t| t.title.as_str()).collect();
    assert_eq!(titles.len(), WRITERS * ROUNDS);
    let ids: Vec<u64> = ws.graph.tasks().map(|t| t.id).collect();
    assert_eq!(ids, (1..=(WRITERS * ROUNDS) as u64).collect::<Vec<_>>());
}

/// A held lock keeps a second writer waiting until it is released.
#[test]
fn test_lock_blocks_second_writer_until_dropped() {
    let dir = tempfile::tempdir().unwrap();
    let file = WorkspaceFile::open(dir.path()).unwrap();
    let lock = file.lock().unwrap();

    let path = dir.path().to_path_buf();
    let writer = thread::spawn(move || {
        let file = WorkspaceFile::open(&path).unwrap();
        file.update(now(), |ws| ws.graph.create_task(NewTask::new("late"), now()).map(|_| ()))
            .unwrap();
    });

    // Nothing can be written while the lock is held.
    thread::sleep(std::time::Duration::from_millis(100));
    assert!(!file.path().exists());

    let mut ws = file.load().unwrap();
    ws.graph.create_task(NewTask::new("first"), now()).unwrap();
    file.save(&lock, &ws, now()).unwrap();
    drop(lock);

    writer.join().unwrap();
    let titles: Vec<String> = file.load().unwrap().graph.tasks().map(|t| t.title.clone()).collect();
    assert_eq!(titles, vec!["first", "late"]);
}
