use dispatch_common::DispatchError;
use dispatch_core::source::PromptRecord;
use dispatch_core::store::{Outcome, ResultStore, UNRECORDED};

fn prompts(n: usize) -> Vec<PromptRecord> {
    (0..n).map(|id| PromptRecord { id, text: format!("p{id}") }).collect()
}

#[test]
fn finish_returns_submission_order_regardless_of_write_order() {
    let store = ResultStore::new(&prompts(3));
    store.write(2, Outcome::Response("c".into())).unwrap();
    store.write(0, Outcome::Response("a".into())).unwrap();
    store.write(1, Outcome::Error("boom".into())).unwrap();
    let records = store.finish();
    let ids: Vec<usize> = records.iter().map(|r| r.id).collect();
    assert_eq!(ids, vec![0, 1, 2]);
    assert_eq!(records[0].response(), Some("a"));
    assert_eq!(records[1].error(), Some("boom"));
    assert_eq!(records[2].prompt, "p2");
}

#[test]
fn records_keep_their_own_ids() {
    let prompts = vec![
        PromptRecord { id: 10, text: "x".into() },
        PromptRecord { id: 11, text: "y".into() },
    ];
    let store = ResultStore::new(&prompts);
    store.write(1, Outcome::Response("ry".into())).unwrap();
    store.write(0, Outcome::Response("rx".into())).unwrap();
    let records = store.finish();
    let rows: Vec<(usize, Option<&str>)> = records.iter().map(|r| (r.id, r.response())).collect();
    assert_eq!(rows, vec![(10, Some("rx")), (11, Some("ry"))]);
}

#[test]
fn second_write_is_rejected_and_first_kept() {
    let store = ResultStore::new(&prompts(1));
    store.write(0, Outcome::Response("first".into())).unwrap();
    let err = store.write(0, Outcome::Response("second".into())).unwrap_err();
    assert!(matches!(err, DispatchError::Store { slot: 0, .. }));
    assert_eq!(store.outcome(0), Some(&Outcome::Response("first".into())));
}

#[test]
fn out_of_range_write_is_rejected() {
    let store = ResultStore::new(&prompts(2));
    assert!(matches!(store.write(2, Outcome::Error("x".into())), Err(DispatchError::Store { slot: 2, .. })));
}

#[test]
fn unwritten_slot_becomes_error_record() {
    let store = ResultStore::new(&prompts(2));
    store.write(0, Outcome::Response("a".into())).unwrap();
    assert_eq!(store.completed(), 1);
    let records = store.finish();
    assert_eq!(records.len(), 2);
    assert_eq!(records[1].error(), Some(UNRECORDED));
}

#[test]
fn concurrent_writers_on_distinct_ids() {
    let n = 256;
    let store = ResultStore::new(&prompts(n));
    let ids: Vec<usize> = (0..n).collect();
    std::thread::scope(|scope| {
        for chunk in ids.chunks(32) {
            let store = &store;
            scope.spawn(move || {
                for &id in chunk.iter().rev() {
                    store.write(id, Outcome::Response(format!("r{id}"))).unwrap();
                }
            });
        }
    });
    let records = store.finish();
    assert_eq!(records.len(), n);
    for (i, r) in records.iter().enumerate() {
        assert_eq!(r.id, i);
        assert_eq!(r.response(), Some(format!("r{i}").as_str()));
    }
}
