//! Concurrent writers against one database file.

mod common;

use common::{Fixture, user};
use std::thread;
use tessera_store::ErrorKind;
use tessera_types::Record;

const WRITERS: usize = 8;

#[test]
fn test_concurrent_unique_inserts_admit_one() {
    let fx = Fixture::new();

    let outcomes: Vec<_> = thread::scope(|scope| {
        let handles: Vec<_> = (0..WRITERS)
            .map(|i| {
                let engine = &fx.engine;
                scope.spawn(move || {
                    engine.insert(
                        &user(&format!("u{i}")),
                        "account",
                        Record::new().with("name", format!("Writer {i}")).with("code", "SAME"),
                    )
                })
            })
            .collect();
        handles.into_iter().map(|h| h.join().unwrap()).collect()
    });

    let succeeded = outcomes.iter().filter(|o| o.is_ok()).count();
    assert_eq!(succeeded, 1);
    for err in outcomes.iter().filter_map(|o| o.as_ref().err()) {
        assert_eq!(err.kind(), ErrorKind::Conflict, "{err}");
    }
    assert_eq!(fx.count("account"), 1);
}

#[test]
fn test_concurrent_auto_numbers_have_no_gaps() {
    const PER_WRITER: usize = 5;
    let fx = Fixture::new();

    let mut numbers: Vec<String> = thread::scope(|scope| {
        let handles: Vec<_> = (0..WRITERS)
            .map(|i| {
                let engine = &fx.engine;
                scope.spawn(move || {
                    (0..PER_WRITER)
                        .map(|n| {
                            engine
                                .insert(
                                    &user(&format!("u{i}")),
                                    "account",
                                    Record::new().with("name", format!("Writer {i} #{n}")),
                                )
                                .unwrap()
                                .get_str("account_number")
                                .unwrap()
                                .to_string()
                        })
                        .collect::<Vec<_>>()
                })
            })
            .collect();
        handles.into_iter().flat_map(|h| h.join().unwrap()).collect()
    });

    numbers.sort();
    let expected: Vec<String> = (1..=WRITERS * PER_WRITER)
        .map(|n| format!("ACC-{n:04}"))
        .collect();
    assert_eq!(numbers, expected);
}
