use criterion::{BenchmarkId, Criterion, criterion_group, criterion_main};

use booklog::{
    book::BookDraft,
    core::store::LibraryStore,
    persist::{OpSink, sqlite::SqliteOpSink},
    time::parse_due_date,
};

fn draft(i: u64) -> BookDraft {
    BookDraft {
        title: format!("Title {i}"),
        author: "Bench Author".to_string(),
        isbn: "9780306406157".to_string(),
        description: "Benchmark copy".to_string(),
    }
}

fn bench_creates(c: &mut Criterion) {
    c.bench_function("store_create_20k", |b| {
        b.iter(|| {
            let mut store = LibraryStore::new();
            for i in 0..20_000u64 {
                let _ = store.create_book(draft(i)).expect("create");
            }
        });
    });
}

fn bench_circulation(c: &mut Criterion) {
    let due = parse_due_date("2030-01-01").expect("due");
    c.bench_function("store_checkout_checkin_5k", |b| {
        b.iter(|| {
            let mut store = LibraryStore::new();
            for i in 0..5_000u64 {
                let _ = store.create_book(draft(i)).expect("create");
            }
            for id in 1..=5_000u64 {
                let _ = store.check_out(id, format!("u{id}"), due).expect("out");
                let _ = store.check_in(id).expect("in");
            }
        });
    });
}

fn bench_history_query(c: &mut Criterion) {
    let mut group = c.benchmark_group("history_query");
    let due = parse_due_date("2030-01-01").expect("due");

    for cycles in [10usize, 100usize, 1000usize] {
        let mut store = LibraryStore::new();
        let (book, _) = store.create_book(draft(0)).expect("create");
        for _ in 0..cycles {
            let _ = store.check_out(book.id, "u1".to_string(), due).expect("out");
            let _ = store.check_in(book.id).expect("in");
        }

        group.bench_with_input(BenchmarkId::from_parameter(cycles), &book.id, |b, &id| {
            b.iter(|| {
                let _ = store.history(id);
            });
        });
    }

    group.finish();
}

fn bench_sqlite_append(c: &mut Criterion) {
    let due = parse_due_date("2030-01-01").expect("due");
    c.bench_function("sqlite_append_circulation_1k", |b| {
        b.iter(|| {
            let mut store = LibraryStore::new();
            let mut sink = SqliteOpSink::open_in_memory().expect("sqlite");
            let mut ops = Vec::new();
            for i in 0..1_000u64 {
                let (book, op) = store.create_book(draft(i)).expect("create");
                ops.push(op);
                let (_, op) = store.check_out(book.id, "u1".to_string(), due).expect("out");
                ops.push(op);
            }
            sink.append_ops(&ops).expect("append");
        });
    });
}

criterion_group!(
    benches,
    bench_creates,
    bench_circulation,
    bench_history_query,
    bench_sqlite_append
);
criterion_main!(benches);
