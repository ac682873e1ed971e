use std::sync::Arc;

use criterion::{black_box, criterion_group, criterion_main, Criterion};
use rust_decimal_macros::dec;
use time::macros::date;

use caja::{
    audit::MemoryAuditSink,
    ledger::LedgerOptions,
    storage::{InMemoryStorage, LedgerStore, SqliteStorage},
    Actor, Caja, CreateReceiptCommand, FixedClock, LineItem, Payment,
};

fn setup(store: Arc<dyn LedgerStore>) -> Caja {
    let day = date!(2024 - 03 - 01);
    let caja = Caja::new(
        store,
        Arc::new(MemoryAuditSink::new()),
        Arc::new(FixedClock::at_date(day)),
        LedgerOptions::default(),
    );
    caja.ledger.open_register(day, dec!(0), &Actor::new("b", "Bench")).unwrap();
    caja
}

fn command() -> CreateReceiptCommand {
    CreateReceiptCommand {
        client_id: Arc::from("bench-client"),
        date: None,
        items: vec![LineItem {
            description: Arc::from("Monthly fee"),
            period: None,
            amount: dec!(25),
        }],
        payments: vec![
            Payment {
                method: Arc::from("cash"),
                amount: dec!(15),
                check_numbers: vec![],
            },
            Payment {
                method: Arc::from("card"),
                amount: dec!(10),
                check_numbers: vec![],
            },
        ],
    }
}

fn bench_receipt_creation(c: &mut Criterion) {
    let actor = Actor::new("b", "Bench");
    let cmd = command();

    let memory = setup(Arc::new(InMemoryStorage::new()));
    c.bench_function("receipt_creation_memory", |b| {
        b.iter(|| memory.receipts.create(black_box(&cmd), &actor).unwrap())
    });

    let sqlite = setup(Arc::new(SqliteStorage::new(":memory:").unwrap()));
    c.bench_function("receipt_creation_sqlite", |b| {
        b.iter(|| sqlite.receipts.create(black_box(&cmd), &actor).unwrap())
    });
}

fn bench_create_and_void(c: &mut Criterion) {
    let actor = Actor::new("b", "Bench");
    let cmd = command();
    let caja = setup(Arc::new(InMemoryStorage::new()));

    c.bench_function("receipt_create_then_void", |b| {
        b.iter(|| {
            caja.receipts.create(black_box(&cmd), &actor).unwrap();
            caja.receipts.void_last(&actor).unwrap()
        })
    });
}

fn bench_summary(c: &mut Criterion) {
    let actor = Actor::new("b", "Bench");
    let cmd = command();
    let caja = setup(Arc::new(InMemoryStorage::new()));
    for _ in 0..500 {
        caja.receipts.create(&cmd, &actor).unwrap();
    }
    let day = date!(2024 - 03 - 01);

    c.bench_function("summary_first_page", |b| {
        b.iter(|| caja.ledger.summary(black_box(day), 1, 50).unwrap())
    });
    c.bench_function("summary_full_day", |b| {
        b.iter(|| caja.ledger.summary(black_box(day), 1, 500).unwrap())
    });
}

criterion_group!(benches, bench_receipt_creation, bench_create_and_void, bench_summary);
criterion_main!(benches);
