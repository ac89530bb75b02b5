use std::sync::Arc;

use coindb::models::{BalanceTransaction, OperationKind};
use coindb::sqlite_ledger::SqliteLedger;
use coindb::storage::LedgerBackend;
use criterion::{black_box, criterion_group, criterion_main, Criterion};

fn setup() -> Arc<dyn LedgerBackend> {
    Arc::new(SqliteLedger::open(":memory:", "players").unwrap())
}

fn seed_accounts(ledger: &Arc<dyn LedgerBackend>, count: u64) {
    for i in 0..count {
        ledger
            .create_account(&format!("player{}", i), i * 10)
            .unwrap();
    }
}

fn bench_verify(c: &mut Criterion) {
    let pass = BalanceTransaction::new("steve", OperationKind::Increment, 40, Some(150)).unwrap();
    let reject = BalanceTransaction::new("steve", OperationKind::Increment, 60, Some(150)).unwrap();

    c.bench_function("verify_pass", |b| b.iter(|| pass.verify(black_box(100))));
    c.bench_function("verify_reject", |b| b.iter(|| reject.verify(black_box(100))));
}

fn bench_increment(c: &mut Criterion) {
    let ledger = setup();
    ledger.create_account("steve", 0).unwrap();
    let tx = BalanceTransaction::new("steve", OperationKind::Increment, 1, None).unwrap();

    c.bench_function("increment_applied", |b| {
        b.iter(|| ledger.update_balance(black_box(&tx)).unwrap())
    });
}

fn bench_rejected_increment(c: &mut Criterion) {
    let ledger = setup();
    ledger.create_account("steve", 150).unwrap();
    let tx = BalanceTransaction::new("steve", OperationKind::Increment, 10, Some(150)).unwrap();

    c.bench_function("increment_rejected", |b| {
        b.iter(|| ledger.update_balance(black_box(&tx)).is_err())
    });
}

fn bench_balance_fetch(c: &mut Criterion) {
    let ledger = setup();
    seed_accounts(&ledger, 100);

    c.bench_function("balance_fetch", |b| {
        b.iter(|| ledger.balance(black_box("player42")).unwrap())
    });
}

fn bench_top_accounts(c: &mut Criterion) {
    let ledger = setup();
    seed_accounts(&ledger, 100);

    c.bench_function("top_accounts", |b| {
        b.iter(|| ledger.top_accounts(black_box(10), 0).unwrap())
    });
}

criterion_group!(
    benches,
    bench_verify,
    bench_increment,
    bench_rejected_increment,
    bench_balance_fetch,
    bench_top_accounts
);
criterion_main!(benches);
