use common::{Money, OrderId};
use criterion::{BenchmarkId, Criterion, criterion_group, criterion_main};
use domain::{
    BillingCalculator, CustomerDetails, GatewayOrderStatus, Order, OrderItem, PaymentMethod,
    PaymentStatus, next_payment_status,
};

fn cart(lines: usize) -> Vec<OrderItem> {
    (0..lines)
        .map(|i| {
            OrderItem::new(
                format!("SKU-{i:04}"),
                format!("Item {i}"),
                (i % 5 + 1) as u32,
                Money::from_paise(19_999 + i as i64 * 731),
            )
        })
        .collect()
}

fn bench_compute(c: &mut Criterion) {
    let calculator = BillingCalculator::default();
    let mut group = c.benchmark_group("billing/compute");

    for lines in [1, 10, 100] {
        let items = cart(lines);
        group.bench_with_input(BenchmarkId::from_parameter(lines), &items, |b, items| {
            b.iter(|| calculator.compute(items).unwrap());
        });
    }

    group.finish();
}

fn bench_place_order(c: &mut Criterion) {
    let calculator = BillingCalculator::default();
    let customer = CustomerDetails {
        name: "Bench Customer".to_string(),
        email: "bench@example.com".to_string(),
        phone: "9876543210".to_string(),
        address: None,
    };
    let items = cart(10);

    c.bench_function("billing/place_order", |b| {
        b.iter(|| {
            Order::place(
                OrderId::generate(),
                customer.clone(),
                items.clone(),
                PaymentMethod::Prepaid,
                &calculator,
            )
            .unwrap()
        });
    });
}

fn bench_transition(c: &mut Criterion) {
    let events = [
        GatewayOrderStatus::Active,
        GatewayOrderStatus::Paid,
        GatewayOrderStatus::Paid,
        GatewayOrderStatus::Refunded,
    ];

    c.bench_function("order/transition_sequence", |b| {
        b.iter(|| {
            events.iter().fold(PaymentStatus::Pending, |status, event| {
                next_payment_status(status, event)
                    .new_status()
                    .unwrap_or(status)
            })
        });
    });
}

criterion_group!(benches, bench_compute, bench_place_order, bench_transition);
criterion_main!(benches);
