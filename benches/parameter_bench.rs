use criterion::{black_box, criterion_group, criterion_main, Criterion};
use rust_dcs::{Parameter, UnitValue};

fn noop_parameter() -> Parameter {
    Parameter::builder("bench")
        .getter(|| Box::pin(async { Ok(UnitValue::bare(1.0)) }))
        .setter(|_| Box::pin(async { Ok(()) }))
        .build()
        .expect("valid parameter")
}

fn benchmark_parameter_write(c: &mut Criterion) {
    let rt = tokio::runtime::Runtime::new().expect("runtime");
    let parameter = noop_parameter();

    c.bench_function("parameter_write_roundtrip", |b| {
        b.to_async(&rt).iter(|| {
            let parameter = parameter.clone();
            async move {
                parameter
                    .set(UnitValue::bare(1.0))
                    .expect("dispatch")
                    .wait()
                    .await
                    .expect("setter");
            }
        });
    });
}

fn benchmark_parameter_read(c: &mut Criterion) {
    let rt = tokio::runtime::Runtime::new().expect("runtime");
    let parameter = noop_parameter();

    c.bench_function("parameter_read_roundtrip", |b| {
        b.to_async(&rt).iter(|| {
            let parameter = parameter.clone();
            async move {
                black_box(
                    parameter
                        .get()
                        .expect("dispatch")
                        .result()
                        .await
                        .expect("getter"),
                );
            }
        });
    });
}

fn benchmark_validation_only(c: &mut Criterion) {
    let parameter = Parameter::builder("bench")
        .setter(|_| Box::pin(async { Ok(()) }))
        .unit("mm")
        .soft_limits(0.0, 100.0)
        .build()
        .expect("valid parameter");

    c.bench_function("parameter_validation_rejection", |b| {
        b.iter(|| {
            // Out-of-range writes fail synchronously without touching a
            // runtime, so this isolates the validation path.
            black_box(parameter.set(UnitValue::new(200.0, "mm")).is_err());
        });
    });
}

fn criterion_benchmark(c: &mut Criterion) {
    benchmark_parameter_write(c);
    benchmark_parameter_read(c);
    benchmark_validation_only(c);
}

criterion_group!(name = benches; config = Criterion::default().sample_size(50); targets = criterion_benchmark);
criterion_main!(benches);
