use commitment_guard::application::limiter::{EventRateLimiter, RateLimiterConfig};
use commitment_guard::infrastructure::mocks::{MockPlatform, MockProbe, StaticIdentity};
use commitment_guard::{
    CommitmentGuard, EventKind, GuardConfig, Surface, SurfaceMatcher, WindowEvent,
};
use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Guard whose rate limiter never drops, so every event is fully classified
fn unthrottled_guard() -> CommitmentGuard {
    CommitmentGuard::builder()
        .with_config(GuardConfig {
            rate_limit_capacity: u32::MAX,
            ..GuardConfig::default()
        })
        .with_platform(Arc::new(MockPlatform::new()))
        .with_probe(Arc::new(MockProbe::new()))
        .with_identity(Arc::new(StaticIdentity::new("bench")))
        .build()
        .unwrap()
}

/// Benchmark the surface heuristics on their own
fn bench_match_attempt(c: &mut Criterion) {
    let mut group = c.benchmark_group("match_attempt");
    let matcher = SurfaceMatcher::default();

    for num_targets in [1usize, 10, 100].iter() {
        let targets: Vec<String> = (0..*num_targets)
            .map(|i| format!("blocked app {}", i))
            .collect();

        group.bench_with_input(
            BenchmarkId::new("settings_miss", num_targets),
            &targets,
            |b, targets| {
                b.iter(|| {
                    matcher.match_attempt(
                        black_box(Surface::Settings),
                        black_box("com.android.settings.SubSettings"),
                        black_box("Battery  Storage  Notifications  Permissions"),
                        black_box(targets),
                    )
                })
            },
        );

        group.bench_with_input(
            BenchmarkId::new("installer_hit", num_targets),
            &targets,
            |b, targets| {
                let text = format!("Do you want to uninstall {}?", targets[targets.len() - 1]);
                b.iter(|| {
                    matcher.match_attempt(
                        black_box(Surface::Installer),
                        black_box("android.app.AlertDialog"),
                        black_box(&text),
                        black_box(targets),
                    )
                })
            },
        );
    }

    group.finish();
}

/// Benchmark the full event path through the facade
fn bench_on_event(c: &mut Criterion) {
    let mut group = c.benchmark_group("on_event");
    group.throughput(Throughput::Elements(1000));

    group.bench_function("idle_fast_path", |b| {
        let guard = unthrottled_guard();
        let event = WindowEvent::state_changed("com.example.mail");
        b.iter(|| {
            for _ in 0..1000 {
                black_box(guard.on_event(black_box(&event)));
            }
        })
    });

    group.bench_function("filtered_kind", |b| {
        let guard = unthrottled_guard();
        let event = WindowEvent::new(EventKind::ViewScrolled, "com.example.mail", "", "");
        b.iter(|| {
            for _ in 0..1000 {
                black_box(guard.on_event(black_box(&event)));
            }
        })
    });

    group.bench_function("settings_content_with_blocked_apps", |b| {
        let guard = unthrottled_guard();
        for i in 0..20 {
            let package = format!("com.example.app{}", i);
            let label = format!("App {}", i);
            guard
                .add_blocked_app_labeled(&package, &label, u64::MAX)
                .unwrap();
        }
        let event = WindowEvent::new(
            EventKind::WindowContentChanged,
            "com.android.settings",
            "com.android.settings.SubSettings",
            "Battery  Storage  Notifications",
        );
        b.iter(|| {
            for _ in 0..1000 {
                black_box(guard.on_event(black_box(&event)));
            }
        })
    });

    group.finish();
}

/// Benchmark the packed-word limiter under contention
fn bench_limiter_concurrent(c: &mut Criterion) {
    let mut group = c.benchmark_group("limiter_concurrent");

    for num_threads in [2, 4, 8].iter() {
        group.throughput(Throughput::Elements((*num_threads as u64) * 1000));

        group.bench_with_input(
            BenchmarkId::new("threads", num_threads),
            num_threads,
            |b, &num_threads| {
                b.iter(|| {
                    let epoch = Instant::now();
                    let limiter = Arc::new(EventRateLimiter::new(
                        RateLimiterConfig {
                            bucket: Duration::from_millis(50),
                            max_events: 10,
                        },
                        epoch,
                    ));

                    let mut handles = vec![];
                    for _ in 0..num_threads {
                        let limiter = Arc::clone(&limiter);
                        let handle = std::thread::spawn(move || {
                            for _ in 0..1000 {
                                black_box(limiter.check(black_box(Instant::now())));
                            }
                        });
                        handles.push(handle);
                    }

                    for handle in handles {
                        handle.join().unwrap();
                    }
                })
            },
        );
    }

    group.finish();
}

criterion_group!(
    benches,
    bench_match_attempt,
    bench_on_event,
    bench_limiter_concurrent
);
criterion_main!(benches);
