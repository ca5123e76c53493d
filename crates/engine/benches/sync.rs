use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use rolesync_core::{PermissionOverwrite, Permissions};
use rolesync_engine::diff::diff_overwrites;
use rolesync_engine::sync::synchronize_roles;
use rolesync_testkit::{channel, role, MockGuild};

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

const ORIGIN: &str = "origin";
const TARGET: &str = "target";

/// `n` channels where roughly a third need an upsert, a third a delete, and
/// the rest are already in sync.
fn make_guild(n: usize) -> MockGuild {
    let allow = Permissions::VIEW_CHANNEL | Permissions::SEND_MESSAGES;
    let deny = Permissions::ADD_REACTIONS;

    let mut guild = MockGuild::new("bench")
        .with_role(role(ORIGIN, "Origin", Permissions::KICK_MEMBERS))
        .with_role(role(TARGET, "Target", Permissions::empty()));

    for i in 0..n {
        let overwrites = match i % 3 {
            0 => vec![PermissionOverwrite::role(ORIGIN, allow, deny)],
            1 => vec![PermissionOverwrite::role(TARGET, allow, deny)],
            _ => vec![
                PermissionOverwrite::role(ORIGIN, allow, deny),
                PermissionOverwrite::role(TARGET, allow, deny),
            ],
        };
        guild = guild.with_channel(channel(&i.to_string(), overwrites));
    }
    guild
}

// ---------------------------------------------------------------------------
// Benchmark: per-channel diff
// ---------------------------------------------------------------------------

fn bench_diff(c: &mut Criterion) {
    let origin = PermissionOverwrite::role(ORIGIN, Permissions::VIEW_CHANNEL, Permissions::empty());
    let same = PermissionOverwrite::role(TARGET, Permissions::VIEW_CHANNEL, Permissions::empty());
    let other = PermissionOverwrite::role(TARGET, Permissions::SEND_MESSAGES, Permissions::empty());

    let mut group = c.benchmark_group("diff_overwrites");
    group.bench_function("equal", |b| {
        b.iter(|| black_box(diff_overwrites(Some(&origin), Some(&same))))
    });
    group.bench_function("upsert", |b| {
        b.iter(|| black_box(diff_overwrites(Some(&origin), Some(&other))))
    });
    group.bench_function("delete", |b| {
        b.iter(|| black_box(diff_overwrites(None, Some(&other))))
    });
    group.finish();
}

// ---------------------------------------------------------------------------
// Benchmark: already-synced guild (read and diff only)
// ---------------------------------------------------------------------------

fn bench_synchronize_converged(c: &mut Criterion) {
    let rt = tokio::runtime::Runtime::new().unwrap();

    let mut group = c.benchmark_group("synchronize_converged");
    for count in [100, 500, 2000] {
        let guild = make_guild(count);
        // Converge once so every iteration measures the write-free path.
        rt.block_on(synchronize_roles(&guild, "bench", ORIGIN, TARGET))
            .unwrap();

        group.bench_with_input(BenchmarkId::from_parameter(count), &guild, |b, guild| {
            b.to_async(&rt).iter(|| async move {
                black_box(
                    synchronize_roles(guild, "bench", ORIGIN, TARGET)
                        .await
                        .unwrap(),
                )
            });
        });
    }
    group.finish();
}

// ---------------------------------------------------------------------------
// Benchmark: drifted guild (fresh state every iteration)
// ---------------------------------------------------------------------------

fn bench_synchronize_drifted(c: &mut Criterion) {
    let rt = tokio::runtime::Runtime::new().unwrap();

    let mut group = c.benchmark_group("synchronize_drifted");
    for count in [100, 500] {
        group.bench_with_input(BenchmarkId::from_parameter(count), &count, |b, &count| {
            b.to_async(&rt).iter_batched(
                || make_guild(count),
                |guild| async move {
                    black_box(
                        synchronize_roles(&guild, "bench", ORIGIN, TARGET)
                            .await
                            .unwrap(),
                    )
                },
                criterion::BatchSize::SmallInput,
            );
        });
    }
    group.finish();
}

criterion_group!(
    benches,
    bench_diff,
    bench_synchronize_converged,
    bench_synchronize_drifted,
);
criterion_main!(benches);
