use criterion::{Criterion, criterion_group, criterion_main};
use geno::build::DependencyGraph;
use geno::config::Configuration;
use geno::jobs::Scheduler;
use geno::project::ProjectKind;
use geno::toolchain::{Backend, Optimization};
use std::hint::black_box;
use std::path::{Path, PathBuf};

fn sample_config() -> Configuration {
    Configuration {
        compiler: Some(Backend::Gcc),
        optimization: Some(Optimization::Release),
        defines: vec!["NDEBUG".into(), "APP_NAME=bench app".into()],
        include_dirs: vec![PathBuf::from("/work/include"), PathBuf::from("/work/third_party")],
        library_dirs: vec![PathBuf::from("/work/lib")],
        libraries: vec!["m".into(), "pthread".into()],
        output_dir: Some(PathBuf::from("/work/out")),
        ..Default::default()
    }
}

fn bench_compile_command(c: &mut Criterion) {
    let config = sample_config();
    c.bench_function("gcc_compile_command", |b| {
        b.iter(|| {
            Backend::Gcc.compile_command(black_box(&config), black_box(Path::new("/work/src/main.cpp")))
        })
    });
}

fn bench_link_command(c: &mut Criterion) {
    let config = sample_config();
    let objects: Vec<PathBuf> = (0..64)
        .map(|i| PathBuf::from(format!("/work/out/obj/unit{i}.o")))
        .collect();
    c.bench_function("gcc_link_command_64_objects", |b| {
        b.iter(|| {
            Backend::Gcc.link_command(
                black_box(&config),
                black_box(&objects),
                "bench",
                ProjectKind::Application,
            )
        })
    });
}

fn bench_topological_order(c: &mut Criterion) {
    // Each project links the two declared before it.
    let projects: Vec<(String, Vec<String>)> = (0..200)
        .map(|i| {
            let libs = (i.max(2) - 2..i).map(|d| format!("p{d}")).collect();
            (format!("p{i}"), libs)
        })
        .collect();
    c.bench_function("topological_order_200_projects", |b| {
        b.iter(|| {
            let graph = DependencyGraph::new(
                projects.iter().map(|(n, l)| (n.as_str(), l.as_slice())),
            )
            .unwrap();
            graph.topological_order().unwrap()
        })
    });
}

fn bench_scheduler_fan_in(c: &mut Criterion) {
    let scheduler = Scheduler::new(4).unwrap();
    c.bench_function("scheduler_256_jobs_fan_in", |b| {
        b.iter(|| {
            let leaves: Vec<_> = (0..256)
                .map(|i| {
                    scheduler
                        .submit(&[], move |_| Some(PathBuf::from(format!("{i}.o"))))
                        .unwrap()
                })
                .collect();
            let sink = scheduler
                .submit(&leaves, |inputs| Some(PathBuf::from(inputs.len().to_string())))
                .unwrap();
            black_box(scheduler.wait(sink))
        })
    });
}

criterion_group!(
    benches,
    bench_compile_command,
    bench_link_command,
    bench_topological_order,
    bench_scheduler_fan_in
);
criterion_main!(benches);
