//! Benchmarks the compile scheduler's wave-by-wave pass loop (C8) over a synthetic dependency
//! chain, standing in for the teacher's `compile_parallel` benchmark of `solc` invocations.

#[macro_use]
extern crate criterion;

use criterion::Criterion;
use gridforge::{
    model::{AnalysedFile, FileHash, SourcePath, Symbol},
    state::BuildState,
    step::BuildStep,
    steps::compile::CompileStep,
    BuildConfig, MetricsHandle,
};
use std::path::Path;

/// Builds a chain of `n` Fortran modules, each `use`-ing the previous one, so the scheduler must
/// run `n` sequential passes: the worst case for wave-by-wave ordering.
fn chained_modules(dir: &Path, n: usize) -> gridforge::model::BuildTree {
    let mut tree = gridforge::model::BuildTree::new();
    let mut previous: Option<Symbol> = None;
    for i in 0..n {
        let path = SourcePath::new(dir.join(format!("m{i}.f90")));
        let mut file = AnalysedFile::new(path.clone(), FileHash(i as i64));
        let name = Symbol::new(format!("m{i}")).unwrap();
        file.add_module_def(name.clone());
        if i > 0 {
            file.symbol_deps.insert(previous.clone().unwrap());
            file.file_deps.insert(SourcePath::new(dir.join(format!("m{}.f90", i - 1))));
        }
        tree.insert(path, file);
        previous = Some(name);
    }
    tree
}

fn compile_many_benchmark(c: &mut Criterion) {
    let dir = tempfile::tempdir().unwrap();
    let fake_compiler = write_fake_compiler(dir.path());

    let mut group = c.benchmark_group("compile scheduler");
    group.sample_size(10);

    for size in [8usize, 32, 64] {
        group.bench_function(format!("chained_modules_{size}"), |b| {
            b.iter(|| {
                let config = BuildConfig::builder()
                    .label("bench")
                    .workspace(dir.path().join("ws"))
                    .source_root(dir.path().join("src"))
                    .root_symbol("m0")
                    .fortran_compiler(fake_compiler.clone())
                    .n_procs(4)
                    .build()
                    .unwrap();
                let mut state = BuildState::default();
                state.build_tree = Some(chained_modules(dir.path(), size));
                let (sink, _handle) = MetricsHandle::spawn();
                CompileStep.run(&mut state, &config, &sink).unwrap();
            });
        });
    }
}

/// A shell-script stand-in for `gfortran`/`gcc`: `touch`es whatever follows `-o` and exits 0, so
/// the benchmark measures scheduling overhead, not real compiler latency.
fn write_fake_compiler(dir: &Path) -> String {
    let script = dir.join("fake_compiler.sh");
    std::fs::write(
        &script,
        "#!/bin/sh\nwhile [ \"$#\" -gt 0 ]; do\n  if [ \"$1\" = \"-o\" ]; then\n    shift\n    touch \"$1\"\n    exit 0\n  fi\n  shift\ndone\nexit 1\n",
    )
    .unwrap();
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        std::fs::set_permissions(&script, std::fs::Permissions::from_mode(0o755)).unwrap();
    }
    format!("sh {}", script.display())
}

criterion_group!(benches, compile_many_benchmark);
criterion_main!(benches);
