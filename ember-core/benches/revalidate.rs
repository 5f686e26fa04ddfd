use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};

use ember_core::{CompileOptions, Environment, SimpleDom, Template, TrackedObject, Value};

const ROWS: &str = "<table>{{#each this.rows key=\"id\" as |row|}}\
<tr class={{if row.selected \"selected\"}}><td>{{row.id}}</td><td>{{row.label}}</td></tr>\
{{/each}}</table>";

fn rows(count: usize) -> Vec<TrackedObject> {
    (0..count)
        .map(|id| {
            [
                ("id", Value::from(id)),
                ("label", Value::from(format!("row {id}"))),
                ("selected", Value::from(false)),
            ]
            .into_iter()
            .collect()
        })
        .collect()
}

fn list(rows: &[TrackedObject]) -> Value {
    Value::list(rows.iter().cloned().map(Value::from))
}

pub fn compile(c: &mut Criterion) {
    c.bench_function("compile rows", |b| {
        b.iter(|| Template::compile(black_box(ROWS), &CompileOptions::default()).unwrap())
    });
}

pub fn revalidate_sweep(c: &mut Criterion) {
    let template = Template::compile(ROWS, &CompileOptions::default()).unwrap();
    let mut group = c.benchmark_group("revalidate");

    for size in [10, 100, 1000] {
        let env = Environment::new();
        let rows = rows(size);
        let context: TrackedObject = [("rows", list(&rows))].into_iter().collect();
        let mut dom = SimpleDom::new();
        let root = dom.root();
        let mut result = template.render(&env, &mut dom, root, context.clone()).unwrap();

        group.bench_function(BenchmarkId::new("unchanged", size), |b| {
            b.iter(|| result.revalidate(&mut dom).unwrap())
        });

        let mut selected = false;
        group.bench_function(BenchmarkId::new("one row", size), |b| {
            b.iter(|| {
                selected = !selected;
                rows[size / 2].set(env.runtime(), "selected", selected).unwrap();
                result.revalidate(&mut dom).unwrap()
            })
        });

        let mut reversed = rows.clone();
        group.bench_function(BenchmarkId::new("reverse", size), |b| {
            b.iter(|| {
                reversed.reverse();
                context.set(env.runtime(), "rows", list(&reversed)).unwrap();
                result.revalidate(&mut dom).unwrap()
            })
        });
    }
    group.finish();
}

criterion_group!(benches, compile, revalidate_sweep);
criterion_main!(benches);
