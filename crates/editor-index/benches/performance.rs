use criterion::{BatchSize, Criterion, black_box, criterion_group, criterion_main};
use editor_index::{
    CellMeasurer, Document, LayoutIndex, Point, RangeTree, RoundMode, SyncScheduler, WrappingMode,
};
use std::rc::Rc;

fn large_text(line_count: usize) -> String {
    let mut out = String::with_capacity(line_count * 64);
    for i in 0..line_count {
        out.push_str(&format!(
            "{i:06} the quick brown fox jumps over the lazy dog (editor-index benchmark line)\n"
        ));
    }
    out.pop();
    out
}

fn measured_index(document: &Document) -> (Rc<SyncScheduler>, LayoutIndex) {
    let scheduler = Rc::new(SyncScheduler::new());
    let mut index = LayoutIndex::new(Rc::new(CellMeasurer::new()), document, scheduler.clone())
        .expect("layout index");
    scheduler.run_until_idle(&mut index);
    (scheduler, index)
}

fn spaced_ranges(count: usize) -> RangeTree<usize> {
    let mut tree = RangeTree::new();
    for i in 0..count {
        tree.add(i * 10, i * 10 + 5, i).expect("range");
    }
    tree
}

fn bench_range_tree_edits(c: &mut Criterion) {
    c.bench_function("range_tree/100_edits_in_100k_ranges", |b| {
        b.iter_batched(
            || spaced_ranges(100_000),
            |mut tree| {
                let mut offset = 500_000;
                for _ in 0..100 {
                    tree.replace(offset, offset + 3, 1).expect("edit");
                    offset += 7;
                }
                black_box(tree.count_all());
            },
            BatchSize::LargeInput,
        )
    });

    let tree = spaced_ranges(100_000);
    c.bench_function("range_tree/visit_touching_window", |b| {
        b.iter(|| {
            let mut count = 0;
            tree.visit_touching(black_box(400_000usize), 401_000usize, |_| count += 1);
            black_box(count);
        })
    });
}

fn bench_layout_rechunk(c: &mut Criterion) {
    let document = Document::from_text(&large_text(50_000));
    c.bench_function("layout/measure_50k_lines", |b| {
        b.iter(|| {
            let (_, index) = measured_index(black_box(&document));
            black_box(index.content_height());
        })
    });

    c.bench_function("layout/measure_50k_lines_wrapped", |b| {
        b.iter(|| {
            let scheduler = Rc::new(SyncScheduler::new());
            let mut index =
                LayoutIndex::new(Rc::new(CellMeasurer::new()), &document, scheduler.clone())
                    .expect("layout index");
            index
                .set_wrapping_mode(WrappingMode::Word, Some(40.0))
                .expect("wrapping");
            scheduler.run_until_idle(&mut index);
            black_box(index.content_height());
        })
    });

    c.bench_function("layout/typing_middle/100_inserts", |b| {
        b.iter_batched(
            || (document.clone(), measured_index(&document)),
            |(mut document, (scheduler, mut index))| {
                let mut offset = document.len() / 2;
                for _ in 0..100 {
                    let change = document.replace(offset, offset, "x");
                    index.on_document_changed(&change).expect("edit");
                    offset += 1;
                }
                scheduler.run_until_idle(&mut index);
                black_box(index.content_width());
            },
            BatchSize::LargeInput,
        )
    });
}

fn bench_point_lookups(c: &mut Criterion) {
    let document = Document::from_text(&large_text(50_000));
    let (_, index) = measured_index(&document);
    let len = document.len();

    c.bench_function("layout/offset_to_point/1k", |b| {
        b.iter(|| {
            for i in 0..1000 {
                black_box(index.offset_to_point(i * 3779 % len).expect("point"));
            }
        })
    });

    c.bench_function("layout/point_to_offset/1k", |b| {
        b.iter(|| {
            for i in 0..1000 {
                let point = Point::new((i % 90) as f64, (i * 47 % 50_000) as f64);
                black_box(index.point_to_offset(point, RoundMode::Round).expect("offset"));
            }
        })
    });
}

criterion_group!(
    benches,
    bench_range_tree_edits,
    bench_layout_rechunk,
    bench_point_lookups
);
criterion_main!(benches);
