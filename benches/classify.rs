/// キャプション分類の性能ベンチマーク。
use criterion::{Criterion, black_box, criterion_group, criterion_main};
use caption_tagger::classification::{PostClassifier, normalize};

const CAPTIONS: [&str; 6] = [
    "Tôi thích xem bóng đá và tennis mỗi ngày",
    "Mới mua iPhone từ Apple Store",
    "Hôm nay trời đẹp quá",
    "Xem bóng đá rồi đi ăn nhà hàng",
    "Just watched the new Netflix movie, the director nailed every scene",
    "Review laptop mới: cấu hình mạnh, màn hình đẹp, phần mềm chạy mượt",
];

fn synthetic_captions(count: usize) -> Vec<String> {
    (0..count)
        .map(|i| format!("{} #{i}", CAPTIONS[i % CAPTIONS.len()]))
        .collect()
}

fn bench_normalize(c: &mut Criterion) {
    let captions = synthetic_captions(1024);
    c.bench_function("normalize_captions_1k", |b| {
        b.iter(|| {
            let total: usize = captions.iter().map(|caption| normalize(caption).len()).sum();
            black_box(total);
        });
    });
}

fn bench_classify(c: &mut Criterion) {
    let classifier = PostClassifier::with_builtin_dictionary();
    let captions = synthetic_captions(1024);

    c.bench_function("classify_captions_1k", |b| {
        b.iter(|| {
            let tagged = captions
                .iter()
                .filter(|caption| !classifier.tags_for(Some(caption.as_str())).is_empty())
                .count();
            black_box(tagged);
        });
    });
}

criterion_group!(benches, bench_normalize, bench_classify);
criterion_main!(benches);
