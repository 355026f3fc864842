use criterion::{black_box, criterion_group, criterion_main, BatchSize, Criterion};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::io::Cursor;
use std::path::Path;
use tempfile::TempDir;
use termdict::{DictConfig, DictionaryWriter, DiskDictionary, Entry, IdPostings, MergeParams};

const TERMS: usize = 100_000;

fn random_terms(seed: u64, count: usize) -> Vec<String> {
    let mut rng = StdRng::seed_from_u64(seed);
    let mut terms: Vec<String> = (0..count)
        .map(|_| {
            let len = rng.gen_range(3..14);
            (0..len).map(|_| rng.gen_range(b'a'..=b'z') as char).collect()
        })
        .collect();
    terms.sort();
    terms.dedup();
    terms
}

fn write_dictionary(path: &Path, terms: &[String], config: &DictConfig) {
    let mut writer = DictionaryWriter::new(config, false).unwrap();
    for (i, term) in terms.iter().enumerate() {
        let mut entry = Entry::with_postings(term.clone(), i as u64 + 1, IdPostings::from_docs([i as u32]));
        writer.write(&mut entry).unwrap();
    }
    writer.finish_to_path(path).unwrap();
}

fn bench_lookup(criterion: &mut Criterion) {
    let config = DictConfig::default();
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("terms.dict");
    let terms = random_terms(7, TERMS);
    write_dictionary(&path, &terms, &config);
    let dict: DiskDictionary<String, IdPostings> = DiskDictionary::open(&path, &config).unwrap();

    let mut rng = StdRng::seed_from_u64(11);
    let probes: Vec<String> = (0..1_000).map(|_| terms[rng.gen_range(0..terms.len())].clone()).collect();

    criterion.bench_function("dictionary_get_random", |bench| {
        bench.iter(|| {
            for probe in &probes {
                black_box(dict.get(probe).unwrap());
            }
        })
    });

    criterion.bench_function("dictionary_iterate_all", |bench| {
        bench.iter(|| {
            let mut count = 0u64;
            for entry in dict.iter().unwrap() {
                count += entry.unwrap().info.doc_count;
            }
            black_box(count)
        })
    });
}

fn bench_merge(criterion: &mut Criterion) {
    let config = DictConfig::default();
    let dir = TempDir::new().unwrap();
    let mut dicts = Vec::new();
    for seed in 0..4u64 {
        let path = dir.path().join(format!("segment-{}.dict", seed));
        write_dictionary(&path, &random_terms(seed, TERMS / 4), &config);
        dicts.push(DiskDictionary::<String, IdPostings>::open(&path, &config).unwrap());
    }
    let sources: Vec<Option<&DiskDictionary<String, IdPostings>>> = dicts.iter().map(Some).collect();
    let starts: Vec<u32> = (0..4u32).map(|i| i * TERMS as u32).collect();

    criterion.bench_function("dictionary_merge_4_segments", |bench| {
        bench.iter_batched(
            || Cursor::new(Vec::new()),
            |mut out| {
                let params = MergeParams::new().with_doc_starts(starts.clone());
                black_box(DiskDictionary::merge(&sources, params, &config, &mut out).unwrap())
            },
            BatchSize::SmallInput,
        )
    });
}

criterion_group!(benches, bench_lookup, bench_merge);
criterion_main!(benches);
