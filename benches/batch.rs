use std::fmt::Debug;

use coefsig::{process_batch, process_batch_parallel, Defaults, RawRecord};
use diol::prelude::*;
use rand::{Rng, SeedableRng};

#[derive(Clone)]
struct Arg {
    records: Vec<RawRecord>,
}

impl Debug for Arg {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Arg")
            .field("len", &self.records.len())
            .finish()
    }
}

fn main() -> std::io::Result<()> {
    let mut bench = Bench::new(BenchConfig::from_args()?);
    let mut rng = rand::rngs::StdRng::seed_from_u64(0);
    let args = [2, 3, 4, 5].iter().map(|len| {
        let records = (0..10_usize.pow(*len))
            .map(|i| {
                let r = RawRecord::new()
                    .with("coefficient", rng.gen_range(-3.0..3.0_f64))
                    .with("std_error", rng.gen_range(0.05..2.0_f64))
                    .with("sample_size", rng.gen_range(10..5000_i64));
                if i % 2 == 0 {
                    r.with("regression_type", "multiple")
                        .with("num_predictors", rng.gen_range(1..5_i64))
                } else {
                    r
                }
            })
            .collect();
        Arg { records }
    });
    bench.register_many(list![sequential, parallel], args.collect::<Vec<_>>());
    bench.run()?;
    Ok(())
}

fn sequential(bencher: Bencher, Arg { records }: Arg) {
    bencher.bench(|| {
        std::hint::black_box(process_batch(&records, Defaults::default()));
    });
}

fn parallel(bencher: Bencher, Arg { records }: Arg) {
    let threads = num_cpus::get();
    bencher.bench(|| {
        std::hint::black_box(process_batch_parallel(&records, Defaults::default(), threads).unwrap());
    });
}
