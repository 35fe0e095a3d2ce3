use criterion::{BenchmarkId, Criterion, Throughput, black_box, criterion_group, criterion_main};
use rand::distributions::Standard;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use scenario_ate::{ModelCollection, SurveyRow, TreatmentContrast, compute_ates};

const COVARIATES: [&str; 6] = ["age", "income", "hhsize", "age_6170", "hhveh0", "a6170ve0"];

fn collection(activities: usize) -> ModelCollection {
    let mut json = String::from("{");
    for a in 0..activities {
        if a > 0 {
            json.push(',');
        }
        let coefficients: Vec<String> = COVARIATES
            .iter()
            .enumerate()
            .map(|(i, name)| format!("\"{name}\": {}", 0.1 * (i as f64 + 1.0) - 0.3))
            .chain(std::iter::once("\"severity\": 0.6".to_string()))
            .collect();
        let variables: Vec<String> = COVARIATES
            .iter()
            .map(|name| format!("\"{name}\""))
            .chain(std::iter::once("\"severity\"".to_string()))
            .collect();
        json.push_str(&format!(
            "\"activity_{a}\": {{ \"metadata\": {{ \"levels\": 5, \"link\": \"{}\" }}, \
             \"coefficients\": {{ {} }}, \
             \"thresholds\": {{ \"1|2\": -1.5, \"2|3\": -0.5, \"3|4\": 0.5, \"4|5\": 1.5 }}, \
             \"variables\": [{}] }}",
            if a % 2 == 0 { "logit" } else { "probit" },
            coefficients.join(", "),
            variables.join(", "),
        ));
    }
    json.push('}');
    ModelCollection::from_json_str(&json).expect("benchmark models")
}

fn random_rows(count: usize) -> Vec<SurveyRow> {
    let mut rng = StdRng::seed_from_u64(0x5EED_A7E + count as u64);
    (0..count)
        .map(|_| {
            let u: f64 = rng.sample(Standard);
            SurveyRow::new()
                .with("age", rng.gen_range(18.0..90.0))
                .with("income", format!("{:.0}", u * 200_000.0))
                .with("hhsize", rng.gen_range(1.0..7.0_f64).floor())
                .with("age_6170", if rng.gen_bool(0.15) { 1.0 } else { 0.0 })
                .with("hhveh0", if rng.gen_bool(0.1) { 1.0 } else { 0.0 })
                .with("weight", rng.gen_range(0.5..2.0))
        })
        .collect()
}

fn benchmark_compute_ates(c: &mut Criterion) {
    let models = collection(12);
    let contrast = TreatmentContrast::new("severity", 0.0, 1.0);
    let row_counts = [100_usize, 1_000, 10_000];

    let mut group = c.benchmark_group("compute_ates");
    for &count in &row_counts {
        let rows = random_rows(count);
        group.throughput(Throughput::Elements(count as u64));
        group.bench_with_input(BenchmarkId::new("rows", count), &rows, |b, input| {
            b.iter(|| {
                let results = compute_ates(black_box(&models), black_box(input), &contrast);
                black_box(results);
            });
        });
    }
    group.finish();
}

criterion_group!(compute_ates_bench, benchmark_compute_ates);
criterion_main!(compute_ates_bench);
