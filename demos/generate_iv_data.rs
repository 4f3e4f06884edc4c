use polars::prelude::*;
use rand::distributions::Distribution;
use rand::prelude::*;
use statrs::distribution::Normal;
use std::fs::File;
use std::io::BufWriter;

/// Writes a synthetic schooling/college-proximity extract to `iv_synthetic.csv`.
///
/// Proximity to a four-year college (`nearc4`) depends on the covariates, so
/// the instrument is only exogenous conditional on them. The return to
/// schooling is 0.08 and unobserved ability biases OLS upwards.
fn main() -> Result<(), Box<dyn std::error::Error>> {
    let n_rows = 3_000;
    let mut rng = StdRng::seed_from_u64(52);
    let normal = Normal::new(0.0, 1.0)?;

    let black: Vec<f64> = (0..n_rows).map(|_| f64::from(rng.gen_bool(0.23))).collect();
    let south: Vec<f64> = (0..n_rows).map(|_| f64::from(rng.gen_bool(0.40))).collect();
    let smsa: Vec<f64> = (0..n_rows).map(|_| f64::from(rng.gen_bool(0.70))).collect();
    let region: Vec<i64> = (0..n_rows).map(|_| rng.gen_range(1..=9)).collect();
    let exper: Vec<f64> = (0..n_rows).map(|_| f64::from(rng.gen_range(0..=18u32))).collect();

    let mut nearc4 = Vec::with_capacity(n_rows);
    let mut educ = Vec::with_capacity(n_rows);
    let mut lwage = Vec::with_capacity(n_rows);
    for i in 0..n_rows {
        let eta = -0.2 + 1.0 * smsa[i] - 0.5 * south[i] + 0.3 * black[i];
        let p = 1.0 / (1.0 + (-eta).exp());
        let z = f64::from(rng.gen_bool(p));

        let ability = normal.sample(&mut rng);
        let schooling = 12.0 + 0.9 * z - 0.6 * black[i] + 0.4 * smsa[i]
            + 0.8 * ability
            + 1.5 * normal.sample(&mut rng);
        let schooling = schooling.round().clamp(6.0, 20.0);

        let wage = 5.4 + 0.08 * schooling + 0.04 * exper[i] - 0.15 * black[i]
            - 0.1 * south[i]
            + 0.12 * smsa[i]
            + 0.1 * ability
            + 0.3 * normal.sample(&mut rng);

        nearc4.push(z);
        educ.push(schooling);
        lwage.push(wage);
    }

    let mut df = df!(
        "lwage" => lwage,
        "educ" => educ,
        "nearc4" => nearc4,
        "exper" => exper,
        "black" => black,
        "south" => south,
        "smsa" => smsa,
        "region" => region
    )?;

    let file = File::create("iv_synthetic.csv")?;
    let mut writer = BufWriter::new(file);
    CsvWriter::new(&mut writer).finish(&mut df)?;

    println!("Generated iv_synthetic.csv with {} rows.", n_rows);
    Ok(())
}
