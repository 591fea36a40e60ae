/// RMS energy of normalized samples.
pub fn calculate_rms(samples: &[f32]) -> f64 {
    if samples.is_empty() {
        return 0.0;
    }

    let sum_squares: f64 = samples
        .iter()
        .map(|&s| {
            let s = s as f64;
            s * s
        })
        .sum();

    (sum_squares / samples.len() as f64).sqrt()
}

/// Convert an RMS level to dBFS. Zero energy has no finite level.
pub fn to_dbfs(rms: f64) -> Option<f64> {
    (rms > 0.0).then(|| 20.0 * rms.log10())
}
