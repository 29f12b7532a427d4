/// Largest absolute sample value across all buffers
pub fn peak(buffers: &[&[f32]]) -> f32 {
    buffers.iter()
        .flat_map(|buffer| buffer.iter())
        .fold(0.0f32, |max, &sample| max.max(sample.abs()))
}

/// Scales all buffers together so their common peak equals `target`.
/// Silent input is left as is.
pub fn normalize_to(buffers: &mut [&mut [f32]], target: f32) {
    let max_abs = buffers.iter()
        .flat_map(|buffer| buffer.iter())
        .fold(0.0f32, |max, &sample| max.max(sample.abs()));

    if max_abs > 0.0 {
        let gain = target / max_abs;
        for buffer in buffers.iter_mut() {
            for sample in buffer.iter_mut() {
                *sample *= gain;
            }
        }
    }
}

/// Format a time value with appropriate unit suffix (ms, s)
pub fn format_time(time_in_seconds: f64) -> String {
    if time_in_seconds >= 1.0 {
        format!("{:.2} s", time_in_seconds)
    } else {
        format!("{:.0} ms", time_in_seconds * 1000.0)
    }
}
