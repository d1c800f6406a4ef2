use crate::error::ProcessError;

/// Direct-form-I biquad section with f64 state.
struct Biquad {
    b0: f64,
    b1: f64,
    b2: f64,
    a1: f64,
    a2: f64,
    x1: f64,
    x2: f64,
    y1: f64,
    y2: f64,
}

impl Biquad {
    fn new(b0: f64, b1: f64, b2: f64, a1: f64, a2: f64) -> Self {
        Self {
            b0,
            b1,
            b2,
            a1,
            a2,
            x1: 0.0,
            x2: 0.0,
            y1: 0.0,
            y2: 0.0,
        }
    }

    fn process(&mut self, x: f64) -> f64 {
        let y = self.b0 * x + self.b1 * self.x1 + self.b2 * self.x2
            - self.a1 * self.y1
            - self.a2 * self.y2;
        self.x2 = self.x1;
        self.x1 = x;
        self.y2 = self.y1;
        self.y1 = y;
        y
    }
}

/// First K-weighting stage: high-frequency shelving filter modelling the
/// acoustic effect of the head. Coefficients are redesigned for the given
/// rate from the 48 kHz prototype in BS.1770-4.
fn shelving_filter(sample_rate: f64) -> Biquad {
    let f0 = 1681.974450955533;
    let gain_db = 3.999843853973347;
    let q = 0.7071752369554196;

    let k = (std::f64::consts::PI * f0 / sample_rate).tan();
    let vh = 10.0f64.powf(gain_db / 20.0);
    let vb = vh.powf(0.4996667741545416);

    let a0 = 1.0 + k / q + k * k;
    Biquad::new(
        (vh + vb * k / q + k * k) / a0,
        2.0 * (k * k - vh) / a0,
        (vh - vb * k / q + k * k) / a0,
        2.0 * (k * k - 1.0) / a0,
        (1.0 - k / q + k * k) / a0,
    )
}

/// Second K-weighting stage: high-pass filter removing inaudible rumble.
fn highpass_filter(sample_rate: f64) -> Biquad {
    let f0 = 38.13547087602444;
    let q = 0.5003270373238773;

    let k = (std::f64::consts::PI * f0 / sample_rate).tan();
    let a0 = 1.0 + k / q + k * k;
    Biquad::new(
        1.0,
        -2.0,
        1.0,
        2.0 * (k * k - 1.0) / a0,
        (1.0 - k / q + k * k) / a0,
    )
}

const ABSOLUTE_GATE_LUFS: f64 = -70.0;
const RELATIVE_GATE_LU: f64 = 10.0;
const BLOCK_SECONDS: f64 = 0.4;

fn block_loudness(mean_square: f64) -> f64 {
    -0.691 + 10.0 * mean_square.max(1e-30).log10()
}

/// Integrated loudness (LUFS) of a mono interval per ITU-R BS.1770-4:
/// K-weighting, 400 ms blocks at 75 % overlap, absolute gate at −70 LUFS,
/// relative gate 10 LU below the ungated mean.
///
/// Intervals shorter than one gating block have no defined loudness.
pub fn integrated_lufs(samples: &[f32], sample_rate: u32) -> Result<f64, ProcessError> {
    let block = (BLOCK_SECONDS * sample_rate as f64).round() as usize;
    let hop = block / 4;
    if samples.len() < block || block == 0 {
        return Err(ProcessError::LoudnessUndefined);
    }

    let mut shelf = shelving_filter(sample_rate as f64);
    let mut highpass = highpass_filter(sample_rate as f64);
    let weighted: Vec<f64> = samples
        .iter()
        .map(|&s| highpass.process(shelf.process(s as f64)))
        .collect();

    let mut block_power = Vec::new();
    let mut start = 0;
    while start + block <= weighted.len() {
        let sum_sq: f64 = weighted[start..start + block].iter().map(|v| v * v).sum();
        block_power.push(sum_sq / block as f64);
        start += hop;
    }

    let above_absolute: Vec<f64> = block_power
        .iter()
        .copied()
        .filter(|&p| block_loudness(p) > ABSOLUTE_GATE_LUFS)
        .collect();
    if above_absolute.is_empty() {
        return Err(ProcessError::LoudnessUndefined);
    }

    let ungated_mean = above_absolute.iter().sum::<f64>() / above_absolute.len() as f64;
    let relative_gate = block_loudness(ungated_mean) - RELATIVE_GATE_LU;

    let gated: Vec<f64> = above_absolute
        .into_iter()
        .filter(|&p| block_loudness(p) > relative_gate)
        .collect();
    if gated.is_empty() {
        return Err(ProcessError::LoudnessUndefined);
    }

    let mean = gated.iter().sum::<f64>() / gated.len() as f64;
    Ok(block_loudness(mean))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sine(freq: f64, amplitude: f64, seconds: f64, sample_rate: u32) -> Vec<f32> {
        let n = (seconds * sample_rate as f64) as usize;
        (0..n)
            .map(|i| {
                (amplitude
                    * (2.0 * std::f64::consts::PI * freq * i as f64 / sample_rate as f64).sin())
                    as f32
            })
            .collect()
    }

    #[test]
    fn short_interval_is_undefined() {
        let samples = sine(1000.0, 0.5, 0.3, 22050);
        assert!(matches!(
            integrated_lufs(&samples, 22050),
            Err(ProcessError::LoudnessUndefined)
        ));
    }

    #[test]
    fn silence_is_undefined() {
        let samples = vec![0.0f32; 22050 * 2];
        assert!(matches!(
            integrated_lufs(&samples, 22050),
            Err(ProcessError::LoudnessUndefined)
        ));
    }

    #[test]
    fn gain_shift_moves_loudness_by_the_same_amount() {
        let sr = 22050;
        let loud = sine(1000.0, 0.1, 5.0, sr);
        let quiet: Vec<f32> = loud
            .iter()
            .map(|&s| s * 10.0f32.powf(-10.0 / 20.0))
            .collect();

        let l_loud = integrated_lufs(&loud, sr).unwrap();
        let l_quiet = integrated_lufs(&quiet, sr).unwrap();
        let drop = l_loud - l_quiet;
        assert!((drop - 10.0).abs() < 0.5, "drop was {drop}");
    }

    #[test]
    fn sine_loudness_is_in_a_sane_range() {
        // A 1 kHz sine at -20 dBFS should land near -23.7 LUFS
        // (-0.691 + 10*log10(amplitude^2 / 2)); K-weighting is roughly
        // flat at 1 kHz.
        let samples = sine(1000.0, 0.1, 5.0, 22050);
        let lufs = integrated_lufs(&samples, 22050).unwrap();
        assert!(lufs < -21.0 && lufs > -26.0, "lufs was {lufs}");
    }

    #[test]
    fn rate_independence_within_tolerance() {
        let a = integrated_lufs(&sine(997.0, 0.25, 4.0, 22050), 22050).unwrap();
        let b = integrated_lufs(&sine(997.0, 0.25, 4.0, 44100), 44100).unwrap();
        assert!((a - b).abs() < 0.3, "{a} vs {b}");
    }
}
