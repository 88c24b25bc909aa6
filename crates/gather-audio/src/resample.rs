//! Device-side sample conditioning: downmix and rate conversion.
//!
//! Microphones rarely run at 16 kHz mono; native capture converts on the
//! device thread before handing blocks to the pipeline. With `native-audio`
//! the conversion uses rubato's windowed-sinc resampler. The basic path
//! (anti-alias FIR, then linear interpolation) covers builds without it and
//! rubato construction failures.

#[cfg(feature = "native-audio")]
use rubato::{InterpolationParameters, InterpolationType, Resampler, SincFixedIn, WindowFunction};
use std::f32::consts::PI;

/// Upper bound on low-pass length for large decimation ratios.
const MAX_LOW_PASS_TAPS: usize = 257;

/// Input block size fed to the sinc resampler.
#[cfg(feature = "native-audio")]
const SINC_CHUNK: usize = 256;

/// Averages interleaved frames down to mono.
pub fn downmix_to_mono(interleaved: &[f32], channels: usize) -> Vec<f32> {
    if channels <= 1 {
        return interleaved.to_vec();
    }
    interleaved
        .chunks(channels)
        .map(|frame| frame.iter().sum::<f32>() / frame.len() as f32)
        .collect()
}

/// Streaming converter from the device rate to the capture rate.
pub struct MicResampler {
    engine: Engine,
}

enum Engine {
    Passthrough,
    #[cfg(feature = "native-audio")]
    Sinc {
        resampler: Box<SincFixedIn<f32>>,
        pending: Vec<f32>,
    },
    Basic {
        low_pass: Option<LowPass>,
        linear: LinearResampler,
    },
}

impl MicResampler {
    pub fn new(from_rate: u32, to_rate: u32) -> Self {
        if from_rate == to_rate || from_rate == 0 || to_rate == 0 {
            return Self {
                engine: Engine::Passthrough,
            };
        }

        #[cfg(feature = "native-audio")]
        {
            let ratio = f64::from(to_rate) / f64::from(from_rate);
            let params = InterpolationParameters {
                sinc_len: 64,
                f_cutoff: 0.90,
                interpolation: InterpolationType::Cubic,
                oversampling_factor: 256,
                window: WindowFunction::BlackmanHarris2,
            };
            match SincFixedIn::<f32>::new(ratio, 2.0, params, SINC_CHUNK, 1) {
                Ok(resampler) => {
                    return Self {
                        engine: Engine::Sinc {
                            resampler: Box::new(resampler),
                            pending: Vec::with_capacity(SINC_CHUNK * 2),
                        },
                    }
                }
                Err(e) => tracing::warn!(
                    error = ?e,
                    from_rate,
                    to_rate,
                    "sinc resampler unavailable, using basic resampling"
                ),
            }
        }

        Self::basic(from_rate, to_rate)
    }

    /// FIR low-pass (when decimating) followed by linear interpolation.
    fn basic(from_rate: u32, to_rate: u32) -> Self {
        let low_pass = (from_rate > to_rate).then(|| LowPass::new(from_rate, to_rate));
        Self {
            engine: Engine::Basic {
                low_pass,
                linear: LinearResampler::new(from_rate, to_rate),
            },
        }
    }

    /// Converts one block. Output length tracks the rate ratio across calls;
    /// the sinc engine holds back input until it has a full chunk.
    pub fn process(&mut self, input: &[f32]) -> Vec<f32> {
        match &mut self.engine {
            Engine::Passthrough => input.to_vec(),
            #[cfg(feature = "native-audio")]
            Engine::Sinc { resampler, pending } => {
                pending.extend_from_slice(input);
                let mut output = Vec::new();
                let mut consumed = 0;
                while pending.len() - consumed >= SINC_CHUNK {
                    let chunk = &pending[consumed..consumed + SINC_CHUNK];
                    match resampler.process(std::slice::from_ref(&chunk), None) {
                        Ok(mut produced) => {
                            if let Some(channel) = produced.pop() {
                                output.extend(channel);
                            }
                        }
                        Err(e) => tracing::warn!(error = ?e, "resampler dropped a chunk"),
                    }
                    consumed += SINC_CHUNK;
                }
                pending.drain(..consumed);
                output
            }
            Engine::Basic { low_pass, linear } => match low_pass {
                Some(filter) => linear.process(&filter.process(input)),
                None => linear.process(input),
            },
        }
    }
}

/// Windowed-sinc FIR low-pass with history carried across blocks.
struct LowPass {
    coeffs: Vec<f32>,
    history: Vec<f32>,
}

impl LowPass {
    /// Cuts off a little below the target Nyquist so the Blackman
    /// transition band ends before it.
    fn new(from_rate: u32, to_rate: u32) -> Self {
        let decimation = from_rate as f32 / to_rate as f32;
        let mut taps = ((decimation * 32.0).ceil() as usize).clamp(33, MAX_LOW_PASS_TAPS);
        if taps % 2 == 0 {
            taps += 1;
        }
        let cutoff = 0.42 * to_rate as f32 / from_rate as f32;
        Self {
            coeffs: design_low_pass(cutoff, taps),
            history: vec![0.0; taps - 1],
        }
    }

    fn process(&mut self, input: &[f32]) -> Vec<f32> {
        let taps = self.coeffs.len();
        let mut buffer = Vec::with_capacity(self.history.len() + input.len());
        buffer.extend_from_slice(&self.history);
        buffer.extend_from_slice(input);

        let output = (0..input.len())
            .map(|n| {
                buffer[n..n + taps]
                    .iter()
                    .zip(&self.coeffs)
                    .map(|(sample, coeff)| sample * coeff)
                    .sum()
            })
            .collect();

        self.history.clear();
        self.history
            .extend_from_slice(&buffer[buffer.len() - (taps - 1)..]);
        output
    }
}

/// Blackman-windowed sinc, normalized to unity DC gain. `cutoff` is in
/// cycles per sample.
fn design_low_pass(cutoff: f32, taps: usize) -> Vec<f32> {
    let middle = (taps - 1) as f32 / 2.0;
    let span = (taps - 1) as f32;
    let mut coeffs: Vec<f32> = (0..taps)
        .map(|i| {
            let x = i as f32 - middle;
            let sinc = if x == 0.0 {
                2.0 * cutoff
            } else {
                (2.0 * PI * cutoff * x).sin() / (PI * x)
            };
            let phase = 2.0 * PI * i as f32 / span;
            let window = 0.42 - 0.5 * phase.cos() + 0.08 * (2.0 * phase).cos();
            sinc * window
        })
        .collect();
    let sum: f32 = coeffs.iter().sum();
    if sum != 0.0 {
        coeffs.iter_mut().for_each(|c| *c /= sum);
    }
    coeffs
}

/// Streaming linear interpolator.
///
/// Keeps the last input sample and the fractional read position between
/// blocks so block boundaries do not introduce discontinuities.
#[derive(Debug, Clone)]
struct LinearResampler {
    step: f64,
    position: f64,
    previous: f32,
}

impl LinearResampler {
    fn new(from_rate: u32, to_rate: u32) -> Self {
        Self {
            step: f64::from(from_rate) / f64::from(to_rate),
            position: 0.0,
            previous: 0.0,
        }
    }

    fn process(&mut self, input: &[f32]) -> Vec<f32> {
        let Some(&last) = input.last() else {
            return Vec::new();
        };

        // Index 0 is the carried-over sample; input[k] sits at index k + 1.
        let at = |index: usize, previous: f32| -> f32 {
            if index == 0 {
                previous
            } else {
                input[index - 1]
            }
        };

        let last_index = input.len() as f64;
        let mut output = Vec::with_capacity((last_index / self.step).ceil() as usize + 1);
        while self.position < last_index {
            let base = self.position.floor();
            let frac = (self.position - base) as f32;
            let index = base as usize;
            let a = at(index, self.previous);
            let b = at(index + 1, self.previous);
            output.push(a + (b - a) * frac);
            self.position += self.step;
        }

        self.position -= last_index;
        self.previous = last;
        output
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sine(frequency: f32, rate: u32, len: usize) -> Vec<f32> {
        (0..len)
            .map(|n| 0.5 * (2.0 * PI * frequency * n as f32 / rate as f32).sin())
            .collect()
    }

    fn rms(samples: &[f32]) -> f32 {
        (samples.iter().map(|s| s * s).sum::<f32>() / samples.len() as f32).sqrt()
    }

    /// Feeds one second of `input` in 480-sample blocks.
    fn run(resampler: &mut MicResampler, input: &[f32]) -> Vec<f32> {
        input
            .chunks(480)
            .flat_map(|block| resampler.process(block))
            .collect()
    }

    #[test]
    fn downmix_averages_channels() {
        assert_eq!(downmix_to_mono(&[0.2, 0.4, -1.0, 1.0], 2), vec![0.3, 0.0]);
        assert_eq!(downmix_to_mono(&[0.5, 0.25], 1), vec![0.5, 0.25]);
    }

    #[test]
    fn same_rate_is_passthrough() {
        let mut resampler = MicResampler::new(16_000, 16_000);
        assert_eq!(resampler.process(&[0.1, 0.2]), vec![0.1, 0.2]);
    }

    #[test]
    fn basic_downsampling_produces_expected_length() {
        let mut resampler = MicResampler::basic(48_000, 16_000);
        let mut total = 0;
        for _ in 0..10 {
            total += resampler.process(&[0.0; 480]).len();
        }
        assert_eq!(total, 1600);
    }

    #[test]
    fn basic_downsampling_rejects_tones_above_target_nyquist() {
        let mut resampler = MicResampler::basic(48_000, 16_000);
        let output = run(&mut resampler, &sine(10_000.0, 48_000, 48_000));
        // Skip the filter warm-up.
        assert!(rms(&output[200..]) < 0.02, "rms = {}", rms(&output[200..]));
    }

    #[test]
    fn basic_downsampling_keeps_speech_band() {
        let mut resampler = MicResampler::basic(48_000, 16_000);
        let output = run(&mut resampler, &sine(1_000.0, 48_000, 48_000));
        let level = rms(&output[200..]);
        assert!((level - 0.354).abs() < 0.03, "rms = {}", level);
    }

    #[test]
    fn linear_interpolates_between_blocks() {
        let mut resampler = LinearResampler::new(1, 2);
        assert_eq!(resampler.process(&[1.0]), vec![0.0, 0.5]);
        assert_eq!(resampler.process(&[3.0]), vec![1.0, 2.0]);
    }

    #[test]
    fn low_pass_has_unity_dc_gain() {
        let mut filter = LowPass::new(48_000, 16_000);
        let output = filter.process(&[0.25; 400]);
        assert!((output[399] - 0.25).abs() < 1e-4);
    }

    #[cfg(feature = "native-audio")]
    #[test]
    fn sinc_downsampling_rejects_tones_above_target_nyquist() {
        let mut resampler = MicResampler::new(48_000, 16_000);
        assert!(matches!(resampler.engine, Engine::Sinc { .. }));

        let aliased = run(&mut resampler, &sine(10_000.0, 48_000, 48_000));
        assert!(aliased.len() > 15_000);
        assert!(rms(&aliased[500..]) < 0.05, "rms = {}", rms(&aliased[500..]));

        let mut resampler = MicResampler::new(48_000, 16_000);
        let speech = run(&mut resampler, &sine(1_000.0, 48_000, 48_000));
        assert!((rms(&speech[500..]) - 0.354).abs() < 0.03);
    }
}
