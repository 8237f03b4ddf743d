use crate::error::{DemodError, Result};
use std::f32::consts::PI;

/// Estimate signal power at `target_freq` over a window of raw ADC samples
/// using the Goertzel algorithm (single-bin DFT magnitude squared).
///
/// Only two known frequencies ever need testing here, so a second-order
/// recursive filter beats a full transform: O(n) with one multiply per
/// sample plus two at the end, and no window storage.
///
/// The result is unnormalized, in raw sample-amplitude² units; compare it
/// only against a threshold calibrated in the same units. Samples are taken
/// as-is, DC bias included - a constant offset leaks a small amount of
/// energy into every bin, which the threshold has to absorb.
pub fn tone_power(samples: &[u16], target_freq: f32, sample_rate: f32) -> Result<f32> {
    if samples.is_empty() {
        return Err(DemodError::InvalidInput("empty sample window".into()));
    }
    if sample_rate <= 0.0 {
        return Err(DemodError::InvalidInput(format!(
            "sample rate must be positive, got {sample_rate}"
        )));
    }
    if target_freq <= 0.0 {
        return Err(DemodError::InvalidInput(format!(
            "target frequency must be positive, got {target_freq}"
        )));
    }

    let omega = 2.0 * PI * target_freq / sample_rate;
    let coeff = 2.0 * omega.cos();

    let mut s1 = 0.0f32;
    let mut s2 = 0.0f32;
    for &sample in samples {
        let s0 = sample as f32 + coeff * s1 - s2;
        s2 = s1;
        s1 = s0;
    }

    Ok(s2 * s2 + s1 * s1 - coeff * s1 * s2)
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE_RATE: f32 = 9600.0;
    const WINDOW: usize = 300;

    /// Sine at `freq` biased to a 12-bit ADC midscale, like the captures the
    /// demodulator sees.
    fn tone(freq: f32, amplitude: f32, n: usize) -> Vec<u16> {
        (0..n)
            .map(|i| {
                let t = i as f32 / SAMPLE_RATE;
                (2048.0 + amplitude * (2.0 * PI * freq * t).sin()) as u16
            })
            .collect()
    }

    #[test]
    fn test_tone_discrimination() {
        let samples = tone(1100.0, 1000.0, WINDOW);

        let at_tone = tone_power(&samples, 1100.0, SAMPLE_RATE).unwrap();
        let off_tone = tone_power(&samples, 2200.0, SAMPLE_RATE).unwrap();

        assert!(
            at_tone > off_tone * 10.0,
            "power at tone ({at_tone}) should dominate power off tone ({off_tone})"
        );
    }

    #[test]
    fn test_power_scales_with_amplitude() {
        let quiet = tone(1100.0, 100.0, WINDOW);
        let loud = tone(1100.0, 1000.0, WINDOW);

        let p_quiet = tone_power(&quiet, 1100.0, SAMPLE_RATE).unwrap();
        let p_loud = tone_power(&loud, 1100.0, SAMPLE_RATE).unwrap();

        assert!(p_loud > p_quiet * 10.0);
    }

    #[test]
    fn test_dc_offset_preserves_power_ordering() {
        // A DC shift leaks a little energy everywhere, so assert the
        // ordering between on-tone and off-tone power, not exact equality.
        for dc in [1024.0, 2048.0, 3000.0] {
            let samples: Vec<u16> = (0..WINDOW)
                .map(|i| {
                    let t = i as f32 / SAMPLE_RATE;
                    (dc + 800.0 * (2.0 * PI * 1100.0 * t).sin()) as u16
                })
                .collect();

            let at_tone = tone_power(&samples, 1100.0, SAMPLE_RATE).unwrap();
            let off_tone = tone_power(&samples, 2200.0, SAMPLE_RATE).unwrap();
            assert!(
                at_tone > off_tone,
                "ordering broke at dc={dc}: {at_tone} vs {off_tone}"
            );
        }
    }

    #[test]
    fn test_invalid_inputs_rejected() {
        let samples = tone(1100.0, 500.0, WINDOW);

        assert!(tone_power(&[], 1100.0, SAMPLE_RATE).is_err());
        assert!(tone_power(&samples, 0.0, SAMPLE_RATE).is_err());
        assert!(tone_power(&samples, -1100.0, SAMPLE_RATE).is_err());
        assert!(tone_power(&samples, 1100.0, 0.0).is_err());
        assert!(tone_power(&samples, 1100.0, -9600.0).is_err());
    }
}
