use alloc::boxed::Box;
use alloc::vec::Vec;

use crate::consts::NUM_OUTPUTS;
use crate::generator::Generator;

/// Opaque handle identifying a voice added to a `Synth`. Handles are never
/// reused, so a handle to a reaped voice stays invalid.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct VoiceHandle(u64);

/// The mixer: owns every sounding voice and sums them into sample blocks.
///
/// Output is interleaved stereo `f32` at the given `sample_rate`. Samples are
/// not clipped; hosts scale or clamp for their output device.
pub struct Synth {
    sample_rate: f32,
    next_handle: u64,
    voices: Vec<ActiveVoice>,
}

struct ActiveVoice {
    handle: VoiceHandle,
    generator: Box<dyn Generator + Send>,
}

impl core::fmt::Debug for Synth {
    fn fmt(&self, f: &mut core::fmt::Formatter) -> core::fmt::Result {
        f.debug_struct("Synth")
            .field("sample_rate", &self.sample_rate)
            .field("active_voices", &self.voices.len())
            .finish()
    }
}

impl Synth {
    pub fn new(sample_rate: f32) -> Self {
        Synth {
            sample_rate,
            next_handle: 0,
            voices: Vec::new(),
        }
    }

    pub fn sample_rate(&self) -> f32 {
        self.sample_rate
    }

    /// Number of voices that have not died yet.
    pub fn active_voices(&self) -> usize {
        self.voices.len()
    }

    /// Start mixing `generator` from the next rendered frame on.
    pub fn add<G>(&mut self, generator: G) -> VoiceHandle
    where
        G: Generator + Send + 'static,
    {
        let handle = VoiceHandle(self.next_handle);
        self.next_handle += 1;
        self.voices.push(ActiveVoice {
            handle,
            generator: Box::new(generator),
        });

        handle
    }

    /// Release a voice. Returns `false` when it was already released or has
    /// been reaped.
    pub fn release(&mut self, handle: VoiceHandle) -> bool {
        match self.voices.iter_mut().find(|v| v.handle == handle) {
            Some(voice) if !voice.generator.is_released() => {
                log::trace!("releasing voice {:?}", handle);
                voice.generator.release();
                true
            }
            _ => false,
        }
    }

    /// Reaped voices count as released.
    pub fn is_released(&self, handle: VoiceHandle) -> bool {
        self.voices
            .iter()
            .find(|v| v.handle == handle)
            .map_or(true, |v| v.generator.is_released())
    }

    /// Overwrite `buffer` with the next `buffer.len() / 2` mixed stereo
    /// frames, then drop voices that died while rendering.
    pub fn render(&mut self, buffer: &mut [f32]) {
        let frames = buffer.len() / NUM_OUTPUTS;
        let buffer = &mut buffer[..frames * NUM_OUTPUTS];
        for sample in buffer.iter_mut() {
            *sample = 0.0;
        }

        for i in (0..self.voices.len()).rev() {
            self.voices[i].generator.generate(buffer);
            if !self.voices[i].generator.is_alive() {
                log::trace!("removing faded voice {:?}", self.voices[i].handle);
                self.voices.swap_remove(i);
            }
        }
    }

    /// Render `frames` stereo frames into a new buffer.
    pub fn generate(&mut self, frames: usize) -> Vec<f32> {
        let mut buffer = vec![0.0; frames * NUM_OUTPUTS];
        self.render(&mut buffer);
        buffer
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::generator::tests::Constant;
    use crate::generator::{Adsr, Envelope, Oscillator};

    fn short_envelope<G: Generator>(child: G) -> Envelope<G> {
        Envelope::new(
            child,
            Adsr {
                attack_amplitude: 1.0,
                sustain_amplitude: 0.5,
                attack_time: 4.0,
                decay_time: 8.0,
                release_time: 4.0,
            },
        )
    }

    #[test]
    fn mixes_by_summing() {
        let sample_rate = 44100.0;
        let mut synth = Synth::new(sample_rate);
        synth.add(Oscillator::sine(440.0, sample_rate));
        synth.add(Oscillator::square(100.0, 0.3, sample_rate));

        let mut sine = Oscillator::sine(440.0, sample_rate);
        let mut square = Oscillator::square(100.0, 0.3, sample_rate);

        for _ in 0..3 {
            let mixed = synth.generate(300);

            let mut expected_sine = vec![0.0; 600];
            sine.generate(&mut expected_sine);
            let mut expected_square = vec![0.0; 600];
            square.generate(&mut expected_square);

            for i in 0..600 {
                assert_eq!(mixed[i], expected_sine[i] + expected_square[i]);
            }
        }
        assert_eq!(synth.active_voices(), 2);
    }

    #[test]
    fn render_overwrites_target_span() {
        let mut synth = Synth::new(100.0);
        synth.add(Constant(0.25));

        let mut buffer = [9.0; 7];
        synth.render(&mut buffer[2..]);
        assert_eq!(buffer, [9.0, 9.0, 0.25, 0.25, 0.25, 0.25, 9.0]);
    }

    #[test]
    fn silence_without_voices() {
        let mut synth = Synth::new(100.0);
        let mut buffer = [1.0; 4];
        synth.render(&mut buffer);
        assert_eq!(buffer, [0.0; 4]);
        assert!(synth.generate(0).is_empty());
    }

    #[test]
    fn dead_voices_are_reaped() {
        let mut synth = Synth::new(100.0);
        let held = synth.add(short_envelope(Constant(1.0)));
        let released = synth.add(short_envelope(Constant(1.0)));

        synth.generate(10);
        assert!(synth.release(released));
        assert!(!synth.release(released));
        assert!(synth.is_released(released));
        assert!(!synth.is_released(held));

        // Dies during this block
        synth.generate(6);
        assert_eq!(synth.active_voices(), 1);
        assert!(synth.is_released(released));
        assert!(!synth.release(released));

        let buffer = synth.generate(2);
        assert_eq!(buffer, vec![0.5; 4]);
    }

    #[test]
    fn release_of_sustaining_voice() {
        let mut synth = Synth::new(100.0);
        let handle = synth.add(short_envelope(Constant(1.0)));
        synth.generate(8);

        synth.release(handle);
        let buffer = synth.generate(4);
        assert_eq!(buffer, vec![0.5, 0.5, 0.375, 0.375, 0.25, 0.25, 0.125, 0.125]);
        assert_eq!(synth.active_voices(), 0);
    }
}
