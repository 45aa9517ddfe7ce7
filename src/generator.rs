use alloc::vec::Vec;
use core::f64::consts::PI;

use crate::consts::NUM_OUTPUTS;

/// A sound source that mixes interleaved stereo frames into a buffer.
pub trait Generator {
    /// Add `buffer.len() / 2` stereo frames into `buffer`. Existing contents
    /// are kept, so several generators can share one buffer.
    fn generate(&mut self, buffer: &mut [f32]);

    /// `false` once the generator will never produce sound again.
    fn is_alive(&self) -> bool;

    /// Begin the release phase. Calling it again has no effect.
    fn release(&mut self) {}

    fn is_released(&self) -> bool {
        false
    }
}

/// Available wave forms.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Waveform {
    Sine,
    /// Square wave; `duty` is the fraction of each period spent at `-1.0`.
    Square { duty: f32 },
}

/// A periodic oscillator with its own sample counter. Never dies on its own.
#[derive(Debug, Clone)]
pub struct Oscillator {
    waveform: Waveform,
    period: f64,
    t: u64,
}

impl Oscillator {
    pub fn new(waveform: Waveform, frequency: f32, sample_rate: f32) -> Self {
        Oscillator {
            waveform,
            period: f64::from(sample_rate) / f64::from(frequency),
            t: 0,
        }
    }

    pub fn sine(frequency: f32, sample_rate: f32) -> Self {
        Self::new(Waveform::Sine, frequency, sample_rate)
    }

    pub fn square(frequency: f32, duty: f32, sample_rate: f32) -> Self {
        Self::new(Waveform::Square { duty }, frequency, sample_rate)
    }

    fn next_sample(&mut self) -> f32 {
        let phase = self.t as f64 / self.period;
        self.t += 1;

        match self.waveform {
            Waveform::Sine => libm::sin(phase * 2.0 * PI) as f32,
            Waveform::Square { duty } => {
                if phase - libm::floor(phase) > f64::from(duty) {
                    1.0
                } else {
                    -1.0
                }
            }
        }
    }
}

impl Generator for Oscillator {
    fn generate(&mut self, buffer: &mut [f32]) {
        for frame in buffer.chunks_exact_mut(NUM_OUTPUTS) {
            let sample = self.next_sample();
            for out in frame {
                *out += sample;
            }
        }
    }

    fn is_alive(&self) -> bool {
        true
    }
}

/// Envelope shape. Times are in samples; `decay_time` is measured from the
/// start of the note, not from the end of the attack.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Adsr {
    pub attack_amplitude: f32,
    pub sustain_amplitude: f32,
    pub attack_time: f64,
    pub decay_time: f64,
    pub release_time: f64,
}

impl Adsr {
    /// Build an envelope from durations in seconds. `decay` is the length of
    /// the decay phase alone.
    pub fn from_seconds(
        sample_rate: f32,
        attack_amplitude: f32,
        sustain_amplitude: f32,
        attack: f32,
        decay: f32,
        release: f32,
    ) -> Self {
        let sample_rate = f64::from(sample_rate);
        Adsr {
            attack_amplitude,
            sustain_amplitude,
            attack_time: sample_rate * f64::from(attack),
            decay_time: sample_rate * (f64::from(attack) + f64::from(decay)),
            release_time: sample_rate * f64::from(release),
        }
    }
}

/// Attack-decay-sustain-release gain applied to a child generator.
///
/// Gain ramps linearly from zero to `attack_amplitude` over the attack, then
/// to `sustain_amplitude` by `decay_time`, and holds there until released.
/// Release ramps from `sustain_amplitude` to zero over `release_time`
/// samples, after which the envelope is dead.
#[derive(Debug, Clone)]
pub struct Envelope<G> {
    child: G,
    adsr: Adsr,
    decay_rate: f64,
    release_rate: f64,
    released_at: Option<u64>,
    end_time: f64,
    t: u64,

    // Child output for the current block
    scratch: Vec<f32>,
}

impl<G: Generator> Envelope<G> {
    pub fn new(child: G, adsr: Adsr) -> Self {
        let decay_rate = f64::from(adsr.attack_amplitude - adsr.sustain_amplitude)
            / (adsr.decay_time - adsr.attack_time);
        let release_rate = f64::from(adsr.sustain_amplitude) / adsr.release_time;

        Envelope {
            child,
            adsr,
            decay_rate,
            release_rate,
            released_at: None,
            end_time: f64::INFINITY,
            t: 0,
            scratch: Vec::new(),
        }
    }

    /// Gain that will be applied to the next frame.
    pub fn gain(&self) -> f32 {
        let t = self.t as f64;
        let adsr = &self.adsr;

        match self.released_at {
            Some(_) if t >= self.end_time => 0.0,
            Some(released_at) => {
                let elapsed = t - released_at as f64;
                (f64::from(adsr.sustain_amplitude) - self.release_rate * elapsed) as f32
            }
            None if t < adsr.attack_time => {
                (f64::from(adsr.attack_amplitude) * t / adsr.attack_time) as f32
            }
            None if t < adsr.decay_time => {
                let elapsed = t - adsr.attack_time;
                (f64::from(adsr.attack_amplitude) - self.decay_rate * elapsed) as f32
            }
            None => adsr.sustain_amplitude,
        }
    }

    /// Number of frames produced so far.
    pub fn position(&self) -> u64 {
        self.t
    }
}

impl<G: Generator> Generator for Envelope<G> {
    fn generate(&mut self, buffer: &mut [f32]) {
        if !self.is_alive() {
            return;
        }

        self.scratch.clear();
        self.scratch.resize(buffer.len(), 0.0);
        self.child.generate(&mut self.scratch);

        let frames = buffer
            .chunks_exact_mut(NUM_OUTPUTS)
            .zip(self.scratch.chunks_exact(NUM_OUTPUTS));
        for (out, input) in frames {
            if (self.t as f64) >= self.end_time {
                break;
            }
            let gain = self.gain();
            for (out, input) in out.iter_mut().zip(input) {
                *out += input * gain;
            }
            self.t += 1;
        }
    }

    fn is_alive(&self) -> bool {
        (self.t as f64) < self.end_time
    }

    fn release(&mut self) {
        if self.released_at.is_some() {
            return;
        }
        self.released_at = Some(self.t);
        self.end_time = self.t as f64 + self.adsr.release_time;
        self.child.release();
    }

    fn is_released(&self) -> bool {
        self.released_at.is_some()
    }
}
