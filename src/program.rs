use crate::consts::NUM_PROGRAMS;
use crate::generator::{Adsr, Envelope, Oscillator, Waveform};

/// A voice produced by a `Program`.
pub type Voice = Envelope<Oscillator>;

/// An instrument: builds one voice per note.
///
/// Amplitudes are for a full-velocity note and scale with `velocity / 128`.
/// Times are in seconds.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Program {
    pub waveform: Waveform,
    pub attack_amplitude: f32,
    pub sustain_amplitude: f32,
    pub attack_time: f32,
    pub decay_time: f32,
    pub release_time: f32,
}

impl Program {
    pub const PIANO: Program = Program {
        waveform: Waveform::Sine,
        attack_amplitude: 0.2,
        sustain_amplitude: 0.1,
        attack_time: 0.02,
        decay_time: 0.3,
        release_time: 0.02,
    };

    pub const STRINGS: Program = Program {
        waveform: Waveform::Sine,
        attack_amplitude: 0.5,
        sustain_amplitude: 0.2,
        attack_time: 0.4,
        decay_time: 0.8,
        release_time: 0.4,
    };

    /// Build the voice for `note` played at `velocity`.
    pub fn create_note(&self, note: u8, velocity: u8, sample_rate: f32) -> Voice {
        let velocity = f32::from(velocity) / 128.0;
        let oscillator = Oscillator::new(self.waveform, note_frequency(note), sample_rate);
        let adsr = Adsr::from_seconds(
            sample_rate,
            self.attack_amplitude * velocity,
            self.sustain_amplitude * velocity,
            self.attack_time,
            self.decay_time,
            self.release_time,
        );

        Envelope::new(oscillator, adsr)
    }
}

/// Get the frequency of a MIDI note number on the 12-TET scale, A4 = 440 Hz.
pub fn note_frequency(note: u8) -> f32 {
    440.0 * libm::powf(2.0, (f32::from(note) - 69.0) / 12.0)
}

/// Immutable mapping from program numbers to `Program`s. Unmapped numbers
/// resolve to the default program.
#[derive(Debug, Clone)]
pub struct ProgramTable {
    programs: [Option<Program>; NUM_PROGRAMS],
    default: Program,
}

impl ProgramTable {
    /// An empty table where every program number plays `default`.
    pub fn new(default: Program) -> Self {
        ProgramTable {
            programs: [None; NUM_PROGRAMS],
            default,
        }
    }

    /// Map `numbers` to `program`. Numbers outside `0..128` are ignored.
    pub fn with_program<I>(mut self, numbers: I, program: Program) -> Self
    where
        I: IntoIterator<Item = u8>,
    {
        for number in numbers {
            if let Some(slot) = self.programs.get_mut(number as usize) {
                *slot = Some(program);
            }
        }
        self
    }

    pub fn default_program(&self) -> &Program {
        &self.default
    }

    /// Look up a program number, falling back to the default program.
    pub fn get(&self, number: u8) -> &Program {
        match self.programs.get(number as usize) {
            Some(Some(program)) => program,
            _ => {
                log::trace!("program {} is unmapped, using default", number);
                &self.default
            }
        }
    }
}

impl Default for ProgramTable {
    /// Piano everywhere, strings on the string ensemble numbers.
    fn default() -> Self {
        ProgramTable::new(Program::PIANO)
            .with_program(41..=47, Program::STRINGS)
            .with_program([49, 50].iter().copied(), Program::STRINGS)
    }
}
