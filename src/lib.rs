//! Standard MIDI File playback through a small polyphonic additive synth.
//!
//! Parse a file once with [`MidiFile::from_slice`], then create a
//! [`Sequencer`] per playback session and pull interleaved stereo blocks from
//! it with [`Sequencer::generate`], or iterate it frame by frame.

#![cfg_attr(all(not(feature = "std"), not(test)), no_std)]

#[macro_use]
extern crate alloc;

mod consts;
mod generator;
mod midi;
mod program;
mod reader;
mod sequencer;
mod synth;

pub use generator::{Adsr, Envelope, Generator, Oscillator, Waveform};
pub use midi::{
    ChannelEvent, ChannelMessage, Error, Event, EventKind, Header, MetaEvent, MidiFile, Track,
};
pub use program::{note_frequency, Program, ProgramTable, Voice};
pub use reader::Reader;
pub use sequencer::Sequencer;
pub use synth::{Synth, VoiceHandle};
