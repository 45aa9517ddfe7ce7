#![deny(clippy::all)]
#![deny(clippy::pedantic)]
#![allow(clippy::cast_possible_truncation, clippy::cast_precision_loss)]
#![forbid(unsafe_code)]

use colored::Colorize;
use error_iter::ErrorIter as _;
use log::info;
use riff_wave::{WaveWriter, WriteError};
use smfsynth::{Error as MidiError, MidiFile, ProgramTable, Sequencer};
use std::{fs::File, io::BufWriter, process::ExitCode};
use thiserror::Error;

const SAMPLE_RATE: u32 = 44100;
const BLOCK_FRAMES: usize = 4096;

#[derive(Debug, Error)]
pub enum Error {
    #[error("Missing mid-file argument\nUsage: writer <mid-file> <wav-file>")]
    MissingMidFilename,

    #[error("Missing wav-file argument\nUsage: writer <mid-file> <wav-file>")]
    MissingWavFilename,

    #[error("MIDI error")]
    Midi(#[from] MidiError),

    #[error("I/O error")]
    Io(#[from] std::io::Error),

    #[error("Wave writer error")]
    Writer(#[from] WriteError),
}

fn main() -> ExitCode {
    simple_logger::init_with_level(log::Level::Info).ok();

    match writer() {
        Err(e) => {
            eprintln!("{} {}", "error:".red(), e);

            for cause in e.sources().skip(1) {
                eprintln!("{} {}", "caused by:".bright_red(), cause);
            }

            ExitCode::FAILURE
        }
        Ok(()) => ExitCode::SUCCESS,
    }
}

fn writer() -> Result<(), Error> {
    let mut args = std::env::args().skip(1);
    let mid_filename = args.next().ok_or(Error::MissingMidFilename)?;
    let wav_filename = args.next().ok_or(Error::MissingWavFilename)?;

    // Parse the whole file before producing any audio
    let data = std::fs::read(&mid_filename)?;
    let midi = MidiFile::from_slice(&data)?;
    info!(
        "{}: {} tracks, {} ticks per beat",
        mid_filename,
        midi.tracks.len(),
        midi.header.ticks_per_beat
    );

    let programs = ProgramTable::default();
    let mut sequencer = Sequencer::new(&midi, &programs, SAMPLE_RATE as f32);

    // Write the wav file
    let file = File::create(wav_filename)?;
    let writer = BufWriter::new(file);
    let mut wave_writer = WaveWriter::new(2, SAMPLE_RATE, 16, writer)?;

    let mut frames = 0;
    let mut block = vec![0.0; BLOCK_FRAMES * 2];
    while !sequencer.finished() || sequencer.synth().active_voices() > 0 {
        sequencer.generate_into(&mut block);
        for sample in &block {
            let sample = (sample.clamp(-1.0, 1.0) * f32::from(i16::MAX)).round() as i16;
            wave_writer.write_sample_i16(sample)?;
        }
        frames += BLOCK_FRAMES;
    }
    info!(
        "wrote {:.1} seconds of audio",
        frames as f64 / f64::from(SAMPLE_RATE)
    );

    Ok(())
}
