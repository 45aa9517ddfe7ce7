use alloc::vec::Vec;

#[cfg(feature = "std")]
use thiserror::Error;

use crate::consts::*;
use crate::reader::Reader;

/// Possible errors.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "std", derive(Error))]
pub enum Error {
    #[cfg_attr(
        feature = "std",
        error("Unexpected end of data at offset {offset} (needed {needed} bytes)")
    )]
    UnexpectedEof { offset: usize, needed: usize },

    #[cfg_attr(feature = "std", error("Bad .mid file - header not found"))]
    InvalidHeader,

    #[cfg_attr(feature = "std", error("Ticks per beat must be non-zero"))]
    ZeroTicksPerBeat,

    #[cfg_attr(
        feature = "std",
        error("Expressing time division in SMPTE frames is not supported")
    )]
    SmpteTimeDivision,

    #[cfg_attr(feature = "std", error("Unexpected chunk - expected MTrk, got {0:?}"))]
    UnexpectedChunk([u8; 4]),

    #[cfg_attr(
        feature = "std",
        error("Expected length for meta event {subtype:#04x} is {expected}, got {actual}")
    )]
    MetaLength {
        subtype: u8,
        expected: u32,
        actual: u32,
    },

    #[cfg_attr(feature = "std", error("Unrecognised MIDI event type byte: {0:#04x}"))]
    UnrecognisedEventType(u8),

    #[cfg_attr(feature = "std", error("Unrecognised MIDI event type: {0:#x}"))]
    UnrecognisedChannelEvent(u8),

    #[cfg_attr(feature = "std", error("Running status without a preceding status byte"))]
    MissingRunningStatus,
}

/// A parsed Standard MIDI File. Immutable once built; any number of
/// [`Sequencer`](crate::Sequencer)s may play it at the same time.
#[derive(Debug, Clone, PartialEq)]
pub struct MidiFile {
    pub header: Header,
    pub tracks: Vec<Track>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Header {
    pub format_type: u16,
    pub track_count: u16,
    pub ticks_per_beat: u16,
}

/// Events in file order. Delta times are relative to the previous event.
pub type Track = Vec<Event>;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Event {
    pub delta_time: u32,
    pub kind: EventKind,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EventKind {
    Meta(MetaEvent),
    SysEx(Vec<u8>),
    DividedSysEx(Vec<u8>),
    Channel(ChannelEvent),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MetaEvent {
    SequenceNumber(u16),
    Text(Vec<u8>),
    CopyrightNotice(Vec<u8>),
    TrackName(Vec<u8>),
    InstrumentName(Vec<u8>),
    Lyrics(Vec<u8>),
    Marker(Vec<u8>),
    CuePoint(Vec<u8>),
    MidiChannelPrefix(u8),
    EndOfTrack,
    SetTempo {
        microseconds_per_beat: u32,
    },
    SmpteOffset {
        frame_rate: u8,
        hour: u8,
        min: u8,
        sec: u8,
        frame: u8,
        subframe: u8,
    },
    TimeSignature {
        numerator: u8,
        /// Denominator as a power of two, as stored in the file.
        denominator_exponent: u8,
        metronome: u8,
        thirty_seconds: u8,
    },
    KeySignature {
        key: i8,
        scale: u8,
    },
    SequencerSpecific(Vec<u8>),
    Unknown {
        subtype: u8,
        data: Vec<u8>,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChannelEvent {
    pub channel: u8,
    pub message: ChannelMessage,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChannelMessage {
    NoteOff { note: u8, velocity: u8 },
    NoteOn { note: u8, velocity: u8 },
    NoteAftertouch { note: u8, amount: u8 },
    Controller { controller: u8, value: u8 },
    ProgramChange { program: u8 },
    ChannelAftertouch { amount: u8 },
    /// 14-bit value, 0x2000 is centered.
    PitchBend { value: u16 },
}

impl MetaEvent {
    /// Time signature denominator, e.g. `4` for 3/4 time.
    pub fn denominator(&self) -> Option<u32> {
        match self {
            MetaEvent::TimeSignature {
                denominator_exponent,
                ..
            } => 1_u32.checked_shl(u32::from(*denominator_exponent)),
            _ => None,
        }
    }
}

impl MidiFile {
    /// Parse a `MidiFile` from a byte slice.
    ///
    /// ```no_run
    /// # fn load() -> Result<(), smfsynth::Error> {
    /// let midi = smfsynth::MidiFile::from_slice(&std::fs::read("song.mid").unwrap())?;
    /// # Ok(())
    /// # }
    /// ```
    pub fn from_slice(slice: &[u8]) -> Result<MidiFile, Error> {
        let mut stream = Reader::new(slice);

        let (id, data) = read_chunk(&mut stream)?;
        if &id != HEADER_CHUNK_ID || data.len() != HEADER_LENGTH as usize {
            return Err(Error::InvalidHeader);
        }
        let header = read_header(data)?;

        // Running status carries over from one track chunk to the next
        let mut running_status = None;
        let mut tracks = Vec::with_capacity(header.track_count as usize);
        for _ in 0..header.track_count {
            let (id, data) = read_chunk(&mut stream)?;
            if &id != TRACK_CHUNK_ID {
                return Err(Error::UnexpectedChunk(id));
            }
            tracks.push(read_track(data, &mut running_status)?);
        }

        log::debug!(
            "parsed midi file: format {}, {} tracks, {} ticks per beat",
            header.format_type,
            header.track_count,
            header.ticks_per_beat
        );

        Ok(MidiFile { header, tracks })
    }

    /// Length of the longest track, in ticks.
    pub fn duration_ticks(&self) -> u64 {
        self.tracks
            .iter()
            .map(|track| track.iter().map(|e| u64::from(e.delta_time)).sum())
            .max()
            .unwrap_or(0)
    }
}

/// Read a chunk id and its length-prefixed payload.
fn read_chunk<'a>(stream: &mut Reader<'a>) -> Result<([u8; 4], &'a [u8]), Error> {
    let mut id = [0; 4];
    id.copy_from_slice(stream.read(4)?);
    let length = stream.read_u32()? as usize;

    Ok((id, stream.read(length)?))
}

fn read_header(data: &[u8]) -> Result<Header, Error> {
    let mut stream = Reader::new(data);
    let format_type = stream.read_u16()?;
    let track_count = stream.read_u16()?;
    let time_division = stream.read_u16()?;

    if time_division & SMPTE_DIVISION_FLAG != 0 {
        return Err(Error::SmpteTimeDivision);
    }
    if time_division == 0 {
        return Err(Error::ZeroTicksPerBeat);
    }

    Ok(Header {
        format_type,
        track_count,
        ticks_per_beat: time_division,
    })
}

fn read_track(data: &[u8], running_status: &mut Option<u8>) -> Result<Track, Error> {
    let mut stream = Reader::new(data);
    let mut track = Vec::new();

    while !stream.eof() {
        track.push(read_event(&mut stream, running_status)?);
    }

    Ok(track)
}

fn read_event(stream: &mut Reader, running_status: &mut Option<u8>) -> Result<Event, Error> {
    let delta_time = stream.read_var_int()?;
    let status = stream.read_u8()?;

    let kind = if status & 0xf0 == 0xf0 {
        match status {
            STATUS_META => EventKind::Meta(read_meta_event(stream)?),
            STATUS_SYSEX => EventKind::SysEx(read_length_prefixed(stream)?),
            STATUS_DIVIDED_SYSEX => EventKind::DividedSysEx(read_length_prefixed(stream)?),
            _ => return Err(Error::UnrecognisedEventType(status)),
        }
    } else {
        // Without the high bit this is the first data byte of an event that
        // reuses the previous channel status.
        let (status, param1) = if status & 0x80 == 0 {
            (running_status.ok_or(Error::MissingRunningStatus)?, status)
        } else {
            *running_status = Some(status);
            (status, stream.read_u8()?)
        };
        EventKind::Channel(read_channel_event(stream, status, param1)?)
    };

    Ok(Event { delta_time, kind })
}

fn read_length_prefixed(stream: &mut Reader) -> Result<Vec<u8>, Error> {
    let length = stream.read_var_int()?;
    read_data(stream, length)
}

fn read_meta_event(stream: &mut Reader) -> Result<MetaEvent, Error> {
    let subtype = stream.read_u8()?;
    let length = stream.read_var_int()?;

    let expect_length = |expected: u32| -> Result<(), Error> {
        if length == expected {
            Ok(())
        } else {
            Err(Error::MetaLength {
                subtype,
                expected,
                actual: length,
            })
        }
    };

    Ok(match subtype {
        META_TEXT => MetaEvent::Text(read_data(stream, length)?),
        META_COPYRIGHT_NOTICE => MetaEvent::CopyrightNotice(read_data(stream, length)?),
        META_TRACK_NAME => MetaEvent::TrackName(read_data(stream, length)?),
        META_INSTRUMENT_NAME => MetaEvent::InstrumentName(read_data(stream, length)?),
        META_LYRICS => MetaEvent::Lyrics(read_data(stream, length)?),
        META_MARKER => MetaEvent::Marker(read_data(stream, length)?),
        META_CUE_POINT => MetaEvent::CuePoint(read_data(stream, length)?),
        META_SEQUENCER_SPECIFIC => MetaEvent::SequencerSpecific(read_data(stream, length)?),
        META_SEQUENCE_NUMBER => {
            expect_length(2)?;
            MetaEvent::SequenceNumber(stream.read_u16()?)
        }
        META_MIDI_CHANNEL_PREFIX => {
            expect_length(1)?;
            MetaEvent::MidiChannelPrefix(stream.read_u8()?)
        }
        META_END_OF_TRACK => {
            expect_length(0)?;
            MetaEvent::EndOfTrack
        }
        META_SET_TEMPO => {
            expect_length(3)?;
            MetaEvent::SetTempo {
                microseconds_per_beat: stream.read_u24()?,
            }
        }
        META_SMPTE_OFFSET => {
            expect_length(5)?;
            let hour_byte = stream.read_u8()?;
            let frame_rate = match hour_byte & 0x60 {
                0x00 => 24,
                0x20 => 25,
                0x40 => 29,
                _ => 30,
            };
            MetaEvent::SmpteOffset {
                frame_rate,
                hour: hour_byte & 0x1f,
                min: stream.read_u8()?,
                sec: stream.read_u8()?,
                frame: stream.read_u8()?,
                subframe: stream.read_u8()?,
            }
        }
        META_TIME_SIGNATURE => {
            expect_length(4)?;
            MetaEvent::TimeSignature {
                numerator: stream.read_u8()?,
                denominator_exponent: stream.read_u8()?,
                metronome: stream.read_u8()?,
                thirty_seconds: stream.read_u8()?,
            }
        }
        META_KEY_SIGNATURE => {
            expect_length(2)?;
            MetaEvent::KeySignature {
                key: stream.read_i8()?,
                scale: stream.read_u8()?,
            }
        }
        _ => {
            log::trace!("unrecognised meta event subtype {:#04x}", subtype);
            MetaEvent::Unknown {
                subtype,
                data: read_data(stream, length)?,
            }
        }
    })
}

fn read_data(stream: &mut Reader, length: u32) -> Result<Vec<u8>, Error> {
    Ok(stream.read(length as usize)?.to_vec())
}

fn read_channel_event(stream: &mut Reader, status: u8, param1: u8) -> Result<ChannelEvent, Error> {
    let event_type = status >> 4;
    let channel = status & 0x0f;

    let message = match event_type {
        0x08 => ChannelMessage::NoteOff {
            note: param1,
            velocity: stream.read_u8()?,
        },
        0x09 => {
            let velocity = stream.read_u8()?;
            if velocity == 0 {
                ChannelMessage::NoteOff {
                    note: param1,
                    velocity,
                }
            } else {
                ChannelMessage::NoteOn {
                    note: param1,
                    velocity,
                }
            }
        }
        0x0a => ChannelMessage::NoteAftertouch {
            note: param1,
            amount: stream.read_u8()?,
        },
        0x0b => ChannelMessage::Controller {
            controller: param1,
            value: stream.read_u8()?,
        },
        0x0c => ChannelMessage::ProgramChange { program: param1 },
        0x0d => ChannelMessage::ChannelAftertouch { amount: param1 },
        0x0e => ChannelMessage::PitchBend {
            value: u16::from(param1) | u16::from(stream.read_u8()?) << 7,
        },
        _ => return Err(Error::UnrecognisedChannelEvent(event_type)),
    };

    Ok(ChannelEvent { channel, message })
}
