pub(crate) const NUM_CHANNELS: usize = 16;
pub(crate) const NUM_PROGRAMS: usize = 128;
pub(crate) const NUM_OUTPUTS: usize = 2;

pub(crate) const HEADER_CHUNK_ID: &[u8; 4] = b"MThd";
pub(crate) const TRACK_CHUNK_ID: &[u8; 4] = b"MTrk";
pub(crate) const HEADER_LENGTH: u32 = 6;
pub(crate) const SMPTE_DIVISION_FLAG: u16 = 0x8000;

// Meta event subtypes
pub(crate) const META_SEQUENCE_NUMBER: u8 = 0x00;
pub(crate) const META_TEXT: u8 = 0x01;
pub(crate) const META_COPYRIGHT_NOTICE: u8 = 0x02;
pub(crate) const META_TRACK_NAME: u8 = 0x03;
pub(crate) const META_INSTRUMENT_NAME: u8 = 0x04;
pub(crate) const META_LYRICS: u8 = 0x05;
pub(crate) const META_MARKER: u8 = 0x06;
pub(crate) const META_CUE_POINT: u8 = 0x07;
pub(crate) const META_MIDI_CHANNEL_PREFIX: u8 = 0x20;
pub(crate) const META_END_OF_TRACK: u8 = 0x2f;
pub(crate) const META_SET_TEMPO: u8 = 0x51;
pub(crate) const META_SMPTE_OFFSET: u8 = 0x54;
pub(crate) const META_TIME_SIGNATURE: u8 = 0x58;
pub(crate) const META_KEY_SIGNATURE: u8 = 0x59;
pub(crate) const META_SEQUENCER_SPECIFIC: u8 = 0x7f;

pub(crate) const STATUS_META: u8 = 0xff;
pub(crate) const STATUS_SYSEX: u8 = 0xf0;
pub(crate) const STATUS_DIVIDED_SYSEX: u8 = 0xf7;

/// 120 BPM
pub(crate) const DEFAULT_MICROSECONDS_PER_BEAT: u32 = 500_000;
pub(crate) const MICROSECONDS_PER_MINUTE: f64 = 60_000_000.0;
