use alloc::collections::BTreeMap;
use alloc::vec::Vec;
use arrayvec::ArrayVec;

use crate::consts::*;
use crate::midi::{ChannelEvent, ChannelMessage, Event, EventKind, MetaEvent, MidiFile};
use crate::program::{Program, ProgramTable};
use crate::synth::{Synth, VoiceHandle};

/// Voice bookkeeping for one of the 16 MIDI channels.
#[derive(Debug)]
struct Channel {
    voices: BTreeMap<u8, VoiceHandle>,
    program: Program,
}

impl Channel {
    fn new(program: Program) -> Self {
        Channel {
            voices: BTreeMap::new(),
            program,
        }
    }

    fn note_on(&mut self, synth: &mut Synth, note: u8, velocity: u8) {
        // Playing the same note again before releasing the last one
        if let Some(&handle) = self.voices.get(&note) {
            synth.release(handle);
        }

        let voice = self.program.create_note(note, velocity, synth.sample_rate());
        let handle = synth.add(voice);
        self.voices.insert(note, handle);
    }

    fn note_off(&mut self, synth: &mut Synth, note: u8) {
        if let Some(handle) = self.voices.remove(&note) {
            synth.release(handle);
        }
    }

    fn set_program(&mut self, programs: &ProgramTable, number: u8) {
        self.program = *programs.get(number);
    }
}

/// Playback position within one track.
#[derive(Debug, Clone, Copy)]
struct TrackCursor {
    next_event_index: usize,
    /// `None` once the track is exhausted.
    ticks_to_next_event: Option<u64>,
}

/// Plays a `MidiFile` through a `Synth`, one pulled block at a time.
///
/// The sequencer merges all tracks into a single timeline, converts ticks to
/// samples with the current tempo, and applies each event exactly at its
/// sample position inside the requested block. Create a new sequencer to
/// restart playback.
///
/// `Sequencer` also implements `Iterator`, yielding one stereo frame at a time
/// until the piece is finished and every voice has faded out.
///
/// ```rust
/// use smfsynth::{MidiFile, ProgramTable, Sequencer};
///
/// # fn play(midi: &MidiFile) {
/// let programs = ProgramTable::default();
/// let mut sequencer = Sequencer::new(midi, &programs, 44100.0);
/// while !sequencer.finished() {
///     let block = sequencer.generate(4096);
///     // Hand `block` to the audio device
/// #   assert_eq!(block.len(), 8192);
/// }
/// # }
/// ```
#[derive(Debug)]
pub struct Sequencer<'a> {
    midi: &'a MidiFile,
    programs: &'a ProgramTable,
    synth: Synth,
    channels: ArrayVec<[Channel; NUM_CHANNELS]>,

    // Iterator state
    cursors: Vec<TrackCursor>,
    microseconds_per_beat: u32,
    pending: Option<&'a Event>,
    samples_to_next_event: Option<f64>,
    finished: bool,
}

impl<'a> Sequencer<'a> {
    pub fn new(midi: &'a MidiFile, programs: &'a ProgramTable, sample_rate: f32) -> Self {
        let cursors = midi
            .tracks
            .iter()
            .map(|track| TrackCursor {
                next_event_index: 0,
                ticks_to_next_event: track.first().map(|e| u64::from(e.delta_time)),
            })
            .collect();

        let mut channels = ArrayVec::new();
        for _ in 0..NUM_CHANNELS {
            channels.push(Channel::new(*programs.default_program()));
        }

        let mut sequencer = Sequencer {
            midi,
            programs,
            synth: Synth::new(sample_rate),
            channels,
            cursors,
            microseconds_per_beat: DEFAULT_MICROSECONDS_PER_BEAT,
            pending: None,
            samples_to_next_event: Some(0.0),
            finished: false,
        };
        sequencer.advance();

        sequencer
    }

    /// True once every event has been consumed. Released voices may still
    /// be ringing; they keep sounding in subsequent blocks.
    pub fn finished(&self) -> bool {
        self.finished
    }

    pub fn microseconds_per_beat(&self) -> u32 {
        self.microseconds_per_beat
    }

    pub fn synth(&self) -> &Synth {
        &self.synth
    }

    /// Render exactly `frames` interleaved stereo frames.
    pub fn generate(&mut self, frames: usize) -> Vec<f32> {
        let mut buffer = vec![0.0; frames * NUM_OUTPUTS];
        self.generate_into(&mut buffer);
        buffer
    }

    /// Fill `buffer` with `buffer.len() / 2` interleaved stereo frames,
    /// applying every event that falls inside the block.
    pub fn generate_into(&mut self, buffer: &mut [f32]) {
        let mut remaining = buffer.len() / NUM_OUTPUTS;
        let mut offset = 0;

        loop {
            match self.samples_to_next_event {
                Some(samples) if samples <= remaining as f64 => {
                    let count = libm::ceil(samples).max(0.0) as usize;
                    if count > 0 {
                        let end = offset + count;
                        self.synth
                            .render(&mut buffer[offset * NUM_OUTPUTS..end * NUM_OUTPUTS]);
                        offset = end;
                        remaining -= count;
                        self.samples_to_next_event = Some(samples - count as f64);
                    }

                    self.handle_event();
                    self.advance();
                }
                _ => {
                    if remaining > 0 {
                        let end = offset + remaining;
                        self.synth
                            .render(&mut buffer[offset * NUM_OUTPUTS..end * NUM_OUTPUTS]);
                        if let Some(samples) = self.samples_to_next_event.as_mut() {
                            *samples -= remaining as f64;
                        }
                    }
                    break;
                }
            }
        }
    }

    /// Select the next event across all tracks and schedule it.
    fn advance(&mut self) {
        // `min_by_key` keeps the first minimum, so ties go to the lowest track.
        let next = self
            .cursors
            .iter()
            .enumerate()
            .filter_map(|(i, cursor)| cursor.ticks_to_next_event.map(|ticks| (i, ticks)))
            .min_by_key(|&(_, ticks)| ticks);

        let (track, ticks) = match next {
            Some(next) => next,
            None => {
                if !self.finished {
                    log::debug!("sequencer finished");
                }
                self.pending = None;
                self.samples_to_next_event = None;
                self.finished = true;
                return;
            }
        };

        let midi = self.midi;
        let events = &midi.tracks[track];
        let index = self.cursors[track].next_event_index;

        for (i, cursor) in self.cursors.iter_mut().enumerate() {
            if i == track {
                cursor.next_event_index += 1;
                cursor.ticks_to_next_event = events.get(index + 1).map(|e| u64::from(e.delta_time));
            } else if let Some(other) = cursor.ticks_to_next_event.as_mut() {
                *other -= ticks;
            }
        }

        log::trace!("track {}: next event in {} ticks", track, ticks);
        self.pending = Some(&events[index]);

        let samples = self.ticks_to_seconds(ticks) * f64::from(self.synth.sample_rate());
        if let Some(samples_to_next_event) = self.samples_to_next_event.as_mut() {
            *samples_to_next_event += samples;
        }
    }

    fn ticks_to_seconds(&self, ticks: u64) -> f64 {
        let beats = ticks as f64 / f64::from(self.midi.header.ticks_per_beat);
        let beats_per_minute = MICROSECONDS_PER_MINUTE / f64::from(self.microseconds_per_beat);
        beats / (beats_per_minute / 60.0)
    }

    /// Apply the effect of the event that is now due.
    fn handle_event(&mut self) {
        let event = match self.pending.take() {
            Some(event) => event,
            None => return,
        };

        match &event.kind {
            EventKind::Meta(MetaEvent::SetTempo {
                microseconds_per_beat,
            }) => {
                log::debug!("tempo change to {} us per beat", microseconds_per_beat);
                self.microseconds_per_beat = *microseconds_per_beat;
            }
            EventKind::Channel(ChannelEvent { channel, message }) => {
                let channel = match self.channels.get_mut(usize::from(*channel)) {
                    Some(channel) => channel,
                    None => {
                        log::trace!("ignoring event for channel {}", channel);
                        return;
                    }
                };
                match *message {
                    ChannelMessage::NoteOn { note, velocity } => {
                        channel.note_on(&mut self.synth, note, velocity)
                    }
                    ChannelMessage::NoteOff { note, .. } => channel.note_off(&mut self.synth, note),
                    ChannelMessage::ProgramChange { program } => {
                        log::debug!("program change to {}", program);
                        channel.set_program(self.programs, program);
                    }
                    _ => (),
                }
            }
            _ => (),
        }
    }
}

impl<'a> Iterator for Sequencer<'a> {
    type Item = [f32; NUM_OUTPUTS];

    fn next(&mut self) -> Option<Self::Item> {
        // Check for end of song
        if self.finished && self.synth.active_voices() == 0 {
            return None;
        }

        let mut frame = [0.0; NUM_OUTPUTS];
        self.generate_into(&mut frame);

        Some(frame)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::generator::Generator;
    use crate::midi::tests::smf;
    use crate::midi::Header;

    fn event(delta_time: u32, kind: EventKind) -> Event {
        Event { delta_time, kind }
    }

    fn channel(channel: u8, message: ChannelMessage) -> EventKind {
        EventKind::Channel(ChannelEvent { channel, message })
    }

    fn note_on(delta_time: u32, note: u8) -> Event {
        event(
            delta_time,
            channel(0, ChannelMessage::NoteOn { note, velocity: 100 }),
        )
    }

    fn note_off(delta_time: u32, note: u8) -> Event {
        event(
            delta_time,
            channel(0, ChannelMessage::NoteOff { note, velocity: 0 }),
        )
    }

    fn set_tempo(delta_time: u32, microseconds_per_beat: u32) -> Event {
        event(
            delta_time,
            EventKind::Meta(MetaEvent::SetTempo {
                microseconds_per_beat,
            }),
        )
    }

    fn midi_file(ticks_per_beat: u16, tracks: Vec<Vec<Event>>) -> MidiFile {
        MidiFile {
            header: Header {
                format_type: 1,
                track_count: tracks.len() as u16,
                ticks_per_beat,
            },
            tracks,
        }
    }

    /// Drain the schedule, returning `(track, note)` per consumed event.
    fn emission_order(midi: &MidiFile) -> Vec<(usize, u8)> {
        let programs = ProgramTable::default();
        let mut sequencer = Sequencer::new(midi, &programs, 1000.0);
        let mut order = Vec::new();

        while let Some(event) = sequencer.pending {
            let track = midi
                .tracks
                .iter()
                .position(|t| t.iter().any(|e| core::ptr::eq(e, event)))
                .unwrap();
            let note = match event.kind {
                EventKind::Channel(ChannelEvent {
                    message: ChannelMessage::NoteOn { note, .. },
                    ..
                }) => note,
                _ => 0,
            };
            order.push((track, note));
            sequencer.advance();
        }
        order
    }

    #[test]
    fn merges_tracks_chronologically() {
        let first = vec![note_on(0, 1), note_on(10, 2)];
        let second = vec![note_on(5, 3)];

        let midi = midi_file(96, vec![first.clone(), second.clone()]);
        let notes: Vec<_> = emission_order(&midi).iter().map(|e| e.1).collect();
        assert_eq!(notes, vec![1, 3, 2]);

        let midi = midi_file(96, vec![second, first]);
        let notes: Vec<_> = emission_order(&midi).iter().map(|e| e.1).collect();
        assert_eq!(notes, vec![1, 3, 2]);
    }

    #[test]
    fn ties_go_to_lowest_track() {
        let midi = midi_file(
            96,
            vec![
                vec![note_on(5, 1)],
                vec![note_on(5, 2)],
                vec![note_on(3, 3), note_on(2, 4)],
            ],
        );
        let order = emission_order(&midi);
        assert_eq!(order, vec![(2, 3), (0, 1), (1, 2), (2, 4)]);
    }

    #[test]
    fn event_samples_follow_ticks() {
        // 120 BPM, 4 ticks per beat: one tick is 125 ms
        let midi = midi_file(4, vec![vec![note_on(0, 60), note_off(4, 60)], vec![note_on(2, 64)]]);
        let programs = ProgramTable::default();
        let mut sequencer = Sequencer::new(&midi, &programs, 1000.0);
        assert_eq!(sequencer.samples_to_next_event, Some(0.0));

        sequencer.generate(1);
        assert_eq!(sequencer.synth().active_voices(), 1);
        assert_eq!(sequencer.samples_to_next_event, Some(249.0));

        sequencer.generate(249);
        assert_eq!(sequencer.synth().active_voices(), 2);
        assert_eq!(sequencer.samples_to_next_event, Some(250.0));
        assert!(!sequencer.finished());

        sequencer.generate(250);
        assert!(sequencer.finished());
        assert_eq!(sequencer.samples_to_next_event, None);
    }

    #[test]
    fn tempo_changes_are_not_retroactive() {
        let midi = midi_file(4, vec![vec![set_tempo(4, 250_000), note_on(4, 60)]]);
        let programs = ProgramTable::default();
        let mut sequencer = Sequencer::new(&midi, &programs, 1000.0);

        // Four ticks at 120 BPM
        assert_eq!(sequencer.samples_to_next_event, Some(500.0));
        assert_eq!(sequencer.microseconds_per_beat(), 500_000);

        sequencer.generate(500);
        assert_eq!(sequencer.microseconds_per_beat(), 250_000);
        // Four ticks at 240 BPM
        assert_eq!(sequencer.samples_to_next_event, Some(250.0));
        assert_eq!(sequencer.synth().active_voices(), 0);

        sequencer.generate(250);
        assert_eq!(sequencer.synth().active_voices(), 1);
        assert!(sequencer.finished());
    }

    #[test]
    fn fractional_sample_positions_accumulate() {
        // One tick is 500/12 samples
        let midi = midi_file(12, vec![vec![note_on(1, 60), note_on(1, 62), note_on(1, 64)]]);
        let programs = ProgramTable::default();
        let mut sequencer = Sequencer::new(&midi, &programs, 1000.0);
        let per_tick = 500.0 / 12.0;
        assert!((sequencer.samples_to_next_event.unwrap() - per_tick).abs() < 1e-9);

        // Each event lands on the first whole sample at or after its position
        sequencer.generate(42);
        assert_eq!(sequencer.synth().active_voices(), 1);
        sequencer.generate(41);
        assert_eq!(sequencer.synth().active_voices(), 1);
        sequencer.generate(1);
        assert_eq!(sequencer.synth().active_voices(), 2);
        sequencer.generate(42);
        assert_eq!(sequencer.synth().active_voices(), 3);
    }

    #[test]
    fn generate_returns_exact_block_sizes() {
        let mut track = Vec::new();
        for i in 0..200 {
            track.push(note_on(if i == 0 { 0 } else { 1 }, 40 + (i % 40) as u8));
            track.push(note_off(1, 40 + (i % 40) as u8));
        }
        let midi = midi_file(480, vec![track]);
        let programs = ProgramTable::default();
        let mut sequencer = Sequencer::new(&midi, &programs, 44100.0);

        assert!(sequencer.generate(0).is_empty());
        assert_eq!(sequencer.generate(1).len(), 2);
        // Spans many event boundaries
        assert_eq!(sequencer.generate(4096).len(), 8192);
        let mut buffer = [0.0; 9];
        sequencer.generate_into(&mut buffer[..8]);
        assert_eq!(buffer[8], 0.0);

        while !sequencer.finished() {
            assert_eq!(sequencer.generate(1000).len(), 2000);
        }
        assert_eq!(sequencer.generate(3).len(), 6);
    }

    #[test]
    fn matches_direct_voice_rendering() {
        let midi = midi_file(96, vec![vec![note_on(0, 69)]]);
        let programs = ProgramTable::default();
        let mut sequencer = Sequencer::new(&midi, &programs, 8000.0);
        let rendered = sequencer.generate(500);

        let mut voice = Program::PIANO.create_note(69, 100, 8000.0);
        let mut expected = vec![0.0; 1000];
        voice.generate(&mut expected);

        assert_eq!(rendered, expected);
        assert!(rendered.iter().any(|&s| s != 0.0));
    }

    #[test]
    fn repeated_note_on_releases_previous_voice() {
        let midi = midi_file(
            4,
            vec![vec![note_on(0, 60), note_on(4, 60), note_off(40, 60), note_off(0, 60)]],
        );
        let programs = ProgramTable::default();
        let mut sequencer = Sequencer::new(&midi, &programs, 1000.0);

        sequencer.generate(1);
        sequencer.generate(500);
        // Old voice is releasing, new one is held
        assert_eq!(sequencer.synth().active_voices(), 2);

        // The old voice's 20 ms release has finished
        sequencer.generate(100);
        assert_eq!(sequencer.synth().active_voices(), 1);

        // Redundant note off is ignored
        sequencer.generate(5000);
        assert!(sequencer.finished());
        assert_eq!(sequencer.synth().active_voices(), 0);
    }

    #[test]
    fn program_changes_select_instrument() {
        let strings = channel(3, ChannelMessage::ProgramChange { program: 42 });
        let unmapped = channel(4, ChannelMessage::ProgramChange { program: 100 });
        let midi = midi_file(96, vec![vec![event(0, strings), event(0, unmapped)]]);
        let programs = ProgramTable::default();
        let mut sequencer = Sequencer::new(&midi, &programs, 1000.0);
        sequencer.generate(1);

        assert_eq!(sequencer.channels[3].program, Program::STRINGS);
        assert_eq!(sequencer.channels[4].program, Program::PIANO);
        assert_eq!(sequencer.channels[0].program, Program::PIANO);
    }

    #[test]
    fn out_of_range_channels_are_ignored() {
        let stray = channel(16, ChannelMessage::NoteOn { note: 60, velocity: 100 });
        let midi = midi_file(4, vec![vec![event(0, stray), note_on(1, 62)]]);
        let programs = ProgramTable::default();
        let mut sequencer = Sequencer::new(&midi, &programs, 1000.0);

        assert_eq!(sequencer.generate(200).len(), 400);
        assert_eq!(sequencer.synth().active_voices(), 1);
        assert!(sequencer.finished());
    }

    #[test]
    fn finished_before_voices_fade() {
        let midi = midi_file(4, vec![vec![note_on(0, 60), note_off(4, 60)]]);
        let programs = ProgramTable::default();
        let mut sequencer = Sequencer::new(&midi, &programs, 1000.0);

        sequencer.generate(501);
        assert!(sequencer.finished());
        assert_eq!(sequencer.synth().active_voices(), 1);

        // The iterator keeps going until the release tail is done
        let tail: Vec<_> = sequencer.by_ref().collect();
        assert!(!tail.is_empty());
        assert!(tail.len() <= 20);
        assert_eq!(sequencer.synth().active_voices(), 0);
        assert_eq!(sequencer.next(), None);
    }

    #[test]
    fn empty_file_is_finished_immediately() {
        let midi = midi_file(96, vec![vec![], vec![]]);
        let programs = ProgramTable::default();
        let mut sequencer = Sequencer::new(&midi, &programs, 1000.0);

        assert!(sequencer.finished());
        assert_eq!(sequencer.generate(16), vec![0.0; 32]);
        assert_eq!(sequencer.next(), None);
    }

    #[test]
    fn plays_parsed_file() {
        let track: &[u8] = &[
            0x00, 0xff, 0x51, 0x03, 0x07, 0xa1, 0x20, // tempo
            0x00, 0x90, 60, 100, // note on
            0x83, 0x60, 0x80, 60, 100, // note off after one beat
            0x00, 0xff, 0x2f, 0x00, // end of track
        ];
        let midi = MidiFile::from_slice(&smf(0, 480, &[track])).unwrap();
        let programs = ProgramTable::default();

        // Two sessions over the same parsed file render identically
        let first: Vec<_> = Sequencer::new(&midi, &programs, 8000.0).collect();
        let second: Vec<_> = Sequencer::new(&midi, &programs, 8000.0).collect();
        assert_eq!(first, second);

        // Half a second of note plus the release tail
        assert!(first.len() >= 4000 && first.len() <= 4000 + 160);
        assert!(first[100][0] != 0.0);
        assert_eq!(first[100][0], first[100][1]);
    }
}
