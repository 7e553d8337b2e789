use std::collections::{BTreeSet, VecDeque};
use std::{cell::RefCell, rc::Rc};

use log::debug;
use serde::{Deserialize, Serialize};

/// Host audio. Requests reach it once per tick from the sound queue.
pub trait AudioSink {
    fn play(&mut self, sound: i32);
    fn stop(&mut self, sound: i32);
    fn stop_all(&mut self);
    fn kludge(&mut self, args: &[i32]);
    fn is_playing(&self, sound: i32) -> bool;
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum AudioEvent {
    Play { sound: i32 },
    Stop { sound: i32 },
    StopAll,
    Kludge { args: Vec<i32> },
}

#[derive(Debug, Clone, Default)]
pub struct NullAudioSink;

impl AudioSink for NullAudioSink {
    fn play(&mut self, _sound: i32) {}
    fn stop(&mut self, _sound: i32) {}
    fn stop_all(&mut self) {}
    fn kludge(&mut self, _args: &[i32]) {}
    fn is_playing(&self, _sound: i32) -> bool {
        false
    }
}

/// Records every request. Sounds count as playing until stopped.
#[derive(Clone, Default)]
pub struct RecordingAudioSink {
    events: Rc<RefCell<Vec<AudioEvent>>>,
    playing: Rc<RefCell<BTreeSet<i32>>>,
}

impl RecordingAudioSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<AudioEvent> {
        self.events.borrow().clone()
    }
}

impl AudioSink for RecordingAudioSink {
    fn play(&mut self, sound: i32) {
        self.playing.borrow_mut().insert(sound);
        self.events.borrow_mut().push(AudioEvent::Play { sound });
    }

    fn stop(&mut self, sound: i32) {
        self.playing.borrow_mut().remove(&sound);
        self.events.borrow_mut().push(AudioEvent::Stop { sound });
    }

    fn stop_all(&mut self) {
        self.playing.borrow_mut().clear();
        self.events.borrow_mut().push(AudioEvent::StopAll);
    }

    fn kludge(&mut self, args: &[i32]) {
        self.events.borrow_mut().push(AudioEvent::Kludge {
            args: args.to_vec(),
        });
    }

    fn is_playing(&self, sound: i32) -> bool {
        self.playing.borrow().contains(&sound)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum SoundRequest {
    Play(i32),
    Stop(i32),
    StopAll,
    Kludge(Vec<i32>),
}

/// Requests issued by scripts during a tick.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SoundQueue {
    pending: VecDeque<SoundRequest>,
}

impl SoundQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn start(&mut self, sound: i32) {
        self.pending.push_back(SoundRequest::Play(sound));
    }

    /// Cancels queued starts of `sound` and forwards a stop.
    pub fn stop(&mut self, sound: i32) {
        self.pending
            .retain(|request| *request != SoundRequest::Play(sound));
        self.pending.push_back(SoundRequest::Stop(sound));
    }

    pub fn stop_all(&mut self) {
        self.pending.clear();
        self.pending.push_back(SoundRequest::StopAll);
    }

    pub fn kludge(&mut self, args: Vec<i32>) {
        self.pending.push_back(SoundRequest::Kludge(args));
    }

    pub fn is_queued(&self, sound: i32) -> bool {
        self.pending.contains(&SoundRequest::Play(sound))
    }

    pub fn is_running(&self, sound: i32, sink: &dyn AudioSink) -> bool {
        self.is_queued(sound) || sink.is_playing(sound)
    }

    pub fn len(&self) -> usize {
        self.pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }

    /// Hands every pending request to the sink. `available` filters play
    /// requests for sounds without data. Returns the last sound started.
    pub fn drain(
        &mut self,
        sink: &mut dyn AudioSink,
        mut available: impl FnMut(i32) -> bool,
    ) -> Option<i32> {
        let mut last = None;
        while let Some(request) = self.pending.pop_front() {
            match request {
                SoundRequest::Play(sound) => {
                    if !available(sound) {
                        debug!("sound {sound} has no data, not playing");
                        continue;
                    }
                    sink.play(sound);
                    last = Some(sound);
                }
                SoundRequest::Stop(sound) => sink.stop(sound),
                SoundRequest::StopAll => sink.stop_all(),
                SoundRequest::Kludge(args) => sink.kludge(&args),
            }
        }
        last
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn queue_drains_in_order_and_skips_missing_sounds() {
        let mut queue = SoundQueue::new();
        let mut sink = RecordingAudioSink::new();
        queue.start(3);
        queue.start(9);
        queue.kludge(vec![1, 2]);
        assert!(queue.is_running(3, &sink));

        let last = queue.drain(&mut sink, |sound| sound != 9);
        assert_eq!(last, Some(3));
        assert!(queue.is_running(3, &sink));
        assert!(!queue.is_running(9, &sink));
        assert_eq!(
            sink.events(),
            vec![
                AudioEvent::Play { sound: 3 },
                AudioEvent::Kludge { args: vec![1, 2] },
            ]
        );
    }

    #[test]
    fn stop_cancels_queued_starts() {
        let mut queue = SoundQueue::new();
        let mut sink = RecordingAudioSink::new();
        queue.start(4);
        queue.stop(4);
        assert!(!queue.is_queued(4));
        queue.drain(&mut sink, |_| true);
        assert_eq!(sink.events(), vec![AudioEvent::Stop { sound: 4 }]);
    }
}
