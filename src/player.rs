//! Playback session.
//!
//! A [`Player`] owns the state of one listening session: the current song,
//! whether it is playing or looping, the songs played before it and the
//! catalog that "next" picks from. It turns user intent into instructions
//! for an [`Output`] and never talks to the network itself.
//!
//! # Navigation
//!
//! * **Next** picks a random catalog song other than the current one and
//!   pushes the current song onto the history.
//! * **Previous** restarts the current song when it has played for more than
//!   [`RESTART_THRESHOLD`] or when there is no history. Otherwise it returns
//!   to the most recent song in the history.
//! * When a song ends it repeats if looping is on, or advances as if next
//!   was requested.
//!
//! The history keeps at most [`HISTORY_LIMIT`] songs, oldest dropped first.

use std::{collections::VecDeque, time::Duration};

use tokio::sync::mpsc;

use crate::{audio::Output, error::Error, events::Event, protocol::Song, volume::Volume};

/// Maximum number of songs kept for "previous".
pub const HISTORY_LIMIT: usize = 10;

/// Playing time after which "previous" restarts the current song.
pub const RESTART_THRESHOLD: Duration = Duration::from_secs(3);

pub struct Player<O> {
    output: O,
    catalog: Vec<Song>,
    current: Option<Song>,
    history: VecDeque<Song>,
    playing: bool,
    looping: bool,
    volume: Volume,
    rng: fastrand::Rng,
    event_tx: Option<mpsc::UnboundedSender<Event>>,
}

impl<O: Output> Player<O> {
    #[must_use]
    pub fn new(output: O) -> Self {
        Self::with_rng(output, fastrand::Rng::new())
    }

    /// Creates a player whose song selection is reproducible.
    #[must_use]
    pub fn with_seed(output: O, seed: u64) -> Self {
        Self::with_rng(output, fastrand::Rng::with_seed(seed))
    }

    fn with_rng(output: O, rng: fastrand::Rng) -> Self {
        Self {
            output,
            catalog: Vec::new(),
            current: None,
            history: VecDeque::with_capacity(HISTORY_LIMIT + 1),
            playing: false,
            looping: false,
            volume: Volume::default(),
            rng,
            event_tx: None,
        }
    }

    pub fn set_event_sender(&mut self, tx: mpsc::UnboundedSender<Event>) {
        self.event_tx = Some(tx);
    }

    fn notify(&self, event: Event) {
        if let Some(tx) = &self.event_tx {
            if let Err(e) = tx.send(event) {
                trace!("dropping {event:?}: {e}");
            }
        }
    }

    /// Replaces the songs that [`next`](Self::next) selects from.
    pub fn set_catalog(&mut self, songs: Vec<Song>) {
        debug!("catalog holds {} songs", songs.len());
        self.catalog = songs;
    }

    /// Makes `song` current and starts playing it from the beginning.
    ///
    /// The history is left alone: only navigation records songs in it.
    pub fn play(&mut self, song: Song) {
        self.start(song);
    }

    /// Pauses a playing song or resumes a paused one.
    ///
    /// Returns `false` without doing anything when no song is loaded.
    pub fn toggle_play_pause(&mut self) -> bool {
        if self.current.is_none() {
            debug!("nothing to play or pause");
            return false;
        }

        if self.playing {
            self.playing = false;
            if let Err(e) = self.output.pause() {
                self.on_output_error(&e);
                return true;
            }
            self.notify(Event::Pause);
        } else {
            self.resume();
        }

        true
    }

    pub fn toggle_loop(&mut self) {
        self.looping = !self.looping;
        debug!("looping {}", if self.looping { "on" } else { "off" });
        self.notify(Event::LoopChanged(self.looping));
    }

    /// Plays a random catalog song other than the current one.
    ///
    /// Does nothing with an empty catalog. A catalog of one song may replay
    /// that song.
    pub fn next(&mut self) {
        if self.catalog.is_empty() {
            debug!("catalog is empty, nothing to play next");
            return;
        }

        let current_index = self
            .current
            .as_ref()
            .and_then(|current| self.catalog.iter().position(|song| song.is(current)));

        let mut index = self.rng.usize(..self.catalog.len());
        while Some(index) == current_index && self.catalog.len() > 1 {
            index = self.rng.usize(..self.catalog.len());
        }

        let song = self.catalog[index].clone();
        if let Some(previous) = self.current.take() {
            self.history.push_back(previous);
            while self.history.len() > HISTORY_LIMIT {
                self.history.pop_front();
            }
        }

        self.start(song);
    }

    /// Restarts the current song or returns to the one played before it.
    pub fn previous(&mut self) {
        if self.current.is_none() {
            return;
        }

        if self.history.is_empty() || self.output.position() > RESTART_THRESHOLD {
            self.restart();
            return;
        }

        if let Some(song) = self.history.pop_back() {
            self.start(song);
        }
    }

    /// Handles the current song playing to its end.
    pub fn on_playback_ended(&mut self) {
        if self.looping {
            self.restart();
        } else {
            self.next();
        }
    }

    /// Halts playback after the output failed. Nothing is retried.
    pub fn on_output_error(&mut self, error: &Error) {
        match &self.current {
            Some(song) => error!("playback of {song} failed: {error}"),
            None => error!("playback failed: {error}"),
        }

        if self.playing {
            self.playing = false;
            self.notify(Event::Pause);
        }
    }

    /// Sets the output volume. Persisting it is up to the caller.
    pub fn set_volume(&mut self, volume: Volume) {
        self.volume = volume;
        self.output.set_volume(volume);
    }

    /// Jumps within the current song.
    pub fn seek(&mut self, position: Duration) {
        if self.current.is_none() {
            return;
        }

        if let Err(e) = self.output.seek(position) {
            self.on_output_error(&e);
        }
    }

    #[must_use]
    pub fn current(&self) -> Option<&Song> {
        self.current.as_ref()
    }

    /// Previously played songs, oldest first.
    #[must_use]
    pub fn history(&self) -> &VecDeque<Song> {
        &self.history
    }

    #[must_use]
    pub fn catalog(&self) -> &[Song] {
        &self.catalog
    }

    #[must_use]
    pub fn is_playing(&self) -> bool {
        self.playing
    }

    #[must_use]
    pub fn is_looping(&self) -> bool {
        self.looping
    }

    #[must_use]
    pub fn volume(&self) -> Volume {
        self.volume
    }

    #[must_use]
    pub fn position(&self) -> Duration {
        self.output.position()
    }

    #[must_use]
    pub fn output(&self) -> &O {
        &self.output
    }

    pub fn output_mut(&mut self) -> &mut O {
        &mut self.output
    }

    fn start(&mut self, song: Song) {
        debug!("now playing {song}");
        let result = self.output.load(&song).and_then(|()| self.output.play());

        self.current = Some(song);
        self.playing = true;
        self.notify(Event::TrackChanged);

        match result {
            Ok(()) => self.notify(Event::Play),
            Err(e) => self.on_output_error(&e),
        }
    }

    fn restart(&mut self) {
        if let Err(e) = self.output.seek(Duration::ZERO) {
            self.on_output_error(&e);
            return;
        }
        self.notify(Event::Restarted);

        if !self.playing {
            self.resume();
        }
    }

    fn resume(&mut self) {
        match self.output.play() {
            Ok(()) => {
                self.playing = true;
                self.notify(Event::Play);
            }
            Err(e) => self.on_output_error(&e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Result;

    #[derive(Clone, Debug, PartialEq, Eq)]
    enum Instruction {
        Load(String),
        Play,
        Pause,
        Seek(Duration),
        Volume(Volume),
    }

    #[derive(Default)]
    struct Recorder {
        instructions: Vec<Instruction>,
        position: Duration,
        fail_loads: bool,
    }

    impl Output for Recorder {
        fn load(&mut self, song: &Song) -> Result<()> {
            if self.fail_loads {
                return Err(Error::not_found("no such file"));
            }
            self.instructions.push(Instruction::Load(song.id.clone()));
            self.position = Duration::ZERO;
            Ok(())
        }

        fn play(&mut self) -> Result<()> {
            self.instructions.push(Instruction::Play);
            Ok(())
        }

        fn pause(&mut self) -> Result<()> {
            self.instructions.push(Instruction::Pause);
            Ok(())
        }

        fn seek(&mut self, position: Duration) -> Result<()> {
            self.instructions.push(Instruction::Seek(position));
            self.position = position;
            Ok(())
        }

        fn set_volume(&mut self, volume: Volume) {
            self.instructions.push(Instruction::Volume(volume));
        }

        fn position(&self) -> Duration {
            self.position
        }
    }

    fn song(id: &str) -> Song {
        serde_json::from_value(serde_json::json!({ "id": id, "title": id.to_uppercase() }))
            .unwrap()
    }

    fn player(ids: &[&str]) -> Player<Recorder> {
        let mut player = Player::with_seed(Recorder::default(), 7);
        player.set_catalog(ids.iter().map(|id| song(id)).collect());
        player
    }

    fn current_id<O: Output>(player: &Player<O>) -> Option<&str> {
        player.current().map(|song| song.id.as_str())
    }

    fn history_ids<O: Output>(player: &Player<O>) -> Vec<&str> {
        player.history().iter().map(|song| song.id.as_str()).collect()
    }

    #[test]
    fn play_loads_and_starts_without_touching_history() {
        let mut player = player(&["a", "b"]);
        player.play(song("a"));

        assert_eq!(current_id(&player), Some("a"));
        assert!(player.is_playing());
        assert!(player.history().is_empty());
        assert_eq!(
            player.output().instructions,
            [Instruction::Load("a".to_string()), Instruction::Play]
        );
    }

    #[test]
    fn toggle_twice_restores_state() {
        let mut player = player(&["a"]);
        player.play(song("a"));

        assert!(player.toggle_play_pause());
        assert!(!player.is_playing());
        assert!(player.toggle_play_pause());
        assert!(player.is_playing());
        assert_eq!(
            player.output().instructions[2..],
            [Instruction::Pause, Instruction::Play]
        );
    }

    #[test]
    fn toggle_without_song_is_a_no_op() {
        let mut player = player(&["a"]);
        assert!(!player.toggle_play_pause());
        assert!(!player.is_playing());
        assert!(player.output().instructions.is_empty());
    }

    #[test]
    fn next_never_repeats_the_current_song() {
        let mut player = player(&["a", "b", "c"]);
        player.play(song("a"));

        let mut previous = "a".to_string();
        for _ in 0..200 {
            player.next();
            let current = current_id(&player).unwrap().to_string();
            assert_ne!(current, previous);
            previous = current;
        }
    }

    #[test]
    fn next_builds_history() {
        let mut player = player(&["a", "b", "c"]);
        player.play(song("a"));

        player.next();
        assert_ne!(current_id(&player), Some("a"));
        assert_eq!(history_ids(&player), ["a"]);

        player.next();
        player.next();
        assert_eq!(player.history().len(), 3);

        let mut followers = history_ids(&player)[1..].to_vec();
        followers.push(current_id(&player).unwrap());
        for (played, follower) in history_ids(&player).iter().zip(followers) {
            assert_ne!(*played, follower);
        }
    }

    #[test]
    fn history_keeps_the_ten_most_recent() {
        let ids: Vec<String> = (0..20).map(|i| format!("s{i}")).collect();
        let ids: Vec<&str> = ids.iter().map(String::as_str).collect();
        let mut player = player(&ids);

        let mut played = Vec::new();
        for _ in 0..25 {
            player.next();
            assert!(player.history().len() <= HISTORY_LIMIT);
            played.push(current_id(&player).unwrap().to_string());
        }

        let expected = &played[played.len() - 1 - HISTORY_LIMIT..played.len() - 1];
        assert_eq!(history_ids(&player), expected);
    }

    #[test]
    fn next_with_empty_catalog_does_nothing() {
        let mut player = player(&[]);
        player.play(song("a"));
        player.next();

        assert_eq!(current_id(&player), Some("a"));
        assert!(player.history().is_empty());
    }

    #[test]
    fn next_with_single_song_replays_it() {
        let mut player = player(&["a"]);
        player.play(song("a"));
        player.next();

        assert_eq!(current_id(&player), Some("a"));
        assert_eq!(history_ids(&player), ["a"]);
    }

    #[test]
    fn next_from_nothing_records_no_history() {
        let mut player = player(&["a", "b"]);
        player.next();

        assert!(player.current().is_some());
        assert!(player.is_playing());
        assert!(player.history().is_empty());
    }

    #[test]
    fn previous_returns_to_the_last_song_early_on() {
        let mut player = player(&["a", "b"]);
        player.play(song("a"));
        player.next();
        assert_eq!(current_id(&player), Some("b"));

        player.output_mut().position = RESTART_THRESHOLD;
        player.previous();

        assert_eq!(current_id(&player), Some("a"));
        assert!(player.history().is_empty());
        assert!(player.is_playing());
    }

    #[test]
    fn previous_restarts_after_threshold() {
        let mut player = player(&["a", "b"]);
        player.play(song("a"));
        player.next();

        player.output_mut().position = Duration::from_millis(3001);
        player.previous();

        assert_eq!(current_id(&player), Some("b"));
        assert_eq!(history_ids(&player), ["a"]);
        assert_eq!(player.position(), Duration::ZERO);
    }

    #[test]
    fn previous_without_history_restarts_and_plays() {
        let mut player = player(&["a", "b"]);
        player.play(song("a"));
        player.toggle_play_pause();
        player.output_mut().position = Duration::from_secs(1);

        player.previous();

        assert_eq!(current_id(&player), Some("a"));
        assert!(player.is_playing());
        assert!(player.history().is_empty());
        assert_eq!(
            player.output().instructions[3..],
            [Instruction::Seek(Duration::ZERO), Instruction::Play]
        );
    }

    #[test]
    fn previous_without_song_does_nothing() {
        let mut player = player(&["a"]);
        player.previous();
        assert!(player.current().is_none());
        assert!(player.output().instructions.is_empty());
    }

    #[test]
    fn ended_song_loops_or_advances() {
        let mut player = player(&["a", "b"]);
        player.play(song("a"));
        player.toggle_loop();
        player.output_mut().position = Duration::from_secs(200);

        player.on_playback_ended();
        assert_eq!(current_id(&player), Some("a"));
        assert_eq!(player.position(), Duration::ZERO);
        assert!(player.history().is_empty());

        player.toggle_loop();
        player.on_playback_ended();
        assert_eq!(current_id(&player), Some("b"));
        assert_eq!(history_ids(&player), ["a"]);
    }

    #[test]
    fn output_failure_halts_playback() {
        let mut player = player(&["a", "b"]);
        player.output_mut().fail_loads = true;
        player.play(song("a"));

        assert_eq!(current_id(&player), Some("a"));
        assert!(!player.is_playing());
    }

    #[test]
    fn volume_is_forwarded() {
        let mut player = player(&[]);
        player.set_volume(Volume::new(30));
        assert_eq!(player.volume(), Volume::new(30));
        assert_eq!(
            player.output().instructions,
            [Instruction::Volume(Volume::new(30))]
        );
    }

    #[test]
    fn events_follow_state_changes() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let mut player = player(&["a", "b"]);
        player.set_event_sender(tx);

        player.play(song("a"));
        player.toggle_play_pause();
        player.toggle_loop();
        player.on_playback_ended();

        let mut events = Vec::new();
        while let Ok(event) = rx.try_recv() {
            events.push(event);
        }
        assert_eq!(
            events,
            [
                Event::TrackChanged,
                Event::Play,
                Event::Pause,
                Event::LoopChanged(true),
                Event::Restarted,
                Event::Play,
            ]
        );
    }
}
