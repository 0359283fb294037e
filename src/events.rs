//! Events emitted by the [`Player`](crate::player::Player).
//!
//! Events are delivered over an unbounded channel registered with
//! [`Player::set_event_sender`](crate::player::Player::set_event_sender), so
//! a front end can react to state changes it did not initiate, such as
//! automatic progression when a song ends.

/// Significant playback state changes.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum Event {
    /// Playback has started or resumed.
    Play,

    /// Playback has paused.
    Pause,

    /// A different song is now current.
    TrackChanged,

    /// The current song restarted from the beginning.
    Restarted,

    /// Looping of the current song was switched; carries the new state.
    LoopChanged(bool),
}
