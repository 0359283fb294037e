//! Client core for a music streaming service.
//!
//! * [`player`] keeps the listening session: current song, play/pause,
//!   looping, random "next" and a bounded history for "previous".
//! * [`gateway`] talks to the REST backend, renewing an expired session once
//!   and repeating the call that found it expired.
//! * [`catalog`] and [`search`] build the song, album, artist and genre
//!   operations on top of the gateway.
#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::missing_panics_doc)]

#[macro_use]
extern crate log;

pub mod audio;
pub mod catalog;
pub mod config;
pub mod credentials;
pub mod error;
pub mod events;
pub mod gateway;
pub mod http;
pub mod player;
pub mod protocol;
pub mod search;
pub mod util;
pub mod volume;
