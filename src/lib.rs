//! BeamScope turns a planar microphone array into an acoustic camera. A
//! receiver streams multi-channel samples into a shared circular store; a
//! scanner thread steers a delay-and-sum beam across a grid of directions
//! and paints the beam power of each one into a heatmap, normalised by an
//! adaptive gain control so the loudest recent source always stands out.
//!
//! The pieces, in the order samples flow through them:
//!
//! - a [`receiver::Receiver`]: [`serial_receiver`] for the acquisition
//!   board, [`synthetic_receiver`] for a simulated tone, or
//!   [`replay_receiver`] for a recorded [`snapshot`];
//! - the [`pipeline`], which runs the receiver on its producer thread, fills
//!   the [`ring_buffer`] and wakes every consumer once per batch;
//! - the [`scanner`], which beamforms using the precomputed [`scan_grid`]
//!   of [`steering`] delays for the array [`geometry`], and normalises
//!   pixels with the [`agc`];
//! - the [`audio_monitor`], which taps one channel into a [`component`]
//!   chain ending in a WAV file ([`hound_writer`]);
//! - the terminal [`gui`].

#![warn(missing_docs)]
pub mod agc;
pub mod args;
pub mod audio_monitor;
pub mod component;
pub mod config;
pub mod geometry;
pub mod gui;
pub mod hardware_message_decoder;
pub mod hound_writer;
pub mod pipeline;
pub mod receiver;
pub mod replay_receiver;
pub mod ring_buffer;
pub mod scan_grid;
pub mod scanner;
pub mod serial_receiver;
pub mod signal;
pub mod snapshot;
pub mod steering;
pub mod synthetic_receiver;
