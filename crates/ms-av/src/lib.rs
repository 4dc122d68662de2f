//! # ms-av
//!
//! External media tool plumbing for the mediasync engine.
//!
//! This crate provides:
//!
//! - **Tool discovery** ([`ToolRegistry`]) -- find and cache paths to ffmpeg
//!   and ffprobe, honouring configured overrides.
//! - **Command execution** ([`ToolCommand`]) -- runs a tool under its
//!   configured timeout and kills it when the deadline passes.
//! - **Probing** ([`Prober`], [`FfprobeProber`]) -- duration, dimensions and
//!   size of a media file.
//! - **Frame extraction** ([`FrameExtractor`], [`FfmpegFrameExtractor`]) --
//!   write a single still image taken at a timestamp.

pub mod command;
pub mod probe;
pub mod thumbnail;
pub mod tools;

// ---- Re-exports for convenience ----

pub use command::ToolCommand;
pub use probe::{FfprobeProber, ProbeReport, Prober};
pub use thumbnail::{FfmpegFrameExtractor, FrameExtractor, FrameRequest};
pub use tools::{Tool, ToolConfig, ToolRegistry, ToolStatus};
