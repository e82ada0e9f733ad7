use std::{fmt, str::FromStr};

use thiserror::Error;

/// Number of points in a hand landmark set.
pub const NUM_LANDMARKS: usize = 21;

/// Landmark indices used by the classifier.
pub mod landmark {
    pub const WRIST: usize = 0;
    pub const THUMB_MCP: usize = 2;
    pub const THUMB_IP: usize = 3;
    pub const THUMB_TIP: usize = 4;
    pub const INDEX_TIP: usize = 8;
    pub const MIDDLE_TIP: usize = 12;
    pub const RING_TIP: usize = 16;
    pub const PINKY_TIP: usize = 20;

    pub const FINGER_TIPS: [usize; 4] = [INDEX_TIP, MIDDLE_TIP, RING_TIP, PINKY_TIP];
}

#[derive(Clone, Debug)]
pub struct Frame {
    pub rgba: Vec<u8>,
    pub width: u32,
    pub height: u32,
}

impl Frame {
    pub fn new(rgba: Vec<u8>, width: u32, height: u32) -> Self {
        Self {
            rgba,
            width,
            height,
        }
    }
}

/// One detected hand: 21 points normalized to the frame, origin top-left.
#[derive(Clone, Debug, PartialEq)]
pub struct LandmarkSet {
    pub points: Vec<(f32, f32)>,
    pub confidence: f32,
}

impl LandmarkSet {
    pub fn new(points: Vec<(f32, f32)>, confidence: f32) -> Self {
        Self { points, confidence }
    }
}

#[derive(Clone, Debug)]
pub struct PalmRegion {
    pub bbox: [f32; 4],
    pub landmarks: Vec<(f32, f32)>,
    pub score: f32,
}

/// Motion directive understood by the remote device.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Command {
    Forward,
    Backward,
    Left,
    Right,
    Stop,
}

impl Command {
    pub const ALL: [Command; 5] = [
        Command::Forward,
        Command::Backward,
        Command::Left,
        Command::Right,
        Command::Stop,
    ];

    /// Label sent on the wire.
    pub fn as_str(&self) -> &'static str {
        match self {
            Command::Forward => "forward",
            Command::Backward => "backward",
            Command::Left => "left",
            Command::Right => "right",
            Command::Stop => "stop",
        }
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
#[error("unknown command {0:?}, expected one of forward, backward, left, right, stop")]
pub struct ParseCommandError(String);

impl FromStr for Command {
    type Err = ParseCommandError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let label = s.trim();
        Command::ALL
            .into_iter()
            .find(|command| command.as_str().eq_ignore_ascii_case(label))
            .ok_or_else(|| ParseCommandError(s.to_string()))
    }
}

/// Text shown for the most recently dispatched command.
pub fn command_label(command: Option<Command>) -> &'static str {
    command.map(|c| c.as_str()).unwrap_or("none")
}
