use std::{path::PathBuf, time::Duration};

use clap::{Parser, Subcommand};

use crate::{
    landmarks::{DEFAULT_MIN_DETECTION_CONFIDENCE, LandmarkerConfig},
    transport::{DEFAULT_ENDPOINT, TransportError, WebSocketTransport},
    types::Command,
};

#[derive(Parser, Debug)]
#[command(
    name = "gesture-drive",
    version,
    about = "Drive a remote-controlled device with webcam hand gestures"
)]
pub struct Cli {
    /// WebSocket endpoint of the device
    #[arg(long, global = true, default_value = DEFAULT_ENDPOINT)]
    pub endpoint: String,

    /// Give up connecting after this many milliseconds (default: OS timeout)
    #[arg(long, global = true, value_parser = clap::value_parser!(u64).range(1..))]
    pub connect_timeout_ms: Option<u64>,

    /// Directory holding the palm detector and handpose models
    #[arg(long, global = true, default_value = "models")]
    pub models_dir: PathBuf,

    /// Minimum palm detection score for a hand to count
    #[arg(
        long,
        global = true,
        default_value_t = DEFAULT_MIN_DETECTION_CONFIDENCE,
        value_parser = parse_unit_interval
    )]
    pub min_detection_confidence: f32,

    #[command(subcommand)]
    pub mode: Option<Mode>,
}

#[derive(Subcommand, Debug, Clone, PartialEq)]
pub enum Mode {
    /// Control the device from the camera feed (default). Type `q` + Enter to quit
    Run {
        /// Camera index
        #[arg(long, default_value_t = 0)]
        camera: u32,

        /// Don't mirror camera frames
        #[arg(long)]
        no_mirror: bool,
    },
    /// List available cameras
    Cameras,
    /// Classify still images and print the command for each
    Classify {
        /// PNG or JPEG files
        #[arg(required = true)]
        images: Vec<PathBuf>,

        /// Mirror images before classification, like camera frames
        #[arg(long)]
        mirror: bool,

        /// Dispatch the resulting commands to the device
        #[arg(long)]
        send: bool,
    },
    /// Send a single command and exit
    Send {
        /// forward, backward, left, right or stop
        command: Command,
    },
}

impl Default for Mode {
    fn default() -> Self {
        Mode::Run {
            camera: 0,
            no_mirror: false,
        }
    }
}

impl Cli {
    pub fn mode(&self) -> Mode {
        self.mode.clone().unwrap_or_default()
    }

    pub fn transport(&self) -> Result<WebSocketTransport, TransportError> {
        WebSocketTransport::new(
            &self.endpoint,
            self.connect_timeout_ms.map(Duration::from_millis),
        )
    }

    pub fn landmarker_config(&self) -> LandmarkerConfig {
        LandmarkerConfig {
            models_dir: self.models_dir.clone(),
            min_detection_confidence: self.min_detection_confidence,
            ..Default::default()
        }
    }
}

fn parse_unit_interval(s: &str) -> Result<f32, String> {
    let value: f32 = s.parse().map_err(|err| format!("{err}"))?;
    if (0.0..=1.0).contains(&value) {
        Ok(value)
    } else {
        Err(format!("{value} is not between 0 and 1"))
    }
}
