mod camera;
mod config;
mod controller;
mod dispatch;
mod gesture;
mod landmarks;
mod model_download;
#[cfg(feature = "camera-nokhwa")]
mod rgba_converter;
mod transport;
mod types;

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::Parser;

use crate::{
    camera::mirror_horizontal,
    config::{Cli, Mode},
    controller::{FrameOutcome, classify_or_absent},
    dispatch::CommandDispatcher,
    landmarks::{HandLandmarkSource, OrtLandmarker},
    transport::Transport,
    types::{Command, Frame, command_label},
};

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();
    match cli.mode() {
        Mode::Run { camera, no_mirror } => run(&cli, camera, !no_mirror),
        Mode::Cameras => list_cameras(),
        Mode::Classify {
            images,
            mirror,
            send,
        } => classify_images(&cli, &images, mirror, send),
        Mode::Send { command } => send_once(&cli, command),
    }
}

#[cfg(feature = "camera-nokhwa")]
fn run(cli: &Cli, camera: u32, mirror: bool) -> Result<()> {
    use crate::{
        camera::CameraSource,
        controller::{run_capture_loop, spawn_quit_listener},
    };

    let transport = cli.transport()?;
    log::info!("sending commands to {}", transport.endpoint());
    let mut dispatcher = CommandDispatcher::new(transport);

    let mut landmarker = OrtLandmarker::new(cli.landmarker_config())?;
    let mut frames = CameraSource::open(camera, mirror)?;
    let quit_rx = spawn_quit_listener();

    log::info!("hand gesture control running, type q + Enter to quit");
    run_capture_loop(&mut frames, &mut landmarker, &mut dispatcher, &quit_rx)
}

#[cfg(not(feature = "camera-nokhwa"))]
fn run(_cli: &Cli, _camera: u32, _mirror: bool) -> Result<()> {
    anyhow::bail!("built without camera support, enable the `camera-nokhwa` feature")
}

#[cfg(feature = "camera-nokhwa")]
fn list_cameras() -> Result<()> {
    let cameras = camera::available_cameras()?;
    if cameras.is_empty() {
        println!("no cameras found");
    }
    for device in cameras {
        println!("{}: {}", device.index, device.label);
    }
    Ok(())
}

#[cfg(not(feature = "camera-nokhwa"))]
fn list_cameras() -> Result<()> {
    anyhow::bail!("built without camera support, enable the `camera-nokhwa` feature")
}

fn classify_images(cli: &Cli, images: &[PathBuf], mirror: bool, send: bool) -> Result<()> {
    let mut landmarker = OrtLandmarker::new(cli.landmarker_config())?;
    let mut dispatcher = if send {
        Some(CommandDispatcher::new(cli.transport()?))
    } else {
        None
    };

    for path in images {
        let outcome = classify_image(&mut landmarker, path, mirror);
        match &outcome.hand {
            Some(hand) => {
                let extended = gesture::count_extended_fingers(&hand.points).unwrap_or(0);
                println!(
                    "{} -> {} | {extended} fingers extended | {:.0}%",
                    path.display(),
                    command_label(outcome.command),
                    hand.confidence * 100.0
                );
            }
            None => println!("{} -> no hand detected", path.display()),
        }

        if let Some(dispatcher) = dispatcher.as_mut() {
            dispatcher.dispatch(outcome.command);
        }
    }

    Ok(())
}

/// Classifies one image file. Unreadable images count as no hand.
fn classify_image<L: HandLandmarkSource>(
    landmarks: &mut L,
    path: &Path,
    mirror: bool,
) -> FrameOutcome {
    let mut frame = match load_frame(path) {
        Ok(frame) => frame,
        Err(err) => {
            log::warn!("{err:#}");
            return FrameOutcome::default();
        }
    };
    if mirror {
        mirror_horizontal(&mut frame);
    }
    classify_or_absent(landmarks, &frame)
}

fn send_once(cli: &Cli, command: Command) -> Result<()> {
    let mut transport = cli.transport()?;
    transport
        .send(command)
        .with_context(|| format!("couldn't send {command} to {}", transport.endpoint()))?;
    println!("sent: {command}");
    Ok(())
}

fn load_frame(path: &Path) -> Result<Frame> {
    let image = image::open(path)
        .with_context(|| format!("failed to open image {}", path.display()))?
        .to_rgba8();
    let (width, height) = image.dimensions();
    Ok(Frame::new(image.into_raw(), width, height))
}
