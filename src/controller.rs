use std::{io::BufRead, thread};

use anyhow::{Context, Result};
use crossbeam_channel::{Receiver, TryRecvError, bounded};

use crate::{
    camera::FrameSource,
    dispatch::CommandDispatcher,
    gesture,
    landmarks::HandLandmarkSource,
    transport::Transport,
    types::{Command, Frame, LandmarkSet, command_label},
};

/// Result of classifying the first hand found in a frame.
#[derive(Clone, Debug, Default)]
pub struct FrameOutcome {
    pub hand: Option<LandmarkSet>,
    pub command: Option<Command>,
}

/// Detects hands and classifies the first one; extra hands are ignored.
pub fn classify_frame<L: HandLandmarkSource>(
    landmarks: &mut L,
    frame: &Frame,
) -> Result<FrameOutcome> {
    let hand = landmarks.detect(frame)?.into_iter().next();
    let command = hand.as_ref().and_then(|hand| gesture::classify(&hand.points));
    Ok(FrameOutcome { hand, command })
}

/// Like [`classify_frame`], but a failed detection is logged and counts as no hand.
pub fn classify_or_absent<L: HandLandmarkSource>(
    landmarks: &mut L,
    frame: &Frame,
) -> FrameOutcome {
    classify_frame(landmarks, frame).unwrap_or_else(|err| {
        log::warn!("hand detection failed: {err:?}");
        FrameOutcome::default()
    })
}

/// Runs capture → detect → classify → dispatch until a quit request arrives.
///
/// Sends block the loop. Landmark failures count as "no hand"; a frame
/// source failure ends the loop with an error.
pub fn run_capture_loop<F, L, T>(
    frames: &mut F,
    landmarks: &mut L,
    dispatcher: &mut CommandDispatcher<T>,
    quit_rx: &Receiver<()>,
) -> Result<()>
where
    F: FrameSource,
    L: HandLandmarkSource,
    T: Transport,
{
    let mut frame_count: u64 = 0;

    loop {
        match quit_rx.try_recv() {
            Ok(()) => {
                log::info!(
                    "quit requested after {frame_count} frames, last command: {}",
                    command_label(dispatcher.last())
                );
                return Ok(());
            }
            Err(TryRecvError::Empty | TryRecvError::Disconnected) => {}
        }

        let frame = frames.next_frame().context("can't access camera")?;
        frame_count += 1;

        let command = classify_or_absent(landmarks, &frame).command;

        if dispatcher.dispatch(command).is_some() {
            log::info!("command: {}", command_label(dispatcher.last()));
        }
    }
}

/// Watches stdin and signals once a line reading `q` arrives.
///
/// Closing stdin never signals, so the loop keeps running without a terminal.
pub fn spawn_quit_listener() -> Receiver<()> {
    let (quit_tx, quit_rx) = bounded(1);

    thread::spawn(move || {
        let stdin = std::io::stdin();
        for line in stdin.lock().lines() {
            match line {
                Ok(line) if line.trim().eq_ignore_ascii_case("q") => {
                    let _ = quit_tx.send(());
                    return;
                }
                Ok(_) => {}
                Err(err) => {
                    log::warn!("failed to read stdin: {err}");
                    return;
                }
            }
        }
    });

    quit_rx
}
