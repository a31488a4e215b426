//! Demo voices
//!
//! Two small routines to start the transport with from the command line.

use crate::track::Track;
use crate::voice::{LocalBoxFuture, Voice};
use metro_core::note::{AB1, C2, DB1};
use metro_core::{Length, Overlay};
use rand::seq::SliceRandom;
use rand::Rng;

pub const DEFAULT_VOICE: &str = "pulse";

pub const NAMES: &[&str] = &["pulse", "groove"];

/// A built-in voice, selectable by name
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DemoVoice {
    Pulse,
    Groove,
}

impl DemoVoice {
    pub fn name(&self) -> &'static str {
        match self {
            DemoVoice::Pulse => "pulse",
            DemoVoice::Groove => "groove",
        }
    }

    pub fn description(&self) -> &'static str {
        match self {
            DemoVoice::Pulse => "one short note per beat",
            DemoVoice::Groove => {
                "hi-hat and snare with accents, plus a glitch line re-seeded every bar"
            }
        }
    }
}

pub fn by_name(name: &str) -> Option<DemoVoice> {
    match name {
        "pulse" => Some(DemoVoice::Pulse),
        "groove" => Some(DemoVoice::Groove),
        _ => None,
    }
}

impl Voice for DemoVoice {
    fn run(&self, track: Track) -> LocalBoxFuture<anyhow::Result<()>> {
        match self {
            DemoVoice::Pulse => Box::pin(pulse(track)),
            DemoVoice::Groove => Box::pin(groove(track)),
        }
    }
}

pub async fn pulse(track: Track) -> anyhow::Result<()> {
    loop {
        let position = track.play(50, track.th(4.0), 100, 0.1).await?;
        track.log(format_args!("beat at {position}"));
    }
}

pub async fn groove(track: Track) -> anyhow::Result<()> {
    track.spawn(drums, 1, "drums", None)?;
    let mut glitch_track: Option<Track> = None;
    loop {
        track.sync()?;
        glitch_track = Some(track.spawn(glitch, 0, "glitch", glitch_track.as_ref())?);
        track.wait(track.bar(1.0)).await?;
    }
}

async fn drums(track: Track) -> anyhow::Result<()> {
    let accent = Overlay::accent(0.7, 1.0);
    let eighth = Length::Note(8.0);
    loop {
        for step in 0..8 {
            let volume = accent.get_or(track.position(), 0.7);
            if step % 4 == 2 {
                track.play_len([DB1, AB1], eighth, volume).await?;
            } else {
                track.play_len(AB1, eighth, volume).await?;
            }
        }
    }
}

async fn glitch(track: Track) -> anyhow::Result<()> {
    track.reseed(7)?;
    loop {
        let (low, shift, division) = track.with_rng(|rng| {
            let low: u8 = rng.gen_range(1..=5);
            let shift = [0u8, 0, 0, 0, 12].choose(rng).copied().unwrap_or(0);
            let division = [16.0, 8.0, 8.0, 8.0].choose(rng).copied().unwrap_or(8.0);
            (low, shift, division)
        })?;
        track
            .play_len((low, C2 + shift), Length::Note(division), 0.788)
            .await?;
    }
}
