#![allow(dead_code)]

use metro::sleep::{sleep_until, DEFAULT_RESOLUTION};
use metro::{Tempo, Track, Transport, TransportSettings};
use std::time::{Duration, Instant};
use tokio::task::JoinHandle;

pub fn settings(bpm: f64) -> TransportSettings {
    TransportSettings {
        tempo: Tempo::new(bpm).unwrap(),
        ..TransportSettings::default()
    }
}

pub async fn idle(_track: Track) -> anyhow::Result<()> {
    Ok(())
}

/// Routine that stays alive without ever waiting on the transport
pub async fn dormant(_track: Track) -> anyhow::Result<()> {
    std::future::pending::<()>().await;
    Ok(())
}

/// Routine that parks on a long wait until cancelled
pub async fn park(track: Track) -> anyhow::Result<()> {
    loop {
        track.wait(1_000.0).await?;
    }
}

/// Tick `count` times, one pulse apart at the transport's tempo
pub async fn ticks(transport: &Transport, count: usize) {
    for _ in 0..count {
        transport.tick(Instant::now()).unwrap();
        tokio::time::sleep(transport.tempo().pulse_duration()).await;
    }
}

/// Tick in the background at the live tempo until the transport stops
pub fn pump(transport: &Transport) -> JoinHandle<()> {
    let transport = transport.clone();
    tokio::task::spawn_local(async move {
        let mut next = Instant::now();
        loop {
            next += transport.tempo().pulse_duration();
            sleep_until(next, DEFAULT_RESOLUTION).await;
            if transport.tick(Instant::now()).is_err() {
                break;
            }
        }
    })
}

pub async fn settle() {
    tokio::time::sleep(Duration::from_millis(30)).await;
}
