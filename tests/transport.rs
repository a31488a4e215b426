mod common;

use common::{dormant, idle, park, pump, settings, settle, ticks};
use metro::{MetroError, MidiMessage, RecordingSink, Track, Transport, TransportState};
use std::cell::RefCell;
use std::rc::Rc;
use std::time::{Duration, Instant};
use tokio::task::LocalSet;

#[tokio::test(flavor = "current_thread")]
async fn test_play_sounds_then_rests() {
    LocalSet::new()
        .run_until(async {
            let sink = RecordingSink::new();
            let returned = Rc::new(RefCell::new(None));
            let slot = returned.clone();
            let transport = Transport::new(
                move |track: Track| {
                    let slot = slot.clone();
                    async move {
                        let start = track.position();
                        let end = track.play(60, 24.0, 100, 0.5).await?;
                        *slot.borrow_mut() = Some((start, end, Instant::now()));
                        Ok(())
                    }
                },
                sink.clone(),
                settings(120.0),
            );
            transport.start().await.unwrap();
            let pumping = pump(&transport);
            tokio::time::sleep(Duration::from_millis(650)).await;
            transport.stop().await;
            let _ = pumping.await;

            let (start, end, finished) = returned.borrow_mut().take().unwrap();
            assert_eq!(end, start + 24.0);

            let notes: Vec<(Instant, MidiMessage)> = sink
                .timed()
                .into_iter()
                .filter(|(_, m)| {
                    matches!(m, MidiMessage::NoteOn { .. } | MidiMessage::NoteOff { .. })
                })
                .collect();
            assert_eq!(
                notes.iter().map(|(_, m)| *m).collect::<Vec<_>>(),
                vec![MidiMessage::note_on(0, 60, 100), MidiMessage::note_off(0, 60)]
            );
            let held = notes[1].0 - notes[0].0;
            let rest = finished - notes[1].0;
            for span in [held, rest] {
                assert!(
                    span > Duration::from_millis(230) && span < Duration::from_millis(300),
                    "{:?}",
                    span
                );
            }
        })
        .await;
}

#[tokio::test(flavor = "current_thread")]
async fn test_regular_ticks_have_no_jitter() {
    LocalSet::new()
        .run_until(async {
            let transport = Transport::new(idle, RecordingSink::new(), settings(120.0));
            transport.start().await.unwrap();
            let pulse = transport.tempo().pulse_duration();
            let t0 = Instant::now();

            let first = transport.tick(t0).unwrap();
            assert_eq!((first.delta, first.jitter, first.position), (0.0, 0.0, 2));

            for n in 1..5u32 {
                let record = transport.tick(t0 + pulse * n).unwrap();
                assert!((record.delta - pulse.as_secs_f64()).abs() < 1e-9);
                assert!(record.jitter.abs() < 1e-6);
            }

            // Half a pulse late: +50 % against the previous delta.
            let late = transport.tick(t0 + pulse * 5 + pulse / 2).unwrap();
            assert!((late.jitter - 50.0).abs() < 1e-3);
            assert_eq!(transport.position(), 7);
        })
        .await;
}

#[tokio::test(flavor = "current_thread")]
async fn test_failing_routine_is_isolated() {
    LocalSet::new()
        .run_until(async {
            let sink = RecordingSink::new();
            let transport = Transport::new(idle, sink.clone(), settings(600.0));
            transport.start().await.unwrap();

            transport
                .spawn(
                    |track: Track| async move {
                        track.on(40, 90)?;
                        anyhow::bail!("boom")
                    },
                    2,
                    "bad",
                )
                .unwrap();
            transport
                .spawn(
                    |track: Track| async move {
                        if track.channel() == 3 {
                            panic!("routine panicked");
                        }
                        Ok(())
                    },
                    3,
                    "panicky",
                )
                .unwrap();
            let good = transport.spawn(park, 0, "good").unwrap();

            ticks(&transport, 5).await;
            settle().await;

            let names: Vec<String> = transport.tracks().into_iter().map(|t| t.name).collect();
            assert_eq!(names, vec!["good".to_string()]);
            assert!(good.is_waiting());
            assert!(transport.is_running());
            assert!(sink.messages().contains(&MidiMessage::note_off(2, 40)));
        })
        .await;
}

#[tokio::test(flavor = "current_thread")]
async fn test_replace_swaps_tracks() {
    LocalSet::new()
        .run_until(async {
            let transport = Transport::new(
                |track: Track| async move {
                    let mut current: Option<Track> = None;
                    for _ in 0..3 {
                        current = Some(track.spawn(park, 0, "swap", current.as_ref())?);
                        track.wait(0.5).await?;
                    }
                    std::future::pending::<()>().await;
                    Ok(())
                },
                RecordingSink::new(),
                settings(600.0),
            );
            transport.start().await.unwrap();
            settle().await;

            let swaps: Vec<_> = transport
                .tracks()
                .into_iter()
                .filter(|t| t.name == "swap")
                .collect();
            assert_eq!(swaps.len(), 1);
            assert!(transport.track("main").is_some());
        })
        .await;
}

#[tokio::test(flavor = "current_thread")]
async fn test_children_start_at_parent_position() {
    LocalSet::new()
        .run_until(async {
            let transport = Transport::new(
                |track: Track| async move {
                    track.wait(0.75).await?;
                    track.spawn(dormant, 5, "child", None)?;
                    std::future::pending::<()>().await;
                    Ok(())
                },
                RecordingSink::new(),
                settings(600.0),
            );
            transport.start().await.unwrap();
            settle().await;

            let child = transport.track("child").unwrap();
            assert_eq!(child.position(), 0.75);
            assert_eq!(child.channel(), 5);
        })
        .await;
}

#[tokio::test(flavor = "current_thread")]
async fn test_stop_cancels_and_silences() {
    LocalSet::new()
        .run_until(async {
            let sink = RecordingSink::new();
            let transport = Transport::new(
                |track: Track| async move {
                    track.on(64, 80)?;
                    track.wait(500.0).await?;
                    Ok(())
                },
                sink.clone(),
                settings(120.0),
            );
            transport.start().await.unwrap();
            settle().await;
            sink.clear();

            transport.stop().await;

            let mut expected = vec![MidiMessage::note_off(0, 64), MidiMessage::Stop];
            expected.extend((0..16).map(MidiMessage::all_notes_off));
            assert_eq!(sink.messages(), expected);
            assert_eq!(transport.state(), TransportState::Stopped);
            assert!(transport.tracks().is_empty());
            assert!(matches!(
                transport.tick(Instant::now()),
                Err(MetroError::NotRunning)
            ));

            // Stopping again still sends the panic sequence.
            sink.clear();
            transport.stop().await;
            assert_eq!(sink.len(), 17);
        })
        .await;
}

#[tokio::test(flavor = "current_thread")]
async fn test_resume_keeps_position() {
    LocalSet::new()
        .run_until(async {
            let sink = RecordingSink::new();
            let transport = Transport::new(park, sink.clone(), settings(600.0));
            transport.start().await.unwrap();
            ticks(&transport, 4).await;
            transport.stop().await;
            assert_eq!(transport.position(), 5);

            assert_eq!(transport.set_song_position(0x00, 0x01), 768);
            sink.clear();
            transport.resume().unwrap();
            settle().await;

            assert_eq!(sink.messages(), vec![MidiMessage::Continue]);
            assert_eq!(transport.position(), 768);
            let root = transport.track("main").unwrap();
            assert_eq!(root.position(), 768.0);
            assert!(matches!(transport.resume(), Err(MetroError::AlreadyRunning)));
        })
        .await;
}

#[tokio::test(flavor = "current_thread")]
async fn test_panic_releases_everything() {
    LocalSet::new()
        .run_until(async {
            let sink = RecordingSink::new();
            let transport = Transport::new(
                |track: Track| async move {
                    track.on(60, 100)?;
                    track.on_ch(9, 36, 1.0)?;
                    track.wait(500.0).await?;
                    Ok(())
                },
                sink.clone(),
                settings(120.0),
            );
            transport.start().await.unwrap();
            settle().await;
            sink.clear();

            transport.panic();
            let messages = sink.messages();
            assert_eq!(
                &messages[..2],
                &[MidiMessage::note_off(0, 60), MidiMessage::note_off(9, 36)]
            );
            assert_eq!(messages.len(), 2 + 16);
            assert_eq!(transport.tracks()[0].sounding, 0);
            assert!(transport.is_running());
        })
        .await;
}
