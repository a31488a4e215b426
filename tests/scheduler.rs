mod common;

use common::{dormant, idle, park, settings, settle, ticks};
use metro::{MetroError, MidiMessage, RecordingSink, Track, Transport};
use std::cell::{Cell, RefCell};
use std::rc::Rc;
use std::time::{Duration, Instant};
use tokio::task::LocalSet;

#[tokio::test(flavor = "current_thread")]
async fn test_wait_advances_by_requested_pulses() {
    LocalSet::new()
        .run_until(async {
            let transport = Transport::new(idle, RecordingSink::new(), settings(600.0));
            transport.start().await.unwrap();

            let results = Rc::new(RefCell::new(Vec::new()));
            let seen = results.clone();
            let track = transport
                .spawn(
                    move |track: Track| {
                        let seen = seen.clone();
                        async move {
                            let long = track.wait(12.0).await?;
                            let short = track.wait(0.5).await?;
                            let none = track.wait(0.0).await?;
                            seen.borrow_mut().extend([long, short, none]);
                            Ok(())
                        }
                    },
                    0,
                    "waiter",
                )
                .unwrap();
            let start = track.position();

            ticks(&transport, 14).await;
            settle().await;

            assert_eq!(
                *results.borrow(),
                vec![start + 12.0, start + 12.5, start + 12.5]
            );
        })
        .await;
}

#[tokio::test(flavor = "current_thread")]
async fn test_second_concurrent_wait_is_rejected() {
    LocalSet::new()
        .run_until(async {
            let transport = Transport::new(idle, RecordingSink::new(), settings(120.0));
            transport.start().await.unwrap();

            let outcome = Rc::new(RefCell::new(None));
            let slot = outcome.clone();
            transport
                .spawn(
                    move |track: Track| {
                        let slot = slot.clone();
                        async move {
                            let (a, b) = tokio::join!(track.wait(0.5), track.wait(0.5));
                            *slot.borrow_mut() = Some((a, b));
                            Ok(())
                        }
                    },
                    0,
                    "twice",
                )
                .unwrap();
            settle().await;

            let (a, b) = outcome.borrow_mut().take().unwrap();
            let rejected = [&a, &b]
                .iter()
                .filter(|r| matches!(r, Err(MetroError::AlreadyWaiting { .. })))
                .count();
            assert_eq!(rejected, 1);
            assert!(a.is_ok() || b.is_ok());
        })
        .await;
}

#[tokio::test(flavor = "current_thread")]
async fn test_negative_length_is_rejected() {
    LocalSet::new()
        .run_until(async {
            let transport = Transport::new(idle, RecordingSink::new(), settings(120.0));
            transport.start().await.unwrap();
            let track = transport.spawn(park, 0, "parked").unwrap();
            settle().await;

            // The routine itself is parked, so use a second handle.
            let other = transport.spawn(idle, 0, "other").unwrap();
            assert!(matches!(
                other.wait(-1.0).await,
                Err(MetroError::InvalidLength(_))
            ));
            assert!(matches!(
                track.wait(1.0).await,
                Err(MetroError::AlreadyWaiting { .. })
            ));
        })
        .await;
}

#[tokio::test(flavor = "current_thread")]
async fn test_short_wait_follows_tempo_change() {
    LocalSet::new()
        .run_until(async {
            let transport = Transport::new(idle, RecordingSink::new(), settings(60.0));
            transport.start().await.unwrap();

            let timings = Rc::new(RefCell::new(Vec::new()));
            let seen = timings.clone();
            transport
                .spawn(
                    move |track: Track| {
                        let seen = seen.clone();
                        async move {
                            let started = Instant::now();
                            track.wait(0.9).await?;
                            seen.borrow_mut().push(started.elapsed());

                            track.set_bpm(30.0)?;
                            let started = Instant::now();
                            track.wait(0.9).await?;
                            seen.borrow_mut().push(started.elapsed());
                            Ok(())
                        }
                    },
                    0,
                    "tempo",
                )
                .unwrap();
            tokio::time::sleep(Duration::from_millis(250)).await;

            let timings = timings.borrow();
            assert_eq!(timings.len(), 2);
            // 60 / bpm / 24 * 0.9 seconds
            let fast = Duration::from_secs_f64(60.0 / 60.0 / 24.0 * 0.9);
            let slow = Duration::from_secs_f64(60.0 / 30.0 / 24.0 * 0.9);
            assert!(timings[0] >= fast && timings[0] < fast + Duration::from_millis(15));
            assert!(timings[1] >= slow && timings[1] < slow + Duration::from_millis(15));
            assert_eq!(transport.bpm(), 30.0);
        })
        .await;
}

#[tokio::test(flavor = "current_thread")]
async fn test_armed_trigger_keeps_its_tempo() {
    LocalSet::new()
        .run_until(async {
            let transport = Transport::new(idle, RecordingSink::new(), settings(60.0));
            transport.start().await.unwrap();

            let resolved = Rc::new(Cell::new(None));
            let seen = resolved.clone();
            transport
                .spawn(
                    move |track: Track| {
                        let seen = seen.clone();
                        async move {
                            track.wait(2.0).await?;
                            seen.set(Some(Instant::now()));
                            Ok(())
                        }
                    },
                    0,
                    "armed",
                )
                .unwrap();
            settle().await;

            // One pulse leaves 1.0 of 2.0: the trigger sleeps one pulse at 60 BPM.
            let ticked = Instant::now();
            transport.tick(ticked).unwrap();
            transport.set_bpm(15.0).unwrap();
            tokio::time::sleep(Duration::from_millis(250)).await;

            let elapsed = resolved.get().unwrap() - ticked;
            let at_60 = Duration::from_secs_f64(60.0 / 60.0 / 24.0);
            assert!(elapsed >= at_60, "{:?}", elapsed);
            assert!(elapsed < at_60 + Duration::from_millis(40), "{:?}", elapsed);
        })
        .await;
}

#[tokio::test(flavor = "current_thread")]
async fn test_huge_wait_counts_down() {
    LocalSet::new()
        .run_until(async {
            let transport = Transport::new(idle, RecordingSink::new(), settings(600.0));
            transport.start().await.unwrap();

            let mut waiters = Vec::new();
            for (name, pulses) in [("far", 1e21), ("forever", f64::MAX)] {
                waiters.push(
                    transport
                        .spawn(
                            move |track: Track| async move {
                                track.wait(pulses).await?;
                                Ok(())
                            },
                            0,
                            name,
                        )
                        .unwrap(),
                );
            }
            ticks(&transport, 3).await;
            settle().await;

            for track in &waiters {
                assert!(track.is_alive());
                assert!(track.is_waiting());
            }
            assert_eq!(transport.tracks().len(), 2);
        })
        .await;
}

#[tokio::test(flavor = "current_thread")]
async fn test_cancel_during_wait_never_resolves() {
    LocalSet::new()
        .run_until(async {
            let sink = RecordingSink::new();
            let transport = Transport::new(idle, sink.clone(), settings(600.0));
            transport.start().await.unwrap();

            let resumed = Rc::new(Cell::new(false));
            let flag = resumed.clone();
            let track = transport
                .spawn(
                    move |track: Track| {
                        let flag = flag.clone();
                        async move {
                            track.on(60, 100)?;
                            track.wait(48.0).await?;
                            flag.set(true);
                            Ok(())
                        }
                    },
                    0,
                    "victim",
                )
                .unwrap();

            ticks(&transport, 3).await;
            assert!(track.is_waiting());
            track.cancel();
            track.cancel();
            ticks(&transport, 60).await;
            settle().await;

            assert!(!resumed.get());
            assert!(!track.is_alive());
            assert!(transport.tracks().iter().all(|info| info.name != "victim"));
            assert_eq!(
                sink.without_clock()
                    .into_iter()
                    .filter(|m| m.channel().is_some())
                    .collect::<Vec<_>>(),
                vec![MidiMessage::note_on(0, 60, 100), MidiMessage::note_off(0, 60)]
            );
        })
        .await;
}

#[tokio::test(flavor = "current_thread")]
async fn test_cancel_with_trigger_in_flight() {
    LocalSet::new()
        .run_until(async {
            let transport = Transport::new(idle, RecordingSink::new(), settings(60.0));
            transport.start().await.unwrap();

            let resumed = Rc::new(Cell::new(false));
            let flag = resumed.clone();
            let track = transport
                .spawn(
                    move |track: Track| {
                        let flag = flag.clone();
                        async move {
                            track.wait(2.0).await?;
                            flag.set(true);
                            Ok(())
                        }
                    },
                    0,
                    "late",
                )
                .unwrap();
            settle().await;

            // One pulse leaves 1.0 remaining: the final sleep (~42 ms) starts.
            transport.tick(Instant::now()).unwrap();
            track.cancel();
            tokio::time::sleep(Duration::from_millis(100)).await;

            assert!(!resumed.get());
            assert!(transport.tracks().is_empty());
        })
        .await;
}

#[tokio::test(flavor = "current_thread")]
async fn test_dropped_wait_frees_the_track() {
    LocalSet::new()
        .run_until(async {
            let transport = Transport::new(idle, RecordingSink::new(), settings(600.0));
            transport.start().await.unwrap();
            let track = transport.spawn(dormant, 0, "free").unwrap();
            settle().await;

            let timed_out =
                tokio::time::timeout(Duration::from_millis(5), track.wait(100.0)).await;
            assert!(timed_out.is_err());
            assert!(track.is_alive());
            assert!(!track.is_waiting());
            assert_eq!(track.wait(0.0).await.unwrap(), track.position());
        })
        .await;
}

#[tokio::test(flavor = "current_thread")]
async fn test_sync_rounds_position() {
    LocalSet::new()
        .run_until(async {
            let transport = Transport::new(idle, RecordingSink::new(), settings(600.0));
            transport.start().await.unwrap();
            let track = transport.spawn(idle, 0, "sync").unwrap();
            settle().await;
            // The idle routine has already finished and retired its track.
            assert!(matches!(track.sync(), Err(MetroError::Cancelled { .. })));

            let results = Rc::new(RefCell::new(Vec::new()));
            let seen = results.clone();
            transport
                .spawn(
                    move |track: Track| {
                        let seen = seen.clone();
                        async move {
                            let start = track.position();
                            let after = track.wait(0.6).await?;
                            let synced = track.sync()?;
                            seen.borrow_mut().extend([start, after, synced]);
                            Ok(())
                        }
                    },
                    0,
                    "sync",
                )
                .unwrap();
            settle().await;
            let results = results.borrow();
            let (start, after, synced) = (results[0], results[1], results[2]);
            assert_eq!(after, start + 0.6);
            assert_eq!(synced, (start + 0.6).round());
            assert_eq!(synced.fract(), 0.0);
        })
        .await;
}
