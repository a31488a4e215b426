use metro_core::midi::{self, song_position_pulses};
use metro_core::{
    Clock, Countdown, DeadlineState, MidiMessage, Tempo, TransportEvent, DEFAULT_SPIN_THRESHOLD,
};
use std::time::{Duration, Instant};

#[test]
fn test_song_position_reaches_clock() {
    let mut clock = Clock::new(Tempo::new(120.0).unwrap());
    let event = TransportEvent::parse(&[midi::SONG_POSITION, 0, 1])
        .unwrap()
        .unwrap();
    clock.set_position(event.song_position().unwrap());
    assert_eq!(clock.position(), 768);
    assert_eq!(song_position_pulses(0, 1), (1 * 128 + 0) * 6);
}

#[test]
fn test_song_position_message_matches_parser() {
    let bytes = MidiMessage::song_position(768).to_bytes();
    let event = TransportEvent::parse(&bytes).unwrap().unwrap();
    assert_eq!(event.song_position(), Some(768));
}

#[test]
fn test_countdown_driven_by_clock() {
    let mut clock = Clock::new(Tempo::new(120.0).unwrap());
    clock.start();
    let mut countdown = Countdown::new(clock.position() as f64, 12.0);
    let now = Instant::now();
    let mut scheduled_at = None;
    for i in 0..20u32 {
        let record = clock.tick(now + Duration::from_millis(21) * i);
        if let Some(rest) = countdown.tick(DEFAULT_SPIN_THRESHOLD) {
            scheduled_at = Some((record.position, rest));
        }
    }
    // 11 pulses counted, one pulse left for the final sleep
    assert_eq!(scheduled_at, Some((12, 1.0)));
    assert_eq!(countdown.state(), DeadlineState::Scheduled);
    assert_eq!(countdown.resolve(), Ok(13.0));
}

#[test]
fn test_bpm_change_changes_next_wait_duration() {
    let mut clock = Clock::new(Tempo::new(120.0).unwrap());
    let before = clock.tempo().duration_of(6.0);
    clock.tempo_mut().set_bpm(60.0).unwrap();
    let after = clock.tempo().duration_of(6.0);
    assert!((before.as_secs_f64() - 60.0 / 120.0 / 24.0 * 6.0).abs() < 1e-9);
    assert!((after.as_secs_f64() - 60.0 / 60.0 / 24.0 * 6.0).abs() < 1e-9);
}
