//! EasyTx behavior over the simulated chip: duplicate suppression, the
//! 8-send retry budget and its spacing, and acknowledgment handling.

mod common;

use common::*;
use rfnet::{EasyPoll, EasySend, EasyTx, Header};

#[test]
fn duplicate_sends_are_suppressed() {
    let clock = MockClock::default();
    let mut easy = EasyTx::new(clock, 0);
    assert_eq!(easy.send(&[1, 2, 3]), EasySend::Scheduled);
    assert_eq!(easy.send(&[1, 2, 3]), EasySend::Unchanged);
    assert_eq!(easy.send(&[1, 2, 4]), EasySend::Scheduled);
}

#[test]
fn empty_payload_forces_a_resend() {
    let clock = MockClock::default();
    let mut easy = EasyTx::new(clock, 0);
    assert_eq!(easy.send(&[1, 2, 3]), EasySend::Scheduled);
    assert_eq!(easy.send(&[]), EasySend::Scheduled);
}

#[test]
fn retry_budget_is_exactly_eight_sends() {
    let (mut radio, chip) = new_radio(7);
    let clock = MockClock::default();
    let mut easy = EasyTx::new(clock.clone(), 1);
    easy.send(&[42]);

    let mut frames = 0;
    for _ in 0..40 {
        easy.poll(&mut radio);
        pump(&mut radio, 60); // finish whatever transmission started
        let frame = take_frame(&chip);
        if !frame.is_empty() {
            frames += 1;
            // Broadcast with the ACK request bit, from node 7.
            assert_eq!(frame[0], Header::ACK | 7);
            assert_eq!(frame[1], 1);
            assert_eq!(frame[2], 42);
        }
        clock.advance(1000);
    }
    assert_eq!(frames, 8);

    // Exhausted: idle forever, no further transmissions.
    for _ in 0..5 {
        assert_eq!(easy.poll(&mut radio), EasyPoll::Idle);
        pump(&mut radio, 60);
        clock.advance(1000);
    }
    assert!(take_frame(&chip).is_empty());
}

#[test]
fn retries_respect_the_spacing() {
    let (mut radio, chip) = new_radio(7);
    let clock = MockClock::default();
    let mut easy = EasyTx::new(clock.clone(), 1);
    easy.send(&[1]);

    assert_eq!(easy.poll(&mut radio), EasyPoll::InFlight);
    pump(&mut radio, 60);
    assert!(!take_frame(&chip).is_empty());

    // No clock movement: the retry must hold off.
    for _ in 0..5 {
        easy.poll(&mut radio);
        pump(&mut radio, 60);
    }
    assert!(take_frame(&chip).is_empty());

    // One second later it goes out.
    clock.advance(1000);
    easy.poll(&mut radio);
    pump(&mut radio, 60);
    assert!(!take_frame(&chip).is_empty());
}

#[test]
fn ack_settles_the_session() {
    let (mut radio, chip) = new_radio(7);
    let clock = MockClock::default();
    let mut easy = EasyTx::new(clock.clone(), 1);
    easy.send(&[9, 9]);

    assert_eq!(easy.poll(&mut radio), EasyPoll::InFlight);
    pump(&mut radio, 60);
    take_frame(&chip);

    // The peer acknowledges: control frame addressed to node 7, empty.
    radio.recv_done(); // re-arm reception
    feed(
        &chip,
        &frame_bytes(GROUP, Header::CTL | Header::DST | 7, &[]),
    );
    pump(&mut radio, 40);
    assert_eq!(easy.poll(&mut radio), EasyPoll::Idle);

    // No retries afterwards, however much time passes.
    clock.advance(60_000);
    assert_eq!(easy.poll(&mut radio), EasyPoll::Idle);
    pump(&mut radio, 60);
    assert!(take_frame(&chip).is_empty());

    // Resubmitting the acknowledged bytes is a no-op.
    assert_eq!(easy.send(&[9, 9]), EasySend::Unchanged);
}

#[test]
fn ack_with_payload_reports_new_data() {
    let (mut radio, chip) = new_radio(7);
    let clock = MockClock::default();
    let mut easy = EasyTx::new(clock.clone(), 1);
    easy.send(&[1]);
    easy.poll(&mut radio);
    pump(&mut radio, 60);
    take_frame(&chip);

    radio.recv_done(); // re-arm reception
    feed(
        &chip,
        &frame_bytes(GROUP, Header::CTL | Header::DST | 7, &[0xCA, 0xFE]),
    );
    pump(&mut radio, 40);
    assert_eq!(easy.poll(&mut radio), EasyPoll::NewData);
    assert_eq!(radio.payload(), &[0xCA, 0xFE]);
}

#[test]
fn unrelated_traffic_does_not_ack() {
    let (mut radio, chip) = new_radio(7);
    let clock = MockClock::default();
    let mut easy = EasyTx::new(clock.clone(), 1);
    easy.send(&[1]);
    easy.poll(&mut radio);
    pump(&mut radio, 60);
    take_frame(&chip);

    // A plain broadcast from some other node is not an acknowledgment.
    radio.recv_done(); // re-arm reception
    feed(&chip, &frame_bytes(GROUP, 3, b"noise"));
    pump(&mut radio, 40);
    assert_eq!(easy.poll(&mut radio), EasyPoll::InFlight);
}
