mod common;

use chrono::{NaiveDate, NaiveTime, Weekday};
use common::{action, FakeTimer};
use timer_link::*;

#[tokio::test]
async fn start_and_stop_toggle_the_timer() {
    let (fake, state) = FakeTimer::new(4);
    let mut device = TimerDevice::new(fake);

    device.stop_timer().await.unwrap();
    assert!(!state.lock().timer_running);

    device.start_timer().await.unwrap();
    assert!(state.lock().timer_running);
    assert_eq!(state.lock().written, b"BA");
}

#[tokio::test]
async fn info_reports_versions_and_capacity() {
    let (fake, state) = FakeTimer::new(50);
    let mut block = [0u8; 24];
    block.copy_from_slice(b"1  2  005000000300000000");
    state.lock().info_override = Some(block);
    let mut device = TimerDevice::new(fake);

    let info = device.get_info().await.unwrap();
    assert_eq!(info.hw_version, "1");
    assert_eq!(info.sw_version, "2");
    assert_eq!(info.memory_size, 500);
    assert_eq!(info.action_count, 3);
    assert_eq!(info.capacity(), 50);
}

#[tokio::test]
async fn info_with_padded_fields() {
    let (fake, state) = FakeTimer::new(4);
    state.lock().hw_version = "12".to_string();
    state.lock().set_slot(0, &action(b'A', 1, 7, 30, 1));
    let mut device = TimerDevice::new(fake);

    let info = device.get_info().await.unwrap();
    assert_eq!(info.hw_version, "12");
    assert_eq!(info.memory_size, 40);
    assert_eq!(info.action_count, 1);
}

#[tokio::test]
async fn set_action_sends_index_low_byte_first() {
    let (fake, state) = FakeTimer::new(300);
    let mut device = TimerDevice::new(fake);
    let stored = action(b'B', 2, 21, 45, 0);

    device.set_action(258, &stored).await.unwrap();

    let written = state.lock().written.clone();
    assert_eq!(written[0], b'F');
    assert_eq!(&written[1..3], &[0x02, 0x01]);
    assert_eq!(&written[3..], &stored.to_bytes());
    assert_eq!(state.lock().slot(258), stored);
}

#[tokio::test]
async fn get_action_reads_back_slot() {
    let (fake, state) = FakeTimer::new(8);
    let stored = action(b'C', 3, 6, 0, 1);
    state.lock().set_slot(5, &stored);
    let mut device = TimerDevice::new(fake);

    assert_eq!(device.get_action(5).await.unwrap(), stored);
    assert_eq!(device.get_action(0).await.unwrap(), Action::EMPTY);
}

#[tokio::test]
async fn invalid_slot_is_an_empty_row_whatever_it_holds() {
    let (fake, state) = FakeTimer::new(2);
    state.lock().slots[1] = [0, b'A', 1, 1, 1, 20, 1, 8, 0, 1];
    let mut device = TimerDevice::new(fake);

    let slot = device.get_action(1).await.unwrap();
    assert!(!slot.valid);
    assert!(ScheduleRow::from_action(&slot).is_empty());
}

#[tokio::test]
async fn set_datetime_encodes_monday_as_one() {
    let (fake, state) = FakeTimer::new(1);
    let mut device = TimerDevice::new(fake);
    // 2026-10-19 is a Monday
    let now = NaiveDate::from_ymd_opt(2026, 10, 19)
        .unwrap()
        .and_hms_opt(8, 15, 42)
        .unwrap();

    device.set_datetime(&now).await.unwrap();
    assert_eq!(state.lock().clock, [19, 10, 26, 1, 8, 15, 42]);

    let clock = device.get_datetime().await.unwrap();
    assert_eq!(clock.date, NaiveDate::from_ymd_opt(2026, 10, 19).unwrap());
    assert_eq!(clock.time, NaiveTime::from_hms_opt(8, 15, 42).unwrap());
    assert_eq!(clock.weekday, 1);
}

#[tokio::test]
async fn set_datetime_before_2000_sends_nothing() {
    let (fake, state) = FakeTimer::new(1);
    let mut device = TimerDevice::new(fake);
    let now = NaiveDate::from_ymd_opt(1999, 12, 31)
        .unwrap()
        .and_hms_opt(23, 59, 59)
        .unwrap();

    let err = device.set_datetime(&now).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Validation);
    assert!(state.lock().written.is_empty());
}

#[tokio::test]
async fn switch_sends_three_payload_bytes() {
    let (fake, state) = FakeTimer::new(1);
    let mut device = TimerDevice::new(fake);

    device.switch('A', 1, 1).await.unwrap();
    assert_eq!(state.lock().written, b"GA\x01\x01");
    assert_eq!(state.lock().switches, vec![(b'A', 1, 1)]);
}

#[tokio::test]
async fn switch_rejects_non_ascii_major() {
    let (fake, state) = FakeTimer::new(1);
    let mut device = TimerDevice::new(fake);

    let err = device.switch('é', 1, 1).await.unwrap_err();
    assert!(matches!(err, Error::Validation(_)));
    assert!(state.lock().written.is_empty());
}

#[tokio::test]
async fn failure_flag_is_a_rejection() {
    let (fake, state) = FakeTimer::new(1);
    state.lock().reject = Some(b'A');
    let mut device = TimerDevice::new(fake);

    let err = device.start_timer().await.unwrap_err();
    assert!(matches!(err, Error::Rejected(Command::StartTimer)));
    assert_eq!(err.kind(), ErrorKind::Protocol);
}

#[tokio::test]
async fn set_action_out_of_range_is_rejected() {
    let (fake, _state) = FakeTimer::new(2);
    let mut device = TimerDevice::new(fake);

    let err = device.set_action(2, &Action::EMPTY).await.unwrap_err();
    assert!(matches!(err, Error::Rejected(Command::SetAction)));
}

#[tokio::test]
async fn missing_response_times_out_naming_the_command() {
    let (fake, _state) = FakeTimer::new(2);
    let mut device = TimerDevice::new(fake);

    // The firmware sends nothing for a slot it cannot read
    let err = device.get_action(7).await.unwrap_err();
    assert_eq!(err.command(), Some(Command::GetAction));
    assert_eq!(err.kind(), ErrorKind::Transport);
    match err {
        Error::Command { source, .. } => assert!(matches!(
            *source,
            Error::Timeout {
                expected: 10,
                received: 0
            }
        )),
        other => panic!("unexpected error {other:?}"),
    }
}

#[tokio::test]
async fn reset_expects_no_answer() {
    let (fake, state) = FakeTimer::new(1);
    let mut device = TimerDevice::new(fake);

    device.reset().await.unwrap();
    assert_eq!(state.lock().log, vec![b'K']);
}

#[tokio::test]
async fn verbose_returns_ok_status() {
    let (fake, state) = FakeTimer::new(1);
    let mut device = TimerDevice::new(fake);

    device.set_verbose().await.unwrap();
    assert!(state.lock().verbose);
}

#[cfg(not(feature = "provisioning"))]
#[tokio::test]
async fn provisioning_is_compiled_out() {
    let (fake, state) = FakeTimer::new(1);
    let mut device = TimerDevice::new(fake);
    let info = ProvisionInfo {
        hw_version: 1,
        memory_type: MemoryType::I2c,
        memory_size: 500,
    };

    let err = device.set_info(&info).await.unwrap_err();
    assert!(matches!(err, Error::NotSupported(_)));
    assert!(state.lock().written.is_empty());
}

#[tokio::test]
async fn weekday_only_action_round_trips_through_a_row() {
    let (fake, state) = FakeTimer::new(1);
    let mut device = TimerDevice::new(fake);
    let row = ScheduleRow {
        major: Some('D'),
        minor: Some(4),
        weekday: Some(Weekday::Fri),
        time: NaiveTime::from_hms_opt(18, 5, 0),
        command: Some(SwitchCommand::Off),
        ..ScheduleRow::default()
    };

    let encoded = row.to_action().unwrap().unwrap();
    device.set_action(0, &encoded).await.unwrap();
    assert_eq!(state.lock().slots[0], [1, b'D', 4, 0, 0, 0, 5, 18, 5, 0]);

    let decoded = ScheduleRow::from_action(&device.get_action(0).await.unwrap());
    assert_eq!(decoded, row);
}
