//! Session engine tests against the X-Rite simulator.
//!
//! Everything runs over in-memory duplex streams, so no hardware is needed.

use spectro_daq::colorimetry::ColorimetricConditions;
use spectro_daq::drivers::simulator::{orange_sample, SimulatorLog, XRiteSimulator};
use spectro_daq::drivers::xrite::XRiteDriver;
use spectro_daq::drivers::{
    Aperture, CalibrationStep, MeasurementSettings, SpecularMode, SpectroDriver,
};
use spectro_daq::protocol::{EventBus, RetryPolicy, SessionOptions, SpectroEvent, Spectrophotometer};
use spectro_daq::SpectroError;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::task::JoinHandle;
use tokio_stream::StreamExt;

fn fast_options() -> SessionOptions {
    SessionOptions::default()
        .with_timeout_override(Duration::from_millis(100))
        .with_retry(RetryPolicy {
            max_attempts: 2,
            backoff_delay: Duration::from_millis(5),
        })
}

fn open(
    simulator: XRiteSimulator,
    options: SessionOptions,
) -> (Spectrophotometer, JoinHandle<SimulatorLog>) {
    let (port, device) = simulator.spawn();
    let session = Spectrophotometer::open("sim", Arc::new(XRiteDriver::default()), port, options);
    (session, device)
}

#[tokio::test]
async fn identify_reports_simulator_identity() {
    let (session, _device) = open(
        XRiteSimulator::new().with_identity("SP62", "3.01", "XR-77"),
        SessionOptions::default(),
    );

    let info = session.identify().await.unwrap();
    assert_eq!(info.vendor, "X-Rite");
    assert_eq!(info.model, "SP62");
    assert_eq!(info.firmware, "3.01");
    assert_eq!(info.serial_number, "XR-77");
    session.shutdown().await;
}

#[tokio::test]
async fn measurement_requires_white_calibration() {
    let (session, device) = open(
        XRiteSimulator::new().requires_calibration(true),
        SessionOptions::default(),
    );
    let settings = MeasurementSettings::default();

    match session.measure(&settings).await {
        Err(SpectroError::Instrument { code, message }) => {
            assert_eq!(code, "10");
            assert_eq!(message, "white calibration required");
        }
        other => panic!("expected calibration error, got {other:?}"),
    }

    session.calibrate(CalibrationStep::White).await.unwrap();
    let measurement = session.measure(&settings).await.unwrap();
    assert_eq!(measurement.instrument, "sim");
    assert_eq!(measurement.model, "SP64");
    assert_eq!(measurement.reflectance.len(), 31);

    // Reported at two decimals of percent.
    let expected = orange_sample().unwrap();
    for (got, want) in measurement.reflectance.values().iter().zip(expected.values()) {
        assert!((got - want).abs() < 1e-4, "{got} vs {want}");
    }

    session.shutdown().await;
    let log = device.await.unwrap();
    // A failed measurement job stops at MS and never sends RS.
    assert_eq!(log.count("MS"), 2);
    assert_eq!(log.count("RS"), 1);
    assert_eq!(log.count("CW"), 1);
}

#[tokio::test]
async fn mode_command_sent_only_when_settings_given() {
    let (session, device) = open(XRiteSimulator::new(), SessionOptions::default());

    session.measure(&MeasurementSettings::default()).await.unwrap();
    session
        .measure(
            &MeasurementSettings::default()
                .with_specular(SpecularMode::Excluded)
                .with_aperture(Aperture::Small)
                .with_averaging(3),
        )
        .await
        .unwrap();

    session.shutdown().await;
    let log = device.await.unwrap();
    assert_eq!(log.commands, vec!["MS 1", "RS", "SM E S", "MS 3", "RS"]);
}

#[tokio::test]
async fn unsupported_settings_never_reach_the_link() {
    let (session, device) = open(XRiteSimulator::new(), SessionOptions::default());

    let err = session
        .measure(&MeasurementSettings::default().with_aperture(Aperture::Medium))
        .await
        .unwrap_err();
    assert!(matches!(err, SpectroError::Unsupported(_)));

    let err = session
        .measure(&MeasurementSettings::default().with_averaging(0))
        .await
        .unwrap_err();
    assert!(matches!(err, SpectroError::Unsupported(_)));

    session.shutdown().await;
    assert!(device.await.unwrap().commands.is_empty());
}

#[tokio::test]
async fn dropped_reply_is_retried() {
    let bus = EventBus::default();
    let mut events = bus.subscribe();
    let (session, device) = open(
        XRiteSimulator::new().drop_replies(1),
        fast_options().with_event_bus(bus),
    );

    let info = session.identify().await.unwrap();
    assert_eq!(info.model, "SP64");
    session.shutdown().await;

    let log = device.await.unwrap();
    assert_eq!(log.count("IV"), 2);
    assert_eq!(log.dropped, 1);

    let mut retries = Vec::new();
    while let Ok(event) = events.try_recv() {
        if let SpectroEvent::Retrying { attempt, command, .. } = event {
            retries.push((command, attempt));
        }
    }
    assert_eq!(retries, vec![("IV".to_string(), 1)]);
}

#[tokio::test]
async fn silent_instrument_times_out_after_retries() {
    let (session, device) = open(XRiteSimulator::new().silent(), fast_options());

    match session.identify().await {
        Err(SpectroError::Timeout { command, timeout }) => {
            assert_eq!(command, "IV");
            assert_eq!(timeout, Duration::from_millis(100));
        }
        other => panic!("expected timeout, got {other:?}"),
    }
    assert!(session.is_open());

    session.shutdown().await;
    // First attempt plus two retries.
    assert_eq!(device.await.unwrap().count("IV"), 3);
}

#[tokio::test]
async fn triggering_commands_are_not_retried() {
    let (session, device) = open(XRiteSimulator::new().silent(), fast_options());

    let err = session.calibrate(CalibrationStep::White).await.unwrap_err();
    assert!(matches!(err, SpectroError::Timeout { .. }));

    session.shutdown().await;
    assert_eq!(device.await.unwrap().count("CW"), 1);
}

#[tokio::test]
async fn concurrent_callers_are_served_in_order() {
    let (session, device) = open(XRiteSimulator::new(), SessionOptions::default());

    let results = futures::future::join_all((0..5).map(|_| session.identify())).await;
    assert!(results.iter().all(Result::is_ok));
    let measurements = futures::future::join_all(
        (1..=3u8).map(|n| {
            let settings = MeasurementSettings::default().with_averaging(n);
            let session = &session;
            async move { session.measure(&settings).await }
        }),
    )
    .await;
    assert!(measurements.iter().all(Result::is_ok));

    session.shutdown().await;
    let log = device.await.unwrap();
    // Each measure job runs MS and RS back-to-back, never interleaved.
    assert_eq!(&log.commands[..5], ["IV"; 5]);
    assert_eq!(
        &log.commands[5..],
        ["MS 1", "RS", "MS 2", "RS", "MS 3", "RS"]
    );
}

#[tokio::test]
async fn link_loss_fails_pending_jobs() {
    let (host, device) = tokio::io::duplex(256);
    let device_task = tokio::spawn(async move {
        let mut reader = BufReader::new(device);
        let mut line = Vec::new();
        reader.read_until(b'\r', &mut line).await.unwrap();
        tokio::time::sleep(Duration::from_millis(50)).await;
        // Hang up without answering.
        drop(reader);
    });

    let bus = EventBus::default();
    let mut events = bus.subscribe();
    let session = Spectrophotometer::open(
        "flaky",
        Arc::new(XRiteDriver::default()),
        Box::new(host),
        SessionOptions::default().with_event_bus(bus),
    );

    let (first, second) = tokio::join!(session.identify(), session.identify());
    let first = first.unwrap_err();
    assert!(first.is_link_lost(), "unexpected {first:?}");
    assert!(matches!(second, Err(SpectroError::SessionClosed)));
    device_task.await.unwrap();

    // Listener is gone; new work is refused.
    tokio::time::sleep(Duration::from_millis(10)).await;
    assert!(!session.is_open());
    assert!(matches!(
        session.identify().await,
        Err(SpectroError::SessionClosed)
    ));

    let mut disconnected = None;
    while let Ok(event) = events.try_recv() {
        if let SpectroEvent::Disconnected { reason, .. } = event {
            disconnected = Some(reason);
        }
    }
    assert!(matches!(disconnected, Some(Some(_))));
}

#[tokio::test]
async fn submit_reports_full_queue() {
    let (session, _device) = open(
        XRiteSimulator::new().silent(),
        SessionOptions::default()
            .with_queue_capacity(1)
            .with_retry(RetryPolicy::none())
            .with_timeout_override(Duration::from_millis(200)),
    );
    let driver = XRiteDriver::default();

    let first = session.submit(driver.identify()).unwrap();
    // Let the listener take the first job off the queue.
    tokio::time::sleep(Duration::from_millis(30)).await;
    let second = session.submit(driver.identify()).unwrap();
    assert!(second > first);
    assert_eq!(session.pending(), 1);

    assert!(matches!(
        session.submit(driver.identify()),
        Err(SpectroError::QueueFull(1))
    ));
    session.shutdown().await;
}

#[tokio::test]
async fn shutdown_drains_queue_then_refuses_work() {
    let (session, device) = open(XRiteSimulator::new(), SessionOptions::default());
    let driver = XRiteDriver::default();

    session.submit(driver.identify()).unwrap();
    session.submit(driver.identify()).unwrap();
    session.shutdown().await;

    assert!(!session.is_open());
    assert!(matches!(
        session.submit(driver.identify()),
        Err(SpectroError::SessionClosed)
    ));
    assert!(matches!(
        session.identify().await,
        Err(SpectroError::SessionClosed)
    ));

    drop(session);
    assert_eq!(device.await.unwrap().count("IV"), 2);
}

#[tokio::test]
async fn events_trace_a_measurement() {
    let (session, _device) = open(XRiteSimulator::new(), SessionOptions::default());
    let stream = session.events();
    tokio::pin!(stream);

    let measurement = session.measure(&MeasurementSettings::default()).await.unwrap();

    let mut sent = Vec::new();
    let mut received = 0;
    loop {
        let event = tokio::time::timeout(Duration::from_secs(1), stream.next())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(event.instrument(), "sim");
        match event {
            SpectroEvent::CommandSent { command, .. } => sent.push(command),
            SpectroEvent::ReplyReceived { .. } => received += 1,
            SpectroEvent::MeasurementCompleted { measurement: done, .. } => {
                assert_eq!(done.id, measurement.id);
                break;
            }
            _ => {}
        }
    }
    assert_eq!(sent, vec!["MS", "RS"]);
    assert_eq!(received, 2);

    let lab = measurement.lab(ColorimetricConditions::default());
    assert!(lab.a > 20.0 && lab.b > 20.0, "orange expected, got {lab:?}");
    session.shutdown().await;
}

#[tokio::test]
async fn stale_input_is_discarded_before_sending() {
    let (host, device) = tokio::io::duplex(256);
    let device_task = tokio::spawn(async move {
        let mut reader = BufReader::new(device);
        // Garbage left over from an earlier exchange.
        reader.get_mut().write_all(b"<00>junk\r\n").await.unwrap();
        let mut line = Vec::new();
        reader.read_until(b'\r', &mut line).await.unwrap();
        assert_eq!(line, b"IV\r");
        reader
            .get_mut()
            .write_all(b"<00>SP60,1.0,S1\r\n")
            .await
            .unwrap();
        line.clear();
        let _ = reader.read_until(b'\r', &mut line).await;
    });

    let session = Spectrophotometer::open(
        "stale",
        Arc::new(XRiteDriver::default()),
        Box::new(host),
        SessionOptions::default().with_drain_window(Duration::from_millis(20)),
    );
    tokio::time::sleep(Duration::from_millis(10)).await;

    let info = session.identify().await.unwrap();
    assert_eq!(info.model, "SP60");
    session.shutdown().await;
    drop(session);
    device_task.await.unwrap();
}
