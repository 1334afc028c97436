//! Each vendor driver driven through a full session against a scripted
//! device speaking that vendor's wire format.

use spectro_daq::drivers::datacolor::DatacolorDriver;
use spectro_daq::drivers::gretag::{hex_decode, hex_encode, GretagDriver};
use spectro_daq::drivers::hunterlab::HunterLabDriver;
use spectro_daq::drivers::minolta::MinoltaDriver;
use spectro_daq::drivers::{
    Aperture, CalibrationStep, DriverKind, MeasurementSettings, SpecularMode, SpectroDriver,
};
use spectro_daq::protocol::framing::{encode_length_prefixed, encode_stx_etx, read_frame};
use spectro_daq::protocol::{Framing, RetryPolicy, SessionOptions, Spectrophotometer};
use spectro_daq::SpectroError;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncWriteExt, BufReader, DuplexStream};
use tokio::task::JoinHandle;

/// Serve requests delimited by `framing`, answering each with `respond`.
/// Returns the request bodies once the host hangs up.
fn scripted_device<F>(framing: Framing, mut respond: F) -> (DuplexStream, JoinHandle<Vec<Vec<u8>>>)
where
    F: FnMut(&[u8]) -> Option<Vec<u8>> + Send + 'static,
{
    let (host, device) = tokio::io::duplex(4096);
    let handle = tokio::spawn(async move {
        let mut reader = BufReader::new(device);
        let mut requests = Vec::new();
        while let Ok(request) = read_frame(&mut reader, &framing).await {
            let reply = respond(&request);
            requests.push(request.to_vec());
            if let Some(reply) = reply {
                if reader.get_mut().write_all(&reply).await.is_err() {
                    break;
                }
            }
        }
        requests
    });
    (host, handle)
}

fn session(driver: Arc<dyn SpectroDriver>, port: DuplexStream) -> Spectrophotometer {
    Spectrophotometer::open("dut", driver, Box::new(port), SessionOptions::default())
}

fn text(bytes: &[u8]) -> String {
    String::from_utf8_lossy(bytes).into_owned()
}

// ---------------------------------------------------------------------------
// Konica Minolta: CRLF text, OKnn / ERnn status
// ---------------------------------------------------------------------------

fn minolta_reply(request: &[u8]) -> Option<Vec<u8>> {
    let line = text(request);
    let reply = match line.as_str() {
        "IDR" => "OK00,CM-2600d,1.42,10021234".to_string(),
        "CAL" => "OK02".to_string(),
        "CAZ" => "ER11".to_string(),
        "NDR" => {
            let fields: Vec<String> = (0..39).map(|i| format!("{:05}", 1000 + i * 100)).collect();
            format!("OK00,{}", fields.join(","))
        }
        l if l.starts_with("CND,") || l.starts_with("MES,") => "OK00".to_string(),
        _ => "ER00".to_string(),
    };
    Some(format!("{reply}\r\n").into_bytes())
}

#[tokio::test]
async fn minolta_identify_calibrate_measure() {
    let (port, device) = scripted_device(Framing::Line { terminator: b"\r\n" }, minolta_reply);
    let session = session(Arc::new(MinoltaDriver::default()), port);

    let info = session.identify().await.unwrap();
    assert_eq!(info.vendor, "Konica Minolta");
    assert_eq!(info.serial_number, "10021234");

    // OK02 is a warning, not a failure.
    session.calibrate(CalibrationStep::White).await.unwrap();

    match session.calibrate(CalibrationStep::Black).await {
        Err(SpectroError::Instrument { code, message }) => {
            assert_eq!(code, "11");
            assert_eq!(message, "zero calibration required");
        }
        other => panic!("unexpected {other:?}"),
    }

    let measurement = session
        .measure(
            &MeasurementSettings::default()
                .with_specular(SpecularMode::Excluded)
                .with_aperture(Aperture::Small)
                .with_averaging(5),
        )
        .await
        .unwrap();
    let r = &measurement.reflectance;
    assert_eq!(r.len(), 39);
    assert_eq!(r.start_nm(), 360.0);
    assert_eq!(r.end_nm(), 740.0);
    assert!((r.values()[0] - 0.10).abs() < 1e-12);
    assert!((r.values()[38] - 0.48).abs() < 1e-12);

    session.shutdown().await;
    drop(session);
    let requests: Vec<String> = device.await.unwrap().iter().map(|r| text(r)).collect();
    assert_eq!(
        requests,
        vec!["IDR", "CAL", "CAZ", "CND,1,1", "MES,5", "NDR"]
    );
}

// ---------------------------------------------------------------------------
// GretagMacbeth: hex-encoded binary messages in text lines
// ---------------------------------------------------------------------------

fn gretag_reply(request: &[u8]) -> Option<Vec<u8>> {
    let raw = text(request)
        .strip_prefix("; ")
        .and_then(hex_decode)
        .unwrap_or_default();
    let message = raw.first().copied().unwrap_or(0xFF);
    let mut reply = vec![message, 0x00];
    match message {
        0x01 => reply.extend_from_slice(b"Spectrolino,2.05,SL-3301"),
        0x10 => {}
        0x20 if raw.get(1) == Some(&2) => {}
        0x20 => reply[1] = 0x02,
        0x21 => {
            for i in 0..36 {
                reply.extend_from_slice(&(0.5f32 + i as f32 * 0.01).to_le_bytes());
            }
        }
        _ => reply[1] = 0x01,
    }
    Some(format!(": {}\r\n", hex_encode(&reply)).into_bytes())
}

#[tokio::test]
async fn gretag_hex_messages() {
    let (port, device) = scripted_device(Framing::Line { terminator: b"\r\n" }, gretag_reply);
    let session = session(Arc::new(GretagDriver::default()), port);

    let info = session.identify().await.unwrap();
    assert_eq!(info.model, "Spectrolino");
    assert_eq!(info.firmware, "2.05");

    session.calibrate(CalibrationStep::White).await.unwrap();
    assert!(matches!(
        session.calibrate(CalibrationStep::Black).await,
        Err(SpectroError::Unsupported(_))
    ));

    let measurement = session
        .measure(&MeasurementSettings::default().with_averaging(2))
        .await
        .unwrap();
    let r = &measurement.reflectance;
    assert_eq!(r.len(), 36);
    assert_eq!(r.start_nm(), 380.0);
    assert!((r.value_at(380.0) - 0.5).abs() < 1e-6);
    assert!((r.value_at(730.0) - 0.85).abs() < 1e-6);

    // The device rejects averaging other than 2 with status 0x02.
    match session
        .measure(&MeasurementSettings::default().with_averaging(3))
        .await
    {
        Err(SpectroError::Instrument { code, message }) => {
            assert_eq!(code, "02");
            assert_eq!(message, "invalid parameter");
        }
        other => panic!("unexpected {other:?}"),
    }

    session.shutdown().await;
    drop(session);
    let requests: Vec<String> = device.await.unwrap().iter().map(|r| text(r)).collect();
    assert_eq!(
        requests,
        vec!["; 01", "; 10", "; 2002", "; 21", "; 2003"]
    );
}

// ---------------------------------------------------------------------------
// HunterLab: STX/ETX frames with block check character
// ---------------------------------------------------------------------------

#[tokio::test]
async fn hunterlab_framed_exchange() {
    let (port, device) = scripted_device(Framing::StxEtx { checksum: true }, |request| {
        let body: Vec<u8> = match request.first() {
            Some(b'I') => b"I0MiniScan XE Plus,3.2,HL8812".to_vec(),
            Some(b'W') => b"W0".to_vec(),
            Some(b'M') => b"M0".to_vec(),
            Some(b'D') => {
                let mut body = b"D0".to_vec();
                for i in 0..31 {
                    body.extend_from_slice(format!("{:05}", 2000 + i * 10).as_bytes());
                }
                body
            }
            Some(&code) => vec![code, b'1'],
            None => return None,
        };
        Some(encode_stx_etx(&body).to_vec())
    });
    let session = session(Arc::new(HunterLabDriver::default()), port);

    let info = session.identify().await.unwrap();
    assert_eq!(info.vendor, "HunterLab");
    assert_eq!(info.serial_number, "HL8812");

    session.calibrate(CalibrationStep::White).await.unwrap();
    let measurement = session
        .measure(
            &MeasurementSettings::default()
                .with_specular(SpecularMode::Included)
                .with_averaging(4),
        )
        .await
        .unwrap();
    let r = &measurement.reflectance;
    assert_eq!(r.len(), 31);
    assert!((r.value_at(400.0) - 0.20).abs() < 1e-12);
    assert!((r.value_at(700.0) - 0.23).abs() < 1e-12);

    session.shutdown().await;
    drop(session);
    let requests: Vec<String> = device.await.unwrap().iter().map(|r| text(r)).collect();
    assert_eq!(requests, vec!["I", "W", "MI-4", "D"]);
}

#[tokio::test]
async fn hunterlab_checksum_complaint_is_retried() {
    let mut complained = false;
    let (port, device) = scripted_device(Framing::StxEtx { checksum: true }, move |_| {
        let body: &[u8] = if complained {
            b"I0MiniScan EZ,1.0,HL1"
        } else {
            complained = true;
            b"I5"
        };
        Some(encode_stx_etx(body).to_vec())
    });
    let session = Spectrophotometer::open(
        "dut",
        Arc::new(HunterLabDriver::new("MiniScan EZ")),
        Box::new(port),
        SessionOptions::default().with_retry(RetryPolicy {
            max_attempts: 1,
            backoff_delay: Duration::from_millis(1),
        }),
    );

    let info = session.identify().await.unwrap();
    assert_eq!(info.model, "MiniScan EZ");

    session.shutdown().await;
    drop(session);
    assert_eq!(device.await.unwrap().len(), 2);
}

// ---------------------------------------------------------------------------
// Datacolor: ASCII commands, length-prefixed binary replies
// ---------------------------------------------------------------------------

#[tokio::test]
async fn datacolor_length_prefixed_replies() {
    let (port, device) = scripted_device(Framing::Line { terminator: b"\r" }, |request| {
        let mut body = vec![0x00];
        match request {
            b"ID" => body.extend_from_slice(b"SF600,4.3,DC55012"),
            b"CW" | b"CFEL" => {}
            b"CB" => body[0] = 0x06,
            r if r.starts_with(b"MR") => {
                for i in 0..35u16 {
                    body.extend_from_slice(&(3000 + i * 100).to_le_bytes());
                }
            }
            _ => body[0] = 0x01,
        }
        encode_length_prefixed(&body).ok().map(|b| b.to_vec())
    });
    let session = session(Arc::new(DatacolorDriver::default()), port);

    let info = session.identify().await.unwrap();
    assert_eq!(info.vendor, "Datacolor");

    session.calibrate(CalibrationStep::White).await.unwrap();
    assert!(matches!(
        session.calibrate(CalibrationStep::Black).await,
        Err(SpectroError::Instrument { .. })
    ));

    let measurement = session
        .measure(
            &MeasurementSettings::default()
                .with_specular(SpecularMode::Excluded)
                .with_aperture(Aperture::Large)
                .with_averaging(12),
        )
        .await
        .unwrap();
    let r = &measurement.reflectance;
    assert_eq!(r.len(), 35);
    assert_eq!(r.start_nm(), 360.0);
    assert!((r.value_at(360.0) - 0.30).abs() < 1e-12);
    assert!((r.value_at(700.0) - 0.64).abs() < 1e-12);

    session.shutdown().await;
    drop(session);
    let requests: Vec<String> = device.await.unwrap().iter().map(|r| text(r)).collect();
    assert_eq!(requests, vec!["ID", "CW", "CB", "CFEL", "MR12"]);
}

#[test]
fn every_driver_kind_builds_its_driver() {
    for kind in DriverKind::all() {
        let driver = kind.create(None);
        assert_eq!(driver.kind(), *kind);
        let caps = driver.capabilities();
        assert!(caps.sample_count() > 0);
        assert!(caps.max_averaging >= 1);
        assert!(!caps.apertures.is_empty());
    }
}
