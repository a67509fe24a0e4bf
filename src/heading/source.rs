use crate::geo::normalize_degrees;
use async_trait::async_trait;
use std::fmt;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

/// Which device feed a heading came from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HeadingSourceKind {
    NativeCompass,
    MagnetometerDerived,
}

impl fmt::Display for HeadingSourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HeadingSourceKind::NativeCompass => write!(f, "native_compass"),
            HeadingSourceKind::MagnetometerDerived => write!(f, "magnetometer_derived"),
        }
    }
}

/// Raw compass bearings. Consumers only ever see the interface, never the
/// concrete feed behind it.
#[async_trait]
pub trait HeadingSource: Send {
    fn kind(&self) -> HeadingSourceKind;

    /// Next raw heading in `[0, 360)`, or `None` once the feed has closed
    async fn next_heading(&mut self) -> Option<f64>;
}

/// One sample from the platform compass API
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CompassReading {
    pub true_heading: Option<f64>,
    pub magnetic_heading: Option<f64>,
}

impl CompassReading {
    /// True heading when the platform provides it, magnetic otherwise
    pub fn heading(&self) -> Option<f64> {
        self.true_heading
            .filter(|h| h.is_finite() && *h >= 0.0)
            .or(self.magnetic_heading.filter(|h| h.is_finite()))
            .map(normalize_degrees)
    }
}

/// One raw magnetometer vector in device coordinates
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MagnetometerReading {
    pub x: f64,
    pub y: f64,
    pub z: f64,
}

impl MagnetometerReading {
    /// atan2(y, x) puts 0° on east; rotate by 90° so 0° is north
    pub fn heading(&self) -> Option<f64> {
        if !self.x.is_finite() || !self.y.is_finite() {
            return None;
        }
        Some(normalize_degrees(self.y.atan2(self.x).to_degrees() + 90.0))
    }
}

/// Heading from the platform compass
pub struct NativeCompass {
    readings: mpsc::Receiver<CompassReading>,
}

impl NativeCompass {
    pub fn new(readings: mpsc::Receiver<CompassReading>) -> Self {
        Self { readings }
    }
}

#[async_trait]
impl HeadingSource for NativeCompass {
    fn kind(&self) -> HeadingSourceKind {
        HeadingSourceKind::NativeCompass
    }

    async fn next_heading(&mut self) -> Option<f64> {
        while let Some(reading) = self.readings.recv().await {
            match reading.heading() {
                Some(h) => return Some(h),
                None => debug!("Dropping compass reading without a usable heading"),
            }
        }
        None
    }
}

/// Heading computed from the raw magnetometer vector
pub struct MagnetometerDerived {
    readings: mpsc::Receiver<MagnetometerReading>,
}

impl MagnetometerDerived {
    pub fn new(readings: mpsc::Receiver<MagnetometerReading>) -> Self {
        Self { readings }
    }
}

#[async_trait]
impl HeadingSource for MagnetometerDerived {
    fn kind(&self) -> HeadingSourceKind {
        HeadingSourceKind::MagnetometerDerived
    }

    async fn next_heading(&mut self) -> Option<f64> {
        while let Some(reading) = self.readings.recv().await {
            match reading.heading() {
                Some(h) => return Some(h),
                None => debug!("Dropping non-finite magnetometer reading"),
            }
        }
        None
    }
}

/// Prefer the platform compass; fall back to the magnetometer when the
/// compass could not be opened
pub fn select_source(
    native: Option<NativeCompass>,
    fallback: MagnetometerDerived,
) -> Box<dyn HeadingSource> {
    match native {
        Some(compass) => {
            info!("Using native compass heading");
            Box::new(compass)
        }
        None => {
            warn!("Native compass unavailable, deriving heading from magnetometer");
            Box::new(fallback)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_compass_prefers_true_heading() {
        let r = CompassReading {
            true_heading: Some(12.0),
            magnetic_heading: Some(10.0),
        };
        assert_eq!(r.heading(), Some(12.0));

        // Platforms report -1 when true heading is unknown
        let r = CompassReading {
            true_heading: Some(-1.0),
            magnetic_heading: Some(370.0),
        };
        assert_eq!(r.heading(), Some(10.0));

        let r = CompassReading {
            true_heading: None,
            magnetic_heading: Some(f64::NAN),
        };
        assert_eq!(r.heading(), None);
    }

    #[test]
    fn test_magnetometer_heading() {
        let north = MagnetometerReading { x: -1.0, y: 0.0, z: 0.0 };
        let h = north.heading().unwrap();
        assert!((h - 270.0).abs() < 1e-9);

        let r = MagnetometerReading { x: 0.0, y: -1.0, z: 0.0 };
        assert!(r.heading().unwrap().abs() < 1e-9);

        let r = MagnetometerReading { x: 1.0, y: 0.0, z: 0.0 };
        assert!((r.heading().unwrap() - 90.0).abs() < 1e-9);

        let r = MagnetometerReading { x: f64::NAN, y: 0.0, z: 0.0 };
        assert!(r.heading().is_none());
    }

    #[tokio::test]
    async fn test_native_compass_skips_unusable_readings() {
        let (tx, rx) = mpsc::channel(4);
        let mut source = NativeCompass::new(rx);
        tx.send(CompassReading { true_heading: None, magnetic_heading: None })
            .await
            .unwrap();
        tx.send(CompassReading { true_heading: Some(45.0), magnetic_heading: None })
            .await
            .unwrap();
        drop(tx);

        assert_eq!(source.next_heading().await, Some(45.0));
        assert_eq!(source.next_heading().await, None);
    }

    #[tokio::test]
    async fn test_select_source_falls_back() {
        let (_compass_tx, compass_rx) = mpsc::channel(1);
        let (_mag_tx, mag_rx) = mpsc::channel(1);
        let chosen = select_source(
            Some(NativeCompass::new(compass_rx)),
            MagnetometerDerived::new(mag_rx),
        );
        assert_eq!(chosen.kind(), HeadingSourceKind::NativeCompass);

        let (mag_tx, mag_rx) = mpsc::channel(1);
        let mut chosen = select_source(None, MagnetometerDerived::new(mag_rx));
        assert_eq!(chosen.kind(), HeadingSourceKind::MagnetometerDerived);

        mag_tx
            .send(MagnetometerReading { x: 1.0, y: 0.0, z: 0.0 })
            .await
            .unwrap();
        drop(mag_tx);
        assert_eq!(chosen.next_heading().await, Some(90.0));
        assert_eq!(chosen.next_heading().await, None);
    }
}
