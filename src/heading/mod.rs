mod smoother;
mod source;
mod tracker;

pub use smoother::HeadingSmoother;
pub use source::{
    select_source, CompassReading, HeadingSource, HeadingSourceKind, MagnetometerDerived,
    MagnetometerReading, NativeCompass,
};
pub use tracker::HeadingTracker;
