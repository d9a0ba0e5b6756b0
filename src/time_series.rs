use serde::{Deserialize, Serialize};

/// One whole-second tick of the results graph
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GraphPoint {
    pub time: f64,
    pub wpm: f64,
    pub raw: f64,
}

impl GraphPoint {
    pub fn new(time: f64, wpm: f64, raw: f64) -> Self {
        Self { time, wpm, raw }
    }

    pub fn wpm_coord(&self) -> (f64, f64) {
        (self.time, self.wpm)
    }

    pub fn raw_coord(&self) -> (f64, f64) {
        (self.time, self.raw)
    }
}

/// An incorrect keystroke pinned to the WPM curve
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ErrorMarker {
    pub time: f64,
    pub wpm: f64,
}

impl ErrorMarker {
    pub fn new(time: f64, wpm: f64) -> Self {
        Self { time, wpm }
    }
}

impl From<(f64, f64)> for ErrorMarker {
    fn from(v: (f64, f64)) -> Self {
        ErrorMarker { time: v.0, wpm: v.1 }
    }
}

impl From<ErrorMarker> for (f64, f64) {
    fn from(m: ErrorMarker) -> Self {
        (m.time, m.wpm)
    }
}

impl From<&GraphPoint> for ErrorMarker {
    fn from(p: &GraphPoint) -> Self {
        ErrorMarker {
            time: p.time,
            wpm: p.wpm,
        }
    }
}
