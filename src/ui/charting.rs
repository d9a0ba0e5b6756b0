use crate::graph::Graph;

/// Axis bounds and label steps for the results chart
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ChartParams {
    pub x_max: f64,
    pub y_max: f64,
    pub x_step: f64,
    pub y_step: f64,
}

/// Compute X (seconds) and Y (WPM) bounds for the results chart. Both the
/// WPM and raw lines have to fit, so Y covers whichever peaks higher.
pub fn compute_chart_params(graph: &Graph) -> ChartParams {
    let duration = graph.duration().max(1.0);
    let y_step = y_label_step(graph.peak_wpm());
    // round up to a whole step so the top label is never clipped
    let y_max = ((graph.peak_wpm() / y_step).ceil() * y_step).max(y_step);

    ChartParams {
        x_max: duration,
        y_max,
        x_step: x_label_step(duration),
        y_step,
    }
}

/// Seconds between x axis labels
pub fn x_label_step(duration: f64) -> f64 {
    match duration {
        d if d <= 10.0 => 1.0,
        d if d <= 30.0 => 5.0,
        d if d <= 120.0 => 10.0,
        d if d <= 600.0 => 30.0,
        _ => 60.0,
    }
}

/// WPM between y axis labels
pub fn y_label_step(peak: f64) -> f64 {
    match peak {
        p if p <= 50.0 => 10.0,
        p if p <= 150.0 => 25.0,
        _ => 50.0,
    }
}

/// Label positions from `min` to `max` every `step`. `max` is always the
/// last label.
pub fn axis_labels(min: f64, max: f64, step: f64) -> Vec<f64> {
    if step <= 0.0 || max <= min {
        return vec![min];
    }
    let mut labels = Vec::new();
    let mut v = min;
    while v < max - step * 0.5 {
        labels.push(v);
        v += step;
    }
    labels.push(max);
    labels
}

/// Format a simple numeric label consistently
pub fn format_label(val: f64) -> String {
    if (val - val.round()).abs() < f64::EPSILON {
        format!("{}", val.round())
    } else {
        format!("{val:.1}")
    }
}
