//! Built-in pulses over the preset shapes.
use std::f64::consts::PI;

use super::Pulse;
use crate::expr::Expr;

#[must_use]
pub fn blank() -> Pulse {
    let mut pulse = Pulse::new("BLANK", ["channel"]);
    let w = pulse.add_variable("blank_width", 100.0, "margin before and after sequence");
    pulse.add_shape("channel", "blank", [("width", w)]);
    pulse
}

#[must_use]
pub fn flattop() -> Pulse {
    let mut pulse = Pulse::new("FLATTOP", ["channel"]);
    let w = pulse.add_variable("flattop_width", 100.0, "width of flattop pulse");
    let a = pulse.add_variable("flattop_amplitude", 0.9, "amplitude of flattop pulse");
    let p = pulse.add_variable("flattop_phase", 0.0, "phase of flattop pulse");
    pulse.add_shape(
        "channel",
        "flattop",
        [("width", w), ("amplitude", a), ("phase", p)],
    );
    pulse
}

/// Half-pi gaussian padded on both sides by `hpi_margin_coef * hpi_width`.
#[must_use]
pub fn hpi() -> Pulse {
    let mut pulse = Pulse::new("HPI", ["qubit"]);
    let w = pulse.add_variable("hpi_width", 20.0, "width of half-pi pulse");
    let a = pulse.add_variable("hpi_amplitude", 0.9, "amplitude of HPI pulse");
    let m = pulse.add_variable(
        "hpi_margin_coef",
        2.0,
        "product of sigma and this value is padded to gaussian center",
    );
    let p = pulse.add_variable("hpi_phase", 0.0, "phase of this pulse");
    let margin = m * w.clone();
    pulse.add_shape("qubit", "blank", [("width", margin.clone())]);
    pulse.add_shape(
        "qubit",
        "gaussian",
        [("width", w), ("amplitude", a), ("phase", p)],
    );
    pulse.add_shape("qubit", "blank", [("width", margin)]);
    pulse
}

/// Cross-resonance main drive on `control` with a counter drive on `target`.
#[must_use]
pub fn cr() -> Pulse {
    let mut pulse = Pulse::new("CR", ["control", "target"]);
    let w = pulse.add_variable("cr_width", 400.0, "width of CR main and counter pulse");
    let r = pulse.add_variable("cr_risetime", 20.0, "risetime of CR main and counter pulse");
    let ma = pulse.add_variable("cr_main_amplitude", 0.9, "amplitude of CR main pulse");
    let mp = pulse.add_variable("cr_main_phase", 0.0, "phase of CR main pulse");
    let ca = pulse.add_variable("cr_counter_amplitude", 0.9, "amplitude of CR counter pulse");
    let cp = pulse.add_variable("cr_counter_phase", 0.0, "phase of CR counter pulse");
    pulse.add_shape(
        "control",
        "flattop_cosrise",
        [
            ("width", w.clone()),
            ("risetime", r.clone()),
            ("amplitude", ma),
            ("phase", mp),
        ],
    );
    pulse.add_shape(
        "target",
        "flattop_cosrise",
        [("width", w), ("risetime", r), ("amplitude", ca), ("phase", cp)],
    );
    pulse
}

#[must_use]
pub fn meas() -> Pulse {
    let mut pulse = Pulse::new("MEAS", ["resonator"]);
    let w = pulse.add_variable("meas_width", 400.0, "width of measurement pulse");
    let r = pulse.add_variable("meas_risetime", 20.0, "risetime of measurement pulse");
    let a = pulse.add_variable("meas_amplitude", 0.9, "amplitude of measurement pulse");
    let p = pulse.add_variable("meas_phase", 0.0, "phase of measurement pulse");
    pulse.add_shape(
        "resonator",
        "flattop_cosrise",
        [("width", w), ("risetime", r), ("amplitude", a), ("phase", p)],
    );
    pulse
}

/// Echoed two-pulse cross-resonance: a CR pair, a half-pi on `control`
/// while `target` waits, then the CR pair again with inverted phase.
#[must_use]
pub fn tpcx() -> Pulse {
    let mut pulse = Pulse::new("TPCX", ["control", "target"]);
    let w = pulse.add_variable("tpcx_width", 200.0, "width of TPCX main and counter pulse");
    let r = pulse.add_variable(
        "tpcx_risetime",
        20.0,
        "risetime of TPCX main and counter pulse",
    );
    let ma = pulse.add_variable("tpcx_main_amplitude", 0.9, "amplitude of TPCX main pulse");
    let mp = pulse.add_variable("tpcx_main_phase", 0.0, "phase of TPCX main pulse");
    let ca = pulse.add_variable(
        "tpcx_counter_amplitude",
        0.9,
        "amplitude of TPCX counter pulse",
    );
    let cp = pulse.add_variable("tpcx_counter_phase", 0.0, "phase of TPCX counter pulse");
    let hw = pulse.add_variable(
        "tpcx_hpi_width",
        20.0,
        "width of HPI gaussian pulse on control qubits",
    );
    let ha = pulse.add_variable(
        "tpcx_hpi_amplitude",
        0.9,
        "amplitude of HPI gaussian pulse on control qubits",
    );
    let hp = pulse.add_variable(
        "tpcx_hpi_phase",
        0.0,
        "phase of HPI gaussian pulse on control qubits",
    );
    let hc = pulse.add_variable(
        "tpcx_hpi_margin_coef",
        2.0,
        "product of sigma and this value is padded to HPI gaussian pulse on control",
    );

    let cosrise = |amplitude: &Expr, phase: Expr| {
        [
            ("width", w.clone()),
            ("risetime", r.clone()),
            ("amplitude", amplitude.clone()),
            ("phase", phase),
        ]
    };
    let margin = hc * hw.clone();
    let flip = || Expr::from(PI);

    pulse.add_shape("control", "flattop_cosrise", cosrise(&ma, mp.clone()));
    pulse.add_shape("target", "flattop_cosrise", cosrise(&ca, cp.clone()));
    pulse.add_shape("control", "blank", [("width", margin.clone())]);
    pulse.add_shape(
        "control",
        "gaussian",
        [("width", hw), ("amplitude", ha), ("phase", hp)],
    );
    pulse.add_shape("control", "blank", [("width", margin.clone())]);
    pulse.add_shape("target", "blank", [("width", margin * Expr::from(2.0))]);
    pulse.add_shape("control", "flattop_cosrise", cosrise(&ma, mp + flip()));
    pulse.add_shape("target", "flattop_cosrise", cosrise(&ca, cp + flip()));
    pulse
}

#[must_use]
pub fn all() -> Vec<Pulse> {
    vec![blank(), flattop(), hpi(), cr(), meas(), tpcx()]
}
