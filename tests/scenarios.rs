use float_cmp::assert_approx_eq;
use indexmap::IndexMap;
use itertools::Itertools as _;
use muxwave::{
    Assignment, ChannelId, Complex64, Frequency, InstrumentConstants, Job, JobParameter, Pulse,
    PulseLibrary, Sequence, Sideband, translate,
    expr::Expr,
    hardware::{LocalOscillator, PortKey},
    mux, pulse,
};
use ndarray::Array1;

fn init_logging() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

fn ghz(v: f64) -> Frequency {
    Frequency::from_ghz(v).unwrap()
}

fn port(index: usize) -> PortKey {
    PortKey {
        device: "box0".into(),
        port: index,
    }
}

fn readout_job() -> Job {
    let mut sequence = Sequence::new(PulseLibrary::preset()).unwrap();
    sequence.add_channel("Q0_qubit", "Q0").unwrap();
    sequence.add_channel("Q0_resonator", "Q0").unwrap();
    sequence
        .add_pulse("FLATTOP", [("channel", "Q0_qubit")])
        .unwrap();
    sequence.add_synchronize_all();
    sequence.add_capture(["Q0_resonator"]).unwrap();
    sequence
        .add_pulse("MEAS", [("resonator", "Q0_resonator")])
        .unwrap();
    let mut job = Job::new(sequence);
    job.frequencies.insert("Q0_qubit".into(), ghz(4.2));
    job.frequencies.insert("Q0_resonator".into(), ghz(6.1));
    job.averaging_windows.insert(
        "Q0_resonator".into(),
        Array1::from_elem(128, Complex64::new(1.0, 0.0)),
    );
    job
}

fn readout_assignment() -> Assignment {
    let mut assignment = Assignment::new(InstrumentConstants::quel1se_low_freq());
    assignment
        .wire("Q0_qubit", "box0", 6)
        .wire("Q0_resonator", "box0", 1);
    assignment
}

#[test]
fn lsb_readout_end_to_end() {
    init_logging();
    let physical = translate(&readout_job(), &readout_assignment()).unwrap();

    let lo = physical.local_oscillators[&port(1)];
    assert_eq!(lo.sideband, Sideband::Lsb);
    assert_approx_eq!(f64, lo.frequency.ghz(), 9.0);
    let unit = &physical.dac_units["Q0_resonator"];
    let offset = physical.coarse_frequencies[&port(1)]
        + physical.fine_frequencies[unit]
        + physical.modulation_frequencies["Q0_resonator"];
    assert_approx_eq!(f64, offset.ghz(), 2.9, epsilon = 1e-9);

    let capture = physical
        .captures
        .values()
        .exactly_one()
        .ok()
        .expect("one capture unit");
    assert_eq!(capture.points.len(), 1);
    let period = InstrumentConstants::quel1se_low_freq().adc_decimated.period();
    for point in &capture.points {
        let periods = point.ns() / period.ns();
        assert_approx_eq!(f64, periods, periods.round(), epsilon = 1e-9);
    }
    assert!(capture.preceding < InstrumentConstants::quel1se_low_freq().first_window_step);
}

#[test]
fn five_channels_on_four_lanes() {
    let targets: IndexMap<ChannelId, Frequency> = [
        ("a", 4.0),
        ("b", 4.05),
        ("c", 4.5),
        ("d", 4.52),
        ("e", 4.9),
    ]
    .into_iter()
    .map(|(c, f)| (c.into(), ghz(f)))
    .collect();
    let constants = InstrumentConstants::quel1se_low_freq();
    let lo = LocalOscillator {
        frequency: Frequency::ZERO,
        sideband: Sideband::Direct,
    };
    let plan = mux::plan_port(&port(7), &targets, lo, 4, &constants).unwrap();
    assert_eq!(plan.lanes.values().unique().count(), 4);
    assert_eq!(plan.lanes["c"], plan.lanes["d"]);
    for (channel, &target) in &targets {
        let fine = plan.fine[&plan.lanes[channel]];
        let emitted = lo
            .sideband
            .emitted(lo.frequency, plan.coarse + fine + plan.residuals[channel]);
        assert_approx_eq!(f64, emitted.hz(), target.hz(), epsilon = 1e-3);
    }
}

#[test]
fn five_channels_share_four_dac_units() {
    init_logging();
    let mut constants = InstrumentConstants::quel1se_low_freq();
    constants.dac_lanes[7] = 4;
    let mut assignment = Assignment::new(constants);
    let mut sequence = Sequence::new(PulseLibrary::preset()).unwrap();
    let mut frequencies = IndexMap::new();
    for (name, f) in [("a", 4.0), ("b", 4.05), ("c", 4.5), ("d", 4.52), ("e", 4.9)] {
        sequence.add_channel(name, name).unwrap();
        sequence.add_pulse("FLATTOP", [("channel", name)]).unwrap();
        assignment.wire(name, "box0", 7);
        frequencies.insert(name.into(), ghz(f));
    }
    let mut job = Job::new(sequence);
    job.frequencies = frequencies;

    let physical = translate(&job, &assignment).unwrap();
    assert_eq!(physical.waveforms.len(), 4);
    assert_eq!(physical.fine_frequencies.len(), 4);
    assert_eq!(physical.dac_units["c"], physical.dac_units["d"]);
    assert!(physical.captures.is_empty());
}

#[test]
fn unbound_width_rejected_at_registration() {
    let mut library = PulseLibrary::preset();
    let mut pulse = Pulse::new("SQUARE_PULSE", ["channel"]);
    pulse.add_shape(
        "channel",
        "flattop",
        [("amplitude", Expr::from(0.5)), ("phase", Expr::from(0.0))],
    );
    let error = library.add_pulse(pulse).unwrap_err();
    let pulse::Error::InvalidPulse { source, .. } = error else {
        panic!("expected an invalid pulse error");
    };
    assert!(matches!(
        *source,
        pulse::Error::MissingParameter { ref parameters, .. } if parameters == &["width"]
    ));
}

#[test]
fn sweep_parameter_lengthens_waveform() {
    let mut job = readout_job();
    let assignment = readout_assignment();
    let before = translate(&job, &assignment).unwrap();
    let parameter: JobParameter = "sequencer.Q0.MEAS.meas_width".parse().unwrap();
    job.update(&parameter, 4000.0).unwrap();
    let after = translate(&job, &assignment).unwrap();
    assert!(after.acquisition.waveform_length > before.acquisition.waveform_length);
    assert_eq!(before.coarse_frequencies, after.coarse_frequencies);
}

#[test]
fn serialized_job_translates_identically() {
    let job = readout_job();
    let json = serde_json::to_string(&job).unwrap();
    let restored: Job = serde_json::from_str(&json).unwrap();
    let assignment = readout_assignment();
    assert_eq!(
        translate(&restored, &assignment).unwrap(),
        translate(&job, &assignment).unwrap()
    );
}
