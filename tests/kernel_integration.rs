//! Integration tests for the event kernel: latency, registration gating,
//! ordering and energy accounting.

mod common;

use common::{Recorder, add, memory_telemetry, run_all};
use lpdm_sim::SimError;
use lpdm_sim::devices::{Device, Eud, FixedConsumption};
use lpdm_sim::sim::Supervisor;
use lpdm_sim::sim::event::Operation;
use lpdm_sim::sim::message::MessageKind;
use lpdm_sim::sim::schedule::ScheduleEntry;
use lpdm_sim::sim::types::DeviceId;

#[test]
fn message_is_read_exactly_after_latency() {
    let (telemetry, _) = memory_telemetry();
    let mut sup = Supervisor::new().with_telemetry(telemetry.clone());

    let sender = Recorder::new();
    let receiver = Recorder::new();
    let other = Recorder::new();
    add(
        &mut sup,
        Device::builder("gc_1", sender)
            .connect(["eud_1", "eud_2"])
            .schedule([ScheduleEntry::new(1.0, Operation::TurnOn)])
            .telemetry(telemetry.clone()),
    );
    add(
        &mut sup,
        Device::builder("eud_1", receiver.clone())
            .latency(2.5)
            .connect(["gc_1"])
            .telemetry(telemetry.clone()),
    );
    add(
        &mut sup,
        Device::builder("eud_2", other.clone())
            .latency(2.5)
            .connect(["gc_1"])
            .telemetry(telemetry),
    );

    run_all(&mut sup);

    let calls = receiver.calls();
    assert_eq!(calls.len(), 1);
    assert_eq!(calls[0].kind, MessageKind::Price);
    assert_eq!(calls[0].time, 3602.5);
    // Both receivers read at the same global time.
    assert_eq!(other.calls()[0].time, 3602.5);
}

#[test]
fn unregistered_sender_is_ignored_until_register() {
    let (telemetry, sink) = memory_telemetry();
    let mut sup = Supervisor::new().with_telemetry(telemetry.clone());
    let receiver = Recorder::new();

    let gc = add(
        &mut sup,
        Device::builder("gc_1", Recorder::new())
            .connect(["eud_1"])
            .telemetry(telemetry.clone()),
    );
    let eud = add(
        &mut sup,
        Device::builder("eud_1", receiver.clone()).telemetry(telemetry),
    );

    let send_power = |sup: &mut Supervisor| {
        let to = eud.clone();
        sup.with_device(&gc, move |device, ctx| {
            device.core().send_message(ctx, &to, MessageKind::Power, -10.0)
        })
        .expect("gc knows eud_1");
    };

    send_power(&mut sup);
    run_all(&mut sup);
    assert!(receiver.calls().is_empty());
    assert!(!sink.with_tag("dropped").is_empty());

    sup.engage(&gc, std::slice::from_ref(&eud)).expect("engage");
    send_power(&mut sup);
    run_all(&mut sup);

    let calls = receiver.calls();
    assert_eq!(calls.len(), 1);
    assert_eq!(calls[0].kind, MessageKind::Power);
    assert!(
        sup.get_device(&eud)
            .expect("registered")
            .core()
            .is_connected(&gc)
    );
}

#[test]
fn stale_global_entry_is_an_ordering_violation() {
    let (telemetry, _) = memory_telemetry();
    let mut sup = Supervisor::new().with_telemetry(telemetry.clone());
    let id = add(
        &mut sup,
        Device::builder("eud_1", Recorder::new())
            .time(100.0)
            .telemetry(telemetry),
    );

    sup.register_event(&id, 50.0);
    let err = sup.occur_next_event().expect_err("time went backwards");
    assert!(err.is_ordering_violation());
    assert!(matches!(
        err,
        SimError::OrderingViolation {
            event_time,
            local_time,
            ..
        } if event_time == 50.0 && local_time == 100.0
    ));
}

#[test]
fn energy_matches_analytic_integral() {
    let (telemetry, _) = memory_telemetry();
    let mut sup = Supervisor::new().with_telemetry(telemetry.clone());
    let id = add(
        &mut sup,
        Device::builder("eud_1", Recorder::new()).telemetry(telemetry),
    );

    // (time s, signed flow on one link): + in, - out
    let script = [
        (0.0, 10.0),
        (900.0, 40.0),
        (1800.0, -20.0),
        (2000.0, -60.0),
        (2700.0, 25.0),
        (3000.0, 0.0),
    ];
    let end = 3600.0;

    let mut expected_in = 0.0;
    let mut expected_out = 0.0;
    for (i, &(t, flow)) in script.iter().enumerate() {
        let next = script.get(i + 1).map_or(end, |&(t, _)| t);
        let hours = (next - t) / 3600.0;
        if flow > 0.0 {
            expected_in += flow * hours;
        } else {
            expected_out += -flow * hours;
        }
    }

    sup.with_device(&id, |device, _ctx| {
        let mut previous = 0.0;
        for &(t, flow) in &script {
            device.update_time(t)?;
            device.core_mut().recalc_power(previous, flow)?;
            previous = flow;
        }
        device.finish(end)
    })
    .expect("scripted run");

    let core = sup.get_device(&id).expect("registered").core();
    assert!((core.energy_in() - expected_in).abs() < 1e-9);
    assert!((core.energy_out() - expected_out).abs() < 1e-9);
    assert_eq!(core.power_in(), 0.0);
    assert_eq!(core.power_out(), 0.0);
}

#[test]
fn absolute_setters_integrate_independently() {
    let (telemetry, _) = memory_telemetry();
    let mut sup = Supervisor::new().with_telemetry(telemetry.clone());
    let id = add(
        &mut sup,
        Device::builder("eud_1", Recorder::new()).telemetry(telemetry),
    );

    sup.with_device(&id, |device, _ctx| {
        device.core_mut().set_power_in(30.0)?;
        device.update_time(600.0)?;
        device.core_mut().set_power_out(12.0)?;
        device.update_time(1200.0)?;
        device.core_mut().set_power_in(0.0)?;
        device.finish(2400.0)
    })
    .expect("scripted run");

    let core = sup.get_device(&id).expect("registered").core();
    // 30 W for 1200 s; 12 W out for 1800 s
    assert!((core.energy_in() - 10.0).abs() < 1e-9);
    assert!((core.energy_out() - 6.0).abs() < 1e-9);
}

#[test]
fn supplier_to_consumer_fifty_watts_for_an_hour() {
    let (telemetry, sink) = memory_telemetry();
    let mut sup = Supervisor::new().with_telemetry(telemetry.clone());

    let b = add(
        &mut sup,
        Device::builder("gc_b", Recorder::new())
            .connect(["eud_a"])
            .telemetry(telemetry.clone()),
    );
    let a = add(
        &mut sup,
        Device::builder("eud_a", Eud::new(FixedConsumption::new(50.0)))
            .connect(["gc_b"])
            .schedule([ScheduleEntry::new(0.0, Operation::TurnOn)])
            .telemetry(telemetry),
    );

    let to = a.clone();
    sup.with_device(&b, move |device, ctx| {
        device.core_mut().set_power_out(50.0)?;
        device.core().send_message(ctx, &to, MessageKind::Power, -50.0)
    })
    .expect("b supplies a");

    run_all(&mut sup);
    assert_eq!(sup.get_device(&a).expect("a").core().power_in(), 50.0);

    let report = sup.finish_all(3600.0).expect("finish");
    let a_energy = report.device("eud_a").expect("a reported");
    let b_energy = report.device("gc_b").expect("b reported");
    assert!((a_energy.energy_in_wh - 50.0).abs() < 1e-9);
    assert!((b_energy.energy_out_wh - 50.0).abs() < 1e-9);
    assert!(report.is_balanced(1e-9));

    let sums: Vec<f64> = sink
        .with_tag("power calcs")
        .into_iter()
        .filter(|n| n.device_id == "eud_a" && n.message == "sum Wh in")
        .filter_map(|n| n.value)
        .collect();
    assert_eq!(sums.len(), 1);
    assert!((sums[0] - 50.0).abs() < 1e-9);
}

#[test]
fn consumer_level_comes_from_received_power_alone() {
    let (telemetry, _) = memory_telemetry();
    let mut sup = Supervisor::new().with_telemetry(telemetry.clone());

    let b = add(
        &mut sup,
        Device::builder("gc_b", Recorder::new())
            .connect(["eud_a"])
            .telemetry(telemetry.clone()),
    );
    let consumer = Recorder::consumer();
    let a = add(
        &mut sup,
        Device::builder("eud_a", consumer.clone())
            .connect(["gc_b"])
            .telemetry(telemetry),
    );

    let to = a.clone();
    sup.with_device(&b, move |device, ctx| {
        device.core_mut().set_power_out(50.0)?;
        device.core().send_message(ctx, &to, MessageKind::Power, -50.0)
    })
    .expect("b supplies a");
    assert_eq!(sup.get_device(&a).expect("a").core().power_in(), 0.0);

    run_all(&mut sup);
    assert_eq!(consumer.calls().len(), 1);
    assert_eq!(sup.get_device(&a).expect("a").core().power_in(), 50.0);

    let report = sup.finish_all(3600.0).expect("finish");
    let a_energy = report.device("eud_a").expect("a reported");
    let b_energy = report.device("gc_b").expect("b reported");
    assert!((a_energy.energy_in_wh - 50.0).abs() < 1e-9);
    assert!((b_energy.energy_out_wh - 50.0).abs() < 1e-9);
    assert!(report.is_balanced(1e-9));
}

#[test]
fn register_from_unknown_device_fails_the_run() {
    let (telemetry, _) = memory_telemetry();
    let mut sup = Supervisor::new().with_telemetry(telemetry.clone());
    let eud = add(
        &mut sup,
        Device::builder("eud_1", Recorder::new()).telemetry(telemetry),
    );

    let ghost = DeviceId::from("gc_ghost");
    let message =
        lpdm_sim::sim::message::Message::new(0.0, ghost, MessageKind::Register, 1.0);
    sup.deliver(vec![lpdm_sim::sim::message::Envelope {
        to: eud,
        message,
    }])
    .expect("delivery only schedules");

    assert!(matches!(
        sup.occur_next_event(),
        Err(SimError::UnknownDevice(_))
    ));
}
