use std::time::Duration;
use tipping_core::equilibrium::critical_control;
use tipping_core::{
    trigger_cascade, CalibratedCusp, CascadeCatalog, CascadeRecord, CascadeSettings, Coupling,
    Element, Evolver, TippingNetwork, Trajectory,
};

fn calibrated() -> Element {
    CalibratedCusp::new(1.0, (-1.0, 1.0), (0.0, 1.0), 0.5)
        .unwrap()
        .into()
}

fn calibrated_chain(len: usize, strength: f64) -> TippingNetwork {
    let mut net = TippingNetwork::new();
    for _ in 0..len {
        net.add_element(calibrated());
    }
    for i in 1..len {
        net.add_coupling(i - 1, i, Coupling::linear(strength)).unwrap();
    }
    net
}

fn settings() -> CascadeSettings {
    CascadeSettings {
        tolerance: 1e-4,
        increment: 0.01,
        time_budget: Some(Duration::from_secs(30)),
        ..CascadeSettings::default()
    }
}

#[test]
fn cubic_fixed_points_and_their_stability() {
    let mut net = TippingNetwork::new();
    net.add_element(Element::cusp(-1.0, 1.0, 0.0, 0.0));
    for (x, stable) in [(-1.0, true), (0.0, false), (1.0, true)] {
        assert_eq!(net.f(&[x], 0.0).unwrap(), vec![0.0]);
        let slope = net.jac(&[x], 0.0).unwrap()[(0, 0)];
        assert_eq!(slope < 0.0, stable);
    }
    assert!(net.f(&[0.5], 0.0).unwrap()[0] != 0.0);
}

#[test]
fn strong_chain_tips_every_node() {
    let mut ev = Evolver::new(calibrated_chain(3, 0.5), &[-1.0, -1.0, -1.0]).unwrap();
    let outcome = trigger_cascade(&mut ev, 0, &settings()).unwrap();
    assert!(outcome.trigger_tipped);
    assert_eq!(outcome.cascade_size, Some(2));
    assert_eq!(outcome.tipped_nodes, vec![1, 2]);
    assert_eq!(ev.number_tipped(), 3);
    // The trigger's control left the bistable range near its upper end.
    assert!((outcome.final_controls[0] - 1.0).abs() < 0.02);
}

#[test]
fn zero_coupling_keeps_the_cascade_empty() {
    let mut ev = Evolver::new(calibrated_chain(3, 0.0), &[-1.0, -1.0, -1.0]).unwrap();
    let outcome = trigger_cascade(&mut ev, 0, &settings()).unwrap();
    assert!(outcome.trigger_tipped);
    assert_eq!(outcome.cascade_size, Some(0));
    assert!(outcome.tipped_nodes.is_empty());
    assert_eq!(ev.tip_states(), vec![true, false, false]);
}

#[test]
fn critical_control_of_a_calibrated_element_is_its_range_edge() {
    let net = calibrated_chain(1, 0.0);
    let critical = critical_control(&net, 0, 1e-3, &[-1.0], 10_000).unwrap();
    assert!((critical.control - 1.0).abs() < 5e-3, "{}", critical.control);
}

#[test]
fn network_and_catalog_survive_json() {
    let net = calibrated_chain(2, 0.5);
    let json = serde_json::to_string(&net).unwrap();
    let back: TippingNetwork = serde_json::from_str(&json).unwrap();
    let x = [-0.3, 0.8];
    assert_eq!(back.f(&x, 0.0).unwrap(), net.f(&x, 0.0).unwrap());
    assert_eq!(back.edge_count(), 1);

    let mut ev = Evolver::new(back, &[-1.0, -1.0]).unwrap();
    let outcome = trigger_cascade(&mut ev, 0, &settings()).unwrap();
    let mut catalog = CascadeCatalog::new();
    catalog.push(CascadeRecord::new("pair", &outcome, &ev));

    let path = std::env::temp_dir().join(format!("tipping_catalog_{}.json", std::process::id()));
    catalog
        .write_json(std::fs::File::create(&path).unwrap())
        .unwrap();
    let restored = CascadeCatalog::read_json(std::fs::File::open(&path).unwrap()).unwrap();
    std::fs::remove_file(&path).unwrap();

    let record = &restored.records()[0];
    assert_eq!(record.cascade_size, Some(1));
    let trajectory: &Trajectory = &record.trajectory;
    let last = trajectory.len() - 1;
    assert_eq!(
        trajectory.tip_states_at(ev.network(), last).unwrap(),
        vec![true, true]
    );
    assert!(CascadeCatalog::read_json(&b"{\"records\": 3}"[..]).is_err());
}
