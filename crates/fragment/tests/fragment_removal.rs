use pfa_event::{CaloHit, CartesianVector, Cluster, ClusterId, EventStore, Helix, Track, TrackId};
use pfa_fragment::{FragmentError, FragmentRemovalConfig, MainFragmentRemoval};
use pretty_assertions::assert_eq;
use proptest::prelude::*;

fn cluster_along_x(id: u32, layers: std::ops::RangeInclusive<u32>, y: f32, energy: f32) -> Cluster {
    Cluster::new(ClusterId(id)).with_hits(layers.map(|layer| {
        CaloHit::new(
            id * 1000 + layer,
            layer,
            CartesianVector::new(2000.0 + 20.0 * layer as f32, y, 0.0),
            energy,
        )
    }))
}

/// Tracked 15 GeV parent along +x, matched by a 15.5 GeV track
fn event_with_parent() -> EventStore {
    let mut store = EventStore::default();
    store
        .insert_track(Track::new(
            TrackId(1),
            15.5,
            Helix::straight(CartesianVector::zeros(), CartesianVector::new(15.5, 0.0, 0.0)),
        ))
        .unwrap();
    store
        .insert_cluster(cluster_along_x(1, 1..=30, 0.0, 0.5).with_track(TrackId(1)))
        .unwrap();
    store
}

fn algorithm() -> MainFragmentRemoval {
    MainFragmentRemoval::new(FragmentRemovalConfig::default()).unwrap()
}

#[test]
fn adjacent_fragment_is_merged_into_parent() {
    let mut store = event_with_parent();
    store.insert_cluster(cluster_along_x(2, 1..=12, 15.0, 0.05)).unwrap();

    let report = algorithm().run(&mut store).unwrap();

    assert_eq!(report.merges.len(), 1);
    assert_eq!(report.merges[0].parent, ClusterId(1));
    assert_eq!(report.merges[0].daughter, ClusterId(2));
    assert!(report.merges[0].excess_evidence > 0.0);
    assert_eq!(report.initial_clusters, 2);
    assert_eq!(report.final_clusters, 1);

    assert!(!store.contains_cluster(ClusterId(2)));
    let parent = store.cluster(ClusterId(1)).unwrap();
    assert_eq!(parent.n_calo_hits(), 42);
    assert!((parent.hadronic_energy() - 15.6).abs() < 1e-3);
}

#[test]
fn merge_evidence_matches_hand_calculation() {
    let mut store = event_with_parent();
    store.insert_cluster(cluster_along_x(2, 1..=12, 15.0, 0.05)).unwrap();

    let report = algorithm().run(&mut store).unwrap();
    let merge = &report.merges[0];

    // contact 4.0 + cone 13/12 + track 6.15 + distance 3.85
    assert!((merge.total_evidence - (14.0 + 13.0 / 12.0)).abs() < 1e-3);

    let old_chi = -0.5 / (0.6 * 15.5_f32.sqrt());
    let new_chi = 0.1 / (0.6 * 15.5_f32.sqrt());
    let chi2_evidence = 5.0 - (old_chi * old_chi - new_chi * new_chi);
    // Layer correction +2 (develops early in the ECal), energy correction 0.6 - 3
    assert!((merge.required_evidence - (chi2_evidence + 2.0 - 2.4)).abs() < 1e-3);
}

#[test]
fn fragment_with_too_few_hits_is_never_merged() {
    let mut store = event_with_parent();
    store.insert_cluster(cluster_along_x(2, 1..=3, 15.0, 0.05)).unwrap();
    let before = store.clone();

    let report = algorithm().run(&mut store).unwrap();

    assert!(report.merges.is_empty());
    assert_eq!(store, before);
}

#[test]
fn distant_fragment_is_left_alone() {
    let mut store = event_with_parent();
    store.insert_cluster(cluster_along_x(2, 1..=12, 900.0, 0.05)).unwrap();

    let report = algorithm().run(&mut store).unwrap();

    assert!(report.merges.is_empty());
    assert!(store.contains_cluster(ClusterId(2)));
}

#[test]
fn tracked_clusters_are_never_daughters() {
    let mut store = event_with_parent();
    store
        .insert_track(Track::new(
            TrackId(2),
            0.6,
            Helix::straight(CartesianVector::zeros(), CartesianVector::new(0.6, 0.0, 0.0)),
        ))
        .unwrap();
    store
        .insert_cluster(cluster_along_x(2, 1..=12, 15.0, 0.05).with_track(TrackId(2)))
        .unwrap();

    let report = algorithm().run(&mut store).unwrap();
    assert!(report.merges.is_empty());
    assert_eq!(store.n_clusters(), 2);
}

#[test]
fn fragments_on_both_sides_are_merged_one_per_iteration() {
    let mut store = event_with_parent();
    store.insert_cluster(cluster_along_x(2, 1..=12, 15.0, 0.05)).unwrap();
    // Shorter fragment, so it scores lower on the first pass
    store.insert_cluster(cluster_along_x(3, 1..=8, -15.0, 0.05)).unwrap();

    let report = algorithm().run(&mut store).unwrap();

    let daughters: Vec<ClusterId> = report.merges.iter().map(|merge| merge.daughter).collect();
    assert_eq!(daughters, vec![ClusterId(2), ClusterId(3)]);
    assert_eq!(report.iterations, 3);
    assert_eq!(store.n_clusters(), 1);
}

#[test]
fn converged_event_is_unchanged_by_second_run() {
    let mut store = event_with_parent();
    store.insert_cluster(cluster_along_x(2, 1..=12, 15.0, 0.05)).unwrap();
    store.insert_cluster(cluster_along_x(3, 1..=12, 900.0, 0.05)).unwrap();

    let algorithm = algorithm();
    algorithm.run(&mut store).unwrap();
    let converged = store.clone();

    let report = algorithm.run(&mut store).unwrap();
    assert!(report.merges.is_empty());
    assert_eq!(store, converged);
}

#[test]
fn zero_evidence_scale_fails_before_evaluation() {
    let config = FragmentRemovalConfig {
        distance_evidence_1d: 0.0,
        ..Default::default()
    };

    let err = MainFragmentRemoval::new(config).unwrap_err();
    match err {
        FragmentError::InvalidParameter { name, .. } => assert_eq!(name, "distance_evidence_1d"),
        other => panic!("unexpected error: {other}"),
    }
}

#[test]
fn zero_energy_track_aborts_the_run() {
    let mut store = EventStore::default();
    store
        .insert_track(Track::new(
            TrackId(1),
            0.0,
            Helix::straight(CartesianVector::zeros(), CartesianVector::new(1.0, 0.0, 0.0)),
        ))
        .unwrap();
    store
        .insert_cluster(cluster_along_x(1, 1..=30, 0.0, 0.5).with_track(TrackId(1)))
        .unwrap();
    store.insert_cluster(cluster_along_x(2, 1..=12, 15.0, 0.05)).unwrap();

    assert!(matches!(
        algorithm().run(&mut store),
        Err(FragmentError::InvalidParameter { .. })
    ));
    assert_eq!(store.n_clusters(), 2);
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(32))]

    #[test]
    fn cluster_count_never_grows(
        offsets in prop::collection::vec((-400.0f32..400.0, 1u32..20, 5u32..15, 0.01f32..0.3), 0..5)
    ) {
        let mut store = event_with_parent();
        for (index, (y, inner, n_layers, energy)) in offsets.into_iter().enumerate() {
            let id = 10 + index as u32;
            store.insert_cluster(cluster_along_x(id, inner..=inner + n_layers, y, energy)).unwrap();
        }
        let initial = store.n_clusters();

        let report = algorithm().run(&mut store).unwrap();

        prop_assert!(report.merges.len() < initial);
        prop_assert_eq!(store.n_clusters(), initial - report.merges.len());
        prop_assert!(store.contains_cluster(ClusterId(1)));
        for merge in &report.merges {
            prop_assert_eq!(merge.parent, ClusterId(1));
        }
    }
}
