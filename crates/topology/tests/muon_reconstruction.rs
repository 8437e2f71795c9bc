use pfa_event::{CaloHit, CartesianVector, Cluster, ClusterId, EventStore, Helix, Track, TrackId};
use pfa_topology::{MuonReconstruction, MuonReconstructionConfig};
use pretty_assertions::assert_eq;

/// Direction shared by the muon track and the muon-system cluster
fn outgoing() -> CartesianVector {
    CartesianVector::new(10.0, 0.0, 0.5)
}

fn track(id: u32, energy: f32, momentum: CartesianVector) -> Track {
    Track::new(TrackId(id), energy, Helix::straight(CartesianVector::zeros(), momentum))
}

/// Straight muon-system cluster over `n_layers` layers, starting at (4000, 0, 200)
fn muon_cluster(id: u32, n_layers: u32) -> Cluster {
    Cluster::new(ClusterId(id)).with_hits((0..n_layers).map(|k| {
        let position = CartesianVector::new(4000.0, 0.0, 200.0) + outgoing() * (5.0 * k as f32);
        CaloHit::new(id * 100 + k, 1 + k, position, 0.05)
    }))
}

fn calo_hit(id: u32, layer: u32, x: f32, y: f32) -> CaloHit {
    CaloHit::new(id, layer, CartesianVector::new(x, y, 0.05 * x), 0.1).with_cell_length_scale(10.0)
}

/// Calorimeter hits around the path of a track along `outgoing()`
fn calo_hits() -> Vec<CaloHit> {
    vec![
        // Tight pair: both absorbed
        calo_hit(101, 10, 1000.0, 0.0),
        calo_hit(102, 10, 1000.0, 25.0),
        // Busy layer: only the closest absorbed
        calo_hit(111, 11, 1100.0, 5.0),
        calo_hit(112, 11, 1100.0, 45.0),
        // Too far from the track
        calo_hit(121, 12, 1200.0, 70.0),
        calo_hit(131, 13, 1300.0, 0.0).with_isolated(true),
        // Already owned by a calorimeter cluster
        calo_hit(1, 40, 2000.0, 0.0),
    ]
}

fn algorithm() -> MuonReconstruction {
    MuonReconstruction::new(MuonReconstructionConfig::default()).unwrap()
}

fn muon_event() -> EventStore {
    let mut store = EventStore::default();
    store.insert_track(track(1, 5.0, outgoing())).unwrap();
    store.insert_track(track(3, 20.0, CartesianVector::new(0.0, 10.0, 0.5))).unwrap();
    store.insert_track(track(4, 3.0, outgoing())).unwrap();
    store
        .insert_track(track(5, 30.0, outgoing()).with_daughter_track(TrackId(4)))
        .unwrap();
    let mut no_pfo = track(6, 30.0, outgoing());
    no_pfo.can_form_pfo = false;
    store.insert_track(no_pfo).unwrap();
    store.insert_track(track(7, 50.0, outgoing())).unwrap();

    store
        .insert_cluster(
            Cluster::new(ClusterId(1))
                .with_hits([calo_hit(1, 40, 2000.0, 0.0)])
                .with_track(TrackId(7)),
        )
        .unwrap();
    store.insert_muon_cluster(muon_cluster(10, 10)).unwrap();
    store.insert_hit_list("CaloHits", calo_hits());
    store
}

#[test]
fn muon_cluster_takes_its_track_and_the_hits_along_it() {
    let mut store = muon_event();

    let report = algorithm().run(&mut store).unwrap();

    assert_eq!(report.muon_clusters, 1);
    assert_eq!(report.associations.len(), 1);
    assert_eq!(report.associations[0].cluster, ClusterId(10));
    assert_eq!(report.associations[0].track, TrackId(1));
    assert!(report.associations[0].distance_to_track < 1.0);

    let absorbed: Vec<u32> = report.absorbed_hits.iter().map(|hit| hit.hit).collect();
    assert_eq!(absorbed, vec![101, 102, 111]);
    assert!((report.absorbed_hits[1].generic_distance - 2.5).abs() < 1e-2);

    let muon = store.muon_cluster(ClusterId(10)).unwrap();
    assert_eq!(muon.associated_tracks, vec![TrackId(1)]);
    assert_eq!(muon.n_calo_hits(), 13);
    assert_eq!(store.cluster(ClusterId(1)).unwrap().n_calo_hits(), 1);
}

#[test]
fn equal_distances_prefer_the_more_energetic_track() {
    let mut store = EventStore::default();
    store.insert_track(track(1, 5.0, outgoing())).unwrap();
    store.insert_track(track(2, 9.0, outgoing())).unwrap();
    store.insert_muon_cluster(muon_cluster(10, 10)).unwrap();

    let report = algorithm().run(&mut store).unwrap();

    assert_eq!(report.associations.len(), 1);
    assert_eq!(report.associations[0].track, TrackId(2));
}

#[test]
fn a_track_serves_one_muon_cluster() {
    let mut store = muon_event();
    store.insert_muon_cluster(muon_cluster(11, 10)).unwrap();

    let report = algorithm().run(&mut store).unwrap();

    assert_eq!(report.associations.len(), 1);
    assert_eq!(report.associations[0].cluster, ClusterId(10));
    assert!(report.absorbed_hits.iter().all(|hit| hit.cluster == ClusterId(10)));
    assert!(store.muon_cluster(ClusterId(11)).unwrap().associated_tracks.is_empty());
}

#[test]
fn short_muon_clusters_are_left_alone() {
    let mut store = muon_event();
    let mut short = EventStore::default();
    for track in store.tracks() {
        short.insert_track(track.clone()).unwrap();
    }
    short.insert_muon_cluster(muon_cluster(10, 5)).unwrap();
    short.insert_hit_list("CaloHits", calo_hits());
    let before = short.clone();

    let report = algorithm().run(&mut short).unwrap();

    assert!(report.associations.is_empty());
    assert!(report.absorbed_hits.is_empty());
    assert_eq!(short, before);

    // The full-length cluster in the original event still associates
    assert_eq!(algorithm().run(&mut store).unwrap().associations.len(), 1);
}

#[test]
fn missing_calo_hit_list_only_skips_hit_absorption() {
    let mut store = EventStore::default();
    store.insert_track(track(1, 5.0, outgoing())).unwrap();
    store.insert_muon_cluster(muon_cluster(10, 10)).unwrap();

    let report = algorithm().run(&mut store).unwrap();

    assert_eq!(report.associations.len(), 1);
    assert!(report.absorbed_hits.is_empty());
    assert_eq!(store.muon_cluster(ClusterId(10)).unwrap().n_calo_hits(), 10);
}

#[test]
fn event_without_muon_clusters_is_untouched() {
    let mut store = muon_event();
    let mut calo_only = EventStore::default();
    for track in store.tracks() {
        calo_only.insert_track(track.clone()).unwrap();
    }
    calo_only.insert_hit_list("CaloHits", calo_hits());
    let before = calo_only.clone();

    let report = algorithm().run(&mut calo_only).unwrap();

    assert_eq!(report.muon_clusters, 0);
    assert_eq!(calo_only, before);
    assert_eq!(algorithm().run(&mut store).unwrap().muon_clusters, 1);
}
