//! Property-based tests: wire codec truncation and store merge rules.

use adelphon_core::codec::{decode, Frame, Report, SenderKind, TerrainObservation};
use adelphon_core::{GameConfig, KnowledgeStore, Location, Terrain};
use proptest::prelude::*;

fn arb_location() -> impl Strategy<Value = Location> {
    (0usize..100, 0usize..100).prop_map(|(row, col)| Location::new(row, col))
}

fn arb_terrain() -> impl Strategy<Value = Terrain> {
    prop::sample::select(Terrain::ALL.to_vec())
}

fn arb_observation() -> impl Strategy<Value = TerrainObservation> {
    (arb_location(), arb_terrain()).prop_map(|(loc, t)| TerrainObservation::new(loc, t))
}

fn arb_kind() -> impl Strategy<Value = SenderKind> {
    prop_oneof![Just(SenderKind::Runner), Just(SenderKind::Relayer)]
}

fn arb_report() -> impl Strategy<Value = Report> {
    (
        arb_kind(),
        0u32..64,
        proptest::collection::vec(arb_location(), 0..4),
        proptest::option::of(arb_location()),
        proptest::collection::vec(arb_location(), 0..8),
        proptest::collection::vec(arb_observation(), 0..30),
    )
        .prop_map(|(kind, id, locations, treasure, animals, terrain)| Report {
            kind,
            id,
            locations,
            treasure,
            animals,
            terrain,
        })
}

/// Descending ordinal, ties by ascending location.
fn interest_order(terrain: &[TerrainObservation]) -> Vec<TerrainObservation> {
    let mut sorted = terrain.to_vec();
    sorted.sort_by(|a, b| b.terrain.cmp(&a.terrain).then(a.location.cmp(&b.location)));
    sorted
}

fn decode_report(frame: &str) -> Report {
    match decode(frame).unwrap() {
        Frame::Report(report) => report,
        other => panic!("expected a report, got {:?}", other),
    }
}

proptest! {
    #[test]
    fn untruncated_round_trip(report in arb_report()) {
        let decoded = decode_report(&report.encode(8092));
        prop_assert_eq!(decoded.kind, report.kind);
        prop_assert_eq!(decoded.id, report.id);
        prop_assert_eq!(&decoded.locations, &report.locations);
        prop_assert_eq!(decoded.treasure, report.treasure);
        prop_assert_eq!(&decoded.animals, &report.animals);
        prop_assert_eq!(decoded.terrain, interest_order(&report.terrain));
    }

    #[test]
    fn budget_never_exceeded(report in arb_report(), limit in 0usize..200) {
        let mandatory = report.encode(0).len();
        let encoded = report.encode(limit);
        prop_assert!(encoded.len() <= limit.max(mandatory));
    }

    #[test]
    fn truncation_keeps_prefixes(report in arb_report(), limit in 0usize..200) {
        let decoded = decode_report(&report.encode(limit));

        // never dropped
        prop_assert_eq!(&decoded.locations, &report.locations);
        prop_assert_eq!(decoded.treasure, report.treasure);

        prop_assert_eq!(&decoded.animals[..], &report.animals[..decoded.animals.len()]);
        let sorted = interest_order(&report.terrain);
        prop_assert_eq!(&decoded.terrain[..], &sorted[..decoded.terrain.len()]);

        // highest ordinals survive first
        if let (Some(kept), Some(dropped)) =
            (decoded.terrain.last(), sorted.get(decoded.terrain.len()))
        {
            prop_assert!(kept.terrain >= dropped.terrain);
        }
    }

    #[test]
    fn treasure_is_permanent(
        first in arb_location(),
        later in proptest::collection::vec(proptest::option::of(arb_location()), 0..10),
    ) {
        let mut store = KnowledgeStore::for_relayer(&GameConfig::default());
        let mut report = Report::new(SenderKind::Runner, 0, vec![Location::new(0, 0)]);
        report.treasure = Some(first);
        store.observe(&report);

        for treasure in later {
            report.treasure = treasure;
            store.observe(&report);
            store.reset_tick();
        }
        prop_assert_eq!(store.treasure(), Some(first));
    }

    #[test]
    fn animals_do_not_survive_empty_observation(
        animals in proptest::collection::vec(arb_location(), 1..10),
    ) {
        let mut store = KnowledgeStore::for_runner(&GameConfig::default());
        let mut report = Report::new(SenderKind::Runner, 0, vec![Location::new(0, 0)]);
        report.animals = animals;
        store.observe(&report);
        prop_assert!(!store.animals().is_empty());

        report.animals.clear();
        store.observe(&report);
        prop_assert!(store.animals().is_empty());
    }
}
