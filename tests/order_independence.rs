//! Arrival-order independence of the aggregation stage.
//!
//! Whatever permutation a change set arrives in, the final grouping is the
//! same: one group per shared leaf value, no stragglers, no duplicates.

use proptest::prelude::*;
use topo_fuse::manager::RecordingManager;
use topo_fuse::prelude::*;

fn node(id: &str, ip: &str) -> UnderlayItem {
    UnderlayItem::new(
        TopologyId::new("fabric"),
        ItemId::new(id),
        CorrelationKind::Node,
    )
    .with_leaf("ip", LeafValue::from(ip))
}

/// Six nodes in one intra-aggregating topology: three share `10.0.0.1`, two
/// share `10.0.0.2`, one is alone.
fn fleet() -> Vec<UnderlayItem> {
    vec![
        node("n0", "10.0.0.1"),
        node("n1", "10.0.0.2"),
        node("n2", "10.0.0.1"),
        node("n3", "10.0.0.2"),
        node("n4", "10.0.0.1"),
        node("n5", "10.0.0.3"),
    ]
}

fn aggregate(order: &[usize]) -> (TopologyAggregator, RecordingManager) {
    let mut aggregator = TopologyAggregator::new(AggregationPolicy::Equality);
    aggregator.initialize_store(TopologyId::new("fabric"), true);
    let mut manager = RecordingManager::new();
    let items = fleet();
    for &i in order {
        aggregator
            .process_created_changes(
                vec![items[i].clone()],
                &TopologyId::new("fabric"),
                &mut manager,
            )
            .unwrap();
    }
    (aggregator, manager)
}

proptest! {
    #[test]
    fn any_permutation_converges_to_the_same_grouping(
        order in Just((0..6usize).collect::<Vec<_>>()).prop_shuffle()
    ) {
        let (aggregator, _manager) = aggregate(&order);
        prop_assert_eq!(aggregator.group_count(), 2);

        let store = aggregator
            .provider()
            .get_store(&TopologyId::new("fabric"))
            .unwrap();
        // n5 never finds a partner; everyone else is linked
        for (id, item) in store.iter() {
            if id.as_str() == "n5" {
                prop_assert!(item.overlay().is_none());
            } else {
                prop_assert!(item.overlay().is_some());
            }
        }
        // the two groups split 3/2 over the shared values
        let group_of = |name: &str| {
            store.get(&ItemId::new(name)).unwrap().overlay().unwrap()
        };
        prop_assert_eq!(group_of("n0"), group_of("n2"));
        prop_assert_eq!(group_of("n0"), group_of("n4"));
        prop_assert_eq!(group_of("n1"), group_of("n3"));
        prop_assert_ne!(group_of("n0"), group_of("n1"));
    }

    #[test]
    fn exactly_one_add_per_group_in_any_order(
        order in Just((0..6usize).collect::<Vec<_>>()).prop_shuffle()
    ) {
        let (_aggregator, manager) = aggregate(&order);
        prop_assert_eq!(manager.added(), 2);
    }
}

#[test]
fn two_topology_scenario_matches_in_both_orders() {
    for flip in [false, true] {
        let mut aggregator = TopologyAggregator::new(AggregationPolicy::Equality);
        aggregator.initialize_store(TopologyId::new("a"), false);
        aggregator.initialize_store(TopologyId::new("b"), false);
        let mut manager = RecordingManager::new();

        let mut batches = vec![
            (TopologyId::new("a"), "n1"),
            (TopologyId::new("b"), "n1"),
        ];
        if flip {
            batches.reverse();
        }
        for (topology, id) in batches {
            let item = UnderlayItem::new(topology.clone(), ItemId::new(id), CorrelationKind::Node)
                .with_leaf("ip", LeafValue::from("192.168.1.1"));
            aggregator
                .process_created_changes(vec![item], &topology, &mut manager)
                .unwrap();
        }
        assert_eq!(manager.added(), 1, "flip={flip}");
        assert_eq!(aggregator.group_count(), 1);
    }
}
