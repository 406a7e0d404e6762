use anyhow::Result;

use crate::components::ComponentsDataWrapper;
use crate::model::{ComponentKind, DeploymentPhase, DeploymentState, PriorityMapping};
use crate::AppError;

fn state_with_block_nodes(ids: &[i64]) -> Result<DeploymentState> {
    let mut state = DeploymentState::default();
    let mut wrapper = ComponentsDataWrapper::new(&mut state);
    for id in ids {
        let node = wrapper.create_new_block_node_component(*id, "cluster-a", "ledger")?;
        wrapper.add_new_component(node)?;
    }
    Ok(state)
}

fn state_with_consensus_nodes(ids: &[i64]) -> Result<DeploymentState> {
    let mut state = DeploymentState::default();
    let mut wrapper = ComponentsDataWrapper::new(&mut state);
    for id in ids {
        let node = wrapper.create_new_consensus_node_component(*id, "cluster-a", "ledger", DeploymentPhase::Requested, vec![])?;
        wrapper.add_new_component(node)?;
    }
    Ok(state)
}

#[test]
fn new_component_ids_are_not_allocated_until_used() -> Result<()> {
    let mut state = DeploymentState::default();
    let wrapper = ComponentsDataWrapper::new(&mut state);
    let first = wrapper.get_new_component_id(ComponentKind::MirrorNodes);
    let second = wrapper.get_new_component_id(ComponentKind::MirrorNodes);
    assert!(first == second, "expected repeated calls to return the same id, got {} and {}", first, second);
    assert!(state.component_ids.get(ComponentKind::MirrorNodes) == 0, "expected counter to be untouched");
    Ok(())
}

#[test]
fn new_component_ids_follow_the_highest_id() -> Result<()> {
    let mut state = state_with_block_nodes(&[0, 1, 4])?;
    let mut wrapper = ComponentsDataWrapper::new(&mut state);
    wrapper.update_highest_component_id(ComponentKind::BlockNodes);
    let next = wrapper.get_new_component_id(ComponentKind::BlockNodes);
    assert!(next == 5, "unexpected next block node id, got {}, expected 5", next);
    Ok(())
}

#[test]
fn removed_ids_are_never_reused() -> Result<()> {
    let mut state = state_with_block_nodes(&[0, 1, 4])?;
    let mut wrapper = ComponentsDataWrapper::new(&mut state);
    let removed = wrapper.remove_by_id(ComponentKind::BlockNodes, 4)?;
    assert!(removed.id() == 4, "unexpected removed component {:?}", removed);

    wrapper.update_highest_component_id(ComponentKind::BlockNodes);
    let next = wrapper.get_new_component_id(ComponentKind::BlockNodes);
    assert!(next == 5, "unexpected next block node id after removal, got {}, expected 5", next);
    assert!(!wrapper.contains(ComponentKind::BlockNodes, 4), "expected block node 4 to be gone");
    Ok(())
}

#[test]
fn new_consensus_node_ids_follow_the_highest_id() -> Result<()> {
    let mut state = state_with_consensus_nodes(&[0, 1, 4])?;
    let mut wrapper = ComponentsDataWrapper::new(&mut state);
    wrapper.update_highest_component_id(ComponentKind::ConsensusNodes);
    let next = wrapper.get_new_component_id(ComponentKind::ConsensusNodes);
    assert!(next == 5, "unexpected next consensus node id, got {}, expected 5", next);
    Ok(())
}

#[test]
fn removed_consensus_node_ids_are_never_reused() -> Result<()> {
    let mut state = state_with_consensus_nodes(&[0, 1, 4])?;
    let mut wrapper = ComponentsDataWrapper::new(&mut state);
    let removed = wrapper.remove_by_id(ComponentKind::ConsensusNodes, 4)?;
    assert!(removed.id() == 4, "unexpected removed component {:?}", removed);

    wrapper.update_highest_component_id(ComponentKind::ConsensusNodes);
    let next = wrapper.get_new_component_id(ComponentKind::ConsensusNodes);
    assert!(next == 5, "unexpected next consensus node id after removal, got {}, expected 5", next);
    assert!(!wrapper.contains(ComponentKind::ConsensusNodes, 4), "expected consensus node 4 to be gone");
    Ok(())
}

#[test]
fn relays_reject_negative_consensus_node_ids() -> Result<()> {
    let mut state = DeploymentState::default();
    let wrapper = ComponentsDataWrapper::new(&mut state);
    let res = wrapper.create_new_relay_component(0, "cluster-a", "ledger", vec![-1]);
    assert!(
        matches!(res, Err(AppError::ComponentValidation { field: "consensusNodeIds", .. })),
        "expected negative consensus node id to be rejected, got {:?}",
        res
    );
    Ok(())
}

#[test]
fn relays_are_retrievable_once_added() -> Result<()> {
    let mut state = DeploymentState::default();
    let mut wrapper = ComponentsDataWrapper::new(&mut state);
    let id = wrapper.get_new_component_id(ComponentKind::RelayNodes);
    let relay = wrapper.create_new_relay_component(id, "cluster-a", "ledger", vec![0, 1])?;
    wrapper.add_new_component(relay.clone())?;

    let found = state.component(ComponentKind::RelayNodes, id);
    assert!(found.as_ref() == Some(&relay), "unexpected relay {:?}, expected {:?}", found, relay);
    assert!(state.relay_nodes[0].consensus_node_ids == vec![0, 1], "unexpected consensus node ids {:?}", state.relay_nodes[0].consensus_node_ids);
    assert!(state.component_ids.get(ComponentKind::RelayNodes) == id, "expected counter to advance to {}", id);
    Ok(())
}

#[test]
fn components_require_a_placement() -> Result<()> {
    let mut state = DeploymentState::default();
    let wrapper = ComponentsDataWrapper::new(&mut state);
    let res = wrapper.create_new_explorer_component(1, " ", "ledger");
    assert!(
        matches!(res, Err(AppError::ComponentValidation { field: "cluster", .. })),
        "expected empty cluster to be rejected, got {:?}",
        res
    );
    let res = wrapper.create_new_mirror_node_component(1, "cluster-a", "Ledger_NS");
    assert!(
        matches!(res, Err(AppError::ComponentValidation { field: "namespace", .. })),
        "expected namespace outside of DNS label rules to be rejected, got {:?}",
        res
    );
    let res = wrapper.create_new_ha_proxy_component(-3, "cluster-a", "ledger");
    assert!(matches!(res, Err(AppError::ComponentValidation { field: "id", .. })), "expected negative id to be rejected, got {:?}", res);
    Ok(())
}

#[test]
fn duplicate_ids_are_rejected_within_a_kind() -> Result<()> {
    let mut state = state_with_block_nodes(&[1])?;
    let mut wrapper = ComponentsDataWrapper::new(&mut state);
    let dup = wrapper.create_new_block_node_component(1, "cluster-b", "ledger")?;
    let res = wrapper.add_new_component(dup);
    assert!(
        matches!(res, Err(AppError::ComponentExists { kind: ComponentKind::BlockNodes, id: 1 })),
        "expected duplicate id to be rejected, got {:?}",
        res
    );

    let mirror = wrapper.create_new_mirror_node_component(1, "cluster-b", "ledger")?;
    wrapper.add_new_component(mirror)?;
    assert!(state.all_components().len() == 2, "expected the same id to be usable across kinds");
    Ok(())
}

#[test]
fn removing_a_missing_component_fails() -> Result<()> {
    let mut state = DeploymentState::default();
    let mut wrapper = ComponentsDataWrapper::new(&mut state);
    let res = wrapper.remove_by_id(ComponentKind::EnvoyProxies, 7);
    assert!(
        matches!(res, Err(AppError::ComponentNotFound { kind: ComponentKind::EnvoyProxies, id: 7 })),
        "expected missing component error, got {:?}",
        res
    );
    Ok(())
}

#[test]
fn consensus_nodes_start_requested_or_started() -> Result<()> {
    let mut state = DeploymentState::default();
    let mut wrapper = ComponentsDataWrapper::new(&mut state);
    let mapping = vec![PriorityMapping { block_node_id: 0, priority: 1 }];

    let res = wrapper.create_new_consensus_node_component(0, "cluster-a", "ledger", DeploymentPhase::Frozen, mapping.clone());
    assert!(matches!(res, Err(AppError::IllegalArgument(_))), "expected frozen phase to be rejected, got {:?}", res);

    let node = wrapper.create_new_consensus_node_component(0, "cluster-a", "ledger", DeploymentPhase::Started, mapping)?;
    wrapper.add_new_component(node)?;
    wrapper.change_component_phase(ComponentKind::ConsensusNodes, 0, DeploymentPhase::Stopped)?;

    let node = &state.consensus_nodes[0];
    assert!(node.metadata.phase == DeploymentPhase::Stopped, "unexpected phase {}", node.metadata.phase);
    assert!(node.block_node_ids == vec![0], "unexpected block node ids {:?}", node.block_node_ids);
    Ok(())
}

#[test]
fn components_can_be_queried_by_placement() -> Result<()> {
    let mut state = state_with_block_nodes(&[0, 1])?;
    let mut wrapper = ComponentsDataWrapper::new(&mut state);
    let mirror = wrapper.create_new_mirror_node_component(0, "cluster-b", "mirror")?;
    wrapper.add_new_component(mirror)?;

    assert!(state.components_in_cluster("cluster-a").len() == 2, "unexpected components in cluster-a");
    assert!(state.components_in_cluster("cluster-b").len() == 1, "unexpected components in cluster-b");
    assert!(state.components_in_namespace("mirror").len() == 1, "unexpected components in namespace mirror");
    assert!(state.highest_component_id(ComponentKind::BlockNodes) == Some(1), "unexpected highest block node id");
    assert!(state.highest_component_id(ComponentKind::Explorers).is_none(), "expected no explorers");
    state.validate()?;
    Ok(())
}
