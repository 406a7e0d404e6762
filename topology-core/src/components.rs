//! Mutation and query of the components of a deployment.

use std::collections::HashSet;
use std::ops::Deref;

use crate::error::{AppError, Result};
use crate::model::{
    Component, ComponentId, ComponentKind, ComponentMetadata, ComponentState, ConsensusNodeState, DeploymentPhase, DeploymentState, PriorityMapping, RelayNodeState,
};

impl DeploymentState {
    /// All components of the given kind.
    pub fn components_of(&self, kind: ComponentKind) -> Vec<Component> {
        let base = |list: &[ComponentState], wrap: fn(ComponentState) -> Component| -> Vec<Component> { list.iter().cloned().map(wrap).collect() };
        match kind {
            ComponentKind::ConsensusNodes => self.consensus_nodes.iter().cloned().map(Component::ConsensusNode).collect(),
            ComponentKind::RelayNodes => self.relay_nodes.iter().cloned().map(Component::RelayNode).collect(),
            ComponentKind::BlockNodes => base(&self.block_nodes, Component::BlockNode),
            ComponentKind::MirrorNodes => base(&self.mirror_nodes, Component::MirrorNode),
            ComponentKind::HaProxies => base(&self.ha_proxies, Component::HaProxy),
            ComponentKind::EnvoyProxies => base(&self.envoy_proxies, Component::EnvoyProxy),
            ComponentKind::Explorers => base(&self.explorers, Component::Explorer),
        }
    }

    /// Every component of the deployment.
    pub fn all_components(&self) -> Vec<Component> {
        ComponentKind::ALL.iter().flat_map(|kind| self.components_of(*kind)).collect()
    }

    fn metadata_of(&self, kind: ComponentKind) -> Vec<&ComponentMetadata> {
        fn base(list: &[ComponentState]) -> Vec<&ComponentMetadata> {
            list.iter().map(|state| &state.metadata).collect()
        }
        match kind {
            ComponentKind::ConsensusNodes => self.consensus_nodes.iter().map(|state| &state.metadata).collect(),
            ComponentKind::RelayNodes => self.relay_nodes.iter().map(|state| &state.metadata).collect(),
            ComponentKind::BlockNodes => base(&self.block_nodes),
            ComponentKind::MirrorNodes => base(&self.mirror_nodes),
            ComponentKind::HaProxies => base(&self.ha_proxies),
            ComponentKind::EnvoyProxies => base(&self.envoy_proxies),
            ComponentKind::Explorers => base(&self.explorers),
        }
    }

    /// The component of the given kind and id.
    pub fn component(&self, kind: ComponentKind, id: ComponentId) -> Option<Component> {
        self.components_of(kind).into_iter().find(|comp| comp.id() == id)
    }

    /// Check if a component of the given kind and id exists.
    pub fn contains(&self, kind: ComponentKind, id: ComponentId) -> bool {
        self.metadata_of(kind).iter().any(|meta| meta.id == id)
    }

    /// All components placed in the given cluster.
    pub fn components_in_cluster(&self, cluster: &str) -> Vec<Component> {
        self.all_components().into_iter().filter(|comp| comp.metadata().cluster == cluster).collect()
    }

    /// All components placed in the given namespace.
    pub fn components_in_namespace(&self, namespace: &str) -> Vec<Component> {
        self.all_components().into_iter().filter(|comp| comp.metadata().namespace == namespace).collect()
    }

    /// The highest id held by a component of the given kind.
    pub fn highest_component_id(&self, kind: ComponentKind) -> Option<ComponentId> {
        self.metadata_of(kind).iter().map(|meta| meta.id).max()
    }

    /// Check every component, and that ids are unique within each kind.
    pub fn validate(&self) -> Result<()> {
        for kind in ComponentKind::ALL.iter() {
            let mut seen = HashSet::new();
            for comp in self.components_of(*kind) {
                comp.validate()?;
                if !seen.insert(comp.id()) {
                    return Err(AppError::ComponentExists { kind: *kind, id: comp.id() });
                }
            }
        }
        Ok(())
    }
}

/// The mutation API over the components of a deployment's state.
///
/// The wrapper borrows the state it mutates, it never holds a copy. Reads go through to the
/// state via `Deref`.
#[derive(Debug)]
pub struct ComponentsDataWrapper<'a> {
    state: &'a mut DeploymentState,
}

impl<'a> Deref for ComponentsDataWrapper<'a> {
    type Target = DeploymentState;

    fn deref(&self) -> &Self::Target {
        &*self.state
    }
}

impl<'a> ComponentsDataWrapper<'a> {
    pub fn new(state: &'a mut DeploymentState) -> Self {
        Self { state }
    }

    /// The id the next component of the given kind should receive. Does not allocate it.
    pub fn get_new_component_id(&self, kind: ComponentKind) -> ComponentId {
        self.state.component_ids.get(kind) + 1
    }

    /// Move the counter of the given kind to at least the highest id in use.
    pub fn update_highest_component_id(&mut self, kind: ComponentKind) {
        if let Some(highest) = self.state.highest_component_id(kind) {
            self.state.component_ids.advance(kind, highest);
        }
    }

    /// Build a consensus node. It starts out either requested or started.
    pub fn create_new_consensus_node_component(
        &self, id: ComponentId, cluster: &str, namespace: &str, phase: DeploymentPhase, block_node_map: Vec<PriorityMapping>,
    ) -> Result<Component> {
        if !matches!(phase, DeploymentPhase::Requested | DeploymentPhase::Started) {
            return Err(AppError::IllegalArgument(format!("consensus nodes are created requested or started, not {}", phase)));
        }
        let block_node_ids = block_node_map.iter().map(|mapping| mapping.block_node_id).collect();
        let comp = Component::ConsensusNode(ConsensusNodeState {
            metadata: ComponentMetadata::new(id, cluster, namespace, phase),
            block_node_ids,
            block_node_map,
        });
        comp.validate()?;
        Ok(comp)
    }

    /// Build a relay submitting to the given consensus nodes.
    pub fn create_new_relay_component(&self, id: ComponentId, cluster: &str, namespace: &str, consensus_node_ids: Vec<ComponentId>) -> Result<Component> {
        let comp = Component::RelayNode(RelayNodeState {
            metadata: ComponentMetadata::new(id, cluster, namespace, DeploymentPhase::Requested),
            consensus_node_ids,
        });
        comp.validate()?;
        Ok(comp)
    }

    pub fn create_new_block_node_component(&self, id: ComponentId, cluster: &str, namespace: &str) -> Result<Component> {
        self.create_base_component(ComponentKind::BlockNodes, id, cluster, namespace)
    }

    pub fn create_new_mirror_node_component(&self, id: ComponentId, cluster: &str, namespace: &str) -> Result<Component> {
        self.create_base_component(ComponentKind::MirrorNodes, id, cluster, namespace)
    }

    pub fn create_new_ha_proxy_component(&self, id: ComponentId, cluster: &str, namespace: &str) -> Result<Component> {
        self.create_base_component(ComponentKind::HaProxies, id, cluster, namespace)
    }

    pub fn create_new_envoy_proxy_component(&self, id: ComponentId, cluster: &str, namespace: &str) -> Result<Component> {
        self.create_base_component(ComponentKind::EnvoyProxies, id, cluster, namespace)
    }

    pub fn create_new_explorer_component(&self, id: ComponentId, cluster: &str, namespace: &str) -> Result<Component> {
        self.create_base_component(ComponentKind::Explorers, id, cluster, namespace)
    }

    fn create_base_component(&self, kind: ComponentKind, id: ComponentId, cluster: &str, namespace: &str) -> Result<Component> {
        let comp = Component::from_metadata(kind, ComponentMetadata::new(id, cluster, namespace, DeploymentPhase::Requested));
        comp.validate()?;
        Ok(comp)
    }

    /// Insert a component, advancing its kind's counter past its id.
    pub fn add_new_component(&mut self, component: Component) -> Result<()> {
        component.validate()?;
        let (kind, id) = (component.kind(), component.id());
        if self.state.contains(kind, id) {
            return Err(AppError::ComponentExists { kind, id });
        }
        match component {
            Component::ConsensusNode(state) => self.state.consensus_nodes.push(state),
            Component::RelayNode(state) => self.state.relay_nodes.push(state),
            Component::BlockNode(state) => self.state.block_nodes.push(state),
            Component::MirrorNode(state) => self.state.mirror_nodes.push(state),
            Component::HaProxy(state) => self.state.ha_proxies.push(state),
            Component::EnvoyProxy(state) => self.state.envoy_proxies.push(state),
            Component::Explorer(state) => self.state.explorers.push(state),
        }
        self.state.component_ids.advance(kind, id);
        tracing::debug!(%kind, id, "added component");
        Ok(())
    }

    /// Remove a component. Its id is never handed out again.
    pub fn remove_by_id(&mut self, kind: ComponentKind, id: ComponentId) -> Result<Component> {
        fn take<T, F: Fn(&T) -> ComponentId>(list: &mut Vec<T>, id: ComponentId, id_of: F) -> Option<T> {
            let idx = list.iter().position(|item| id_of(item) == id)?;
            Some(list.remove(idx))
        }
        let state = &mut *self.state;
        let removed = match kind {
            ComponentKind::ConsensusNodes => take(&mut state.consensus_nodes, id, |item| item.metadata.id).map(Component::ConsensusNode),
            ComponentKind::RelayNodes => take(&mut state.relay_nodes, id, |item| item.metadata.id).map(Component::RelayNode),
            ComponentKind::BlockNodes => take(&mut state.block_nodes, id, |item| item.metadata.id).map(Component::BlockNode),
            ComponentKind::MirrorNodes => take(&mut state.mirror_nodes, id, |item| item.metadata.id).map(Component::MirrorNode),
            ComponentKind::HaProxies => take(&mut state.ha_proxies, id, |item| item.metadata.id).map(Component::HaProxy),
            ComponentKind::EnvoyProxies => take(&mut state.envoy_proxies, id, |item| item.metadata.id).map(Component::EnvoyProxy),
            ComponentKind::Explorers => take(&mut state.explorers, id, |item| item.metadata.id).map(Component::Explorer),
        };
        let removed = removed.ok_or(AppError::ComponentNotFound { kind, id })?;
        tracing::debug!(%kind, id, "removed component");
        Ok(removed)
    }

    /// Move a component to a new phase.
    pub fn change_component_phase(&mut self, kind: ComponentKind, id: ComponentId, phase: DeploymentPhase) -> Result<()> {
        let state = &mut *self.state;
        let metadata = match kind {
            ComponentKind::ConsensusNodes => state.consensus_nodes.iter_mut().map(|item| &mut item.metadata).find(|meta| meta.id == id),
            ComponentKind::RelayNodes => state.relay_nodes.iter_mut().map(|item| &mut item.metadata).find(|meta| meta.id == id),
            ComponentKind::BlockNodes => state.block_nodes.iter_mut().map(|item| &mut item.metadata).find(|meta| meta.id == id),
            ComponentKind::MirrorNodes => state.mirror_nodes.iter_mut().map(|item| &mut item.metadata).find(|meta| meta.id == id),
            ComponentKind::HaProxies => state.ha_proxies.iter_mut().map(|item| &mut item.metadata).find(|meta| meta.id == id),
            ComponentKind::EnvoyProxies => state.envoy_proxies.iter_mut().map(|item| &mut item.metadata).find(|meta| meta.id == id),
            ComponentKind::Explorers => state.explorers.iter_mut().map(|item| &mut item.metadata).find(|meta| meta.id == id),
        };
        let metadata = metadata.ok_or(AppError::ComponentNotFound { kind, id })?;
        metadata.phase = phase;
        Ok(())
    }
}
