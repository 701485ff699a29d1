use crate::error::EnvError;
use serde::{Deserialize, Serialize};
use std::sync::{PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};
use tracing::{debug, info};

/// Entity as held by the store
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct EntityRecord {
    /// Unique entity name
    pub name: String,

    /// Optional domain type (e.g. "marine", "worker")
    pub kind: Option<String>,

    /// Agent the entity is associated with; `None` means free
    pub owner: Option<String>,
}

/// Point-in-time copy of the whole relation
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct RelationSnapshot {
    /// Registered agents in registration order
    pub agents: Vec<String>,

    /// Entities in creation order
    pub entities: Vec<EntityRecord>,
}

#[derive(Default)]
struct Relations {
    agents: Vec<String>,
    entities: Vec<EntityRecord>,
}

impl Relations {
    fn has_agent(&self, agent: &str) -> bool {
        self.agents.iter().any(|a| a == agent)
    }

    fn entity(&self, entity: &str) -> Option<&EntityRecord> {
        self.entities.iter().find(|e| e.name == entity)
    }

    fn entity_mut(&mut self, entity: &str) -> Option<&mut EntityRecord> {
        self.entities.iter_mut().find(|e| e.name == entity)
    }

    fn held_by(&self, agent: &str) -> Vec<String> {
        self.entities
            .iter()
            .filter(|e| e.owner.as_deref() == Some(agent))
            .map(|e| e.name.clone())
            .collect()
    }

    /// Frees every entity held by `agent`, returning them in entity order
    fn release_all(&mut self, agent: &str) -> Vec<String> {
        let mut freed = Vec::new();
        for record in self.entities.iter_mut() {
            if record.owner.as_deref() == Some(agent) {
                record.owner = None;
                freed.push(record.name.clone());
            }
        }
        freed
    }
}

/// Authoritative store of agents, entities and their association.
///
/// Every entity carries its owner, so an entity is free exactly when it has
/// no owner and can never be bound to two agents. All state sits behind one
/// lock: each operation is atomic and validates before it mutates, so a
/// failed call leaves the store untouched.
pub struct RelationStore {
    relations: RwLock<Relations>,

    /// Upper bound on registered agents, if any
    max_agents: Option<usize>,
}

impl RelationStore {
    /// Create new empty store without an agent limit
    pub fn new() -> Self {
        Self::with_agent_limit(None)
    }

    pub fn with_agent_limit(max_agents: Option<usize>) -> Self {
        Self {
            relations: RwLock::new(Relations::default()),
            max_agents,
        }
    }

    fn read(&self) -> RwLockReadGuard<'_, Relations> {
        self.relations.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, Relations> {
        self.relations.write().unwrap_or_else(PoisonError::into_inner)
    }

    /// Register an agent
    pub fn register_agent(&self, agent: &str) -> Result<(), EnvError> {
        let mut rel = self.write();

        if rel.has_agent(agent) {
            return Err(EnvError::DuplicateAgent(agent.to_string()));
        }
        if let Some(limit) = self.max_agents {
            if rel.agents.len() >= limit {
                return Err(EnvError::TooManyAgents {
                    agent: agent.to_string(),
                    limit,
                });
            }
        }

        rel.agents.push(agent.to_string());
        info!(agent = %agent, "Agent registered");
        Ok(())
    }

    /// Unregister an agent
    ///
    /// Entities still held by the agent are returned to the free set; their
    /// names are returned in entity order.
    pub fn unregister_agent(&self, agent: &str) -> Result<Vec<String>, EnvError> {
        let mut rel = self.write();

        if !rel.has_agent(agent) {
            return Err(EnvError::UnknownAgent(agent.to_string()));
        }

        let freed = rel.release_all(agent);
        rel.agents.retain(|a| a != agent);

        info!(agent = %agent, freed = freed.len(), "Agent unregistered");
        Ok(freed)
    }

    /// Add a new free entity
    pub fn add_entity(&self, entity: &str) -> Result<(), EnvError> {
        self.insert_entity(entity, None)
    }

    /// Add a new free entity with a domain type
    pub fn add_typed_entity(&self, entity: &str, kind: &str) -> Result<(), EnvError> {
        self.insert_entity(entity, Some(kind.to_string()))
    }

    fn insert_entity(&self, entity: &str, kind: Option<String>) -> Result<(), EnvError> {
        let mut rel = self.write();

        if rel.entity(entity).is_some() {
            return Err(EnvError::DuplicateEntity(entity.to_string()));
        }

        rel.entities.push(EntityRecord {
            name: entity.to_string(),
            kind,
            owner: None,
        });
        info!(entity = %entity, "Entity added");
        Ok(())
    }

    /// Delete an entity and whatever association it holds
    ///
    /// Returns the agent the entity was associated with, if any.
    pub fn delete_entity(&self, entity: &str) -> Result<Option<String>, EnvError> {
        let mut rel = self.write();

        let index = rel
            .entities
            .iter()
            .position(|e| e.name == entity)
            .ok_or_else(|| EnvError::UnknownEntity(entity.to_string()))?;

        let removed = rel.entities.remove(index);
        info!(entity = %entity, owner = ?removed.owner, "Entity deleted");
        Ok(removed.owner)
    }

    /// Associate a free entity with a registered agent
    pub fn associate(&self, agent: &str, entity: &str) -> Result<(), EnvError> {
        let mut rel = self.write();

        if rel.entity(entity).is_none() {
            return Err(EnvError::UnknownEntity(entity.to_string()));
        }
        if !rel.has_agent(agent) {
            return Err(EnvError::UnknownAgent(agent.to_string()));
        }

        let record = rel
            .entity_mut(entity)
            .ok_or_else(|| EnvError::UnknownEntity(entity.to_string()))?;

        if let Some(owner) = &record.owner {
            return Err(EnvError::NotFree {
                entity: entity.to_string(),
                owner: owner.clone(),
            });
        }

        record.owner = Some(agent.to_string());
        debug!(agent = %agent, entity = %entity, "Entity associated");
        Ok(())
    }

    /// Return an associated entity to the free set
    ///
    /// Returns the agent that held it.
    pub fn free_entity(&self, entity: &str) -> Result<String, EnvError> {
        let mut rel = self.write();

        let record = rel
            .entity_mut(entity)
            .ok_or_else(|| EnvError::UnknownEntity(entity.to_string()))?;

        let owner = record
            .owner
            .take()
            .ok_or_else(|| EnvError::NotAssociated(entity.to_string()))?;

        debug!(agent = %owner, entity = %entity, "Entity freed");
        Ok(owner)
    }

    /// Free every entity held by an agent
    pub fn free_agent(&self, agent: &str) -> Result<Vec<String>, EnvError> {
        let mut rel = self.write();

        if !rel.has_agent(agent) {
            return Err(EnvError::UnknownAgent(agent.to_string()));
        }

        let freed = rel.release_all(agent);
        debug!(agent = %agent, freed = freed.len(), "Agent freed");
        Ok(freed)
    }

    /// Free one specific agent/entity pair
    pub fn free_pair(&self, agent: &str, entity: &str) -> Result<(), EnvError> {
        let mut rel = self.write();

        if !rel.has_agent(agent) {
            return Err(EnvError::UnknownAgent(agent.to_string()));
        }

        let record = rel
            .entity_mut(entity)
            .ok_or_else(|| EnvError::UnknownEntity(entity.to_string()))?;

        if record.owner.as_deref() != Some(agent) {
            return Err(EnvError::EntityNotAssociated {
                agent: agent.to_string(),
                entity: entity.to_string(),
            });
        }

        record.owner = None;
        debug!(agent = %agent, entity = %entity, "Pair freed");
        Ok(())
    }

    pub fn is_agent(&self, agent: &str) -> bool {
        self.read().has_agent(agent)
    }

    pub fn is_entity(&self, entity: &str) -> bool {
        self.read().entity(entity).is_some()
    }

    /// Registered agents in registration order
    pub fn agents(&self) -> Vec<String> {
        self.read().agents.clone()
    }

    /// All entities in creation order
    pub fn entities(&self) -> Vec<String> {
        self.read().entities.iter().map(|e| e.name.clone()).collect()
    }

    /// Entities not associated with any agent
    pub fn free_entities(&self) -> Vec<String> {
        self.read()
            .entities
            .iter()
            .filter(|e| e.owner.is_none())
            .map(|e| e.name.clone())
            .collect()
    }

    /// Entities associated with `agent`, in entity order
    pub fn entities_of(&self, agent: &str) -> Result<Vec<String>, EnvError> {
        let rel = self.read();
        if !rel.has_agent(agent) {
            return Err(EnvError::UnknownAgent(agent.to_string()));
        }
        Ok(rel.held_by(agent))
    }

    /// Agents associated with `entity` (empty when the entity is free)
    pub fn agents_of(&self, entity: &str) -> Result<Vec<String>, EnvError> {
        let rel = self.read();
        let record = rel
            .entity(entity)
            .ok_or_else(|| EnvError::UnknownEntity(entity.to_string()))?;
        Ok(record.owner.iter().cloned().collect())
    }

    /// Current owner of `entity`; `None` if it is free or does not exist
    pub fn owner_of(&self, entity: &str) -> Option<String> {
        self.read().entity(entity).and_then(|e| e.owner.clone())
    }

    /// Domain type of `entity`
    pub fn entity_type(&self, entity: &str) -> Result<Option<String>, EnvError> {
        let rel = self.read();
        rel.entity(entity)
            .map(|e| e.kind.clone())
            .ok_or_else(|| EnvError::UnknownEntity(entity.to_string()))
    }

    pub fn snapshot(&self) -> RelationSnapshot {
        let rel = self.read();
        RelationSnapshot {
            agents: rel.agents.clone(),
            entities: rel.entities.clone(),
        }
    }
}

impl Default for RelationStore {
    fn default() -> Self {
        Self::new()
    }
}
